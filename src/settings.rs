use chrono::Utc;
use log::warn;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::commission::Rate;
use crate::database::Database;
use crate::error::MigrateError;

pub const COMMISSION_RATE_KEY: &str = "commission_rate";

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One row of `platform_settings`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlatformSetting {
    pub key: String,
    pub value: String,
    pub description: Option<String>,
    pub updated_at: Option<String>,
}

impl PlatformSetting {
    pub fn list(conn: &Connection) -> Result<Vec<PlatformSetting>, MigrateError> {
        let mut stmt = conn.prepare(
            "SELECT key, value, description, updated_at
            FROM platform_settings
            ORDER BY key ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(PlatformSetting {
                key: row.get(0)?,
                value: row.get(1)?,
                description: row.get(2)?,
                updated_at: row.get(3)?,
            })
        })?;

        let mut settings = Vec::new();
        for row in rows {
            settings.push(row?);
        }

        Ok(settings)
    }

    pub fn get(conn: &Connection, key: &str) -> Result<Option<PlatformSetting>, MigrateError> {
        conn.query_row(
            "SELECT key, value, description, updated_at FROM platform_settings WHERE key = ?",
            [key],
            |row| {
                Ok(PlatformSetting {
                    key: row.get(0)?,
                    value: row.get(1)?,
                    description: row.get(2)?,
                    updated_at: row.get(3)?,
                })
            },
        )
        .optional()
        .map_err(MigrateError::DatabaseError)
    }

    /// Inserts the setting unless the key is already present. An existing value is never
    /// touched. Returns true if a row was inserted.
    pub fn insert_if_absent(
        conn: &Connection,
        key: &str,
        value: &str,
        description: &str,
    ) -> Result<bool, MigrateError> {
        let now = Utc::now().format(TIMESTAMP_FORMAT).to_string();
        let inserted = conn.execute(
            "INSERT INTO platform_settings (key, value, description, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(key) DO NOTHING",
            params![key, value, description, now],
        )?;

        Ok(inserted > 0)
    }
}

/// The platform-wide commission rate: the stored setting when it is present and valid,
/// otherwise `fallback`. A missing `platform_settings` table also yields `fallback`.
pub fn resolve_commission_rate(conn: &Connection, fallback: Rate) -> Result<Rate, MigrateError> {
    if !Database::table_exists(conn, "platform_settings")? {
        return Ok(fallback);
    }

    match PlatformSetting::get(conn, COMMISSION_RATE_KEY)? {
        Some(setting) => match setting.value.parse::<Rate>() {
            Ok(rate) => Ok(rate),
            Err(e) => {
                warn!(
                    "Ignoring platform setting {}='{}' ({}); using {}",
                    COMMISSION_RATE_KEY, setting.value, e, fallback
                );
                Ok(fallback)
            }
        },
        None => Ok(fallback),
    }
}
