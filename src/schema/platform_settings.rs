use log::debug;
use rusqlite::Connection;

use super::MigrationContext;
use crate::error::MigrateError;
use crate::settings::{PlatformSetting, COMMISSION_RATE_KEY};

pub const CREATE_PLATFORM_SETTINGS_SQL: &str = r#"
--
-- Platform settings: global key/value configuration such as the commission rate
--

CREATE TABLE IF NOT EXISTS platform_settings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    key VARCHAR(100) NOT NULL UNIQUE,
    value VARCHAR(255) NOT NULL,
    description TEXT,
    updated_at TIMESTAMP
);

CREATE INDEX IF NOT EXISTS ix_platform_settings_key ON platform_settings (key);
"#;

/// Seeds the commission rate. An operator-edited value is left alone.
pub fn seed_platform_settings(conn: &Connection, ctx: &MigrationContext) -> Result<usize, MigrateError> {
    let inserted = PlatformSetting::insert_if_absent(
        conn,
        COMMISSION_RATE_KEY,
        &ctx.default_rate.to_string(),
        "Fraction of each order price retained by the platform",
    )?;

    if !inserted {
        debug!("platform_settings.{} already present", COMMISSION_RATE_KEY);
    }

    Ok(usize::from(inserted))
}
