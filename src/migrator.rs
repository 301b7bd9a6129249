use chrono::Utc;
use log::{debug, info, Level};
use logging_timer::timer;
use rusqlite::Connection;
use serde::Serialize;

use crate::database::Database;
use crate::error::MigrateError;
use crate::schema::{Migration, MigrationContext, UnitKind, MIGRATIONS};
use crate::settings::TIMESTAMP_FORMAT;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnitOutcome {
    pub name: &'static str,
    pub columns_added: usize,
    pub rows_affected: usize,
}

#[derive(Clone, Debug, Default)]
pub struct ApplyReport {
    pub applied: Vec<UnitOutcome>,
    pub skipped: Vec<&'static str>,
}

#[derive(Clone, Debug, Serialize)]
pub struct UnitStatus {
    pub name: &'static str,
    pub kind: UnitKind,
    pub description: &'static str,
    pub applied_at: Option<String>,
}

pub struct Migrator;

impl Migrator {
    /// Applies every unit not yet recorded in `schema_migrations`, in order. With `force`,
    /// recorded units run again; their guards make that a no-op on an up-to-date database.
    ///
    /// Stops at the first failing unit. Units applied before it stay applied.
    pub fn apply_all(
        db: &mut Database,
        ctx: &MigrationContext,
        force: bool,
    ) -> Result<ApplyReport, MigrateError> {
        Self::apply_units(db, MIGRATIONS, ctx, force)
    }

    fn apply_units(
        db: &mut Database,
        units: &[Migration],
        ctx: &MigrationContext,
        force: bool,
    ) -> Result<ApplyReport, MigrateError> {
        let mut report = ApplyReport::default();

        for unit in units {
            if !force {
                if let Some(applied_at) = Database::applied_at(db.conn(), unit.name)? {
                    debug!("Skipping {} (applied {})", unit.name, applied_at);
                    report.skipped.push(unit.name);
                    continue;
                }
            }

            let outcome = Self::apply_unit(db, unit, ctx)?;
            report.applied.push(outcome);
        }

        info!(
            "Migrations complete: {} applied, {} already applied",
            report.applied.len(),
            report.skipped.len()
        );

        Ok(report)
    }

    /// Runs one unit's phases in a single transaction and records it. On error the
    /// transaction rolls back, so the unit leaves no partial effect and no log entry.
    pub fn apply_unit(
        db: &mut Database,
        unit: &Migration,
        ctx: &MigrationContext,
    ) -> Result<UnitOutcome, MigrateError> {
        let _tmr = timer!(Level::Debug; "Migrator::apply_unit", "{}", unit.name);
        info!("Applying {} ({}): {}", unit.name, unit.kind, unit.description);

        let tx = db.transaction()?;

        let outcome = Self::run_phases(&tx, unit, ctx)
            .map_err(|e| MigrateError::in_unit(unit.name, e))?;

        let now = Utc::now().format(TIMESTAMP_FORMAT).to_string();
        Database::record_applied(&tx, unit.name, unit.kind.as_ref(), &now)?;

        tx.commit()?;

        info!(
            "Applied {}: {} columns added, {} rows affected",
            unit.name, outcome.columns_added, outcome.rows_affected
        );

        Ok(outcome)
    }

    fn run_phases(
        conn: &Connection,
        unit: &Migration,
        ctx: &MigrationContext,
    ) -> Result<UnitOutcome, MigrateError> {
        let mut outcome = UnitOutcome {
            name: unit.name,
            columns_added: 0,
            rows_affected: 0,
        };

        for column in unit.add_columns {
            if Database::column_exists(conn, column.table, column.column)? {
                debug!("{}.{} already exists", column.table, column.column);
                continue;
            }
            if !Database::table_exists(conn, column.table)? {
                return Err(MigrateError::Error(format!(
                    "Table '{}' does not exist",
                    column.table
                )));
            }
            conn.execute_batch(&column.alter_sql())?;
            outcome.columns_added += 1;
        }

        if let Some(sql) = unit.pre_sql {
            conn.execute_batch(sql)?;
        }

        if let Some(code_fn) = unit.code_fn {
            outcome.rows_affected = code_fn(conn, ctx)?;
        }

        if let Some(sql) = unit.post_sql {
            conn.execute_batch(sql)?;
        }

        Ok(outcome)
    }

    pub fn status(db: &Database) -> Result<Vec<UnitStatus>, MigrateError> {
        MIGRATIONS
            .iter()
            .map(|unit| {
                Ok(UnitStatus {
                    name: unit.name,
                    kind: unit.kind,
                    description: unit.description,
                    applied_at: Database::applied_at(db.conn(), unit.name)?,
                })
            })
            .collect()
    }
}
