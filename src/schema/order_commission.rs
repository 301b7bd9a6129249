use log::info;
use rusqlite::Connection;

use super::{ColumnAddition, MigrationContext};
use crate::error::MigrateError;
use crate::settings::resolve_commission_rate;

pub const COMMISSION_COLUMNS: &[ColumnAddition] = &[
    ColumnAddition::new("orders", "platform_fee", "NUMERIC(10,2)"),
    ColumnAddition::new("orders", "driver_earnings", "NUMERIC(10,2)"),
];

pub const COMMISSION_RATE_COLUMNS: &[ColumnAddition] =
    &[ColumnAddition::new("orders", "commission_rate", "NUMERIC(5,4)")];

/// Gives every order without a rate the platform rate. Rows that already carry one keep it.
pub fn fill_default_commission_rate(
    conn: &Connection,
    ctx: &MigrationContext,
) -> Result<usize, MigrateError> {
    let rate = resolve_commission_rate(conn, ctx.default_rate)?;

    let updated = conn.execute(
        "UPDATE orders SET commission_rate = ?1 WHERE commission_rate IS NULL",
        [rate],
    )?;

    info!("Set commission_rate {} on {} orders", rate, updated);

    Ok(updated)
}
