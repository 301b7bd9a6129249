use rusqlite::Connection;

use super::MigrationContext;
use crate::error::MigrateError;
use crate::orders::backfill_commission;
use crate::settings::resolve_commission_rate;

pub fn backfill_order_commission(conn: &Connection, ctx: &MigrationContext) -> Result<usize, MigrateError> {
    let default_rate = resolve_commission_rate(conn, ctx.default_rate)?;
    let summary = backfill_commission(conn, default_rate)?;

    Ok(summary.updated)
}
