use rusqlite::Connection;

use super::{ColumnAddition, MigrationContext};
use crate::error::MigrateError;

// Summarized pet names, e.g. "Milo, Luna"
pub const PET_DETAILS_COLUMNS: &[ColumnAddition] =
    &[ColumnAddition::new("orders", "pet_details", "TEXT")];

pub fn fill_pet_details(conn: &Connection, _ctx: &MigrationContext) -> Result<usize, MigrateError> {
    let updated = conn.execute(
        "UPDATE orders
         SET pet_details = (
             SELECT group_concat(p.name, ', ')
             FROM order_pets op
             JOIN pets p ON p.id = op.pet_id
             WHERE op.order_id = orders.id
         )
         WHERE pet_details IS NULL
           AND EXISTS (
             SELECT 1 FROM order_pets op
             JOIN pets p ON p.id = op.pet_id
             WHERE op.order_id = orders.id
           )",
        [],
    )?;

    Ok(updated)
}
