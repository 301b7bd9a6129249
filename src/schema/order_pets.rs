use log::info;
use rusqlite::Connection;

use super::MigrationContext;
use crate::error::MigrateError;

pub const CREATE_ORDER_PETS_SQL: &str = r#"
--
-- order_pets: an order carries zero or more pets. Rows go away with either parent.
--

CREATE TABLE IF NOT EXISTS order_pets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    order_id INTEGER REFERENCES orders(id) ON DELETE CASCADE,
    pet_id INTEGER REFERENCES pets(id) ON DELETE CASCADE,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS ix_order_pets_order_id ON order_pets (order_id);
CREATE INDEX IF NOT EXISTS ix_order_pets_pet_id ON order_pets (pet_id);
"#;

/// Links each order's single `pet_id` into `order_pets`. Orders that already have any
/// linked pet are skipped, as are references to pets that no longer exist.
pub fn link_existing_order_pets(conn: &Connection, _ctx: &MigrationContext) -> Result<usize, MigrateError> {
    let linked = conn.execute(
        "INSERT INTO order_pets (order_id, pet_id)
         SELECT o.id, o.pet_id
         FROM orders o
         WHERE o.pet_id IS NOT NULL
           AND EXISTS (SELECT 1 FROM pets p WHERE p.id = o.pet_id)
           AND NOT EXISTS (SELECT 1 FROM order_pets op WHERE op.order_id = o.id)",
        [],
    )?;

    info!("Linked {} existing order pets", linked);

    Ok(linked)
}
