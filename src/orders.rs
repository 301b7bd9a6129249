use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension};

use crate::commission::{split, Money, Rate};
use crate::database::Database;
use crate::error::MigrateError;

pub const STATUS_ACCEPTED: &str = "accepted";

const COMMISSION_COLUMNS: [&str; 3] = ["platform_fee", "driver_earnings", "commission_rate"];

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BackfillSummary {
    pub updated: usize,
    pub total_price: Money,
    pub total_platform_fee: Money,
    pub total_driver_earnings: Money,
}

/// Fills platform_fee and driver_earnings on every priced order that has no fee yet,
/// using the order's own commission_rate or `default_rate`. Rows with a fee are never
/// recomputed, so running this again changes nothing.
pub fn backfill_commission(conn: &Connection, default_rate: Rate) -> Result<BackfillSummary, MigrateError> {
    for column in COMMISSION_COLUMNS {
        if !Database::column_exists(conn, "orders", column)? {
            return Err(MigrateError::Error(format!(
                "orders.{} is missing; apply pending migrations first",
                column
            )));
        }
    }

    let mut stmt = conn.prepare(
        "SELECT id, price, commission_rate
        FROM orders
        WHERE price IS NOT NULL AND platform_fee IS NULL
        ORDER BY id ASC",
    )?;

    let pending = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,          // id
                row.get::<_, Money>(1)?,        // price
                row.get::<_, Option<Rate>>(2)?, // commission_rate
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    drop(stmt);

    let mut update_stmt = conn.prepare(
        "UPDATE orders
        SET platform_fee = ?1,
            driver_earnings = ?2,
            commission_rate = COALESCE(commission_rate, ?3)
        WHERE id = ?4 AND platform_fee IS NULL",
    )?;

    let mut summary = BackfillSummary::default();

    for (order_id, price, rate) in pending {
        let rate = rate.unwrap_or(default_rate);
        let result = split(price, rate);

        let changed = update_stmt.execute(params![
            result.platform_fee,
            result.driver_earnings,
            rate,
            order_id
        ])?;
        if changed == 0 {
            continue;
        }

        info!(
            "Order #{}: price {} -> platform fee {}, driver earnings {} (rate {})",
            order_id, price, result.platform_fee, result.driver_earnings, rate
        );

        summary.updated += 1;
        summary.total_price = Money::from_cents(summary.total_price.cents() + price.cents());
        summary.total_platform_fee =
            Money::from_cents(summary.total_platform_fee.cents() + result.platform_fee.cents());
        summary.total_driver_earnings =
            Money::from_cents(summary.total_driver_earnings.cents() + result.driver_earnings.cents());
    }

    info!("Updated {} orders with commission data", summary.updated);

    Ok(summary)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AcceptOutcome {
    Accepted { driver_id: i64 },
    /// The order is already accepted or already has a driver.
    Unchanged {
        status: Option<String>,
        driver_id: Option<i64>,
    },
    NotFound,
}

/// Marks an order accepted by a driver, as if the driver had taken it in the app.
/// Only an order that is not yet accepted and has no driver is changed. Without an
/// explicit driver the lowest existing driver id is used.
pub fn accept_order(
    conn: &Connection,
    order_id: i64,
    driver_id: Option<i64>,
) -> Result<AcceptOutcome, MigrateError> {
    let current: Option<(Option<String>, Option<i64>)> = conn
        .query_row(
            "SELECT status, driver_id FROM orders WHERE id = ?",
            [order_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let Some((status, current_driver)) = current else {
        return Ok(AcceptOutcome::NotFound);
    };

    if status.as_deref() == Some(STATUS_ACCEPTED) || current_driver.is_some() {
        debug!(
            "Order #{} left as is (status {:?}, driver {:?})",
            order_id, status, current_driver
        );
        return Ok(AcceptOutcome::Unchanged {
            status,
            driver_id: current_driver,
        });
    }

    let driver_id = match driver_id {
        Some(id) => id,
        None => conn
            .query_row("SELECT id FROM drivers ORDER BY id ASC LIMIT 1", [], |row| {
                row.get::<_, i64>(0)
            })
            .optional()?
            .ok_or_else(|| MigrateError::Error("No drivers exist to accept the order".to_string()))?,
    };

    let changed = conn.execute(
        "UPDATE orders
        SET status = ?1, driver_id = ?2
        WHERE id = ?3
          AND (status IS NULL OR status <> ?1)
          AND driver_id IS NULL",
        params![STATUS_ACCEPTED, driver_id, order_id],
    )?;

    if changed == 0 {
        return Err(MigrateError::Error(format!(
            "Order #{} changed while being accepted",
            order_id
        )));
    }

    info!("Order #{} accepted by driver #{}", order_id, driver_id);

    Ok(AcceptOutcome::Accepted { driver_id })
}

#[cfg(test)]
pub(crate) mod test_support {
    use rusqlite::{params, Connection};

    use crate::commission::Money;

    pub fn insert_user(conn: &Connection, id: i64) {
        conn.execute(
            "INSERT INTO users (id, password_hash, full_name) VALUES (?1, 'x', ?2)",
            params![id, format!("User {}", id)],
        )
        .unwrap();
    }

    pub fn insert_driver(conn: &Connection, id: i64, user_id: i64) {
        conn.execute(
            "INSERT INTO drivers (id, user_id, vehicle_type) VALUES (?1, ?2, 'van')",
            params![id, user_id],
        )
        .unwrap();
    }

    pub fn insert_pet(conn: &Connection, id: i64, user_id: i64, name: &str) {
        conn.execute(
            "INSERT INTO pets (id, user_id, name) VALUES (?1, ?2, ?3)",
            params![id, user_id, name],
        )
        .unwrap();
    }

    pub fn insert_order(conn: &Connection, id: i64, pet_id: Option<i64>, price: Option<&str>) {
        let price: Option<Money> = price.map(|p| p.parse().unwrap());
        conn.execute(
            "INSERT INTO orders (id, user_id, pet_id, pickup_address, pickup_lat, pickup_lng,
                dropoff_address, dropoff_lat, dropoff_lng, price)
             VALUES (?1, 1, ?2, 'A', 13.7, 100.5, 'B', 13.8, 100.6, ?3)",
            params![id, pet_id, price],
        )
        .unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::commission::DEFAULT_COMMISSION_RATE;
    use crate::schema::base::CREATE_BASE_SCHEMA_SQL;
    use crate::schema::MIGRATIONS;
    use pretty_assertions::assert_eq;

    fn base_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.conn().execute_batch(CREATE_BASE_SCHEMA_SQL).unwrap();
        insert_user(db.conn(), 1);
        db
    }

    fn add_commission_columns(conn: &Connection) {
        conn.execute_batch(
            "ALTER TABLE orders ADD COLUMN platform_fee NUMERIC(10,2);
             ALTER TABLE orders ADD COLUMN driver_earnings NUMERIC(10,2);
             ALTER TABLE orders ADD COLUMN commission_rate NUMERIC(5,4);",
        )
        .unwrap();
    }

    fn commission_of(conn: &Connection, id: i64) -> (Option<Money>, Option<Money>, Option<Rate>) {
        conn.query_row(
            "SELECT platform_fee, driver_earnings, commission_rate FROM orders WHERE id = ?",
            [id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .unwrap()
    }

    fn money(s: &str) -> Money {
        s.parse().unwrap()
    }

    #[test]
    fn test_backfill_computes_default_split() {
        let db = base_db();
        let conn = db.conn();
        add_commission_columns(conn);
        insert_order(conn, 1, None, Some("100.00"));
        insert_order(conn, 2, None, Some("250.50"));

        let summary = backfill_commission(conn, DEFAULT_COMMISSION_RATE).unwrap();
        assert_eq!(summary.updated, 2);
        assert_eq!(summary.total_price, money("350.50"));

        assert_eq!(
            commission_of(conn, 1),
            (Some(money("7.00")), Some(money("93.00")), Some(DEFAULT_COMMISSION_RATE))
        );
        // 250.50 * 0.07 = 17.535 -> 17.54, 250.50 * 0.93 = 232.965 -> 232.97
        assert_eq!(
            commission_of(conn, 2),
            (Some(money("17.54")), Some(money("232.97")), Some(DEFAULT_COMMISSION_RATE))
        );
    }

    #[test]
    fn test_backfill_skips_unpriced_and_already_set() {
        let db = base_db();
        let conn = db.conn();
        add_commission_columns(conn);
        insert_order(conn, 1, None, None);
        insert_order(conn, 2, None, Some("100.00"));
        conn.execute(
            "UPDATE orders SET platform_fee = 5, driver_earnings = 95, commission_rate = 0.05 WHERE id = 2",
            [],
        )
        .unwrap();

        let summary = backfill_commission(conn, DEFAULT_COMMISSION_RATE).unwrap();
        assert_eq!(summary.updated, 0);
        assert_eq!(commission_of(conn, 1), (None, None, None));
        assert_eq!(
            commission_of(conn, 2),
            (Some(money("5.00")), Some(money("95.00")), Some(Rate::from_bps(500).unwrap()))
        );
    }

    #[test]
    fn test_backfill_uses_row_rate() {
        let db = base_db();
        let conn = db.conn();
        add_commission_columns(conn);
        insert_order(conn, 1, None, Some("200.00"));
        conn.execute("UPDATE orders SET commission_rate = 0.1 WHERE id = 1", [])
            .unwrap();

        backfill_commission(conn, DEFAULT_COMMISSION_RATE).unwrap();
        assert_eq!(
            commission_of(conn, 1),
            (Some(money("20.00")), Some(money("180.00")), Some(Rate::from_bps(1000).unwrap()))
        );
    }

    #[test]
    fn test_backfill_twice_is_idempotent() {
        let db = base_db();
        let conn = db.conn();
        add_commission_columns(conn);
        for (id, price) in [(1, "100.00"), (2, "12.50"), (3, "0.99")] {
            insert_order(conn, id, None, Some(price));
        }

        backfill_commission(conn, DEFAULT_COMMISSION_RATE).unwrap();
        let first: Vec<_> = (1..=3).map(|id| commission_of(conn, id)).collect();

        // A different default must not matter the second time around
        let summary = backfill_commission(conn, Rate::from_bps(2000).unwrap()).unwrap();
        let second: Vec<_> = (1..=3).map(|id| commission_of(conn, id)).collect();

        assert_eq!(summary.updated, 0);
        assert_eq!(first, second);
    }

    #[test]
    fn test_backfill_requires_columns() {
        let db = base_db();
        let result = backfill_commission(db.conn(), DEFAULT_COMMISSION_RATE);
        assert!(matches!(result, Err(MigrateError::Error(msg)) if msg.contains("platform_fee")));
    }

    #[test]
    fn test_backfill_surfaces_malformed_price() {
        let db = base_db();
        let conn = db.conn();
        add_commission_columns(conn);
        insert_order(conn, 1, None, Some("10.00"));
        conn.execute("UPDATE orders SET price = 'ten baht' WHERE id = 1", [])
            .unwrap();

        let result = backfill_commission(conn, DEFAULT_COMMISSION_RATE);
        assert!(matches!(result, Err(MigrateError::DatabaseError(_))));
        assert_eq!(commission_of(conn, 1), (None, None, None));
    }

    #[test]
    fn test_accept_order_assigns_existing_driver() {
        let db = base_db();
        let conn = db.conn();
        insert_user(conn, 2);
        insert_user(conn, 3);
        insert_driver(conn, 7, 2);
        insert_driver(conn, 4, 3);
        insert_order(conn, 67, None, Some("300.00"));

        let outcome = accept_order(conn, 67, None).unwrap();
        assert_eq!(outcome, AcceptOutcome::Accepted { driver_id: 4 });

        let (status, driver_id): (String, i64) = conn
            .query_row("SELECT status, driver_id FROM orders WHERE id = 67", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(status, STATUS_ACCEPTED);
        assert_eq!(driver_id, 4);

        // Second run is a no-op
        let outcome = accept_order(conn, 67, Some(7)).unwrap();
        assert_eq!(
            outcome,
            AcceptOutcome::Unchanged {
                status: Some(STATUS_ACCEPTED.to_string()),
                driver_id: Some(4)
            }
        );
    }

    #[test]
    fn test_accept_order_explicit_driver() {
        let db = base_db();
        let conn = db.conn();
        insert_user(conn, 2);
        insert_driver(conn, 9, 2);
        insert_order(conn, 67, None, None);

        assert_eq!(
            accept_order(conn, 67, Some(9)).unwrap(),
            AcceptOutcome::Accepted { driver_id: 9 }
        );
    }

    #[test]
    fn test_accept_order_unknown_driver_violates_foreign_key() {
        let db = base_db();
        let conn = db.conn();
        insert_order(conn, 67, None, None);

        let result = accept_order(conn, 67, Some(404));
        assert!(matches!(result, Err(MigrateError::DatabaseError(_))));

        let status: String = conn
            .query_row("SELECT status FROM orders WHERE id = 67", [], |row| row.get(0))
            .unwrap();
        assert_eq!(status, "pending");
    }

    #[test]
    fn test_accept_order_without_drivers() {
        let db = base_db();
        insert_order(db.conn(), 67, None, None);
        assert!(matches!(accept_order(db.conn(), 67, None), Err(MigrateError::Error(_))));
    }

    #[test]
    fn test_accept_order_not_found() {
        let db = base_db();
        assert_eq!(accept_order(db.conn(), 67, None).unwrap(), AcceptOutcome::NotFound);
    }

    #[test]
    fn test_accept_order_with_driver_already_set() {
        let db = base_db();
        let conn = db.conn();
        insert_user(conn, 2);
        insert_driver(conn, 5, 2);
        insert_order(conn, 67, None, None);
        conn.execute("UPDATE orders SET driver_id = 5, status = 'pending' WHERE id = 67", [])
            .unwrap();

        assert_eq!(
            accept_order(conn, 67, None).unwrap(),
            AcceptOutcome::Unchanged {
                status: Some("pending".to_string()),
                driver_id: Some(5)
            }
        );
    }

    #[test]
    fn test_migrations_cover_backfill_columns() {
        let added: Vec<&str> = MIGRATIONS
            .iter()
            .flat_map(|m| m.add_columns.iter())
            .filter(|c| c.table == "orders")
            .map(|c| c.column)
            .collect();

        for column in COMMISSION_COLUMNS {
            assert!(added.contains(&column), "no migration adds orders.{}", column);
        }
    }
}
