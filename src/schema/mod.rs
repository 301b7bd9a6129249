pub mod base;
mod commission_backfill;
mod driver_work_radius;
mod order_commission;
mod order_passengers;
mod order_pet_details;
pub mod order_pets;
pub mod platform_settings;

use rusqlite::Connection;
use serde::Serialize;
use strum::{AsRefStr, Display, EnumString};

use crate::commission::Rate;
use crate::error::MigrateError;

/// Inputs shared by every migration's code phase.
#[derive(Debug, Clone, Copy)]
pub struct MigrationContext {
    /// Used when neither the order row nor `platform_settings` carries a commission rate.
    pub default_rate: Rate,
}

/// Function type for migration code that transforms data. Returns the number of rows touched.
pub type MigrationFn = fn(&Connection, &MigrationContext) -> Result<usize, MigrateError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Schema,
    Backfill,
}

/// A column added only when `pragma_table_info` does not already list it.
#[derive(Debug, Clone, Copy)]
pub struct ColumnAddition {
    pub table: &'static str,
    pub column: &'static str,
    pub definition: &'static str,
}

impl ColumnAddition {
    pub const fn new(table: &'static str, column: &'static str, definition: &'static str) -> Self {
        Self {
            table,
            column,
            definition,
        }
    }

    pub fn alter_sql(&self) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            self.table, self.column, self.definition
        )
    }
}

/// Change unit descriptor. Phases run in this order, each optional:
/// - add_columns: guarded column additions
/// - pre_sql: SQL batch of existence-guarded DDL
/// - code_fn: Rust function for data changes restricted to rows matching a precondition
/// - post_sql: trailing SQL batch
///
/// Every phase must be safe to run again on a database that already has its effect.
pub struct Migration {
    pub name: &'static str,
    pub kind: UnitKind,
    pub description: &'static str,
    pub add_columns: &'static [ColumnAddition],
    pub pre_sql: Option<&'static str>,
    pub code_fn: Option<MigrationFn>,
    pub post_sql: Option<&'static str>,
}

impl Migration {
    pub const fn new(name: &'static str, kind: UnitKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            description,
            add_columns: &[],
            pre_sql: None,
            code_fn: None,
            post_sql: None,
        }
    }

    pub const fn with_columns(mut self, columns: &'static [ColumnAddition]) -> Self {
        self.add_columns = columns;
        self
    }

    pub const fn with_pre_sql(mut self, sql: &'static str) -> Self {
        self.pre_sql = Some(sql);
        self
    }

    pub const fn with_code(mut self, code_fn: MigrationFn) -> Self {
        self.code_fn = Some(code_fn);
        self
    }

    #[cfg(test)]
    pub const fn with_post_sql(mut self, sql: &'static str) -> Self {
        self.post_sql = Some(sql);
        self
    }
}

pub const MIGRATION_PLATFORM_SETTINGS: Migration = Migration::new(
    "platform_settings",
    UnitKind::Schema,
    "Create platform_settings and seed the default commission rate",
)
.with_pre_sql(platform_settings::CREATE_PLATFORM_SETTINGS_SQL)
.with_code(platform_settings::seed_platform_settings);

pub const MIGRATION_ORDER_COMMISSION_COLUMNS: Migration = Migration::new(
    "order_commission_columns",
    UnitKind::Schema,
    "Add platform_fee and driver_earnings to orders",
)
.with_columns(order_commission::COMMISSION_COLUMNS);

pub const MIGRATION_ORDER_COMMISSION_RATE: Migration = Migration::new(
    "order_commission_rate",
    UnitKind::Schema,
    "Add commission_rate to orders and default it where missing",
)
.with_columns(order_commission::COMMISSION_RATE_COLUMNS)
.with_code(order_commission::fill_default_commission_rate);

pub const MIGRATION_ORDER_PASSENGERS: Migration = Migration::new(
    "order_passengers",
    UnitKind::Schema,
    "Add passengers to orders",
)
.with_columns(order_passengers::PASSENGER_COLUMNS);

pub const MIGRATION_ORDER_PETS: Migration = Migration::new(
    "order_pets",
    UnitKind::Schema,
    "Create the order_pets join table and link each order's existing pet",
)
.with_pre_sql(order_pets::CREATE_ORDER_PETS_SQL)
.with_code(order_pets::link_existing_order_pets);

pub const MIGRATION_ORDER_PET_DETAILS: Migration = Migration::new(
    "order_pet_details",
    UnitKind::Schema,
    "Add pet_details to orders and summarize linked pet names",
)
.with_columns(order_pet_details::PET_DETAILS_COLUMNS)
.with_code(order_pet_details::fill_pet_details);

pub const MIGRATION_DRIVER_WORK_RADIUS: Migration = Migration::new(
    "driver_work_radius",
    UnitKind::Schema,
    "Add work_radius_km to drivers",
)
.with_columns(driver_work_radius::WORK_RADIUS_COLUMNS);

pub const MIGRATION_ORDER_COMMISSION_BACKFILL: Migration = Migration::new(
    "order_commission_backfill",
    UnitKind::Backfill,
    "Compute platform_fee and driver_earnings for priced orders that lack them",
)
.with_code(commission_backfill::backfill_order_commission);

/// Every change unit, in application order.
pub const MIGRATIONS: &[Migration] = &[
    MIGRATION_PLATFORM_SETTINGS,
    MIGRATION_ORDER_COMMISSION_COLUMNS,
    MIGRATION_ORDER_COMMISSION_RATE,
    MIGRATION_ORDER_PASSENGERS,
    MIGRATION_ORDER_PETS,
    MIGRATION_ORDER_PET_DETAILS,
    MIGRATION_DRIVER_WORK_RADIUS,
    MIGRATION_ORDER_COMMISSION_BACKFILL,
];
