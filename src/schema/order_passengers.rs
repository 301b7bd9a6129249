use super::ColumnAddition;

pub const PASSENGER_COLUMNS: &[ColumnAddition] =
    &[ColumnAddition::new("orders", "passengers", "INTEGER DEFAULT 1")];
