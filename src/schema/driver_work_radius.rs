use super::ColumnAddition;

// Radius in kilometers within which a driver accepts work
pub const WORK_RADIUS_COLUMNS: &[ColumnAddition] =
    &[ColumnAddition::new("drivers", "work_radius_km", "REAL DEFAULT 10.0")];
