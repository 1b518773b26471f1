//! Database schema definitions
//!
//! `daily_reports` is populated by an external ingest job; the service only
//! makes sure the table and its read indexes exist.

pub const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS daily_reports (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    region TEXT NOT NULL,
    province TEXT,
    city TEXT,
    latitude REAL,
    longitude REAL,
    last_update TEXT NOT NULL,   -- ISO-8601, 2020-03-02T10:00:00+00:00 or 2020-03-02 10:00:00
    active INTEGER,
    confirmed INTEGER,
    deaths INTEGER,
    recovered INTEGER
)
"#;

// For the latest-day lookup and the day join
pub const CREATE_INDEX_LAST_UPDATE: &str =
    "CREATE INDEX IF NOT EXISTS idx_daily_reports_last_update ON daily_reports(last_update)";

// For region/province/city drill-down
pub const CREATE_INDEX_LOCATION: &str =
    "CREATE INDEX IF NOT EXISTS idx_daily_reports_location ON daily_reports(region, province, city)";
