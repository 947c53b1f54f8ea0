/// Storage layer
///
/// The single SQLite database that is the source of truth for every other
/// component, and the `Cascade` transaction scope used for multi-row changes.

pub mod cascade;
pub mod database;

pub use cascade::Cascade;
pub use database::Database;

/// Current wall-clock time as unix milliseconds, the storage time format
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Convert stored unix milliseconds back into a timestamp
pub fn from_millis(millis: i64) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp_millis(millis).unwrap_or_default()
}
