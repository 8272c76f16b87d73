//! Runtime configuration from environment variables

use std::env;

/// Configuration for the telemetry store and batch ingestion
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryConfig {
    /// Path to SQLite database file
    pub db_path: String,

    /// Largest batch `submit_batch` will accept
    pub max_batch_size: usize,

    /// How long a writer waits on a locked database (milliseconds)
    pub sqlite_busy_timeout_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            db_path: "machine_telemetry.db".to_string(),
            max_batch_size: 10_000,
            sqlite_busy_timeout_ms: 5_000,
        }
    }
}

impl TelemetryConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `TELEMETRY_DB_PATH` (default: machine_telemetry.db)
    /// - `TELEMETRY_MAX_BATCH_SIZE` (default: 10000)
    /// - `TELEMETRY_SQLITE_BUSY_TIMEOUT_MS` (default: 5000)
    ///
    /// Unparseable numbers fall back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            db_path: env::var("TELEMETRY_DB_PATH").unwrap_or(defaults.db_path),

            max_batch_size: env::var("TELEMETRY_MAX_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_batch_size),

            sqlite_busy_timeout_ms: env::var("TELEMETRY_SQLITE_BUSY_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.sqlite_busy_timeout_ms),
        }
    }
}
