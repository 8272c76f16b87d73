//! Connection tuning applied to every SQLite connection the crate opens

use rusqlite::Connection;
use std::time::Duration;

/// WAL checkpoint threshold in pages
pub const WAL_AUTOCHECKPOINT_PAGES: i64 = 1000;

/// Apply WAL journaling and write-path PRAGMAs
///
/// - `journal_mode = WAL` (readers don't block the writer)
/// - `synchronous = NORMAL` (safe with WAL)
/// - `temp_store = MEMORY`
/// - `wal_autocheckpoint = 1000`
/// - `busy_timeout` so concurrent writers wait instead of failing fast
pub fn apply_optimized_pragmas(conn: &Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        log::warn!("⚠️  SQLite journal_mode is '{}', WAL not available", mode);
    }
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.pragma_update(None, "wal_autocheckpoint", WAL_AUTOCHECKPOINT_PAGES)?;
    conn.busy_timeout(busy_timeout)?;
    Ok(())
}
