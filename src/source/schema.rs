//! Database schema and migrations.

use anyhow::Result;
use rusqlite::Connection;

/// Run all pending migrations.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY,
            stream TEXT NOT NULL,
            op_time TEXT NOT NULL,
            request_id TEXT NOT NULL,
            client_id TEXT,
            aggregator TEXT,
            state TEXT,
            trans_type TEXT,
            amount REAL,
            response_code TEXT,
            response_message TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS anomaly_log (
            id TEXT PRIMARY KEY,
            evaluated_date TEXT NOT NULL,
            stream TEXT NOT NULL,
            field TEXT NOT NULL,
            slot TEXT NOT NULL,
            value REAL,
            baseline_median REAL NOT NULL,
            baseline_std_dev REAL NOT NULL,
            flag TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_events_stream_time ON events(stream, op_time);
        CREATE INDEX IF NOT EXISTS idx_anomaly_log_date ON anomaly_log(evaluated_date);",
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM anomaly_log", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap(); // Should not error
    }
}
