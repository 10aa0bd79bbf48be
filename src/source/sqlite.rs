//! SQLite-backed data source. Doubles as the store for ingested flat event
//! records and for the anomaly log.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use uuid::Uuid;

use super::{schema, DataSource, EventQuery, SourceError};
use crate::event::{RawEvent, Stream};
use crate::report::AnomalyRecord;

/// Connection pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

/// Open (or create) the SQLite database and return a connection pool.
pub fn open_pool(path: &str) -> Result<Pool> {
    let manager = SqliteConnectionManager::file(path).with_init(|c| {
        c.execute_batch(
            "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA temp_store = MEMORY;
                 PRAGMA busy_timeout = 5000;",
        )
    });

    let pool = R2D2Pool::new(manager)?;

    // Run migrations on a single connection
    let conn = pool.get()?;
    schema::migrate(&conn)?;

    Ok(pool)
}

#[derive(Clone)]
pub struct SqliteSource {
    pool: Pool,
}

impl SqliteSource {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn open(path: &str) -> Result<Self> {
        Ok(Self::new(open_pool(path)?))
    }

    /// Ingest a batch of flat event records into one stream.
    pub fn ingest(&self, stream: Stream, events: &[RawEvent]) -> Result<usize> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        for event in events {
            tx.execute(
                "INSERT INTO events (stream, op_time, request_id, client_id, aggregator,
                                     state, trans_type, amount, response_code, response_message)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    stream.to_string(),
                    event.timestamp.to_rfc3339(),
                    event.request_id,
                    event.client_id,
                    event.aggregator,
                    event.state,
                    event.trans_type,
                    event.amount,
                    event.response_code,
                    event.response_message,
                ],
            )?;
        }
        tx.commit()?;
        Ok(events.len())
    }

    /// Persist flagged anomalies from an evaluation run.
    pub fn record_anomalies(&self, records: &[AnomalyRecord]) -> Result<()> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        for record in records {
            tx.execute(
                "INSERT OR REPLACE INTO anomaly_log
                     (id, evaluated_date, stream, field, slot, value,
                      baseline_median, baseline_std_dev, flag)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.id.to_string(),
                    record.date.to_string(),
                    record.stream.to_string(),
                    record.field,
                    record.slot.to_string(),
                    record.value,
                    record.median,
                    record.std_dev,
                    serde_json::to_string(&record.flag)?,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Most recently recorded anomalies, newest first.
    pub fn recent_anomalies(&self, limit: usize) -> Result<Vec<AnomalyRecord>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, evaluated_date, stream, field, slot, value,
                    baseline_median, baseline_std_dev, flag
             FROM anomaly_log
             ORDER BY created_at DESC, id DESC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map([limit], |row| {
            let id: String = row.get(0)?;
            let date: String = row.get(1)?;
            let stream: String = row.get(2)?;
            let field: String = row.get(3)?;
            let slot: String = row.get(4)?;
            let value: Option<f64> = row.get(5)?;
            let median: f64 = row.get(6)?;
            let std_dev: f64 = row.get(7)?;
            let flag: String = row.get(8)?;
            Ok((id, date, stream, field, slot, value, median, std_dev, flag))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, date, stream, field, slot, value, median, std_dev, flag) = row?;
            records.push(AnomalyRecord {
                id: Uuid::parse_str(&id).unwrap_or_default(),
                date: date
                    .parse()
                    .map_err(|e| anyhow::anyhow!("bad evaluated_date {date}: {e}"))?,
                stream: if stream == "bio_auth" {
                    Stream::BioAuth
                } else {
                    Stream::Transaction
                },
                field,
                slot: slot.parse().map_err(|e| anyhow::anyhow!("{e}"))?,
                value,
                median,
                std_dev,
                flag: serde_json::from_str(&flag)?,
            });
        }
        Ok(records)
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, SourceError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SourceError::Malformed(format!("bad op_time {raw}: {e}")))
}

#[async_trait]
impl DataSource for SqliteSource {
    async fn fetch(&self, query: &EventQuery) -> Result<Vec<RawEvent>, SourceError> {
        let pool = self.pool.clone();
        let query = query.clone();

        tokio::task::spawn_blocking(move || -> Result<Vec<RawEvent>, SourceError> {
            let conn = pool
                .get()
                .map_err(|e| SourceError::Unavailable(e.to_string()))?;

            let mut sql = String::from(
                "SELECT op_time, request_id, client_id, aggregator, state, trans_type,
                        amount, response_code, response_message
                 FROM events
                 WHERE stream = ?1 AND op_time >= ?2 AND op_time < ?3",
            );
            if query.aggregator.is_some() {
                sql.push_str(" AND aggregator = ?4");
            }
            if query.state.is_some() {
                sql.push_str(if query.aggregator.is_some() {
                    " AND state = ?5"
                } else {
                    " AND state = ?4"
                });
            }
            sql.push_str(" ORDER BY op_time ASC, id ASC");

            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| SourceError::Unavailable(e.to_string()))?;

            let mut bindings: Vec<Box<dyn rusqlite::ToSql>> = vec![
                Box::new(query.stream.to_string()),
                Box::new(query.start.to_rfc3339()),
                Box::new(query.end.to_rfc3339()),
            ];
            if let Some(aggregator) = &query.aggregator {
                bindings.push(Box::new(aggregator.clone()));
            }
            if let Some(state) = &query.state {
                bindings.push(Box::new(state.clone()));
            }
            let binding_refs: Vec<&dyn rusqlite::ToSql> =
                bindings.iter().map(|b| b.as_ref()).collect();

            let rows = stmt
                .query_map(binding_refs.as_slice(), |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, Option<f64>>(6)?,
                        row.get::<_, Option<String>>(7)?,
                        row.get::<_, Option<String>>(8)?,
                    ))
                })
                .map_err(|e| SourceError::Unavailable(e.to_string()))?;

            let mut events = Vec::new();
            for row in rows {
                let (op_time, request_id, client_id, aggregator, state, trans_type, amount, code, message) =
                    row.map_err(|e| SourceError::Unavailable(e.to_string()))?;
                events.push(RawEvent {
                    timestamp: parse_timestamp(&op_time)?,
                    request_id,
                    client_id,
                    aggregator,
                    state,
                    trans_type,
                    amount,
                    response_code: code,
                    response_message: message,
                });
            }
            Ok(events)
        })
        .await
        .map_err(|e| SourceError::Unavailable(format!("query task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::bucket::Slot;
    use crate::stats::anomaly::AnomalyFlag;
    use chrono::{NaiveDate, TimeZone};

    fn temp_source() -> (tempfile::TempDir, SqliteSource) {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("test.db");
        let source = SqliteSource::open(path.to_str().unwrap()).unwrap();
        (dir, source)
    }

    fn tx_event(ts: DateTime<Utc>, aggregator: &str, message: &str) -> RawEvent {
        RawEvent {
            timestamp: ts,
            request_id: format!("r-{}-{aggregator}", ts.timestamp()),
            client_id: Some("c1".to_string()),
            aggregator: Some(aggregator.to_string()),
            state: Some("UP".to_string()),
            trans_type: Some("CW".to_string()),
            amount: Some(500.0),
            response_code: None,
            response_message: Some(message.to_string()),
        }
    }

    #[tokio::test]
    async fn test_ingest_then_fetch_round_trip() {
        let (_dir, source) = temp_source();
        let d15 = Utc.with_ymd_and_hms(2025, 6, 15, 9, 30, 0).unwrap();
        let d16 = Utc.with_ymd_and_hms(2025, 6, 16, 9, 30, 0).unwrap();

        source
            .ingest(
                Stream::Transaction,
                &[tx_event(d15, "YBL", "success"), tx_event(d16, "NSDL", "failed")],
            )
            .unwrap();

        let query = EventQuery::window(
            Stream::Transaction,
            Utc.with_ymd_and_hms(2025, 6, 15, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 6, 16, 0, 0, 0).unwrap(),
        );
        let rows = source.fetch(&query).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].aggregator.as_deref(), Some("YBL"));
        assert_eq!(rows[0].timestamp, d15);
        assert_eq!(rows[0].amount, Some(500.0));
    }

    #[tokio::test]
    async fn test_fetch_with_dimension_filters() {
        let (_dir, source) = temp_source();
        let d15 = Utc.with_ymd_and_hms(2025, 6, 15, 9, 30, 0).unwrap();
        let mut other_state = tx_event(d15, "YBL", "success");
        other_state.state = Some("BR".to_string());
        other_state.request_id = "r-other".to_string();

        source
            .ingest(
                Stream::Transaction,
                &[tx_event(d15, "YBL", "success"), other_state],
            )
            .unwrap();

        let mut query = EventQuery::window(
            Stream::Transaction,
            Utc.with_ymd_and_hms(2025, 6, 15, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 6, 16, 0, 0, 0).unwrap(),
        );
        query.state = Some("BR".to_string());
        let rows = source.fetch(&query).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].request_id, "r-other");
    }

    #[test]
    fn test_anomaly_log_round_trip() {
        let (_dir, source) = temp_source();
        let record = AnomalyRecord {
            id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2025, 6, 15).unwrap(),
            stream: Stream::BioAuth,
            field: "success_rate".to_string(),
            slot: Slot::Hour(14),
            value: Some(61.2),
            median: 88.0,
            std_dev: 3.5,
            flag: AnomalyFlag::Lower,
        };
        source.record_anomalies(std::slice::from_ref(&record)).unwrap();

        let loaded = source.recent_anomalies(10).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, record.id);
        assert_eq!(loaded[0].stream, Stream::BioAuth);
        assert_eq!(loaded[0].slot, Slot::Hour(14));
        assert_eq!(loaded[0].flag, AnomalyFlag::Lower);
        assert_eq!(loaded[0].value, Some(61.2));
    }
}
