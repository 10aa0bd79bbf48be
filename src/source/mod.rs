//! The Data Source boundary: windowed, filtered queries for raw events.

pub mod schema;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::event::{RawEvent, Stream};

#[derive(Debug, Error)]
pub enum SourceError {
    /// The backing store could not be reached. Fatal for the current run
    /// only; previously computed reports stay valid and are surfaced with a
    /// staleness indicator.
    #[error("data source unavailable: {0}")]
    Unavailable(String),
    #[error("malformed row: {0}")]
    Malformed(String),
}

/// A windowed query for one stream's raw events. `start` is inclusive,
/// `end` exclusive.
#[derive(Debug, Clone)]
pub struct EventQuery {
    pub stream: Stream,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub aggregator: Option<String>,
    pub state: Option<String>,
}

impl EventQuery {
    pub fn window(stream: Stream, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            stream,
            start,
            end,
            aggregator: None,
            state: None,
        }
    }

    fn matches(&self, event: &RawEvent) -> bool {
        if event.timestamp < self.start || event.timestamp >= self.end {
            return false;
        }
        if let Some(wanted) = self.aggregator.as_deref() {
            if event.aggregator.as_deref() != Some(wanted) {
                return false;
            }
        }
        if let Some(wanted) = self.state.as_deref() {
            if event.state.as_deref() != Some(wanted) {
                return false;
            }
        }
        true
    }
}

/// Anything that can answer windowed event queries: a warehouse, a log
/// scan, or a flat in-memory batch. The engine only depends on the row
/// shape, never on how the query executes.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch(&self, query: &EventQuery) -> Result<Vec<RawEvent>, SourceError>;
}

/// In-memory source, used by tests and by callers feeding flat event
/// records directly to the engine.
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    transactions: Vec<RawEvent>,
    bio_auth: Vec<RawEvent>,
}

impl MemorySource {
    pub fn new(transactions: Vec<RawEvent>, bio_auth: Vec<RawEvent>) -> Self {
        Self {
            transactions,
            bio_auth,
        }
    }
}

#[async_trait]
impl DataSource for MemorySource {
    async fn fetch(&self, query: &EventQuery) -> Result<Vec<RawEvent>, SourceError> {
        let pool = match query.stream {
            Stream::Transaction => &self.transactions,
            Stream::BioAuth => &self.bio_auth,
        };
        Ok(pool
            .iter()
            .filter(|event| query.matches(event))
            .cloned()
            .collect())
    }
}
