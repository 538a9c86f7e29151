//! Snapshot loader
//!
//! Performs the one-time bulk fetch that establishes a collection's initial
//! contents. Every failure is reported as `SourceUnavailable`: the caller keeps
//! its collection `loading` and may try again.

use crate::error::{Error, Result};
use crate::query::Query;
use crate::record::{Identified, Record, RecordType};
use crate::traits::RecordSource;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Fetches the current records of one type from a source
#[derive(Clone)]
pub struct SnapshotLoader {
    source: Arc<dyn RecordSource>,
    record_type: RecordType,
    query: Option<Query>,
    timeout: Option<Duration>,
}

impl SnapshotLoader {
    /// Create a loader for every record of `record_type`
    pub fn new(source: Arc<dyn RecordSource>, record_type: RecordType) -> Self {
        Self {
            source,
            record_type,
            query: None,
            timeout: None,
        }
    }

    /// Restrict the snapshot with a query
    pub fn with_query(mut self, query: Option<Query>) -> Self {
        self.query = query;
        self
    }

    /// Give up on the source after `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// The record type this loader fetches
    pub fn record_type(&self) -> &RecordType {
        &self.record_type
    }

    /// Fetch the snapshot
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<Record>)`: Records of the requested type, in source order
    /// - `Err(Error::SourceUnavailable)`: Source not initialized, fetch failed or timed out
    pub async fn load(&self) -> Result<Vec<Record>> {
        if !self.source.is_initialized() {
            return Err(Error::source_unavailable(format!(
                "{} source not initialized",
                self.source.source_name()
            )));
        }

        debug!(
            "Fetching {} snapshot from {} source",
            self.record_type,
            self.source.source_name()
        );

        let fetch = self.source.fetch_all(&self.record_type, self.query.as_ref());
        let fetched = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, fetch).await.map_err(|_| {
                Error::source_unavailable(format!(
                    "{} snapshot timed out after {:?}",
                    self.record_type, limit
                ))
            })?,
            None => fetch.await,
        };

        let records = fetched.map_err(|e| match e {
            Error::SourceUnavailable(_) => e,
            other => Error::source_unavailable(format!(
                "{} snapshot failed: {}",
                self.record_type, other
            )),
        })?;

        let total = records.len();
        let records: Vec<Record> = records
            .into_iter()
            .filter(|r| r.record_type() == &self.record_type)
            .collect();

        if records.len() != total {
            warn!(
                "Dropped {} record(s) of another type from {} snapshot",
                total - records.len(),
                self.record_type
            );
        }

        debug!("Fetched {} {} record(s)", records.len(), self.record_type);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemoryRecordSource;
    use async_trait::async_trait;

    struct FailingSource;

    #[async_trait]
    impl RecordSource for FailingSource {
        async fn fetch_all(
            &self,
            _record_type: &RecordType,
            _query: Option<&Query>,
        ) -> Result<Vec<Record>> {
            Err(Error::http("connection refused"))
        }

        fn subscribe(&self) -> crate::traits::EventStream {
            Box::pin(tokio_stream::empty())
        }

        fn source_name(&self) -> &'static str {
            "failing"
        }
    }

    struct SlowSource;

    #[async_trait]
    impl RecordSource for SlowSource {
        async fn fetch_all(
            &self,
            _record_type: &RecordType,
            _query: Option<&Query>,
        ) -> Result<Vec<Record>> {
            std::future::pending().await
        }

        fn subscribe(&self) -> crate::traits::EventStream {
            Box::pin(tokio_stream::empty())
        }

        fn source_name(&self) -> &'static str {
            "slow"
        }
    }

    struct MixedSource;

    #[async_trait]
    impl RecordSource for MixedSource {
        async fn fetch_all(
            &self,
            _record_type: &RecordType,
            _query: Option<&Query>,
        ) -> Result<Vec<Record>> {
            Ok(vec![
                Record::new("connection", "1"),
                Record::new("proof", "p1"),
                Record::new("connection", "2"),
            ])
        }

        fn subscribe(&self) -> crate::traits::EventStream {
            Box::pin(tokio_stream::empty())
        }

        fn source_name(&self) -> &'static str {
            "mixed"
        }
    }

    #[tokio::test]
    async fn test_load_from_memory_source() {
        let source = MemoryRecordSource::new();
        source.seed(Record::new("connection", "1"));
        source.seed(Record::new("connection", "2"));

        let loader = SnapshotLoader::new(Arc::new(source), RecordType::new("connection"));
        let records = loader.load().await.unwrap();

        let ids: Vec<&str> = records.iter().map(|r| r.id().as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_uninitialized_source_fails_fast() {
        let source = MemoryRecordSource::new();
        source.set_initialized(false);

        let loader = SnapshotLoader::new(Arc::new(source), RecordType::new("connection"));
        assert!(loader.load().await.unwrap_err().is_source_unavailable());
    }

    #[tokio::test]
    async fn test_source_errors_become_unavailable() {
        let loader = SnapshotLoader::new(Arc::new(FailingSource), RecordType::new("proof"));
        let err = loader.load().await.unwrap_err();

        assert!(err.is_source_unavailable());
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_timeout_becomes_unavailable() {
        let loader = SnapshotLoader::new(Arc::new(SlowSource), RecordType::new("proof"))
            .with_timeout(Some(Duration::from_millis(20)));

        let err = loader.load().await.unwrap_err();
        assert!(err.is_source_unavailable());
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_records_of_other_types_are_dropped() {
        let loader = SnapshotLoader::new(Arc::new(MixedSource), RecordType::new("connection"));
        let records = loader.load().await.unwrap();
        assert_eq!(records.len(), 2);
    }
}
