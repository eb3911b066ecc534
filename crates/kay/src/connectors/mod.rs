//! Source and sink connectors.

pub mod batch;
pub mod common;
pub mod elasticsearch;
pub mod json_file;
pub mod mapping;
pub mod none;
pub mod redis;

use async_trait::async_trait;

use crate::error::Result;
use crate::relay::{RelayReader, RelayWriter};

pub use batch::{BatchWriter, BatchedSink, BULK_SIZE};

/// Counters reported by a sink after one drain.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainStats {
    /// Records taken from the relay (acknowledged when appended to a batch).
    pub processed: u64,
    /// Records written by successful commits.
    pub committed: u64,
    /// Successful commits.
    pub batches: u64,
}

/// Trait for storages items are read from.
///
/// Implement this trait to add support for a new source storage.
#[async_trait]
pub trait Source: Send {
    /// Get the source type name.
    fn source_type(&self) -> &'static str;

    /// Enqueue every available record, then the end-of-stream marker.
    ///
    /// On error the marker is not sent; the caller closes the stream.
    ///
    /// # Returns
    ///
    /// The number of records enqueued.
    async fn fill(&mut self, relay: RelayWriter) -> Result<u64>;
}

/// Trait for storages items are written to.
///
/// Implement this trait to add support for a new target storage.
#[async_trait]
pub trait Sink: Send {
    /// Get the sink type name.
    fn sink_type(&self) -> &'static str;

    /// Consume the relay up to and including the first end-of-stream marker.
    async fn drain(&mut self, relay: &mut RelayReader) -> Result<DrainStats>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_stats_default() {
        let stats = DrainStats::default();
        assert_eq!(stats.processed, 0);
        assert_eq!(stats.committed, 0);
        assert_eq!(stats.batches, 0);
    }
}
