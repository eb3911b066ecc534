//! Sink discarding every item.
//!
//! Useful to empty a queue, or to check a source end to end without a
//! target storage.

use async_trait::async_trait;
use tracing::warn;

use crate::connectors::{DrainStats, Sink};
use crate::error::Result;
use crate::relay::{RelayItem, RelayReader};

/// Drains the relay without storing anything.
#[derive(Debug, Default)]
pub struct NoneSink;

impl NoneSink {
    /// Creates a new discarding sink.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Sink for NoneSink {
    fn sink_type(&self) -> &'static str {
        "none"
    }

    async fn drain(&mut self, relay: &mut RelayReader) -> Result<DrainStats> {
        let mut stats = DrainStats::default();

        loop {
            match relay.get().await {
                Some(RelayItem::Record(_)) => stats.processed += 1,
                Some(RelayItem::EndOfStream) => break,
                None => {
                    warn!("Relay closed without end-of-stream marker");
                    break;
                }
            }
        }

        Ok(stats)
    }
}
