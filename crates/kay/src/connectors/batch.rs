//! Batching drain loop shared by the bulk-writing sinks.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::connectors::{DrainStats, Sink};
use crate::error::Result;
use crate::record::Record;
use crate::relay::{RelayItem, RelayReader};

/// Default number of records committed per bulk write.
pub const BULK_SIZE: usize = 100;

/// A storage accepting records in batches.
#[async_trait]
pub trait BatchWriter: Send {
    /// Name used for the sink built on top of this writer.
    fn writer_type(&self) -> &'static str;

    /// Durably commits a batch. A failure is fatal to the current cycle.
    async fn write_batch(&mut self, batch: &[Record]) -> Result<()>;
}

/// Sink committing records in batches of `bulk_size`.
///
/// Records are acknowledged as processed when they enter the in-memory batch,
/// before the batch is committed.
pub struct BatchedSink<W> {
    writer: W,
    bulk_size: usize,
}

impl<W: BatchWriter> BatchedSink<W> {
    /// Wraps a writer with the default bulk size.
    pub fn new(writer: W) -> Self {
        Self::with_bulk_size(writer, BULK_SIZE)
    }

    /// Wraps a writer with a custom bulk size (at least 1).
    pub fn with_bulk_size(writer: W, bulk_size: usize) -> Self {
        Self {
            writer,
            bulk_size: bulk_size.max(1),
        }
    }

    /// Records per commit.
    pub fn bulk_size(&self) -> usize {
        self.bulk_size
    }

    async fn commit(&mut self, batch: &mut Vec<Record>, stats: &mut DrainStats) -> Result<()> {
        debug!("Committing batch of {} items", batch.len());
        self.writer.write_batch(&batch[..]).await?;
        stats.committed += batch.len() as u64;
        stats.batches += 1;
        batch.clear();
        Ok(())
    }
}

#[async_trait]
impl<W: BatchWriter> Sink for BatchedSink<W> {
    fn sink_type(&self) -> &'static str {
        self.writer.writer_type()
    }

    async fn drain(&mut self, relay: &mut RelayReader) -> Result<DrainStats> {
        let mut stats = DrainStats::default();
        let mut batch = Vec::with_capacity(self.bulk_size);

        loop {
            match relay.get().await {
                Some(RelayItem::Record(record)) => {
                    batch.push(record);
                    stats.processed += 1;

                    if batch.len() == self.bulk_size {
                        self.commit(&mut batch, &mut stats).await?;
                    }
                }
                Some(RelayItem::EndOfStream) => break,
                None => {
                    warn!("Relay closed without end-of-stream marker");
                    break;
                }
            }
        }

        if !batch.is_empty() {
            self.commit(&mut batch, &mut stats).await?;
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::relay;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[derive(Default, Clone)]
    struct Recorder {
        batches: Arc<Mutex<Vec<Vec<String>>>>,
        fail: bool,
    }

    #[async_trait]
    impl BatchWriter for Recorder {
        fn writer_type(&self) -> &'static str {
            "recorder"
        }

        async fn write_batch(&mut self, batch: &[Record]) -> Result<()> {
            if self.fail {
                return Err(Error::SinkCommit("rejected".to_string()));
            }
            let ids = batch.iter().map(|r| r.id().to_string()).collect();
            self.batches.lock().unwrap().push(ids);
            Ok(())
        }
    }

    fn record(id: usize) -> Record {
        Record::from_value(json!({ "uuid": format!("r{}", id) })).unwrap()
    }

    async fn enqueue(count: usize) -> relay::RelayReader {
        let (writer, reader) = relay::channel(count + 1);
        for i in 0..count {
            writer.put_record(record(i)).await.unwrap();
        }
        writer.close_stream().await.unwrap();
        reader
    }

    #[tokio::test]
    async fn test_batches_split_at_bulk_size() {
        let recorder = Recorder::default();
        let mut sink = BatchedSink::new(recorder.clone());
        let mut reader = enqueue(250).await;

        let stats = sink.drain(&mut reader).await.unwrap();

        let sizes: Vec<usize> = recorder.batches.lock().unwrap().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![100, 100, 50]);
        assert_eq!(stats.processed, 250);
        assert_eq!(stats.committed, 250);
        assert_eq!(stats.batches, 3);
    }

    #[tokio::test]
    async fn test_batches_keep_relay_order() {
        let recorder = Recorder::default();
        let mut sink = BatchedSink::with_bulk_size(recorder.clone(), 3);
        let mut reader = enqueue(7).await;

        sink.drain(&mut reader).await.unwrap();

        let flat: Vec<String> = recorder.batches.lock().unwrap().concat();
        let expected: Vec<String> = (0..7).map(|i| format!("r{}", i)).collect();
        assert_eq!(flat, expected);
    }

    #[tokio::test]
    async fn test_empty_stream_commits_nothing() {
        let recorder = Recorder::default();
        let mut sink = BatchedSink::new(recorder.clone());
        let mut reader = enqueue(0).await;

        let stats = sink.drain(&mut reader).await.unwrap();

        assert_eq!(stats, DrainStats::default());
        assert!(recorder.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_drain_stops_at_first_marker() {
        let (writer, mut reader) = relay::channel(8);
        writer.put_record(record(0)).await.unwrap();
        writer.close_stream().await.unwrap();
        writer.put_record(record(1)).await.unwrap();

        let mut sink = BatchedSink::new(Recorder::default());
        let stats = sink.drain(&mut reader).await.unwrap();

        assert_eq!(stats.processed, 1);
        assert_eq!(reader.depth(), 1);
    }

    #[tokio::test]
    async fn test_records_acknowledged_before_commit() {
        // Known boundary: items count as processed once batched, even when
        // the commit that would persist them fails.
        let recorder = Recorder {
            fail: true,
            ..Recorder::default()
        };
        let mut sink = BatchedSink::with_bulk_size(recorder, 5);
        let mut reader = enqueue(5).await;

        let result = sink.drain(&mut reader).await;

        assert!(matches!(result, Err(Error::SinkCommit(_))));
        assert_eq!(reader.depth(), 0);
    }

    #[test]
    fn test_bulk_size_at_least_one() {
        let sink = BatchedSink::with_bulk_size(Recorder::default(), 0);
        assert_eq!(sink.bulk_size(), 1);
    }
}
