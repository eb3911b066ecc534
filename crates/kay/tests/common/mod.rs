//! Shared test doubles for the pipeline integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use kay::{BatchWriter, Error, Record, RelayWriter, Result, Shutdown, Source};

pub fn record(i: usize) -> Record {
    Record::from_value(json!({
        "uuid": format!("item-{}", i),
        "origin": "https://example.com/repo.git",
        "data": { "n": i }
    }))
    .unwrap()
}

pub fn records(count: usize) -> Vec<Record> {
    (0..count).map(record).collect()
}

/// Enqueues its records then the marker, on every cycle.
#[derive(Default)]
pub struct VecSource {
    pub records: Vec<Record>,
    pub fills: Arc<AtomicU64>,
}

impl VecSource {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            fills: Arc::default(),
        }
    }
}

#[async_trait]
impl Source for VecSource {
    fn source_type(&self) -> &'static str {
        "vec"
    }

    async fn fill(&mut self, relay: RelayWriter) -> Result<u64> {
        self.fills.fetch_add(1, Ordering::SeqCst);
        for record in &self.records {
            relay.put_record(record.clone()).await?;
        }
        relay.close_stream().await?;
        Ok(self.records.len() as u64)
    }
}

/// Enqueues its records, signals `ready`, then waits for more until the
/// relay stops accepting writes.
pub struct PendingSource {
    pub records: Vec<Record>,
    pub ready: Arc<Notify>,
}

#[async_trait]
impl Source for PendingSource {
    fn source_type(&self) -> &'static str {
        "pending"
    }

    async fn fill(&mut self, relay: RelayWriter) -> Result<u64> {
        for record in &self.records {
            relay.put_record(record.clone()).await?;
        }
        self.ready.notify_one();
        relay.stopped().await;
        Err(Error::Interrupted)
    }
}

/// Enqueues its records, then fails without sending the marker.
pub struct FailingSource {
    pub records: Vec<Record>,
}

#[async_trait]
impl Source for FailingSource {
    fn source_type(&self) -> &'static str {
        "failing"
    }

    async fn fill(&mut self, relay: RelayWriter) -> Result<u64> {
        for record in &self.records {
            relay.put_record(record.clone()).await?;
        }
        Err(Error::SourceRead("connection reset".to_string()))
    }
}

/// Fails on its first cycle; on the second one it interrupts the transfer,
/// then delivers its records normally.
pub struct FlakySource {
    pub records: Vec<Record>,
    pub shutdown: Shutdown,
    pub fills: u64,
}

#[async_trait]
impl Source for FlakySource {
    fn source_type(&self) -> &'static str {
        "flaky"
    }

    async fn fill(&mut self, relay: RelayWriter) -> Result<u64> {
        self.fills += 1;
        if self.fills == 1 {
            return Err(Error::SourceRead("temporarily unavailable".to_string()));
        }

        self.shutdown.trigger();
        for record in &self.records {
            relay.put_record(record.clone()).await?;
        }
        relay.close_stream().await?;
        Ok(self.records.len() as u64)
    }
}

/// Records committed batches as lists of ids.
#[derive(Clone, Default)]
pub struct RecordingWriter {
    pub batches: Arc<Mutex<Vec<Vec<String>>>>,
    pub committed: Arc<Notify>,
    pub fail: bool,
}

impl RecordingWriter {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().iter().map(Vec::len).collect()
    }

    pub fn ids(&self) -> Vec<String> {
        self.batches.lock().unwrap().concat()
    }
}

#[async_trait]
impl BatchWriter for RecordingWriter {
    fn writer_type(&self) -> &'static str {
        "recording"
    }

    async fn write_batch(&mut self, batch: &[Record]) -> Result<()> {
        if self.fail {
            return Err(Error::SinkCommit(format!(
                "Lost items from kay to ES. {} items failed",
                batch.len()
            )));
        }
        let ids = batch.iter().map(|r| r.id().to_string()).collect();
        self.batches.lock().unwrap().push(ids);
        self.committed.notify_one();
        Ok(())
    }
}

/// Signals `started` on every commit and takes `delay` to finish it.
#[derive(Clone)]
pub struct SlowWriter {
    pub started: Arc<Notify>,
    pub delay: Duration,
    pub committed: Arc<AtomicU64>,
}

impl SlowWriter {
    pub fn new(delay: Duration) -> Self {
        Self {
            started: Arc::default(),
            delay,
            committed: Arc::default(),
        }
    }
}

#[async_trait]
impl BatchWriter for SlowWriter {
    fn writer_type(&self) -> &'static str {
        "slow"
    }

    async fn write_batch(&mut self, batch: &[Record]) -> Result<()> {
        self.started.notify_one();
        tokio::time::sleep(self.delay).await;
        self.committed.fetch_add(batch.len() as u64, Ordering::SeqCst);
        Ok(())
    }
}

/// Signals `started` on its first commit, then hangs in it.
#[derive(Clone, Default)]
pub struct StuckWriter {
    pub started: Arc<Notify>,
}

#[async_trait]
impl BatchWriter for StuckWriter {
    fn writer_type(&self) -> &'static str {
        "stuck"
    }

    async fn write_batch(&mut self, _batch: &[Record]) -> Result<()> {
        self.started.notify_one();
        std::future::pending::<()>().await;
        Ok(())
    }
}
