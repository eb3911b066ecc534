//! Bounded in-memory relay between a source and a sink.
//!
//! A relay lives for exactly one transfer cycle. The writer side is used by
//! the source (and by the pipeline to force the end-of-stream marker on
//! interrupt), the reader side by the sink. Both sides can observe the number
//! of records still queued, which is what gets reported as lost when a
//! transfer is stopped before the sink consumed them.
//!
//! A writer handle can be tied to a stop token. Once the token is cancelled,
//! every `put` through that handle fails with `Error::Interrupted` without
//! enqueueing anything, so a source learns exactly which of its items made it
//! into the relay.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::record::Record;

/// Default number of items a relay can hold before `put` suspends.
pub const DEFAULT_RELAY_CAPACITY: usize = 1000;

/// An item travelling through the relay.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayItem {
    /// A record to be committed by the sink.
    Record(Record),
    /// No more records will arrive in this cycle.
    EndOfStream,
}

/// Creates a relay able to hold `capacity` items.
#[must_use]
pub fn channel(capacity: usize) -> (RelayWriter, RelayReader) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let depth = Arc::new(AtomicUsize::new(0));

    (
        RelayWriter {
            tx,
            depth: Arc::clone(&depth),
            stop: None,
        },
        RelayReader { rx, depth },
    )
}

/// Producing end of a relay.
#[derive(Debug, Clone)]
pub struct RelayWriter {
    tx: mpsc::Sender<RelayItem>,
    depth: Arc<AtomicUsize>,
    stop: Option<CancellationToken>,
}

impl RelayWriter {
    /// Ties this handle to a stop token.
    #[must_use]
    pub fn with_stop(mut self, stop: CancellationToken) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Whether writes through this handle have been stopped.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stop.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    /// Completes once writes through this handle are stopped.
    ///
    /// Never completes for a handle without a stop token. Sources waiting on
    /// their storage for new items select on it to give up promptly.
    pub async fn stopped(&self) {
        match &self.stop {
            Some(stop) => stop.cancelled().await,
            None => std::future::pending().await,
        }
    }

    /// Appends an item, waiting while the relay is full.
    ///
    /// Dropping the returned future before it completes enqueues nothing.
    ///
    /// # Errors
    ///
    /// Returns `Error::Interrupted` if writes through this handle were stopped
    /// before the item could be enqueued, or `Error::RelayClosed` if the
    /// reader has been dropped.
    pub async fn put(&self, item: RelayItem) -> Result<()> {
        let reserved = match &self.stop {
            Some(stop) => tokio::select! {
                biased;

                () = stop.cancelled() => return Err(Error::Interrupted),
                reserved = self.tx.reserve() => reserved,
            },
            None => self.tx.reserve().await,
        };
        let permit = reserved.map_err(|_| Error::RelayClosed)?;
        if matches!(item, RelayItem::Record(_)) {
            self.depth.fetch_add(1, Ordering::SeqCst);
        }
        permit.send(item);
        Ok(())
    }

    /// Appends a record.
    ///
    /// # Errors
    ///
    /// Same as [`RelayWriter::put`].
    pub async fn put_record(&self, record: Record) -> Result<()> {
        self.put(RelayItem::Record(record)).await
    }

    /// Appends the end-of-stream marker.
    ///
    /// # Errors
    ///
    /// Same as [`RelayWriter::put`].
    pub async fn close_stream(&self) -> Result<()> {
        self.put(RelayItem::EndOfStream).await
    }

    /// Number of records enqueued and not yet consumed.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}

/// Consuming end of a relay.
#[derive(Debug)]
pub struct RelayReader {
    rx: mpsc::Receiver<RelayItem>,
    depth: Arc<AtomicUsize>,
}

impl RelayReader {
    /// Removes and returns the head of the relay, waiting while it is empty.
    ///
    /// Returns `None` once every writer is gone and the relay is empty.
    pub async fn get(&mut self) -> Option<RelayItem> {
        let item = self.rx.recv().await?;
        if matches!(item, RelayItem::Record(_)) {
            self.depth.fetch_sub(1, Ordering::SeqCst);
        }
        Some(item)
    }

    /// Number of records enqueued and not yet consumed.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}
