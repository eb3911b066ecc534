//! Transfer pipeline orchestration.
//!
//! A transfer runs one or more cycles. Each cycle builds a fresh relay, runs
//! the source fill and the sink drain concurrently until the sink has seen the
//! end-of-stream marker, then either stops or rests and starts over when
//! keep-alive is enabled.
//!
//! On the first interrupt the source's writes are stopped, the marker is
//! enqueued on its behalf, and the sink commits everything already queued.
//! The source keeps running until it returns, so it can acknowledge to its
//! storage exactly the items that reached the relay. A second interrupt stops
//! at once; the records left in the relay are counted as lost.

use futures::future::{BoxFuture, Fuse, FusedFuture};
use futures::FutureExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{TransferConfig, TransferOptions};
use crate::connectors::{DrainStats, Sink, Source};
use crate::error::{Error, Result};
use crate::registry::Registry;
use crate::relay::{self, RelayWriter};
use crate::shutdown::Shutdown;

/// How long a stopped source may take to return once the sink is done.
pub const SOURCE_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Lifecycle of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Not started yet.
    Idle,
    /// Cycles are running.
    Running,
    /// Interrupted: the sink is committing what was already queued.
    DrainingOnInterrupt,
    /// Finished, failed or interrupted.
    Stopped,
}

/// Transfer statistics.
#[derive(Debug, Default, Clone)]
pub struct TransferStats {
    /// Cycles started.
    pub cycles: u64,
    /// Cycles that ended with an error.
    pub failed_cycles: u64,
    /// Records acknowledged by the sink.
    pub processed: u64,
    /// Records written by successful commits.
    pub committed: u64,
    /// Successful commits.
    pub batches: u64,
    /// Records left in the relay when a cycle was cut short.
    pub lost: u64,
    /// Duration in seconds.
    pub duration_secs: f64,
}

impl TransferStats {
    /// Calculate throughput (committed records per second).
    #[must_use]
    pub fn throughput(&self) -> f64 {
        if self.duration_secs > 0.0 {
            self.committed as f64 / self.duration_secs
        } else {
            0.0
        }
    }

    fn add(&mut self, drained: DrainStats) {
        self.processed += drained.processed;
        self.committed += drained.committed;
        self.batches += drained.batches;
    }
}

/// Transfer pipeline.
pub struct Pipeline {
    source: Box<dyn Source>,
    sink: Box<dyn Sink>,
    options: TransferOptions,
    shutdown: Shutdown,
    state: EngineState,
    progress: Option<ProgressBar>,
}

impl Pipeline {
    /// Create a new transfer pipeline.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the options are invalid.
    pub fn new(source: Box<dyn Source>, sink: Box<dyn Sink>, options: TransferOptions) -> Result<Self> {
        options.validate()?;

        Ok(Self {
            source,
            sink,
            options,
            shutdown: Shutdown::new(),
            state: EngineState::Idle,
            progress: None,
        })
    }

    /// Builds the source and sink named by a configuration.
    ///
    /// The configuration is resolved and validated before any connector is
    /// created, so an invalid one never touches the storages.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or a connector cannot
    /// be created.
    pub async fn from_config(mut config: TransferConfig, registry: &Registry) -> Result<Self> {
        config.resolve(registry)?;
        config.validate(registry)?;

        let source = registry.create_source(&config.source).await?;
        let sink = registry.create_sink(&config.sink).await?;

        Self::new(source, sink, config.options)
    }

    /// Use an externally controlled shutdown signal.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Show a spinner counting transferred records.
    #[must_use]
    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.progress = enabled.then(create_progress_bar);
        self
    }

    /// Shutdown signal of this pipeline.
    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Current state.
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Run the transfer until it completes, fails or is interrupted.
    ///
    /// Interrupts are not errors: the stats report how many records were
    /// lost, if any.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failed cycle, unless
    /// `continue_on_error` applies.
    pub async fn run(&mut self) -> Result<TransferStats> {
        let start = Instant::now();
        let mut stats = TransferStats::default();

        self.state = EngineState::Running;
        info!(
            "Starting transfer from {} to {}",
            self.source.source_type(),
            self.sink.sink_type()
        );

        loop {
            stats.cycles += 1;

            if let Err(e) = self.run_cycle(&mut stats).await {
                stats.failed_cycles += 1;

                let keep_going = self.options.continue_on_error
                    && self.options.keep_alive
                    && !self.shutdown.is_interrupted();
                if !keep_going {
                    self.finish(&mut stats, start);
                    return Err(e);
                }
                error!("Transfer cycle {} failed: {}", stats.cycles, e);
            }

            if self.shutdown.is_interrupted() || !self.options.keep_alive {
                break;
            }
            if !self.rest().await {
                break;
            }
        }

        self.finish(&mut stats, start);

        info!(
            "Transfer complete: {} cycles, {} processed, {} committed, {} lost in {:.2}s ({:.0} items/sec)",
            stats.cycles,
            stats.processed,
            stats.committed,
            stats.lost,
            stats.duration_secs,
            stats.throughput()
        );

        Ok(stats)
    }

    fn finish(&mut self, stats: &mut TransferStats, start: Instant) {
        self.state = EngineState::Stopped;
        stats.duration_secs = start.elapsed().as_secs_f64();
        if let Some(progress) = &self.progress {
            progress.finish_with_message(format!("{} items transferred", stats.committed));
        }
    }

    /// Sleeps between two cycles. Returns false if interrupted meanwhile.
    async fn rest(&self) -> bool {
        let rest = self.options.rest_duration();
        if rest.is_zero() {
            return true;
        }

        debug!("Resting {}s before next cycle", rest.as_secs());
        tokio::select! {
            () = tokio::time::sleep(rest) => true,
            () = self.shutdown.interrupted() => false,
        }
    }

    /// Runs one source → relay → sink cycle.
    async fn run_cycle(&mut self, stats: &mut TransferStats) -> Result<()> {
        let cycle = stats.cycles;
        info!("Cycle {} started", cycle);

        let (writer, mut reader) = relay::channel(self.options.relay_capacity);
        let control = writer.clone();
        let stop = CancellationToken::new();

        let Self {
            source,
            sink,
            shutdown,
            state,
            ..
        } = &mut *self;

        let mut fill = source.fill(writer.with_stop(stop.clone())).fuse();
        let mut drain = sink.drain(&mut reader).fuse();
        let mut closing: Fuse<BoxFuture<'static, Result<()>>> = Fuse::terminated();
        let mut grace: Fuse<BoxFuture<'static, ()>> = Fuse::terminated();
        let mut marker_forced = false;
        let mut source_error: Option<Error> = None;
        let mut drained: Option<Result<DrainStats>> = None;
        let mut interrupted = false;

        // The source is never dropped while it can still settle what it
        // enqueued; it is stopped instead and waited for.
        while drained.is_none() || !fill.is_terminated() {
            tokio::select! {
                biased;

                () = shutdown.terminated(), if interrupted => {
                    warn!("Transfer stopped before the sink finished");
                    break;
                }
                () = shutdown.interrupted(), if !interrupted => {
                    interrupted = true;
                    *state = EngineState::DrainingOnInterrupt;
                    info!("Closing transfer, committing queued items");
                    if !fill.is_terminated() {
                        stop.cancel();
                        if !marker_forced {
                            marker_forced = true;
                            closing = close_stream(&control);
                        }
                    }
                }
                result = &mut fill, if !fill.is_terminated() => {
                    match result {
                        Ok(count) => debug!("Source enqueued {} items", count),
                        Err(Error::Interrupted) if stop.is_cancelled() => {
                            debug!("Source stopped");
                        }
                        Err(e) => {
                            warn!("Source failed, committing queued items: {}", e);
                            if !marker_forced {
                                marker_forced = true;
                                closing = close_stream(&control);
                            }
                            source_error = Some(e);
                        }
                    }
                }
                result = &mut closing, if !closing.is_terminated() => {
                    if let Err(e) = result {
                        warn!("Cannot close relay: {}", e);
                    }
                }
                result = &mut drain, if !drain.is_terminated() => {
                    if !fill.is_terminated() {
                        stop.cancel();
                        grace = tokio::time::sleep(SOURCE_GRACE_PERIOD).boxed().fuse();
                    }
                    drained = Some(result);
                }
                () = &mut grace, if !grace.is_terminated() => {
                    warn!(
                        "Source did not stop within {}s, abandoning it",
                        SOURCE_GRACE_PERIOD.as_secs()
                    );
                    break;
                }
            }
        }

        drop(drain);
        drop(fill);

        let lost = control.depth() as u64;
        if lost > 0 {
            warn!("{} items have been lost before closing the transfer", lost);
            stats.lost += lost;
        }

        match drained {
            Some(Ok(drained)) => {
                stats.add(drained);
                if let Some(progress) = &self.progress {
                    progress.inc(drained.committed);
                    progress.set_message(format!("cycle {}", cycle));
                }
                info!(
                    "Cycle {} finished: {} processed, {} committed in {} batches",
                    cycle, drained.processed, drained.committed, drained.batches
                );
            }
            Some(Err(e)) => {
                if let Some(source_error) = &source_error {
                    error!("Source also failed: {}", source_error);
                }
                return Err(e);
            }
            None => return Ok(()),
        }

        match source_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Enqueues the end-of-stream marker on behalf of a source that did not.
fn close_stream(relay: &RelayWriter) -> Fuse<BoxFuture<'static, Result<()>>> {
    let relay = relay.clone();
    async move { relay.close_stream().await }.boxed().fuse()
}

fn create_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new_spinner();

    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {pos} items ({per_sec}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(120));

    pb
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("source", &self.source.source_type())
            .field("sink", &self.sink.sink_type())
            .field("options", &self.options)
            .field("state", &self.state)
            .finish()
    }
}
