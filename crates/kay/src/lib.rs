// Transfer daemon - pedantic lints relaxed for CLI ergonomics
#![allow(clippy::pedantic)]

//! # kay
//!
//! `kay` is a CLI tool and library moving items from a queue into a search
//! store. A source fills a bounded relay, a sink drains it in bulk commits,
//! and the whole cycle can repeat forever with a rest interval in between.
//!
//! ## Supported Backends
//!
//! | Backend | Source | Sink | Notes |
//! |---------|--------|------|-------|
//! | redis2es | Redis list | Elasticsearch | Via a Redis REST endpoint |
//! | json2es | JSON file | Elasticsearch | One-shot imports |
//! | redis2none | Redis list | none | Empties the queue |
//!
//! Elasticsearch indices are versioned (`<alias>_<timestamp>`) and published
//! under a stable alias (`raw-items` or `enrich-items`).
//!
//! ## Quick Start
//!
//! ```bash
//! # Forever, resting 30s between cycles
//! kay run --config kay.yaml --rest 30
//!
//! # One cycle only
//! kay redis2es --redis-url redis://localhost:6379 \
//!     --es-url http://localhost:9200 --es-items-type perceval --no-keep-alive
//! ```
//!
//! ## Configuration Example
//!
//! ```yaml
//! backend: redis2es
//!
//! source:
//!   url: redis://localhost:6379
//!   queue: items
//!
//! sink:
//!   url: http://localhost:9200
//!   items_type: perceval
//!
//! options:
//!   keep_alive: true
//!   rest: 30
//! ```
//!
//! Interrupting a running transfer (Ctrl-C or SIGTERM) stops reading and lets
//! the sink commit what is already queued; a second interrupt stops at once.

#![warn(missing_docs)]

pub mod config;
pub mod connectors;
pub mod error;
pub mod pipeline;
pub mod record;
pub mod registry;
pub mod relay;
pub mod retry;
pub mod shutdown;

pub use config::{EndpointConfig, TransferConfig, TransferOptions};
pub use connectors::{BatchWriter, BatchedSink, DrainStats, Sink, Source};
pub use error::{Error, Result};
pub use pipeline::{EngineState, Pipeline, TransferStats};
pub use record::Record;
pub use registry::Registry;
pub use relay::{RelayItem, RelayReader, RelayWriter};
pub use shutdown::Shutdown;
