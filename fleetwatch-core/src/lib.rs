//! # fleetwatch-core
//!
//! Core library for fleetwatch - a live activity monitor for a fleet of
//! coding agents.
//!
//! This library provides:
//! - Transcript discovery and incremental tailing
//! - Classification of transcript records into redacted activity events
//! - Session tracking with idle detection and fleet summaries
//! - Rate-limited broadcasting to a realtime channel or stdout
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Architecture
//!
//! Data flows in one direction:
//! - **Transcripts:** append-only JSONL files on disk, never modified
//! - **Sessions:** in-memory registry keyed by transcript path
//! - **Events:** redacted summaries published downstream; nothing is persisted
//!
//! ## Example
//!
//! ```rust,no_run
//! use fleetwatch_core::{broadcast, Config, Monitor};
//!
//! # async fn run() -> fleetwatch_core::Result<()> {
//! let config = Config::load()?;
//! let sink = broadcast::sink_from_config(&config.broadcast)?;
//!
//! let monitor = Monitor::new(config, sink);
//! let stats = monitor.run().await?;
//! println!("sent {} events", stats.sent);
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use broadcast::{BroadcastSink, BroadcastStats, Broadcaster, PublishOutcome};
pub use classify::classify;
pub use config::Config;
pub use error::{Error, Result};
pub use monitor::Monitor;
pub use registry::SessionRegistry;
pub use tail::TailCursor;
pub use types::*;
pub use watch::DirectoryWatcher;

// Public modules
pub mod broadcast;
pub mod classify;
pub mod config;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod project;
pub mod registry;
pub mod tail;
pub mod types;
pub mod watch;
