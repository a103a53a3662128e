//! # opswatch-core
//!
//! Change-notification engine for the ISP operations dashboard. It polls the
//! operator activity feed, the device fleet and the router's PPPoE session
//! table, turns status changes into notifications, and tracks which of them
//! the operator has already seen.
//!
//! ## Design Principles
//!
//! - **Best effort**: a failing source is skipped for one cycle, a corrupt read
//!   cursor starts from epoch zero. Nothing here is fatal to the host.
//! - **Synchronous**: blocking HTTP and `std::thread`; no async runtime.
//! - **Instance-owned state**: every snapshot, flag and list lives on a
//!   [`NotificationEngine`], so independent engines never share state.
//! - **Injected storage**: the read cursor goes through [`DurableKeyValueStore`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use opswatch_core::{http_adapters, FileKeyValueStore, NotificationEngine, PollScheduler};
//!
//! let adapters = http_adapters(&config.api, &config.poll)?;
//! let store = Arc::new(FileKeyValueStore::new(&storage.state_file()));
//! let engine = Arc::new(NotificationEngine::new(adapters, store, &config.profile));
//! let scheduler = PollScheduler::new(Arc::clone(&engine), config.poll.interval());
//! scheduler.start();
//! ```

pub mod aggregator;
pub mod clock;
pub mod config;
pub mod cursor;
pub mod diff;
pub mod engine;
pub mod error;
pub mod kv;
pub mod scheduler;
pub mod snapshot;
pub mod sources;
pub mod storage;

pub use aggregator::merge;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{load_config, ApiConfig, LoggingConfig, PollConfig, WatchConfig};
pub use cursor::{cursor_key, unread_count, ReadCursor};
pub use diff::{diff, severity_for, DiffOutcome, TransitionEvent};
pub use engine::{CycleOutcome, CycleReport, FeedUpdate, NotificationEngine};
pub use error::{Result, WatchError};
pub use kv::{DurableKeyValueStore, FileKeyValueStore, InMemoryKeyValueStore};
pub use scheduler::PollScheduler;
pub use snapshot::{Snapshot, SnapshotStore, TrackedEntity};
pub use sources::{http_adapters, SourceAdapter, SourceBatch};
pub use storage::StorageConfig;

pub use opswatch_protocol::{EntityStatus, NotificationItem, Severity, SourceTag};
