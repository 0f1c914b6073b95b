//! vigil-core — periodic health checking with hysteresis and fan-out.
//!
//! Runs a set of registered probes on a fixed schedule, folds their
//! results into one `Status` per round, gates statuses through
//! consecutive success/failure thresholds, and hands the ones that pass
//! to watchers and reporters.
//!
//! # Architecture
//!
//! ```text
//! Checker
//!   ├── Scheduler task (initial delay, then one round per period)
//!   │   ├── ProbeRegistry::snapshot()
//!   │   ├── run_round() → Status     (one task per probe, joined)
//!   │   ├── Hysteresis::observe()    (emit or hold back)
//!   │   └── Broadcaster::publish()   (non-blocking, drop when full)
//!   └── Dispatch task (own Broadcaster subscription)
//!       └── dispatch() → every Reporter concurrently, with backoff
//! ```
//!
//! Cancelling the token passed to `Checker::start` stops both tasks,
//! aborts any in-flight round, and closes every watcher.

pub mod checker;
pub mod config;
pub mod context;
pub mod error;
pub mod hysteresis;
pub mod probe;
pub mod reporter;
pub mod round;
pub mod status;
pub mod watch;

pub use checker::Checker;
pub use config::{CheckerConfig, CheckerOptions};
pub use context::Context;
pub use error::{CheckerError, CheckerResult, ConfigError};
pub use hysteresis::{Health, Hysteresis};
pub use probe::{Probe, ProbeDescriptor, ProbeFn, ProbeRegistry};
pub use reporter::{DispatchReport, ExponentialBackoff, ReportOutcome, Reporter, ReporterSet};
pub use round::run_round;
pub use status::{ProbeError, Status, StatusBuilder, StatusError};
pub use watch::{Broadcaster, Delivery, Watcher};

pub use tokio_util::sync::CancellationToken;
