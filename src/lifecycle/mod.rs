//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load settings → Validate → Init logging/metrics → Open database
//!     → Build daemon → daemon.start() (first pass)
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     Broadcast → daemon loop returns between passes → Exit
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - A pass is never interrupted; shutdown is observed only while waiting
//! - Spawned relay processes are left running on shutdown; the next
//!   instance rediscovers them

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
