//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Value published by another component (server IP, interface address):
//!     → retries.rs (poll with a fixed interval, bounded attempts)
//!     → On exhaustion: caller turns it into a fatal error
//! ```
//!
//! # Design Decisions
//! - Retries are bounded; exhaustion is the caller's fatal condition
//! - Fixed interval: the awaited value is produced by a peer on its own
//!   schedule, not by a congested service
//! - Spawn failures are never retried

pub mod retries;

pub use retries::RetryPolicy;
