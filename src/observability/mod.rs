//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters and gauges)
//!
//! Consumers:
//!     → stdout (text or JSON lines, picked up by the container's log driver)
//!     → Metrics endpoint (Prometheus scrape, off by default)
//! ```
//!
//! # Design Decisions
//! - Row-level skips are `warn`, process actions `info`, fatal paths `error`
//! - Metric updates are fire-and-forget; without an installed recorder
//!   they are no-ops, so tests need no setup

pub mod logging;
pub mod metrics;
