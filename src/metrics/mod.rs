//! Metrics for backend connection establishment
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! embedding process installs a recorder.
//!
//! * `sqlproxy_backend_dials_total{outcome}` - completed attempts, `outcome` is
//!   `success` or a [`DialErrorKind`](crate::DialErrorKind) label
//! * `sqlproxy_backend_dial_duration_ms` - time from dial start to hand-off or failure

pub mod counters;
pub mod histograms;

/// Metric names
pub mod names {
    /// Completed dial attempts
    pub const DIALS_TOTAL: &str = "sqlproxy_backend_dials_total";

    /// Dial duration in milliseconds
    pub const DIAL_DURATION_MS: &str = "sqlproxy_backend_dial_duration_ms";
}
