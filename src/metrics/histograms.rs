//! Histogram metrics

use super::names;
use std::time::Duration;

/// Record how long a dial attempt took
pub fn dial_duration(elapsed: Duration) {
    metrics::histogram!(names::DIAL_DURATION_MS).record(elapsed.as_secs_f64() * 1000.0);
}
