//! Histogram metrics

use super::labels;
use std::time::Duration;

/// Record how long a construction took, whatever its outcome
pub fn connect_duration(elapsed: Duration) {
    metrics::histogram!(labels::CONNECT_DURATION).record(elapsed.as_secs_f64() * 1000.0);
}
