//! Gauge metrics

use super::labels;

/// Set the number of connections currently cached
pub fn cached_connections(count: usize) {
    metrics::gauge!(labels::CACHED_CONNECTIONS).set(count as f64);
}
