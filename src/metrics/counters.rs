//! Counter metrics

use super::labels;

/// Record a cache hit
pub fn cache_hit() {
    metrics::counter!(labels::CACHE_HITS).increment(1);
}

/// Record a cache miss
pub fn cache_miss() {
    metrics::counter!(labels::CACHE_MISSES).increment(1);
}

/// Record a caller that joined an in-flight construction
pub fn coalesced_waiter() {
    metrics::counter!(labels::COALESCED_WAITERS).increment(1);
}

/// Record a successful construction
pub fn connection_established() {
    metrics::counter!(labels::CONNECTIONS, labels::RESULT => labels::RESULT_OK).increment(1);
}

/// Record a failed construction
pub fn connection_failed(category: &'static str) {
    metrics::counter!(labels::CONNECTIONS, labels::RESULT => labels::RESULT_ERROR).increment(1);
    metrics::counter!(labels::CONNECTION_ERRORS, labels::CATEGORY => category).increment(1);
}

/// Record closed connections
pub fn connections_closed(count: usize) {
    metrics::counter!(labels::CONNECTIONS_CLOSED).increment(count as u64);
}
