//! Metric names and label values

/// Resolutions answered from the cache
pub const CACHE_HITS: &str = "amqp_resolver_cache_hits_total";
/// Resolutions that required a construction
pub const CACHE_MISSES: &str = "amqp_resolver_cache_misses_total";
/// Callers that waited on another caller's in-flight construction
pub const COALESCED_WAITERS: &str = "amqp_resolver_coalesced_waiters_total";
/// Construction attempts by outcome
pub const CONNECTIONS: &str = "amqp_resolver_connections_total";
/// Failed constructions by error category
pub const CONNECTION_ERRORS: &str = "amqp_resolver_connection_errors_total";
/// Connections closed through the resolver
pub const CONNECTIONS_CLOSED: &str = "amqp_resolver_connections_closed_total";
/// Time spent resolving configuration and connecting
pub const CONNECT_DURATION: &str = "amqp_resolver_connect_duration_ms";
/// Connections currently cached
pub const CACHED_CONNECTIONS: &str = "amqp_resolver_cached_connections";

/// Label key for construction outcome
pub const RESULT: &str = "result";
/// Label key for error category
pub const CATEGORY: &str = "category";

/// Successful outcome
pub const RESULT_OK: &str = "ok";
/// Failed outcome
pub const RESULT_ERROR: &str = "error";
