//! Named connection resolution
//!
//! [`ConnectionResolver`] turns a connection name into a live, shared
//! connection:
//!
//! 1. An explicit name is used as-is. Without one, the configured default
//!    name is used; without a default, the unnamed slot is used.
//! 2. A cached connection for that name is returned immediately.
//! 3. Otherwise the configuration subtree for the name is read (missing
//!    keys take their defaults), a connection is established through the
//!    [`Connector`] and cached.
//!
//! Concurrent misses for the same name share one construction. Failures
//! are handed to every waiting caller and are not cached, so the next call
//! tries again.

mod flight;
mod options;

pub use options::{ResolverOptions, DEFAULT_NAMESPACE};

use crate::config::{ConfigSource, ConnectionConfig};
use crate::connection::{Connector, ManagedConnection, TlsConnector};
use crate::metrics::{counters, gauges, histograms};
use crate::{Error, Result};
use flight::{ConnectionName, Flight, Role, Slots};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

/// Shared, lazily populated cache of named broker connections.
///
/// Cloning is cheap and every clone sees the same cache.
///
/// ```no_run
/// use amqp_resolver::{ConnectionResolver, JsonConfig};
/// use serde_json::json;
///
/// # async fn run() -> amqp_resolver::Result<()> {
/// let config = JsonConfig::from_value(json!({
///     "rabbitmq": {
///         "defaultConnection": "primary",
///         "connections": { "primary": { "host": "mq.internal" } }
///     }
/// }));
/// let resolver = ConnectionResolver::from_source(config);
///
/// let conn = resolver.default_connection().await?;
/// assert!(conn.is_open());
/// # Ok(())
/// # }
/// ```
pub struct ConnectionResolver<S, C: Connector> {
    inner: Arc<Inner<S, C>>,
}

struct Inner<S, C: Connector> {
    source: S,
    connector: C,
    options: ResolverOptions,
    slots: Slots<C::Connection>,
    closed: AtomicBool,
}

impl<S, C: Connector> Clone for ConnectionResolver<S, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: ConfigSource> ConnectionResolver<S, TlsConnector> {
    /// Resolver using the default TLS connector
    pub fn from_source(source: S) -> Self {
        Self::new(source, TlsConnector::new())
    }
}

impl<S: ConfigSource, C: Connector> ConnectionResolver<S, C> {
    /// Create a resolver reading the default `rabbitmq` namespace
    pub fn new(source: S, connector: C) -> Self {
        Self::with_options(source, connector, ResolverOptions::default())
    }

    /// Create a resolver with explicit options
    pub fn with_options(source: S, connector: C, options: ResolverOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                connector,
                options,
                slots: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Namespace and key layout in use
    pub fn options(&self) -> &ResolverOptions {
        &self.inner.options
    }

    /// Factory used on cache misses
    pub fn connector(&self) -> &C {
        &self.inner.connector
    }

    /// Configuration source names are resolved against
    pub fn source(&self) -> &S {
        &self.inner.source
    }

    /// Get the connection for `name`, establishing it on first use.
    ///
    /// With `name = None` the configured default name is used. A supplied
    /// `config_override` replaces configuration lookup on a miss; on a hit
    /// the cached connection is returned and the override is ignored.
    ///
    /// # Errors
    ///
    /// Configuration errors for the name, errors from the connector, and
    /// [`Error::ResolverClosed`] after [`shutdown`](Self::shutdown). Errors
    /// are never cached.
    pub async fn resolve_connection(
        &self,
        name: Option<&str>,
        config_override: Option<ConnectionConfig>,
    ) -> Result<Arc<C::Connection>> {
        if self.is_closed() {
            return Err(Error::ResolverClosed);
        }
        let name = self.effective_name(name)?;
        let mut config_override = config_override;

        loop {
            match flight::join(&self.inner.slots, &name) {
                Role::Ready(conn) => {
                    counters::cache_hit();
                    tracing::debug!(name = display_name(&name), "connection cache hit");
                    return Ok(conn);
                }
                Role::Leader(flight) => {
                    return self.lead(flight, config_override.take()).await;
                }
                Role::Waiter(mut rx) => {
                    counters::coalesced_waiter();
                    tracing::debug!(
                        name = display_name(&name),
                        "waiting for in-flight connection"
                    );
                    let outcome = match rx.wait_for(Option::is_some).await {
                        Ok(outcome) => outcome.clone(),
                        Err(_) => None,
                    };
                    match outcome {
                        Some(result) => return result,
                        None => {
                            // Leader was cancelled before settling
                            tracing::debug!(
                                name = display_name(&name),
                                "in-flight connection abandoned, retrying"
                            );
                        }
                    }
                }
            }
        }
    }

    /// Connection registered under `name`
    pub async fn connection(&self, name: &str) -> Result<Arc<C::Connection>> {
        self.resolve_connection(Some(name), None).await
    }

    /// Connection for the configured default name
    pub async fn default_connection(&self) -> Result<Arc<C::Connection>> {
        self.resolve_connection(None, None).await
    }

    /// Read the configuration for `name`.
    ///
    /// A name with no configuration yields the all-defaults config; keys
    /// missing from a partial subtree take their defaults.
    ///
    /// # Errors
    ///
    /// Source lookup failures, and values of the wrong shape
    /// ([`Error::InvalidValue`] naming the full key).
    pub fn resolve_config(&self, name: &str) -> Result<ConnectionConfig> {
        check_name(name)?;
        let key = self.inner.options.connection_key(name);
        let raw = self.inner.source.get(&key)?;
        if raw.is_none() {
            tracing::debug!(key = %key, "no configuration for connection, using defaults");
        }
        ConnectionConfig::from_value_at(&key, raw.as_ref().unwrap_or(&Value::Null))
    }

    /// Configured default connection name, if any.
    ///
    /// Never fails: a lookup error or a value that is not a non-empty
    /// string is logged and treated as absent.
    pub fn resolve_default_config_name(&self) -> Option<String> {
        let key = self.inner.options.default_connection_key();
        match self.inner.source.get(&key) {
            Ok(Some(Value::String(name))) if !name.is_empty() => Some(name),
            Ok(None) | Ok(Some(Value::Null)) | Ok(Some(Value::String(_))) => None,
            Ok(Some(other)) => {
                tracing::warn!(
                    key = %key,
                    value = %other,
                    "default connection name is not a string, ignoring"
                );
                None
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "failed to read default connection name");
                None
            }
        }
    }

    /// Evict and close the cached connection for `name`.
    ///
    /// `name` is resolved like in [`resolve_connection`](Self::resolve_connection).
    /// Returns whether a connection was cached. Callers still holding the
    /// handle see it closed. An in-flight construction is left alone.
    pub async fn close(&self, name: Option<&str>) -> Result<bool> {
        let name = self.effective_name(name)?;
        let Some(conn) = flight::evict(&self.inner.slots, &name) else {
            return Ok(false);
        };
        gauges::cached_connections(self.len());
        counters::connections_closed(1);

        match conn.close().await {
            Ok(()) => {
                tracing::info!(name = display_name(&name), "connection closed");
                Ok(true)
            }
            Err(e) => {
                tracing::warn!(name = display_name(&name), error = %e, "failed to close connection");
                Err(e)
            }
        }
    }

    /// Evict and close every cached connection.
    ///
    /// All connections are closed even if some fail; the first failure is
    /// returned. In-flight constructions are not affected.
    pub async fn close_all(&self) -> Result<()> {
        let drained = flight::drain(&self.inner.slots);
        gauges::cached_connections(self.len());
        if drained.is_empty() {
            return Ok(());
        }
        counters::connections_closed(drained.len());

        let results =
            futures::future::join_all(drained.iter().map(|(_, conn)| conn.close())).await;

        let mut first_err = None;
        for ((name, _), result) in drained.iter().zip(results) {
            if let Err(e) = result {
                tracing::warn!(name = display_name(name), error = %e, "failed to close connection");
                first_err.get_or_insert(e);
            }
        }
        tracing::info!(count = drained.len(), "closed cached connections");
        first_err.map_or(Ok(()), Err)
    }

    /// Refuse further resolution and close every cached connection.
    ///
    /// Constructions still in flight are closed when they complete and
    /// their callers receive [`Error::ResolverClosed`].
    pub async fn shutdown(&self) -> Result<()> {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            tracing::info!("shutting down connection resolver");
        }
        self.close_all().await
    }

    /// Whether [`shutdown`](Self::shutdown) has been called
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Whether a connection for `name` is cached.
    ///
    /// `name` is resolved like in [`resolve_connection`](Self::resolve_connection).
    pub fn is_cached(&self, name: Option<&str>) -> bool {
        match self.effective_name(name) {
            Ok(name) => flight::is_ready(&self.inner.slots, &name),
            Err(_) => false,
        }
    }

    /// Names with a cached connection; `None` is the unnamed slot
    pub fn cached_names(&self) -> Vec<Option<String>> {
        flight::ready_names(&self.inner.slots)
    }

    /// Number of cached connections
    pub fn len(&self) -> usize {
        flight::ready_count(&self.inner.slots)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn effective_name(&self, name: Option<&str>) -> Result<ConnectionName> {
        match name {
            Some(name) => {
                check_name(name)?;
                Ok(Some(name.to_string()))
            }
            None => Ok(self.resolve_default_config_name()),
        }
    }

    async fn lead(
        &self,
        flight: Flight<'_, C::Connection>,
        config_override: Option<ConnectionConfig>,
    ) -> Result<Arc<C::Connection>> {
        counters::cache_miss();
        let name = flight.name().clone();
        let started = Instant::now();

        let result = self
            .build(name.as_deref(), config_override)
            .instrument(tracing::info_span!(
                "resolve_connection",
                name = display_name(&name)
            ))
            .await;
        histograms::connect_duration(started.elapsed());

        match &result {
            Ok(_) => counters::connection_established(),
            Err(e) => {
                counters::connection_failed(e.category());
                tracing::warn!(
                    name = display_name(&name),
                    error = %e,
                    "failed to establish connection"
                );
            }
        }

        let (result, discarded) = flight.complete(result.map(Arc::new), || {
            self.is_closed().then_some(Error::ResolverClosed)
        });
        gauges::cached_connections(self.len());

        if let Some(conn) = discarded {
            tracing::info!(
                name = display_name(&name),
                "resolver shut down during construction, closing connection"
            );
            if let Err(e) = conn.close().await {
                tracing::warn!(name = display_name(&name), error = %e, "failed to close connection");
            }
        }
        result
    }

    async fn build(
        &self,
        name: Option<&str>,
        config_override: Option<ConnectionConfig>,
    ) -> Result<C::Connection> {
        let config = match (config_override, name) {
            (Some(config), _) => config,
            (None, Some(name)) => self.resolve_config(name)?,
            (None, None) => ConnectionConfig::default(),
        };
        tracing::debug!(endpoint = %config.endpoint(), "connecting");

        let conn = self.inner.connector.connect(&config).await?;
        tracing::info!(endpoint = %config.endpoint(), "connection cached");
        Ok(conn)
    }
}

impl<S, C: Connector> std::fmt::Debug for ConnectionResolver<S, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionResolver")
            .field("options", &self.inner.options)
            .field("cached", &flight::ready_names(&self.inner.slots))
            .field("closed", &self.inner.closed.load(Ordering::Relaxed))
            .finish()
    }
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Config("connection name must not be empty".into()));
    }
    Ok(())
}

fn display_name(name: &ConnectionName) -> &str {
    name.as_deref().unwrap_or("<default>")
}
