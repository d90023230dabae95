//! amqp-resolver: named, lazily established AMQP broker connections
//!
//! Applications refer to broker connections by name. The resolver reads each
//! name's parameters from a hierarchical configuration source, establishes a
//! TLS-secured connection on first use and shares it with every later caller.
//!
//! This crate handles:
//! * Configuration lookup and defaulting (`config`)
//! * TCP + TLS connection establishment (`connection`)
//! * Per-name caching with single-flight construction (`resolver`)
//! * Connection metrics (`metrics`)
//!
//! ```no_run
//! use amqp_resolver::{ConnectionResolver, EnvOverlay, JsonConfig};
//!
//! # async fn run() -> amqp_resolver::Result<()> {
//! let config = EnvOverlay::new("APP", JsonConfig::from_file("config.json")?);
//! let resolver = ConnectionResolver::from_source(config);
//!
//! let orders = resolver.connection("orders").await?;
//! let again = resolver.connection("orders").await?;
//! assert!(std::sync::Arc::ptr_eq(&orders, &again));
//!
//! resolver.shutdown().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_debug_implementations)]

pub mod config;
pub mod connection;
pub mod error;
pub mod metrics;
pub mod resolver;

pub use config::{ConfigSource, ConnectionConfig, EnvOverlay, JsonConfig, SslOptions, TlsVersion};
pub use connection::{Connection, Connector, ManagedConnection, TlsConnector};
pub use error::{Error, Result};
pub use resolver::{ConnectionResolver, ResolverOptions};
