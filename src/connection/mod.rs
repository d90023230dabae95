//! Connection management
//!
//! This module handles:
//! * The connection factory seam (`Connector`, `ManagedConnection`)
//! * TCP + TLS establishment (`TlsConnector`, `Transport`)
//! * TLS configuration from `ssl_options` (`TlsSettings`)
//! * Connection lifecycle state

mod conn;
mod connector;
mod state;
mod tls;
mod transport;

pub use conn::Connection;
pub use connector::{Connector, ManagedConnection, TlsConnector};
pub use state::ConnectionState;
pub use tls::{parse_server_name, TlsSettings, TlsVerification};
pub use transport::Transport;
