//! Backend connection management
//!
//! This module handles:
//! * Dialing the backend under a bounded timeout
//! * SSLRequest negotiation and the TLS upgrade
//! * Relaying the client's startup message
//! * Closing the transport on every failed path

mod address;
mod backend;
mod dialer;
mod guard;
mod negotiate;
mod relay;
mod state;
mod tls;
mod transport;

pub use address::BackendAddress;
pub use backend::{BackendConnector, DialerConfig, DialerConfigBuilder, DEFAULT_CONNECT_TIMEOUT};
pub use dialer::{Dialer, TcpDialer};
pub use state::DialState;
pub use tls::{parse_server_name, SslMode, TlsConfig, TlsConfigBuilder};
pub use transport::Transport;
