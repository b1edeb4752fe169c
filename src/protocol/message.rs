//! Protocol message types

use super::startup::StartupParameters;

/// Frontend message (proxy → backend) sent while establishing a connection
#[derive(Debug, Clone, Copy)]
pub enum FrontendMessage<'a> {
    /// Startup message relayed on behalf of the client
    Startup(&'a StartupParameters),

    /// SSLRequest message (TLS negotiation)
    SslRequest,
}

/// First message a client sends on a new connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitialMessage {
    /// Startup message carrying the session parameters
    Startup(StartupParameters),

    /// Request to upgrade to TLS before the startup message
    SslRequest,

    /// Request to upgrade to GSSAPI encryption before the startup message
    GssEncRequest,

    /// Out-of-band request to cancel a running query
    CancelRequest {
        /// Backend process ID
        process_id: i32,
        /// Secret key issued in BackendKeyData
        secret_key: i32,
    },
}
