//! Backend connection establishment for a multi-tenant Postgres wire-protocol proxy.
//!
//! Given the startup parameters a client sent to the proxy, this crate opens a
//! transport to the backend SQL node serving that client, optionally upgrades it
//! to TLS using the protocol's `SSLRequest` negotiation, and relays the client's
//! startup message so the backend sees the session as if the client had
//! connected directly.
//!
//! Every failure is classified into a [`DialError`] carrying a [`DialErrorKind`],
//! the backend address and the original cause. A transport opened by a failed
//! attempt is always closed before the error is returned.
//!
//! # Example
//!
//! ```no_run
//! # async fn example() -> sqlproxy_backend::Result<()> {
//! use sqlproxy_backend::{BackendAddress, BackendConnector, StartupParameters};
//!
//! let params = StartupParameters::builder()
//!     .user("root")
//!     .database("defaultdb")
//!     .build()?;
//! let address = BackendAddress::parse("10.0.0.12:26257")?;
//!
//! let connector = BackendConnector::tcp();
//! let transport = connector.establish(&params, &address, None).await?;
//! // The caller now owns `transport` and relays the session over it.
//! # drop(transport);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs, rust_2018_idioms)]

pub mod connection;
pub mod error;
pub mod metrics;
pub mod protocol;

pub use connection::{
    BackendAddress, BackendConnector, Dialer, DialerConfig, TcpDialer, TlsConfig, Transport,
};
pub use error::{DialError, DialErrorKind, Error, ErrorCode, Result, TlsRefused};
pub use protocol::StartupParameters;
