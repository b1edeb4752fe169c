//! Transport dialers
//!
//! The connector receives its dialer at construction time instead of reaching
//! for a global, so tests can substitute in-memory streams or redirect
//! addresses without touching shared state.

use super::address::BackendAddress;
use std::future::Future;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Opens raw byte streams to backend addresses.
///
/// Implementations do not need to bound their own duration; the connector
/// applies the dial timeout around [`Dialer::dial`].
pub trait Dialer: Send + Sync {
    /// Stream type produced by this dialer
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Open a stream to `address`
    fn dial(
        &self,
        address: &BackendAddress,
    ) -> impl Future<Output = io::Result<Self::Stream>> + Send;
}

/// Dialer for TCP backends
#[derive(Debug, Clone)]
pub struct TcpDialer {
    nodelay: bool,
}

impl TcpDialer {
    /// Create a TCP dialer
    pub fn new(nodelay: bool) -> Self {
        Self { nodelay }
    }
}

impl Default for TcpDialer {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Dialer for TcpDialer {
    type Stream = TcpStream;

    async fn dial(&self, address: &BackendAddress) -> io::Result<TcpStream> {
        let stream = TcpStream::connect((address.host(), address.port())).await?;
        stream.set_nodelay(self.nodelay)?;
        Ok(stream)
    }
}
