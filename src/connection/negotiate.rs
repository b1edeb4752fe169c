//! SSLRequest negotiation
//!
//! Runs on an already-open plaintext stream:
//! 1. write the 8-byte SSLRequest
//! 2. read exactly one response byte; only `S` accepts
//! 3. wrap the stream in a client-side TLS session
//!
//! Each step is separate so the connector can classify its failures
//! independently. Nothing here writes the startup message.

use super::address::BackendAddress;
use super::tls::TlsConfig;
use crate::protocol::constants::SSL_ACCEPT;
use crate::protocol::{encode_message, FrontendMessage};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

/// Backend answer to an SSLRequest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Negotiation {
    /// Backend answered `S`
    Accepted,
    /// Backend answered with any other byte
    Refused(u8),
}

/// Send the SSLRequest
pub(crate) async fn write_ssl_request<S>(stream: &mut S) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let request = encode_message(&FrontendMessage::SslRequest);
    stream.write_all(&request).await?;
    stream.flush().await
}

/// Read the single-byte SSLRequest response.
///
/// Exactly one byte is consumed so that anything the backend sends after it
/// is left for the TLS handshake rather than treated as plaintext.
pub(crate) async fn read_ssl_response<S>(stream: &mut S) -> io::Result<Negotiation>
where
    S: AsyncRead + Unpin,
{
    let response = stream.read_u8().await?;
    Ok(match response {
        SSL_ACCEPT => Negotiation::Accepted,
        other => Negotiation::Refused(other),
    })
}

/// Perform the client side of the TLS handshake over `stream`
pub(crate) async fn upgrade<S>(
    stream: S,
    tls_config: &TlsConfig,
    address: &BackendAddress,
) -> io::Result<TlsStream<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let server_name = tls_config
        .server_name_for(address)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

    let connector = TlsConnector::from(tls_config.client_config());
    connector.connect(server_name, stream).await
}
