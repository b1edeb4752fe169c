//! Fake backends for driving the connector over loopback sockets

#![allow(dead_code)]

use rustls_pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use sqlproxy_backend::{BackendAddress, StartupParameters, TlsConfig};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpListener;

/// The 8 bytes of an SSLRequest
pub const SSL_REQUEST: [u8; 8] = [0x00, 0x00, 0x00, 0x08, 0x04, 0xD2, 0x16, 0x2F];

/// Bind a loopback listener and return it with its address
pub async fn listener() -> (TcpListener, BackendAddress) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback listener");
    let addr = BackendAddress::from(listener.local_addr().expect("local addr"));
    (listener, addr)
}

/// An address nothing listens on
pub async fn dead_address() -> BackendAddress {
    let (listener, addr) = listener().await;
    drop(listener);
    addr
}

pub fn scenario_params() -> StartupParameters {
    StartupParameters::builder()
        .user("root")
        .database("defaultdb")
        .build()
        .expect("valid startup parameters")
}

/// Read one length-prefixed startup packet
pub async fn read_startup_packet<R: AsyncRead + Unpin>(stream: &mut R) -> Vec<u8> {
    let mut len = [0u8; 4];
    stream.read_exact(&mut len).await.expect("startup length");
    let total = i32::from_be_bytes(len) as usize;
    let mut packet = len.to_vec();
    packet.resize(total, 0);
    stream
        .read_exact(&mut packet[4..])
        .await
        .expect("startup body");
    packet
}

/// Self-signed server certificate for `localhost`
pub struct TestCert {
    pub server_config: Arc<rustls::ServerConfig>,
    pub cert: CertificateDer<'static>,
}

impl TestCert {
    pub fn generate() -> Self {
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
            .expect("generate self-signed certificate");
        let cert = certified.cert.der().clone();
        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
            certified.key_pair.serialize_der(),
        ));

        let server_config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![cert.clone()], key)
            .expect("server TLS config");

        Self {
            server_config: Arc::new(server_config),
            cert,
        }
    }

    /// Client policy trusting only this certificate
    pub fn client_policy(&self) -> TlsConfig {
        TlsConfig::builder()
            .add_root_certificate(self.cert.clone())
            .server_name("localhost")
            .build()
            .expect("client TLS config")
    }

    pub fn acceptor(&self) -> tokio_rustls::TlsAcceptor {
        tokio_rustls::TlsAcceptor::from(self.server_config.clone())
    }
}
