//! Backend connection establishment

use super::address::BackendAddress;
use super::dialer::{Dialer, TcpDialer};
use super::guard::TransportGuard;
use super::negotiate::{self, Negotiation};
use super::relay::relay_startup;
use super::state::DialState;
use super::tls::TlsConfig;
use super::transport::Transport;
use crate::error::{DialError, DialErrorKind, TlsRefused};
use crate::protocol::StartupParameters;
use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::Instrument;

/// Dial timeout applied when none is configured
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connector configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialerConfig {
    /// Bound on opening the transport (default: 5 seconds)
    pub connect_timeout: Duration,
    /// Set `TCP_NODELAY` on backend sockets (default: true)
    pub nodelay: bool,
}

impl Default for DialerConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            nodelay: true,
        }
    }
}

impl DialerConfig {
    /// Create a builder
    ///
    /// # Examples
    ///
    /// ```
    /// use sqlproxy_backend::DialerConfig;
    /// use std::time::Duration;
    ///
    /// let config = DialerConfig::builder()
    ///     .connect_timeout(Duration::from_secs(2))
    ///     .build();
    /// assert!(config.nodelay);
    /// ```
    pub fn builder() -> DialerConfigBuilder {
        DialerConfigBuilder {
            config: DialerConfig::default(),
        }
    }
}

/// Builder for [`DialerConfig`]
#[derive(Debug, Clone)]
pub struct DialerConfigBuilder {
    config: DialerConfig,
}

impl DialerConfigBuilder {
    /// Set the dial timeout
    pub fn connect_timeout(mut self, duration: Duration) -> Self {
        self.config.connect_timeout = duration;
        self
    }

    /// Enable or disable `TCP_NODELAY`
    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.config.nodelay = nodelay;
        self
    }

    /// Build the configuration
    pub fn build(self) -> DialerConfig {
        self.config
    }
}

/// Opens backend connections on behalf of proxied clients.
///
/// One call to [`establish`](Self::establish) per client session; calls are
/// independent and may run concurrently. The only state shared between calls
/// is the read-only configuration and a count of in-flight handshakes.
///
/// The count is diagnostics only: it is never read on the handshake path and
/// exists so callers can see that failed attempts released their transports.
#[derive(Debug)]
pub struct BackendConnector<D = TcpDialer> {
    dialer: Arc<D>,
    connect_timeout: Duration,
    pending: Arc<AtomicUsize>,
}

impl<D> Clone for BackendConnector<D> {
    fn clone(&self) -> Self {
        Self {
            dialer: self.dialer.clone(),
            connect_timeout: self.connect_timeout,
            pending: self.pending.clone(),
        }
    }
}

impl BackendConnector<TcpDialer> {
    /// TCP connector with default configuration
    pub fn tcp() -> Self {
        Self::new(DialerConfig::default())
    }

    /// TCP connector with the given configuration
    pub fn new(config: DialerConfig) -> Self {
        Self::with_dialer(TcpDialer::new(config.nodelay), config.connect_timeout)
    }
}

impl<D: Dialer> BackendConnector<D> {
    /// Connector using a custom dialer
    pub fn with_dialer(dialer: D, connect_timeout: Duration) -> Self {
        Self {
            dialer: Arc::new(dialer),
            connect_timeout,
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Configured dial timeout
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Number of transports currently held by unfinished handshakes
    pub fn pending_handshakes(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Open a connection to `address` and relay `params` over it.
    ///
    /// With a TLS policy the transport is first upgraded through `SSLRequest`
    /// negotiation; a backend that declines is an error, never a silent
    /// downgrade. Only the dial is time-bounded; later steps rely on the
    /// transport. Use [`establish_with_deadline`](Self::establish_with_deadline)
    /// to bound the whole handshake.
    ///
    /// On success the caller owns the returned transport. On failure the
    /// transport, if one was opened, has been closed.
    pub async fn establish(
        &self,
        params: &StartupParameters,
        address: &BackendAddress,
        tls: Option<&TlsConfig>,
    ) -> Result<Transport<D::Stream>, DialError> {
        self.run(params, address, tls, None).await
    }

    /// Like [`establish`](Self::establish), with every blocking step bounded
    /// by `deadline`.
    ///
    /// Expiry is reported as the kind of the step in progress, with an
    /// `io::ErrorKind::TimedOut` cause.
    pub async fn establish_with_deadline(
        &self,
        params: &StartupParameters,
        address: &BackendAddress,
        tls: Option<&TlsConfig>,
        deadline: Instant,
    ) -> Result<Transport<D::Stream>, DialError> {
        self.run(params, address, tls, Some(deadline)).await
    }

    async fn run(
        &self,
        params: &StartupParameters,
        address: &BackendAddress,
        tls: Option<&TlsConfig>,
        deadline: Option<Instant>,
    ) -> Result<Transport<D::Stream>, DialError> {
        let started = std::time::Instant::now();

        let result = self
            .handshake(params, address, tls, deadline)
            .instrument(tracing::debug_span!(
                "backend_dial",
                address = %address,
                tls = tls.is_some(),
                user = %params.user()
            ))
            .await;

        crate::metrics::counters::dial_completed(result.as_ref().err().map(DialError::kind));
        crate::metrics::histograms::dial_duration(started.elapsed());

        if let Err(err) = &result {
            tracing::warn!(
                address = %address,
                kind = %err.kind(),
                error = %err.display_chain(),
                "backend dial failed"
            );
        }
        result
    }

    async fn handshake(
        &self,
        params: &StartupParameters,
        address: &BackendAddress,
        tls: Option<&TlsConfig>,
        deadline: Option<Instant>,
    ) -> Result<Transport<D::Stream>, DialError> {
        let fail = |kind: DialErrorKind, cause: io::Error| DialError::new(kind, address.clone(), cause);

        // A timeout too large to represent leaves only the caller's deadline
        let connect_by = match (Instant::now().checked_add(self.connect_timeout), deadline) {
            (Some(timeout), Some(deadline)) => Some(timeout.min(deadline)),
            (timeout, deadline) => timeout.or(deadline),
        };
        let stream = within(connect_by, "connect", self.dialer.dial(address))
            .await
            .map_err(|e| fail(DialErrorKind::DialFailed, e))?;

        let mut guard = TransportGuard::new(stream, address.clone(), self.pending.clone());
        tracing::debug!("connected to backend");

        if let Some(tls) = tls {
            guard.advance(DialState::Negotiating);

            let transport = guard
                .transport_mut()
                .map_err(|e| fail(DialErrorKind::NegotiationWriteFailed, e))?;
            within(deadline, "SSLRequest write", negotiate::write_ssl_request(transport))
                .await
                .map_err(|e| fail(DialErrorKind::NegotiationWriteFailed, e))?;

            let transport = guard
                .transport_mut()
                .map_err(|e| fail(DialErrorKind::NegotiationReadFailed, e))?;
            let response = within(deadline, "SSLRequest response", negotiate::read_ssl_response(transport))
                .await
                .map_err(|e| fail(DialErrorKind::NegotiationReadFailed, e))?;

            if let Negotiation::Refused(response) = response {
                guard.advance(DialState::Rejected);
                tracing::debug!(response = response, "server rejected TLS");
                return Err(DialError::new(
                    DialErrorKind::NegotiationRejected,
                    address.clone(),
                    TlsRefused { response },
                ));
            }

            tracing::debug!("server accepted TLS, upgrading connection");
            // Handshake failures surface as relay failures: the encrypted
            // session is what the relay writes through.
            guard
                .upgrade(|stream| within(deadline, "TLS handshake", negotiate::upgrade(stream, tls, address)))
                .await
                .map_err(|e| fail(DialErrorKind::RelayFailed, e))?;
            tracing::debug!("TLS connection established");
        }

        let transport = guard
            .transport_mut()
            .map_err(|e| fail(DialErrorKind::RelayFailed, e))?;
        within(deadline, "startup relay", relay_startup(transport, params))
            .await
            .map_err(|e| fail(DialErrorKind::RelayFailed, e))?;

        let transport = guard
            .commit()
            .map_err(|e| fail(DialErrorKind::RelayFailed, e))?;
        tracing::debug!(bytes = params.encoded_len(), "startup message relayed");
        Ok(transport)
    }
}

/// Run `fut` until `deadline`, turning expiry into a `TimedOut` error
async fn bounded<T>(
    deadline: Instant,
    step: &'static str,
    fut: impl Future<Output = io::Result<T>>,
) -> io::Result<T> {
    match tokio::time::timeout_at(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("{} timed out", step),
        )),
    }
}

async fn within<T>(
    deadline: Option<Instant>,
    step: &'static str,
    fut: impl Future<Output = io::Result<T>>,
) -> io::Result<T> {
    match deadline {
        Some(deadline) => bounded(deadline, step, fut).await,
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio::sync::Mutex;

    /// Dialer handing out one pre-made in-memory stream
    struct DuplexDialer {
        stream: Mutex<Option<DuplexStream>>,
    }

    impl DuplexDialer {
        fn pair() -> (Self, DuplexStream) {
            let (client, server) = tokio::io::duplex(4096);
            (
                Self {
                    stream: Mutex::new(Some(client)),
                },
                server,
            )
        }
    }

    impl Dialer for DuplexDialer {
        type Stream = DuplexStream;

        async fn dial(&self, _address: &BackendAddress) -> io::Result<DuplexStream> {
            self.stream
                .lock()
                .await
                .take()
                .ok_or_else(|| io::Error::new(io::ErrorKind::ConnectionRefused, "already dialed"))
        }
    }

    /// Dialer that never completes, like a black-holed route
    struct BlackHoleDialer;

    impl Dialer for BlackHoleDialer {
        type Stream = DuplexStream;

        async fn dial(&self, _address: &BackendAddress) -> io::Result<DuplexStream> {
            std::future::pending().await
        }
    }

    fn params() -> StartupParameters {
        StartupParameters::builder()
            .user("root")
            .database("defaultdb")
            .build()
            .unwrap()
    }

    fn address() -> BackendAddress {
        BackendAddress::new("tenant-backend", 26257)
    }

    fn insecure_tls() -> TlsConfig {
        TlsConfig::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .unwrap()
    }

    #[test]
    fn test_dialer_config_defaults() {
        let config = DialerConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert!(config.nodelay);
        assert_eq!(
            BackendConnector::new(config).connect_timeout(),
            DEFAULT_CONNECT_TIMEOUT
        );
    }

    #[test]
    fn test_dialer_config_builder() {
        let config = DialerConfig::builder()
            .connect_timeout(Duration::from_millis(250))
            .nodelay(false)
            .build();
        assert_eq!(config.connect_timeout, Duration::from_millis(250));
        assert!(!config.nodelay);
    }

    #[tokio::test]
    async fn test_plaintext_relays_startup_first() {
        let (dialer, mut backend) = DuplexDialer::pair();
        let connector = BackendConnector::with_dialer(dialer, DEFAULT_CONNECT_TIMEOUT);

        let transport = connector
            .establish(&params(), &address(), None)
            .await
            .unwrap();
        assert!(!transport.is_tls());
        assert_eq!(connector.pending_handshakes(), 0);

        let expected = params().encode();
        let mut received = vec![0u8; expected.len()];
        backend.read_exact(&mut received).await.unwrap();
        assert_eq!(&received[..], &expected[..]);
    }

    #[tokio::test]
    async fn test_rejected_closes_transport() {
        let (dialer, mut backend) = DuplexDialer::pair();
        let connector = BackendConnector::with_dialer(dialer, DEFAULT_CONNECT_TIMEOUT);
        let tls = insecure_tls();

        let peer = tokio::spawn(async move {
            let mut request = [0u8; 8];
            backend.read_exact(&mut request).await.unwrap();
            backend.write_all(b"N").await.unwrap();
            let mut rest = Vec::new();
            backend.read_to_end(&mut rest).await.unwrap();
            (request, rest)
        });

        let err = connector
            .establish(&params(), &address(), Some(&tls))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), DialErrorKind::NegotiationRejected);
        assert_eq!(err.refused_response(), Some(b'N'));

        let (request, rest) = peer.await.unwrap();
        assert_eq!(request, [0x00, 0x00, 0x00, 0x08, 0x04, 0xD2, 0x16, 0x2F]);
        assert!(rest.is_empty());
        assert_eq!(connector.pending_handshakes(), 0);
    }

    #[tokio::test]
    async fn test_closed_before_response_is_read_failure() {
        let (dialer, mut backend) = DuplexDialer::pair();
        let connector = BackendConnector::with_dialer(dialer, DEFAULT_CONNECT_TIMEOUT);
        let tls = insecure_tls();

        let peer = tokio::spawn(async move {
            let mut request = [0u8; 8];
            backend.read_exact(&mut request).await.unwrap();
            drop(backend);
        });

        let err = connector
            .establish(&params(), &address(), Some(&tls))
            .await
            .unwrap_err();
        peer.await.unwrap();

        assert_eq!(err.kind(), DialErrorKind::NegotiationReadFailed);
        assert_eq!(
            err.io_error().map(|e| e.kind()),
            Some(io::ErrorKind::UnexpectedEof)
        );
        assert_eq!(connector.pending_handshakes(), 0);
    }

    #[tokio::test]
    async fn test_write_failure_is_negotiation_write_failed() {
        let (dialer, backend) = DuplexDialer::pair();
        drop(backend);
        let connector = BackendConnector::with_dialer(dialer, DEFAULT_CONNECT_TIMEOUT);

        let err = connector
            .establish(&params(), &address(), Some(&insecure_tls()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), DialErrorKind::NegotiationWriteFailed);
        assert_eq!(connector.pending_handshakes(), 0);
    }

    #[tokio::test]
    async fn test_relay_failure_without_tls() {
        let (dialer, backend) = DuplexDialer::pair();
        drop(backend);
        let connector = BackendConnector::with_dialer(dialer, DEFAULT_CONNECT_TIMEOUT);

        let err = connector
            .establish(&params(), &address(), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), DialErrorKind::RelayFailed);
        assert!(err.to_string().contains("tenant-backend:26257"));
        assert_eq!(connector.pending_handshakes(), 0);
    }

    #[tokio::test]
    async fn test_unbounded_connect_timeout_dials() {
        let (dialer, mut backend) = DuplexDialer::pair();
        let connector = BackendConnector::with_dialer(dialer, Duration::MAX);

        let transport = connector
            .establish(&params(), &address(), None)
            .await
            .unwrap();
        assert!(!transport.is_tls());

        let expected = params().encode();
        let mut received = vec![0u8; expected.len()];
        backend.read_exact(&mut received).await.unwrap();
        assert_eq!(&received[..], &expected[..]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_connect_timeout_uses_deadline() {
        let connector = BackendConnector::with_dialer(BlackHoleDialer, Duration::MAX);

        let started = Instant::now();
        let err = connector
            .establish_with_deadline(&params(), &address(), None, started + Duration::from_secs(2))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), DialErrorKind::DialFailed);
        assert!(err.is_timeout());
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_tls_handshake_failure_is_relay_failed() {
        let (dialer, mut backend) = DuplexDialer::pair();
        let connector = BackendConnector::with_dialer(dialer, DEFAULT_CONNECT_TIMEOUT);

        // Accept, then answer the ClientHello with garbage
        let peer = tokio::spawn(async move {
            let mut request = [0u8; 8];
            backend.read_exact(&mut request).await.unwrap();
            backend.write_all(b"S").await.unwrap();
            let mut hello = [0u8; 5];
            backend.read_exact(&mut hello).await.unwrap();
            backend.write_all(b"not a TLS record").await.unwrap();
            let mut rest = Vec::new();
            let _ = backend.read_to_end(&mut rest).await;
        });

        let err = connector
            .establish(&params(), &address(), Some(&insecure_tls()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), DialErrorKind::RelayFailed);
        peer.await.unwrap();
        assert_eq!(connector.pending_handshakes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_black_hole_dial_times_out() {
        let connector = BackendConnector::with_dialer(BlackHoleDialer, DEFAULT_CONNECT_TIMEOUT);

        let started = Instant::now();
        let err = connector
            .establish(&params(), &address(), None)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), DialErrorKind::DialFailed);
        assert!(err.is_timeout());
        assert!(started.elapsed() >= DEFAULT_CONNECT_TIMEOUT);
        assert!(started.elapsed() < DEFAULT_CONNECT_TIMEOUT + Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_bounds_silent_negotiation() {
        let (dialer, mut backend) = DuplexDialer::pair();
        let connector = BackendConnector::with_dialer(dialer, DEFAULT_CONNECT_TIMEOUT);

        // Read the request, then never answer
        let peer = tokio::spawn(async move {
            let mut request = [0u8; 8];
            backend.read_exact(&mut request).await.unwrap();
            let mut rest = Vec::new();
            backend.read_to_end(&mut rest).await.unwrap();
            rest
        });

        let deadline = Instant::now() + Duration::from_secs(1);
        let err = connector
            .establish_with_deadline(&params(), &address(), Some(&insecure_tls()), deadline)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), DialErrorKind::NegotiationReadFailed);
        assert!(err.is_timeout());
        assert!(peer.await.unwrap().is_empty());
        assert_eq!(connector.pending_handshakes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_shorter_than_connect_timeout() {
        let connector = BackendConnector::with_dialer(BlackHoleDialer, DEFAULT_CONNECT_TIMEOUT);

        let started = Instant::now();
        let deadline = started + Duration::from_millis(500);
        let err = connector
            .establish_with_deadline(&params(), &address(), None, deadline)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), DialErrorKind::DialFailed);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_cancelled_handshake_closes_transport() {
        let (dialer, mut backend) = DuplexDialer::pair();
        let connector = BackendConnector::with_dialer(dialer, DEFAULT_CONNECT_TIMEOUT);
        let tls = insecure_tls();
        let p = params();
        let addr = address();

        {
            let fut = connector.establish(&p, &addr, Some(&tls));
            tokio::pin!(fut);
            // Drive until the SSLRequest is out and we are waiting for a reply
            let mut request = [0u8; 8];
            tokio::select! {
                _ = &mut fut => panic!("handshake finished without a response"),
                read = backend.read_exact(&mut request) => { read.unwrap(); }
            }
            assert_eq!(connector.pending_handshakes(), 1);
        }

        let mut rest = Vec::new();
        backend.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
        assert_eq!(connector.pending_handshakes(), 0);
    }
}
