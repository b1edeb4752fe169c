//! Scoped ownership of a transport during the handshake
//!
//! From the moment a dial succeeds until the startup message has been relayed,
//! the transport belongs to a [`TransportGuard`]. Dropping the guard without
//! calling [`TransportGuard::commit`] closes the transport, which covers every
//! early return as well as cancellation of the handshake future.

use super::address::BackendAddress;
use super::state::DialState;
use super::transport::Transport;
use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_rustls::client::TlsStream;

pub(crate) struct TransportGuard<S> {
    transport: Option<Transport<S>>,
    state: DialState,
    address: BackendAddress,
    pending: Arc<AtomicUsize>,
}

impl<S> TransportGuard<S> {
    /// Take provisional ownership of a freshly dialed stream
    pub(crate) fn new(stream: S, address: BackendAddress, pending: Arc<AtomicUsize>) -> Self {
        pending.fetch_add(1, Ordering::AcqRel);
        let mut guard = Self {
            transport: Some(Transport::Plain(stream)),
            state: DialState::Start,
            address,
            pending,
        };
        guard.advance(DialState::Connected);
        guard
    }

    pub(crate) fn state(&self) -> DialState {
        self.state
    }

    pub(crate) fn advance(&mut self, next: DialState) {
        let from = self.state;
        match self.state.transition(next) {
            Ok(()) => tracing::trace!(%from, to = %next, "handshake state"),
            Err(err) => {
                debug_assert!(false, "invalid handshake transition {} -> {}", from, next);
                tracing::warn!(%from, to = %next, error = %err, "ignoring handshake transition");
            }
        }
    }

    pub(crate) fn transport_mut(&mut self) -> io::Result<&mut Transport<S>> {
        self.transport.as_mut().ok_or_else(released)
    }

    /// Replace the plain stream with a TLS session built on top of it.
    ///
    /// If `upgrade` fails the stream it consumed is dropped with it, so the
    /// guard is left empty and the socket is already closed.
    pub(crate) async fn upgrade<F, Fut>(&mut self, upgrade: F) -> io::Result<()>
    where
        F: FnOnce(S) -> Fut,
        Fut: Future<Output = io::Result<TlsStream<S>>>,
    {
        let stream = match self.transport.take() {
            Some(Transport::Plain(stream)) => stream,
            other => {
                self.transport = other;
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "transport is already TLS-encrypted",
                ));
            }
        };

        let tls = upgrade(stream).await?;
        self.transport = Some(Transport::Tls(Box::new(tls)));
        self.advance(DialState::Secured);
        Ok(())
    }

    /// Release the transport to the caller; cleanup is disarmed.
    pub(crate) fn commit(mut self) -> io::Result<Transport<S>> {
        let transport = self.transport.take().ok_or_else(released)?;
        self.advance(DialState::Relayed);
        Ok(transport)
    }

    /// Close any held transport and mark the attempt failed unless it
    /// already ended
    fn close(&mut self) {
        if let Some(transport) = self.transport.take() {
            tracing::debug!(
                address = %self.address,
                state = %self.state,
                tls = transport.is_tls(),
                "closing backend transport after failed handshake"
            );
            drop(transport);
        }
        // A failed upgrade has already consumed the transport
        if !self.state.is_terminal() {
            self.advance(DialState::Failed);
        }
    }
}

fn released() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "backend transport already released")
}

impl<S> Drop for TransportGuard<S> {
    fn drop(&mut self) {
        self.close();
        self.pending.fetch_sub(1, Ordering::AcqRel);
    }
}
