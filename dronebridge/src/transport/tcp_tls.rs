//! Reconnecting TCP/TLS sink.
//!
//! A background task owns the connection lifecycle; `send` only ever takes
//! a non-blocking peek at the socket slot. This mirrors the event loop's
//! concurrency model: the loop thread never blocks waiting for a reconnect,
//! it either sees a live socket or reports the transport down.

use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoff};
use rustls::pki_types::ServerName;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;

use super::Sink;

type Conn = BufWriter<TlsStream<TcpStream>>;

struct Inner {
    host: String,
    port: u16,
    connector: TlsConnector,
    socket: Mutex<Option<Conn>>,
    retry_count: AtomicU32,
    backoff_base: f64,
    backoff_cap: Duration,
    retry_limit: Option<u32>,
}

#[derive(Clone)]
pub struct TcpTlsSink {
    inner: Arc<Inner>,
}

impl TcpTlsSink {
    pub fn new(
        host: String,
        port: u16,
        tls_config: Arc<rustls::ClientConfig>,
        backoff_base: f64,
        backoff_cap: Duration,
        retry_limit: Option<u32>,
        cancel: CancellationToken,
    ) -> Self {
        let inner = Arc::new(Inner {
            host,
            port,
            connector: TlsConnector::from(tls_config),
            socket: Mutex::new(None),
            retry_count: AtomicU32::new(0),
            backoff_base,
            backoff_cap,
            retry_limit,
        });
        let sink = Self { inner };
        tokio::spawn(sink.clone().run_reconnect_loop(cancel));
        sink
    }

    async fn try_connect_once(&self) -> Result<Conn> {
        let addr = (self.inner.host.as_str(), self.inner.port);
        let tcp = TcpStream::connect(addr)
            .await
            .map_err(|e| BridgeError::TransportDown(format!("tcp connect failed: {e}")))?;
        tcp.set_nodelay(true).ok();

        let server_name = ServerName::try_from(self.inner.host.clone())
            .map_err(|e| BridgeError::TlsBundleError(format!("invalid TAK host name: {e}")))?;
        let tls = self
            .inner
            .connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| BridgeError::TransportDown(format!("tls handshake failed: {e}")))?;
        Ok(BufWriter::new(tls))
    }

    async fn connect(&self, cancel: &CancellationToken) -> Result<()> {
        let mut backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(500),
            multiplier: self.inner.backoff_base.max(1.0),
            max_interval: self.inner.backoff_cap,
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        };
        let mut retry = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(BridgeError::TransportDown("shutting down".into()));
            }
            match self.try_connect_once().await {
                Ok(conn) => {
                    *self.inner.socket.lock().await = Some(conn);
                    self.inner.retry_count.store(0, Ordering::SeqCst);
                    log::info!(
                        "connected to TAK server {}:{}",
                        self.inner.host,
                        self.inner.port
                    );
                    return Ok(());
                }
                Err(e) => {
                    if let Some(limit) = self.inner.retry_limit {
                        if retry >= limit {
                            log::error!(
                                "critical: giving up on TAK server {}:{} after {} retries: {e}",
                                self.inner.host,
                                self.inner.port,
                                retry
                            );
                            return Err(e);
                        }
                    }
                    let wait = backoff.next_backoff().unwrap_or(self.inner.backoff_cap);
                    log::warn!(
                        "TAK server {}:{} unreachable ({e}), retrying in {:.1}s",
                        self.inner.host,
                        self.inner.port,
                        wait.as_secs_f64()
                    );
                    self.inner.retry_count.store(retry + 1, Ordering::SeqCst);
                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {}
                        _ = cancel.cancelled() => {
                            return Err(BridgeError::TransportDown("shutting down".into()));
                        }
                    }
                    retry += 1;
                }
            }
        }
    }

    async fn run_reconnect_loop(self, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                return;
            }
            let disconnected = self.inner.socket.lock().await.is_none();
            if disconnected {
                if self.connect(&cancel).await.is_err() {
                    return;
                }
            }
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                _ = cancel.cancelled() => return,
            }
        }
    }
}

#[async_trait]
impl Sink for TcpTlsSink {
    async fn send(&self, bytes: &[u8]) -> Result<()> {
        let mut guard = match self.inner.socket.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                return Err(BridgeError::TransportDown(
                    "socket busy reconnecting".into(),
                ))
            }
        };
        match guard.as_mut() {
            Some(conn) => {
                if let Err(e) = conn.write_all(bytes).await {
                    *guard = None;
                    return Err(BridgeError::TransportDown(format!("send failed: {e}")));
                }
                if let Err(e) = conn.flush().await {
                    *guard = None;
                    return Err(BridgeError::TransportDown(format!("send failed: {e}")));
                }
                Ok(())
            }
            None => Err(BridgeError::TransportDown("no live socket".into())),
        }
    }

    async fn close(&self) {
        let mut guard = self.inner.socket.lock().await;
        if let Some(mut conn) = guard.take() {
            let _ = conn.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustls::RootCertStore;

    /// Builds a sink with no reconnect task running and no socket ever set,
    /// to exercise `send`'s "no live socket" path without real I/O.
    fn sink_with_no_live_socket() -> TcpTlsSink {
        let _ = rustls::crypto::ring::default_provider().install_default();
        let config = rustls::ClientConfig::builder()
            .with_root_certificates(RootCertStore::empty())
            .with_no_client_auth();
        let inner = Inner {
            host: "127.0.0.1".to_string(),
            port: 1,
            connector: TlsConnector::from(Arc::new(config)),
            socket: Mutex::new(None),
            retry_count: AtomicU32::new(0),
            backoff_base: 2.0,
            backoff_cap: Duration::from_secs(60),
            retry_limit: Some(0),
        };
        TcpTlsSink {
            inner: Arc::new(inner),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn send_fails_with_transport_down_while_no_socket_is_live() {
        let sink = sink_with_no_live_socket();
        let result = sink.send(b"<event/>").await;
        assert!(matches!(result, Err(BridgeError::TransportDown(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn close_on_a_never_connected_sink_is_a_no_op() {
        let sink = sink_with_no_live_socket();
        sink.close().await;
        sink.close().await;
    }
}
