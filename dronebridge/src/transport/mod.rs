//! The three egress sinks. Each implements the same contract — `send` and
//! `close` — regardless of what sits underneath: a reconnecting TLS
//! stream, a single UDP socket, or a fan-out of multicast sockets.
//! [`crate::messenger::Messenger`] is the only caller.

pub mod multicast;
pub mod tcp_tls;
pub mod tls_config;
pub mod udp;

use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait Sink: Send + Sync {
    /// Sends one already-serialized CoT event. Must not block the caller
    /// beyond a single non-blocking check of the connection state plus the
    /// underlying write syscall.
    async fn send(&self, bytes: &[u8]) -> Result<()>;

    /// Releases any held resources. Safe to call more than once.
    async fn close(&self);
}
