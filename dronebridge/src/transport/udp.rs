//! UDP sink for the TAK protocol. One connected socket, one datagram per
//! event, no reconnect logic: UDP has no connection to lose.

use crate::error::Result;
use async_trait::async_trait;
use tokio::net::UdpSocket;

use super::Sink;

pub struct UdpSink {
    socket: UdpSocket,
    host: String,
    port: u16,
}

impl UdpSink {
    pub async fn new(host: String, port: u16) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect((host.as_str(), port)).await?;
        Ok(Self { socket, host, port })
    }
}

#[async_trait]
impl Sink for UdpSink {
    async fn send(&self, bytes: &[u8]) -> Result<()> {
        // A UDP send failure surfaces as a plain IOError (the `?`
        // conversion below), not a `TransportDown` — there is no
        // connection state to lose, only the one syscall.
        self.socket.send(bytes).await.map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!("udp send to {}:{} failed: {e}", self.host, self.port),
            )
        })?;
        Ok(())
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn sends_one_datagram_per_call_to_loopback_receiver() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let receiver_port = receiver.local_addr().unwrap().port();

        let sink = UdpSink::new("127.0.0.1".to_string(), receiver_port)
            .await
            .unwrap();
        sink.send(b"<event/>").await.unwrap();

        let mut buf = [0u8; 64];
        let (n, _) = receiver.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"<event/>");
    }
}
