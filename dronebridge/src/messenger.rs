//! Fans a rendered CoT event out to every enabled sink: unicast TAK
//! delivery completes (successfully or exhausted) before multicast
//! fan-out begins, and no sink failure is ever propagated back to the
//! event loop.

use crate::config::Config;
use crate::transport::Sink;
use std::time::Duration;

/// Owns the enabled egress sinks and the retry policy applied to each.
pub struct Messenger {
    unicast: Option<Box<dyn Sink>>,
    multicast: Option<Box<dyn Sink>>,
    retry_count: u32,
    retry_delay: Duration,
}

impl Messenger {
    pub fn new(
        unicast: Option<Box<dyn Sink>>,
        multicast: Option<Box<dyn Sink>>,
        config: &Config,
    ) -> Self {
        Self {
            unicast,
            multicast,
            retry_count: config.retry_count,
            retry_delay: config.retry_delay_duration(),
        }
    }

    /// Attempts `send` up to `retry_count` times total, sleeping
    /// `retry_delay` between attempts (never after the last one).
    async fn send_with_retry(sink: &dyn Sink, bytes: &[u8], retry_count: u32, retry_delay: Duration, label: &str) {
        for attempt in 1..=retry_count {
            match sink.send(bytes).await {
                Ok(()) => return,
                Err(e) => {
                    if attempt >= retry_count {
                        log::error!(
                            "critical: dropping CoT event after {attempt} attempts on {label} sink: {e}"
                        );
                        return;
                    }
                    log::warn!("{label} sink send failed (attempt {attempt}/{retry_count}): {e}");
                    tokio::time::sleep(retry_delay).await;
                }
            }
        }
    }

    /// Sends one already-serialized CoT event to every enabled sink.
    /// Unicast is attempted first and run to completion before multicast
    /// begins.
    pub async fn send_cot(&self, xml: &str) {
        let bytes = xml.as_bytes();

        if let Some(sink) = &self.unicast {
            Self::send_with_retry(sink.as_ref(), bytes, self.retry_count, self.retry_delay, "unicast").await;
        }
        if let Some(sink) = &self.multicast {
            Self::send_with_retry(sink.as_ref(), bytes, self.retry_count, self.retry_delay, "multicast").await;
        }
    }

    /// Closes every enabled sink. Safe to call more than once.
    pub async fn close(&self) {
        if let Some(sink) = &self.unicast {
            sink.close().await;
        }
        if let Some(sink) = &self.multicast {
            sink.close().await;
        }
    }
}
