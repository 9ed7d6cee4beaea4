//! The cooperative event loop.
//!
//! A fixed poll timer races a telemetry subscriber and a status
//! subscriber under one `tokio::select!`. Every iteration, regardless of
//! which arm fired, ends by invoking the registry's `tick()` and draining
//! whatever it decided is due. All mutable state lives on this single
//! task; nothing here is shared across threads, so no locks guard it.

use crate::cot;
use crate::error::Result;
use crate::messenger::Messenger;
use crate::normalize;
use crate::registry::DroneManager;
use crate::status;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use zenoh::prelude::r#async::*;
use zenoh::subscriber::Subscriber;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct Bridge {
    telemetry_sub: Subscriber<'static, flume::Receiver<Sample>>,
    status_sub: Option<Subscriber<'static, flume::Receiver<Sample>>>,
    manager: DroneManager,
    messenger: Messenger,
}

impl Bridge {
    pub fn new(
        telemetry_sub: Subscriber<'static, flume::Receiver<Sample>>,
        status_sub: Option<Subscriber<'static, flume::Receiver<Sample>>>,
        manager: DroneManager,
        messenger: Messenger,
    ) -> Self {
        Self {
            telemetry_sub,
            status_sub,
            manager,
            messenger,
        }
    }

    /// Runs until cancelled. Consumes `self` so the subscribers, registry,
    /// and messenger can be held as independent local bindings — each
    /// `tokio::select!` arm then borrows only the piece of state it needs.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let Bridge {
            telemetry_sub,
            status_sub,
            mut manager,
            messenger,
        } = self;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    log::info!("shutdown requested, draining sinks");
                    break;
                }

                Ok(sample) = telemetry_sub.recv_async() => {
                    handle_telemetry(&mut manager, &sample);
                    run_tick(&mut manager, &messenger).await;
                }

                Ok(sample) = recv_status(&status_sub), if status_sub.is_some() => {
                    handle_status(&messenger, &sample).await;
                    run_tick(&mut manager, &messenger).await;
                }

                _ = tokio::time::sleep(POLL_INTERVAL) => {
                    run_tick(&mut manager, &messenger).await;
                }
            }
        }

        messenger.close().await;
        Ok(())
    }
}

async fn recv_status(
    sub: &Option<Subscriber<'static, flume::Receiver<Sample>>>,
) -> std::result::Result<Sample, flume::RecvError> {
    match sub {
        Some(sub) => sub.recv_async().await,
        None => std::future::pending().await,
    }
}

fn handle_telemetry(manager: &mut DroneManager, sample: &Sample) {
    let bytes = sample.value.payload.contiguous();
    let envelope: serde_json::Value = match serde_json::from_slice(&bytes) {
        Ok(v) => v,
        Err(e) => {
            log::warn!("dropping malformed telemetry message: {e}");
            return;
        }
    };
    if let Some(obs) = normalize::parse(&envelope) {
        manager.upsert(obs, Instant::now());
    }
}

async fn handle_status(messenger: &Messenger, sample: &Sample) {
    let bytes = sample.value.payload.contiguous();
    let payload: serde_json::Value = match serde_json::from_slice(&bytes) {
        Ok(v) => v,
        Err(e) => {
            log::warn!("dropping malformed status message: {e}");
            return;
        }
    };
    let Some(status) = status::parse(&payload) else {
        return;
    };
    if status.is_positionless() {
        log::debug!(
            "status from {} carries no position, suppressing emission",
            status.serial_number
        );
        return;
    }
    let xml = cot::render_status_event(&status);
    messenger.send_cot(&xml).await;
}

async fn run_tick(manager: &mut DroneManager, messenger: &Messenger) {
    let due = manager.tick(Instant::now());
    for emission in due {
        if emission.obs.is_positionless() {
            log::debug!(
                "drone {} carries no position, suppressing emission",
                emission.obs.id
            );
            continue;
        }

        let xml = cot::render_drone_event(&emission.obs, emission.unique, emission.stale_offset_secs);
        messenger.send_cot(&xml).await;

        if emission.emit_pilot {
            let xml = cot::render_pilot_event(&emission.obs);
            messenger.send_cot(&xml).await;
        }
        if emission.emit_home {
            let xml = cot::render_home_event(&emission.obs);
            messenger.send_cot(&xml).await;
        }
    }
}
