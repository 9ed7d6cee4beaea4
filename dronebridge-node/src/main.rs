use dronebridge::bridge::Bridge;
use dronebridge::config::{Config, TakProtocol};
use dronebridge::error::{BridgeError, Result};
use dronebridge::logging;
use dronebridge::messenger::Messenger;
use dronebridge::registry::DroneManager;
use dronebridge::transport::multicast::MulticastSink;
use dronebridge::transport::tcp_tls::TcpTlsSink;
use dronebridge::transport::tls_config::load_client_tls_config;
use dronebridge::transport::udp::UdpSink;
use dronebridge::transport::Sink;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use zenoh::prelude::r#async::*;
use zenoh::Session;

/// Opens a zenoh client session and wraps it in `Arc` — `declare_subscriber`
/// on an owned `Session` only yields a subscriber borrowing that session,
/// but `Bridge` holds its subscribers past the function that opens the
/// session, so they must be declared through the `Arc<Session>` impl that
/// hands back a `'static` subscriber instead.
async fn open_session(host: &str, port: u16) -> Result<Arc<Session>> {
    let mut config = zenoh::config::Config::default();
    config
        .set_mode(Some(zenoh::config::whatami::WhatAmI::Client))
        .map_err(|e| BridgeError::ConfigError(format!("zenoh config error: {e}")))?;
    let endpoint = format!("tcp/{host}:{port}");
    config.connect.endpoints.push(
        endpoint
            .parse()
            .map_err(|e| BridgeError::ConfigError(format!("invalid subscribe endpoint {endpoint}: {e}")))?,
    );

    let session = zenoh::open(config)
        .res()
        .await
        .map_err(BridgeError::ZenohError)?;
    Ok(Arc::new(session))
}

async fn build_unicast_sink(
    config: &Config,
    cancel: CancellationToken,
) -> Result<Option<Box<dyn Sink>>> {
    let (Some(host), Some(port)) = (config.tak_host.clone(), config.tak_port) else {
        return Ok(None);
    };

    match config.tak_protocol.unwrap_or(TakProtocol::Udp) {
        TakProtocol::Udp => {
            let sink = UdpSink::new(host, port).await?;
            Ok(Some(Box::new(sink) as Box<dyn Sink>))
        }
        TakProtocol::Tcp => {
            let cert = config
                .tls_cert_chain
                .as_ref()
                .ok_or_else(|| BridgeError::ConfigError("tak_protocol TCP requires tls_cert_chain".into()))?;
            let key = config
                .tls_private_key
                .as_ref()
                .ok_or_else(|| BridgeError::ConfigError("tak_protocol TCP requires tls_private_key".into()))?;
            let tls_config = load_client_tls_config(
                Path::new(cert),
                Path::new(key),
                config.tls_ca_chain.as_deref().map(Path::new),
                config.tls_skip_verify,
            )?;
            let sink = TcpTlsSink::new(
                host,
                port,
                tls_config,
                config.backoff_base,
                config.backoff_cap_duration(),
                config.retry_limit,
                cancel,
            );
            Ok(Some(Box::new(sink) as Box<dyn Sink>))
        }
    }
}

fn build_multicast_sink(config: &Config) -> Result<Option<Box<dyn Sink>>> {
    if !config.multicast_enabled {
        return Ok(None);
    }
    let address = config
        .multicast_address
        .as_ref()
        .ok_or_else(|| BridgeError::ConfigError("multicast_enabled requires multicast_address".into()))?
        .parse()
        .map_err(|e| BridgeError::ConfigError(format!("invalid multicast_address: {e}")))?;
    let port = config
        .multicast_port
        .ok_or_else(|| BridgeError::ConfigError("multicast_enabled requires multicast_port".into()))?;

    let sink = MulticastSink::new(
        address,
        port,
        config.multicast_ttl,
        config.multicast_interface.as_deref(),
    )?;
    Ok(Some(Box::new(sink) as Box<dyn Sink>))
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    logging::init_logger(config.debug);

    log::info!(
        "starting dronebridge, subscribing to {}:{}",
        config.subscribe_host,
        config.telemetry_port
    );

    let cancel = CancellationToken::new();

    let telemetry_session = open_session(&config.subscribe_host, config.telemetry_port).await?;
    let telemetry_sub = telemetry_session
        .declare_subscriber("**")
        .res()
        .await
        .map_err(BridgeError::ZenohError)?;

    let status_sub = match config.status_port {
        Some(status_port) => {
            let status_session = open_session(&config.subscribe_host, status_port).await?;
            Some(
                status_session
                    .declare_subscriber("**")
                    .res()
                    .await
                    .map_err(BridgeError::ZenohError)?,
            )
        }
        None => None,
    };

    let unicast = build_unicast_sink(&config, cancel.clone()).await?;
    let multicast = build_multicast_sink(&config)?;

    if unicast.is_none() && multicast.is_none() {
        log::warn!("neither a TAK sink nor multicast is configured; CoT events will be discarded");
    }

    let manager = DroneManager::new(&config);
    let messenger = Messenger::new(unicast, multicast, &config);
    let bridge = Bridge::new(telemetry_sub, status_sub, manager, messenger);

    let bridge_cancel = cancel.clone();
    let bridge_task = tokio::spawn(bridge.run(bridge_cancel));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("received ctrl-c, shutting down");
            cancel.cancel();
        }
        result = &mut bridge_task => {
            if let Ok(Err(e)) = result {
                log::error!("bridge loop exited with error: {e}");
            }
            return Ok(());
        }
    }

    bridge_task
        .await
        .map_err(|e| BridgeError::Unknown(format!("bridge task panicked: {e}")))??;
    Ok(())
}
