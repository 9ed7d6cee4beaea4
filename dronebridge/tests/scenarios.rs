//! End-to-end scenario tests wiring the normalizer, registry, and
//! serializer together the way `Bridge::run` does each tick, plus a
//! messenger-to-real-socket check — without a live zenoh session or TAK
//! server.

use dronebridge::cot;
use dronebridge::messenger::Messenger;
use dronebridge::normalize;
use dronebridge::registry::DroneManager;
use dronebridge::transport::udp::UdpSink;
use dronebridge::transport::Sink;
use serde_yaml;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;

fn test_config(max_drones: usize) -> dronebridge::config::Config {
    let yaml = format!(
        r#"
subscribe_host: "127.0.0.1"
telemetry_port: 4224
max_drones: {max_drones}
rate_limit: 1.0
keepalive_interval: 10.0
inactivity_timeout: 5.0
position_threshold: 0.00002
min_consecutive_for_unique: 2
"#
    );
    serde_yaml::from_str(&yaml).unwrap()
}

#[test]
fn scenario_cold_start_hovering_drone() {
    let envelope = serde_json::json!([
        {
            "Basic ID": {
                "id_type": "Serial Number (ANSI/CTA-2063-A)",
                "MAC": "AA:BB:CC:DD:EE:FF",
                "RSSI": -60,
                "id": "ABC"
            }
        },
        {
            "Location/Vector Message": {
                "latitude": 40.0,
                "longitude": -75.0,
                "speed": 0.0,
                "vert_speed": 0.0,
                "geodetic_altitude": 100.0,
                "height_agl": 50.0
            }
        },
        { "Self-ID Message": { "text": "test" } }
    ]);

    let obs = normalize::parse(&envelope).expect("message carries an identifier");
    assert_eq!(obs.id, "drone-ABC");

    let config = test_config(30);
    let mut manager = DroneManager::new(&config);
    let now = Instant::now();
    manager.upsert(obs, now);

    let due = manager.tick(now);
    assert_eq!(due.len(), 1);
    assert!(!due[0].unique);
    assert!(!due[0].retiring);

    let xml = cot::render_drone_event(&due[0].obs, due[0].unique, due[0].stale_offset_secs);
    assert!(xml.contains("uid=\"drone-ABC\""));
    assert!(xml.contains("type=\"a-u-A-M-H-R\""), "rotorcraft fallback for unknown ua_type");
    assert!(xml.contains("course=\"0\" speed=\"0\""));
}

#[test]
fn scenario_movement_eventually_emits_unique_uid() {
    let config = test_config(30);
    let mut manager = DroneManager::new(&config);

    let make_obs = |lat: f64| dronebridge::model::DroneObservation {
        id: "drone-MOVER".to_string(),
        lat,
        lon: -75.0,
        ..Default::default()
    };

    let t0 = Instant::now();
    manager.upsert(make_obs(40.0), t0);
    let first = manager.tick(t0);
    assert_eq!(first.len(), 1);
    assert!(!first[0].unique, "first emission is static");

    let displacement = 0.00003; // well above the ~2.2m threshold
    let t1 = t0 + Duration::from_secs(2);
    manager.upsert(make_obs(40.0 + displacement), t1);
    let second = manager.tick(t1);
    assert_eq!(second.len(), 1);
    assert!(!second[0].unique, "one displaced tick is not yet enough");

    let t2 = t1 + Duration::from_secs(2);
    manager.upsert(make_obs(40.0 + 2.0 * displacement), t2);
    let third = manager.tick(t2);
    assert_eq!(third.len(), 1);
    assert!(third[0].unique, "two consecutive displaced ticks go unique");

    let xml = cot::render_drone_event(&third[0].obs, third[0].unique, third[0].stale_offset_secs);
    assert!(xml.contains("uid=\"drone-MOVER-"), "unique emission carries a timestamped uid");
}

#[test]
fn scenario_eviction_drops_oldest_without_retirement_event() {
    let config = test_config(2);
    let mut manager = DroneManager::new(&config);
    let t0 = Instant::now();

    let obs = |id: &str| dronebridge::model::DroneObservation {
        id: id.to_string(),
        lat: 1.0,
        lon: 1.0,
        ..Default::default()
    };

    manager.upsert(obs("drone-X"), t0);
    manager.upsert(obs("drone-Y"), t0);
    manager.upsert(obs("drone-Z"), t0);

    assert_eq!(manager.len(), 2);
    assert!(!manager.contains("drone-X"));
    assert!(manager.contains("drone-Y"));
    assert!(manager.contains("drone-Z"));
}

#[test]
fn scenario_retirement_after_inactivity_timeout() {
    let config = test_config(30); // inactivity_timeout: 5.0s
    let mut manager = DroneManager::new(&config);
    let t0 = Instant::now();

    let obs = dronebridge::model::DroneObservation {
        id: "drone-STALE".to_string(),
        lat: 40.0,
        lon: -75.0,
        ..Default::default()
    };
    manager.upsert(obs, t0);
    manager.tick(t0);
    assert!(manager.contains("drone-STALE"));

    let t1 = t0 + Duration::from_secs(6);
    let due = manager.tick(t1);
    assert_eq!(due.len(), 1);
    assert!(due[0].retiring);

    assert_eq!(due[0].stale_offset_secs, 0.0, "retirement emits with stale == time");
    let xml = cot::render_drone_event(&due[0].obs, due[0].unique, due[0].stale_offset_secs);
    assert!(xml.contains("time=\"") && xml.contains("stale=\""));
    assert!(!manager.contains("drone-STALE"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn scenario_messenger_delivers_cot_over_real_udp_socket() {
    let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let receiver_port = receiver.local_addr().unwrap().port();

    let sink = UdpSink::new("127.0.0.1".to_string(), receiver_port)
        .await
        .unwrap();
    let config = test_config(30);
    let messenger = Messenger::new(Some(Box::new(sink) as Box<dyn Sink>), None, &config);

    let obs = dronebridge::model::DroneObservation {
        id: "drone-NET".to_string(),
        lat: 10.0,
        lon: 20.0,
        geodetic_altitude: 5.0,
        ..Default::default()
    };
    let xml = cot::render_drone_event(&obs, false, 60.0);
    messenger.send_cot(&xml).await;

    let mut buf = vec![0u8; 8192];
    let (n, _) = tokio::time::timeout(Duration::from_secs(1), receiver.recv_from(&mut buf))
        .await
        .expect("datagram arrives within timeout")
        .unwrap();
    let received = String::from_utf8_lossy(&buf[..n]);
    assert!(received.contains("uid=\"drone-NET\""));
    assert_eq!(received, xml, "the datagram is a verbatim copy of the rendered document");

    messenger.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn scenario_unicast_completes_before_multicast_begins() {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Instant as StdInstant;

    struct TimestampingSink {
        delay: Duration,
        observed_at: Arc<AtomicU64>,
        start: StdInstant,
    }

    #[async_trait::async_trait]
    impl Sink for TimestampingSink {
        async fn send(&self, _bytes: &[u8]) -> dronebridge::Result<()> {
            tokio::time::sleep(self.delay).await;
            self.observed_at
                .store(self.start.elapsed().as_micros() as u64, Ordering::SeqCst);
            Ok(())
        }
        async fn close(&self) {}
    }

    let start = StdInstant::now();
    let unicast_at = Arc::new(AtomicU64::new(0));
    let multicast_at = Arc::new(AtomicU64::new(0));

    let unicast = TimestampingSink {
        delay: Duration::from_millis(30),
        observed_at: unicast_at.clone(),
        start,
    };
    let multicast = TimestampingSink {
        delay: Duration::from_millis(1),
        observed_at: multicast_at.clone(),
        start,
    };

    let config = test_config(30);
    let messenger = Messenger::new(
        Some(Box::new(unicast) as Box<dyn Sink>),
        Some(Box::new(multicast) as Box<dyn Sink>),
        &config,
    );
    messenger.send_cot("<event/>").await;

    let unicast_us = unicast_at.load(Ordering::SeqCst);
    let multicast_us = multicast_at.load(Ordering::SeqCst);
    assert!(unicast_us > 0 && multicast_us > 0);
    assert!(
        unicast_us < multicast_us,
        "unicast (slower sink) must finish before multicast starts: {unicast_us} vs {multicast_us}"
    );
}
