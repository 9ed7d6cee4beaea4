//! Renders drone, pilot, home, and sensor-status events to CoT XML,
//! including `<track>`, Remote-ID-derived remarks, and pilot/home markers.

use crate::model::{DroneObservation, SensorStatus, DRONE_ID_PREFIX};
use chrono::{DateTime, Utc};
use std::fmt::Write as _;
use std::time::Duration;

const HOW: &str = "m-g";
const DEFAULT_STALE: Duration = Duration::from_secs(600);
const SURFACE_DOT_TYPE: &str = "b-m-p-s-m";
const ROTORCRAFT_FALLBACK_TYPE: &str = "a-u-A-M-H-R";

/// Maps a Remote-ID UA-type index to its CoT event type, falling back to
/// rotorcraft for unknown or absent indices.
fn ua_type_to_cot(ua_type: Option<u8>) -> &'static str {
    match ua_type {
        Some(1) => "a-f-A-f",            // Aeroplane / fixed wing
        Some(2) => "a-u-A-M-H-R",        // Helicopter / multirotor
        Some(3) => "a-u-A-M-H-R",        // Gyroplane
        Some(4) => "a-u-A-M-H-R",        // VTOL
        Some(5) => "a-f-A-f",            // Ornithopter
        Some(6) => "a-f-A-f",            // Glider
        Some(7..=15) => SURFACE_DOT_TYPE, // Kite, balloon, airship, ...
        _ => ROTORCRAFT_FALLBACK_TYPE,
    }
}

/// Escapes the five XML special characters, matching
/// `xml.sax.saxutils.escape`'s default entity set.
pub fn xml_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn format_cot_time(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

fn base_id(id: &str) -> &str {
    id.strip_prefix(DRONE_ID_PREFIX).unwrap_or(id)
}

struct EventSkeleton {
    uid: String,
    cot_type: String,
    now: DateTime<Utc>,
    stale: DateTime<Utc>,
    lat: f64,
    lon: f64,
    hae: f64,
}

fn stale_time(now: DateTime<Utc>, stale_offset_secs: Option<f64>) -> DateTime<Utc> {
    match stale_offset_secs {
        Some(secs) => now + chrono::Duration::milliseconds((secs * 1000.0) as i64),
        None => now + chrono::Duration::from_std(DEFAULT_STALE).unwrap(),
    }
}

fn render_skeleton(skeleton: &EventSkeleton, detail: &str) -> String {
    let mut xml = String::new();
    write!(
        xml,
        concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
            "<event version=\"2.0\" uid=\"{uid}\" type=\"{etype}\" ",
            "time=\"{time}\" start=\"{start}\" stale=\"{stale}\" how=\"{how}\">\n",
            "  <point lat=\"{lat}\" lon=\"{lon}\" hae=\"{hae}\" ce=\"35.0\" le=\"999999\"/>\n",
            "{detail}",
            "</event>\n"
        ),
        uid = skeleton.uid,
        etype = skeleton.cot_type,
        time = format_cot_time(skeleton.now),
        start = format_cot_time(skeleton.now),
        stale = format_cot_time(skeleton.stale),
        how = HOW,
        lat = skeleton.lat,
        lon = skeleton.lon,
        hae = skeleton.hae,
        detail = detail,
    )
    .unwrap();
    xml
}

fn drone_remarks(obs: &DroneObservation) -> String {
    format!(
        "MAC: {mac}, RSSI: {rssi}dBm; ID Type: {id_type}; UA Type: {ua_name} ({ua_type}); \
         Operator ID: [{op_type}: {op_id}]; Speed: {speed} m/s; Vert Speed: {vspeed} m/s; \
         Altitude: {alt} m; AGL: {agl} m; Course: {course}\u{00b0}; Index: {index}; Runtime: {runtime}s",
        mac = obs.mac,
        rssi = obs.rssi,
        id_type = obs.id_type,
        ua_name = obs.ua_type_name,
        ua_type = obs.ua_type.map(|v| v.to_string()).unwrap_or_default(),
        op_type = obs.operator_id_type,
        op_id = obs.operator_id,
        speed = obs.speed,
        vspeed = obs.vert_speed,
        alt = obs.geodetic_altitude,
        agl = obs.height_agl,
        course = obs.direction.unwrap_or(0.0),
        index = obs.index,
        runtime = obs.runtime,
    )
}

/// Renders the drone track/point event. `unique` selects the UID policy:
/// a fresh timestamped UID (so downstream tools draw a track) vs. the
/// stable drone id (so downstream tools show a single moving point).
pub fn render_drone_event(obs: &DroneObservation, unique: bool, stale_offset_secs: f64) -> String {
    let now = Utc::now();
    let uid = if unique {
        format!("{}-{}", obs.id, now.format("%Y%m%dT%H%M%SZ"))
    } else {
        obs.id.clone()
    };
    let skeleton = EventSkeleton {
        uid,
        cot_type: ua_type_to_cot(obs.ua_type).to_string(),
        now,
        stale: stale_time(now, Some(stale_offset_secs)),
        lat: obs.lat,
        lon: obs.lon,
        hae: obs.geodetic_altitude,
    };

    let detail = format!(
        concat!(
            "  <detail>\n",
            "    <contact callsign=\"{callsign}\" endpoint=\"\" phone=\"\"/>\n",
            "    <precisionlocation geopointsrc=\"gps\" altsrc=\"gps\"/>\n",
            "    <track course=\"{course}\" speed=\"{speed}\"/>\n",
            "    <remarks>{remarks}</remarks>\n",
            "    <color argb=\"-256\"/>\n",
            "    <usericon iconsetpath=\"34ae1613-9645-4222-a9d2-e5f243dea2865/Military/Ground_Vehicle.png\"/>\n",
            "  </detail>\n"
        ),
        callsign = xml_escape(&obs.id),
        course = obs.direction.unwrap_or(0.0),
        speed = obs.speed,
        remarks = xml_escape(&drone_remarks(obs)),
    );

    render_skeleton(&skeleton, &detail)
}

fn render_point_marker(uid: &str, callsign: &str, lat: f64, lon: f64, hae: f64, remarks: &str) -> String {
    let now = Utc::now();
    let skeleton = EventSkeleton {
        uid: uid.to_string(),
        cot_type: SURFACE_DOT_TYPE.to_string(),
        now,
        stale: stale_time(now, None),
        lat,
        lon,
        hae,
    };
    let detail = format!(
        concat!(
            "  <detail>\n",
            "    <contact callsign=\"{callsign}\" endpoint=\"\" phone=\"\"/>\n",
            "    <precisionlocation geopointsrc=\"gps\" altsrc=\"gps\"/>\n",
            "    <remarks>{remarks}</remarks>\n",
            "    <color argb=\"-256\"/>\n",
            "  </detail>\n"
        ),
        callsign = xml_escape(callsign),
        remarks = xml_escape(remarks),
    );
    render_skeleton(&skeleton, &detail)
}

/// Renders the pilot-position marker. Caller must first check
/// `obs.has_operator_position()`.
pub fn render_pilot_event(obs: &DroneObservation) -> String {
    let base = base_id(&obs.id);
    let uid = format!("pilot-{base}");
    render_point_marker(
        &uid,
        &uid,
        obs.operator_lat,
        obs.operator_lon,
        obs.geodetic_altitude,
        &format!("Pilot location for drone {}", obs.id),
    )
}

/// Renders the home-position marker. Caller must first check
/// `obs.has_home_position()`.
pub fn render_home_event(obs: &DroneObservation) -> String {
    let base = base_id(&obs.id);
    let uid = format!("home-{base}");
    render_point_marker(
        &uid,
        &uid,
        obs.home_lat,
        obs.home_lon,
        obs.geodetic_altitude,
        &format!("Home location for drone {}", obs.id),
    )
}

/// Renders the host-system health event. Caller must first check
/// `!status.is_positionless()`.
pub fn render_status_event(status: &SensorStatus) -> String {
    let uid = status.id();
    let now = Utc::now();
    let skeleton = EventSkeleton {
        uid: uid.clone(),
        cot_type: SURFACE_DOT_TYPE.to_string(),
        now,
        stale: stale_time(now, None),
        lat: status.lat,
        lon: status.lon,
        hae: status.alt,
    };

    let mut remarks = format!(
        "CPU Usage: {cpu}%, Memory Total: {mem_total:.2} MiB, Memory Available: {mem_avail:.2} MiB, \
         Disk Total: {disk_total:.2} MiB, Disk Used: {disk_used:.2} MiB, Temperature: {temp}\u{00b0}C, \
         Uptime: {uptime} seconds",
        cpu = status.cpu_usage,
        mem_total = status.memory_total_mib,
        mem_avail = status.memory_available_mib,
        disk_total = status.disk_total_mib,
        disk_used = status.disk_used_mib,
        temp = status.temperature_c,
        uptime = status.uptime_secs,
    );
    if let Some(pluto) = status.pluto_temp_c {
        let _ = write!(remarks, ", Pluto Temp: {pluto}\u{00b0}C");
    }
    if let Some(zynq) = status.zynq_temp_c {
        let _ = write!(remarks, ", Zynq Temp: {zynq}\u{00b0}C");
    }

    let detail = format!(
        concat!(
            "  <detail>\n",
            "    <contact endpoint=\"\" phone=\"\" callsign=\"{callsign}\"/>\n",
            "    <precisionlocation geopointsrc=\"gps\" altsrc=\"gps\"/>\n",
            "    <remarks>{remarks}</remarks>\n",
            "    <color argb=\"-256\"/>\n",
            "    <usericon iconsetpath=\"34ae1613-9645-4222-a9d2-e5f243dea2865/Military/Ground_Vehicle.png\"/>\n",
            "  </detail>\n"
        ),
        callsign = xml_escape(&uid),
        remarks = xml_escape(&remarks),
    );

    render_skeleton(&skeleton, &detail)
}
