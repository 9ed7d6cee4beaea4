//! Parses the host-status subscription payload into a [`SensorStatus`].
//! Unlike drone telemetry this message shape is a single, already-
//! structured object — no heterogeneous-dialect reconciliation is needed,
//! only tolerant field extraction.

use crate::model::SensorStatus;
use serde_json::Value;

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

fn get_f64(obj: &Value, key: &str) -> f64 {
    obj.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

/// Parses one host-status frame. Returns `None` if the payload carries no
/// `serial_number`, since that becomes the stable entity identifier.
pub fn parse(payload: &Value) -> Option<SensorStatus> {
    let serial_number = payload.get("serial_number")?.as_str()?.to_string();

    let gps = payload.get("gps_data").cloned().unwrap_or(Value::Null);
    let stats = payload.get("system_stats").cloned().unwrap_or(Value::Null);
    let memory = stats.get("memory").cloned().unwrap_or(Value::Null);
    let disk = stats.get("disk").cloned().unwrap_or(Value::Null);
    let sdr = payload.get("ant_sdr_temps");

    Some(SensorStatus {
        serial_number,
        lat: get_f64(&gps, "latitude"),
        lon: get_f64(&gps, "longitude"),
        alt: get_f64(&gps, "altitude"),
        cpu_usage: get_f64(&stats, "cpu_usage"),
        // memory/disk arrive over the wire in bytes; the record (and CoT
        // remarks) carry MiB.
        memory_total_mib: get_f64(&memory, "total") / BYTES_PER_MIB,
        memory_available_mib: get_f64(&memory, "available") / BYTES_PER_MIB,
        disk_total_mib: get_f64(&disk, "total") / BYTES_PER_MIB,
        disk_used_mib: get_f64(&disk, "used") / BYTES_PER_MIB,
        temperature_c: get_f64(&stats, "temperature"),
        uptime_secs: get_f64(&stats, "uptime"),
        pluto_temp_c: sdr.and_then(|s| s.get("pluto_temp")).and_then(Value::as_f64),
        zynq_temp_c: sdr.and_then(|s| s.get("zynq_temp")).and_then(Value::as_f64),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_full_status_payload() {
        let payload = json!({
            "serial_number": "ABC123",
            "gps_data": {"latitude": 40.0, "longitude": -75.0, "altitude": 100.0},
            "system_stats": {
                "cpu_usage": 12.5,
                "memory": {"total": 8589934592.0, "available": 4294967296.0},
                "disk": {"total": 67108864000.0, "used": 12582912000.0},
                "temperature": 45.0,
                "uptime": 12345.0
            },
            "ant_sdr_temps": {"pluto_temp": 38.0, "zynq_temp": 41.0}
        });
        let status = parse(&payload).unwrap();
        assert_eq!(status.serial_number, "ABC123");
        assert_eq!(status.lat, 40.0);
        assert_eq!(status.cpu_usage, 12.5);
        // memory/disk arrive in bytes; the record holds MiB.
        assert_eq!(status.memory_total_mib, 8192.0);
        assert_eq!(status.memory_available_mib, 4096.0);
        assert_eq!(status.disk_total_mib, 64000.0);
        assert_eq!(status.disk_used_mib, 12000.0);
        assert_eq!(status.pluto_temp_c, Some(38.0));
    }

    #[test]
    fn missing_sdr_temps_are_none() {
        let payload = json!({
            "serial_number": "ABC123",
            "gps_data": {"latitude": 40.0, "longitude": -75.0, "altitude": 100.0},
            "system_stats": {"cpu_usage": 1.0, "memory": {}, "disk": {}, "temperature": 1.0, "uptime": 1.0}
        });
        let status = parse(&payload).unwrap();
        assert_eq!(status.pluto_temp_c, None);
        assert_eq!(status.zynq_temp_c, None);
    }

    #[test]
    fn missing_serial_number_drops_message() {
        let payload = json!({"gps_data": {"latitude": 1.0, "longitude": 2.0}});
        assert!(parse(&payload).is_none());
    }

    #[test]
    fn positionless_status_is_flagged_for_emission_guard() {
        let payload = json!({
            "serial_number": "ABC123",
            "gps_data": {"latitude": 0.0, "longitude": 0.0, "altitude": 0.0},
            "system_stats": {"cpu_usage": 1.0, "memory": {}, "disk": {}, "temperature": 1.0, "uptime": 1.0}
        });
        let status = parse(&payload).unwrap();
        assert!(status.is_positionless());
    }
}
