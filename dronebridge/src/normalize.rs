//! Reconciles the several incompatible Remote-ID message shapes emitted by
//! the sensor node into a canonical [`DroneObservation`].
//!
//! The wire shape is one decoded JSON value per inbound frame: either an
//! array of sub-objects or a single object. Each sub-object is matched
//! against the handful of recognized shapes (`Basic ID`, `Location/Vector
//! Message`, `Self-ID Message`, `System Message`, the top-level `MAC`/`RSSI`
//! pair, and `AUX_ADV_IND`/`aext`) and folds into a running
//! [`ObservationBuilder`]. Anything else is tolerated and ignored.

use crate::model::{DroneObservation, DRONE_ID_PREFIX};
use serde_json::Value;

const SERIAL_NUMBER_ID_TYPE: &str = "Serial Number (ANSI/CTA-2063-A)";
const CAA_REGISTRATION_ID_TYPE: &str = "CAA Registration ID";

/// Reads a numeric field, tolerantly coercing non-numeric or missing values
/// to zero.
fn get_f64(obj: &Value, key: &str) -> f64 {
    obj.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

fn get_i64(obj: &Value, key: &str) -> i64 {
    obj.get(key)
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
        .unwrap_or(0)
}

fn get_str(obj: &Value, key: &str) -> String {
    obj.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Accumulates fields from every recognized sub-object shape into a working
/// observation: an explicit builder over known shapes rather than dynamic
/// field access on a loosely typed map.
#[derive(Default)]
struct ObservationBuilder {
    obs: DroneObservation,
    id_set: bool,
    id_is_serial: bool,
}

impl ObservationBuilder {
    fn set_identifier(&mut self, candidate: &str, id_type: &str) {
        if candidate.is_empty() {
            return;
        }
        if self.id_is_serial {
            // A serial-number id already won; never overwrite it.
            return;
        }
        let is_serial = id_type == SERIAL_NUMBER_ID_TYPE;
        let is_caa = id_type == CAA_REGISTRATION_ID_TYPE;
        if is_serial {
            self.obs.id = candidate.to_string();
            self.id_set = true;
            self.id_is_serial = true;
        } else if is_caa && !self.id_set {
            self.obs.id = candidate.to_string();
            self.id_set = true;
        }
    }

    fn fold_top_level(&mut self, obj: &Value) {
        if let Some(mac) = obj.get("MAC").and_then(Value::as_str) {
            self.obs.mac = mac.to_string();
        }
        if obj.get("RSSI").is_some() {
            self.obs.rssi = get_i64(obj, "RSSI") as i32;
        }
    }

    fn fold_aux_adv_ind(&mut self, obj: &Value) {
        if let Some(aux) = obj.get("AUX_ADV_IND") {
            self.obs.rssi = get_i64(aux, "rssi") as i32;
        }
        if let Some(adv_a) = obj
            .get("aext")
            .and_then(|a| a.get("AdvA"))
            .and_then(Value::as_str)
        {
            if let Some(token) = adv_a.split_whitespace().next() {
                self.obs.mac = token.to_string();
            }
        }
    }

    fn fold_basic_id(&mut self, basic: &Value) {
        let id_type = get_str(basic, "id_type");
        let candidate = get_str(basic, "id");
        self.set_identifier(&candidate, &id_type);
        self.obs.id_type = id_type;
        if let Some(mac) = basic.get("MAC").and_then(Value::as_str) {
            self.obs.mac = mac.to_string();
        }
        if basic.get("RSSI").is_some() {
            self.obs.rssi = get_i64(basic, "RSSI") as i32;
        }
    }

    fn fold_location_vector(&mut self, loc: &Value) {
        self.obs.lat = get_f64(loc, "latitude");
        self.obs.lon = get_f64(loc, "longitude");
        self.obs.speed = get_f64(loc, "speed");
        self.obs.vert_speed = get_f64(loc, "vert_speed");
        self.obs.geodetic_altitude = get_f64(loc, "geodetic_altitude");
        self.obs.height_agl = get_f64(loc, "height_agl");
        if let Some(heading) = loc.get("direction").and_then(Value::as_f64) {
            self.obs.direction = Some(heading);
        }
        if let Some(ew) = loc.get("ew_dir").and_then(Value::as_str) {
            self.obs.ew_dir = ew.to_string();
        }
        if let Some(op_status) = loc.get("op_status").and_then(Value::as_str) {
            self.obs.op_status = op_status.to_string();
        }
        if let Some(height_type) = loc.get("height_type").and_then(Value::as_str) {
            self.obs.height_type = height_type.to_string();
        }
        if let Some(mult) = loc.get("speed_multiplier").and_then(Value::as_f64) {
            self.obs.speed_multiplier = Some(mult);
        }
        if let Some(palt) = loc.get("pressure_altitude").and_then(Value::as_f64) {
            self.obs.pressure_altitude = Some(palt);
        }
        for (key, field) in [
            ("vertical_accuracy", &mut self.obs.vertical_accuracy),
            ("horizontal_accuracy", &mut self.obs.horizontal_accuracy),
            ("baro_accuracy", &mut self.obs.baro_accuracy),
            ("speed_accuracy", &mut self.obs.speed_accuracy),
        ] {
            if let Some(v) = loc.get(key).and_then(Value::as_str) {
                *field = v.to_string();
            }
        }
    }

    fn fold_self_id(&mut self, self_id: &Value) {
        if let Some(text) = self_id.get("text").and_then(Value::as_str) {
            self.obs.description = text.to_string();
        }
    }

    fn fold_system(&mut self, system: &Value) {
        self.obs.operator_lat = get_f64(system, "latitude");
        self.obs.operator_lon = get_f64(system, "longitude");
        if let (Some(home_lat), Some(home_lon)) = (
            system.get("home_latitude").and_then(Value::as_f64),
            system.get("home_longitude").and_then(Value::as_f64),
        ) {
            self.obs.home_lat = home_lat;
            self.obs.home_lon = home_lon;
        }
    }

    fn fold_enrichment(&mut self, obj: &Value) {
        if let Some(ua_type) = obj.get("ua_type").and_then(Value::as_u64) {
            self.obs.ua_type = Some(ua_type as u8);
        }
        if let Some(name) = obj.get("ua_type_name").and_then(Value::as_str) {
            self.obs.ua_type_name = name.to_string();
        }
        if let Some(v) = obj.get("operator_id_type").and_then(Value::as_str) {
            self.obs.operator_id_type = v.to_string();
        }
        if let Some(v) = obj.get("operator_id").and_then(Value::as_str) {
            self.obs.operator_id = v.to_string();
        }
        if let Some(v) = obj.get("timestamp").and_then(Value::as_str) {
            self.obs.source_timestamp = v.to_string();
        }
        if let Some(v) = obj.get("timestamp_accuracy").and_then(Value::as_str) {
            self.obs.timestamp_accuracy = v.to_string();
        }
        if let Some(v) = obj.get("index").and_then(Value::as_u64) {
            self.obs.index = v as u32;
        }
        if let Some(v) = obj.get("runtime").and_then(Value::as_u64) {
            self.obs.runtime = v as u32;
        }
        if let Some(v) = obj.get("caa_id").and_then(Value::as_str) {
            self.obs.caa_id = v.to_string();
        }
    }

    /// Walks one sub-object, recognizing it by its distinguishing keys.
    fn fold(&mut self, obj: &Value) {
        self.fold_top_level(obj);
        self.fold_aux_adv_ind(obj);
        self.fold_enrichment(obj);

        if let Some(basic) = obj.get("Basic ID") {
            self.fold_basic_id(basic);
        }
        if let Some(loc) = obj.get("Location/Vector Message") {
            self.fold_location_vector(loc);
        }
        if let Some(self_id) = obj.get("Self-ID Message") {
            self.fold_self_id(self_id);
        }
        if let Some(system) = obj.get("System Message") {
            self.fold_system(system);
        }
    }

    /// Finishes accumulation: returns `None` if no identifier was ever
    /// found, else the completed observation with the prefix enforced.
    fn finish(mut self) -> Option<DroneObservation> {
        if !self.id_set {
            return None;
        }
        if !self.obs.id.starts_with(DRONE_ID_PREFIX) {
            self.obs.id = format!("{DRONE_ID_PREFIX}{}", self.obs.id);
        }
        Some(self.obs)
    }
}

/// Parses one inbound telemetry frame into a canonical observation, or
/// `None` if the message carries no recognizable identifier.
///
/// Heading fallback (great-circle bearing from the previous known position)
/// is *not* computed here — it needs the previous fix, which only the
/// registry's per-drone record retains, and is applied at merge time in
/// [`crate::registry::DroneManager::upsert`].
pub fn parse(envelope: &Value) -> Option<DroneObservation> {
    let mut builder = ObservationBuilder::default();
    match envelope {
        Value::Array(items) => {
            for item in items {
                builder.fold(item);
            }
        }
        Value::Object(_) => builder.fold(envelope),
        _ => return None,
    }
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_envelope() -> Value {
        json!([
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
            {
                "Self-ID Message": { "text": "test" }
            }
        ])
    }

    #[test]
    fn parses_cold_start_hovering_drone() {
        let obs = parse(&sample_envelope()).unwrap();
        assert_eq!(obs.id, "drone-ABC");
        assert_eq!(obs.mac, "AA:BB:CC:DD:EE:FF");
        assert_eq!(obs.rssi, -60);
        assert_eq!(obs.lat, 40.0);
        assert_eq!(obs.lon, -75.0);
        assert_eq!(obs.geodetic_altitude, 100.0);
        assert_eq!(obs.description, "test");
    }

    #[test]
    fn missing_identifier_drops_message() {
        let envelope = json!([
            { "Location/Vector Message": { "latitude": 40.0, "longitude": -75.0 } }
        ]);
        assert!(parse(&envelope).is_none());
    }

    #[test]
    fn repeated_basic_id_keeps_first_serial_identifier() {
        let envelope = json!([
            {
                "Basic ID": {
                    "id_type": "Serial Number (ANSI/CTA-2063-A)",
                    "id": "FIRST"
                }
            },
            {
                "Basic ID": {
                    "id_type": "Serial Number (ANSI/CTA-2063-A)",
                    "id": "SECOND"
                }
            }
        ]);
        let obs = parse(&envelope).unwrap();
        assert_eq!(obs.id, "drone-FIRST");
    }

    #[test]
    fn caa_registration_id_used_when_no_serial_present() {
        let envelope = json!([
            {
                "Basic ID": {
                    "id_type": "CAA Registration ID",
                    "id": "CAA123"
                }
            }
        ]);
        let obs = parse(&envelope).unwrap();
        assert_eq!(obs.id, "drone-CAA123");
    }

    #[test]
    fn serial_id_wins_over_earlier_caa_id() {
        let envelope = json!([
            {
                "Basic ID": {
                    "id_type": "CAA Registration ID",
                    "id": "CAA123"
                }
            },
            {
                "Basic ID": {
                    "id_type": "Serial Number (ANSI/CTA-2063-A)",
                    "id": "SER456"
                }
            }
        ]);
        let obs = parse(&envelope).unwrap();
        assert_eq!(obs.id, "drone-SER456");
    }

    #[test]
    fn already_prefixed_identifier_is_not_doubled() {
        let envelope = json!([
            {
                "Basic ID": {
                    "id_type": "Serial Number (ANSI/CTA-2063-A)",
                    "id": "drone-ABC"
                }
            }
        ]);
        let obs = parse(&envelope).unwrap();
        assert_eq!(obs.id, "drone-ABC");
    }

    #[test]
    fn parsing_is_idempotent() {
        let envelope = sample_envelope();
        let a = parse(&envelope).unwrap();
        let b = parse(&envelope).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn aux_adv_ind_contributes_rssi_and_mac() {
        let envelope = json!([
            {
                "AUX_ADV_IND": { "rssi": -70 },
                "aext": { "AdvA": "11:22:33:44:55:66 (public)" }
            },
            {
                "Basic ID": {
                    "id_type": "Serial Number (ANSI/CTA-2063-A)",
                    "id": "XYZ"
                }
            }
        ]);
        let obs = parse(&envelope).unwrap();
        assert_eq!(obs.rssi, -70);
        assert_eq!(obs.mac, "11:22:33:44:55:66");
    }
}
