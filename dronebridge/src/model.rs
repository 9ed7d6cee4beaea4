use serde::{Deserialize, Serialize};

/// The fixed textual prefix every emitted drone identifier carries.
pub const DRONE_ID_PREFIX: &str = "drone-";

/// Canonical drone telemetry, produced by the normalizer from one inbound
/// Remote-ID message and consumed by the registry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DroneObservation {
    pub id: String,
    pub mac: String,
    pub rssi: i32,

    pub lat: f64,
    pub lon: f64,
    pub geodetic_altitude: f64,
    pub vert_speed: f64,
    pub speed: f64,
    pub height_agl: f64,

    pub operator_lat: f64,
    pub operator_lon: f64,
    pub home_lat: f64,
    pub home_lon: f64,

    pub description: String,

    pub id_type: String,
    pub ua_type: Option<u8>,
    pub ua_type_name: String,
    pub operator_id_type: String,
    pub operator_id: String,
    pub op_status: String,
    pub height_type: String,
    pub ew_dir: String,
    pub direction: Option<f64>,
    pub speed_multiplier: Option<f64>,
    pub pressure_altitude: Option<f64>,
    pub vertical_accuracy: String,
    pub horizontal_accuracy: String,
    pub baro_accuracy: String,
    pub speed_accuracy: String,
    pub source_timestamp: String,
    pub timestamp_accuracy: String,
    pub index: u32,
    pub runtime: u32,
    pub caa_id: String,
}

impl DroneObservation {
    /// True if lat/lon are both exactly zero — the "positionless" sentinel
    /// that suppresses emission.
    pub fn is_positionless(&self) -> bool {
        self.lat == 0.0 && self.lon == 0.0
    }

    pub fn has_operator_position(&self) -> bool {
        self.operator_lat != 0.0 || self.operator_lon != 0.0
    }

    pub fn has_home_position(&self) -> bool {
        self.home_lat != 0.0 || self.home_lon != 0.0
    }
}

/// Host-system health, produced directly from the status subscription and
/// rendered straight to CoT without passing through the registry.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SensorStatus {
    pub serial_number: String,
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
    pub cpu_usage: f64,
    pub memory_total_mib: f64,
    pub memory_available_mib: f64,
    pub disk_total_mib: f64,
    pub disk_used_mib: f64,
    pub temperature_c: f64,
    pub uptime_secs: f64,
    pub pluto_temp_c: Option<f64>,
    pub zynq_temp_c: Option<f64>,
}

impl SensorStatus {
    pub fn is_positionless(&self) -> bool {
        self.lat == 0.0 && self.lon == 0.0
    }

    pub fn id(&self) -> String {
        format!("wardragon-{}", self.serial_number)
    }
}
