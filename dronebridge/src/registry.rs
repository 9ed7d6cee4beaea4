//! The bounded live-drone registry and emission scheduler.
//!
//! `LiveSet` is an insertion-ordered `id -> DroneRecord` map capped at
//! `max_drones`: a `VecDeque` carries insertion order, a `HashMap` carries
//! O(1) lookup. `DroneManager` owns the live set and the per-tick
//! emission decisions.

use crate::config::Config;
use crate::model::DroneObservation;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Per-drone state the registry tracks beyond the observation itself.
#[derive(Clone, Debug)]
pub struct DroneRecord {
    pub obs: DroneObservation,
    pub created_at: Instant,
    pub last_update: Instant,
    pub last_emit: Option<Instant>,
    pub last_emit_lat: f64,
    pub last_emit_lon: f64,
    pub consecutive_moves: u32,
}

/// One CoT-worthy event decided by a `tick()` call.
#[derive(Clone, Debug)]
pub struct DueEmission {
    pub obs: DroneObservation,
    /// Fresh timestamped UID (track point) vs. stable UID (single marker).
    pub unique: bool,
    pub stale_offset_secs: f64,
    /// Final emission for a record about to be dropped for inactivity.
    pub retiring: bool,
    pub emit_pilot: bool,
    pub emit_home: bool,
}

/// Computes the initial great-circle bearing in degrees [0, 360) from
/// (lat1, lon1) to (lat2, lon2).
pub fn great_circle_bearing(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1 = lat1.to_radians();
    let lat2 = lat2.to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let x = delta_lon.sin() * lat2.cos();
    let y = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * delta_lon.cos();
    let theta = x.atan2(y);
    (theta.to_degrees() + 360.0) % 360.0
}

pub struct DroneManager {
    order: VecDeque<String>,
    records: HashMap<String, DroneRecord>,
    max_drones: usize,
    rate_limit: Duration,
    keepalive_interval: Duration,
    inactivity_timeout: Duration,
    position_threshold: f64,
    min_consecutive_for_unique: u32,
}

impl DroneManager {
    pub fn new(config: &Config) -> Self {
        Self {
            order: VecDeque::new(),
            records: HashMap::new(),
            max_drones: config.max_drones,
            rate_limit: config.rate_limit_duration(),
            keepalive_interval: config.keepalive_interval_duration(),
            inactivity_timeout: config.inactivity_timeout_duration(),
            position_threshold: config.position_threshold,
            min_consecutive_for_unique: config.min_consecutive_for_unique,
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&DroneRecord> {
        self.records.get(id)
    }

    /// Merges a new observation into the live set, applying the bearing
    /// fallback when the message carried no heading, evicting the oldest
    /// identifier if this is a new entry and the set is full.
    pub fn upsert(&mut self, mut obs: DroneObservation, now: Instant) {
        if let Some(record) = self.records.get_mut(&obs.id) {
            if obs.direction.is_none() {
                obs.direction = Some(great_circle_bearing(
                    record.obs.lat,
                    record.obs.lon,
                    obs.lat,
                    obs.lon,
                ));
            }
            record.obs = obs;
            record.last_update = now;
            return;
        }

        if self.order.len() >= self.max_drones {
            if let Some(oldest) = self.order.pop_front() {
                self.records.remove(&oldest);
            }
        }

        let id = obs.id.clone();
        let lat = obs.lat;
        let lon = obs.lon;
        self.order.push_back(id.clone());
        self.records.insert(
            id,
            DroneRecord {
                obs,
                created_at: now,
                last_update: now,
                last_emit: None,
                last_emit_lat: lat,
                last_emit_lon: lon,
                consecutive_moves: 0,
            },
        );
    }

    /// Advances scheduler state for every live record, returning the
    /// emissions due this tick in insertion order.
    pub fn tick(&mut self, now: Instant) -> Vec<DueEmission> {
        let mut emissions = Vec::new();
        let mut retiring = Vec::new();

        for id in self.order.iter() {
            let record = match self.records.get_mut(id) {
                Some(r) => r,
                None => continue,
            };
            let since_update = now.saturating_duration_since(record.last_update);

            if since_update > self.inactivity_timeout {
                emissions.push(DueEmission {
                    obs: record.obs.clone(),
                    unique: false,
                    stale_offset_secs: 0.0,
                    retiring: true,
                    emit_pilot: false,
                    emit_home: false,
                });
                retiring.push(id.clone());
                continue;
            }

            let position_change = (record.obs.lat - record.last_emit_lat)
                .hypot(record.obs.lon - record.last_emit_lon);
            if position_change >= self.position_threshold {
                record.consecutive_moves += 1;
            } else {
                record.consecutive_moves = 0;
            }

            let full_due = record
                .last_emit
                .map(|t| now.saturating_duration_since(t) >= self.rate_limit)
                .unwrap_or(true);
            let keepalive_due = record
                .last_emit
                .map(|t| now.saturating_duration_since(t) >= self.keepalive_interval)
                .unwrap_or(true);

            if full_due || keepalive_due {
                let unique = record.consecutive_moves >= self.min_consecutive_for_unique;
                let stale_offset_secs = (self.inactivity_timeout - since_update).as_secs_f64();

                emissions.push(DueEmission {
                    obs: record.obs.clone(),
                    unique,
                    stale_offset_secs,
                    retiring: false,
                    emit_pilot: record.obs.has_operator_position(),
                    emit_home: record.obs.has_home_position(),
                });

                if unique {
                    record.consecutive_moves = 0;
                    record.last_emit_lat = record.obs.lat;
                    record.last_emit_lon = record.obs.lon;
                }
                record.last_emit = Some(now);
            }
        }

        for id in retiring {
            self.records.remove(&id);
            self.order.retain(|x| x != &id);
        }

        emissions
    }
}
