//! Session tracker — per-identity session records and impossible-travel
//! detection.
//!
//! Sessions arrive with coarse geo attached by the adapter (edge geo
//! headers or client hints). When an identity shows up somewhere that
//! would have required supersonic travel since its last sighting, the
//! tracker emits a flag the fuser treats as its own high-risk signal.

use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::warn;

use warden_core::{stats, TtlStore};

use crate::types::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6371.0;
const MAX_SESSIONS_PER_IDENTITY: usize = 20;
const CONCURRENT_FLAG_THRESHOLD: usize = 10;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub identity: String,
    pub created_at_ms: i64,
    pub last_active_ms: i64,
    pub ip: String,
    pub user_agent: String,
    pub geo: Option<GeoPoint>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TravelFlag {
    pub distance_km: f64,
    pub elapsed_minutes: f64,
    pub speed_kmh: f64,
}

/// What the tracker saw for one request. `risk` is non-zero only when
/// something is anomalous; the fuser skips the signal otherwise.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct SessionObservation {
    pub session_id: String,
    pub new_session: bool,
    pub concurrent_sessions: usize,
    pub impossible_travel: Option<TravelFlag>,
    pub risk: f64,
}

/// Great-circle distance between two points, in kilometres.
pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();
    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().atan2((1.0 - h).sqrt())
}

#[derive(Debug, Clone)]
struct LastSighting {
    timestamp_ms: i64,
    geo: GeoPoint,
}

pub struct SessionTracker {
    sessions: TtlStore<SessionRecord>,
    /// Active session ids per identity, oldest first.
    by_identity: RwLock<HashMap<String, Vec<String>>>,
    last_sighting: RwLock<HashMap<String, LastSighting>>,
    max_speed_kmh: f64,
}

impl SessionTracker {
    pub fn new(capacity: usize, session_ttl_ms: i64, max_speed_kmh: f64) -> Self {
        Self {
            sessions: TtlStore::new(capacity).with_default_ttl_ms(session_ttl_ms),
            by_identity: RwLock::new(HashMap::new()),
            last_sighting: RwLock::new(HashMap::new()),
            max_speed_kmh: max_speed_kmh.max(1.0),
        }
    }

    /// Record one request against its session and check for anomalies.
    pub fn observe(
        &self,
        identity: &str,
        session_id: &str,
        ip: &str,
        user_agent: &str,
        geo: Option<&GeoPoint>,
        now_ms: i64,
    ) -> SessionObservation {
        let new_session = !self.sessions.contains(session_id);
        if new_session {
            self.sessions.set(
                session_id,
                SessionRecord {
                    session_id: session_id.to_string(),
                    identity: identity.to_string(),
                    created_at_ms: now_ms,
                    last_active_ms: now_ms,
                    ip: ip.to_string(),
                    user_agent: user_agent.to_string(),
                    geo: geo.cloned(),
                },
                None,
            );
            let mut index = self.by_identity.write();
            let list = index.entry(identity.to_string()).or_default();
            list.push(session_id.to_string());
            if list.len() > MAX_SESSIONS_PER_IDENTITY {
                let evicted = list.remove(0);
                self.sessions.delete(&evicted);
            }
        } else {
            self.sessions.update(session_id, |record| {
                record.last_active_ms = now_ms;
                if record.geo.is_none() {
                    record.geo = geo.cloned();
                }
            });
        }

        let concurrent_sessions = {
            let index = self.by_identity.read();
            index
                .get(identity)
                .map(|ids| ids.iter().filter(|id| self.sessions.contains(id)).count())
                .unwrap_or(0)
        };

        let impossible_travel = geo.and_then(|here| self.check_travel(identity, here, now_ms));

        let mut risk: f64 = 0.0;
        if let Some(flag) = &impossible_travel {
            // floor at 0.6, scaled up toward 1.0 by how absurd the speed is
            let overshoot = (flag.speed_kmh / self.max_speed_kmh - 1.0).clamp(0.0, 1.0);
            risk = risk.max(0.6 + 0.4 * overshoot);
            warn!(
                identity = %identity,
                distance_km = flag.distance_km,
                minutes = flag.elapsed_minutes,
                speed_kmh = flag.speed_kmh,
                "impossible travel detected"
            );
        }
        if concurrent_sessions > CONCURRENT_FLAG_THRESHOLD {
            risk = risk.max(0.6);
        }

        SessionObservation {
            session_id: session_id.to_string(),
            new_session,
            concurrent_sessions,
            impossible_travel,
            risk: stats::clamp01(risk),
        }
    }

    fn check_travel(&self, identity: &str, here: &GeoPoint, now_ms: i64) -> Option<TravelFlag> {
        let mut sightings = self.last_sighting.write();
        let previous = sightings.insert(
            identity.to_string(),
            LastSighting {
                timestamp_ms: now_ms,
                geo: here.clone(),
            },
        )?;

        let elapsed_ms = now_ms - previous.timestamp_ms;
        if elapsed_ms <= 0 {
            return None;
        }
        let distance_km = haversine_km(&previous.geo, here);
        if distance_km < 50.0 {
            // same metro area; never flag
            return None;
        }
        let hours = elapsed_ms as f64 / 3_600_000.0;
        let speed_kmh = distance_km / hours;
        if speed_kmh > self.max_speed_kmh {
            Some(TravelFlag {
                distance_km,
                elapsed_minutes: elapsed_ms as f64 / 60_000.0,
                speed_kmh,
            })
        } else {
            None
        }
    }

    pub fn active_sessions(&self, identity: &str) -> usize {
        self.by_identity
            .read()
            .get(identity)
            .map(|ids| ids.iter().filter(|id| self.sessions.contains(id)).count())
            .unwrap_or(0)
    }

    pub fn reset(&self, identity: &str) {
        if let Some(ids) = self.by_identity.write().remove(identity) {
            for id in ids {
                self.sessions.delete(&id);
            }
        }
        self.last_sighting.write().remove(identity);
    }

    pub fn cleanup(&self) -> usize {
        let removed = self.sessions.cleanup();
        if removed > 0 {
            let mut index = self.by_identity.write();
            for ids in index.values_mut() {
                ids.retain(|id| self.sessions.contains(id));
            }
            index.retain(|_, ids| !ids.is_empty());
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geo(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint {
            lat,
            lon,
            country: None,
        }
    }

    #[test]
    fn test_haversine_known_distance() {
        // New York ↔ London ≈ 5570 km
        let nyc = geo(40.7128, -74.0060);
        let london = geo(51.5074, -0.1278);
        let d = haversine_km(&nyc, &london);
        assert!((d - 5570.0).abs() < 50.0, "distance = {}", d);
        assert!(haversine_km(&nyc, &nyc) < 1e-9);
    }

    #[test]
    fn test_impossible_travel_flagged() {
        let tracker = SessionTracker::new(100, 3_600_000, 900.0);
        let nyc = geo(40.7128, -74.0060);
        let tokyo = geo(35.6762, 139.6503);

        let first = tracker.observe("alice", "s1", "1.1.1.1", "ua", Some(&nyc), 0);
        assert!(first.impossible_travel.is_none());
        assert_eq!(first.risk, 0.0);

        // 3 minutes later, ~10,800 km away
        let second = tracker.observe("alice", "s2", "9.9.9.9", "ua", Some(&tokyo), 180_000);
        let flag = second.impossible_travel.expect("travel flag");
        assert!(flag.distance_km > 10_000.0);
        assert!(flag.speed_kmh > 100_000.0);
        assert!(second.risk >= 0.6);
    }

    #[test]
    fn test_plausible_travel_not_flagged() {
        let tracker = SessionTracker::new(100, 3_600_000, 900.0);
        let berlin = geo(52.52, 13.405);
        let munich = geo(48.1351, 11.582);
        tracker.observe("bob", "s1", "1.1.1.1", "ua", Some(&berlin), 0);
        // ~500 km in 5 hours: a train ride
        let obs = tracker.observe("bob", "s2", "2.2.2.2", "ua", Some(&munich), 5 * 3_600_000);
        assert!(obs.impossible_travel.is_none());
        assert_eq!(obs.risk, 0.0);
    }

    #[test]
    fn test_same_metro_never_flags() {
        let tracker = SessionTracker::new(100, 3_600_000, 900.0);
        let a = geo(40.7128, -74.0060);
        let b = geo(40.7300, -73.9900); // a couple of km away
        tracker.observe("carol", "s1", "1.1.1.1", "ua", Some(&a), 0);
        let obs = tracker.observe("carol", "s2", "1.1.1.2", "ua", Some(&b), 1_000);
        assert!(obs.impossible_travel.is_none());
    }

    #[test]
    fn test_session_reuse_and_concurrency() {
        let tracker = SessionTracker::new(100, 3_600_000, 900.0);
        let first = tracker.observe("dave", "s1", "1.1.1.1", "ua", None, 0);
        assert!(first.new_session);
        let again = tracker.observe("dave", "s1", "1.1.1.1", "ua", None, 1_000);
        assert!(!again.new_session);
        assert_eq!(again.concurrent_sessions, 1);

        for i in 0..12 {
            tracker.observe("dave", &format!("s{}", i + 2), "1.1.1.1", "ua", None, 2_000 + i);
        }
        let crowded = tracker.observe("dave", "s1-final", "1.1.1.1", "ua", None, 10_000);
        assert!(crowded.concurrent_sessions > CONCURRENT_FLAG_THRESHOLD);
        assert!(crowded.risk >= 0.6);
    }

    #[test]
    fn test_reset_clears_sessions() {
        let tracker = SessionTracker::new(100, 3_600_000, 900.0);
        tracker.observe("eve", "s1", "1.1.1.1", "ua", None, 0);
        assert_eq!(tracker.active_sessions("eve"), 1);
        tracker.reset("eve");
        assert_eq!(tracker.active_sessions("eve"), 0);
    }
}
