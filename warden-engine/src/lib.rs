//! # Warden Engine — behavior-based anti-abuse risk engine
//!
//! Given a stream of per-request events keyed by caller identity, the
//! engine produces, per request, a bounded risk score in [0, 1], a
//! categorical risk level, and a mitigation action (allow, challenge,
//! throttle, block, ban).
//!
//! Five signal producers feed one weighted decision:
//! - [`behavior`] — statistics over the caller's recent event history
//! - [`patterns`] — sequence/temporal attack-pattern detection
//! - [`rate_limiter`] — sliding-window limiting with adaptive penalties
//! - [`fingerprint`] — device fingerprinting with anomaly scoring
//! - [`reputation`] — decaying summary of prior decisions
//!
//! plus the supplemental [`session`] tracker (impossible travel). The
//! [`engine::RiskEngine`] orchestrates them; [`hooks`] notify the host.
//!
//! ```no_run
//! use warden_engine::{EngineConfig, RiskEngine, RequestRecord};
//!
//! let engine = RiskEngine::new(EngineConfig::default()).unwrap();
//! let record = RequestRecord {
//!     ip: "93.184.216.34".into(),
//!     method: "GET".into(),
//!     path: "/home".into(),
//!     endpoint: "/home".into(),
//!     action: "view".into(),
//!     ..RequestRecord::default()
//! };
//! let decision = engine.evaluate(&record);
//! assert!(decision.risk_score <= 1.0);
//! engine.destroy();
//! ```

pub mod behavior;
pub mod config;
pub mod engine;
pub mod fingerprint;
pub mod hooks;
pub mod patterns;
pub mod rate_limiter;
pub mod reputation;
pub mod session;
pub mod types;

pub use config::{EngineConfig, FloorRules, RateLimitConfig, RiskThresholds, SignalWeights};
pub use engine::{EngineStats, RiskEngine};
pub use hooks::{CallbackHooks, NoopHooks, RiskHooks};
pub use types::{
    ChallengeType, ClientHints, Decision, Event, GeoPoint, MitigationAction, RequestRecord,
    RiskLevel,
};
