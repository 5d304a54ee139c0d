//! Shared types for the risk engine: the inbound request record, the
//! per-identity event, and the outbound decision.

use std::collections::HashMap;

use crate::behavior::BehaviorResult;
use crate::fingerprint::FingerprintResult;
use crate::patterns::PatternAnalysis;
use crate::rate_limiter::RateCheck;
use crate::reputation::ReputationSummary;
use crate::session::SessionObservation;

/// Categorical risk level mapped from the fused score. Ordering follows
/// severity, so `level >= RiskLevel::High` reads naturally.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Minimal,
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeType {
    Captcha,
    ProofOfWork,
    JsChallenge,
}

/// The mitigation selected for a request. Each variant carries only the
/// fields valid for it.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MitigationAction {
    Allow,
    Challenge {
        challenge_type: ChallengeType,
        challenge: String,
    },
    Throttle {
        factor: f64,
    },
    Block {
        reason: String,
        duration_ms: i64,
    },
    Ban {
        reason: String,
        duration_ms: i64,
    },
}

impl MitigationAction {
    /// Allow and challenge let the request proceed; throttle, block and ban
    /// do not.
    pub fn allowed(&self) -> bool {
        matches!(
            self,
            MitigationAction::Allow | MitigationAction::Challenge { .. }
        )
    }

    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            MitigationAction::Block { .. } | MitigationAction::Ban { .. }
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MitigationAction::Allow => "allow",
            MitigationAction::Challenge { .. } => "challenge",
            MitigationAction::Throttle { .. } => "throttle",
            MitigationAction::Block { .. } => "block",
            MitigationAction::Ban { .. } => "ban",
        }
    }
}

/// Coarse location attached by the adapter (edge geo headers or client
/// hints), consumed by the session tracker.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

/// Client-declared attributes. Everything is optional; missing fields lower
/// fingerprint confidence instead of failing.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ClientHints {
    pub timezone: Option<String>,
    pub screen_width: Option<u32>,
    pub screen_height: Option<u32>,
    pub color_depth: Option<u8>,
    pub platform: Option<String>,
    pub touch_support: Option<bool>,
    pub cookies_enabled: Option<bool>,
    pub has_js: Option<bool>,
    pub webdriver: Option<bool>,
    pub phantom_markers: Option<bool>,
    pub canvas_hash: Option<String>,
    pub webgl_hash: Option<String>,
    pub audio_hash: Option<String>,
    #[serde(default)]
    pub plugins: Vec<String>,
    #[serde(default)]
    pub fonts: Vec<String>,
    pub mouse_events: Option<u32>,
    pub scroll_events: Option<u32>,
    pub geo: Option<GeoPoint>,
}

/// One inbound request as the adapter hands it to the engine.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct RequestRecord {
    pub ip: String,
    /// Caller-claimed user id (e.g. from the request body or a cookie).
    pub user_id: Option<String>,
    /// Identity established by the host's auth layer; used for grouping
    /// when no explicit `user_id` is supplied.
    pub authenticated_user_id: Option<String>,
    pub session_id: Option<String>,
    pub method: String,
    pub path: String,
    pub endpoint: String,
    pub action: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub query: Option<String>,
    #[serde(default)]
    pub payload_size: u64,
    pub response_time_ms: Option<u64>,
    pub status_code: Option<u16>,
    /// Event time. `None` means "now"; replayed streams carry explicit
    /// timestamps so decisions are reproducible.
    pub timestamp_ms: Option<i64>,
    pub client: Option<ClientHints>,
}

impl RequestRecord {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn user_agent(&self) -> &str {
        self.header("user-agent").unwrap_or("")
    }
}

/// One recorded request in an identity's bounded history.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Event {
    pub timestamp_ms: i64,
    pub action: String,
    pub endpoint: String,
    pub ip: String,
    pub user_agent: String,
    pub response_time_ms: Option<u64>,
    pub payload_size: u64,
    pub status_code: Option<u16>,
    pub method: String,
}

/// Per-signal breakdown attached to every decision. A producer that could
/// not score this request leaves its slot `None` and drops out of fusion.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct SignalBreakdown {
    pub behavior: Option<BehaviorResult>,
    pub patterns: Option<PatternAnalysis>,
    pub rate_limit: Option<RateCheck>,
    pub fingerprint: Option<FingerprintResult>,
    pub reputation: Option<ReputationSummary>,
    pub session: Option<SessionObservation>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DecisionMetadata {
    pub evaluation_time_ms: f64,
    pub timestamp_ms: i64,
}

/// The engine's verdict for one request.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Decision {
    pub identity: String,
    pub session_id: String,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub action: MitigationAction,
    pub allowed: bool,
    pub components: SignalBreakdown,
    pub metadata: DecisionMetadata,
}
