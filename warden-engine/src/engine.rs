//! Risk engine orchestrator.
//!
//! Per request: record the event, run the signal producers, fuse their
//! scores into one bounded risk, map it to a level, select a mitigation,
//! then update reputation, counters, and hooks. Two background sweepers
//! keep the stores bounded; `destroy` stops them and releases all state.
//!
//! Fusion is a weighted mean over the signals that produced a reliable
//! score; unreliable or absent signals drop both their weight and their
//! numerator. Floor rules then clamp the score upward: an identified
//! attack, a detected bot, or a denied rate check each guarantee a
//! minimum severity regardless of how diluted the weighted mean was.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use warden_core::{stats, StoreStats, TtlStore, WardenResult, MAX_EVENTS_PER_IDENTITY};

use crate::behavior::BehaviorAnalyzer;
use crate::config::EngineConfig;
use crate::fingerprint::Fingerprinter;
use crate::hooks::{self, NoopHooks, RiskHooks};
use crate::patterns::PatternDetector;
use crate::rate_limiter::{CheckOptions, RateLimiter};
use crate::reputation::ReputationTracker;
use crate::session::SessionTracker;
use crate::types::{
    ChallengeType, Decision, DecisionMetadata, Event, MitigationAction, RequestRecord, RiskLevel,
    SignalBreakdown,
};

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct EngineStats {
    pub total_requests: u64,
    pub allowed: u64,
    pub challenged: u64,
    pub throttled: u64,
    pub blocked: u64,
    pub banned: u64,
    pub mean_risk_score: f64,
    pub event_store: StoreStats,
}

pub struct RiskEngine {
    config: EngineConfig,
    events: TtlStore<Vec<Event>>,
    behavior: BehaviorAnalyzer,
    patterns: PatternDetector,
    rate_limiter: RateLimiter,
    fingerprinter: Fingerprinter,
    reputation: ReputationTracker,
    sessions: SessionTracker,
    hooks: Arc<dyn RiskHooks>,

    total_requests: AtomicU64,
    allowed: AtomicU64,
    challenged: AtomicU64,
    throttled: AtomicU64,
    blocked: AtomicU64,
    banned: AtomicU64,
    score_sum: Mutex<f64>,
    challenge_counter: AtomicU64,

    stop: Arc<AtomicBool>,
    sweepers: Mutex<Vec<std::thread::JoinHandle<()>>>,
}

impl RiskEngine {
    pub fn new(config: EngineConfig) -> WardenResult<Arc<Self>> {
        Self::with_hooks(config, Arc::new(NoopHooks))
    }

    pub fn with_hooks(config: EngineConfig, hooks: Arc<dyn RiskHooks>) -> WardenResult<Arc<Self>> {
        config.validate()?;
        let capacity = config.store_capacity;
        let engine = Arc::new(Self {
            events: TtlStore::new(capacity).with_default_ttl_ms(config.state_ttl_ms),
            behavior: BehaviorAnalyzer::new(
                capacity,
                config.min_behavior_samples,
                config.anomaly_threshold,
            ),
            patterns: PatternDetector::new(),
            rate_limiter: RateLimiter::new(config.rate_limit.clone(), capacity),
            fingerprinter: Fingerprinter::new(capacity),
            reputation: ReputationTracker::new(capacity, config.state_ttl_ms.max(86_400_000)),
            sessions: SessionTracker::new(
                capacity,
                config.state_ttl_ms,
                config.impossible_travel_kmh,
            ),
            hooks,
            total_requests: AtomicU64::new(0),
            allowed: AtomicU64::new(0),
            challenged: AtomicU64::new(0),
            throttled: AtomicU64::new(0),
            blocked: AtomicU64::new(0),
            banned: AtomicU64::new(0),
            score_sum: Mutex::new(0.0),
            challenge_counter: AtomicU64::new(0),
            stop: Arc::new(AtomicBool::new(false)),
            sweepers: Mutex::new(Vec::new()),
            config,
        });
        engine.spawn_sweepers();
        info!("risk engine started");
        Ok(engine)
    }

    /// Two background sweepers: per-identity state stores, and the rate
    /// limiter's buckets. Both hold only a weak handle so a dropped engine
    /// shuts them down even without an explicit `destroy`.
    fn spawn_sweepers(self: &Arc<Self>) {
        let interval = Duration::from_millis(self.config.cleanup_interval_ms.max(100));
        let mut handles = self.sweepers.lock();

        let state_engine: Weak<Self> = Arc::downgrade(self);
        let state_stop = self.stop.clone();
        handles.push(std::thread::spawn(move || {
            sweep_loop(interval, state_stop, move || {
                let engine = state_engine.upgrade()?;
                let removed = engine.events.cleanup()
                    + engine.behavior.cleanup()
                    + engine.fingerprinter.cleanup()
                    + engine.reputation.cleanup()
                    + engine.sessions.cleanup();
                Some(removed)
            });
        }));

        let rate_engine: Weak<Self> = Arc::downgrade(self);
        let rate_stop = self.stop.clone();
        handles.push(std::thread::spawn(move || {
            sweep_loop(interval, rate_stop, move || {
                Some(rate_engine.upgrade()?.rate_limiter.cleanup())
            });
        }));
    }

    /// Evaluate one request and decide its fate. Never fails: every
    /// producer degrades to a sentinel instead of erroring.
    pub fn evaluate(&self, record: &RequestRecord) -> Decision {
        let started = Instant::now();
        let now_ms = record
            .timestamp_ms
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
        let identity = derive_identity(record);
        let session_id = record
            .session_id
            .clone()
            .unwrap_or_else(|| synthesize_session_id(record, now_ms));

        self.events.push(
            &identity,
            Event {
                timestamp_ms: now_ms,
                action: record.action.clone(),
                endpoint: record.endpoint.clone(),
                ip: record.ip.clone(),
                user_agent: record.user_agent().to_string(),
                response_time_ms: record.response_time_ms,
                payload_size: record.payload_size,
                status_code: record.status_code,
                method: record.method.clone(),
            },
            MAX_EVENTS_PER_IDENTITY,
            Some(self.config.state_ttl_ms),
        );
        let events = self.events.get(&identity).unwrap_or_default();

        // signal producers; serial execution, no producer depends on another
        let reputation = self.reputation.get(&identity);
        let rate_check = self.rate_limiter.check(
            &identity,
            now_ms,
            &CheckOptions {
                endpoint: Some(record.endpoint.clone()),
                // only a genuinely poor reputation shrinks the limit;
                // anything milder would break the configured allowance
                risk_score: reputation.as_ref().map(|r| r.score).filter(|s| *s >= 0.5),
                ..CheckOptions::default()
            },
        );
        let behavior = self.behavior.analyze(&identity, &events);
        let pattern_analysis = if events.len() >= 3 {
            Some(self.patterns.analyze(&events))
        } else {
            None
        };
        let fingerprint = self.fingerprinter.evaluate(&identity, record, now_ms);
        let session = self.sessions.observe(
            &identity,
            &session_id,
            &record.ip,
            record.user_agent(),
            record.client.as_ref().and_then(|c| c.geo.as_ref()),
            now_ms,
        );

        // weighted fusion over reliable signals
        let weights = &self.config.weights;
        let mut weight_sum = 0.0;
        let mut score_sum = 0.0;
        let mut fuse = |weight: f64, score: f64| {
            weight_sum += weight;
            score_sum += weight * stats::clamp01(score);
        };
        if behavior.reliable {
            fuse(weights.behavior, behavior.risk);
        }
        if let Some(analysis) = &pattern_analysis {
            fuse(weights.patterns, analysis.risk);
        }
        let rate_contribution = if rate_check.allowed {
            0.0
        } else {
            rate_check.severity.unwrap_or(0.5)
        };
        fuse(weights.rate_limit, rate_contribution);
        let fingerprint_contribution = fingerprint
            .anomaly_score
            .max(fingerprint.bot_score)
            .max(if fingerprint.stable { 0.0 } else { 0.7 });
        fuse(weights.fingerprint, fingerprint_contribution);
        if let Some(rep) = &reputation {
            fuse(weights.reputation, rep.score);
        }
        if session.risk > 0.0 {
            fuse(weights.session, session.risk);
        }

        let mut score = if weight_sum > 0.0 {
            stats::clamp01(score_sum / weight_sum)
        } else {
            0.0
        };

        // floor rules: upward clamps only
        let floors = &self.config.floors;
        let top_attack_risk = pattern_analysis.as_ref().and_then(|analysis| {
            analysis.attack_type.map(|_| {
                analysis
                    .patterns
                    .iter()
                    .filter(|p| {
                        matches!(p.kind, crate::patterns::PatternKind::KnownAttack { .. })
                    })
                    .map(|p| p.risk)
                    .fold(0.0, f64::max)
            })
        });
        if let Some(attack_risk) = top_attack_risk {
            // an identified attack floors at the signature's own risk, never
            // below the configured minimum
            score = score.max(floors.attack.max(attack_risk));
        }
        if fingerprint.is_bot {
            score = score.max(floors.bot);
        }
        if !rate_check.allowed {
            score = score.max(floors.rate_denied);
        }
        score = stats::clamp01(score);

        let risk_level = self.level_for(score);
        let action = self.select_action(
            score,
            &identity,
            now_ms,
            pattern_analysis.as_ref().and_then(|a| a.attack_type),
            &rate_check,
            &fingerprint,
            &behavior,
        );

        self.reputation
            .update(&identity, score, action.kind(), now_ms);
        self.bump_counters(&action, score);

        let decision = Decision {
            identity: identity.clone(),
            session_id,
            risk_score: score,
            risk_level,
            allowed: action.allowed(),
            action,
            components: SignalBreakdown {
                behavior: Some(behavior.clone()),
                patterns: pattern_analysis,
                rate_limit: Some(rate_check),
                fingerprint: Some(fingerprint),
                reputation,
                session: Some(session.clone()),
            },
            metadata: DecisionMetadata {
                evaluation_time_ms: started.elapsed().as_secs_f64() * 1_000.0,
                timestamp_ms: now_ms,
            },
        };

        if risk_level >= RiskLevel::High {
            hooks::dispatch("on_high_risk", || self.hooks.on_high_risk(&decision));
        }
        if decision.action.is_blocking() {
            warn!(
                identity = %identity,
                score = decision.risk_score,
                action = decision.action.kind(),
                "request blocked"
            );
            hooks::dispatch("on_block", || self.hooks.on_block(&decision));
        }
        if (behavior.reliable && behavior.risk > 0.6) || session.impossible_travel.is_some() {
            hooks::dispatch("on_anomaly", || {
                self.hooks.on_anomaly(&identity, &decision)
            });
        }

        decision
    }

    fn level_for(&self, score: f64) -> RiskLevel {
        let t = &self.config.thresholds;
        if score >= t.critical {
            RiskLevel::Critical
        } else if score >= t.high {
            RiskLevel::High
        } else if score >= t.medium {
            RiskLevel::Medium
        } else if score >= t.low {
            RiskLevel::Low
        } else {
            RiskLevel::Minimal
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn select_action(
        &self,
        score: f64,
        identity: &str,
        now_ms: i64,
        attack_type: Option<crate::patterns::AttackType>,
        rate_check: &crate::rate_limiter::RateCheck,
        fingerprint: &crate::fingerprint::FingerprintResult,
        behavior: &crate::behavior::BehaviorResult,
    ) -> MitigationAction {
        let t = &self.config.thresholds;
        if score >= t.critical {
            MitigationAction::Ban {
                reason: self.dominant_reason(attack_type, rate_check, fingerprint, behavior),
                duration_ms: self.config.ban_duration_ms,
            }
        } else if score >= t.high {
            MitigationAction::Block {
                reason: self.dominant_reason(attack_type, rate_check, fingerprint, behavior),
                duration_ms: self.config.block_duration_ms,
            }
        } else if score >= t.medium {
            MitigationAction::Throttle {
                factor: self.config.throttle_factor,
            }
        } else if score >= t.low {
            let challenge_type = if fingerprint.bot_score > 0.5 {
                ChallengeType::Captcha
            } else if behavior.factors.automation > 0.5 {
                ChallengeType::ProofOfWork
            } else {
                ChallengeType::JsChallenge
            };
            MitigationAction::Challenge {
                challenge_type,
                challenge: self.challenge_nonce(identity, now_ms),
            }
        } else {
            MitigationAction::Allow
        }
    }

    fn dominant_reason(
        &self,
        attack_type: Option<crate::patterns::AttackType>,
        rate_check: &crate::rate_limiter::RateCheck,
        fingerprint: &crate::fingerprint::FingerprintResult,
        behavior: &crate::behavior::BehaviorResult,
    ) -> String {
        if let Some(attack) = attack_type {
            return format!("detected_{}", attack.name());
        }
        if !rate_check.allowed {
            return "rate_limit_exceeded".to_string();
        }
        if fingerprint.is_bot {
            return "bot_detected".to_string();
        }
        if behavior.reliable && behavior.risk > 0.6 {
            return "behavioral_anomaly".to_string();
        }
        "high_risk_score".to_string()
    }

    /// Opaque challenge nonce. Deliberately non-deterministic; replayed
    /// streams reproduce decisions, not nonces.
    fn challenge_nonce(&self, identity: &str, now_ms: i64) -> String {
        let counter = self.challenge_counter.fetch_add(1, Ordering::Relaxed);
        let salt: u64 = rand::random();
        let mut hasher = Sha256::new();
        hasher.update(identity.as_bytes());
        hasher.update(now_ms.to_be_bytes());
        hasher.update(counter.to_be_bytes());
        hasher.update(salt.to_be_bytes());
        let digest = hasher.finalize();
        hex_prefix(&digest, 16)
    }

    fn bump_counters(&self, action: &MitigationAction, score: f64) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        match action {
            MitigationAction::Allow => self.allowed.fetch_add(1, Ordering::Relaxed),
            MitigationAction::Challenge { .. } => self.challenged.fetch_add(1, Ordering::Relaxed),
            MitigationAction::Throttle { .. } => self.throttled.fetch_add(1, Ordering::Relaxed),
            MitigationAction::Block { .. } => self.blocked.fetch_add(1, Ordering::Relaxed),
            MitigationAction::Ban { .. } => self.banned.fetch_add(1, Ordering::Relaxed),
        };
        *self.score_sum.lock() += score;
    }

    /// Purge every trace of an identity. The next request from it is
    /// evaluated exactly as a fresh engine would (global counters aside).
    pub fn reset_user(&self, identity: &str) {
        self.events.delete(identity);
        self.behavior.reset(identity);
        self.fingerprinter.reset(identity);
        self.reputation.reset(identity);
        self.rate_limiter.reset(identity);
        self.sessions.reset(identity);
        info!(identity = %identity, "identity state reset");
    }

    pub fn stats(&self) -> EngineStats {
        let total = self.total_requests.load(Ordering::Relaxed);
        EngineStats {
            total_requests: total,
            allowed: self.allowed.load(Ordering::Relaxed),
            challenged: self.challenged.load(Ordering::Relaxed),
            throttled: self.throttled.load(Ordering::Relaxed),
            blocked: self.blocked.load(Ordering::Relaxed),
            banned: self.banned.load(Ordering::Relaxed),
            mean_risk_score: if total == 0 {
                0.0
            } else {
                *self.score_sum.lock() / total as f64
            },
            event_store: self.events.stats(),
        }
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Snapshot the durable per-identity state (events + reputation).
    pub fn export_state(&self) -> WardenResult<serde_json::Value> {
        Ok(serde_json::json!({
            "events": self.events.export()?,
            "reputation": self.reputation.export()?,
        }))
    }

    /// Restore a prior snapshot; expired entries are skipped. Returns how
    /// many entries were re-hydrated.
    pub fn import_state(&self, snapshot: &serde_json::Value) -> WardenResult<usize> {
        let events = snapshot
            .get("events")
            .map(|v| self.events.import(v))
            .transpose()?
            .unwrap_or(0);
        let reputation = snapshot
            .get("reputation")
            .map(|v| self.reputation.import(v))
            .transpose()?
            .unwrap_or(0);
        Ok(events + reputation)
    }

    /// Stop both sweepers and release all state.
    pub fn destroy(&self) {
        self.stop.store(true, Ordering::SeqCst);
        let handles: Vec<_> = self.sweepers.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }
        self.events.clear();
        info!("risk engine destroyed");
    }
}

impl Drop for RiskEngine {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

fn sweep_loop(
    interval: Duration,
    stop: Arc<AtomicBool>,
    mut tick: impl FnMut() -> Option<usize>,
) {
    let step = Duration::from_millis(50);
    let mut elapsed = Duration::ZERO;
    loop {
        if stop.load(Ordering::SeqCst) {
            return;
        }
        std::thread::sleep(step);
        elapsed += step;
        if elapsed < interval {
            continue;
        }
        elapsed = Duration::ZERO;
        if tick().is_none() {
            // engine gone; nothing left to sweep
            return;
        }
    }
}

/// Identity preference order: explicit user id, authenticated user id,
/// header-supplied id, caller IP, then the anonymous bucket.
fn derive_identity(record: &RequestRecord) -> String {
    if let Some(user_id) = &record.user_id {
        if !user_id.is_empty() {
            return user_id.clone();
        }
    }
    if let Some(auth_id) = &record.authenticated_user_id {
        if !auth_id.is_empty() {
            return auth_id.clone();
        }
    }
    if let Some(header_id) = record.header("x-user-id") {
        if !header_id.is_empty() {
            return header_id.to_string();
        }
    }
    if !record.ip.is_empty() {
        return record.ip.clone();
    }
    "anonymous".to_string()
}

/// Synthetic session id: hash of ip|userAgent|half-hour bucket, so one
/// browsing session maps to one id without cookies.
fn synthesize_session_id(record: &RequestRecord, now_ms: i64) -> String {
    let bucket = now_ms / 1_800_000;
    let material = format!("{}|{}|{}", record.ip, record.user_agent(), bucket);
    format!("sess-{:08x}", crate::fingerprint::fnv1a(&material))
}

fn hex_prefix(bytes: &[u8], len: usize) -> String {
    bytes
        .iter()
        .take(len)
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::CallbackHooks;
    use std::sync::atomic::AtomicU32;

    fn quick_config() -> EngineConfig {
        EngineConfig {
            cleanup_interval_ms: 3_600_000, // keep sweepers quiet in tests
            ..EngineConfig::default()
        }
    }

    fn browser_request(ip: &str, endpoint: &str, action: &str, ts: i64) -> RequestRecord {
        let mut record = RequestRecord {
            ip: ip.into(),
            method: "GET".into(),
            path: endpoint.into(),
            endpoint: endpoint.into(),
            action: action.into(),
            timestamp_ms: Some(ts),
            ..RequestRecord::default()
        };
        record.headers.insert(
            "User-Agent".into(),
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".into(),
        );
        record
    }

    #[test]
    fn test_score_always_bounded() {
        let engine = RiskEngine::new(quick_config()).unwrap();
        for i in 0..100 {
            let record = browser_request("1.2.3.4", "/api/login", "login", 1_000 + i * 50);
            let decision = engine.evaluate(&record);
            assert!((0.0..=1.0).contains(&decision.risk_score));
        }
        engine.destroy();
    }

    #[test]
    fn test_level_monotone_in_score() {
        let engine = RiskEngine::new(quick_config()).unwrap();
        let mut previous = RiskLevel::Minimal;
        for score in [0.0, 0.29, 0.3, 0.49, 0.5, 0.69, 0.7, 0.89, 0.9, 1.0] {
            let level = engine.level_for(score);
            assert!(level >= previous, "level regressed at score {}", score);
            previous = level;
        }
        engine.destroy();
    }

    #[test]
    fn test_identity_preference_order() {
        let mut record = RequestRecord {
            ip: "9.9.9.9".into(),
            user_id: Some("alice".into()),
            ..RequestRecord::default()
        };
        record.authenticated_user_id = Some("auth-alice".into());
        record.headers.insert("X-User-Id".into(), "header-id".into());
        assert_eq!(derive_identity(&record), "alice");
        record.user_id = None;
        assert_eq!(derive_identity(&record), "auth-alice");
        record.authenticated_user_id = None;
        assert_eq!(derive_identity(&record), "header-id");
        record.headers.clear();
        assert_eq!(derive_identity(&record), "9.9.9.9");
        record.ip.clear();
        assert_eq!(derive_identity(&record), "anonymous");
    }

    #[test]
    fn test_synthetic_session_stable_within_bucket() {
        let record = browser_request("1.2.3.4", "/home", "view", 0);
        let a = synthesize_session_id(&record, 1_000);
        let b = synthesize_session_id(&record, 900_000);
        let c = synthesize_session_id(&record, 2_000_000);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_cold_start_allows() {
        let engine = RiskEngine::new(quick_config()).unwrap();
        let record = browser_request("93.184.216.34", "/home", "view", 1_000);
        let decision = engine.evaluate(&record);
        assert_eq!(decision.action, MitigationAction::Allow);
        assert!(decision.risk_level <= RiskLevel::Low);
        assert!(!decision.components.behavior.as_ref().unwrap().reliable);
        engine.destroy();
    }

    #[test]
    fn test_reset_user_equivalent_to_fresh() {
        let config = quick_config();
        let engine = RiskEngine::new(config.clone()).unwrap();
        // dirty the identity
        for i in 0..40 {
            engine.evaluate(&browser_request("5.6.7.8", "/api/login", "login", 1_000 + i * 100));
        }
        engine.reset_user("5.6.7.8");
        let after_reset =
            engine.evaluate(&browser_request("5.6.7.8", "/home", "view", 10_000_000));

        let fresh = RiskEngine::new(config).unwrap();
        let fresh_decision =
            fresh.evaluate(&browser_request("5.6.7.8", "/home", "view", 10_000_000));

        assert_eq!(after_reset.risk_score, fresh_decision.risk_score);
        assert_eq!(after_reset.risk_level, fresh_decision.risk_level);
        assert_eq!(after_reset.action.kind(), fresh_decision.action.kind());
        engine.destroy();
        fresh.destroy();
    }

    #[test]
    fn test_hooks_fire_on_block() {
        let blocks = Arc::new(AtomicU32::new(0));
        let count = blocks.clone();
        let hooks = CallbackHooks::new().on_block(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        });
        let engine = RiskEngine::with_hooks(quick_config(), Arc::new(hooks)).unwrap();
        // brute force until something blocks
        for i in 0..30 {
            engine.evaluate(&browser_request("6.6.6.6", "/api/login", "login", 1_000 + i * 500));
        }
        assert!(blocks.load(Ordering::SeqCst) > 0);
        engine.destroy();
    }

    #[test]
    fn test_panicking_hook_does_not_fail_evaluate() {
        let hooks = CallbackHooks::new().on_block(|_| panic!("buggy hook"));
        let engine = RiskEngine::with_hooks(quick_config(), Arc::new(hooks)).unwrap();
        for i in 0..30 {
            let decision =
                engine.evaluate(&browser_request("7.7.7.7", "/api/login", "login", 1_000 + i * 400));
            assert!((0.0..=1.0).contains(&decision.risk_score));
        }
        engine.destroy();
    }

    #[test]
    fn test_counters_account_for_every_request() {
        let engine = RiskEngine::new(quick_config()).unwrap();
        for i in 0..50 {
            engine.evaluate(&browser_request("8.8.4.4", "/api/login", "login", 1_000 + i * 300));
        }
        let stats = engine.stats();
        assert_eq!(stats.total_requests, 50);
        assert_eq!(
            stats.allowed + stats.challenged + stats.throttled + stats.blocked + stats.banned,
            50
        );
        assert!(stats.mean_risk_score > 0.0);
        engine.destroy();
    }

    #[test]
    fn test_export_import_round_trip() {
        let engine = RiskEngine::new(quick_config()).unwrap();
        for i in 0..15 {
            engine.evaluate(&browser_request("2.2.2.2", "/home", "view", 1_000 + i * 4_000));
        }
        let snapshot = engine.export_state().unwrap();
        engine.destroy();

        let restored = RiskEngine::new(quick_config()).unwrap();
        let count = restored.import_state(&snapshot).unwrap();
        assert!(count >= 2); // events list + reputation record
        restored.destroy();
    }

    #[test]
    fn test_destroy_stops_sweepers() {
        let engine = RiskEngine::new(EngineConfig {
            cleanup_interval_ms: 100,
            ..EngineConfig::default()
        })
        .unwrap();
        engine.evaluate(&browser_request("3.3.3.3", "/home", "view", 1_000));
        engine.destroy();
        assert!(engine.sweepers.lock().is_empty());
    }
}
