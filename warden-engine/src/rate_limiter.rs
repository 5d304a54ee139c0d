//! Rate limiter — sliding-window log with adaptive penalties.
//!
//! Features:
//! - Per (identity, endpoint) sliding-window request log
//! - Multiplicative penalty in [1, 10] that grows with violation severity
//!   and decays on compliant traffic
//! - Risk-aware effective limits (high-risk callers get less headroom)
//! - Burst ceiling at a multiple of the effective limit
//! - Adaptive per-identity limit recomputation from observed usage
//! - Token-bucket and leaky-bucket primitives under namespaced keys
//! - Weighted sliding-window usage for smoother pressure readings
//! - Stale-bucket expiry via store TTL plus a periodic sweep
//!
//! Every public check takes an explicit `now_ms` so a replayed request
//! stream reproduces its decisions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::{debug, warn};

use warden_core::{stats, TtlStore};

use crate::config::RateLimitConfig;

const MAX_PENALTY: f64 = 10.0;
const PENALTY_EPSILON: f64 = 0.01;
const MAX_USAGE_SAMPLES: usize = 100;
const ADAPT_MIN_SAMPLES: usize = 50;
/// Hard cap on one bucket's timestamp log; an attack can't grow it past this.
const MAX_BUCKET_LOG: usize = 4096;

/// Sliding-window state for one (identity, endpoint) pair.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct RateBucket {
    pub requests: Vec<i64>,
    pub created_at_ms: i64,
    pub violations: u32,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct TokenBucketState {
    tokens: f64,
    last_refill_ms: i64,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct LeakyBucketState {
    level: f64,
    last_leak_ms: i64,
}

#[derive(Debug, Clone, Default)]
struct UsageTrack {
    samples: Vec<f64>,
    seen: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateDenyReason {
    RateExceeded,
    BurstExceeded,
}

/// Outcome of one sliding-window check.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RateCheck {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_in_ms: i64,
    pub limit: u32,
    pub current_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RateDenyReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<i64>,
}

/// Optional per-call overrides for [`RateLimiter::check`].
#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    pub endpoint: Option<String>,
    pub limit: Option<u32>,
    pub window_ms: Option<i64>,
    /// Current fused risk for this identity; shrinks the effective limit.
    pub risk_score: Option<f64>,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct RateLimiterReport {
    pub total_checked: u64,
    pub total_denied: u64,
    pub active_buckets: usize,
    pub penalized_identities: usize,
}

pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: TtlStore<RateBucket>,
    token_buckets: TtlStore<TokenBucketState>,
    leaky_buckets: TtlStore<LeakyBucketState>,
    /// Penalty multiplier per identity; absent means 1.0.
    penalties: RwLock<HashMap<String, f64>>,
    /// Adaptively recomputed per-identity limits.
    user_limits: RwLock<HashMap<String, u32>>,
    /// Recent usage ratios (count / limit) per identity.
    usage_history: RwLock<HashMap<String, UsageTrack>>,
    total_checked: AtomicU64,
    total_denied: AtomicU64,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, capacity: usize) -> Self {
        // Buckets idle for 10 windows are garbage.
        let bucket_ttl = config.window_ms.saturating_mul(10);
        Self {
            config,
            buckets: TtlStore::new(capacity).with_default_ttl_ms(bucket_ttl),
            token_buckets: TtlStore::new(capacity).with_default_ttl_ms(bucket_ttl),
            leaky_buckets: TtlStore::new(capacity).with_default_ttl_ms(bucket_ttl),
            penalties: RwLock::new(HashMap::new()),
            user_limits: RwLock::new(HashMap::new()),
            usage_history: RwLock::new(HashMap::new()),
            total_checked: AtomicU64::new(0),
            total_denied: AtomicU64::new(0),
        }
    }

    fn bucket_key(id: &str, endpoint: &str) -> String {
        format!("{}|{}", id, endpoint)
    }

    fn penalty_of(&self, id: &str) -> f64 {
        self.penalties.read().get(id).copied().unwrap_or(1.0)
    }

    /// Base limit for an identity: adaptive override or the default.
    fn base_limit(&self, id: &str) -> u32 {
        self.user_limits
            .read()
            .get(id)
            .copied()
            .unwrap_or(self.config.default_limit)
    }

    /// Effective limit after penalty division and risk shrink. Never below 1.
    fn effective_limit(&self, base: u32, penalty: f64, risk_score: Option<f64>) -> u32 {
        let mut limit = (f64::from(base) / penalty).floor();
        if let Some(risk) = risk_score {
            if risk > 0.0 && risk <= 1.0 {
                limit = (limit * (1.0 - 0.7 * risk)).floor();
            }
        }
        limit.max(1.0) as u32
    }

    /// Sliding-window check for one request at `now_ms`.
    pub fn check(&self, id: &str, now_ms: i64, opts: &CheckOptions) -> RateCheck {
        self.total_checked.fetch_add(1, Ordering::Relaxed);

        let window = opts.window_ms.unwrap_or(self.config.window_ms).max(1);
        let endpoint = opts.endpoint.as_deref().unwrap_or("global");
        let penalty = self.penalty_of(id);
        let base = opts.limit.unwrap_or_else(|| self.base_limit(id));
        let limit = self.effective_limit(base, penalty, opts.risk_score);
        let burst_limit = ((f64::from(limit) * self.config.burst_multiplier).floor() as u32)
            .max(limit + 1);

        let key = Self::bucket_key(id, endpoint);
        let ttl = Some(window.saturating_mul(10));
        let outcome = self.buckets.mutate_or_insert(
            &key,
            || RateBucket {
                requests: Vec::new(),
                created_at_ms: now_ms,
                violations: 0,
            },
            |bucket| {
                bucket.requests.retain(|ts| *ts > now_ms - window);
                let current = bucket.requests.len() as u32;
                // denied attempts still land in the log so sustained abuse
                // walks the count toward the burst ceiling
                bucket.requests.push(now_ms);
                if bucket.requests.len() > MAX_BUCKET_LOG {
                    let excess = bucket.requests.len() - MAX_BUCKET_LOG;
                    bucket.requests.drain(..excess);
                }
                let oldest = bucket.requests.first().copied().unwrap_or(now_ms);
                if current >= limit {
                    // severity 1.0 at the burst ceiling, linear below it
                    let severity = if current >= burst_limit {
                        1.0
                    } else {
                        f64::from(current - limit) / f64::from(burst_limit - limit)
                    };
                    bucket.violations += 1;
                    (current, Some(severity), oldest)
                } else {
                    (current, None, oldest)
                }
            },
            ttl,
        );
        let (pre_count, denied_severity, oldest) = outcome;
        let current_count = if denied_severity.is_some() {
            pre_count
        } else {
            pre_count + 1
        };
        let reset_in_ms = (oldest + window - now_ms).max(0);

        self.record_usage(id, f64::from(current_count) / f64::from(limit), opts.risk_score);

        match denied_severity {
            Some(severity) => {
                self.total_denied.fetch_add(1, Ordering::Relaxed);
                let new_penalty = self.escalate_penalty(id, severity);
                let reason = if current_count >= burst_limit {
                    RateDenyReason::BurstExceeded
                } else {
                    RateDenyReason::RateExceeded
                };
                let retry_after_ms =
                    ((window as f64 / 10.0) * severity * new_penalty).ceil() as i64;
                warn!(
                    identity = %id,
                    endpoint = %endpoint,
                    count = current_count,
                    limit = limit,
                    severity = severity,
                    "rate limit exceeded"
                );
                RateCheck {
                    allowed: false,
                    remaining: 0,
                    reset_in_ms,
                    limit,
                    current_count,
                    severity: Some(severity),
                    reason: Some(reason),
                    retry_after_ms: Some(retry_after_ms.max(1)),
                }
            }
            None => {
                // reward judged on the pre-admission count so a limit of 1
                // can still earn its way back to neutral
                if self.config.adaptive && f64::from(pre_count) < f64::from(limit) / 2.0 {
                    self.reward_penalty(id);
                }
                RateCheck {
                    allowed: true,
                    remaining: limit.saturating_sub(current_count),
                    reset_in_ms,
                    limit,
                    current_count,
                    severity: None,
                    reason: None,
                    retry_after_ms: None,
                }
            }
        }
    }

    /// Raise the identity's penalty with the violation severity; capped at 10.
    fn escalate_penalty(&self, id: &str, severity: f64) -> f64 {
        let mut penalties = self.penalties.write();
        let penalty = penalties.entry(id.to_string()).or_insert(1.0);
        *penalty = (*penalty * (1.0 + 0.5 * severity)).min(MAX_PENALTY);
        *penalty
    }

    /// Decay the penalty toward 1 on compliant traffic; forget it once it
    /// is within epsilon of neutral.
    fn reward_penalty(&self, id: &str) {
        let mut penalties = self.penalties.write();
        if let Some(penalty) = penalties.get_mut(id) {
            *penalty = (*penalty * self.config.penalty_decay).max(1.0);
            if *penalty - 1.0 < PENALTY_EPSILON {
                penalties.remove(id);
            }
        }
    }

    fn record_usage(&self, id: &str, ratio: f64, risk_score: Option<f64>) {
        let should_adapt = {
            let mut history = self.usage_history.write();
            let track = history.entry(id.to_string()).or_default();
            track.samples.push(ratio.min(2.0));
            track.seen += 1;
            if track.samples.len() > MAX_USAGE_SAMPLES {
                let excess = track.samples.len() - MAX_USAGE_SAMPLES;
                track.samples.drain(..excess);
            }
            self.config.adaptive
                && track.seen >= ADAPT_MIN_SAMPLES as u64
                && track.seen % ADAPT_MIN_SAMPLES as u64 == 0
        };
        if should_adapt {
            self.recompute_limit(id, risk_score.unwrap_or(0.0));
        }
    }

    /// Recompute the identity's limit from observed usage: quiet callers get
    /// 20% more headroom, saturating callers 20% less, clamped to
    /// [0.1, 3]× the default and shrunk by current risk.
    pub fn recompute_limit(&self, id: &str, risk_score: f64) {
        let (mean_usage, peak_usage, enough) = {
            let history = self.usage_history.read();
            match history.get(id) {
                Some(track) if track.samples.len() >= ADAPT_MIN_SAMPLES => (
                    stats::mean(&track.samples),
                    track.samples.iter().copied().fold(0.0, f64::max),
                    true,
                ),
                _ => (0.0, 0.0, false),
            }
        };
        if !enough {
            return;
        }
        let current = f64::from(self.base_limit(id));
        let mut next = if mean_usage < 0.3 && peak_usage < 0.5 {
            current * 1.2
        } else if mean_usage > 0.8 || peak_usage > 0.95 {
            current * 0.8
        } else {
            current
        };
        let default = f64::from(self.config.default_limit);
        next = next.clamp(default * 0.1, default * 3.0);
        next *= 1.0 - 0.5 * stats::clamp01(risk_score);
        let next = (next.floor() as u32).max(1);
        debug!(identity = %id, limit = next, mean = mean_usage, peak = peak_usage, "adaptive limit recomputed");
        self.user_limits.write().insert(id.to_string(), next);
    }

    /// Token-bucket alternate: capacity tokens, refilled at limit/window.
    pub fn check_token_bucket(&self, id: &str, now_ms: i64, cost: f64) -> bool {
        let capacity = f64::from(self.config.default_limit);
        let refill_per_ms = capacity / self.config.window_ms as f64;
        let key = format!("token:{}", id);
        self.token_buckets.mutate_or_insert(
            &key,
            || TokenBucketState {
                tokens: capacity,
                last_refill_ms: now_ms,
            },
            |state| {
                let elapsed = (now_ms - state.last_refill_ms).max(0) as f64;
                state.tokens = (state.tokens + elapsed * refill_per_ms).min(capacity);
                state.last_refill_ms = now_ms;
                if state.tokens >= cost {
                    state.tokens -= cost;
                    true
                } else {
                    false
                }
            },
            None,
        )
    }

    /// Leaky-bucket alternate: constant drain, overflow denies.
    pub fn check_leaky_bucket(
        &self,
        id: &str,
        now_ms: i64,
        capacity: f64,
        leak_per_sec: f64,
        amount: f64,
    ) -> bool {
        let key = format!("leaky:{}", id);
        self.leaky_buckets.mutate_or_insert(
            &key,
            || LeakyBucketState {
                level: 0.0,
                last_leak_ms: now_ms,
            },
            |state| {
                let elapsed_s = (now_ms - state.last_leak_ms).max(0) as f64 / 1000.0;
                state.level = (state.level - elapsed_s * leak_per_sec).max(0.0);
                state.last_leak_ms = now_ms;
                if state.level + amount <= capacity {
                    state.level += amount;
                    true
                } else {
                    false
                }
            },
            None,
        )
    }

    /// Weighted sliding-window usage: each in-window timestamp counts
    /// `1 - age/window`, so pressure fades smoothly instead of cliff-edging.
    pub fn weighted_usage(&self, id: &str, endpoint: &str, now_ms: i64) -> f64 {
        let window = self.config.window_ms as f64;
        let key = Self::bucket_key(id, endpoint);
        match self.buckets.get(&key) {
            Some(bucket) => bucket
                .requests
                .iter()
                .filter(|ts| **ts > now_ms - self.config.window_ms)
                .map(|ts| 1.0 - (now_ms - ts) as f64 / window)
                .sum(),
            None => 0.0,
        }
    }

    /// Current penalty for an identity (1.0 when none).
    pub fn penalty(&self, id: &str) -> f64 {
        self.penalty_of(id)
    }

    /// Total violations recorded for an identity across endpoints.
    pub fn violations(&self, id: &str) -> u32 {
        let prefix = format!("{}|*", id);
        self.buckets
            .keys(Some(&prefix))
            .iter()
            .filter_map(|key| self.buckets.get(key))
            .map(|bucket| bucket.violations)
            .sum()
    }

    /// Drop every trace of an identity: buckets, penalty, adaptive limit,
    /// usage history, token/leaky state.
    pub fn reset(&self, id: &str) {
        for key in self.buckets.keys(Some(&format!("{}|*", id))) {
            self.buckets.delete(&key);
        }
        self.token_buckets.delete(&format!("token:{}", id));
        self.leaky_buckets.delete(&format!("leaky:{}", id));
        self.penalties.write().remove(id);
        self.user_limits.write().remove(id);
        self.usage_history.write().remove(id);
    }

    /// Periodic sweep of expired buckets.
    pub fn cleanup(&self) -> usize {
        self.buckets.cleanup() + self.token_buckets.cleanup() + self.leaky_buckets.cleanup()
    }

    pub fn report(&self) -> RateLimiterReport {
        RateLimiterReport {
            total_checked: self.total_checked.load(Ordering::Relaxed),
            total_denied: self.total_denied.load(Ordering::Relaxed),
            active_buckets: self.buckets.len(),
            penalized_identities: self.penalties.read().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(limit: u32, window_ms: i64) -> RateLimiter {
        RateLimiter::new(
            RateLimitConfig {
                default_limit: limit,
                window_ms,
                ..RateLimitConfig::default()
            },
            1000,
        )
    }

    #[test]
    fn test_within_limit_all_allowed() {
        let rl = limiter(10, 10_000);
        for i in 0..10 {
            let check = rl.check("alice", 1_000 + i * 10, &CheckOptions::default());
            assert!(check.allowed, "request {} should be allowed", i);
        }
        let denied = rl.check("alice", 1_200, &CheckOptions::default());
        assert!(!denied.allowed);
        assert_eq!(denied.reason, Some(RateDenyReason::RateExceeded));
        assert!(denied.retry_after_ms.unwrap() > 0);
    }

    #[test]
    fn test_window_recovery() {
        let rl = limiter(10, 10_000);
        let start = 1_000;
        for i in 0..11 {
            rl.check("bob", start + i * 10, &CheckOptions::default());
        }
        // after the window has passed since the oldest admitted request,
        // capacity is restored
        let later = start + 10_000 + 200;
        let check = rl.check("bob", later, &CheckOptions::default());
        assert!(check.allowed);
        assert_eq!(check.remaining, check.limit - 1);
    }

    #[test]
    fn test_penalty_bounded_and_decays() {
        let rl = limiter(5, 10_000);
        // hammer far past the burst ceiling
        for i in 0..200 {
            rl.check("mallory", 1_000 + i, &CheckOptions::default());
        }
        let p = rl.penalty("mallory");
        assert!(p > 1.0 && p <= MAX_PENALTY);

        // compliant traffic decays the penalty back toward 1
        let mut now = 1_000_000;
        for _ in 0..200 {
            rl.check("mallory", now, &CheckOptions::default());
            now += 60_000;
        }
        assert!((rl.penalty("mallory") - 1.0).abs() < 0.05);
    }

    #[test]
    fn test_risk_score_shrinks_limit() {
        let rl = limiter(100, 60_000);
        let opts = CheckOptions {
            risk_score: Some(0.5),
            ..CheckOptions::default()
        };
        let check = rl.check("carol", 1_000, &opts);
        // 100 * (1 - 0.35) = 65
        assert_eq!(check.limit, 65);
        let clean = rl.check("dave", 1_000, &CheckOptions::default());
        assert_eq!(clean.limit, 100);
    }

    #[test]
    fn test_effective_limit_floor_at_one() {
        let rl = limiter(2, 60_000);
        {
            rl.penalties.write().insert("spam".into(), 10.0);
        }
        let opts = CheckOptions {
            risk_score: Some(1.0),
            ..CheckOptions::default()
        };
        let check = rl.check("spam", 1_000, &opts);
        assert_eq!(check.limit, 1);
    }

    #[test]
    fn test_burst_reason_and_full_severity() {
        let rl = limiter(5, 60_000);
        let mut last = None;
        for i in 0..25 {
            last = Some(rl.check("eve", 1_000 + i, &CheckOptions::default()));
        }
        let last = last.unwrap();
        assert!(!last.allowed);
        assert_eq!(last.reason, Some(RateDenyReason::BurstExceeded));
        assert_eq!(last.severity, Some(1.0));
    }

    #[test]
    fn test_token_bucket_refills() {
        let rl = limiter(10, 10_000);
        for _ in 0..10 {
            assert!(rl.check_token_bucket("tk", 1_000, 1.0));
        }
        assert!(!rl.check_token_bucket("tk", 1_000, 1.0));
        // one token refills after window/limit = 1s
        assert!(rl.check_token_bucket("tk", 2_100, 1.0));
    }

    #[test]
    fn test_leaky_bucket_drains() {
        let rl = limiter(10, 10_000);
        for _ in 0..5 {
            assert!(rl.check_leaky_bucket("lk", 1_000, 5.0, 1.0, 1.0));
        }
        assert!(!rl.check_leaky_bucket("lk", 1_000, 5.0, 1.0, 1.0));
        // 2 seconds at leak 1/s drains room for two more
        assert!(rl.check_leaky_bucket("lk", 3_000, 5.0, 1.0, 1.0));
        assert!(rl.check_leaky_bucket("lk", 3_000, 5.0, 1.0, 1.0));
        assert!(!rl.check_leaky_bucket("lk", 3_000, 5.0, 1.0, 1.0));
    }

    #[test]
    fn test_weighted_usage_discounts_age() {
        let rl = limiter(10, 10_000);
        rl.check("w", 1_000, &CheckOptions::default());
        rl.check("w", 6_000, &CheckOptions::default());
        let usage = rl.weighted_usage("w", "global", 6_000);
        // fresh request ≈ 1.0, 5s-old request ≈ 0.5
        assert!(usage > 1.3 && usage < 1.6, "usage = {}", usage);
    }

    #[test]
    fn test_adaptive_lowers_saturated_limit() {
        let rl = limiter(10, 1_000);
        // saturate: every window full, for enough samples
        let mut now = 0;
        for _ in 0..60 {
            for _ in 0..10 {
                rl.check("hog", now, &CheckOptions::default());
            }
            now += 1_100;
        }
        let adapted = rl.base_limit("hog");
        assert!(adapted < 10, "adapted limit = {}", adapted);
        assert!(adapted >= 1);
    }

    #[test]
    fn test_reset_clears_all_state() {
        let rl = limiter(2, 10_000);
        for i in 0..10 {
            rl.check("gone", 1_000 + i, &CheckOptions::default());
        }
        assert!(rl.penalty("gone") > 1.0);
        rl.reset("gone");
        assert_eq!(rl.penalty("gone"), 1.0);
        assert_eq!(rl.violations("gone"), 0);
        let fresh = rl.check("gone", 2_000, &CheckOptions::default());
        assert!(fresh.allowed);
        assert_eq!(fresh.current_count, 1);
    }
}
