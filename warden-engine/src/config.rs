//! Engine configuration. Everything the orchestrator and the producers
//! tune is collected here and validated once at construction.

use warden_core::{WardenError, WardenResult};

/// Ascending score thresholds mapping the fused score to a risk level.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct RiskThresholds {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            low: 0.3,
            medium: 0.5,
            high: 0.7,
            critical: 0.9,
        }
    }
}

/// Per-signal fusion weights. They need not sum to 1; the fuser normalizes
/// by the weight sum of the signals actually present.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct SignalWeights {
    pub behavior: f64,
    pub patterns: f64,
    pub rate_limit: f64,
    pub fingerprint: f64,
    pub reputation: f64,
    pub session: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            behavior: 0.25,
            patterns: 0.25,
            rate_limit: 0.20,
            fingerprint: 0.15,
            reputation: 0.15,
            session: 0.15,
        }
    }
}

/// Upward clamps applied after the weighted fusion. A detected attack,
/// bot, or denied rate check can only raise the score, never lower it.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct FloorRules {
    pub attack: f64,
    pub bot: f64,
    pub rate_denied: f64,
}

impl Default for FloorRules {
    fn default() -> Self {
        Self {
            attack: 0.6,
            bot: 0.7,
            rate_denied: 0.5,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per window before penalties.
    pub default_limit: u32,
    pub window_ms: i64,
    /// Burst ceiling as a multiple of the effective limit.
    pub burst_multiplier: f64,
    /// Multiplicative penalty decay applied on compliant traffic.
    pub penalty_decay: f64,
    /// Whether penalties decay and per-identity limits adapt to usage.
    pub adaptive: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_limit: 100,
            window_ms: 60_000,
            burst_multiplier: 2.0,
            penalty_decay: 0.9,
            adaptive: true,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EngineConfig {
    pub thresholds: RiskThresholds,
    pub weights: SignalWeights,
    pub floors: FloorRules,
    pub rate_limit: RateLimitConfig,
    /// Capacity of each per-identity state store.
    pub store_capacity: usize,
    /// TTL on per-identity event/reputation state.
    pub state_ttl_ms: i64,
    /// Sweeper period for both background cleanups.
    pub cleanup_interval_ms: u64,
    /// Events required before the behavior analyzer reports as reliable.
    pub min_behavior_samples: usize,
    /// Z-score beyond which a behavioral feature is flagged.
    pub anomaly_threshold: f64,
    pub ban_duration_ms: i64,
    pub block_duration_ms: i64,
    pub throttle_factor: f64,
    /// Sustained speed between sessions that flags impossible travel.
    pub impossible_travel_kmh: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thresholds: RiskThresholds::default(),
            weights: SignalWeights::default(),
            floors: FloorRules::default(),
            rate_limit: RateLimitConfig::default(),
            store_capacity: 100_000,
            state_ttl_ms: 3_600_000,
            cleanup_interval_ms: 60_000,
            min_behavior_samples: 10,
            anomaly_threshold: 2.5,
            ban_duration_ms: 24 * 3_600_000,
            block_duration_ms: 3_600_000,
            throttle_factor: 0.5,
            impossible_travel_kmh: 900.0,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> WardenResult<()> {
        let t = &self.thresholds;
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        if !(in_unit(t.low) && in_unit(t.medium) && in_unit(t.high) && in_unit(t.critical)) {
            return Err(WardenError::Config(
                "thresholds must lie in [0, 1]".into(),
            ));
        }
        if !(t.low < t.medium && t.medium < t.high && t.high < t.critical) {
            return Err(WardenError::Config(
                "thresholds must be strictly ascending (low < medium < high < critical)".into(),
            ));
        }
        let w = &self.weights;
        let weights = [
            w.behavior,
            w.patterns,
            w.rate_limit,
            w.fingerprint,
            w.reputation,
            w.session,
        ];
        if weights.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(WardenError::Config(
                "signal weights must be finite and non-negative".into(),
            ));
        }
        if weights.iter().sum::<f64>() <= 0.0 {
            return Err(WardenError::Config(
                "at least one signal weight must be positive".into(),
            ));
        }
        let f = &self.floors;
        if ![f.attack, f.bot, f.rate_denied].iter().all(|v| in_unit(*v)) {
            return Err(WardenError::Config("floor rules must lie in [0, 1]".into()));
        }
        let rl = &self.rate_limit;
        if rl.default_limit == 0 {
            return Err(WardenError::Config("rate limit must be at least 1".into()));
        }
        if rl.window_ms <= 0 {
            return Err(WardenError::Config("rate window must be positive".into()));
        }
        if rl.burst_multiplier < 1.0 {
            return Err(WardenError::Config(
                "burst multiplier must be at least 1.0".into(),
            ));
        }
        if !(0.0..1.0).contains(&rl.penalty_decay) {
            return Err(WardenError::Config(
                "penalty decay must lie in [0, 1)".into(),
            ));
        }
        if self.store_capacity == 0 {
            return Err(WardenError::StoreCapacity(self.store_capacity));
        }
        if !(0.0..=1.0).contains(&self.throttle_factor) || self.throttle_factor == 0.0 {
            return Err(WardenError::Config(
                "throttle factor must lie in (0, 1]".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_non_ascending_thresholds() {
        let mut config = EngineConfig::default();
        config.thresholds.medium = 0.2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_out_of_range_threshold() {
        let mut config = EngineConfig::default();
        config.thresholds.critical = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_negative_weight() {
        let mut config = EngineConfig::default();
        config.weights.behavior = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_limit() {
        let mut config = EngineConfig::default();
        config.rate_limit.default_limit = 0;
        assert!(config.validate().is_err());
    }
}
