//! Reputation — a decaying summary of an identity's past decisions.
//!
//! An EWMA (α = 0.3) over the last 20 decision scores is blended with the
//! windowed block ratio at 0.7/0.3. Both decay implicitly by windowing: an
//! identity that cleans up its traffic earns its reputation back without
//! any explicit clock.

use warden_core::{stats, TtlStore, WardenResult, MAX_HISTORY};

const EWMA_ALPHA: f64 = 0.3;
const SCORE_WINDOW: usize = 20;
const EWMA_BLEND: f64 = 0.7;
const BLOCK_RATIO_BLEND: f64 = 0.3;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ReputationEvent {
    pub timestamp_ms: i64,
    pub risk_score: f64,
    pub action: String,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ReputationRecord {
    /// Blended score in [0, 1]; higher is worse.
    pub score: f64,
    pub history: Vec<ReputationEvent>,
    pub first_seen_ms: i64,
    pub total_requests: u64,
    pub blocked_requests: u64,
}

/// The slice of reputation exposed in a decision's component breakdown.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ReputationSummary {
    pub score: f64,
    pub total_requests: u64,
    pub blocked_requests: u64,
    /// Block ratio over the recent window, not the lifetime.
    pub recent_block_ratio: f64,
    pub samples: usize,
}

pub struct ReputationTracker {
    store: TtlStore<ReputationRecord>,
}

impl ReputationTracker {
    pub fn new(capacity: usize, ttl_ms: i64) -> Self {
        Self {
            store: TtlStore::new(capacity).with_default_ttl_ms(ttl_ms),
        }
    }

    fn key(identity: &str) -> String {
        format!("rep:{}", identity)
    }

    /// Fold one decision into the identity's reputation; returns the new
    /// blended score.
    pub fn update(&self, identity: &str, risk_score: f64, action: &str, now_ms: i64) -> f64 {
        let blocking = matches!(action, "block" | "ban");
        self.store.mutate_or_insert(
            &Self::key(identity),
            || ReputationRecord {
                first_seen_ms: now_ms,
                ..ReputationRecord::default()
            },
            |record| {
                record.total_requests += 1;
                if blocking {
                    record.blocked_requests += 1;
                }
                record.history.push(ReputationEvent {
                    timestamp_ms: now_ms,
                    risk_score: stats::clamp01(risk_score),
                    action: action.to_string(),
                });
                if record.history.len() > MAX_HISTORY {
                    let excess = record.history.len() - MAX_HISTORY;
                    record.history.drain(..excess);
                }

                let window_start = record.history.len().saturating_sub(SCORE_WINDOW);
                let window = &record.history[window_start..];
                let scores: Vec<f64> = window.iter().map(|e| e.risk_score).collect();
                let blocked_in_window = window
                    .iter()
                    .filter(|e| matches!(e.action.as_str(), "block" | "ban"))
                    .count();
                let block_ratio = blocked_in_window as f64 / window.len().max(1) as f64;

                record.score = stats::clamp01(
                    EWMA_BLEND * stats::ewma(&scores, EWMA_ALPHA)
                        + BLOCK_RATIO_BLEND * block_ratio,
                );
                record.score
            },
            None,
        )
    }

    /// Current summary, or `None` for an unseen identity (which drops the
    /// reputation signal from fusion).
    pub fn get(&self, identity: &str) -> Option<ReputationSummary> {
        self.store.get(&Self::key(identity)).map(|record| {
            let window_start = record.history.len().saturating_sub(SCORE_WINDOW);
            let window = &record.history[window_start..];
            let blocked_in_window = window
                .iter()
                .filter(|e| matches!(e.action.as_str(), "block" | "ban"))
                .count();
            ReputationSummary {
                score: record.score,
                total_requests: record.total_requests,
                blocked_requests: record.blocked_requests,
                recent_block_ratio: blocked_in_window as f64 / window.len().max(1) as f64,
                samples: record.history.len(),
            }
        })
    }

    pub fn reset(&self, identity: &str) {
        self.store.delete(&Self::key(identity));
    }

    pub fn cleanup(&self) -> usize {
        self.store.cleanup()
    }

    pub fn export(&self) -> WardenResult<serde_json::Value> {
        self.store.export()
    }

    pub fn import(&self, snapshot: &serde_json::Value) -> WardenResult<usize> {
        self.store.import(snapshot)
    }
}
