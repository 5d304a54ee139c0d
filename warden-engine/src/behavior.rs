//! Behavior analyzer — per-identity baselines and six risk factors.
//!
//! Features:
//! - Feature extraction over the identity's recent event list (timing,
//!   entropy, diversity, volume)
//! - Per-identity baseline (mean/std/median/quartiles per feature) learned
//!   from the feature history, with a confidence that grows with samples
//! - Six sub-scores: statistical anomaly, velocity, rhythm, diversity,
//!   automation, session anomaly
//! - Weighted fusion of the factors that clear their inclusion thresholds
//!
//! Below `min_samples` events the analyzer refuses to guess: it returns a
//! neutral 0.5 marked unreliable, and the orchestrator drops it from
//! fusion.

use tracing::debug;

use warden_core::{stats, TtlStore, MAX_HISTORY};

use crate::types::Event;

pub const FEATURE_COUNT: usize = 13;

pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "interval_mean",
    "interval_std",
    "interval_entropy",
    "action_entropy",
    "endpoint_entropy",
    "event_count",
    "unique_actions",
    "unique_endpoints",
    "response_time_mean",
    "response_time_std",
    "payload_mean",
    "time_span_ms",
    "events_per_minute",
];

/// One extracted feature vector with its extraction time.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct FeatureVector {
    pub timestamp_ms: i64,
    pub values: [f64; FEATURE_COUNT],
}

/// Baseline statistics for a single feature.
#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct FeatureStats {
    pub mean: f64,
    pub std: f64,
    pub median: f64,
    pub q1: f64,
    pub q3: f64,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FeatureBaseline {
    pub features: [FeatureStats; FEATURE_COUNT],
    pub samples: usize,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct BehaviorProfile {
    pub feature_history: Vec<FeatureVector>,
    pub baseline: Option<FeatureBaseline>,
    /// min(history_len / 20, 1)
    pub confidence: f64,
    pub last_updated_ms: i64,
}

/// The six factor scores, each in [0, 1].
#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct BehaviorFactors {
    pub anomaly: f64,
    pub velocity: f64,
    pub rhythm: f64,
    pub diversity: f64,
    pub automation: f64,
    pub session_anomaly: f64,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct BehaviorResult {
    pub risk: f64,
    /// False below `min_samples`; the fuser drops unreliable results.
    pub reliable: bool,
    pub confidence: f64,
    pub factors: BehaviorFactors,
    /// Feature names whose z-score exceeded the anomaly threshold.
    pub flagged_features: Vec<String>,
}

// factor weights and inclusion thresholds
const W_ANOMALY: f64 = 0.25;
const W_VELOCITY: f64 = 0.20;
const W_AUTOMATION: f64 = 0.20;
const W_RHYTHM: f64 = 0.15;
const W_DIVERSITY: f64 = 0.10;
const W_SESSION: f64 = 0.10;

const T_ANOMALY: f64 = 0.3;
const T_VELOCITY: f64 = 0.5;
const T_RHYTHM: f64 = 0.4;
const T_LOW_DIVERSITY: f64 = 0.8;
const T_AUTOMATION: f64 = 0.6;
const T_SESSION: f64 = 0.5;

const MIN_BASELINE_SAMPLES: usize = 5;
const BASELINE_CONFIDENCE_GATE: f64 = 0.3;

pub struct BehaviorAnalyzer {
    profiles: TtlStore<BehaviorProfile>,
    min_samples: usize,
    anomaly_threshold: f64,
}

impl BehaviorAnalyzer {
    pub fn new(capacity: usize, min_samples: usize, anomaly_threshold: f64) -> Self {
        Self {
            profiles: TtlStore::new(capacity),
            min_samples: min_samples.max(2),
            anomaly_threshold: anomaly_threshold.max(0.1),
        }
    }

    /// Score the identity's recent events. Anomaly is judged against the
    /// baseline as it stood *before* this observation, then the profile is
    /// updated.
    pub fn analyze(&self, identity: &str, events: &[Event]) -> BehaviorResult {
        if events.len() < self.min_samples {
            return BehaviorResult {
                risk: 0.5,
                reliable: false,
                confidence: 0.0,
                factors: BehaviorFactors::default(),
                flagged_features: Vec::new(),
            };
        }

        let features = extract_features(events);
        let timestamps: Vec<i64> = events.iter().map(|e| e.timestamp_ms).collect();
        let intervals = stats::intervals_ms(&timestamps);

        let (anomaly, flagged_features, confidence) =
            self.score_anomaly(identity, &features);
        let factors = BehaviorFactors {
            anomaly,
            velocity: score_velocity(&features, &intervals),
            rhythm: score_rhythm(&intervals),
            diversity: score_diversity(events),
            automation: score_automation(events, &intervals),
            session_anomaly: score_session_anomaly(events),
        };

        self.update_profile(identity, features);

        let mut weight_sum = 0.0;
        let mut score_sum = 0.0;
        let mut include = |score: f64, weight: f64, threshold: f64| {
            if score > threshold {
                weight_sum += weight;
                score_sum += weight * score;
            }
        };
        include(factors.anomaly, W_ANOMALY, T_ANOMALY);
        include(factors.velocity, W_VELOCITY, T_VELOCITY);
        include(factors.rhythm, W_RHYTHM, T_RHYTHM);
        include(1.0 - factors.diversity, W_DIVERSITY, T_LOW_DIVERSITY);
        include(factors.automation, W_AUTOMATION, T_AUTOMATION);
        include(factors.session_anomaly, W_SESSION, T_SESSION);

        let risk = if weight_sum > 0.0 {
            stats::clamp01(score_sum / weight_sum)
        } else {
            0.0
        };

        if risk > 0.6 {
            debug!(identity = %identity, risk = risk, "elevated behavior risk");
        }

        BehaviorResult {
            risk,
            reliable: true,
            confidence,
            factors,
            flagged_features,
        }
    }

    /// Z-score the current features against the stored baseline.
    fn score_anomaly(
        &self,
        identity: &str,
        features: &FeatureVector,
    ) -> (f64, Vec<String>, f64) {
        let profile = self.profiles.get(identity).unwrap_or_default();
        let confidence = profile.confidence;
        let baseline = match &profile.baseline {
            Some(b) if confidence >= BASELINE_CONFIDENCE_GATE => b,
            _ => return (0.0, Vec::new(), confidence),
        };

        let mut flagged = Vec::new();
        let mut capped_z = [0.0; FEATURE_COUNT];
        for i in 0..FEATURE_COUNT {
            let fs = &baseline.features[i];
            let z = stats::z_score(features.values[i], fs.mean, fs.std).abs();
            if z > self.anomaly_threshold {
                flagged.push(FEATURE_NAMES[i].to_string());
            }
            capped_z[i] = (z / self.anomaly_threshold).min(2.0);
        }
        let score = stats::sigmoid(stats::mean(&capped_z) - 1.0);
        (stats::clamp01(score), flagged, confidence)
    }

    fn update_profile(&self, identity: &str, features: FeatureVector) {
        let now = features.timestamp_ms;
        self.profiles.mutate_or_insert(
            identity,
            BehaviorProfile::default,
            |profile| {
                profile.feature_history.push(features);
                if profile.feature_history.len() > MAX_HISTORY {
                    let excess = profile.feature_history.len() - MAX_HISTORY;
                    profile.feature_history.drain(..excess);
                }
                profile.confidence = (profile.feature_history.len() as f64 / 20.0).min(1.0);
                profile.last_updated_ms = now;
                if profile.feature_history.len() >= MIN_BASELINE_SAMPLES {
                    profile.baseline = Some(compute_baseline(&profile.feature_history));
                }
            },
            None,
        );
    }

    pub fn profile(&self, identity: &str) -> Option<BehaviorProfile> {
        self.profiles.get(identity)
    }

    pub fn reset(&self, identity: &str) {
        self.profiles.delete(identity);
    }

    pub fn cleanup(&self) -> usize {
        self.profiles.cleanup()
    }
}

/// Extract the feature vector for a (non-empty) event list.
pub fn extract_features(events: &[Event]) -> FeatureVector {
    let timestamps: Vec<i64> = events.iter().map(|e| e.timestamp_ms).collect();
    let intervals = stats::intervals_ms(&timestamps);
    let actions: Vec<&str> = events.iter().map(|e| e.action.as_str()).collect();
    let endpoints: Vec<&str> = events.iter().map(|e| e.endpoint.as_str()).collect();
    let response_times: Vec<f64> = events
        .iter()
        .filter_map(|e| e.response_time_ms)
        .map(|rt| rt as f64)
        .collect();
    let payloads: Vec<f64> = events.iter().map(|e| e.payload_size as f64).collect();

    let time_span_ms = match (timestamps.first(), timestamps.last()) {
        (Some(first), Some(last)) => (last - first).max(0) as f64,
        _ => 0.0,
    };
    let events_per_minute = if time_span_ms > 0.0 {
        events.len() as f64 / (time_span_ms / 60_000.0)
    } else {
        0.0
    };

    let distinct = |items: &[&str]| {
        let mut v: Vec<&str> = items.to_vec();
        v.sort_unstable();
        v.dedup();
        v.len() as f64
    };

    FeatureVector {
        timestamp_ms: timestamps.last().copied().unwrap_or(0),
        values: [
            stats::mean(&intervals),
            stats::std_dev(&intervals),
            stats::interval_entropy(&timestamps, 100),
            stats::normalized_entropy(&actions),
            stats::normalized_entropy(&endpoints),
            events.len() as f64,
            distinct(&actions),
            distinct(&endpoints),
            stats::mean(&response_times),
            stats::std_dev(&response_times),
            stats::mean(&payloads),
            time_span_ms,
            events_per_minute,
        ],
    }
}

fn compute_baseline(history: &[FeatureVector]) -> FeatureBaseline {
    let mut features = [FeatureStats::default(); FEATURE_COUNT];
    for (i, slot) in features.iter_mut().enumerate() {
        let series: Vec<f64> = history.iter().map(|fv| fv.values[i]).collect();
        let (q1, median, q3) = stats::quartiles(&series);
        *slot = FeatureStats {
            mean: stats::mean(&series),
            std: stats::std_dev(&series),
            median,
            q1,
            q3,
        };
    }
    FeatureBaseline {
        features,
        samples: history.len(),
    }
}

/// Bursts: maximal runs of ≥2 consecutive intervals below 0.2× the mean.
/// Returns (burst_count, longest_run).
fn detect_bursts(intervals: &[f64]) -> (usize, usize) {
    let mean = stats::mean(intervals);
    if mean <= 0.0 {
        return (0, 0);
    }
    let cutoff = 0.2 * mean;
    let mut bursts = 0;
    let mut longest = 0;
    let mut run = 0usize;
    for interval in intervals {
        if *interval < cutoff {
            run += 1;
        } else {
            if run >= 2 {
                bursts += 1;
                longest = longest.max(run);
            }
            run = 0;
        }
    }
    if run >= 2 {
        bursts += 1;
        longest = longest.max(run);
    }
    (bursts, longest)
}

fn score_velocity(features: &FeatureVector, intervals: &[f64]) -> f64 {
    let mut score = 0.0;
    let min_interval = intervals.iter().copied().fold(f64::INFINITY, f64::min);
    if min_interval < 50.0 {
        score += 0.4;
    } else if min_interval < 100.0 {
        score += 0.2;
    }
    let events_per_second = features.values[12] / 60.0;
    if events_per_second > 10.0 {
        score += 0.3;
    } else if events_per_second > 5.0 {
        score += 0.15;
    }
    let (bursts, longest) = detect_bursts(intervals);
    let burst_score =
        stats::clamp01(0.6 * bursts as f64 / 5.0 + 0.4 * longest as f64 / 20.0);
    score += 0.3 * burst_score;
    stats::clamp01(score)
}

fn score_rhythm(intervals: &[f64]) -> f64 {
    if intervals.len() < 3 {
        return 0.0;
    }
    let cv = stats::coefficient_of_variation(intervals);
    let mut score = if cv < 0.1 {
        0.8
    } else if cv < 0.2 {
        0.5
    } else if cv < 0.3 {
        0.2
    } else {
        0.0
    };
    // metronome check: intervals sitting within 20ms of a 100ms grid
    let on_grid = intervals
        .iter()
        .filter(|iv| {
            let rem = **iv % 100.0;
            rem <= 20.0 || rem >= 80.0
        })
        .count();
    if on_grid as f64 / intervals.len() as f64 > 0.8 {
        score += 0.2;
    }
    stats::clamp01(score)
}

/// Blend of unique-ratio and normalized entropy over actions and endpoints.
/// High diversity is humane; the caller inverts it.
fn score_diversity(events: &[Event]) -> f64 {
    let actions: Vec<&str> = events.iter().map(|e| e.action.as_str()).collect();
    let endpoints: Vec<&str> = events.iter().map(|e| e.endpoint.as_str()).collect();
    let unique_ratio = |items: &[&str]| {
        let mut v: Vec<&str> = items.to_vec();
        v.sort_unstable();
        v.dedup();
        v.len() as f64 / items.len().max(1) as f64
    };
    let action_part = 0.5 * unique_ratio(&actions) + 0.5 * stats::normalized_entropy(&actions);
    let endpoint_part =
        0.5 * unique_ratio(&endpoints) + 0.5 * stats::normalized_entropy(&endpoints);
    stats::clamp01(0.5 * action_part + 0.5 * endpoint_part)
}

fn score_automation(events: &[Event], intervals: &[f64]) -> f64 {
    if intervals.is_empty() {
        return 0.0;
    }
    // machine-grid intervals: multiples of 100/500/1000 ms within ±10ms
    let on_multiple = intervals
        .iter()
        .filter(|iv| {
            let rem = **iv % 100.0;
            **iv >= 90.0 && (rem <= 10.0 || rem >= 90.0)
        })
        .count() as f64
        / intervals.len() as f64;

    // most common interval (10ms resolution)
    let mut counts: std::collections::HashMap<i64, usize> = std::collections::HashMap::new();
    for interval in intervals {
        *counts.entry((*interval / 10.0).round() as i64).or_insert(0) += 1;
    }
    let repetition = counts.values().max().copied().unwrap_or(0) as f64 / intervals.len() as f64;

    // dominant action trigram coverage
    let actions: Vec<&str> = events.iter().map(|e| e.action.as_str()).collect();
    let sequence_repetition = if actions.len() >= 3 {
        let mut trigrams: std::collections::HashMap<(&str, &str, &str), usize> =
            std::collections::HashMap::new();
        for window in actions.windows(3) {
            *trigrams.entry((window[0], window[1], window[2])).or_insert(0) += 1;
        }
        trigrams.values().max().copied().unwrap_or(0) as f64 / (actions.len() - 2) as f64
    } else {
        0.0
    };

    // human markers: interaction events and organic response-time jitter
    let has_mouse = events
        .iter()
        .any(|e| e.action.contains("mouse") || e.action.contains("click"));
    let has_scroll = events.iter().any(|e| e.action.contains("scroll"));
    let response_times: Vec<f64> = events
        .iter()
        .filter_map(|e| e.response_time_ms)
        .map(|rt| rt as f64)
        .collect();
    let has_rt_jitter =
        response_times.len() >= 3 && stats::coefficient_of_variation(&response_times) >= 0.1;
    let missing_markers =
        [has_mouse, has_scroll, has_rt_jitter].iter().filter(|m| !**m).count() as f64 / 3.0;

    stats::clamp01(
        on_multiple * 0.3 + repetition * 0.2 + sequence_repetition * 0.25 + missing_markers * 0.25,
    )
}

fn score_session_anomaly(events: &[Event]) -> f64 {
    let timestamps: Vec<i64> = events.iter().map(|e| e.timestamp_ms).collect();
    let span = match (timestamps.first(), timestamps.last()) {
        (Some(first), Some(last)) => (last - first).max(0),
        _ => return 0.0,
    };
    let mut score = 0.0;
    if events.len() > 20 && span < 5_000 {
        score += 0.4;
    }
    let hours: Vec<i64> = timestamps.iter().map(|ts| (ts / 3_600_000) % 24).collect();
    if stats::normalized_entropy(&hours) < 0.2 {
        score += 0.2;
    }
    if span > 30 * 60_000 {
        let max_gap = stats::intervals_ms(&timestamps)
            .iter()
            .copied()
            .fold(0.0, f64::max);
        if max_gap <= 60_000.0 {
            score += 0.4;
        }
    }
    stats::clamp01(score)
}
