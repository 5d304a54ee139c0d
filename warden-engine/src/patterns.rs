//! Pattern detector — repeating sequences, temporal structure, and the
//! known-attack registry.
//!
//! Four detector families run over an identity's recent events:
//! - **Sequences**: repeating action sub-sequences (length 2..=10) that
//!   occur at least three times
//! - **Temporal**: periodic spacing, bursts, and clock-boundary alignment
//! - **Known attacks**: a compile-once registry of signatures (brute force,
//!   enumeration, scraping, card testing, account takeover, API abuse)
//! - **Coordination**: endpoint count outliers, payload repetition, IP
//!   rotation, one UA across many IPs, per-second hot spots
//!
//! Each detected pattern carries its own risk in [0, 1]; the aggregate is
//! `0.6·max + 0.3·mean + min(0.2, count/10)`, clamped.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use warden_core::stats;

use crate::types::Event;

const SIGNIFICANCE: usize = 3;
const MAX_SEQUENCE_PATTERNS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackType {
    BruteForce,
    Enumeration,
    Scraping,
    CardTesting,
    AccountTakeover,
    ApiAbuse,
}

impl AttackType {
    /// Stable wire name, used in block reasons ("detected_brute_force").
    pub fn name(&self) -> &'static str {
        match self {
            AttackType::BruteForce => "brute_force",
            AttackType::Enumeration => "enumeration",
            AttackType::Scraping => "scraping",
            AttackType::CardTesting => "card_testing",
            AttackType::AccountTakeover => "account_takeover",
            AttackType::ApiAbuse => "api_abuse",
        }
    }
}

/// One entry in the attack registry. The regex is matched against both the
/// endpoint and the action; optional constraints gate the match and, when
/// passed, sharpen the risk.
struct AttackSignature {
    attack: AttackType,
    pattern: Regex,
    min_repetitions: usize,
    /// Median interval between matching events must not exceed this.
    max_interval_ms: Option<f64>,
    /// Trailing numeric ids in endpoints must be mostly ascending.
    sequential_ids: bool,
    /// Interval coefficient of variation must be below 0.2.
    low_variance: bool,
    risk_multiplier: f64,
}

static ATTACK_REGISTRY: Lazy<Vec<AttackSignature>> = Lazy::new(|| {
    let compile = |pattern: &str| Regex::new(pattern).expect("attack signature regex");
    vec![
        AttackSignature {
            attack: AttackType::BruteForce,
            pattern: compile(r"(?i)login|signin|authenticate|auth\b"),
            min_repetitions: 5,
            max_interval_ms: Some(2_000.0),
            sequential_ids: false,
            low_variance: false,
            risk_multiplier: 1.5,
        },
        AttackSignature {
            attack: AttackType::Enumeration,
            pattern: compile(r"/\d+$|[?&]id=\d+"),
            min_repetitions: 10,
            max_interval_ms: None,
            sequential_ids: true,
            low_variance: false,
            risk_multiplier: 1.2,
        },
        AttackSignature {
            attack: AttackType::Scraping,
            pattern: compile(r"(?i)^/(?:products|catalog|listing|item|article|page|search)"),
            min_repetitions: 30,
            max_interval_ms: None,
            sequential_ids: false,
            low_variance: true,
            risk_multiplier: 1.0,
        },
        AttackSignature {
            attack: AttackType::CardTesting,
            pattern: compile(r"(?i)payment|checkout|card|billing"),
            min_repetitions: 5,
            max_interval_ms: Some(5_000.0),
            sequential_ids: false,
            low_variance: false,
            risk_multiplier: 1.8,
        },
        AttackSignature {
            attack: AttackType::AccountTakeover,
            pattern: compile(r"(?i)password|credential|2fa|mfa|recover"),
            min_repetitions: 3,
            max_interval_ms: None,
            sequential_ids: false,
            low_variance: false,
            risk_multiplier: 1.6,
        },
        AttackSignature {
            attack: AttackType::ApiAbuse,
            pattern: compile(r"(?i)^/api/"),
            min_repetitions: 60,
            max_interval_ms: Some(500.0),
            sequential_ids: false,
            low_variance: false,
            risk_multiplier: 1.2,
        },
    ]
});

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PatternKind {
    Sequence {
        actions: Vec<String>,
        count: usize,
    },
    Periodicity {
        interval_ms: i64,
        confidence: f64,
    },
    Burst {
        count: usize,
        duration_ms: i64,
        rate_per_sec: f64,
    },
    ClockAlignment {
        unit: String,
        fraction: f64,
    },
    KnownAttack {
        attack: AttackType,
        matches: usize,
    },
    EndpointAnomaly {
        endpoint: String,
        z: f64,
    },
    PayloadRepetition {
        ratio: f64,
    },
    IpRotation {
        distinct_ips: usize,
    },
    SharedUserAgent {
        distinct_ips: usize,
    },
    HighFrequency {
        peak_per_second: usize,
    },
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DetectedPattern {
    #[serde(flatten)]
    pub kind: PatternKind,
    pub risk: f64,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct PatternAnalysis {
    pub patterns: Vec<DetectedPattern>,
    pub risk: f64,
    pub attack_type: Option<AttackType>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PatternDetector;

impl PatternDetector {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, events: &[Event]) -> PatternAnalysis {
        if events.len() < 3 {
            return PatternAnalysis::default();
        }

        let mut patterns = Vec::new();
        patterns.extend(detect_sequences(events));
        patterns.extend(detect_temporal(events));
        patterns.extend(detect_known_attacks(events));
        patterns.extend(detect_coordination(events));

        let attack_type = patterns
            .iter()
            .filter_map(|p| match &p.kind {
                PatternKind::KnownAttack { attack, .. } => Some((*attack, p.risk)),
                _ => None,
            })
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(attack, _)| attack);

        let risk = aggregate_risk(&patterns);
        PatternAnalysis {
            patterns,
            risk,
            attack_type,
        }
    }
}

fn aggregate_risk(patterns: &[DetectedPattern]) -> f64 {
    if patterns.is_empty() {
        return 0.0;
    }
    let risks: Vec<f64> = patterns.iter().map(|p| p.risk).collect();
    let max = risks.iter().copied().fold(0.0, f64::max);
    let mean = stats::mean(&risks);
    stats::clamp01(0.6 * max + 0.3 * mean + (patterns.len() as f64 / 10.0).min(0.2))
}

/// Repeating action sub-sequences. Lengths 2..=min(10, n/2); a sub-sequence
/// is significant at ≥3 occurrences. Keeps the top 10 by risk.
fn detect_sequences(events: &[Event]) -> Vec<DetectedPattern> {
    let actions: Vec<&str> = events.iter().map(|e| e.action.as_str()).collect();
    let timestamps: Vec<i64> = events.iter().map(|e| e.timestamp_ms).collect();
    let n = actions.len();
    let max_len = (n / 2).min(10);
    if max_len < 2 {
        return Vec::new();
    }

    let mut found = Vec::new();
    for len in 2..=max_len {
        let mut occurrences: HashMap<&[&str], Vec<i64>> = HashMap::new();
        for (i, window) in actions.windows(len).enumerate() {
            occurrences.entry(window).or_default().push(timestamps[i]);
        }
        for (seq, starts) in occurrences {
            if starts.len() < SIGNIFICANCE {
                continue;
            }
            let count = starts.len();
            let gaps: Vec<f64> = starts.windows(2).map(|w| (w[1] - w[0]) as f64).collect();
            let regular_bonus = if gaps.len() >= 2 && stats::coefficient_of_variation(&gaps) < 0.2
            {
                0.3
            } else {
                0.0
            };
            let risk = stats::clamp01(
                (count as f64).log2() / 10.0 + 0.3 * len as f64 / max_len as f64 + regular_bonus,
            );
            found.push(DetectedPattern {
                kind: PatternKind::Sequence {
                    actions: seq.iter().map(|s| s.to_string()).collect(),
                    count,
                },
                risk,
            });
        }
    }
    // total order (risk desc, then sequence) so replayed streams keep the
    // same top-10 regardless of map iteration order
    found.sort_by(|a, b| {
        b.risk
            .partial_cmp(&a.risk)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| match (&a.kind, &b.kind) {
                (
                    PatternKind::Sequence { actions: sa, count: ca },
                    PatternKind::Sequence { actions: sb, count: cb },
                ) => sa.cmp(sb).then(ca.cmp(cb)),
                _ => std::cmp::Ordering::Equal,
            })
    });
    found.truncate(MAX_SEQUENCE_PATTERNS);
    found
}

fn detect_temporal(events: &[Event]) -> Vec<DetectedPattern> {
    let timestamps: Vec<i64> = events.iter().map(|e| e.timestamp_ms).collect();
    let intervals = stats::intervals_ms(&timestamps);
    let mut found = Vec::new();
    if intervals.is_empty() {
        return found;
    }

    // periodicity: ≥30% of intervals landing in the same 100ms bucket
    let mut buckets: HashMap<i64, usize> = HashMap::new();
    for interval in &intervals {
        *buckets.entry((interval / 100.0).round() as i64).or_insert(0) += 1;
    }
    if let Some((bucket, count)) = buckets.into_iter().max_by_key(|(_, c)| *c) {
        let confidence = count as f64 / intervals.len() as f64;
        if confidence >= 0.3 {
            found.push(DetectedPattern {
                kind: PatternKind::Periodicity {
                    interval_ms: bucket * 100,
                    confidence,
                },
                risk: stats::clamp01(0.6 * confidence),
            });
        }
    }

    // bursts: runs of ≥5 events with spacing under 0.2× the average
    let avg = stats::mean(&intervals);
    if avg > 0.0 {
        let cutoff = 0.2 * avg;
        let mut run_start = 0usize;
        let mut run_len = 0usize; // intervals in the current run
        let mut flush = |start: usize, len: usize, found: &mut Vec<DetectedPattern>| {
            // len intervals span len+1 events
            if len + 1 >= 5 {
                let duration_ms = (timestamps[start + len] - timestamps[start]).max(1);
                let rate = (len + 1) as f64 / (duration_ms as f64 / 1000.0);
                found.push(DetectedPattern {
                    kind: PatternKind::Burst {
                        count: len + 1,
                        duration_ms,
                        rate_per_sec: rate,
                    },
                    risk: stats::clamp01(
                        0.6 * (rate / 20.0).min(1.0) + 0.4 * ((len + 1) as f64 / 50.0).min(1.0),
                    ),
                });
            }
        };
        for (i, interval) in intervals.iter().enumerate() {
            if *interval < cutoff {
                if run_len == 0 {
                    run_start = i;
                }
                run_len += 1;
            } else {
                flush(run_start, run_len, &mut found);
                run_len = 0;
            }
        }
        flush(run_start, run_len, &mut found);
    }

    // clock alignment: events exactly on second/minute boundaries
    for (unit, modulus) in [("second", 1_000i64), ("minute", 60_000i64)] {
        let aligned = timestamps.iter().filter(|ts| *ts % modulus == 0).count();
        let fraction = aligned as f64 / timestamps.len() as f64;
        if fraction > 0.3 {
            found.push(DetectedPattern {
                kind: PatternKind::ClockAlignment {
                    unit: unit.to_string(),
                    fraction,
                },
                risk: stats::clamp01(0.6 * fraction),
            });
        }
    }

    found
}

fn detect_known_attacks(events: &[Event]) -> Vec<DetectedPattern> {
    let mut found = Vec::new();
    for signature in ATTACK_REGISTRY.iter() {
        let matching: Vec<&Event> = events
            .iter()
            .filter(|e| signature.pattern.is_match(&e.endpoint) || signature.pattern.is_match(&e.action))
            .collect();
        if matching.len() < signature.min_repetitions {
            continue;
        }

        let match_ts: Vec<i64> = matching.iter().map(|e| e.timestamp_ms).collect();
        let match_intervals = stats::intervals_ms(&match_ts);
        let mut bonus = 1.0;

        if let Some(max_interval) = signature.max_interval_ms {
            if stats::median(&match_intervals) > max_interval {
                continue;
            }
            bonus *= 1.2;
        }
        if signature.sequential_ids {
            if !ids_mostly_sequential(&matching) {
                continue;
            }
            bonus *= 1.3;
        }
        if signature.low_variance {
            if stats::coefficient_of_variation(&match_intervals) >= 0.2 {
                continue;
            }
            bonus *= 1.2;
        }

        let base = matching.len() as f64 / (3.0 * signature.min_repetitions as f64);
        found.push(DetectedPattern {
            kind: PatternKind::KnownAttack {
                attack: signature.attack,
                matches: matching.len(),
            },
            risk: stats::clamp01(base * signature.risk_multiplier * bonus),
        });
    }
    found
}

/// Trailing numeric ids extracted from endpoints; the signature matches
/// when ≥80% of consecutive ids step upward.
fn ids_mostly_sequential(events: &[&Event]) -> bool {
    static TRAILING_ID_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(\d+)$|[?&]id=(\d+)").expect("trailing id regex"));
    let ids: Vec<i64> = events
        .iter()
        .filter_map(|e| {
            TRAILING_ID_RE.captures(&e.endpoint).and_then(|caps| {
                caps.get(1)
                    .or_else(|| caps.get(2))
                    .and_then(|m| m.as_str().parse().ok())
            })
        })
        .collect();
    if ids.len() < 3 {
        return false;
    }
    let ascending = ids.windows(2).filter(|w| w[1] > w[0]).count();
    ascending as f64 / (ids.len() - 1) as f64 >= 0.8
}

fn detect_coordination(events: &[Event]) -> Vec<DetectedPattern> {
    let mut found = Vec::new();

    // endpoint whose hit count is a >3σ outlier
    let mut endpoint_counts: HashMap<&str, usize> = HashMap::new();
    for event in events {
        *endpoint_counts.entry(event.endpoint.as_str()).or_insert(0) += 1;
    }
    if endpoint_counts.len() >= 5 {
        let counts: Vec<f64> = endpoint_counts.values().map(|c| *c as f64).collect();
        let mean = stats::mean(&counts);
        let std = stats::std_dev(&counts);
        for (endpoint, count) in &endpoint_counts {
            let z = stats::z_score(*count as f64, mean, std);
            if z > 3.0 {
                found.push(DetectedPattern {
                    kind: PatternKind::EndpointAnomaly {
                        endpoint: endpoint.to_string(),
                        z,
                    },
                    risk: stats::clamp01(0.4 + z / 20.0),
                });
            }
        }
    }

    // payload repetition (zero-byte requests carry no signal)
    let mut payload_counts: HashMap<u64, usize> = HashMap::new();
    let mut with_payload = 0usize;
    for event in events.iter().filter(|e| e.payload_size > 0) {
        *payload_counts.entry(event.payload_size).or_insert(0) += 1;
        with_payload += 1;
    }
    if with_payload >= 10 {
        let peak = payload_counts.values().max().copied().unwrap_or(0);
        let ratio = peak as f64 / with_payload as f64;
        if ratio > 0.8 {
            found.push(DetectedPattern {
                kind: PatternKind::PayloadRepetition { ratio },
                risk: stats::clamp01(0.5 * ratio),
            });
        }
    }

    // IP rotation and one UA spread across many IPs
    let mut ips: Vec<&str> = events.iter().map(|e| e.ip.as_str()).collect();
    ips.sort_unstable();
    ips.dedup();
    if ips.len() >= 5 {
        found.push(DetectedPattern {
            kind: PatternKind::IpRotation {
                distinct_ips: ips.len(),
            },
            risk: stats::clamp01(0.3 + ips.len() as f64 / 20.0),
        });
    }
    let mut ua_ips: HashMap<&str, Vec<&str>> = HashMap::new();
    for event in events {
        let entry = ua_ips.entry(event.user_agent.as_str()).or_default();
        if !entry.contains(&event.ip.as_str()) {
            entry.push(event.ip.as_str());
        }
    }
    if let Some((_, shared_ips)) = ua_ips.iter().max_by_key(|(_, v)| v.len()) {
        if shared_ips.len() >= 3 {
            found.push(DetectedPattern {
                kind: PatternKind::SharedUserAgent {
                    distinct_ips: shared_ips.len(),
                },
                risk: 0.5,
            });
        }
    }

    // per-second hot spots
    let mut second_buckets: HashMap<i64, usize> = HashMap::new();
    for event in events {
        *second_buckets.entry(event.timestamp_ms / 1_000).or_insert(0) += 1;
    }
    if let Some(peak) = second_buckets.values().max().copied() {
        if peak > 20 {
            found.push(DetectedPattern {
                kind: PatternKind::HighFrequency {
                    peak_per_second: peak,
                },
                risk: stats::clamp01(peak as f64 / 50.0),
            });
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(ts: i64, action: &str, endpoint: &str, ip: &str) -> Event {
        Event {
            timestamp_ms: ts,
            action: action.into(),
            endpoint: endpoint.into(),
            ip: ip.into(),
            user_agent: "Mozilla/5.0".into(),
            response_time_ms: None,
            payload_size: 128,
            status_code: Some(200),
            method: "POST".into(),
        }
    }

    #[test]
    fn test_brute_force_detected() {
        let detector = PatternDetector::new();
        // 30 login attempts over 15 seconds
        let events: Vec<Event> = (0..30)
            .map(|i| event(1_000 + i * 500, "login", "/api/login", "1.2.3.4"))
            .collect();
        let analysis = detector.analyze(&events);
        assert_eq!(analysis.attack_type, Some(AttackType::BruteForce));
        assert!(analysis.risk >= 0.6, "risk = {}", analysis.risk);
        let brute = analysis
            .patterns
            .iter()
            .find(|p| matches!(p.kind, PatternKind::KnownAttack { attack: AttackType::BruteForce, .. }))
            .unwrap();
        assert_eq!(brute.risk, 1.0);
    }

    #[test]
    fn test_periodicity_detected() {
        let detector = PatternDetector::new();
        let events: Vec<Event> = (0..50)
            .map(|i| event(1_000 + i * 1_000, "poll", "/api/data", "1.2.3.4"))
            .collect();
        let analysis = detector.analyze(&events);
        let periodic = analysis
            .patterns
            .iter()
            .find(|p| matches!(p.kind, PatternKind::Periodicity { .. }))
            .expect("periodicity pattern");
        match &periodic.kind {
            PatternKind::Periodicity {
                interval_ms,
                confidence,
            } => {
                assert_eq!(*interval_ms, 1_000);
                assert!((confidence - 1.0).abs() < 1e-9);
            }
            _ => unreachable!(),
        }
        assert!((periodic.risk - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_burst_detected() {
        let detector = PatternDetector::new();
        let mut events = Vec::new();
        let mut ts = 1_000;
        // slow traffic, then a 20-event burst at 10ms spacing
        for _ in 0..10 {
            events.push(event(ts, "view", "/home", "1.2.3.4"));
            ts += 5_000;
        }
        for _ in 0..20 {
            events.push(event(ts, "view", "/home", "1.2.3.4"));
            ts += 10;
        }
        let analysis = detector.analyze(&events);
        let burst = analysis
            .patterns
            .iter()
            .find(|p| matches!(p.kind, PatternKind::Burst { .. }))
            .expect("burst pattern");
        match &burst.kind {
            PatternKind::Burst { count, rate_per_sec, .. } => {
                assert!(*count >= 19);
                assert!(*rate_per_sec > 50.0);
            }
            _ => unreachable!(),
        }
        assert!(burst.risk > 0.6);
    }

    #[test]
    fn test_clock_alignment() {
        let detector = PatternDetector::new();
        // all timestamps exactly on second boundaries
        let events: Vec<Event> = (0..20)
            .map(|i| event((i + 1) * 7_000, "sync", "/api/sync", "1.2.3.4"))
            .collect();
        let analysis = detector.analyze(&events);
        assert!(analysis
            .patterns
            .iter()
            .any(|p| matches!(&p.kind, PatternKind::ClockAlignment { unit, fraction }
                if unit == "second" && *fraction > 0.9)));
    }

    #[test]
    fn test_enumeration_requires_sequential_ids() {
        let detector = PatternDetector::new();
        let sequential: Vec<Event> = (0..20)
            .map(|i| {
                event(
                    1_000 + i * 300,
                    "fetch",
                    &format!("/api/users/{}", 100 + i),
                    "1.2.3.4",
                )
            })
            .collect();
        let analysis = detector.analyze(&sequential);
        assert!(analysis
            .patterns
            .iter()
            .any(|p| matches!(p.kind, PatternKind::KnownAttack { attack: AttackType::Enumeration, .. })));

        // same endpoints shuffled out of order: no longer sequential
        let scattered: Vec<Event> = (0..20)
            .map(|i| {
                event(
                    1_000 + i * 300,
                    "fetch",
                    &format!("/api/users/{}", (i * 7919) % 97),
                    "1.2.3.4",
                )
            })
            .collect();
        let analysis = detector.analyze(&scattered);
        assert!(!analysis
            .patterns
            .iter()
            .any(|p| matches!(p.kind, PatternKind::KnownAttack { attack: AttackType::Enumeration, .. })));
    }

    #[test]
    fn test_payload_repetition_and_rotation() {
        let detector = PatternDetector::new();
        let events: Vec<Event> = (0..30)
            .map(|i| {
                let mut e = event(
                    1_000 + i * 700,
                    "submit",
                    "/api/form",
                    &format!("10.1.{}.{}", i % 8, i),
                );
                e.payload_size = if i == 0 { 999 } else { 512 };
                e
            })
            .collect();
        let analysis = detector.analyze(&events);
        assert!(analysis
            .patterns
            .iter()
            .any(|p| matches!(p.kind, PatternKind::PayloadRepetition { .. })));
        assert!(analysis
            .patterns
            .iter()
            .any(|p| matches!(p.kind, PatternKind::IpRotation { .. })));
        assert!(analysis
            .patterns
            .iter()
            .any(|p| matches!(p.kind, PatternKind::SharedUserAgent { .. })));
    }

    #[test]
    fn test_high_frequency_bucket() {
        let detector = PatternDetector::new();
        // 40 events inside one second
        let events: Vec<Event> = (0..40)
            .map(|i| event(5_000 + i * 20, "spam", "/api/x", "1.2.3.4"))
            .collect();
        let analysis = detector.analyze(&events);
        assert!(analysis
            .patterns
            .iter()
            .any(|p| matches!(p.kind, PatternKind::HighFrequency { peak_per_second } if peak_per_second >= 21)));
    }

    #[test]
    fn test_quiet_traffic_no_patterns() {
        let detector = PatternDetector::new();
        let actions = ["view", "search", "click", "browse", "read"];
        let events: Vec<Event> = (0..8)
            .map(|i| {
                event(
                    1_000 + i * 9_173 + (i * i * 311) % 2_500,
                    actions[i as usize % actions.len()],
                    &format!("/page/{}", (i * 13) % 7),
                    "1.2.3.4",
                )
            })
            .collect();
        let analysis = detector.analyze(&events);
        assert_eq!(analysis.attack_type, None);
        assert!(analysis.risk < 0.5, "risk = {}", analysis.risk);
    }

    #[test]
    fn test_sequences_capped_at_ten() {
        let detector = PatternDetector::new();
        let events: Vec<Event> = (0..200)
            .map(|i| event(1_000 + i * 250, "cycle", "/loop", "1.2.3.4"))
            .collect();
        let analysis = detector.analyze(&events);
        let sequences = analysis
            .patterns
            .iter()
            .filter(|p| matches!(p.kind, PatternKind::Sequence { .. }))
            .count();
        assert!(sequences <= MAX_SEQUENCE_PATTERNS);
        assert!(sequences > 0);
    }

    #[test]
    fn test_aggregate_risk_clamped() {
        let patterns: Vec<DetectedPattern> = (0..30)
            .map(|_| DetectedPattern {
                kind: PatternKind::PayloadRepetition { ratio: 1.0 },
                risk: 1.0,
            })
            .collect();
        assert_eq!(aggregate_risk(&patterns), 1.0);
        assert_eq!(aggregate_risk(&[]), 0.0);
    }
}
