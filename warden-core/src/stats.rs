//! Numeric kernel — pure statistics used by every signal producer.
//!
//! Every function here is total: empty or degenerate input returns 0.0
//! rather than NaN or ±∞. Scores derived from these values are clamped at
//! every stage, so nothing non-finite can leak into a decision.

use std::collections::HashMap;
use std::hash::Hash;

/// Arithmetic mean. Empty input returns 0.0.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance. Fewer than two samples returns 0.0.
pub fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64
}

pub fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// Coefficient of variation (std/mean). Zero mean returns 0.0.
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    let m = mean(values);
    if m.abs() < f64::EPSILON {
        return 0.0;
    }
    std_dev(values) / m
}

/// Percentile in [0, 100] with linear interpolation between closest ranks.
/// Empty input returns 0.0; out-of-range `p` is clamped.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let p = p.clamp(0.0, 100.0);
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

pub fn median(values: &[f64]) -> f64 {
    percentile(values, 50.0)
}

/// (q1, median, q3).
pub fn quartiles(values: &[f64]) -> (f64, f64, f64) {
    (
        percentile(values, 25.0),
        percentile(values, 50.0),
        percentile(values, 75.0),
    )
}

/// Interquartile range.
pub fn iqr(values: &[f64]) -> f64 {
    let (q1, _, q3) = quartiles(values);
    q3 - q1
}

/// Standard score. Zero std returns 0.0.
pub fn z_score(value: f64, mean: f64, std: f64) -> f64 {
    if std.abs() < f64::EPSILON {
        return 0.0;
    }
    (value - mean) / std
}

/// Clamp into [0, 1], mapping non-finite input to 0.0.
pub fn clamp01(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// Logistic sigmoid.
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// One EWMA step: `alpha * value + (1 - alpha) * prev`.
pub fn ewma_step(prev: f64, value: f64, alpha: f64) -> f64 {
    let alpha = alpha.clamp(0.0, 1.0);
    alpha * value + (1.0 - alpha) * prev
}

/// EWMA folded over a series, seeded with the first element.
/// Empty input returns 0.0.
pub fn ewma(values: &[f64], alpha: f64) -> f64 {
    let mut iter = values.iter();
    let first = match iter.next() {
        Some(v) => *v,
        None => return 0.0,
    };
    iter.fold(first, |acc, v| ewma_step(acc, *v, alpha))
}

/// Cosine similarity of two equal-length vectors. Mismatched lengths or a
/// zero-magnitude vector return 0.0.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let mag_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if mag_a < f64::EPSILON || mag_b < f64::EPSILON {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

/// Euclidean distance of two equal-length vectors; mismatch returns 0.0.
pub fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Shannon entropy (bits) of a discrete sample.
pub fn shannon_entropy<T: Hash + Eq>(items: &[T]) -> f64 {
    if items.is_empty() {
        return 0.0;
    }
    let mut counts: HashMap<&T, usize> = HashMap::new();
    for item in items {
        *counts.entry(item).or_insert(0) += 1;
    }
    let n = items.len() as f64;
    counts
        .values()
        .map(|&c| {
            let p = c as f64 / n;
            -p * p.log2()
        })
        .sum()
}

/// Entropy normalized by the maximum for the observed alphabet size,
/// so the result is in [0, 1]. One distinct symbol (or none) returns 0.0.
pub fn normalized_entropy<T: Hash + Eq>(items: &[T]) -> f64 {
    if items.is_empty() {
        return 0.0;
    }
    let distinct: usize = {
        let mut set: HashMap<&T, ()> = HashMap::new();
        for item in items {
            set.insert(item, ());
        }
        set.len()
    };
    if distinct <= 1 {
        return 0.0;
    }
    clamp01(shannon_entropy(items) / (distinct as f64).log2())
}

/// Inter-arrival intervals of a timestamp series (ms). Non-monotone pairs
/// contribute 0.
pub fn intervals_ms(timestamps: &[i64]) -> Vec<f64> {
    timestamps
        .windows(2)
        .map(|w| (w[1] - w[0]).max(0) as f64)
        .collect()
}

/// Normalized entropy of inter-arrival intervals bucketed to `bucket_ms`.
/// Uniform robotic spacing collapses every interval into one bucket and
/// yields 0.0; human traffic spreads across buckets and trends toward 1.0.
pub fn interval_entropy(timestamps: &[i64], bucket_ms: i64) -> f64 {
    if timestamps.len() < 3 || bucket_ms <= 0 {
        return 0.0;
    }
    let buckets: Vec<i64> = intervals_ms(timestamps)
        .iter()
        .map(|iv| (*iv as i64) / bucket_ms)
        .collect();
    normalized_entropy(&buckets)
}

/// Levenshtein edit distance.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            cur[j + 1] = (prev[j + 1] + 1).min(cur[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

/// `1 - editDistance / maxLen`, in [0, 1]. Two empty strings are identical.
pub fn string_similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    clamp01(1.0 - levenshtein(a, b) as f64 / max_len as f64)
}
