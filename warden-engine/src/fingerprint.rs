//! Device fingerprinting — stable hash plus anomaly/bot scoring.
//!
//! Features:
//! - Deterministic 32-bit FNV-1a fingerprint over the significant request
//!   components (identical request → identical hash, always)
//! - User-agent parsing: browser + major version, OS, device class, bot UA
//! - IP classification into private / datacenter / residential by prefix
//! - Weighted anomaly indicators and a separate bot-likelihood score
//! - Per-identity fingerprint stability over the recent history
//! - Component-presence confidence and weighted fingerprint comparison

use once_cell::sync::Lazy;
use regex::Regex;

use warden_core::{stats, TtlStore, MAX_HISTORY};

use crate::types::RequestRecord;

/// UA substrings that identify automation tools and non-browser clients.
static BOT_UA_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)bot|crawler|spider|scraper|headless|phantom|selenium|puppeteer|playwright|webdriver|python|curl/|wget/|libwww|httpclient|okhttp|go-http|java/|axios|aiohttp",
    )
    .expect("bot UA regex")
});

static UA_VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(Chrome|Firefox|Edg|OPR|Version)/(\d+)").expect("ua version regex"));

/// Well-known cloud/hosting prefixes. Coarse on purpose: a datacenter hit
/// is one indicator among several, never a verdict on its own.
const DATACENTER_PREFIXES: &[&str] = &[
    "3.", "13.", "18.", "34.", "35.", "52.", "54.", // AWS
    "104.154.", "104.196.", "130.211.", "146.148.", "35.184.", // GCP
    "40.", "51.105.", "51.140.", "52.160.", "104.40.", // Azure
    "142.93.", "159.65.", "159.89.", "162.243.", "165.227.", "167.99.", "178.62.",
    "188.166.", "192.241.", "198.199.", "45.55.", // DigitalOcean
    "95.216.", "116.202.", "135.181.", "136.243.", "144.76.", "148.251.", "176.9.",
    "88.198.", "78.46.", "5.9.", "46.4.", // Hetzner
    "51.15.", "51.38.", "51.68.", "51.75.", "51.83.", "51.91.", "54.36.", "91.121.",
    "137.74.", "149.202.", "151.80.", "164.132.", "167.114.", "176.31.", "178.32.",
    "188.165.", // OVH/Scaleway
];

const PRIVATE_PREFIXES: &[&str] = &[
    "10.", "127.", "169.254.", "192.168.", "fc", "fd", "::1",
];

/// 32-bit FNV-1a, seed 0x811c9dc5.
pub fn fnv1a(input: &str) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in input.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Browser {
    Chrome,
    Firefox,
    Safari,
    Edge,
    Opera,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Os {
    Windows,
    MacOs,
    Linux,
    Android,
    Ios,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Mobile,
    Tablet,
    Desktop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IpClass {
    Private,
    Datacenter,
    Residential,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct UserAgentInfo {
    pub browser: Browser,
    pub major_version: Option<u32>,
    pub os: Os,
    pub device: DeviceClass,
    pub is_bot: bool,
}

/// The significant components a fingerprint is derived from, normalized.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FingerprintComponents {
    pub ua_hash: String,
    pub ip_prefix: String,
    pub languages: String,
    pub timezone: String,
    pub screen: String,
    pub platform: String,
    pub canvas: String,
    pub webgl: String,
    pub plugins_hash: String,
    pub fonts_hash: String,
}

impl FingerprintComponents {
    fn joined(&self) -> String {
        [
            self.ua_hash.as_str(),
            self.ip_prefix.as_str(),
            self.languages.as_str(),
            self.timezone.as_str(),
            self.screen.as_str(),
            self.platform.as_str(),
            self.canvas.as_str(),
            self.webgl.as_str(),
            self.plugins_hash.as_str(),
            self.fonts_hash.as_str(),
        ]
        .join("|")
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FingerprintSample {
    pub hash: u32,
    pub timestamp_ms: i64,
}

/// Outcome of comparing two fingerprints.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FingerprintMatch {
    pub similarity: f64,
    /// Counts as the same device at similarity above 0.8.
    pub is_match: bool,
}

/// Fingerprint verdict for one request.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FingerprintResult {
    /// Hex form of the 32-bit fingerprint.
    pub hash: String,
    pub components: FingerprintComponents,
    pub user_agent: UserAgentInfo,
    pub ip_class: IpClass,
    pub anomaly_score: f64,
    pub bot_score: f64,
    pub is_bot: bool,
    pub confidence: f64,
    /// False once the identity has cycled through ≥3 distinct fingerprints
    /// in its last 10 samples.
    pub stable: bool,
    pub distinct_recent: usize,
}

pub fn parse_user_agent(ua: &str) -> UserAgentInfo {
    let is_bot = !ua.is_empty() && BOT_UA_RE.is_match(ua);

    let browser = if ua.contains("Edg/") || ua.contains("Edge/") {
        Browser::Edge
    } else if ua.contains("OPR/") || ua.contains("Opera") {
        Browser::Opera
    } else if ua.contains("Chrome/") {
        Browser::Chrome
    } else if ua.contains("Firefox/") {
        Browser::Firefox
    } else if ua.contains("Safari/") {
        Browser::Safari
    } else {
        Browser::Other
    };

    let major_version = UA_VERSION_RE
        .captures(ua)
        .and_then(|caps| caps.get(2))
        .and_then(|m| m.as_str().parse().ok());

    let os = if ua.contains("Windows") {
        Os::Windows
    } else if ua.contains("Android") {
        Os::Android
    } else if ua.contains("iPhone") || ua.contains("iPad") || ua.contains("iOS") {
        Os::Ios
    } else if ua.contains("Mac OS X") || ua.contains("Macintosh") {
        Os::MacOs
    } else if ua.contains("Linux") {
        Os::Linux
    } else {
        Os::Other
    };

    let device = if ua.contains("iPad") || ua.contains("Tablet") {
        DeviceClass::Tablet
    } else if ua.contains("Mobi") || ua.contains("iPhone") {
        DeviceClass::Mobile
    } else {
        DeviceClass::Desktop
    };

    UserAgentInfo {
        browser,
        major_version,
        os,
        device,
        is_bot,
    }
}

pub fn classify_ip(ip: &str) -> IpClass {
    let lower = ip.to_ascii_lowercase();
    if PRIVATE_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        return IpClass::Private;
    }
    if lower.starts_with("172.") {
        // 172.16.0.0/12
        if let Some(second) = lower.split('.').nth(1).and_then(|s| s.parse::<u8>().ok()) {
            if (16..=31).contains(&second) {
                return IpClass::Private;
            }
        }
    }
    if DATACENTER_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        return IpClass::Datacenter;
    }
    IpClass::Residential
}

/// First three octets of an IPv4 address (or the first four groups of an
/// IPv6 one), used so a fingerprint survives DHCP churn inside a /24.
fn ip_prefix(ip: &str) -> String {
    if ip.contains(':') {
        return ip.split(':').take(4).collect::<Vec<_>>().join(":");
    }
    ip.split('.').take(3).collect::<Vec<_>>().join(".")
}

fn sorted_joined(values: &[String]) -> String {
    let mut sorted: Vec<&str> = values.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.join(",")
}

/// Primary codes of an Accept-Language header, sorted ("en-US,en;q=0.9" →
/// "en").
fn accept_language_primaries(header: Option<&str>) -> String {
    let mut primaries: Vec<String> = header
        .unwrap_or("")
        .split(',')
        .filter_map(|part| {
            let tag = part.split(';').next()?.trim();
            if tag.is_empty() {
                return None;
            }
            Some(
                tag.split('-')
                    .next()
                    .unwrap_or(tag)
                    .to_ascii_lowercase(),
            )
        })
        .collect();
    primaries.sort_unstable();
    primaries.dedup();
    primaries.join(",")
}

pub struct Fingerprinter {
    history: TtlStore<Vec<FingerprintSample>>,
}

impl Fingerprinter {
    pub fn new(capacity: usize) -> Self {
        Self {
            history: TtlStore::new(capacity),
        }
    }

    /// Build the normalized components for a request.
    pub fn components(record: &RequestRecord) -> FingerprintComponents {
        let ua = record.user_agent();
        let client = record.client.as_ref();
        let screen = match client.and_then(|c| c.screen_width.zip(c.screen_height)) {
            Some((w, h)) => format!("{}x{}", w, h),
            None => String::new(),
        };
        let hash_or_empty = |values: &[String]| {
            if values.is_empty() {
                String::new()
            } else {
                format!("{:08x}", fnv1a(&sorted_joined(values)))
            }
        };
        FingerprintComponents {
            ua_hash: if ua.is_empty() {
                String::new()
            } else {
                format!("{:08x}", fnv1a(ua))
            },
            ip_prefix: format!("{:08x}", fnv1a(&ip_prefix(&record.ip))),
            languages: accept_language_primaries(record.header("accept-language")),
            timezone: client
                .and_then(|c| c.timezone.clone())
                .unwrap_or_default(),
            screen,
            platform: client
                .and_then(|c| c.platform.clone())
                .unwrap_or_default(),
            canvas: client
                .and_then(|c| c.canvas_hash.clone())
                .unwrap_or_default(),
            webgl: client
                .and_then(|c| c.webgl_hash.clone())
                .unwrap_or_default(),
            plugins_hash: client
                .map(|c| hash_or_empty(&c.plugins))
                .unwrap_or_default(),
            fonts_hash: client
                .map(|c| hash_or_empty(&c.fonts))
                .unwrap_or_default(),
        }
    }

    /// Evaluate one request: hash, scores, and stability bookkeeping.
    pub fn evaluate(&self, identity: &str, record: &RequestRecord, now_ms: i64) -> FingerprintResult {
        let components = Self::components(record);
        let hash = fnv1a(&components.joined());
        let user_agent = parse_user_agent(record.user_agent());
        let ip_class = classify_ip(&record.ip);

        let anomaly_score = Self::anomaly_score(record, &user_agent, ip_class);
        let bot_score = Self::bot_score(record, &user_agent, ip_class);
        let confidence = Self::confidence(record);

        let recent: Vec<u32> = {
            self.history.push(
                identity,
                FingerprintSample {
                    hash,
                    timestamp_ms: now_ms,
                },
                MAX_HISTORY,
                None,
            );
            self.history
                .get(identity)
                .unwrap_or_default()
                .iter()
                .rev()
                .take(10)
                .map(|s| s.hash)
                .collect()
        };
        let distinct_recent = {
            let mut hashes = recent.clone();
            hashes.sort_unstable();
            hashes.dedup();
            hashes.len()
        };
        let stable = distinct_recent < 3;

        FingerprintResult {
            hash: format!("{:08x}", hash),
            components,
            user_agent,
            ip_class,
            anomaly_score,
            bot_score,
            is_bot: bot_score > 0.7,
            confidence,
            stable,
            distinct_recent,
        }
    }

    /// Weighted anomaly indicators, clamped into [0, 1].
    fn anomaly_score(record: &RequestRecord, ua: &UserAgentInfo, ip_class: IpClass) -> f64 {
        let client = record.client.as_ref();
        let mut score = 0.0;

        if ua.is_bot {
            score += 0.8;
        }
        if record.user_agent().is_empty() {
            score += 0.3;
        }
        if ip_class == IpClass::Datacenter {
            score += 0.4;
        }
        if ua.browser == Browser::Chrome && ua.major_version.map_or(false, |v| v < 70) {
            score += 0.2;
        }
        let timezone_missing = client.map_or(true, |c| c.timezone.is_none());
        let screen_missing =
            client.map_or(true, |c| c.screen_width.is_none() || c.screen_height.is_none());
        if timezone_missing && screen_missing {
            score += 0.3;
        }
        let canvas_missing = client.map_or(true, |c| c.canvas_hash.is_none());
        let webgl_missing = client.map_or(true, |c| c.webgl_hash.is_none());
        if canvas_missing && webgl_missing {
            score += 0.2;
        }
        if let Some(width) = client.and_then(|c| c.screen_width) {
            if width > 3840 || width < 320 {
                score += 0.15;
            }
        }
        if ua.device == DeviceClass::Mobile && client.and_then(|c| c.touch_support) == Some(false) {
            score += 0.25;
        }
        if ua.browser == Browser::Chrome
            && ua.os == Os::Windows
            && client.map_or(false, |c| c.plugins.is_empty() && c.has_js == Some(true))
        {
            score += 0.15;
        }
        if client.and_then(|c| c.cookies_enabled) == Some(false) {
            score += 0.1;
        }

        stats::clamp01(score)
    }

    /// Weighted bot likelihood, clamped into [0, 1]. `is_bot` fires at >0.7.
    fn bot_score(record: &RequestRecord, ua: &UserAgentInfo, ip_class: IpClass) -> f64 {
        let client = record.client.as_ref();
        let mut score = 0.0;

        if ua.is_bot {
            score += 0.9;
        }
        if client.and_then(|c| c.has_js) == Some(false) {
            score += 0.7;
        }
        if client.and_then(|c| c.phantom_markers) == Some(true) {
            score += 0.6;
        }
        if record.user_agent().contains("HeadlessChrome") {
            score += 0.95;
        }
        if client.and_then(|c| c.webdriver) == Some(true) {
            score += 1.0;
        }
        if ip_class == IpClass::Datacenter {
            score += 0.3;
        }

        stats::clamp01(score)
    }

    /// Fraction of expected components present, weighted, plus small
    /// bonuses for the expensive-to-fake ones.
    fn confidence(record: &RequestRecord) -> f64 {
        let client = record.client.as_ref();
        let mut score = 0.0;

        if !record.user_agent().is_empty() {
            score += 0.15;
        }
        if !record.ip.is_empty() {
            score += 0.20;
        }
        if client.map_or(false, |c| c.timezone.is_some()) {
            score += 0.10;
        }
        if client.map_or(false, |c| c.screen_width.is_some() && c.screen_height.is_some()) {
            score += 0.10;
        }
        if record.header("accept-language").is_some() {
            score += 0.10;
        }
        if record.header("accept-encoding").is_some() {
            score += 0.05;
        }
        if record.header("connection").is_some() {
            score += 0.05;
        }
        if client.map_or(false, |c| c.color_depth.is_some()) {
            score += 0.05;
        }
        if client.map_or(false, |c| c.platform.is_some()) {
            score += 0.05;
        }
        if client.map_or(false, |c| !c.plugins.is_empty()) {
            score += 0.05;
        }
        if client.map_or(false, |c| c.canvas_hash.is_some()) {
            score += 0.05 + 0.05;
        }
        if client.map_or(false, |c| c.webgl_hash.is_some()) {
            score += 0.05 + 0.05;
        }
        if client.map_or(false, |c| !c.fonts.is_empty()) {
            score += 0.03;
        }
        if client.map_or(false, |c| c.audio_hash.is_some()) {
            score += 0.02;
        }

        stats::clamp01(score)
    }

    /// Weighted similarity of two fingerprints: exact match is 1.0,
    /// otherwise component-wise equality with string similarity on the
    /// free-form fields. Similarity above 0.8 counts as the same device.
    pub fn compare(a: &FingerprintComponents, b: &FingerprintComponents) -> FingerprintMatch {
        if a == b {
            return FingerprintMatch {
                similarity: 1.0,
                is_match: true,
            };
        }
        let exact = |x: &str, y: &str| if x == y { 1.0 } else { 0.0 };
        let weighted = [
            (0.20, exact(&a.ua_hash, &b.ua_hash)),
            (0.15, exact(&a.ip_prefix, &b.ip_prefix)),
            (0.10, stats::string_similarity(&a.languages, &b.languages)),
            (0.10, stats::string_similarity(&a.timezone, &b.timezone)),
            (0.10, exact(&a.screen, &b.screen)),
            (0.10, stats::string_similarity(&a.platform, &b.platform)),
            (0.08, exact(&a.canvas, &b.canvas)),
            (0.07, exact(&a.webgl, &b.webgl)),
            (0.05, exact(&a.plugins_hash, &b.plugins_hash)),
            (0.05, exact(&a.fonts_hash, &b.fonts_hash)),
        ];
        let total: f64 = weighted.iter().map(|(w, _)| w).sum();
        let score: f64 = weighted.iter().map(|(w, s)| w * s).sum();
        let similarity = stats::clamp01(score / total);
        FingerprintMatch {
            similarity,
            is_match: similarity > 0.8,
        }
    }

    /// Whether an identity's device fingerprint is currently stable.
    pub fn is_stable(&self, identity: &str) -> bool {
        let samples = self.history.get(identity).unwrap_or_default();
        let mut recent: Vec<u32> = samples.iter().rev().take(10).map(|s| s.hash).collect();
        recent.sort_unstable();
        recent.dedup();
        recent.len() < 3
    }

    pub fn reset(&self, identity: &str) {
        self.history.delete(identity);
    }

    pub fn cleanup(&self) -> usize {
        self.history.cleanup()
    }
}
