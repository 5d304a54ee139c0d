//! End-to-end scenarios for the Warden risk engine.
//!
//! These replay literal request streams against a fresh engine and assert
//! on the decisions: brute-force lockout, robotic-timing detection, clean
//! cold starts, bot user agents, rate-limit recovery, impossible travel,
//! and replay determinism. Streams carry explicit timestamps so nothing
//! here sleeps or depends on the wall clock.

use std::sync::Arc;

use warden_engine::{
    ClientHints, EngineConfig, GeoPoint, MitigationAction, RequestRecord, RiskEngine, RiskLevel,
};

const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

fn engine() -> Arc<RiskEngine> {
    engine_with(EngineConfig::default())
}

fn engine_with(mut config: EngineConfig) -> Arc<RiskEngine> {
    // keep background sweepers out of the way of timestamp-driven tests
    config.cleanup_interval_ms = 3_600_000;
    RiskEngine::new(config).unwrap()
}

fn request(ip: &str, endpoint: &str, action: &str, ua: &str, ts: i64) -> RequestRecord {
    let mut record = RequestRecord {
        ip: ip.into(),
        method: "POST".into(),
        path: endpoint.into(),
        endpoint: endpoint.into(),
        action: action.into(),
        timestamp_ms: Some(ts),
        ..RequestRecord::default()
    };
    record.headers.insert("User-Agent".into(), ua.into());
    record
}

// ── Scenario 1: brute-force login ────────────────────────────────────────

#[test]
fn test_brute_force_login_is_blocked() {
    let engine = engine();
    let base = 1_700_000_000_000;
    let mut first_block = None;
    let mut attack_seen = false;

    for i in 0..30 {
        let record = request("1.2.3.4", "/api/login", "login", "Mozilla/5.0", base + i * 500);
        let decision = engine.evaluate(&record);

        if let Some(patterns) = &decision.components.patterns {
            if patterns.attack_type.is_some() {
                attack_seen = true;
            }
        }
        if first_block.is_none() {
            if let MitigationAction::Block { reason, .. } | MitigationAction::Ban { reason, .. } =
                &decision.action
            {
                first_block = Some((i, reason.clone()));
            }
        }
    }

    assert!(attack_seen, "brute force attack type never identified");
    let (index, reason) = first_block.expect("no block/ban before request 30");
    assert!(index < 29, "blocked only on the final request");
    assert!(
        reason.starts_with("detected_") || reason == "rate_limit_exceeded",
        "unexpected reason: {}",
        reason
    );
    engine.destroy();
}

// ── Scenario 2: robotic timing ───────────────────────────────────────────

#[test]
fn test_robotic_timing_gets_challenged_or_worse() {
    let engine = engine();
    let base = 1_700_000_000_000;
    let mut last = None;

    for i in 0..100 {
        let record = request(
            "99.88.77.66",
            "/api/data",
            "poll",
            "Mozilla/5.0",
            base + i * 1_000,
        );
        last = Some(engine.evaluate(&record));
    }

    let decision = last.unwrap();
    let behavior = decision.components.behavior.as_ref().unwrap();
    assert!(behavior.reliable);
    assert!(
        behavior.factors.automation >= 0.6,
        "automation = {}",
        behavior.factors.automation
    );
    assert!(behavior.factors.rhythm >= 0.5, "rhythm = {}", behavior.factors.rhythm);
    assert!(behavior.risk >= 0.6, "behavior risk = {}", behavior.risk);
    assert_ne!(
        decision.action.kind(),
        "allow",
        "robotic traffic should at least be challenged"
    );
    engine.destroy();
}

// ── Scenario 3: cold-start legitimate user ───────────────────────────────

#[test]
fn test_cold_start_legitimate_user_allowed() {
    let engine = engine();
    let mut record = request("93.184.216.34", "/home", "view", BROWSER_UA, 1_700_000_000_000);
    record.method = "GET".into();
    record
        .headers
        .insert("Accept-Language".into(), "en-US,en;q=0.9".into());
    record
        .headers
        .insert("Accept-Encoding".into(), "gzip, deflate, br".into());
    record.headers.insert("Connection".into(), "keep-alive".into());
    record.client = Some(ClientHints {
        timezone: Some("America/Chicago".into()),
        screen_width: Some(2560),
        screen_height: Some(1440),
        color_depth: Some(24),
        platform: Some("Win32".into()),
        touch_support: Some(false),
        cookies_enabled: Some(true),
        has_js: Some(true),
        canvas_hash: Some("a1b2c3".into()),
        webgl_hash: Some("d4e5f6".into()),
        plugins: vec!["pdf-viewer".into()],
        fonts: vec!["Arial".into(), "Segoe UI".into()],
        ..ClientHints::default()
    });

    let decision = engine.evaluate(&record);
    assert!(matches!(decision.action, MitigationAction::Allow));
    assert!(decision.risk_level <= RiskLevel::Low);
    assert!(!decision.components.behavior.as_ref().unwrap().reliable);
    engine.destroy();
}

// ── Scenario 4: bot user agent ───────────────────────────────────────────

#[test]
fn test_bot_user_agent_blocked_on_sight() {
    let engine = engine();
    let record = request(
        "93.184.216.34",
        "/api/data",
        "fetch",
        "python-requests/2.31",
        1_700_000_000_000,
    );
    let decision = engine.evaluate(&record);

    let fingerprint = decision.components.fingerprint.as_ref().unwrap();
    assert!(fingerprint.is_bot);
    assert!(
        decision.risk_score >= 0.7,
        "bot floor not applied: {}",
        decision.risk_score
    );
    assert_eq!(decision.action.kind(), "block");
    engine.destroy();
}

// ── Scenario 5: rate-limit recovery ──────────────────────────────────────

#[test]
fn test_rate_limit_denial_and_recovery() {
    let mut config = EngineConfig::default();
    config.rate_limit.default_limit = 10;
    config.rate_limit.window_ms = 10_000;
    let engine = engine_with(config);
    let base = 1_700_000_000_000;

    let mut last = None;
    for i in 0..11 {
        let record = request("4.3.2.1", "/api/data", "fetch", BROWSER_UA, base + i * 100);
        last = Some(engine.evaluate(&record));
    }
    let denied = last.unwrap();
    let rate = denied.components.rate_limit.as_ref().unwrap();
    assert!(!rate.allowed, "request 11 should be rate limited");
    assert!(rate.retry_after_ms.unwrap() > 0);

    // one window after the oldest admitted request, capacity is back
    let record = request(
        "4.3.2.1",
        "/api/data",
        "fetch",
        BROWSER_UA,
        base + 10_000 + 1_100,
    );
    let decision = engine.evaluate(&record);
    let rate = decision.components.rate_limit.as_ref().unwrap();
    assert!(rate.allowed);
    assert_eq!(rate.remaining, rate.limit - 1);
    engine.destroy();
}

// ── Scenario 6: impossible travel ────────────────────────────────────────

#[test]
fn test_impossible_travel_flagged() {
    let engine = engine();
    let base = 1_700_000_000_000;

    let mut first = request("203.0.113.7", "/account", "view", BROWSER_UA, base);
    first.user_id = Some("traveler".into());
    first.session_id = Some("sess-a".into());
    first.client = Some(ClientHints {
        geo: Some(GeoPoint {
            lat: 40.7128,
            lon: -74.0060,
            country: Some("US".into()),
        }),
        ..ClientHints::default()
    });
    engine.evaluate(&first);

    // 3 minutes later, ~10,850 km away
    let mut second = request("198.51.100.9", "/account", "view", BROWSER_UA, base + 180_000);
    second.user_id = Some("traveler".into());
    second.session_id = Some("sess-b".into());
    second.client = Some(ClientHints {
        geo: Some(GeoPoint {
            lat: 35.6762,
            lon: 139.6503,
            country: Some("JP".into()),
        }),
        ..ClientHints::default()
    });
    let decision = engine.evaluate(&second);

    let session = decision.components.session.as_ref().unwrap();
    assert!(session.impossible_travel.is_some());
    assert!(session.risk >= 0.6, "session risk = {}", session.risk);
    engine.destroy();
}

// ── Replay determinism ───────────────────────────────────────────────────

#[test]
fn test_identical_streams_identical_decisions() {
    let stream: Vec<RequestRecord> = (0..60)
        .map(|i| {
            let endpoints = ["/home", "/api/data", "/api/login", "/search", "/cart"];
            let actions = ["view", "fetch", "login", "search", "view"];
            request(
                "10.9.8.7",
                endpoints[i % endpoints.len()],
                actions[i % actions.len()],
                BROWSER_UA,
                1_700_000_000_000 + i as i64 * 1_300,
            )
        })
        .collect();

    let engine_a = engine();
    let engine_b = engine();
    for record in &stream {
        let a = engine_a.evaluate(record);
        let b = engine_b.evaluate(record);
        assert_eq!(a.risk_score, b.risk_score, "scores diverged");
        assert_eq!(a.risk_level, b.risk_level);
        assert_eq!(a.action.kind(), b.action.kind());
        assert_eq!(a.session_id, b.session_id);
    }
    engine_a.destroy();
    engine_b.destroy();
}

// ── Reset semantics ──────────────────────────────────────────────────────

#[test]
fn test_reset_user_restores_clean_slate() {
    let engine = engine();
    let base = 1_700_000_000_000;
    // earn a bad reputation
    for i in 0..25 {
        engine.evaluate(&request(
            "66.77.88.99",
            "/api/login",
            "login",
            "Mozilla/5.0",
            base + i * 400,
        ));
    }
    engine.reset_user("66.77.88.99");

    let fresh = engine.evaluate(&request(
        "66.77.88.99",
        "/home",
        "view",
        BROWSER_UA,
        base + 1_000_000,
    ));
    assert!(matches!(fresh.action, MitigationAction::Allow));
    assert!(fresh.risk_level <= RiskLevel::Low);
    engine.destroy();
}

// ── Global counters ──────────────────────────────────────────────────────

#[test]
fn test_stats_partition_requests() {
    let engine = engine();
    let base = 1_700_000_000_000;
    for i in 0..20 {
        engine.evaluate(&request(
            "12.13.14.15",
            "/api/data",
            "fetch",
            BROWSER_UA,
            base + i * 5_000,
        ));
    }
    let stats = engine.stats();
    assert_eq!(stats.total_requests, 20);
    assert_eq!(
        stats.allowed + stats.challenged + stats.throttled + stats.blocked + stats.banned,
        20
    );
    engine.destroy();
}
