//! HTTP adapter — maps engine decisions onto responses.
//!
//! allow → pass through; challenge → 429 with a challenge payload unless
//! the request carries `X-Challenge-Response`; throttle → delay, then pass;
//! block/ban → 403 with reason and retry-after. Every response carries
//! `X-Risk-Score` (3 dp) and `X-Risk-Level`.
//!
//! The adapter is the engine's panic boundary: if evaluation ever panics,
//! the request is allowed and the failure logged. Abuse mitigation must
//! fail open, never closed.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

use warden_engine::{Decision, MitigationAction, RequestRecord, RiskEngine, RiskLevel};

pub struct AdapterState {
    pub engine: Arc<RiskEngine>,
    /// Base delay a throttled request waits, divided by the throttle factor.
    pub throttle_delay_ms: u64,
}

impl AdapterState {
    pub fn new(engine: Arc<RiskEngine>) -> Self {
        Self {
            engine,
            throttle_delay_ms: 500,
        }
    }
}

pub fn level_name(level: RiskLevel) -> &'static str {
    match level {
        RiskLevel::Minimal => "minimal",
        RiskLevel::Low => "low",
        RiskLevel::Medium => "medium",
        RiskLevel::High => "high",
        RiskLevel::Critical => "critical",
    }
}

/// Extract the engine's request record from an HTTP request.
pub fn build_request_record(req: &Request) -> RequestRecord {
    let headers: HashMap<String, String> = req
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    let header = |name: &str| {
        headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    };

    let ip = header("x-forwarded-for")
        .and_then(|list| list.split(',').next().map(|ip| ip.trim().to_string()))
        .or_else(|| header("x-real-ip"))
        .unwrap_or_else(|| "unknown".to_string());

    let path = req.uri().path().to_string();
    let payload_size = header("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    RequestRecord {
        ip,
        user_id: header("x-user-id"),
        authenticated_user_id: header("x-authenticated-user"),
        session_id: header("x-session-id"),
        method: req.method().as_str().to_string(),
        endpoint: path.clone(),
        action: derive_action(&path, req.method().as_str()),
        path,
        headers,
        query: req.uri().query().map(String::from),
        payload_size,
        response_time_ms: None,
        status_code: None,
        timestamp_ms: None,
        client: None,
    }
}

/// Coarse action label from the route, for the behavior/pattern producers.
fn derive_action(path: &str, method: &str) -> String {
    let lower = path.to_ascii_lowercase();
    for marker in [
        "login", "logout", "register", "password", "checkout", "payment", "search",
    ] {
        if lower.contains(marker) {
            return marker.to_string();
        }
    }
    method.to_ascii_lowercase()
}

/// The axum middleware wrapping every inbound request in a risk decision.
pub async fn risk_middleware(
    State(state): State<Arc<AdapterState>>,
    req: Request,
    next: Next,
) -> Response {
    let record = build_request_record(&req);
    let engine = state.engine.clone();

    // panic boundary: fail open
    let decision = match catch_unwind(AssertUnwindSafe(|| engine.evaluate(&record))) {
        Ok(decision) => decision,
        Err(_) => {
            error!("risk evaluation panicked; failing open");
            let mut response = next.run(req).await;
            response
                .headers_mut()
                .insert("x-risk-reliable", HeaderValue::from_static("false"));
            return response;
        }
    };

    let score_header = format!("{:.3}", decision.risk_score);
    let level_header = level_name(decision.risk_level);
    let request_id = decision.session_id.clone();

    let mut response = match &decision.action {
        MitigationAction::Allow => next.run(req).await,
        MitigationAction::Challenge {
            challenge_type,
            challenge,
        } => {
            if record.header("x-challenge-response").is_some() {
                next.run(req).await
            } else {
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(serde_json::json!({
                        "challenge_type": challenge_type,
                        "challenge": challenge,
                        "request_id": request_id,
                    })),
                )
                    .into_response()
            }
        }
        MitigationAction::Throttle { factor } => {
            let delay = (state.throttle_delay_ms as f64 / factor.max(0.01)) as u64;
            tokio::time::sleep(Duration::from_millis(delay)).await;
            next.run(req).await
        }
        MitigationAction::Block { reason, duration_ms }
        | MitigationAction::Ban { reason, duration_ms } => (
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({
                "reason": reason,
                "retry_after": duration_ms / 1_000,
                "request_id": request_id,
            })),
        )
            .into_response(),
    };

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&score_header) {
        headers.insert("x-risk-score", value);
    }
    headers.insert("x-risk-level", HeaderValue::from_static(level_header));
    response
}

/// Summary line for access logging.
pub fn describe(decision: &Decision) -> String {
    format!(
        "{} score={:.3} level={} action={}",
        decision.identity,
        decision.risk_score,
        level_name(decision.risk_level),
        decision.action.kind()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn http_request(path: &str, headers: &[(&str, &str)]) -> Request {
        let mut builder = axum::http::Request::builder().method("POST").uri(path);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_record_extraction() {
        let req = http_request(
            "/api/login?next=/home",
            &[
                ("X-Forwarded-For", "1.2.3.4, 10.0.0.1"),
                ("User-Agent", "Mozilla/5.0"),
                ("Content-Length", "128"),
                ("X-User-Id", "alice"),
            ],
        );
        let record = build_request_record(&req);
        assert_eq!(record.ip, "1.2.3.4");
        assert_eq!(record.user_id.as_deref(), Some("alice"));
        assert_eq!(record.endpoint, "/api/login");
        assert_eq!(record.action, "login");
        assert_eq!(record.query.as_deref(), Some("next=/home"));
        assert_eq!(record.payload_size, 128);
        assert_eq!(record.method, "POST");
    }

    #[test]
    fn test_action_falls_back_to_method() {
        let req = http_request("/api/widgets", &[]);
        let record = build_request_record(&req);
        assert_eq!(record.action, "post");
        assert_eq!(record.ip, "unknown");
    }

    #[test]
    fn test_level_names() {
        assert_eq!(level_name(RiskLevel::Minimal), "minimal");
        assert_eq!(level_name(RiskLevel::Critical), "critical");
    }
}
