mod adapter;

use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use warden_engine::{CallbackHooks, EngineConfig, RiskEngine};

use adapter::{risk_middleware, AdapterState};

#[derive(Parser, Debug)]
#[command(name = "warden", version, about = "Warden — behavior-based anti-abuse risk engine demo")]
struct Cli {
    /// Bind address for the demo server
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: String,

    /// Requests per window before rate limiting
    #[arg(long, default_value_t = 100)]
    limit: u32,

    /// Rate-limit window in seconds
    #[arg(long, default_value_t = 60)]
    window_secs: i64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Validate configuration and exit
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = cli.log_level.parse().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = EngineConfig::default();
    config.rate_limit.default_limit = cli.limit;
    config.rate_limit.window_ms = cli.window_secs * 1_000;
    config.validate().map_err(|e| anyhow::anyhow!("{e}"))?;

    if cli.dry_run {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let hooks = CallbackHooks::new()
        .on_block(|decision| {
            info!(
                identity = %decision.identity,
                score = decision.risk_score,
                "mitigation applied"
            );
        })
        .on_anomaly(|identity, decision| {
            info!(identity = %identity, score = decision.risk_score, "anomaly observed");
        });

    let engine = RiskEngine::with_hooks(config, Arc::new(hooks))
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    let state = Arc::new(AdapterState::new(engine.clone()));

    let app = Router::new()
        .route("/", get(index))
        .route("/api/login", post(login))
        .route("/api/data", get(data))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            risk_middleware,
        ))
        // stats stay reachable even for throttled callers
        .route("/api/stats", get(stats))
        .with_state(state);

    info!(bind = %cli.bind, "warden demo listening");
    let listener = tokio::net::TcpListener::bind(&cli.bind).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    engine.destroy();
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutting down");
}

async fn index() -> &'static str {
    "warden: behavior-based anti-abuse risk engine\n"
}

async fn login() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn data() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "items": [1, 2, 3] }))
}

async fn stats(State(state): State<Arc<AdapterState>>) -> Json<serde_json::Value> {
    let stats = state.engine.stats();
    let rate = state.engine.rate_limiter().report();
    Json(serde_json::json!({
        "engine": stats,
        "rate_limiter": rate,
    }))
}
