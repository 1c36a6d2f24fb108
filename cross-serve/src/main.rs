//! cross-serve - HTTP trigger for the scheduler
//!
//! Exposes the publish tick as an authenticated endpoint so external
//! cron services and serverless schedulers can drive Crosscast without
//! a resident daemon.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use libcrosscast::{Config, Database, Scheduler};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "cross-serve")]
#[command(version)]
#[command(about = "HTTP trigger for the Crosscast scheduler")]
#[command(long_about = "\
cross-serve - HTTP trigger for the Crosscast scheduler

DESCRIPTION:
    Serves a single trigger endpoint for cron/serverless deployments:

        POST /api/scheduler/run   publish due posts, returns
                                  {\"processed\": N, \"results\": [...]}
        GET  /healthz             liveness probe

    When [trigger].secret is configured, the run endpoint requires
    'Authorization: Bearer <secret>'. Without a secret the endpoint is
    open; this is logged loudly at startup and should only be used
    behind other access controls.

CONFIGURATION:
    Configuration file: ~/.config/crosscast/config.toml
    Override with CROSSCAST_CONFIG.
")]
struct Cli {
    /// Listen address (overrides config)
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone)]
struct AppState {
    scheduler: Arc<Scheduler>,
    secret: Option<String>,
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/scheduler/run", post(run_trigger))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn run_trigger(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> (StatusCode, Json<serde_json::Value>) {
    if let Some(secret) = &state.secret {
        let authorized = headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|token| token == secret)
            .unwrap_or(false);

        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({"error": "Unauthorized"})),
            );
        }
    }

    match state.scheduler.run_scheduler().await {
        Ok(summary) => {
            info!(processed = summary.processed, "trigger tick finished");
            match serde_json::to_value(&summary) {
                Ok(body) => (StatusCode::OK, Json(body)),
                Err(e) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({"error": e.to_string()})),
                ),
            }
        }
        Err(e) => {
            error!("trigger tick failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": e.to_string()})),
            )
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        libcrosscast::logging::init(libcrosscast::logging::LogFormat::Text, "debug", true);
    } else {
        libcrosscast::logging::init_default();
    }

    if let Err(e) = run(cli).await {
        error!("cross-serve failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load()?;
    let db = Database::new(&config.database.path).await?;
    let scheduler = Arc::new(Scheduler::from_config(&config, db));

    let secret = config.trigger.secret.clone();
    if secret.is_none() {
        warn!("no trigger secret configured: /api/scheduler/run is unauthenticated");
    }

    let bind = cli.bind.unwrap_or(config.trigger.bind);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("cross-serve listening on {bind}");

    let app = router(AppState { scheduler, secret });
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use libcrosscast::config::{ApiEndpoints, DatabaseConfig, SchedulerConfig, TriggerConfig};
    use tower::ServiceExt;

    async fn test_state(secret: Option<&str>) -> AppState {
        let db = Database::new(":memory:").await.unwrap();
        // Unroutable endpoints: an empty queue never reaches the network
        let config = Config {
            database: DatabaseConfig {
                path: ":memory:".to_string(),
            },
            scheduler: SchedulerConfig::default(),
            trigger: TriggerConfig::default(),
            twitter: None,
            api: ApiEndpoints::with_base("http://127.0.0.1:1"),
        };
        AppState {
            scheduler: Arc::new(Scheduler::from_config(&config, db)),
            secret: secret.map(str::to_string),
        }
    }

    fn run_request(bearer: Option<&str>) -> Request<Body> {
        let builder = Request::builder()
            .method("POST")
            .uri("/api/scheduler/run");
        let builder = match bearer {
            Some(token) => builder.header("authorization", format!("Bearer {token}")),
            None => builder,
        };
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn healthz_responds_ok() {
        let app = router(test_state(None).await);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn open_trigger_runs_without_auth_when_no_secret_configured() {
        let app = router(test_state(None).await);
        let response = app.oneshot(run_request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["processed"], 0);
        assert!(json["results"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_bearer_is_rejected_when_secret_configured() {
        let app = router(test_state(Some("hunter2")).await);
        let response = app.oneshot(run_request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn wrong_bearer_is_rejected() {
        let app = router(test_state(Some("hunter2")).await);
        let response = app.oneshot(run_request(Some("wrong"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn correct_bearer_is_accepted() {
        let app = router(test_state(Some("hunter2")).await);
        let response = app.oneshot(run_request(Some("hunter2"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["processed"], 0);
    }
}
