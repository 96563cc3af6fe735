use crate::config::Config;
use crate::concurrency::ConcurrencyGate;
use crate::gateway::AiGateway;
use crate::handlers::{
    ai_action, classify, extract_batch, extract_single, get_job_result, get_job_status,
    health_check, AppState, SharedState,
};
use crate::health;
use crate::job_store::{ActiveJobCounter, InMemoryJobStore};
use crate::middleware::logging_middleware;
use crate::openai::OpenAiCaller;
use crate::rate_limiter::RpmLimiter;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{middleware, Router};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Wire the gateway stack and job bookkeeping from config.
pub fn build_state(config: Config) -> anyhow::Result<SharedState> {
    let limiter = RpmLimiter::per_minute(config.rpm_per_key, config.rpm_max_delay());
    let gate = ConcurrencyGate::new(config.max_concurrency_per_key);
    let caller = OpenAiCaller::new(config.model_api_url.clone(), config.model_timeout())?;
    let gateway = AiGateway::new(limiter, gate, config.admission_mode(), Arc::new(caller));

    Ok(Arc::new(AppState {
        jobs: ActiveJobCounter::new(config.max_jobs_per_user, config.max_jobs_per_api_key),
        store: Arc::new(InMemoryJobStore::new()),
        gateway: Arc::new(gateway),
        config,
    }))
}

pub fn create_app(state: SharedState) -> Router {
    let body_limit = state.config.max_file_size + 64 * 1024;

    Router::new()
        // Job submission endpoints
        .route("/extract/single", post(extract_single))
        .route("/extract/batch", post(extract_batch))
        .route("/classify", post(classify))
        .route("/ai/action", post(ai_action))
        // Polling endpoints
        .route("/jobs/:job_id", get(get_job_status))
        .route("/jobs/:job_id/result", get(get_job_result))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(logging_middleware)),
        )
}

/// Periodically drop terminal jobs past their retention window.
fn spawn_cleanup_task(state: SharedState) {
    let interval = Duration::from_secs(state.config.cleanup_interval_secs);
    let retention = state.config.job_cleanup_minutes;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately
        loop {
            ticker.tick().await;
            state.store.cleanup_expired(retention).await;
        }
    });
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    health::mark_started();
    let bind_addr = config.bind_addr;
    let state = build_state(config)?;
    spawn_cleanup_task(Arc::clone(&state));
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("docgate listening on {bind_addr}");
    tracing::info!("Health check available at /health");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if signal::ctrl_c().await.is_err() {
            tracing::error!("failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => {
                tracing::error!("failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}
