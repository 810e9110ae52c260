//! HireLens API Gateway
//!
//! The external entry point for the evaluation pipeline:
//! - Submission, status, listing and cancellation of evaluation jobs
//! - Reference-material indexing
//! - Observability (logging, metrics, tracing)

mod auth;
mod handlers;

use axum::{
    routing::{delete, get, post},
    Router,
};
use hirelens_common::{
    config::AppConfig,
    db::DbPool,
    documents::{DocumentProvider, PgDocumentProvider},
    jobs::dispatcher::Dispatcher,
    jobs::PgJobStore,
    llm::HttpLlmClient,
    queue::SqsTaskQueue,
};
use hirelens_retrieval::{PgVectorStore, RetrievalIndex};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DbPool,
    pub dispatcher: Arc<Dispatcher>,
    pub documents: Arc<dyn DocumentProvider>,
    pub retrieval: Arc<RetrievalIndex>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    // Initialize tracing
    let fmt = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.observability.log_level.clone().into()),
        )
        .with_target(true);
    if config.observability.json_logging {
        fmt.json().init();
    } else {
        fmt.init();
    }

    info!("Starting HireLens API Gateway v{}", hirelens_common::VERSION);

    hirelens_common::metrics::register_metrics();

    let config = Arc::new(config);

    // Database
    let db = DbPool::new(&config.database).await?;

    // Queue
    let queue = Arc::new(SqsTaskQueue::connect(&config.queue).await?);

    // LLM client doubles as the embedder for reference indexing
    let llm = Arc::new(HttpLlmClient::connect(&config.llm).await?);

    let documents: Arc<dyn DocumentProvider> = Arc::new(PgDocumentProvider::new(db.clone()));
    let store = Arc::new(PgJobStore::new(db.clone()));
    let dispatcher = Arc::new(Dispatcher::new(documents.clone(), store, queue));
    let retrieval = Arc::new(RetrievalIndex::new(
        Arc::new(PgVectorStore::new(db.clone())),
        llm,
        &config.retrieval,
    ));

    let state = AppState {
        config: config.clone(),
        db,
        dispatcher,
        documents,
        retrieval,
    };

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let api_routes = Router::new()
        // Health endpoints (no auth)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        // Evaluation endpoints
        .route("/evaluations", post(handlers::evaluations::submit))
        .route("/evaluations", get(handlers::evaluations::list))
        .route("/evaluations/{job_id}", get(handlers::evaluations::get_status))
        .route("/evaluations/{job_id}", delete(handlers::evaluations::cancel))
        // Reference material endpoints
        .route("/references", post(handlers::references::index))
        .route("/references/{doc_id}", delete(handlers::references::remove));

    Router::new()
        .nest("/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
