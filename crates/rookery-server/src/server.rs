use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use rookery_engine::{Request, Response, Schema};
use rookery_storage::{MemoryStore, SeedData, Store};
use tower_http::trace::TraceLayer;

use crate::config::{Config, SeedConfig};

pub(crate) async fn serve(config: Config) -> anyhow::Result<()> {
    let store = build_store(config.seed.as_ref())?;
    let schema = Schema::new(store).with_operation_limits(config.operation_limits);
    let state = AppState {
        schema: Arc::new(schema),
    };

    let app = Router::new()
        .route("/graphql", post(graphql_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(config.network.listen_address)
        .await
        .with_context(|| format!("binding {}", config.network.listen_address))?;
    tracing::info!(address = %config.network.listen_address, "rookery listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    Ok(())
}

#[derive(Clone)]
struct AppState {
    schema: Arc<Schema>,
}

/// The single inbound operation: execute a query document against the
/// schema. All request-scoped state lives inside `execute`; the handler
/// holds nothing that could leak between requests.
async fn graphql_handler(State(state): State<AppState>, Json(request): Json<Request>) -> Json<Response> {
    Json(state.schema.execute(request).await)
}

async fn health_handler() -> &'static str {
    "OK"
}

fn build_store(seed: Option<&SeedConfig>) -> anyhow::Result<Arc<dyn Store>> {
    let store = match seed {
        Some(seed) => {
            let raw = std::fs::read_to_string(&seed.path)
                .with_context(|| format!("reading seed file {}", seed.path.display()))?;
            let data = SeedData::from_json_str(&raw)
                .with_context(|| format!("parsing seed file {}", seed.path.display()))?;
            MemoryStore::from_seed(data)
        }
        None => MemoryStore::new(),
    };
    Ok(Arc::new(store))
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("shutting down");
    }
}
