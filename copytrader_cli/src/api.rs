// Read-only status/control HTTP surface: `/health`, `/positions`, `/stats`.
// Grounded in the teacher's axum/tower-http/CORS router shape (`create_router`,
// `health_handler`/`stats_handler`), narrowed per §6 of the engine's design to
// reporting only - no settings mutation, no bot start/stop, no websocket push.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use copytrader_core::data_store::DataStore;
use copytrader_core::pipeline::{PipelineStats, ReplicationPipeline};
use copytrader_core::position_store::PositionStore;
use copytrader_core::rpc_client::RpcClient;
use copytrader_core::storage_trait::StorageBackend;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;

pub struct ApiState<R: RpcClient + 'static, S: StorageBackend + 'static> {
    pub pipeline: Arc<ReplicationPipeline<R, S>>,
    pub position_store: Arc<PositionStore<S>>,
    pub data_store: Arc<DataStore>,
}

// Manual impl: `derive(Clone)` would require `R: Clone` and `S: Clone`, but
// only the `Arc` handles need to be cloned here.
impl<R: RpcClient + 'static, S: StorageBackend + 'static> Clone for ApiState<R, S> {
    fn clone(&self) -> Self {
        Self {
            pipeline: self.pipeline.clone(),
            position_store: self.position_store.clone(),
            data_store: self.data_store.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PositionsQuery {
    pub trader: Option<String>,
    pub token: Option<String>,
}

pub fn create_router<R: RpcClient + 'static, S: StorageBackend + 'static>(state: ApiState<R, S>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/positions", get(positions_handler::<R, S>))
        .route("/stats", get(stats_handler::<R, S>))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn positions_handler<R: RpcClient + 'static, S: StorageBackend + 'static>(
    State(state): State<ApiState<R, S>>,
    Query(query): Query<PositionsQuery>,
) -> impl IntoResponse {
    let open = state
        .position_store
        .get_open(query.trader.as_deref(), query.token.as_deref())
        .await;
    Json(json!({ "open": open }))
}

#[derive(serde::Serialize)]
struct StatsResponse {
    pipeline: PipelineStats,
    positions: copytrader_core::position_store::PositionStoreStats,
    cache: copytrader_core::data_store::DataStoreCacheStats,
}

async fn stats_handler<R: RpcClient + 'static, S: StorageBackend + 'static>(
    State(state): State<ApiState<R, S>>,
) -> impl IntoResponse {
    let response = StatsResponse {
        pipeline: state.pipeline.stats().await,
        positions: state.position_store.get_stats().await,
        cache: state.data_store.get_cache_stats(),
    };
    Json(response)
}
