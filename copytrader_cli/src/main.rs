// Bootstraps the copy-trading engine: loads config, wires the Position
// Store, Data Store, Transaction Analyzer, Transaction Executor, and
// Replication Pipeline together, spawns the two websocket connection loops
// and the status API, and drives them until a shutdown signal arrives.
// Grounded in the teacher's `main.rs` bootstrap shape (config loading,
// `#[tokio::main(worker_threads = 4)]`, component construction followed by
// spawned tasks) generalized from the sniping-bot wiring (detection/monitor/
// buyer) to the copy-trading wiring described by the Replication Pipeline.
//
// The RPC client and storage backend traits are `?Send` (so a future WASM
// target isn't forced to produce Send futures), which means any future that
// awaits them is not `Send` either and cannot go through `tokio::spawn`. The
// intake and execution loops both do, so they run on a `LocalSet` via
// `spawn_local` instead; everything else here (the event-feed/signature
// websocket loops, the status API) never touches `R`/`S` and spawns normally.

mod api;
mod event_feed_ws;
mod signature_ws;

use std::path::PathBuf;
use std::sync::Arc;

use log::{error, info};
use tokio::sync::{mpsc, Mutex};

use copytrader_core::analyzer::TransactionAnalyzer;
use copytrader_core::data_store::DataStore;
use copytrader_core::error::{AppError, CoreError};
use copytrader_core::native::{FileStorage, NativeRpcClient};
use copytrader_core::pipeline::ReplicationPipeline;
use copytrader_core::position_store::{NotificationCallback, PositionStore};
use copytrader_core::settings::Settings;
use copytrader_core::signature_tracker::SignatureTracker;
use copytrader_core::transaction_executor::TransactionExecutor;

/// Matches the original `PositionQueue`'s default pending/closed-history cap.
const MAX_PENDING_POSITIONS: usize = 1000;

#[tokio::main(worker_threads = 4)]
async fn main() -> Result<(), AppError> {
    env_logger::init();
    println!(
        "copytrader starting (pid {}), RUST_LOG={:?}",
        std::process::id(),
        std::env::var("RUST_LOG").ok()
    );

    let config_path = std::env::var("COPYTRADER_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let settings = Settings::from_file(&config_path)?;
    settings.validate()?;

    let local = tokio::task::LocalSet::new();
    local.run_until(run(settings)).await
}

async fn run(settings: Settings) -> Result<(), CoreError> {
    let rpc_endpoint = settings
        .solana_rpc_urls
        .first()
        .cloned()
        .ok_or_else(|| CoreError::Validation("solana_rpc_urls must have at least one entry".to_string()))?;
    let rpc = NativeRpcClient::new(rpc_endpoint);
    let storage = FileStorage::new(PathBuf::from(&settings.data_dir));

    let analyzer = Arc::new(TransactionAnalyzer::new(rpc, &settings));
    let executor = TransactionExecutor::new(&settings);

    let notification_cb: Option<NotificationCallback> = Some(Arc::new(|n| {
        info!(
            "Position {} ({} {}): {:?} -> {:?}",
            n.position.id, n.position.leader_wallet, n.position.token_mint, n.old_status, n.new_status
        );
    }));
    let position_store = Arc::new(PositionStore::new(storage, MAX_PENDING_POSITIONS, notification_cb));
    position_store.load_from_disk().await?;

    let data_store = Arc::new(DataStore::new(None, None));

    let (feed_outbox_tx, feed_outbox_rx) = mpsc::unbounded_channel();
    let (signature_tx, signature_rx) = mpsc::channel(settings.admission_queue_capacity);

    let pipeline = Arc::new(ReplicationPipeline::new(
        settings.clone(),
        position_store.clone(),
        data_store.clone(),
        analyzer,
        executor,
        feed_outbox_tx,
        signature_tx,
    ));

    let event_feed_handle = pipeline.event_feed_handle();
    let event_feed_ws_url = settings.event_feed_ws_url.clone();
    tokio::spawn(async move {
        if let Err(e) = event_feed_ws::run_event_feed_ws(&event_feed_ws_url, event_feed_handle, feed_outbox_rx).await
        {
            error!("Event feed websocket task ended: {}", e);
        }
    });

    let tracker = Arc::new(Mutex::new(SignatureTracker::new(
        settings.max_subscriptions,
        settings.admission_queue_capacity,
    )));
    let signature_ws_url = settings.signature_ws_url.clone();
    tokio::spawn(async move {
        if let Err(e) = signature_ws::run_signature_ws(&signature_ws_url, tracker, signature_rx).await {
            error!("Signature-tracking websocket task ended: {}", e);
        }
    });

    let api_state = api::ApiState {
        pipeline: pipeline.clone(),
        position_store: position_store.clone(),
        data_store: data_store.clone(),
    };
    let router = api::create_router(api_state);
    let bind_addr = settings.http_bind_addr.clone();
    tokio::spawn(async move {
        match tokio::net::TcpListener::bind(&bind_addr).await {
            Ok(listener) => {
                info!("Status API listening on {}", bind_addr);
                if let Err(e) = axum::serve(listener, router).await {
                    error!("Status API server error: {}", e);
                }
            }
            Err(e) => error!("Failed to bind status API on {}: {}", bind_addr, e),
        }
    });

    // `R`/`S`-generic work: not Send, so these run on the LocalSet instead
    // of `tokio::spawn`.
    let intake_pipeline = pipeline.clone();
    let intake_handle = tokio::task::spawn_local(async move {
        intake_pipeline.run_intake_loop().await;
    });
    let execution_pipeline = pipeline.clone();
    let execution_handle = tokio::task::spawn_local(async move {
        execution_pipeline.run_execution_loop().await;
    });

    pipeline.start();
    info!("Replication pipeline running; following {} leader(s)", settings.leaders.len());

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| CoreError::Init(format!("failed to install ctrl-c handler: {}", e)))?;
    info!("Shutdown signal received");

    pipeline.shutdown().await?;
    intake_handle.abort();
    execution_handle.abort();

    Ok(())
}
