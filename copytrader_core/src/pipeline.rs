// Replication Pipeline - the trade-intake contract, the execution loop, and
// leader add/remove/shutdown orchestration. Grounded in
// `original_source/copy_trading/core.py` (`CopyTrading`: start/stop,
// add_trader/remove_trader, `_pending_positions_loop`) and
// `original_source/copy_trading/callback.py` (`CopyTradingCallback.__call__`:
// transform -> structural validation -> validation engine -> enqueue,
// counted by the same four-stat shape). Replaces the teacher's `pipeline.rs`
// (`process_new_token`), which started from a newly detected token rather
// than a leader trade event.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};

use crate::analyzer::TransactionAnalyzer;
use crate::data_store::{sync_models, DataStore, SyncOperation};
use crate::error::CoreError;
use crate::event_feed::{EventFeedClient, FeedEvent, FeedTopic, FeedTradeEvent};
use crate::models::{Position, PositionSide, PositionStatus, TokenInfo};
use crate::position_store::PositionStore;
use crate::rpc_client::RpcClient;
use crate::settings::{LeaderConfig, Settings};
use crate::signature_tracker::{SignatureOutcome, SignatureTrackRequest};
use crate::storage_trait::StorageBackend;
use crate::transaction_executor::{TradeRequest, TransactionExecutor};
use crate::validation::ValidationEngine;

/// Running counters mirroring the original callback's `stats` dict plus the
/// system-level execution counters from `core.py`'s `metrics`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStats {
    pub trades_received: u64,
    pub trades_validated: u64,
    pub trades_queued: u64,
    pub trades_rejected: u64,
    pub trades_executed: u64,
    pub trades_failed: u64,
    pub total_volume_sol: Decimal,
    pub last_trade_at: Option<chrono::DateTime<Utc>>,
}

/// Orchestrates trade intake, execution, and leader set changes. Generic
/// over the RPC client and storage backend so it stays testable with mocks.
pub struct ReplicationPipeline<R: RpcClient, S: StorageBackend> {
    settings: RwLock<Settings>,
    position_store: Arc<PositionStore<S>>,
    data_store: Arc<DataStore>,
    validation_engine: Mutex<ValidationEngine>,
    analyzer: Arc<TransactionAnalyzer<R>>,
    executor: TransactionExecutor,
    event_feed: Arc<Mutex<EventFeedClient>>,
    feed_outbox: mpsc::UnboundedSender<serde_json::Value>,
    trade_tx: mpsc::UnboundedSender<FeedTradeEvent>,
    trade_rx: Mutex<Option<mpsc::UnboundedReceiver<FeedTradeEvent>>>,
    signature_tracker_tx: mpsc::Sender<SignatureTrackRequest>,
    is_running: AtomicBool,
    stats: Mutex<PipelineStats>,
}

impl<R: RpcClient, S: StorageBackend> ReplicationPipeline<R, S> {
    pub fn new(
        settings: Settings,
        position_store: Arc<PositionStore<S>>,
        data_store: Arc<DataStore>,
        analyzer: Arc<TransactionAnalyzer<R>>,
        executor: TransactionExecutor,
        feed_outbox: mpsc::UnboundedSender<serde_json::Value>,
        signature_tracker_tx: mpsc::Sender<SignatureTrackRequest>,
    ) -> Self {
        let (trade_tx, trade_rx) = mpsc::unbounded_channel::<FeedTradeEvent>();
        let mut event_feed = EventFeedClient::new();

        let leader_wallets: Vec<String> = settings.leaders.iter().map(|l| l.wallet.clone()).collect();
        if !leader_wallets.is_empty() {
            let payload = event_feed.subscribe(
                FeedTopic::AccountTrade,
                leader_wallets,
                trade_forwarding_callback(trade_tx.clone()),
            );
            let _ = feed_outbox.send(payload);
        }

        Self {
            settings: RwLock::new(settings),
            position_store,
            data_store,
            validation_engine: Mutex::new(ValidationEngine::new()),
            analyzer,
            executor,
            event_feed: Arc::new(Mutex::new(event_feed)),
            feed_outbox,
            trade_tx,
            trade_rx: Mutex::new(Some(trade_rx)),
            signature_tracker_tx,
            is_running: AtomicBool::new(false),
            stats: Mutex::new(PipelineStats::default()),
        }
    }

    pub fn start(&self) {
        self.is_running.store(true, Ordering::SeqCst);
        info!("Replication pipeline started");
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub async fn stats(&self) -> PipelineStats {
        self.stats.lock().await.clone()
    }

    /// A shared handle to the Event-Feed Client's subscription bookkeeping,
    /// for the concrete websocket connection loop to dispatch incoming
    /// frames through and replay active subscriptions after a reconnect.
    pub fn event_feed_handle(&self) -> Arc<Mutex<EventFeedClient>> {
        self.event_feed.clone()
    }

    /// Drains forwarded leader-trade events one at a time until shutdown.
    /// Takes ownership of the receiver on first call; a second call is a
    /// no-op (the channel has already been consumed).
    pub async fn run_intake_loop(&self) {
        let Some(mut rx) = self.trade_rx.lock().await.take() else {
            warn!("run_intake_loop called more than once; ignoring");
            return;
        };
        while self.is_running() {
            match rx.recv().await {
                Some(event) => {
                    if let Err(e) = self.handle_leader_trade(event).await {
                        warn!("Error handling leader trade: {}", e);
                    }
                }
                None => break,
            }
        }
    }

    /// The trade-intake contract: every raw feed event passes through these
    /// five steps. A rejection at any step is logged and counted, never
    /// propagated as an error - a single bad event must not stop the feed.
    pub async fn handle_leader_trade(&self, event: FeedTradeEvent) -> Result<(), CoreError> {
        // Step 1: count every event we see, valid or not.
        {
            let mut stats = self.stats.lock().await;
            stats.trades_received += 1;
        }

        let settings = self.settings.read().await;

        // Step 2: transform the raw event into the internal shape, computing
        // the follower amount via the leader's sizing rule.
        let Some(leader) = find_leader(&settings, &event.trader_public_key) else {
            debug!("Ignoring trade from unfollowed wallet {}", event.trader_public_key);
            return Ok(());
        };
        let Some(side) = parse_side(&event.tx_type) else {
            self.reject(&format!("unrecognized side '{}'", event.tx_type)).await;
            return Ok(());
        };
        let Some(original_amount_sol) = event.sol_amount.and_then(Decimal::from_f64) else {
            self.reject("missing or invalid solAmount").await;
            return Ok(());
        };

        // Step 3: structural validation.
        if original_amount_sol <= Decimal::ZERO {
            self.reject("solAmount must be > 0").await;
            return Ok(());
        }
        let max_position = leader.max_position_size.unwrap_or(settings.max_position_size);
        let amount_sol = leader.sizing_rule.compute(original_amount_sol, max_position);
        if amount_sol <= Decimal::ZERO {
            self.reject("computed follower amount is <= 0").await;
            return Ok(());
        }

        let Some(wallet_pubkey) = settings.wallet_pubkey.as_deref() else {
            return Err(CoreError::Validation("wallet_pubkey is not configured".to_string()));
        };

        // Step 4: the validation engine's five pre-trade checks.
        let side_str = match side {
            PositionSide::Buy => "buy",
            PositionSide::Sell => "sell",
        };
        let (is_valid, checks) = self
            .validation_engine
            .lock()
            .await
            .validate_trade(
                self.analyzer.rpc(),
                wallet_pubkey,
                &leader.wallet,
                &event.mint,
                amount_sol,
                side_str,
                &settings,
            )
            .await;

        if !is_valid {
            let reasons: Vec<String> = checks
                .iter()
                .filter(|c| !c.is_ok(settings.strict_mode))
                .map(|c| c.message.clone())
                .collect();
            warn!(
                "Trade rejected for {} on {}: {}",
                leader.wallet,
                event.mint,
                reasons.join("; ")
            );
            self.reject(&reasons.join("; ")).await;
            return Ok(());
        }

        {
            let mut stats = self.stats.lock().await;
            stats.trades_validated += 1;
        }

        // Step 5: create the Position as pending, enqueue it, and persist -
        // without notifying. Notifications fire only on later transitions.
        let mut position = Position::new(
            event.signature.clone(),
            leader.wallet.clone(),
            event.mint.clone(),
            None,
            side,
            amount_sol,
            original_amount_sol,
        );
        position
            .metadata
            .insert("leader_token_amount".to_string(), serde_json::json!(event.token_amount));
        if let Some(pool) = &event.pool {
            position.metadata.insert("pool".to_string(), serde_json::json!(pool));
        }

        self.data_store.set_token(
            &event.mint,
            with_active_leader(self.data_store.get_token(&event.mint), &event.mint, &leader.wallet),
        );

        let queued = self.position_store.add(position).await?;
        if !queued {
            self.reject("pending queue is full").await;
            return Ok(());
        }

        let mut stats = self.stats.lock().await;
        stats.trades_queued += 1;
        stats.last_trade_at = Some(Utc::now());
        Ok(())
    }

    async fn reject(&self, _reason: &str) {
        let mut stats = self.stats.lock().await;
        stats.trades_rejected += 1;
    }

    /// Polls the pending queue on `pending_poll_interval_ms`, executing one
    /// position at a time with `execution_loop_delay_ms` between
    /// submissions - matching `_pending_positions_loop`'s inner/outer sleep.
    pub async fn run_execution_loop(&self) {
        while self.is_running() {
            if let Err(e) = self.drain_pending_once().await {
                warn!("Error in execution loop: {}", e);
            }
            let poll_ms = self.settings.read().await.pending_poll_interval_ms;
            tokio::time::sleep(std::time::Duration::from_millis(poll_ms)).await;
        }
    }

    async fn drain_pending_once(&self) -> Result<(), CoreError> {
        let delay_ms = self.settings.read().await.execution_loop_delay_ms;
        while self.is_running() {
            let Some(position) = self.position_store.get_next_pending().await else {
                break;
            };
            self.position_store.mark_executing(&position.id).await?;
            self.execute_position(position).await;
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
        }
        Ok(())
    }

    async fn execute_position(&self, position: Position) {
        let settings = self.settings.read().await;
        let Some(wallet) = settings.wallet_pubkey.clone() else {
            warn!("Cannot execute position {}: wallet_pubkey is not configured", position.id);
            drop(settings);
            let _ = self
                .position_store
                .fail(&position.id, PositionStatus::Failed, "wallet_pubkey not configured".to_string())
                .await;
            return;
        };
        let request = match position.side {
            PositionSide::Buy => TradeRequest::buy(&wallet, &position.token_mint, position.amount_sol, &settings),
            PositionSide::Sell => TradeRequest::sell(&wallet, &position.token_mint, position.amount_sol, &settings),
        };
        drop(settings);

        match self.executor.execute_trade(&request).await {
            Ok(result) if result.error.is_none() => {
                let signature = result.signature;
                match self.track_confirmation(&signature).await {
                    Ok(SignatureOutcome::Confirmed) => {
                        self.on_execution_success(position, signature).await;
                    }
                    Ok(SignatureOutcome::Timeout) => {
                        self.on_execution_failure(position, "signature tracking timed out".to_string()).await;
                    }
                    Ok(SignatureOutcome::Error(e)) => {
                        self.on_execution_failure(position, e.to_string()).await;
                    }
                    Err(e) => {
                        // Tracker unavailable (channel closed/full): fall back to the
                        // analyzer's own RPC lookup rather than losing the trade.
                        warn!("Signature tracker unavailable for {} ({}), falling back to RPC analysis", signature, e);
                        self.on_execution_success(position, signature).await;
                    }
                }
            }
            Ok(result) => {
                let reason = result.error.unwrap_or_else(|| "unknown execution error".to_string());
                self.on_execution_failure(position, reason).await;
            }
            Err(e) => {
                self.on_execution_failure(position, e.to_string()).await;
            }
        }
    }

    /// Hands the signature to the Signature-Tracking Client and awaits its
    /// outcome. The trade-execution API already waits for the transaction to
    /// land before returning, so this mainly classifies the terminal error
    /// taxonomy (slippage, insufficient funds, ...) rather than racing a
    /// fresh confirmation.
    async fn track_confirmation(&self, signature: &str) -> Result<SignatureOutcome, String> {
        let timeout_s = self.settings.read().await.default_signature_timeout_secs;
        let (resp_tx, resp_rx) = oneshot::channel();
        self.signature_tracker_tx
            .send(SignatureTrackRequest::Track {
                signature: signature.to_string(),
                commitment: "confirmed".to_string(),
                timeout_s,
                resp: resp_tx,
            })
            .await
            .map_err(|_| "signature tracker channel closed".to_string())?;
        resp_rx
            .await
            .map_err(|_| "signature tracker dropped the response channel".to_string())?
    }

    async fn on_execution_success(&self, position: Position, signature: String) {
        let analysis = self.analyzer.analyze_by_signature(&signature).await.ok();
        let (execution_price, amount_tokens) = match &analysis {
            Some(a) if a.success => (
                a.price_sol_per_token.unwrap_or(Decimal::ZERO),
                a.token_ui_delta.unwrap_or(Decimal::ZERO).abs(),
            ),
            _ => (Decimal::ZERO, Decimal::ZERO),
        };

        if let Err(e) = self
            .position_store
            .execute(&position.id, signature, execution_price, amount_tokens)
            .await
        {
            warn!("Failed to persist execution for {}: {}", position.id, e);
        }

        self.apply_stats_sync(
            &position.leader_wallet,
            &position.token_mint,
            SyncOperation::OpenPosition {
                volume_sol: position.amount_sol,
                timestamp: Utc::now(),
            },
        )
        .await;

        let mut stats = self.stats.lock().await;
        stats.trades_executed += 1;
        stats.total_volume_sol += position.amount_sol;
    }

    async fn on_execution_failure(&self, position: Position, reason: String) {
        warn!("Trade execution failed for {}: {}", position.id, reason);
        if let Err(e) = self
            .position_store
            .fail(&position.id, PositionStatus::Failed, reason)
            .await
        {
            warn!("Failed to persist failure for {}: {}", position.id, e);
        }

        self.apply_stats_sync(
            &position.leader_wallet,
            &position.token_mint,
            SyncOperation::FailedPosition {
                volume_sol: position.amount_sol,
                timestamp: Utc::now(),
            },
        )
        .await;

        let mut stats = self.stats.lock().await;
        stats.trades_failed += 1;
    }

    async fn apply_stats_sync(&self, leader_wallet: &str, token_mint: &str, op: SyncOperation) {
        let trader_stats = self.data_store.get_trader(leader_wallet).unwrap_or_else(|| {
            let mut s = crate::models::TraderStats::default();
            s.leader_wallet = leader_wallet.to_string();
            s
        });
        let key = DataStore::trader_token_key(leader_wallet, token_mint);
        let token_stats = self.data_store.get_trader_token(&key).unwrap_or_else(|| {
            let mut s = crate::models::TraderTokenStats::default();
            s.leader_wallet = leader_wallet.to_string();
            s.token_mint = token_mint.to_string();
            s
        });
        let (new_trader_stats, new_token_stats) = sync_models(&trader_stats, &token_stats, &op);
        self.data_store.set_trader(leader_wallet, new_trader_stats);
        self.data_store.set_trader_token(&key, new_token_stats);
    }

    /// Adds a new leader to follow. Re-subscribes with the full updated
    /// leader list rather than sending an incremental diff, matching
    /// `add_trader`'s unsubscribe-then-subscribe pattern.
    pub async fn add_leader(&self, leader: LeaderConfig) -> Result<bool, CoreError> {
        let mut settings = self.settings.write().await;
        if settings.leaders.iter().any(|l| l.wallet == leader.wallet) {
            warn!("Leader already followed: {}", leader.wallet);
            return Ok(false);
        }
        let previous: Vec<String> = settings.leaders.iter().map(|l| l.wallet.clone()).collect();
        settings.leaders.push(leader.clone());
        let updated: Vec<String> = settings.leaders.iter().map(|l| l.wallet.clone()).collect();
        drop(settings);

        self.resubscribe_leaders(previous, updated).await;
        info!("Leader added: {}", leader.wallet);
        Ok(true)
    }

    /// Removes a followed leader, re-subscribing to whatever remains.
    pub async fn remove_leader(&self, wallet: &str) -> Result<bool, CoreError> {
        let mut settings = self.settings.write().await;
        let before = settings.leaders.len();
        settings.leaders.retain(|l| l.wallet != wallet);
        if settings.leaders.len() == before {
            warn!("Leader not found: {}", wallet);
            return Ok(false);
        }
        let updated: Vec<String> = settings.leaders.iter().map(|l| l.wallet.clone()).collect();
        drop(settings);

        self.resubscribe_leaders(vec![wallet.to_string()], updated).await;
        info!("Leader removed: {}", wallet);
        Ok(true)
    }

    async fn resubscribe_leaders(&self, previous: Vec<String>, updated: Vec<String>) {
        let mut event_feed = self.event_feed.lock().await;
        if !previous.is_empty() {
            let payload = event_feed.unsubscribe(FeedTopic::AccountTrade, previous);
            let _ = self.feed_outbox.send(payload);
        }
        if !updated.is_empty() {
            let payload = event_feed.subscribe(
                FeedTopic::AccountTrade,
                updated,
                trade_forwarding_callback(self.trade_tx.clone()),
            );
            let _ = self.feed_outbox.send(payload);
        }
    }

    /// Orderly shutdown: stop the execution loop, flush every pending/open/
    /// closed table to disk, and unsubscribe from every followed leader.
    /// Pending positions are preserved on disk; open positions are not
    /// auto-closed, matching `CopyTrading.stop`.
    pub async fn shutdown(&self) -> Result<(), CoreError> {
        info!("Shutting down replication pipeline");
        self.is_running.store(false, Ordering::SeqCst);

        let pending_count = self.position_store.get_pending_count().await;
        if pending_count > 0 {
            info!("Flushing {} pending positions to disk", pending_count);
        }
        self.position_store.save_state().await?;

        let leaders: Vec<String> = self.settings.read().await.leaders.iter().map(|l| l.wallet.clone()).collect();
        if !leaders.is_empty() {
            let mut event_feed = self.event_feed.lock().await;
            let payload = event_feed.unsubscribe(FeedTopic::AccountTrade, leaders);
            let _ = self.feed_outbox.send(payload);
        }

        let stats = self.stats().await;
        info!(
            "Final stats: executed={} failed={} volume={} SOL",
            stats.trades_executed, stats.trades_failed, stats.total_volume_sol
        );
        Ok(())
    }
}

/// Builds the sync callback `EventFeedClient::subscribe` requires, forwarding
/// any decoded trade event onto the intake channel. Non-trade frames
/// (confirmations, unknown payloads) are dropped here.
fn trade_forwarding_callback(
    tx: mpsc::UnboundedSender<FeedTradeEvent>,
) -> Arc<dyn Fn(FeedEvent) + Send + Sync> {
    Arc::new(move |event| {
        if let FeedEvent::Trade(trade) = event {
            let _ = tx.send(trade);
        }
    })
}

fn find_leader<'a>(settings: &'a Settings, wallet: &str) -> Option<&'a LeaderConfig> {
    settings.leaders.iter().find(|l| l.wallet == wallet)
}

fn parse_side(tx_type: &str) -> Option<PositionSide> {
    match tx_type.to_lowercase().as_str() {
        "buy" => Some(PositionSide::Buy),
        "sell" => Some(PositionSide::Sell),
        _ => None,
    }
}

fn with_active_leader(existing: Option<TokenInfo>, token_mint: &str, leader_wallet: &str) -> TokenInfo {
    let mut info = existing.unwrap_or_else(|| TokenInfo {
        token_mint: token_mint.to_string(),
        name: None,
        symbol: None,
        active_leaders: Default::default(),
    });
    info.active_leaders.insert(leader_wallet.to_string());
    info
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_side_accepts_case_insensitive() {
        assert_eq!(parse_side("BUY"), Some(PositionSide::Buy));
        assert_eq!(parse_side("sell"), Some(PositionSide::Sell));
        assert_eq!(parse_side("swap"), None);
    }

    #[test]
    fn find_leader_matches_wallet() {
        let mut settings = Settings::default();
        settings.leaders.push(LeaderConfig {
            wallet: "Leader1".to_string(),
            sizing_rule: crate::sizing::SizingRule::Mirror,
            max_position_size: None,
            daily_limit: None,
        });
        assert!(find_leader(&settings, "Leader1").is_some());
        assert!(find_leader(&settings, "Leader2").is_none());
    }

    #[test]
    fn with_active_leader_accumulates_across_calls() {
        let info = with_active_leader(None, "MintX", "Leader1");
        let info = with_active_leader(Some(info), "MintX", "Leader2");
        assert_eq!(info.active_leaders.len(), 2);
    }

    #[test]
    fn stats_default_to_zero() {
        let stats = PipelineStats::default();
        assert_eq!(stats.trades_received, 0);
        assert_eq!(stats.total_volume_sol, Decimal::ZERO);
    }
}
