// Position Store - FIFO pending queue plus open/closed position tables,
// persisted to three JSON documents via `StorageBackend`. Grounded 1:1 in
// the original `position_queue.py` `PositionQueue`: single lock guarding all
// three collections and their reverse indices, same notify-only-on-exit-from
// pending/executing behavior, same bounded closed-history truncation.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::error::CoreError;
use crate::models::{Position, PositionStatus};
use crate::storage_trait::{keys, StorageBackend};

/// Fired for every transition out of `pending`/`executing` into a
/// user-visible terminal or near-terminal state.
#[derive(Debug, Clone)]
pub struct PositionNotification {
    pub position: Position,
    pub old_status: PositionStatus,
    pub new_status: PositionStatus,
}

pub type NotificationCallback = Arc<dyn Fn(PositionNotification) + Send + Sync>;

#[derive(Default)]
struct PositionStoreState {
    pending_queue: VecDeque<Position>,
    open_positions: HashMap<String, Position>,
    closed_positions: VecDeque<Position>,
    positions_by_trader: HashMap<String, Vec<String>>,
    positions_by_token: HashMap<String, Vec<String>>,
}

impl PositionStoreState {
    fn rebuild_indices(&mut self) {
        self.positions_by_trader.clear();
        self.positions_by_token.clear();
        let all = self
            .pending_queue
            .iter()
            .chain(self.open_positions.values())
            .chain(self.closed_positions.iter());
        for pos in all {
            self.positions_by_trader
                .entry(pos.leader_wallet.clone())
                .or_default()
                .push(pos.id.clone());
            self.positions_by_token
                .entry(pos.token_mint.clone())
                .or_default()
                .push(pos.id.clone());
        }
    }

    fn index(&mut self, pos: &Position) {
        self.positions_by_trader
            .entry(pos.leader_wallet.clone())
            .or_default()
            .push(pos.id.clone());
        self.positions_by_token
            .entry(pos.token_mint.clone())
            .or_default()
            .push(pos.id.clone());
    }
}

/// FIFO intake queue plus open/closed tables for every `Position`. One lock
/// guards all three collections together, matching the original's single
/// `asyncio.Lock` scope.
pub struct PositionStore<S: StorageBackend> {
    storage: S,
    max_size: usize,
    state: Mutex<PositionStoreState>,
    notification_callback: Option<NotificationCallback>,
}

impl<S: StorageBackend> PositionStore<S> {
    pub fn new(storage: S, max_size: usize, notification_callback: Option<NotificationCallback>) -> Self {
        Self {
            storage,
            max_size,
            state: Mutex::new(PositionStoreState::default()),
            notification_callback,
        }
    }

    /// Enqueues a new position. Returns `false` if the pending queue is at
    /// `max_size` (the caller must fail the intake fast).
    pub async fn add(&self, position: Position) -> Result<bool, CoreError> {
        let mut state = self.state.lock().await;
        if state.pending_queue.len() >= self.max_size {
            return Ok(false);
        }
        state.index(&position);
        state.pending_queue.push_back(position);
        self.save_pending(&state).await?;
        Ok(true)
    }

    /// Peeks (without removing) the head of the FIFO pending queue.
    pub async fn get_next_pending(&self) -> Option<Position> {
        let state = self.state.lock().await;
        state.pending_queue.front().cloned()
    }

    /// Transitions a pending position to `executing`, without removing it
    /// from the queue yet — `execute` performs the dequeue once the
    /// execution interface has actually been called.
    pub async fn mark_executing(&self, position_id: &str) -> Result<bool, CoreError> {
        let mut state = self.state.lock().await;
        if let Some(pos) = state.pending_queue.iter_mut().find(|p| p.id == position_id) {
            pos.status = PositionStatus::Executing;
            self.save_pending(&state).await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Marks a pending position executed: dequeues it, fills execution
    /// fields, computes slippage against `entry_price`, and moves it into
    /// `open_positions`.
    pub async fn execute(
        &self,
        position_id: &str,
        signature: String,
        execution_price: Decimal,
        amount_tokens: Decimal,
    ) -> Result<bool, CoreError> {
        let mut state = self.state.lock().await;
        let idx = state.pending_queue.iter().position(|p| p.id == position_id);
        let Some(idx) = idx else { return Ok(false) };
        let mut position = state.pending_queue.remove(idx).unwrap();

        let old_status = position.status;
        position.status = PositionStatus::Open;
        position.executed_at = Some(Utc::now());
        position.execution_signature = Some(signature);
        position.execution_price = Some(execution_price);
        position.amount_tokens = amount_tokens;

        if let Some(entry_price) = position.entry_price {
            if entry_price > Decimal::ZERO {
                position.slippage = Some((execution_price - entry_price).abs() / entry_price * Decimal::ONE_HUNDRED);
            }
        }

        state.open_positions.insert(position_id.to_string(), position.clone());
        self.save_pending(&state).await?;
        self.save_open(&state).await?;

        self.notify(&state, position, old_status, PositionStatus::Open);
        Ok(true)
    }

    /// Closes an open position, computing realized P&L, and moves it into
    /// the bounded closed-history deque.
    pub async fn close(
        &self,
        position_id: &str,
        signature: String,
        close_price: Decimal,
        close_amount_sol: Decimal,
    ) -> Result<bool, CoreError> {
        let mut state = self.state.lock().await;
        let Some(mut position) = state.open_positions.remove(position_id) else {
            return Ok(false);
        };

        let old_status = position.status;
        position.status = PositionStatus::Closed;
        position.closed_at = Some(Utc::now());
        position.close_signature = Some(signature);
        position.close_price = Some(close_price);
        position.close_amount_sol = Some(close_amount_sol);
        position.realized_pnl_sol = Some(close_amount_sol - position.amount_sol);

        state.closed_positions.push_back(position.clone());
        while state.closed_positions.len() > self.max_size {
            state.closed_positions.pop_front();
        }

        self.save_open(&state).await?;
        self.save_closed(&state).await?;

        self.notify(&state, position, old_status, PositionStatus::Closed);
        Ok(true)
    }

    /// Marks a pending position `failed` or `cancelled`, moving it out of
    /// the queue into closed history with the given reason in `metadata`.
    pub async fn fail(&self, position_id: &str, status: PositionStatus, reason: String) -> Result<bool, CoreError> {
        if status != PositionStatus::Failed && status != PositionStatus::Cancelled {
            return Err(CoreError::Validation(format!(
                "fail() called with non-terminal status {:?}",
                status
            )));
        }
        let mut state = self.state.lock().await;
        let idx = state.pending_queue.iter().position(|p| p.id == position_id);
        let Some(idx) = idx else { return Ok(false) };
        let mut position = state.pending_queue.remove(idx).unwrap();

        let old_status = position.status;
        position.status = status;
        position
            .metadata
            .insert("error".to_string(), serde_json::json!(reason));

        state.closed_positions.push_back(position.clone());
        while state.closed_positions.len() > self.max_size {
            state.closed_positions.pop_front();
        }

        self.save_pending(&state).await?;
        self.save_closed(&state).await?;

        self.notify(&state, position, old_status, status);
        Ok(true)
    }

    pub async fn get_open(&self, trader: Option<&str>, token: Option<&str>) -> Vec<Position> {
        let state = self.state.lock().await;
        state
            .open_positions
            .values()
            .filter(|p| trader.map(|t| p.leader_wallet == t).unwrap_or(true))
            .filter(|p| token.map(|m| p.token_mint == m).unwrap_or(true))
            .cloned()
            .collect()
    }

    pub async fn get_by_id(&self, position_id: &str) -> Option<Position> {
        let state = self.state.lock().await;
        state
            .pending_queue
            .iter()
            .find(|p| p.id == position_id)
            .or_else(|| state.open_positions.get(position_id))
            .or_else(|| state.closed_positions.iter().find(|p| p.id == position_id))
            .cloned()
    }

    pub async fn get_stats(&self) -> PositionStoreStats {
        let state = self.state.lock().await;
        let total_open_value: Decimal = state.open_positions.values().map(|p| p.amount_sol).sum();
        let total_realized_pnl: Decimal = state
            .closed_positions
            .iter()
            .filter_map(|p| p.realized_pnl_sol)
            .sum();
        PositionStoreStats {
            pending_count: state.pending_queue.len(),
            open_count: state.open_positions.len(),
            closed_count: state.closed_positions.len(),
            total_open_value_sol: total_open_value,
            total_realized_pnl_sol: total_realized_pnl,
            unique_traders: state.positions_by_trader.len(),
            unique_tokens: state.positions_by_token.len(),
        }
    }

    pub async fn get_pending_count(&self) -> usize {
        self.state.lock().await.pending_queue.len()
    }

    /// Loads all three tables from storage and rebuilds the reverse indices.
    pub async fn load_from_disk(&self) -> Result<(), CoreError> {
        let pending: Vec<Position> = self.storage.load(keys::PENDING_POSITIONS).await?.unwrap_or_default();
        let open: Vec<Position> = self.storage.load(keys::OPEN_POSITIONS).await?.unwrap_or_default();
        let closed: Vec<Position> = self.storage.load(keys::CLOSED_POSITIONS).await?.unwrap_or_default();

        let mut state = self.state.lock().await;
        state.pending_queue = pending.into();
        state.open_positions = open.into_iter().map(|p| (p.id.clone(), p)).collect();
        let max_size = self.max_size;
        state.closed_positions = closed.into_iter().rev().take(max_size).rev().collect();
        state.rebuild_indices();
        Ok(())
    }

    /// Persists every table to storage.
    pub async fn save_state(&self) -> Result<(), CoreError> {
        let state = self.state.lock().await;
        self.save_pending(&state).await?;
        self.save_open(&state).await?;
        self.save_closed(&state).await?;
        Ok(())
    }

    async fn save_pending(&self, state: &PositionStoreState) -> Result<(), CoreError> {
        let data: Vec<&Position> = state.pending_queue.iter().collect();
        self.storage.save(keys::PENDING_POSITIONS, &data).await
    }

    async fn save_open(&self, state: &PositionStoreState) -> Result<(), CoreError> {
        let data: Vec<&Position> = state.open_positions.values().collect();
        self.storage.save(keys::OPEN_POSITIONS, &data).await
    }

    async fn save_closed(&self, state: &PositionStoreState) -> Result<(), CoreError> {
        let data: Vec<&Position> = state.closed_positions.iter().collect();
        self.storage.save(keys::CLOSED_POSITIONS, &data).await
    }

    /// Fires the notification callback for every transition except into
    /// `pending`/`executing`, matching the original's early return.
    fn notify(&self, _state: &PositionStoreState, position: Position, old_status: PositionStatus, new_status: PositionStatus) {
        if matches!(new_status, PositionStatus::Pending | PositionStatus::Executing) {
            return;
        }
        if let Some(cb) = &self.notification_callback {
            cb(PositionNotification {
                position,
                old_status,
                new_status,
            });
        }
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct PositionStoreStats {
    pub pending_count: usize,
    pub open_count: usize,
    pub closed_count: usize,
    pub total_open_value_sol: Decimal,
    pub total_realized_pnl_sol: Decimal,
    pub unique_traders: usize,
    pub unique_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PositionSide;
    use crate::native::storage_impl::FileStorage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn store_with_tempdir() -> (PositionStore<FileStorage>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf());
        let store = PositionStore::new(storage, 10, None);
        (store, dir)
    }

    fn sample_position(id: &str) -> Position {
        Position::new(
            id.to_string(),
            "Leader1".to_string(),
            "MintX".to_string(),
            Some("MX".to_string()),
            PositionSide::Buy,
            Decimal::ONE,
            Decimal::ONE,
        )
    }

    #[tokio::test]
    async fn add_then_get_next_pending_is_fifo() {
        let (store, _dir) = store_with_tempdir().await;
        store.add(sample_position("p1")).await.unwrap();
        store.add(sample_position("p2")).await.unwrap();
        let next = store.get_next_pending().await.unwrap();
        assert_eq!(next.id, "p1");
    }

    #[tokio::test]
    async fn execute_moves_pending_to_open_and_computes_slippage() {
        let (store, _dir) = store_with_tempdir().await;
        let mut pos = sample_position("p1");
        pos.entry_price = Some(Decimal::ONE);
        store.add(pos).await.unwrap();
        let ok = store
            .execute("p1", "sig1".to_string(), Decimal::new(11, 1), Decimal::new(100, 0))
            .await
            .unwrap();
        assert!(ok);
        let open = store.get_open(None, None).await;
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].status, PositionStatus::Open);
        assert!(open[0].slippage.unwrap() > Decimal::ZERO);
    }

    #[tokio::test]
    async fn close_computes_realized_pnl() {
        let (store, _dir) = store_with_tempdir().await;
        store.add(sample_position("p1")).await.unwrap();
        store
            .execute("p1", "sig1".to_string(), Decimal::ONE, Decimal::new(100, 0))
            .await
            .unwrap();
        store
            .close("p1", "sig2".to_string(), Decimal::new(12, 1), Decimal::new(12, 1))
            .await
            .unwrap();
        let closed = store.get_by_id("p1").await.unwrap();
        assert_eq!(closed.status, PositionStatus::Closed);
        assert_eq!(closed.realized_pnl_sol.unwrap(), Decimal::new(2, 1));
    }

    #[tokio::test]
    async fn notification_skipped_for_pending_and_executing() {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = hits.clone();
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf());
        let store = PositionStore::new(
            storage,
            10,
            Some(Arc::new(move |_n: PositionNotification| {
                hits_clone.fetch_add(1, Ordering::SeqCst);
            })),
        );
        store.add(sample_position("p1")).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        store
            .execute("p1", "sig1".to_string(), Decimal::ONE, Decimal::new(100, 0))
            .await
            .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn add_respects_max_size() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf());
        let store = PositionStore::new(storage, 1, None);
        assert!(store.add(sample_position("p1")).await.unwrap());
        assert!(!store.add(sample_position("p2")).await.unwrap());
    }
}
