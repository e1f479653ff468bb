// Data Store & Sync Service - token/trader/trader×token aggregate caches
// with lazy TTL expiry, plus the stats-synchronization and reconciliation
// operations applied on top of them. Grounded in the original
// `trading_data_store.py` (`TradingDataStore`, lazy-TTL cache semantics) and
// `trader_stats_sync_service.py` (`TraderStatsSyncService.sync_models`).
// Generalized from `f64`/`Decimal`-as-string fields to native `Decimal`, and
// from unbounded dicts to the teacher's `lru::LruCache` dedup idiom (capacity
// bound added on top of, not instead of, TTL).

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use lru::LruCache;
use rust_decimal::Decimal;

use crate::models::{TokenInfo, TraderStats, TraderTokenStats};

const DEFAULT_CACHE_CAPACITY: usize = 10_000;

struct TtlCache<T> {
    entries: LruCache<String, (T, Instant)>,
    ttl: Option<Duration>,
}

impl<T: Clone> TtlCache<T> {
    fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        Self {
            entries: LruCache::new(NonZeroUsize::new(capacity.max(1)).unwrap()),
            ttl,
        }
    }

    /// Lazy expiry: a stale entry is reported as a miss but is not evicted
    /// here, matching the original's `_is_*_valid` check-without-purge.
    fn get(&mut self, key: &str) -> Option<T> {
        let (value, inserted_at) = self.entries.get(key)?;
        if let Some(ttl) = self.ttl {
            if inserted_at.elapsed() >= ttl {
                return None;
            }
        }
        Some(value.clone())
    }

    fn set(&mut self, key: String, value: T) {
        self.entries.put(key, (value, Instant::now()));
    }

    fn remove(&mut self, key: &str) {
        self.entries.pop(key);
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn expired_count(&self) -> usize {
        match self.ttl {
            None => 0,
            Some(ttl) => self
                .entries
                .iter()
                .filter(|(_, (_, inserted_at))| inserted_at.elapsed() >= ttl)
                .count(),
        }
    }
}

/// One delta application recognized by `sync_models`, mirroring the
/// original's `SyncOperation` TypedDict/Literal union.
#[derive(Debug, Clone)]
pub enum SyncOperation {
    OpenPosition { volume_sol: Decimal, timestamp: DateTime<Utc> },
    ClosedPosition { volume_sol: Decimal, timestamp: DateTime<Utc> },
    UpdateOpenPosition { previous_volume_sol: Decimal, volume_sol: Decimal, timestamp: DateTime<Utc> },
    UpdateClosedPosition { previous_volume_sol: Decimal, volume_sol: Decimal, timestamp: DateTime<Utc> },
    FailedPosition { volume_sol: Decimal, timestamp: DateTime<Utc> },
    Pnl { pnl_sol: Decimal, pnl_sol_after_fees: Decimal },
}

/// Applies one `SyncOperation` identically to a `TraderStats` and its
/// matching `TraderTokenStats`, returning updated copies. Partial
/// application is forbidden: both records always move together.
pub fn sync_models(
    trader_stats: &TraderStats,
    trader_token_stats: &TraderTokenStats,
    op: &SyncOperation,
) -> (TraderStats, TraderTokenStats) {
    let mut stats = trader_stats.clone();
    let mut token_stats = trader_token_stats.clone();

    match op {
        SyncOperation::OpenPosition { volume_sol, timestamp } => {
            stats.opens += 1;
            stats.volume_open += *volume_sol;
            stats.last_trade_at = Some(*timestamp);
            token_stats.opens += 1;
            token_stats.volume_open += *volume_sol;
            token_stats.last_trade_at = Some(*timestamp);
        }
        SyncOperation::ClosedPosition { volume_sol, timestamp } => {
            stats.closes += 1;
            stats.volume_closed += *volume_sol;
            stats.last_trade_at = Some(*timestamp);
            token_stats.closes += 1;
            token_stats.volume_closed += *volume_sol;
            token_stats.last_trade_at = Some(*timestamp);
        }
        SyncOperation::UpdateOpenPosition { previous_volume_sol, volume_sol, timestamp } => {
            stats.volume_open = stats.volume_open - *previous_volume_sol + *volume_sol;
            stats.last_trade_at = Some(*timestamp);
            token_stats.volume_open = token_stats.volume_open - *previous_volume_sol + *volume_sol;
            token_stats.last_trade_at = Some(*timestamp);
        }
        SyncOperation::UpdateClosedPosition { previous_volume_sol, volume_sol, timestamp } => {
            stats.volume_closed = stats.volume_closed - *previous_volume_sol + *volume_sol;
            stats.last_trade_at = Some(*timestamp);
            token_stats.volume_closed = token_stats.volume_closed - *previous_volume_sol + *volume_sol;
            token_stats.last_trade_at = Some(*timestamp);
        }
        SyncOperation::FailedPosition { volume_sol, timestamp } => {
            stats.failed += 1;
            stats.volume_failed += *volume_sol;
            stats.last_trade_at = Some(*timestamp);
            token_stats.failed += 1;
            token_stats.volume_failed += *volume_sol;
            token_stats.last_trade_at = Some(*timestamp);
        }
        SyncOperation::Pnl { pnl_sol, pnl_sol_after_fees } => {
            stats.realized_pnl += *pnl_sol;
            stats.realized_pnl_after_fees += *pnl_sol_after_fees;
            token_stats.realized_pnl += *pnl_sol;
            token_stats.realized_pnl_after_fees += *pnl_sol_after_fees;
        }
    }

    (stats, token_stats)
}

/// Repairs drift when the pipeline observes a (leader, token) pair with no
/// pending/open positions left but non-zero `active_open` in the stats: it
/// adjusts `closes` to `opens - expected_active` without touching `opens`.
/// Idempotent: reapplying with the same `expected_active` is a no-op.
pub fn reconcile_active_positions(stats: &mut TraderTokenStats, expected_active: u64) {
    stats.closes = stats.opens.saturating_sub(expected_active);
}

/// Token/trader/trader×token caches with independent, optionally-disabled
/// TTLs. One `Mutex` per cache, matching the original's per-store lock
/// granularity (no single global lock across all three).
pub struct DataStore {
    tokens: Mutex<TtlCache<TokenInfo>>,
    traders: Mutex<TtlCache<TraderStats>>,
    trader_tokens: Mutex<TtlCache<TraderTokenStats>>,
}

impl DataStore {
    pub fn new(token_ttl: Option<Duration>, trader_ttl: Option<Duration>) -> Self {
        Self {
            tokens: Mutex::new(TtlCache::new(DEFAULT_CACHE_CAPACITY, token_ttl)),
            traders: Mutex::new(TtlCache::new(DEFAULT_CACHE_CAPACITY, trader_ttl)),
            trader_tokens: Mutex::new(TtlCache::new(DEFAULT_CACHE_CAPACITY, trader_ttl)),
        }
    }

    pub fn get_token(&self, token_mint: &str) -> Option<TokenInfo> {
        self.tokens.lock().unwrap().get(token_mint)
    }

    pub fn set_token(&self, token_mint: &str, data: TokenInfo) {
        self.tokens.lock().unwrap().set(token_mint.to_string(), data);
    }

    pub fn get_trader(&self, leader_wallet: &str) -> Option<TraderStats> {
        self.traders.lock().unwrap().get(leader_wallet)
    }

    pub fn set_trader(&self, leader_wallet: &str, data: TraderStats) {
        self.traders.lock().unwrap().set(leader_wallet.to_string(), data);
    }

    pub fn get_trader_token(&self, key: &str) -> Option<TraderTokenStats> {
        self.trader_tokens.lock().unwrap().get(key)
    }

    pub fn set_trader_token(&self, key: &str, data: TraderTokenStats) {
        self.trader_tokens.lock().unwrap().set(key.to_string(), data);
    }

    pub fn clear_token(&self, token_mint: Option<&str>) {
        let mut cache = self.tokens.lock().unwrap();
        match token_mint {
            Some(t) => cache.remove(t),
            None => cache.clear(),
        }
    }

    pub fn clear_trader(&self, leader_wallet: Option<&str>) {
        let mut cache = self.traders.lock().unwrap();
        match leader_wallet {
            Some(w) => cache.remove(w),
            None => cache.clear(),
        }
    }

    pub fn clear_all(&self) {
        self.tokens.lock().unwrap().clear();
        self.traders.lock().unwrap().clear();
        self.trader_tokens.lock().unwrap().clear();
    }

    pub fn get_cache_stats(&self) -> DataStoreCacheStats {
        let tokens = self.tokens.lock().unwrap();
        let traders = self.traders.lock().unwrap();
        DataStoreCacheStats {
            token_cache_size: tokens.len(),
            trader_cache_size: traders.len(),
            expired_tokens: tokens.expired_count(),
            expired_traders: traders.expired_count(),
        }
    }

    /// Key format for the trader×token cache: `"{leader_wallet}:{token_mint}"`.
    pub fn trader_token_key(leader_wallet: &str, token_mint: &str) -> String {
        format!("{}:{}", leader_wallet, token_mint)
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct DataStoreCacheStats {
    pub token_cache_size: usize,
    pub trader_cache_size: usize,
    pub expired_tokens: usize,
    pub expired_traders: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_cache_expires_lazily() {
        let mut cache: TtlCache<u32> = TtlCache::new(10, Some(Duration::from_millis(1)));
        cache.set("k".to_string(), 42);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get("k"), None);
        // the stale entry is still counted until something purges it
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn ttl_cache_none_never_expires() {
        let mut cache: TtlCache<u32> = TtlCache::new(10, None);
        cache.set("k".to_string(), 1);
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(cache.get("k"), Some(1));
    }

    #[test]
    fn sync_models_open_position_updates_both() {
        let stats = TraderStats::default();
        let token_stats = TraderTokenStats::default();
        let (s, t) = sync_models(
            &stats,
            &token_stats,
            &SyncOperation::OpenPosition {
                volume_sol: Decimal::ONE,
                timestamp: Utc::now(),
            },
        );
        assert_eq!(s.opens, 1);
        assert_eq!(t.opens, 1);
        assert_eq!(s.volume_open, Decimal::ONE);
        assert_eq!(t.volume_open, Decimal::ONE);
    }

    #[test]
    fn reconcile_sets_closes_without_touching_opens() {
        let mut stats = TraderTokenStats {
            opens: 5,
            closes: 1,
            ..Default::default()
        };
        reconcile_active_positions(&mut stats, 2);
        assert_eq!(stats.opens, 5);
        assert_eq!(stats.active_open(), 2);
    }

    #[test]
    fn reconcile_is_idempotent() {
        let mut stats = TraderTokenStats {
            opens: 5,
            closes: 1,
            ..Default::default()
        };
        reconcile_active_positions(&mut stats, 2);
        let closes_after_first = stats.closes;
        reconcile_active_positions(&mut stats, 2);
        assert_eq!(stats.closes, closes_after_first);
    }

    #[test]
    fn data_store_set_then_get_roundtrips() {
        let store = DataStore::new(None, None);
        store.set_trader("Leader1", TraderStats::default());
        assert!(store.get_trader("Leader1").is_some());
        assert!(store.get_trader("Leader2").is_none());
    }
}
