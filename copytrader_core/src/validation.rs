// Validation Engine - pre-trade checks run before a Position leaves
// `pending`. Grounded 1:1 in the original `validation.py` ValidationEngine:
// same five checks, same strict/lenient semantics, same daily-counter reset
// behavior. Generalized from per-trader to per-(trader, leader-config)
// limits and from `f64` to `Decimal` throughout.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::rpc_client::RpcClient;
use crate::settings::Settings;

/// Outcome of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationResult {
    Passed,
    Failed,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationCheck {
    pub name: &'static str,
    pub result: ValidationResult,
    pub message: String,
    #[serde(default)]
    pub details: serde_json::Map<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl ValidationCheck {
    fn passed(name: &'static str, message: String, details: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            name,
            result: ValidationResult::Passed,
            message,
            details,
            timestamp: Utc::now(),
        }
    }

    fn failed(name: &'static str, message: String, details: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            name,
            result: ValidationResult::Failed,
            message,
            details,
            timestamp: Utc::now(),
        }
    }

    fn warning(name: &'static str, message: String, details: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            name,
            result: ValidationResult::Warning,
            message,
            details,
            timestamp: Utc::now(),
        }
    }

    /// Under strict mode, only `Passed` is acceptable; under lenient mode,
    /// `Warning` also passes and only `Failed` blocks the trade.
    pub fn is_ok(&self, strict_mode: bool) -> bool {
        if strict_mode {
            self.result == ValidationResult::Passed
        } else {
            self.result != ValidationResult::Failed
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationStats {
    pub total_checks: u64,
    pub passed: u64,
    pub failed: u64,
    pub warnings: u64,
}

/// Runs the pre-trade checks and tracks the per-trader daily counters the
/// checks depend on. Holds no transport state of its own; the RPC client for
/// balance checks is passed in per call so this stays testable with a mock.
pub struct ValidationEngine {
    daily_volume: HashMap<String, Decimal>,
    daily_trades: HashMap<String, u64>,
    last_trade_time: HashMap<String, DateTime<Utc>>,
    last_reset: chrono::NaiveDate,
    stats: ValidationStats,
}

impl Default for ValidationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationEngine {
    pub fn new() -> Self {
        Self {
            daily_volume: HashMap::new(),
            daily_trades: HashMap::new(),
            last_trade_time: HashMap::new(),
            last_reset: Utc::now().date_naive(),
            stats: ValidationStats::default(),
        }
    }

    /// Runs every applicable check for a trade and reports whether it can
    /// execute under `settings.strict_mode`. `side` is `"buy"` or `"sell"`;
    /// the token-balance check only runs for sells, matching the original.
    pub async fn validate_trade<R: RpcClient + ?Sized>(
        &mut self,
        rpc: &R,
        wallet_pubkey: &str,
        leader_wallet: &str,
        token_mint: &str,
        amount_sol: Decimal,
        side: &str,
        settings: &Settings,
    ) -> (bool, Vec<ValidationCheck>) {
        self.check_daily_reset();

        let mut checks = vec![
            self.check_sol_balance(rpc, wallet_pubkey, settings.min_sol_balance).await,
            self.check_position_size(amount_sol, leader_wallet, settings),
            self.check_daily_volume(leader_wallet, amount_sol, settings),
            self.check_trade_timing(token_mint, settings.min_trade_interval_seconds),
        ];

        if side == "sell" {
            checks.push(self.check_token_balance(rpc, wallet_pubkey, token_mint).await);
        }

        for check in &checks {
            self.record_check(check);
        }

        let can_execute = checks.iter().all(|c| c.is_ok(settings.strict_mode));
        (can_execute, checks)
    }

    async fn check_sol_balance<R: RpcClient + ?Sized>(
        &self,
        rpc: &R,
        wallet_pubkey: &str,
        required_sol: Decimal,
    ) -> ValidationCheck {
        const NAME: &str = "SolBalanceCheck";
        match rpc.get_balance(wallet_pubkey).await {
            Ok(lamports) => {
                let balance = Decimal::from(lamports) / Decimal::from(1_000_000_000u64);
                let mut details = serde_json::Map::new();
                details.insert("balance".to_string(), serde_json::json!(balance));
                details.insert("required".to_string(), serde_json::json!(required_sol));
                if balance >= required_sol {
                    ValidationCheck::passed(
                        NAME,
                        format!("Sufficient balance: {} SOL", balance),
                        details,
                    )
                } else {
                    ValidationCheck::failed(
                        NAME,
                        format!("Insufficient balance: {} SOL < {} SOL required", balance, required_sol),
                        details,
                    )
                }
            }
            Err(e) => {
                let mut details = serde_json::Map::new();
                details.insert("error".to_string(), serde_json::json!(e.to_string()));
                ValidationCheck::failed(NAME, "Failed to check SOL balance".to_string(), details)
            }
        }
    }

    async fn check_token_balance<R: RpcClient + ?Sized>(
        &self,
        rpc: &R,
        wallet_pubkey: &str,
        token_mint: &str,
    ) -> ValidationCheck {
        const NAME: &str = "TokenBalanceCheck";
        match rpc.get_token_accounts_by_owner(wallet_pubkey, Some(token_mint)).await {
            Ok(accounts) if !accounts.is_empty() => {
                let mut details = serde_json::Map::new();
                details.insert("accounts".to_string(), serde_json::json!(accounts.len()));
                ValidationCheck::passed(NAME, "Owns the token being sold".to_string(), details)
            }
            Ok(_) => {
                let mut details = serde_json::Map::new();
                details.insert("balance".to_string(), serde_json::json!(0));
                ValidationCheck::failed(NAME, "Does not own the token being sold".to_string(), details)
            }
            Err(e) => {
                let mut details = serde_json::Map::new();
                details.insert("error".to_string(), serde_json::json!(e.to_string()));
                ValidationCheck::failed(NAME, "Failed to check token balance".to_string(), details)
            }
        }
    }

    fn check_position_size(&self, amount_sol: Decimal, leader_wallet: &str, settings: &Settings) -> ValidationCheck {
        const NAME: &str = "PositionSizeCheck";
        let max_position = settings
            .leaders
            .iter()
            .find(|l| l.wallet == leader_wallet)
            .and_then(|l| l.max_position_size)
            .unwrap_or(settings.max_position_size);

        let mut details = serde_json::Map::new();
        details.insert("amount".to_string(), serde_json::json!(amount_sol));
        details.insert("max_allowed".to_string(), serde_json::json!(max_position));

        if amount_sol <= max_position {
            ValidationCheck::passed(NAME, format!("Valid position size: {} SOL", amount_sol), details)
        } else {
            details.insert("excess".to_string(), serde_json::json!(amount_sol - max_position));
            ValidationCheck::failed(
                NAME,
                format!("Position too large: {} SOL > {} SOL max", amount_sol, max_position),
                details,
            )
        }
    }

    fn check_daily_volume(&self, leader_wallet: &str, amount_sol: Decimal, settings: &Settings) -> ValidationCheck {
        const NAME: &str = "DailyVolumeCheck";
        let current = self.daily_volume.get(leader_wallet).copied().unwrap_or(Decimal::ZERO);
        let new_volume = current + amount_sol;

        let daily_limit = settings
            .leaders
            .iter()
            .find(|l| l.wallet == leader_wallet)
            .and_then(|l| l.daily_limit)
            .unwrap_or(settings.max_daily_volume);

        let mut details = serde_json::Map::new();
        details.insert("new_volume".to_string(), serde_json::json!(new_volume));
        details.insert("limit".to_string(), serde_json::json!(daily_limit));

        if new_volume <= daily_limit {
            ValidationCheck::passed(
                NAME,
                format!("Daily volume within limit: {}/{} SOL", new_volume, daily_limit),
                details,
            )
        } else {
            details.insert("excess".to_string(), serde_json::json!(new_volume - daily_limit));
            ValidationCheck::failed(
                NAME,
                format!("Exceeds daily volume limit: {} SOL > {} SOL", new_volume, daily_limit),
                details,
            )
        }
    }

    fn check_trade_timing(&self, token_mint: &str, min_interval_seconds: i64) -> ValidationCheck {
        const NAME: &str = "TradeTimingCheck";
        let Some(last_trade) = self.last_trade_time.get(token_mint) else {
            let mut details = serde_json::Map::new();
            details.insert("token".to_string(), serde_json::json!(token_mint));
            return ValidationCheck::passed(NAME, "First trade for this token.".to_string(), details);
        };

        let elapsed = Utc::now().signed_duration_since(*last_trade).num_seconds();
        let mut details = serde_json::Map::new();
        details.insert("token".to_string(), serde_json::json!(token_mint));
        details.insert("time_since_last".to_string(), serde_json::json!(elapsed));
        details.insert("min_interval".to_string(), serde_json::json!(min_interval_seconds));

        if elapsed >= min_interval_seconds {
            ValidationCheck::passed(NAME, format!("Time since last trade for token: {}s", elapsed), details)
        } else {
            // Copy-trading intentionally replicates fast flips; this is a
            // warning, not a hard failure.
            ValidationCheck::warning(
                NAME,
                format!("Fast trade for the same token: {}s < {}s", elapsed, min_interval_seconds),
                details,
            )
        }
    }

    /// Records a trade's execution against the daily counters, for future
    /// `check_daily_volume`/`check_trade_timing` calls.
    pub fn record_trade_execution(&mut self, leader_wallet: &str, token_mint: &str, amount_sol: Decimal) {
        self.check_daily_reset();
        *self.daily_volume.entry(leader_wallet.to_string()).or_insert(Decimal::ZERO) += amount_sol;
        *self.daily_trades.entry(leader_wallet.to_string()).or_insert(0) += 1;
        self.last_trade_time.insert(token_mint.to_string(), Utc::now());
    }

    /// Clears `daily_volume`/`daily_trades` on UTC-date rollover. Does NOT
    /// clear `last_trade_time` — the per-token timing check runs against
    /// wall-clock elapsed time regardless of calendar day.
    fn check_daily_reset(&mut self) {
        let today = Utc::now().date_naive();
        if today > self.last_reset {
            self.daily_volume.clear();
            self.daily_trades.clear();
            self.last_reset = today;
        }
    }

    fn record_check(&mut self, check: &ValidationCheck) {
        self.stats.total_checks += 1;
        match check.result {
            ValidationResult::Passed => self.stats.passed += 1,
            ValidationResult::Failed => self.stats.failed += 1,
            ValidationResult::Warning => self.stats.warnings += 1,
        }
    }

    pub fn get_stats(&self) -> ValidationStats {
        self.stats.clone()
    }

    pub fn reset_stats(&mut self) {
        self.stats = ValidationStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;
    use crate::rpc_client::RpcResult;

    struct MockRpc {
        balance_lamports: u64,
        token_accounts: Vec<Value>,
    }

    #[async_trait(?Send)]
    impl RpcClient for MockRpc {
        async fn get_latest_blockhash(&self) -> RpcResult<String> {
            Ok("hash".to_string())
        }
        async fn get_account_info(&self, _pubkey: &str) -> RpcResult<Option<Value>> {
            Ok(None)
        }
        async fn get_transaction(&self, _signature: &str) -> RpcResult<Option<Value>> {
            Ok(None)
        }
        async fn send_transaction(&self, _transaction: &[u8]) -> RpcResult<String> {
            Ok("sig".to_string())
        }
        async fn get_token_account_balance(&self, _pubkey: &str) -> RpcResult<u64> {
            Ok(0)
        }
        async fn get_multiple_accounts(&self, _pubkeys: &[String]) -> RpcResult<Vec<Option<Value>>> {
            Ok(vec![])
        }
        async fn simulate_transaction(&self, _transaction: &[u8]) -> RpcResult<Value> {
            Ok(Value::Null)
        }
        async fn get_program_accounts(&self, _program_id: &str, _filters: Option<Value>) -> RpcResult<Vec<Value>> {
            Ok(vec![])
        }
        async fn get_balance(&self, _pubkey: &str) -> RpcResult<u64> {
            Ok(self.balance_lamports)
        }
        async fn get_token_accounts_by_owner(&self, _owner: &str, _mint: Option<&str>) -> RpcResult<Vec<Value>> {
            Ok(self.token_accounts.clone())
        }
        async fn get_signature_statuses(&self, _signatures: &[String], _search: bool) -> RpcResult<Vec<Option<Value>>> {
            Ok(vec![])
        }
    }

    fn rpc_with_balance(sol: u64) -> MockRpc {
        MockRpc {
            balance_lamports: sol * 1_000_000_000,
            token_accounts: vec![],
        }
    }

    #[cfg(feature = "native")]
    #[tokio::test]
    async fn buy_trade_passes_with_sufficient_balance() {
        let mut engine = ValidationEngine::new();
        let settings = Settings::default();
        let rpc = rpc_with_balance(5);
        let (ok, checks) = engine
            .validate_trade(&rpc, "Wallet1", "Leader1", "MintX", Decimal::new(5, 1), "buy", &settings)
            .await;
        assert!(ok, "checks: {:?}", checks);
    }

    #[cfg(feature = "native")]
    #[tokio::test]
    async fn insufficient_sol_balance_fails_in_strict_mode() {
        let mut engine = ValidationEngine::new();
        let mut settings = Settings::default();
        settings.strict_mode = true;
        let rpc = rpc_with_balance(0);
        let (ok, _) = engine
            .validate_trade(&rpc, "Wallet1", "Leader1", "MintX", Decimal::new(5, 1), "buy", &settings)
            .await;
        assert!(!ok);
    }

    #[cfg(feature = "native")]
    #[tokio::test]
    async fn sell_without_token_balance_fails() {
        let mut engine = ValidationEngine::new();
        let settings = Settings::default();
        let rpc = rpc_with_balance(5);
        let (ok, checks) = engine
            .validate_trade(&rpc, "Wallet1", "Leader1", "MintX", Decimal::new(5, 1), "sell", &settings)
            .await;
        assert!(!ok);
        assert!(checks.iter().any(|c| c.name == "TokenBalanceCheck" && c.result == ValidationResult::Failed));
    }

    #[test]
    fn position_size_over_leader_cap_fails() {
        let engine = ValidationEngine::new();
        let mut settings = Settings::default();
        settings.leaders.push(crate::settings::LeaderConfig {
            wallet: "Leader1".to_string(),
            sizing_rule: crate::sizing::SizingRule::Mirror,
            max_position_size: Some(Decimal::new(1, 1)),
            daily_limit: None,
        });
        let check = engine.check_position_size(Decimal::ONE, "Leader1", &settings);
        assert_eq!(check.result, ValidationResult::Failed);
    }

    #[test]
    fn fast_trade_on_same_token_is_a_warning_not_a_failure() {
        let mut engine = ValidationEngine::new();
        engine.last_trade_time.insert("MintX".to_string(), Utc::now());
        let check = engine.check_trade_timing("MintX", 60);
        assert_eq!(check.result, ValidationResult::Warning);
        assert!(check.is_ok(false));
        assert!(!check.is_ok(true));
    }

    #[test]
    fn daily_reset_clears_volume_but_not_trade_timing() {
        let mut engine = ValidationEngine::new();
        engine.record_trade_execution("Leader1", "MintX", Decimal::ONE);
        engine.last_reset = Utc::now().date_naive() - chrono::Duration::days(1);
        engine.check_daily_reset();
        assert!(engine.daily_volume.get("Leader1").is_none());
        assert!(engine.last_trade_time.get("MintX").is_some());
    }
}
