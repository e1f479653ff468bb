use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Map;

/// Off-chain token metadata resolved from the URI in the on-chain metadata
/// account; used only to populate `Position.token_symbol` for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffchainMetadata {
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    #[serde(default)]
    pub extras: Option<serde_json::Value>,
}

impl OffchainMetadata {
    /// Trims stray null bytes/whitespace pump.fun metadata JSON sometimes
    /// carries over from on-chain fixed-width string fields.
    pub fn normalize(&mut self) {
        for field in [&mut self.name, &mut self.symbol, &mut self.description] {
            if let Some(s) = field {
                let trimmed = s.trim_matches('\u{0}').trim().to_string();
                *s = trimmed;
            }
        }
    }
}

/// Bonding Curve State for pump.fun tokens.
///
/// Retained from the pre-graduation price model; the analyzer uses this only
/// to sanity-check bonding-curve trades, the authoritative price for a
/// settled trade always comes from on-chain balance deltas (see `analyzer.rs`).
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct BondingCurveState {
    pub virtual_token_reserves: u64,
    pub virtual_sol_reserves: u64,
    pub real_token_reserves: u64,
    pub real_sol_reserves: u64,
    pub token_total_supply: u64,
    pub complete: bool,
    pub creator: Option<String>,
}

impl BondingCurveState {
    /// Spot price in SOL per token using the virtual reserves.
    /// Formula: (virtual_sol_lamports / virtual_token_base_units) * 1e-3
    pub fn spot_price_sol_per_token(&self) -> Option<f64> {
        if self.virtual_token_reserves == 0 {
            return None;
        }
        let vsol = self.virtual_sol_reserves as f64;
        let vtok = self.virtual_token_reserves as f64;
        Some((vsol / vtok) * 1e-3)
    }
}

/// Buy or sell side of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Buy,
    Sell,
}

/// Lifecycle state of a `Position`. States move monotonically forward;
/// `Closed`, `Failed`, `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Pending,
    Executing,
    Open,
    Closing,
    Closed,
    Failed,
    Cancelled,
}

impl PositionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PositionStatus::Closed | PositionStatus::Failed | PositionStatus::Cancelled
        )
    }
}

/// The central entity: a follower trade replicated from a leader, tracked
/// from intake through execution to closure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub leader_wallet: String,
    pub token_mint: String,
    pub token_symbol: Option<String>,
    pub side: PositionSide,

    /// SOL amount chosen for this follower trade (a function of the
    /// leader's amount and the configured sizing rule), not the leader amount.
    pub amount_sol: Decimal,
    /// The leader's original amount, retained for audit.
    pub original_amount_sol: Decimal,
    /// Filled from on-chain analysis after execution; zero until then.
    pub amount_tokens: Decimal,

    pub entry_price: Option<Decimal>,
    pub execution_price: Option<Decimal>,
    pub slippage: Option<Decimal>,

    pub execution_signature: Option<String>,
    pub close_signature: Option<String>,

    pub close_price: Option<Decimal>,
    pub close_amount_sol: Option<Decimal>,

    pub realized_pnl_sol: Option<Decimal>,
    pub unrealized_pnl_sol: Option<Decimal>,

    pub status: PositionStatus,

    pub created_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,

    /// Open bag for analyzer output (fees, compute units, cost breakdown)
    /// and audit fields such as the leader payload's raw `tokenAmount`.
    #[serde(default)]
    pub metadata: Map<String, serde_json::Value>,
}

impl Position {
    pub fn new(
        id: String,
        leader_wallet: String,
        token_mint: String,
        token_symbol: Option<String>,
        side: PositionSide,
        amount_sol: Decimal,
        original_amount_sol: Decimal,
    ) -> Self {
        Self {
            id,
            leader_wallet,
            token_mint,
            token_symbol,
            side,
            amount_sol,
            original_amount_sol,
            amount_tokens: Decimal::ZERO,
            entry_price: None,
            execution_price: None,
            slippage: None,
            execution_signature: None,
            close_signature: None,
            close_price: None,
            close_amount_sol: None,
            realized_pnl_sol: None,
            unrealized_pnl_sol: None,
            status: PositionStatus::Pending,
            created_at: Utc::now(),
            executed_at: None,
            closed_at: None,
            metadata: Map::new(),
        }
    }
}

/// Per (leader_wallet, token_mint) aggregates.
/// Invariant: `active_open = max(0, opens - closes)`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraderTokenStats {
    pub leader_wallet: String,
    pub token_mint: String,
    pub opens: u64,
    pub closes: u64,
    pub failed: u64,
    pub volume_open: Decimal,
    pub volume_closed: Decimal,
    pub volume_failed: Decimal,
    pub realized_pnl: Decimal,
    pub realized_pnl_after_fees: Decimal,
    pub last_trade_at: Option<DateTime<Utc>>,
}

impl TraderTokenStats {
    pub fn active_open(&self) -> u64 {
        self.opens.saturating_sub(self.closes)
    }
}

/// Per leader_wallet aggregates, derivable as the sum of `TraderTokenStats`
/// over tokens; the data store keeps both consistent via `sync_models`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraderStats {
    pub leader_wallet: String,
    pub opens: u64,
    pub closes: u64,
    pub failed: u64,
    pub volume_open: Decimal,
    pub volume_closed: Decimal,
    pub volume_failed: Decimal,
    pub realized_pnl: Decimal,
    pub realized_pnl_after_fees: Decimal,
    pub last_trade_at: Option<DateTime<Utc>>,
}

/// Per token_mint: display identity and the set of leaders currently
/// holding positions in this token. Created lazily, never deleted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenInfo {
    pub token_mint: String,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub active_leaders: BTreeSet<String>,
}

/// One per pending Solana transaction signature being tracked by the
/// signature-tracking client. Owned exclusively by that component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Pending,
    Subscribed,
    Confirmed,
    Timeout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub signature: String,
    pub commitment: String,
    pub timeout_s: u64,
    pub queued_at: DateTime<Utc>,
    pub subscribed_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub subscription_id: Option<u64>,
    pub status: SubscriptionStatus,
}

impl SubscriptionRecord {
    pub fn new(signature: String, commitment: String, timeout_s: u64) -> Self {
        Self {
            signature,
            commitment,
            timeout_s,
            queued_at: Utc::now(),
            subscribed_at: None,
            confirmed_at: None,
            subscription_id: None,
            status: SubscriptionStatus::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spot_price_formula() {
        let state = BondingCurveState {
            virtual_sol_reserves: 30_000_000_000u64,
            virtual_token_reserves: 1_073_000_191_000_000u64,
            real_token_reserves: 0,
            real_sol_reserves: 0,
            token_total_supply: 0,
            complete: false,
            creator: None,
        };
        let price = state.spot_price_sol_per_token();
        assert!(price.is_some());
        let expected = 30.0 / 1_073_000_191.0_f64;
        assert!((price.unwrap() - expected).abs() < 1e-15);
    }

    #[test]
    fn new_position_starts_pending_with_zero_tokens() {
        let pos = Position::new(
            "pos-1".into(),
            "LdrA".into(),
            "MintX".into(),
            Some("MX".into()),
            PositionSide::Buy,
            Decimal::new(5, 1),
            Decimal::new(5, 1),
        );
        assert_eq!(pos.status, PositionStatus::Pending);
        assert_eq!(pos.amount_tokens, Decimal::ZERO);
        assert!(pos.execution_signature.is_none());
    }

    #[test]
    fn active_open_never_goes_negative() {
        let stats = TraderTokenStats {
            opens: 1,
            closes: 3,
            ..Default::default()
        };
        assert_eq!(stats.active_open(), 0);
    }

    #[test]
    fn terminal_statuses() {
        assert!(PositionStatus::Closed.is_terminal());
        assert!(PositionStatus::Failed.is_terminal());
        assert!(PositionStatus::Cancelled.is_terminal());
        assert!(!PositionStatus::Open.is_terminal());
        assert!(!PositionStatus::Pending.is_terminal());
    }
}
