// Transaction Executor - thin reqwest client against the external trade
// execution API. Never builds or signs PumpFun program instructions itself;
// that responsibility belongs entirely to the API per §6 of the engine's
// design. Grounded in the teacher's `native/http.rs` reqwest client shape,
// generalized from a metadata-fetch GET client to an authenticated POST
// client with a request/response schema for buy/sell trades.

use log::{debug, warn};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::settings::Settings;

pub type ExecutorResult<T> = Result<T, CoreError>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// One trade submission. `denominated_in_sol` mirrors the PumpPortal trade
/// API's distinction between an amount of SOL and an amount of tokens.
#[derive(Debug, Clone, Serialize)]
pub struct TradeRequest {
    pub public_key: String,
    pub action: TradeSide,
    pub mint: String,
    pub amount: Decimal,
    pub denominated_in_sol: bool,
    pub slippage_bps: u64,
    pub priority_fee_lamports: u64,
    pub pool: Option<String>,
}

impl TradeRequest {
    pub fn buy(wallet: &str, mint: &str, amount_sol: Decimal, settings: &Settings) -> Self {
        Self {
            public_key: wallet.to_string(),
            action: TradeSide::Buy,
            mint: mint.to_string(),
            amount: amount_sol,
            denominated_in_sol: true,
            slippage_bps: settings.slippage_bps,
            priority_fee_lamports: settings.priority_fee_lamports,
            pool: None,
        }
    }

    pub fn sell(wallet: &str, mint: &str, amount_tokens: Decimal, settings: &Settings) -> Self {
        Self {
            public_key: wallet.to_string(),
            action: TradeSide::Sell,
            mint: mint.to_string(),
            amount: amount_tokens,
            denominated_in_sol: false,
            slippage_bps: settings.slippage_bps,
            priority_fee_lamports: settings.priority_fee_lamports,
            pool: None,
        }
    }
}

/// Result of a server-executed trade (`POST /api/trade`): the execution
/// signature the Position Store and signature tracker then key off of.
#[derive(Debug, Clone, Deserialize)]
pub struct TradeExecutionResult {
    pub signature: String,
    #[serde(default)]
    pub error: Option<String>,
}

/// Result of a locally-signed trade (`POST /api/trade-local`): a base64
/// serialized transaction the caller signs and forwards via `sendTransaction`.
#[derive(Debug, Clone, Deserialize)]
pub struct LocalTradeResponse {
    pub transaction: String,
}

/// Thin HTTP client for the external PumpPortal-style trade API.
pub struct TransactionExecutor {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl TransactionExecutor {
    pub fn new(settings: &Settings) -> Self {
        Self {
            client: Client::new(),
            base_url: settings.transaction_api_base_url.clone(),
            api_key: settings.transaction_api_key.clone(),
        }
    }

    /// `POST /api/trade` - the server builds, signs (with the operator's
    /// managed key), and submits the transaction, returning its signature.
    pub async fn execute_trade(&self, request: &TradeRequest) -> ExecutorResult<TradeExecutionResult> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| CoreError::Config("transaction_api_key is required for /api/trade".to_string()))?;

        let url = format!("{}/trade?api-key={}", self.base_url, api_key);
        debug!("Submitting {:?} trade for mint {} via {}/trade", request.action, request.mint, self.base_url);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| CoreError::Rpc(format!("trade execution request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Trade execution API returned {}: {}", status, body);
            return Err(CoreError::Rpc(format!("trade execution API returned {}: {}", status, body)));
        }

        response
            .json::<TradeExecutionResult>()
            .await
            .map_err(|e| CoreError::ParseError(format!("invalid trade execution response: {}", e)))
    }

    /// `POST /api/trade-local` - the server returns a serialized, unsigned
    /// transaction; the caller signs locally and forwards it to the RPC node.
    pub async fn build_local_trade(&self, request: &TradeRequest) -> ExecutorResult<LocalTradeResponse> {
        let url = format!("{}/trade-local", self.base_url);
        debug!("Requesting local trade build for mint {} via {}/trade-local", request.mint, self.base_url);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| CoreError::Rpc(format!("local trade build request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Local trade build API returned {}: {}", status, body);
            return Err(CoreError::Rpc(format!("local trade build API returned {}: {}", status, body)));
        }

        response
            .json::<LocalTradeResponse>()
            .await
            .map_err(|e| CoreError::ParseError(format!("invalid local trade build response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buy_request_is_denominated_in_sol() {
        let settings = Settings::default();
        let req = TradeRequest::buy("Wallet1", "Mint1", Decimal::from(1), &settings);
        assert!(req.denominated_in_sol);
        assert_eq!(req.action, TradeSide::Buy);
    }

    #[test]
    fn sell_request_is_denominated_in_tokens() {
        let settings = Settings::default();
        let req = TradeRequest::sell("Wallet1", "Mint1", Decimal::from(1000), &settings);
        assert!(!req.denominated_in_sol);
        assert_eq!(req.action, TradeSide::Sell);
    }
}
