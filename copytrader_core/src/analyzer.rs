// Transaction Analyzer - fetches a confirmed transaction and turns it into a
// canonical analysis record: operation type, counterparty inference, token
// and SOL deltas, fee, total cost, and execution price. Grounded in
// `original_source/copy_trading/data_management/solana_manager/solana_rcp.py`
// (`SolanaTxAnalyzer`) for the analysis algorithm and retry/semaphore
// governance, and in `original_source/.../trade_analysis_processor.py` for how
// an analysis result is applied back onto a Position. Reuses this crate's
// `tx_parser.rs`/`transaction_service.rs` retry shape, generalized from
// pump.fun-create detection to arbitrary buy/sell analysis.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal::prelude::FromStr;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::error::CoreError;
use crate::rpc_client::{RpcClient, RpcResult};
use crate::settings::Settings;

const PUMPFUN_PROGRAM: &str = "6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P";
const PUMPFUN_AMM_PROGRAM: &str = "pAMMBay6oceH9fJKBRHGP5D4bD4sWpmSwMn52FMfXEA";
const JITO_TIP_ACCOUNT: &str = "ADuUkR4vqLUMWXxW9gh6D6L8pMSawimctcNZ5pGwDcEt";
const TOKEN_PROGRAM: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
const WSOL_MINT: &str = "So11111111111111111111111111111111111111112";
const SYSTEM_PROGRAM: &str = "11111111111111111111111111111111";
const COMPUTE_BUDGET_PROGRAM: &str = "ComputeBudget111111111111111111111111111111";
const ASSOCIATED_TOKEN_ACCOUNT_PROGRAM: &str = "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL";

fn forbidden_counterparties() -> HashSet<&'static str> {
    [
        PUMPFUN_PROGRAM,
        PUMPFUN_AMM_PROGRAM,
        JITO_TIP_ACCOUNT,
        ASSOCIATED_TOKEN_ACCOUNT_PROGRAM,
        TOKEN_PROGRAM,
        SYSTEM_PROGRAM,
        COMPUTE_BUDGET_PROGRAM,
    ]
    .into_iter()
    .collect()
}

/// Canonical result of analyzing one confirmed transaction.
#[derive(Debug, Clone, Serialize)]
pub struct TradeAnalysis {
    pub success: bool,
    pub op_type: Option<String>,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub token_ui_delta: Option<Decimal>,
    pub counterparty_sol_delta: Option<Decimal>,
    pub signer_sol_delta: Option<Decimal>,
    pub fee_sol: Option<Decimal>,
    pub total_cost_sol: Option<Decimal>,
    pub price_sol_per_token: Option<Decimal>,
}

impl TradeAnalysis {
    fn failed(error_kind: &str, error_message: impl Into<String>) -> Self {
        Self {
            success: false,
            op_type: None,
            error_kind: Some(error_kind.to_string()),
            error_message: Some(error_message.into()),
            token_ui_delta: None,
            counterparty_sol_delta: None,
            signer_sol_delta: None,
            fee_sol: None,
            total_cost_sol: None,
            price_sol_per_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenBalanceEntry {
    pub pubkey: String,
    pub mint: String,
    pub amount: u64,
    pub decimals: u8,
    pub ui_amount: Decimal,
    pub lamports: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceResponse {
    pub owner: String,
    pub tokens: Vec<TokenBalanceEntry>,
    pub total_tokens: usize,
}

/// Governs the three independent concurrency domains and the shared
/// retry/back-off policy applied to every RPC call made while analyzing
/// transactions or fetching balances.
pub struct TransactionAnalyzer<R: RpcClient> {
    rpc: R,
    max_retries: u32,
    retry_backoff_s: f64,
    rpc_semaphore: Semaphore,
    heavy_operation_semaphore: Semaphore,
    balance_semaphore: Semaphore,
}

impl<R: RpcClient> TransactionAnalyzer<R> {
    pub fn new(rpc: R, settings: &Settings) -> Self {
        Self {
            rpc,
            max_retries: settings.max_retries,
            retry_backoff_s: settings.retry_backoff_s,
            rpc_semaphore: Semaphore::new(settings.rpc_semaphore_permits),
            heavy_operation_semaphore: Semaphore::new(settings.heavy_operation_semaphore_permits),
            balance_semaphore: Semaphore::new(settings.balance_semaphore_permits),
        }
    }

    /// The underlying RPC client, shared with the Validation Engine so the
    /// pipeline doesn't need a second connection just to check balances.
    pub fn rpc(&self) -> &R {
        &self.rpc
    }

    /// Runs `op` under the shared retry policy: `max_retries` extra attempts,
    /// exponential back-off (`retry_backoff_s * 2^attempt`), or the longer
    /// rate-limit schedule (base 15s + 30s per attempt, capped 120s) when the
    /// error text indicates an HTTP 429.
    async fn with_retry<T, F, Fut>(&self, mut op: F) -> RpcResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RpcResult<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt >= self.max_retries {
                        return Err(err);
                    }
                    let message = err.to_string();
                    let is_rate_limited =
                        message.contains("429") || message.to_lowercase().contains("too many requests");
                    let sleep_s = if is_rate_limited {
                        (15.0 + 30.0 * attempt as f64).min(120.0)
                    } else {
                        self.retry_backoff_s * 2f64.powi(attempt as i32)
                    };
                    tokio::time::sleep(Duration::from_secs_f64(sleep_s)).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Fetches a transaction by signature and runs the analysis algorithm.
    pub async fn analyze_by_signature(&self, signature: &str) -> RpcResult<TradeAnalysis> {
        let _permit = self
            .heavy_operation_semaphore
            .acquire()
            .await
            .map_err(|e| CoreError::Rpc(e.to_string()))?;
        let tx = self
            .with_retry(|| self.rpc.get_transaction(signature))
            .await?;
        Ok(analyze_transaction(tx.as_ref()))
    }

    /// Runs `analyze_by_signature` over every signature concurrently,
    /// returning a map keyed by signature. A signature whose fetch fails
    /// entirely is omitted from the map rather than failing the whole batch.
    pub async fn analyze_multiple(
        &self,
        signatures: &[String],
    ) -> HashMap<String, TradeAnalysis> {
        let futures = signatures
            .iter()
            .map(|sig| async move { (sig.clone(), self.analyze_by_signature(sig).await) });
        let results = futures_util::future::join_all(futures).await;
        results
            .into_iter()
            .filter_map(|(sig, result)| result.ok().map(|analysis| (sig, analysis)))
            .collect()
    }

    /// Enumerates SPL token balances for `owner`, optionally scoped to
    /// `mints`, filtering zero balances unless `include_zero` is set.
    pub async fn get_token_balances(
        &self,
        owner: &str,
        mints: Option<&[String]>,
        include_zero: bool,
    ) -> RpcResult<BalanceResponse> {
        let accounts = {
            let _permit = self
                .balance_semaphore
                .acquire()
                .await
                .map_err(|e| CoreError::Rpc(e.to_string()))?;
            self.with_retry(|| self.rpc.get_token_accounts_by_owner(owner, None))
                .await?
        };

        let mut tokens = Vec::new();
        for account in &accounts {
            if let Some(entry) = parse_token_balance_entry(account) {
                if !include_zero && entry.ui_amount == Decimal::ZERO {
                    continue;
                }
                if let Some(mints) = mints {
                    if !mints.iter().any(|m| m == &entry.mint) {
                        continue;
                    }
                }
                tokens.push(entry);
            }
        }

        let total_tokens = tokens.len();
        Ok(BalanceResponse {
            owner: owner.to_string(),
            tokens,
            total_tokens,
        })
    }

    /// Fetches the lamport balance of `account`.
    pub async fn get_sol_balance(&self, account: &str) -> RpcResult<u64> {
        let _permit = self
            .rpc_semaphore
            .acquire()
            .await
            .map_err(|e| CoreError::Rpc(e.to_string()))?;
        self.with_retry(|| self.rpc.get_balance(account)).await
    }

    /// Looks up confirmation status for a batch of signatures (max 256).
    pub async fn get_signature_statuses(
        &self,
        signatures: &[String],
        search_transaction_history: bool,
    ) -> RpcResult<Vec<Option<Value>>> {
        if signatures.len() > 256 {
            return Err(CoreError::InvalidInput(
                "at most 256 signatures per getSignatureStatuses request".to_string(),
            ));
        }
        let _permit = self
            .rpc_semaphore
            .acquire()
            .await
            .map_err(|e| CoreError::Rpc(e.to_string()))?;
        self.with_retry(|| {
            self.rpc
                .get_signature_statuses(signatures, search_transaction_history)
        })
        .await
    }
}

fn parse_token_balance_entry(account: &Value) -> Option<TokenBalanceEntry> {
    let pubkey = account.get("pubkey")?.as_str()?.to_string();
    let info = account
        .get("account")?
        .get("data")?
        .get("parsed")?
        .get("info")?;
    let mint = info.get("mint")?.as_str()?.to_string();
    let token_amount = info.get("tokenAmount")?;
    let amount = token_amount
        .get("amount")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);
    let decimals = token_amount.get("decimals").and_then(|v| v.as_u64()).unwrap_or(0) as u8;
    let ui_amount = token_amount
        .get("uiAmountString")
        .and_then(|v| v.as_str())
        .and_then(|s| Decimal::from_str(s).ok())
        .unwrap_or(Decimal::ZERO);
    let lamports = account
        .get("account")
        .and_then(|a| a.get("lamports"))
        .and_then(|v| v.as_u64())
        .unwrap_or(0);
    Some(TokenBalanceEntry {
        pubkey,
        mint,
        amount,
        decimals,
        ui_amount,
        lamports,
    })
}

/// Pure analysis of a `getTransaction` (jsonParsed) response. Ported 1:1 from
/// `SolanaTxAnalyzer._analyze_transaction`.
fn analyze_transaction(tx: Option<&Value>) -> TradeAnalysis {
    let Some(tx) = tx else {
        return TradeAnalysis::failed("transaction_not_found", "transaction not found or could not be retrieved");
    };

    let Some(result) = tx.get("result").filter(|v| !v.is_null()) else {
        return TradeAnalysis::failed("transaction_not_found", "transaction result is null");
    };

    let logs = extract_logs(result);
    let op_type = detect_operation_type(&logs);

    let meta = result.get("meta").cloned().unwrap_or(Value::Null);
    let tx_err = meta.get("err").cloned().unwrap_or(Value::Null);
    if !tx_err.is_null() && tx_err != Value::Object(Default::default()) {
        let (kind, message) = detect_error(&logs, &tx_err);
        return TradeAnalysis {
            success: false,
            op_type,
            error_kind: Some(kind),
            error_message: message,
            token_ui_delta: None,
            counterparty_sol_delta: None,
            signer_sol_delta: None,
            fee_sol: None,
            total_cost_sol: None,
            price_sol_per_token: None,
        };
    }

    let signers = extract_signers(result);
    let counterparties = detect_counterparty(result, &signers)
        .map(|addr| HashSet::from([addr]))
        .unwrap_or_default();
    let exclude_for_cost: HashSet<String> = signers.union(&counterparties).cloned().collect();

    let token_ui_delta = calculate_token_delta(&meta, &signers);
    let counterparty_sol_delta = lamports_to_sol(calculate_lamports_delta(result, &meta, &counterparties));
    let signer_sol_delta = lamports_to_sol(calculate_lamports_delta(result, &meta, &signers));
    let fee_lamports = meta.get("fee").and_then(|v| v.as_i64()).unwrap_or(0);
    let fee_sol = lamports_to_sol(fee_lamports);
    let total_cost_sol = lamports_to_sol(
        fee_lamports + calculate_lamports_delta(result, &meta, &exclude_for_cost),
    );

    let price_sol_per_token = calculate_price_sol_per_token(
        op_type.as_deref(),
        token_ui_delta,
        counterparty_sol_delta,
    );

    TradeAnalysis {
        success: true,
        op_type,
        error_kind: None,
        error_message: None,
        token_ui_delta: Some(token_ui_delta),
        counterparty_sol_delta: Some(counterparty_sol_delta),
        signer_sol_delta: Some(signer_sol_delta),
        fee_sol: Some(fee_sol),
        total_cost_sol: Some(total_cost_sol),
        price_sol_per_token,
    }
}

fn lamports_to_sol(lamports: i64) -> Decimal {
    (Decimal::from(lamports) / Decimal::from(1_000_000_000i64))
        .round_dp_with_strategy(9, rust_decimal::RoundingStrategy::ToZero)
}

fn calculate_price_sol_per_token(
    op_type: Option<&str>,
    token_delta: Decimal,
    counterparty_sol: Decimal,
) -> Option<Decimal> {
    if token_delta == Decimal::ZERO || counterparty_sol == Decimal::ZERO {
        return None;
    }
    let price = match op_type {
        Some("sell") => {
            let tokens_sold = token_delta.abs();
            let sol_received = counterparty_sol.abs();
            if tokens_sold > Decimal::ZERO && sol_received > Decimal::ZERO {
                sol_received / tokens_sold
            } else {
                return None;
            }
        }
        Some("buy") => {
            if token_delta > Decimal::ZERO && counterparty_sol > Decimal::ZERO {
                counterparty_sol / token_delta
            } else {
                return None;
            }
        }
        _ => return None,
    };
    Some(price.round_dp_with_strategy(12, rust_decimal::RoundingStrategy::ToZero))
}

fn extract_signers(result: &Value) -> HashSet<String> {
    account_key_entries(result)
        .into_iter()
        .filter(|entry| entry.get("signer").and_then(|v| v.as_bool()).unwrap_or(false))
        .filter_map(|entry| entry.get("pubkey").and_then(|v| v.as_str()).map(String::from))
        .collect()
}

fn account_key_entries(result: &Value) -> Vec<Value> {
    result
        .get("transaction")
        .and_then(|t| t.get("message"))
        .and_then(|m| m.get("accountKeys"))
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default()
}

fn account_keys_strs(result: &Value) -> Vec<String> {
    account_key_entries(result)
        .into_iter()
        .filter_map(|entry| entry.get("pubkey").and_then(|v| v.as_str()).map(String::from))
        .collect()
}

fn extract_logs(result: &Value) -> Vec<String> {
    result
        .get("meta")
        .and_then(|m| m.get("logMessages"))
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default()
}

fn detect_operation_type(logs: &[String]) -> Option<String> {
    for line in logs {
        let lower = line.to_lowercase();
        if let Some(idx) = lower.find("instruction:") {
            let rest = lower[idx + "instruction:".len()..].trim();
            if rest.starts_with("buy") {
                return Some("buy".to_string());
            }
            if rest.starts_with("sell") {
                return Some("sell".to_string());
            }
        }
    }
    None
}

fn detect_error(logs: &[String], meta_err: &Value) -> (String, Option<String>) {
    if let Some(instr_err) = meta_err.get("InstructionError").and_then(|v| v.as_array()) {
        if instr_err.len() >= 2 {
            let detail = &instr_err[1];
            if detail.get("Custom").is_some() {
                // Fall through to log scanning below; custom codes are
                // classified precisely by the signature tracker's
                // `classify_notification`, which also inspects these logs.
            } else {
                return ("instruction".to_string(), Some(detail.to_string()));
            }
        }
    }

    for line in logs {
        if line.contains("AnchorError") {
            let lower = line.to_lowercase();
            if line.contains("TooMuchSolRequired") || lower.contains("slippage") {
                return ("slippage".to_string(), Some(line.clone()));
            }
            if line.contains("NotEnoughTokensToSell") || lower.contains("not enough tokens") {
                return ("insufficient_tokens".to_string(), Some(line.clone()));
            }
            return ("unknown".to_string(), Some(line.clone()));
        }
        if line.contains("insufficient lamports") {
            return ("insufficient_lamports".to_string(), Some(line.clone()));
        }
    }

    ("generic".to_string(), Some(meta_err.to_string()))
}

fn calculate_token_delta(meta: &Value, signers: &HashSet<String>) -> Decimal {
    let pre = token_balances_by_key(meta, "preTokenBalances");
    let post = token_balances_by_key(meta, "postTokenBalances");

    let mut total = Decimal::ZERO;
    let mut keys: HashSet<(i64, String)> = pre.keys().cloned().collect();
    keys.extend(post.keys().cloned());

    for key in keys {
        let pre_item = pre.get(&key);
        let post_item = post.get(&key);
        let owner = post_item
            .and_then(|v| v.get("owner"))
            .or_else(|| pre_item.and_then(|v| v.get("owner")))
            .and_then(|v| v.as_str());
        let Some(owner) = owner else { continue };
        if !signers.contains(owner) {
            continue;
        }

        let pre_ui = pre_item
            .and_then(|v| v.get("uiTokenAmount"))
            .and_then(ui_amount_decimal)
            .unwrap_or(Decimal::ZERO);
        let post_ui = post_item
            .and_then(|v| v.get("uiTokenAmount"))
            .and_then(ui_amount_decimal)
            .unwrap_or(Decimal::ZERO);
        total += post_ui - pre_ui;
    }

    total.round_dp_with_strategy(6, rust_decimal::RoundingStrategy::ToZero)
}

fn ui_amount_decimal(ui: &Value) -> Option<Decimal> {
    ui.get("uiAmountString")
        .and_then(|v| v.as_str())
        .and_then(|s| Decimal::from_str(s).ok())
}

fn token_balances_by_key(meta: &Value, field: &str) -> HashMap<(i64, String), Value> {
    meta.get(field)
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|item| {
                    let idx = item.get("accountIndex")?.as_i64()?;
                    let mint = item.get("mint")?.as_str()?.to_string();
                    Some(((idx, mint), item.clone()))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn calculate_lamports_delta(result: &Value, meta: &Value, targets: &HashSet<String>) -> i64 {
    let keys = account_keys_strs(result);
    let pre = meta.get("preBalances").and_then(|v| v.as_array()).cloned().unwrap_or_default();
    let post = meta.get("postBalances").and_then(|v| v.as_array()).cloned().unwrap_or_default();

    let mut total = 0i64;
    for (index, pubkey) in keys.iter().enumerate() {
        if !targets.contains(pubkey) {
            continue;
        }
        let pre_v = pre.get(index).and_then(|v| v.as_i64()).unwrap_or(0);
        let post_v = post.get(index).and_then(|v| v.as_i64()).unwrap_or(0);
        total += post_v - pre_v;
    }
    total
}

/// Infers the counterparty (bonding-curve or AMM pool) address by running
/// three candidate-extraction heuristics per regime and taking the majority,
/// ties broken by heuristic priority (opt1 > opt2 > opt3).
fn detect_counterparty(result: &Value, signers: &HashSet<String>) -> Option<String> {
    let account_keys = account_keys_strs(result);
    let msg_instructions: Vec<Value> = result
        .get("transaction")
        .and_then(|t| t.get("message"))
        .and_then(|m| m.get("instructions"))
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    let inner_blocks: Vec<Value> = result
        .get("meta")
        .and_then(|m| m.get("innerInstructions"))
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    let has_constant_anywhere = |target: &str| -> bool {
        if account_keys.iter().any(|k| k == target) {
            return true;
        }
        msg_instructions.iter().any(|ix| {
            ix.get("accounts")
                .and_then(|v| v.as_array())
                .map(|accs| accs.iter().any(|a| a.as_str() == Some(target)))
                .unwrap_or(false)
        })
    };
    let is_graduated = has_constant_anywhere(PUMPFUN_AMM_PROGRAM);

    let inner_instructions_iter = || {
        inner_blocks
            .iter()
            .flat_map(|block| block.get("instructions").and_then(|v| v.as_array()).cloned().unwrap_or_default())
    };

    let candidates: Vec<Option<String>> = if is_graduated {
        vec![
            amm_opt1_inner_transfer_checked_destination(&inner_instructions_iter().collect::<Vec<_>>(), signers),
            amm_opt2_account_keys_4(&account_keys),
            amm_opt3_msg_accounts_8(&msg_instructions),
        ]
    } else {
        vec![
            bc_opt1_inner_accounts_3(&inner_instructions_iter().collect::<Vec<_>>()),
            bc_opt2_account_keys_4_or_5(&account_keys),
            bc_opt3_msg_accounts_3(&msg_instructions),
        ]
    };

    let forbidden = forbidden_counterparties();
    let mut freq: HashMap<String, usize> = HashMap::new();
    let mut first_idx: HashMap<String, usize> = HashMap::new();
    for (i, candidate) in candidates.iter().enumerate() {
        if let Some(addr) = candidate {
            if forbidden.contains(addr.as_str()) {
                continue;
            }
            *freq.entry(addr.clone()).or_insert(0) += 1;
            first_idx.entry(addr.clone()).or_insert(i);
        }
    }

    freq.into_iter()
        .min_by_key(|(addr, count)| (-(*count as i64), first_idx[addr]))
        .map(|(addr, _)| addr)
}

fn ix_accounts(ix: &Value) -> Vec<String> {
    ix.get("accounts")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|a| a.as_str().map(String::from)).collect())
        .unwrap_or_default()
}

fn bc_opt1_inner_accounts_3(inner_instructions: &[Value]) -> Option<String> {
    let mut best: Option<Vec<String>> = None;
    for ix in inner_instructions {
        let accs = ix_accounts(ix);
        if accs.len() >= 4 && best.as_ref().map(|b| accs.len() > b.len()).unwrap_or(true) {
            best = Some(accs);
        }
    }
    best.and_then(|accs| accs.get(3).cloned())
}

fn bc_opt2_account_keys_4_or_5(account_keys: &[String]) -> Option<String> {
    let idx = if account_keys[..account_keys.len().min(5)]
        .iter()
        .any(|k| k == JITO_TIP_ACCOUNT)
    {
        5
    } else {
        4
    };
    account_keys.get(idx).cloned()
}

fn bc_opt3_msg_accounts_3(msg_instructions: &[Value]) -> Option<String> {
    let mut best: Option<Vec<String>> = None;
    for ix in msg_instructions {
        let accs = ix_accounts(ix);
        if accs.len() >= 4 && best.as_ref().map(|b| accs.len() > b.len()).unwrap_or(true) {
            best = Some(accs);
        }
    }
    best.and_then(|accs| accs.get(3).cloned())
}

fn amm_opt1_inner_transfer_checked_destination(
    inner_instructions: &[Value],
    signers: &HashSet<String>,
) -> Option<String> {
    let mut wsol_candidate = None;
    let mut first_candidate = None;
    for ix in inner_instructions {
        let Some(parsed) = ix.get("parsed") else { continue };
        if parsed.get("type").and_then(|v| v.as_str()) != Some("transferChecked") {
            continue;
        }
        let Some(info) = parsed.get("info") else { continue };
        let Some(authority) = info.get("authority").and_then(|v| v.as_str()) else { continue };
        let Some(destination) = info.get("destination").and_then(|v| v.as_str()) else { continue };
        if !signers.contains(authority) || destination == PUMPFUN_AMM_PROGRAM {
            continue;
        }
        if first_candidate.is_none() {
            first_candidate = Some(destination.to_string());
        }
        if info.get("mint").and_then(|v| v.as_str()) == Some(WSOL_MINT) {
            wsol_candidate = Some(destination.to_string());
        }
    }
    wsol_candidate.or(first_candidate)
}

fn amm_opt2_account_keys_4(account_keys: &[String]) -> Option<String> {
    account_keys
        .get(4)
        .filter(|addr| addr.as_str() != PUMPFUN_AMM_PROGRAM)
        .cloned()
}

fn amm_opt3_msg_accounts_8(msg_instructions: &[Value]) -> Option<String> {
    let mut best: Option<Vec<String>> = None;
    for ix in msg_instructions {
        let accs = ix_accounts(ix);
        if accs.len() >= 9 && best.as_ref().map(|b| accs.len() > b.len()).unwrap_or(true) {
            best = Some(accs);
        }
    }
    best.and_then(|accs| accs.get(8).cloned())
        .filter(|addr| addr.as_str() != PUMPFUN_AMM_PROGRAM)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_operation_type_from_logs() {
        let logs = vec!["Program log: Instruction: Buy".to_string()];
        assert_eq!(detect_operation_type(&logs), Some("buy".to_string()));
    }

    #[test]
    fn analyze_transaction_missing_tx_is_not_found() {
        let analysis = analyze_transaction(None);
        assert!(!analysis.success);
        assert_eq!(analysis.error_kind.as_deref(), Some("transaction_not_found"));
    }

    #[test]
    fn analyze_transaction_with_err_decodes_error() {
        let tx = serde_json::json!({
            "result": {
                "meta": {
                    "err": {"InstructionError": [1, {"Custom": 99}]},
                    "logMessages": ["Program log: AnchorError thrown... Error Code: TooMuchSolRequired. Error Message: slippage tolerance exceeded."]
                },
                "transaction": {"message": {"accountKeys": []}}
            }
        });
        let analysis = analyze_transaction(Some(&tx));
        assert!(!analysis.success);
        assert_eq!(analysis.error_kind.as_deref(), Some("slippage"));
    }

    #[test]
    fn price_sol_per_token_buy_divides_sol_by_tokens() {
        let price = calculate_price_sol_per_token(Some("buy"), Decimal::from(100), Decimal::from(10));
        assert_eq!(price, Some(Decimal::from_str("0.1").unwrap()));
    }

    #[test]
    fn price_sol_per_token_sell_uses_absolute_values() {
        let price = calculate_price_sol_per_token(
            Some("sell"),
            Decimal::from_str("-50").unwrap(),
            Decimal::from_str("-5").unwrap(),
        );
        assert_eq!(price, Some(Decimal::from_str("0.1").unwrap()));
    }

    #[test]
    fn lamports_to_sol_floors_toward_zero() {
        let sol = lamports_to_sol(1_500_000_001);
        assert_eq!(sol, Decimal::from_str("1.500000001").unwrap());
    }
}
