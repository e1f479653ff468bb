use crate::error::CoreError;
use crate::sizing::SizingRule;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[cfg(feature = "native")]
use base64::{engine::general_purpose::STANDARD as Base64Engine, Engine};

/// Per-leader configuration: the wallet to follow and how its trades are sized.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LeaderConfig {
    pub wallet: String,
    pub sizing_rule: SizingRule,
    #[serde(default)]
    pub max_position_size: Option<Decimal>,
    #[serde(default)]
    pub daily_limit: Option<Decimal>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    // Leader configuration
    #[serde(default)]
    pub leaders: Vec<LeaderConfig>,

    // RPC / feed endpoints
    pub solana_rpc_urls: Vec<String>,
    pub event_feed_ws_url: String,
    #[serde(default)]
    pub event_feed_api_key: Option<String>,
    pub signature_ws_url: String,
    pub pump_fun_program: String,
    pub metadata_program: String,

    // Transaction-execution HTTP API (external collaborator)
    pub transaction_api_base_url: String,
    #[serde(default)]
    pub transaction_api_key: Option<String>,

    // Wallet
    #[serde(default)]
    pub wallet_keypair_path: Option<String>,
    #[serde(default)]
    pub wallet_keypair_json: Option<String>,
    #[serde(default)]
    pub wallet_private_key_string: Option<String>,
    #[serde(default)]
    pub wallet_pubkey: Option<String>,

    // Validation thresholds
    #[serde(default = "default_min_sol_balance")]
    pub min_sol_balance: Decimal,
    #[serde(default = "default_max_position_size")]
    pub max_position_size: Decimal,
    #[serde(default = "default_max_daily_volume")]
    pub max_daily_volume: Decimal,
    #[serde(default = "default_min_trade_interval_seconds")]
    pub min_trade_interval_seconds: i64,
    #[serde(default)]
    pub strict_mode: bool,

    // Sizing / execution
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u64,
    #[serde(default = "default_priority_fee_lamports")]
    pub priority_fee_lamports: u64,
    #[serde(default = "default_execution_loop_delay_ms")]
    pub execution_loop_delay_ms: u64,
    #[serde(default = "default_pending_poll_interval_ms")]
    pub pending_poll_interval_ms: u64,

    // Signature tracker concurrency
    #[serde(default = "default_max_subscriptions")]
    pub max_subscriptions: usize,
    #[serde(default = "default_admission_queue_capacity")]
    pub admission_queue_capacity: usize,
    #[serde(default = "default_signature_timeout_secs")]
    pub default_signature_timeout_secs: u64,
    #[serde(default = "default_timeout_check_interval_secs")]
    pub timeout_check_interval_secs: u64,

    // Analyzer concurrency
    #[serde(default = "default_rpc_semaphore_permits")]
    pub rpc_semaphore_permits: usize,
    #[serde(default = "default_heavy_operation_semaphore_permits")]
    pub heavy_operation_semaphore_permits: usize,
    #[serde(default = "default_balance_semaphore_permits")]
    pub balance_semaphore_permits: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_s")]
    pub retry_backoff_s: f64,

    // Reconnection / keepalive
    #[serde(default = "default_reconnect_initial_backoff_s")]
    pub reconnect_initial_backoff_s: u64,
    #[serde(default = "default_reconnect_max_backoff_s")]
    pub reconnect_max_backoff_s: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_keepalive_interval_secs")]
    pub keepalive_interval_secs: u64,

    // Timeouts
    #[serde(default = "default_ws_handshake_timeout_secs")]
    pub ws_handshake_timeout_secs: u64,
    #[serde(default = "default_ws_ack_timeout_secs")]
    pub ws_ack_timeout_secs: u64,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    // Persistence
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    // Status/control HTTP surface
    #[serde(default = "default_http_bind_addr")]
    pub http_bind_addr: String,
}

impl Settings {
    #[cfg(feature = "native")]
    pub fn from_file(path: &str) -> Result<Self, CoreError> {
        let builder = config::Config::builder().add_source(config::File::with_name(path));
        let cfg = builder.build()?;
        Ok(cfg.try_deserialize()?)
    }

    #[cfg(feature = "native")]
    pub fn save_to_file(&self, path: &str) -> Result<(), CoreError> {
        let toml_string = toml::to_string(self)?;
        std::fs::write(path, toml_string)?;
        Ok(())
    }

    /// Merge another Settings struct, only updating fields that differ.
    /// Used for partial updates from API requests or config reloads.
    pub fn merge(&mut self, other: &Settings) {
        if other.leaders.len() != self.leaders.len()
            || other
                .leaders
                .iter()
                .zip(self.leaders.iter())
                .any(|(a, b)| a.wallet != b.wallet)
        {
            self.leaders = other.leaders.clone();
        }
        if other.solana_rpc_urls != self.solana_rpc_urls {
            self.solana_rpc_urls = other.solana_rpc_urls.clone();
        }
        if other.event_feed_ws_url != self.event_feed_ws_url {
            self.event_feed_ws_url = other.event_feed_ws_url.clone();
        }
        if other.event_feed_api_key != self.event_feed_api_key {
            self.event_feed_api_key = other.event_feed_api_key.clone();
        }
        if other.signature_ws_url != self.signature_ws_url {
            self.signature_ws_url = other.signature_ws_url.clone();
        }
        if other.pump_fun_program != self.pump_fun_program {
            self.pump_fun_program = other.pump_fun_program.clone();
        }
        if other.metadata_program != self.metadata_program {
            self.metadata_program = other.metadata_program.clone();
        }
        if other.transaction_api_base_url != self.transaction_api_base_url {
            self.transaction_api_base_url = other.transaction_api_base_url.clone();
        }
        if other.transaction_api_key != self.transaction_api_key {
            self.transaction_api_key = other.transaction_api_key.clone();
        }
        if other.wallet_keypair_path != self.wallet_keypair_path {
            self.wallet_keypair_path = other.wallet_keypair_path.clone();
        }
        if other.wallet_keypair_json != self.wallet_keypair_json {
            self.wallet_keypair_json = other.wallet_keypair_json.clone();
        }
        if other.wallet_private_key_string != self.wallet_private_key_string {
            self.wallet_private_key_string = other.wallet_private_key_string.clone();
        }
        if other.min_sol_balance != self.min_sol_balance {
            self.min_sol_balance = other.min_sol_balance;
        }
        if other.max_position_size != self.max_position_size {
            self.max_position_size = other.max_position_size;
        }
        if other.max_daily_volume != self.max_daily_volume {
            self.max_daily_volume = other.max_daily_volume;
        }
        if other.min_trade_interval_seconds != self.min_trade_interval_seconds {
            self.min_trade_interval_seconds = other.min_trade_interval_seconds;
        }
        if other.strict_mode != self.strict_mode {
            self.strict_mode = other.strict_mode;
        }
        if other.slippage_bps != self.slippage_bps {
            self.slippage_bps = other.slippage_bps;
        }
        if other.priority_fee_lamports != self.priority_fee_lamports {
            self.priority_fee_lamports = other.priority_fee_lamports;
        }
        if other.max_subscriptions != self.max_subscriptions {
            self.max_subscriptions = other.max_subscriptions;
        }
        if other.admission_queue_capacity != self.admission_queue_capacity {
            self.admission_queue_capacity = other.admission_queue_capacity;
        }
        if other.data_dir != self.data_dir {
            self.data_dir = other.data_dir.clone();
        }
        if other.http_bind_addr != self.http_bind_addr {
            self.http_bind_addr = other.http_bind_addr.clone();
        }
    }

    /// Validate settings ranges and constraints.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.min_sol_balance < Decimal::ZERO {
            return Err(CoreError::Validation(
                "min_sol_balance must be >= 0".to_string(),
            ));
        }
        if self.max_position_size <= Decimal::ZERO {
            return Err(CoreError::Validation(
                "max_position_size must be > 0".to_string(),
            ));
        }
        if self.max_daily_volume <= Decimal::ZERO {
            return Err(CoreError::Validation(
                "max_daily_volume must be > 0".to_string(),
            ));
        }
        if self.min_trade_interval_seconds < 0 {
            return Err(CoreError::Validation(
                "min_trade_interval_seconds must be >= 0".to_string(),
            ));
        }
        if self.max_subscriptions == 0 {
            return Err(CoreError::Validation(
                "max_subscriptions must be > 0".to_string(),
            ));
        }
        if self.admission_queue_capacity == 0 {
            return Err(CoreError::Validation(
                "admission_queue_capacity must be > 0".to_string(),
            ));
        }
        if self.rpc_semaphore_permits == 0
            || self.heavy_operation_semaphore_permits == 0
            || self.balance_semaphore_permits == 0
        {
            return Err(CoreError::Validation(
                "all semaphore permit counts must be > 0".to_string(),
            ));
        }
        for leader in &self.leaders {
            if let Some(max) = leader.max_position_size {
                if max <= Decimal::ZERO {
                    return Err(CoreError::Validation(format!(
                        "leader {} max_position_size must be > 0",
                        leader.wallet
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(feature = "native")]
use std::env;

/// Try to read a base64-encoded keypair from the given env var. Returns
/// the raw decoded bytes if present and valid, otherwise None.
#[cfg(feature = "native")]
pub fn load_keypair_from_env_var(var: &str) -> Option<Vec<u8>> {
    if let Ok(s) = env::var(var) {
        match Base64Engine.decode(&s) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                eprintln!("Failed to decode {}: {}", var, e);
                None
            }
        }
    } else {
        None
    }
}

/// Parse a private key string in various formats:
/// - Base58 (standard Solana format, 88 chars)
/// - JSON array string like "[1,2,3,...]"
/// - Comma-separated bytes like "1,2,3,..."
pub fn parse_private_key_string(s: &str) -> Result<Vec<u8>, String> {
    let trimmed = s.trim();

    if trimmed.len() >= 80 && !trimmed.starts_with('[') && !trimmed.contains(',') {
        return bs58::decode(trimmed)
            .into_vec()
            .map_err(|e| format!("Base58 decode failed: {}", e));
    }

    if trimmed.starts_with('[') {
        return serde_json::from_str::<Vec<u8>>(trimmed)
            .map_err(|e| format!("JSON parse failed: {}", e));
    }

    if trimmed.contains(',') {
        let parts: Result<Vec<u8>, _> = trimmed
            .split(',')
            .map(|s| s.trim().parse::<u8>())
            .collect();
        return parts.map_err(|e| format!("CSV parse failed: {}", e));
    }

    Err("Unrecognized private key format. Expected: base58, JSON array, or comma-separated bytes"
        .to_string())
}

fn default_min_sol_balance() -> Decimal {
    Decimal::new(1, 1) // 0.1
}
fn default_max_position_size() -> Decimal {
    Decimal::ONE
}
fn default_max_daily_volume() -> Decimal {
    Decimal::from(10)
}
fn default_min_trade_interval_seconds() -> i64 {
    5
}
fn default_slippage_bps() -> u64 {
    500
}
fn default_priority_fee_lamports() -> u64 {
    100_000
}
fn default_execution_loop_delay_ms() -> u64 {
    1_000
}
fn default_pending_poll_interval_ms() -> u64 {
    2_000
}
fn default_max_subscriptions() -> usize {
    100
}
fn default_admission_queue_capacity() -> usize {
    1_000
}
fn default_signature_timeout_secs() -> u64 {
    60
}
fn default_timeout_check_interval_secs() -> u64 {
    5
}
fn default_rpc_semaphore_permits() -> usize {
    10
}
fn default_heavy_operation_semaphore_permits() -> usize {
    1
}
fn default_balance_semaphore_permits() -> usize {
    5
}
fn default_max_retries() -> u32 {
    2
}
fn default_retry_backoff_s() -> f64 {
    1.0
}
fn default_reconnect_initial_backoff_s() -> u64 {
    3
}
fn default_reconnect_max_backoff_s() -> u64 {
    60
}
fn default_max_reconnect_attempts() -> u32 {
    5
}
fn default_keepalive_interval_secs() -> u64 {
    30
}
fn default_ws_handshake_timeout_secs() -> u64 {
    30
}
fn default_ws_ack_timeout_secs() -> u64 {
    15
}
fn default_http_timeout_secs() -> u64 {
    30
}
fn default_data_dir() -> String {
    "data".to_string()
}
fn default_http_bind_addr() -> String {
    "127.0.0.1:8787".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            leaders: vec![],
            solana_rpc_urls: vec![],
            event_feed_ws_url: "wss://pumpportal.fun/api/data".to_string(),
            event_feed_api_key: None,
            signature_ws_url: "wss://api.mainnet-beta.solana.com/".to_string(),
            pump_fun_program: "".to_string(),
            metadata_program: "".to_string(),
            transaction_api_base_url: "https://pumpportal.fun/api".to_string(),
            transaction_api_key: None,
            wallet_keypair_path: None,
            wallet_keypair_json: None,
            wallet_private_key_string: None,
            wallet_pubkey: None,
            min_sol_balance: default_min_sol_balance(),
            max_position_size: default_max_position_size(),
            max_daily_volume: default_max_daily_volume(),
            min_trade_interval_seconds: default_min_trade_interval_seconds(),
            strict_mode: false,
            slippage_bps: default_slippage_bps(),
            priority_fee_lamports: default_priority_fee_lamports(),
            execution_loop_delay_ms: default_execution_loop_delay_ms(),
            pending_poll_interval_ms: default_pending_poll_interval_ms(),
            max_subscriptions: default_max_subscriptions(),
            admission_queue_capacity: default_admission_queue_capacity(),
            default_signature_timeout_secs: default_signature_timeout_secs(),
            timeout_check_interval_secs: default_timeout_check_interval_secs(),
            rpc_semaphore_permits: default_rpc_semaphore_permits(),
            heavy_operation_semaphore_permits: default_heavy_operation_semaphore_permits(),
            balance_semaphore_permits: default_balance_semaphore_permits(),
            max_retries: default_max_retries(),
            retry_backoff_s: default_retry_backoff_s(),
            reconnect_initial_backoff_s: default_reconnect_initial_backoff_s(),
            reconnect_max_backoff_s: default_reconnect_max_backoff_s(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            keepalive_interval_secs: default_keepalive_interval_secs(),
            ws_handshake_timeout_secs: default_ws_handshake_timeout_secs(),
            ws_ack_timeout_secs: default_ws_ack_timeout_secs(),
            http_timeout_secs: default_http_timeout_secs(),
            data_dir: default_data_dir(),
            http_bind_addr: default_http_bind_addr(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_validate() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_max_position_size() {
        let mut settings = Settings::default();
        settings.max_position_size = Decimal::ZERO;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn validate_rejects_leader_with_zero_max_position() {
        let mut settings = Settings::default();
        settings.leaders.push(LeaderConfig {
            wallet: "LdrA".to_string(),
            sizing_rule: SizingRule::Mirror,
            max_position_size: Some(Decimal::ZERO),
            daily_limit: None,
        });
        assert!(settings.validate().is_err());
    }

    #[test]
    fn parse_private_key_json_array() {
        let parsed = parse_private_key_string("[1,2,3]").unwrap();
        assert_eq!(parsed, vec![1, 2, 3]);
    }

    #[test]
    #[cfg(feature = "native")]
    #[ignore] // Requires config.example.toml in working directory
    fn load_example_config() {
        let s = Settings::from_file("config.example.toml").unwrap();
        assert_eq!(s.max_subscriptions, 100);
    }
}
