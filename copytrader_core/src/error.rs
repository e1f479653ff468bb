use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[cfg(feature = "native")]
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid keypair: {0}")]
    InvalidKeypair(String),

    #[cfg(feature = "native")]
    #[error("I/O error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialization(String),

    #[error("Integer conversion error: {0}")]
    IntConversion(#[from] std::num::TryFromIntError),

    #[error("Initialization error: {0}")]
    Init(String),

    #[error("Conversion error: {0}")]
    Conversion(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Wire error taxonomy surfaced by the signature tracker and the
    // transaction analyzer (see `signature_tracker.rs`, `analyzer.rs`).
    #[error("Slippage tolerance exceeded")]
    Slippage,

    #[error("Insufficient token balance for sell")]
    InsufficientTokens,

    #[error("Insufficient lamports to cover trade")]
    InsufficientLamports,

    #[error("Insufficient funds for rent-exempt minimum")]
    InsufficientFundsForRent,

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Invalid transaction format: {0}")]
    InvalidTransactionFormat(String),
}

impl CoreError {
    /// Maps a decoded on-chain/RPC error onto the wire taxonomy name used in
    /// position notifications and the status HTTP surface.
    pub fn wire_taxonomy(&self) -> &'static str {
        match self {
            CoreError::Slippage => "slippage",
            CoreError::InsufficientTokens => "insufficient_tokens",
            CoreError::InsufficientLamports => "insufficient_lamports",
            CoreError::InsufficientFundsForRent => "insufficient_funds_for_rent",
            CoreError::TransactionNotFound(_) => "transaction_not_found",
            CoreError::InvalidTransactionFormat(_) => "invalid_transaction_format",
            _ => "unknown",
        }
    }
}

// Alias for backward compatibility
pub type AppError = CoreError;

#[cfg(feature = "native")]
impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::Io(err.to_string())
    }
}

#[cfg(feature = "native")]
impl From<config::ConfigError> for CoreError {
    fn from(err: config::ConfigError) -> Self {
        CoreError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for CoreError {
    fn from(err: toml::ser::Error) -> Self {
        CoreError::TomlSerialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_taxonomy_maps_known_variants() {
        assert_eq!(CoreError::Slippage.wire_taxonomy(), "slippage");
        assert_eq!(
            CoreError::InsufficientFundsForRent.wire_taxonomy(),
            "insufficient_funds_for_rent"
        );
        assert_eq!(
            CoreError::Validation("x".into()).wire_taxonomy(),
            "unknown"
        );
    }
}
