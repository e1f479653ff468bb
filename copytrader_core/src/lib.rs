// Core library for the copy-trading engine - platform-agnostic trait definitions
// plus a `native` feature providing concrete tokio/reqwest/solana-client backends.

pub mod error;
pub mod models;
pub mod storage_trait;
pub mod rpc_client;
pub mod metadata;
pub mod settings;
pub mod sizing;
pub mod validation;
pub mod data_store;
pub mod event_feed;

#[cfg(feature = "native")]
pub mod position_store;
#[cfg(feature = "native")]
pub mod analyzer;
#[cfg(feature = "native")]
pub mod signature_tracker;
#[cfg(feature = "native")]
pub mod transaction_executor;
#[cfg(feature = "native")]
pub mod pipeline;

#[cfg(feature = "native")]
pub mod native;

pub use error::CoreError;
pub use models::{
    BondingCurveState, Position, PositionSide, PositionStatus, SubscriptionRecord,
    SubscriptionStatus, TokenInfo, TraderStats, TraderTokenStats,
};
pub use settings::Settings;
pub use sizing::SizingRule;
pub use storage_trait::StorageBackend;
