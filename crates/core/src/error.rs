use thiserror::Error;

/// Shared error type used across all Memefist crates.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Ingest error: {0}")]
    Ingest(String),

    #[error("Reorg detected at block {block}: stored {stored}, chain {chain}")]
    Reorg {
        block: u64,
        stored: String,
        chain: String,
    },

    #[error(transparent)]
    Other(#[from] eyre::Error),
}
