pub mod abi;
pub mod decoder;
pub mod provider;

pub use abi::MemeBattle;
pub use decoder::{DecodeError, EVENT_SIGNATURES, decode_log};
pub use provider::{ChainProvider, create_provider};
