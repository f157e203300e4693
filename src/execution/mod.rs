pub mod client;
pub mod evm;
#[cfg(test)]
pub mod testing;

pub use client::{ChainClient, ReceiptStatus, TxHash};
pub use evm::{EvmChainClient, EvmConfig};
