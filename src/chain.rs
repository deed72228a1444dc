//! # Chain Adapter Seam
//!
//! The analyzer never talks to an RPC endpoint directly. All chain reads and
//! writes go through the [`ChainAdapter`] trait, implemented elsewhere by a
//! per-chain client with endpoint failover. Implementations are expected to
//! surface connection loss as [`ChainError::InactiveConnection`] so the
//! recovery coordinator can take the resync path.

use crate::errors::ChainError;
use crate::types::{PendingTransaction, ProtocolFields};
use async_trait::async_trait;
use ethers::types::{Address, TransactionRequest, H256, U256};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
pub struct BlockInfo {
    pub number: u64,
    /// Block timestamp in seconds.
    pub timestamp: u64,
}

#[derive(Debug, Clone)]
pub struct TransactionOutcome {
    pub success: bool,
    pub tx_hash: H256,
    pub gas_used: Option<U256>,
}

/// Narrow interface over a per-chain RPC client.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    async fn get_block(&self, chain_id: u64) -> Result<BlockInfo, ChainError>;

    async fn get_gas_price(&self, chain_id: u64) -> Result<U256, ChainError>;

    async fn get_balance(&self, chain_id: u64, address: Address) -> Result<U256, ChainError>;

    async fn send_transaction(
        &self,
        chain_id: u64,
        tx: TransactionRequest,
    ) -> Result<TransactionOutcome, ChainError>;

    async fn estimate_gas(
        &self,
        chain_id: u64,
        tx: &TransactionRequest,
    ) -> Result<U256, ChainError>;

    async fn get_pending_transactions(
        &self,
        chain_id: u64,
    ) -> Result<Vec<PendingTransaction>, ChainError>;

    /// Current protocol state for the given addresses. Addresses the adapter
    /// cannot resolve are simply absent from the returned map.
    async fn get_protocol_states(
        &self,
        chain_id: u64,
        addresses: &[Address],
    ) -> Result<HashMap<Address, ProtocolFields>, ChainError>;
}
