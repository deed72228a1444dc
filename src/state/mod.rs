//! # Chain State Cache
//!
//! One lock-guarded [`ChainState`] snapshot per configured chain. This is the
//! only intentionally shared mutable state in the analyzer: readers get
//! clones, refreshes and queued deltas serialize on the same per-chain lock,
//! so a read never observes a partially merged state and N concurrent stale
//! readers trigger exactly one network refresh.

mod pipeline;

pub use pipeline::UpdatePipeline;

use crate::chain::ChainAdapter;
use crate::config::{ChainSettings, Config};
use crate::errors::{ChainError, StateError};
use crate::types::{ChainState, ProtocolFields, StateUpdate};
use dashmap::DashMap;
use ethers::types::{Address, TransactionRequest, H256, U256};
use ethers::utils::keccak256;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

struct ChainEntry {
    settings: ChainSettings,
    state: Mutex<ChainState>,
}

pub struct StateCache {
    adapter: Arc<dyn ChainAdapter>,
    chains: DashMap<u64, Arc<ChainEntry>>,
}

impl StateCache {
    pub fn new(adapter: Arc<dyn ChainAdapter>, config: &Config) -> Self {
        let cache = Self {
            adapter,
            chains: DashMap::new(),
        };
        for (chain_id, settings) in &config.chains {
            cache.register_chain(*chain_id, settings.clone());
        }
        cache
    }

    pub fn register_chain(&self, chain_id: u64, settings: ChainSettings) {
        self.chains.insert(
            chain_id,
            Arc::new(ChainEntry {
                settings,
                state: Mutex::new(ChainState::new(chain_id)),
            }),
        );
    }

    pub fn is_configured(&self, chain_id: u64) -> bool {
        self.chains.contains_key(&chain_id)
    }

    pub fn chain_settings(&self, chain_id: u64) -> Option<ChainSettings> {
        self.chains.get(&chain_id).map(|e| e.settings.clone())
    }

    /// Start tracking protocol addresses on a chain so refreshes fetch their
    /// state. Already-tracked addresses keep their current fields.
    pub async fn track_protocols(&self, chain_id: u64, addresses: &[Address]) -> Result<(), StateError> {
        let entry = self.entry(chain_id)?;
        let mut state = entry.state.lock().await;
        for address in addresses {
            state.protocol_states.entry(*address).or_default();
        }
        Ok(())
    }

    /// Returns a possibly-refreshed snapshot of the chain's state.
    ///
    /// The staleness check happens under the chain lock: the first stale
    /// reader performs the refresh, later readers observe the already-fresh
    /// state once they acquire the lock.
    pub async fn get_state(&self, chain_id: u64) -> Result<ChainState, StateError> {
        let entry = self.entry(chain_id)?;
        let mut state = entry.state.lock().await;
        let stale = match state.last_update {
            Some(at) => at.elapsed() > entry.settings.refresh_interval(),
            None => true,
        };
        if stale {
            self.refresh_locked(&entry, &mut state).await?;
        }
        Ok(state.clone())
    }

    /// Refreshes unconditionally. Used by the recovery coordinator's resync
    /// path.
    pub async fn force_resync(&self, chain_id: u64) -> Result<(), StateError> {
        let entry = self.entry(chain_id)?;
        let mut state = entry.state.lock().await;
        self.refresh_locked(&entry, &mut state).await
    }

    /// Bounded rollback: drops cached protocol fields and pending
    /// transactions, then refetches from the adapter. The block number is
    /// never regressed.
    pub async fn rollback(&self, chain_id: u64) -> Result<(), StateError> {
        let entry = self.entry(chain_id)?;
        let mut state = entry.state.lock().await;
        for fields in state.protocol_states.values_mut() {
            fields.clear();
        }
        state.pending_transactions.clear();
        self.refresh_locked(&entry, &mut state).await
    }

    /// Validates and merges one queued delta under the chain lock.
    ///
    /// Returns `Ok(false)` for a definitively rejected update (block or
    /// timestamp regression, or a per-address payload without a numeric
    /// `last_update` field); rejected updates leave the cached state
    /// untouched.
    pub async fn apply_update(&self, update: &StateUpdate) -> Result<bool, StateError> {
        let entry = self.entry(update.chain_id)?;
        let mut state = entry.state.lock().await;

        if update.block_number < state.block_number {
            warn!(
                target: "state_cache",
                chain_id = update.chain_id,
                update_block = update.block_number,
                cached_block = state.block_number,
                "dropping update: block number regression"
            );
            return Ok(false);
        }
        if update.timestamp < state.timestamp {
            warn!(
                target: "state_cache",
                chain_id = update.chain_id,
                update_ts = update.timestamp,
                cached_ts = state.timestamp,
                "dropping update: timestamp regression"
            );
            return Ok(false);
        }
        for (address, fields) in &update.updates {
            if !matches!(fields.get("last_update"), Some(Value::Number(_))) {
                warn!(
                    target: "state_cache",
                    chain_id = update.chain_id,
                    ?address,
                    "dropping update: payload missing numeric last_update"
                );
                return Ok(false);
            }
        }

        // Shallow per-address union: new fields overwrite same-named old
        // fields, unrelated fields persist.
        for (address, fields) in &update.updates {
            let slot = state.protocol_states.entry(*address).or_default();
            for (key, value) in fields {
                slot.insert(key.clone(), value.clone());
            }
        }
        state.block_number = update.block_number;
        state.timestamp = update.timestamp;
        state.last_update = Some(Instant::now());
        state.state_hash = compute_state_hash(&state.protocol_states);
        debug!(
            target: "state_cache",
            chain_id = update.chain_id,
            block = update.block_number,
            source = ?update.source,
            "merged state update"
        );
        Ok(true)
    }

    /// Expected state delta of a retried transaction, recorded by the
    /// recovery coordinator as `state_changes`.
    pub fn expected_delta(&self, tx: &TransactionRequest) -> HashMap<String, Value> {
        let value = tx.value.unwrap_or_else(U256::zero);
        let moved = u256_to_f64(value);
        let mut delta = HashMap::new();
        delta.insert("from_balance_delta".to_string(), json!(-moved));
        delta.insert("to_balance_delta".to_string(), json!(moved));
        delta.insert("from_nonce_delta".to_string(), json!(1));
        if let Some(gas_price) = tx.gas_price {
            delta.insert("max_gas_spend".to_string(), json!(u256_to_f64(gas_price * 21_000u64)));
        }
        delta
    }

    fn entry(&self, chain_id: u64) -> Result<Arc<ChainEntry>, StateError> {
        self.chains
            .get(&chain_id)
            .map(|e| e.value().clone())
            .ok_or(StateError::UnsupportedChain(chain_id))
    }

    async fn refresh_locked(
        &self,
        entry: &ChainEntry,
        state: &mut ChainState,
    ) -> Result<(), StateError> {
        let timeout = entry.settings.call_timeout();
        let chain_id = state.chain_id;

        let block = rpc_with_timeout(timeout, self.adapter.get_block(chain_id)).await?;
        let gas_price = rpc_with_timeout(timeout, self.adapter.get_gas_price(chain_id)).await?;
        let pending =
            rpc_with_timeout(timeout, self.adapter.get_pending_transactions(chain_id)).await?;

        let tracked: Vec<Address> = state.protocol_states.keys().copied().collect();
        if !tracked.is_empty() {
            let fetched = rpc_with_timeout(
                timeout,
                self.adapter.get_protocol_states(chain_id, &tracked),
            )
            .await?;
            for (address, fields) in fetched {
                state.protocol_states.insert(address, fields);
            }
        }

        // An adapter failing over to a lagging endpoint must not regress the
        // accepted block number.
        state.block_number = state.block_number.max(block.number);
        state.timestamp = state.timestamp.max(block.timestamp);
        state.gas_price = gas_price;
        state.pending_transactions = pending;
        state.last_update = Some(Instant::now());
        state.state_hash = compute_state_hash(&state.protocol_states);
        debug!(
            target: "state_cache",
            chain_id,
            block = state.block_number,
            pending = state.pending_transactions.len(),
            "refreshed chain state"
        );
        Ok(())
    }
}

async fn rpc_with_timeout<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T, ChainError>>,
) -> Result<T, ChainError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ChainError::Timeout(limit)),
    }
}

/// Deterministic digest over the protocol state map: addresses are visited in
/// sorted order and each per-address field map is serialized through a
/// `BTreeMap`, so the digest is invariant under insertion order.
pub fn compute_state_hash(states: &HashMap<Address, ProtocolFields>) -> H256 {
    let mut addresses: Vec<&Address> = states.keys().collect();
    addresses.sort();
    let mut buf = Vec::with_capacity(addresses.len() * 64);
    for address in addresses {
        buf.extend_from_slice(address.as_bytes());
        let fields: BTreeMap<&String, &Value> = states[address].iter().collect();
        match serde_json::to_vec(&fields) {
            Ok(bytes) => buf.extend_from_slice(&bytes),
            Err(e) => {
                // serde_json only fails here on non-string keys, which the
                // type rules out; log and hash what we have.
                warn!(target: "state_cache", error = %e, "field serialization failed during hashing");
            }
        }
    }
    H256::from(keccak256(buf))
}

fn u256_to_f64(value: U256) -> f64 {
    // Saturating conversion; analysis-side deltas do not need full precision.
    if value > U256::from(u128::MAX) {
        u128::MAX as f64
    } else {
        value.as_u128() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    #[test]
    fn state_hash_ignores_insertion_order() {
        let mut a: HashMap<Address, ProtocolFields> = HashMap::new();
        let mut fields_one = ProtocolFields::new();
        fields_one.insert("reserve0".into(), json!(100.5));
        fields_one.insert("last_update".into(), json!(1_700_000_000));
        let mut fields_two = ProtocolFields::new();
        fields_two.insert("last_update".into(), json!(1_700_000_001));
        a.insert(addr(1), fields_one.clone());
        a.insert(addr(2), fields_two.clone());

        let mut b: HashMap<Address, ProtocolFields> = HashMap::new();
        b.insert(addr(2), fields_two);
        b.insert(addr(1), fields_one);

        assert_eq!(compute_state_hash(&a), compute_state_hash(&b));
    }

    #[test]
    fn state_hash_changes_with_content() {
        let mut a: HashMap<Address, ProtocolFields> = HashMap::new();
        let mut fields = ProtocolFields::new();
        fields.insert("reserve0".into(), json!(100.5));
        a.insert(addr(1), fields.clone());

        let mut b: HashMap<Address, ProtocolFields> = HashMap::new();
        fields.insert("reserve0".into(), json!(200.5));
        b.insert(addr(1), fields);

        assert_ne!(compute_state_hash(&a), compute_state_hash(&b));
    }
}
