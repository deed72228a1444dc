//! Shared mocks for the integration tests: an in-memory chain adapter with
//! call counters and a table-driven bytecode analyzer.

#![allow(dead_code)]

use async_trait::async_trait;
use defi_analyzer::bytecode::BytecodeAnalyzer;
use defi_analyzer::chain::{BlockInfo, ChainAdapter, TransactionOutcome};
use defi_analyzer::config::{ChainSettings, Config};
use defi_analyzer::errors::ChainError;
use defi_analyzer::types::{PendingTransaction, ProtocolFields, ProtocolType};
use ethers::types::{Address, TransactionRequest, H256, U256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn addr(n: u64) -> Address {
    Address::from_low_u64_be(n)
}

/// Config with chain 1 registered under default timings.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config
        .chains
        .insert(1, ChainSettings::named("testnet"));
    config
}

//================================================================================================//
//                                      MOCK CHAIN ADAPTER                                        //
//================================================================================================//

pub struct MockChainAdapter {
    pub block: Mutex<BlockInfo>,
    pub gas_price: U256,
    pub pending: Mutex<Vec<PendingTransaction>>,
    pub states: Mutex<HashMap<Address, ProtocolFields>>,
    /// Artificial latency on `get_block`, to widen refresh contention windows.
    pub block_delay: Duration,
    /// Artificial latency on `send_transaction`, standing in for the wait on
    /// an inclusion receipt.
    pub send_delay: Duration,
    pub send_succeeds: AtomicBool,
    pub block_calls: AtomicUsize,
    pub send_calls: AtomicUsize,
}

impl MockChainAdapter {
    pub fn new() -> Self {
        Self {
            block: Mutex::new(BlockInfo {
                number: 100,
                timestamp: 1_700_000_000,
            }),
            gas_price: U256::from(30_000_000_000u64),
            pending: Mutex::new(Vec::new()),
            states: Mutex::new(HashMap::new()),
            block_delay: Duration::ZERO,
            send_delay: Duration::ZERO,
            send_succeeds: AtomicBool::new(true),
            block_calls: AtomicUsize::new(0),
            send_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_block_delay(mut self, delay: Duration) -> Self {
        self.block_delay = delay;
        self
    }

    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = delay;
        self
    }

    pub fn failing_sends(self) -> Self {
        self.send_succeeds.store(false, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl ChainAdapter for MockChainAdapter {
    async fn get_block(&self, _chain_id: u64) -> Result<BlockInfo, ChainError> {
        self.block_calls.fetch_add(1, Ordering::SeqCst);
        if !self.block_delay.is_zero() {
            tokio::time::sleep(self.block_delay).await;
        }
        Ok(*self.block.lock().unwrap())
    }

    async fn get_gas_price(&self, _chain_id: u64) -> Result<U256, ChainError> {
        Ok(self.gas_price)
    }

    async fn get_balance(&self, _chain_id: u64, _address: Address) -> Result<U256, ChainError> {
        Ok(U256::exp10(18))
    }

    async fn send_transaction(
        &self,
        _chain_id: u64,
        _tx: TransactionRequest,
    ) -> Result<TransactionOutcome, ChainError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        if !self.send_delay.is_zero() {
            tokio::time::sleep(self.send_delay).await;
        }
        if self.send_succeeds.load(Ordering::SeqCst) {
            Ok(TransactionOutcome {
                success: true,
                tx_hash: H256::zero(),
                gas_used: Some(U256::from(21_000u64)),
            })
        } else {
            Err(ChainError::NonceTooLow(None))
        }
    }

    async fn estimate_gas(
        &self,
        _chain_id: u64,
        _tx: &TransactionRequest,
    ) -> Result<U256, ChainError> {
        Ok(U256::from(21_000u64))
    }

    async fn get_pending_transactions(
        &self,
        _chain_id: u64,
    ) -> Result<Vec<PendingTransaction>, ChainError> {
        Ok(self.pending.lock().unwrap().clone())
    }

    async fn get_protocol_states(
        &self,
        _chain_id: u64,
        addresses: &[Address],
    ) -> Result<HashMap<Address, ProtocolFields>, ChainError> {
        let states = self.states.lock().unwrap();
        Ok(addresses
            .iter()
            .filter_map(|a| states.get(a).map(|f| (*a, f.clone())))
            .collect())
    }
}

//================================================================================================//
//                                    MOCK BYTECODE ANALYZER                                      //
//================================================================================================//

/// Table entry: (is_protocol, type, outgoing calls). Addresses missing from
/// the table classify as unknown non-protocols with no calls.
pub struct MockBytecodeAnalyzer {
    pub contracts: HashMap<Address, (bool, ProtocolType, Vec<Address>)>,
    pub classify_calls: AtomicUsize,
}

impl MockBytecodeAnalyzer {
    pub fn new() -> Self {
        Self {
            contracts: HashMap::new(),
            classify_calls: AtomicUsize::new(0),
        }
    }

    pub fn protocol(
        mut self,
        address: Address,
        protocol_type: ProtocolType,
        calls: Vec<Address>,
    ) -> Self {
        self.contracts.insert(address, (true, protocol_type, calls));
        self
    }

    pub fn plain_contract(mut self, address: Address, calls: Vec<Address>) -> Self {
        self.contracts
            .insert(address, (false, ProtocolType::Unknown, calls));
        self
    }

    fn lookup(&self, address: Address) -> (bool, ProtocolType, Vec<Address>) {
        self.contracts
            .get(&address)
            .cloned()
            .unwrap_or((false, ProtocolType::Unknown, Vec::new()))
    }
}

#[async_trait]
impl BytecodeAnalyzer for MockBytecodeAnalyzer {
    async fn get_external_calls(&self, address: Address) -> Result<Vec<Address>, ChainError> {
        self.classify_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.lookup(address).2)
    }

    async fn is_protocol(&self, address: Address) -> Result<bool, ChainError> {
        Ok(self.lookup(address).0)
    }

    async fn identify_protocol_type(
        &self,
        address: Address,
    ) -> Result<ProtocolType, ChainError> {
        Ok(self.lookup(address).1)
    }
}
