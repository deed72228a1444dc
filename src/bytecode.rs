//! # Bytecode Analyzer Seam
//!
//! Classification of contract addresses is delegated to an external bytecode
//! analyzer. Because the graph builder asks about the same addresses over and
//! over (every BFS frontier re-touches shared dependencies), a memoizing
//! wrapper with a TTL cache fronts the real analyzer.

use crate::config::GraphSettings;
use crate::errors::ChainError;
use crate::types::ProtocolType;
use async_trait::async_trait;
use ethers::types::Address;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Narrow interface over the external bytecode analysis collaborator.
#[async_trait]
pub trait BytecodeAnalyzer: Send + Sync {
    /// Addresses this contract calls out to, recovered from its bytecode.
    async fn get_external_calls(&self, address: Address) -> Result<Vec<Address>, ChainError>;

    async fn is_protocol(&self, address: Address) -> Result<bool, ChainError>;

    async fn identify_protocol_type(&self, address: Address)
        -> Result<ProtocolType, ChainError>;
}

/// Fully classified contract, the unit the memoizing wrapper caches.
#[derive(Debug, Clone)]
pub struct ClassifiedContract {
    pub is_protocol: bool,
    pub protocol_type: ProtocolType,
    pub external_calls: Vec<Address>,
}

/// TTL-cached front over a [`BytecodeAnalyzer`].
pub struct CachedBytecodeAnalyzer {
    inner: Arc<dyn BytecodeAnalyzer>,
    cache: Cache<Address, ClassifiedContract>,
}

impl CachedBytecodeAnalyzer {
    pub fn new(inner: Arc<dyn BytecodeAnalyzer>, settings: &GraphSettings) -> Self {
        let cache = Cache::builder()
            .max_capacity(settings.bytecode_cache_size)
            .time_to_live(Duration::from_secs(settings.bytecode_cache_ttl_secs))
            .build();
        Self { inner, cache }
    }

    /// One full classification per address per TTL window; concurrent callers
    /// for the same address coalesce onto a single underlying analysis.
    pub async fn classify(&self, address: Address) -> Result<ClassifiedContract, ChainError> {
        let inner = self.inner.clone();
        self.cache
            .try_get_with(address, async move {
                let is_protocol = inner.is_protocol(address).await?;
                let protocol_type = if is_protocol {
                    inner.identify_protocol_type(address).await?
                } else {
                    ProtocolType::Unknown
                };
                let external_calls = inner.get_external_calls(address).await?;
                debug!(
                    target: "bytecode",
                    ?address,
                    is_protocol,
                    calls = external_calls.len(),
                    "classified contract"
                );
                Ok::<_, ChainError>(ClassifiedContract {
                    is_protocol,
                    protocol_type,
                    external_calls,
                })
            })
            .await
            .map_err(|e: Arc<ChainError>| (*e).clone())
    }
}
