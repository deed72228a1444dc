//! # Cross-Protocol Analyzer
//!
//! Top-level orchestration: for one (protocol, chain) request, fetch a
//! consistent state snapshot (routing connection loss through the recovery
//! coordinator), expand the interaction graph, and run vector analysis and
//! the MEV detectors. Every sub-analysis owns one slot in the report; a
//! failing sub-analysis degrades to an empty slot plus a recorded error, and
//! never aborts its siblings.

use crate::bytecode::{BytecodeAnalyzer, CachedBytecodeAnalyzer};
use crate::chain::ChainAdapter;
use crate::config::Config;
use crate::engine::{CompetitionTracker, OpportunityEngine};
use crate::errors::{ErrorCategory, StateError};
use crate::graph::{find_vectors, ProtocolGraphBuilder};
use crate::recovery::{ErrorRecoveryCoordinator, FailureContext};
use crate::risk::MAX_RISK_SCORE;
use crate::state::{StateCache, UpdatePipeline};
use crate::types::{ChainState, GraphExport, InteractionVector, MEVOpportunity};
use chrono::{DateTime, Utc};
use ethers::types::Address;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Governance-typed nodes reachable from the analyzed protocol.
#[derive(Debug, Clone, Default)]
pub struct GovernanceExposure {
    pub count: usize,
    pub addresses: Vec<Address>,
}

#[derive(Debug, Clone, Default)]
pub struct RiskSummary {
    pub risk_score: f64,
    pub risk_factors: Vec<String>,
}

/// One analysis result. Every slot is always present, possibly empty.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub report_id: Uuid,
    pub address: Address,
    pub chain_id: u64,
    pub generated_at: DateTime<Utc>,
    pub interaction_vectors: Vec<InteractionVector>,
    pub opportunities: Vec<MEVOpportunity>,
    pub governance_exposure: GovernanceExposure,
    pub graph: GraphExport,
    pub risk: RiskSummary,
    pub errors: Vec<String>,
}

pub struct CrossProtocolAnalyzer {
    cache: Arc<StateCache>,
    pipeline: UpdatePipeline,
    recovery: Arc<ErrorRecoveryCoordinator>,
    graph_builder: ProtocolGraphBuilder,
    engine: OpportunityEngine,
}

impl CrossProtocolAnalyzer {
    pub fn new(
        adapter: Arc<dyn ChainAdapter>,
        bytecode: Arc<dyn BytecodeAnalyzer>,
        config: Config,
    ) -> Self {
        let cache = Arc::new(StateCache::new(adapter.clone(), &config));
        let pipeline = UpdatePipeline::start(cache.clone());
        let recovery = Arc::new(ErrorRecoveryCoordinator::new(
            adapter.clone(),
            cache.clone(),
            config.recovery.clone(),
        ));
        let cached_bytecode = Arc::new(CachedBytecodeAnalyzer::new(bytecode, &config.graph));
        let graph_builder = ProtocolGraphBuilder::new(cached_bytecode, config.graph.clone());
        let engine = OpportunityEngine::new(
            cache.clone(),
            Arc::new(CompetitionTracker::new()),
            config.engine.clone(),
            config.risk_weights.clone(),
        );
        Self {
            cache,
            pipeline,
            recovery,
            graph_builder,
            engine,
        }
    }

    pub fn cache(&self) -> &Arc<StateCache> {
        &self.cache
    }

    /// Producers (refresh jobs, replicators, recovery steps) submit state
    /// deltas through here.
    pub fn pipeline(&self) -> &UpdatePipeline {
        &self.pipeline
    }

    pub fn recovery(&self) -> &Arc<ErrorRecoveryCoordinator> {
        &self.recovery
    }

    pub fn engine(&self) -> &OpportunityEngine {
        &self.engine
    }

    /// Analyzes one protocol on one chain. Infallible by construction: each
    /// failing sub-analysis is recorded and its slot left empty.
    pub async fn analyze(&self, address: Address, chain_id: u64) -> AnalysisReport {
        let report_id = Uuid::new_v4();
        info!(target: "analyzer", %report_id, ?address, chain_id, "starting cross-protocol analysis");

        let mut errors = Vec::new();

        if let Err(e) = self.cache.track_protocols(chain_id, &[address]).await {
            errors.push(format!("track_protocols: {e}"));
        }
        let state = self.fetch_state(chain_id, &mut errors).await;

        let max_depth = self.graph_builder.settings().max_depth;
        let cutoff = self.graph_builder.settings().vector_cutoff;
        let graph = match self.graph_builder.build(address, chain_id, max_depth).await {
            Ok(g) => Some(g),
            Err(e) => {
                warn!(target: "analyzer", %report_id, error = %e, "graph build failed");
                errors.push(format!("graph: {e}"));
                None
            }
        };

        let interaction_vectors = graph
            .as_ref()
            .map(|g| find_vectors(g, cutoff))
            .unwrap_or_default();

        let governance_exposure = graph
            .as_ref()
            .map(|g| {
                let addresses = g.governance_nodes();
                GovernanceExposure {
                    count: addresses.len(),
                    addresses,
                }
            })
            .unwrap_or_default();

        let opportunities = match &state {
            Some(snapshot) => self.engine.detect_on(snapshot).await,
            None => {
                errors.push("opportunities: no state available".to_string());
                Vec::new()
            }
        };

        let graph_export = graph.as_ref().map(|g| g.export()).unwrap_or_default();
        let risk = summarize_risk(
            state.is_some(),
            &interaction_vectors,
            &opportunities,
            &governance_exposure,
        );

        info!(
            target: "analyzer",
            %report_id,
            vectors = interaction_vectors.len(),
            opportunities = opportunities.len(),
            errors = errors.len(),
            risk_score = risk.risk_score,
            "analysis complete"
        );
        AnalysisReport {
            report_id,
            address,
            chain_id,
            generated_at: Utc::now(),
            interaction_vectors,
            opportunities,
            governance_exposure,
            graph: graph_export,
            risk,
            errors,
        }
    }

    /// One retry through the recovery coordinator when the adapter reports a
    /// state inconsistency (e.g. an inactive connection during refresh).
    async fn fetch_state(&self, chain_id: u64, errors: &mut Vec<String>) -> Option<ChainState> {
        match self.cache.get_state(chain_id).await {
            Ok(state) => Some(state),
            Err(StateError::Chain(chain_error))
                if chain_error.category() == ErrorCategory::StateInconsistency =>
            {
                warn!(target: "analyzer", chain_id, error = %chain_error, "state read failed, attempting recovery");
                let context = FailureContext::new("state refresh during analysis");
                let recovery = self
                    .recovery
                    .handle_error(&chain_error, &context, chain_id)
                    .await;
                if recovery.success {
                    match self.cache.get_state(chain_id).await {
                        Ok(state) => return Some(state),
                        Err(e) => errors.push(format!("state after recovery: {e}")),
                    }
                } else {
                    errors.push(format!("state recovery failed: {chain_error}"));
                }
                None
            }
            Err(e) => {
                errors.push(format!("state: {e}"));
                None
            }
        }
    }
}

fn summarize_risk(
    have_state: bool,
    vectors: &[InteractionVector],
    opportunities: &[MEVOpportunity],
    governance: &GovernanceExposure,
) -> RiskSummary {
    if !have_state {
        // Conservative default when the chain could not be read at all.
        return RiskSummary {
            risk_score: MAX_RISK_SCORE,
            risk_factors: vec!["state_unavailable".to_string()],
        };
    }
    let mut risk_factors: Vec<String> = Vec::new();
    let mut score: f64 = 0.0;
    for opportunity in opportunities {
        score = score.max(opportunity.risk_score);
        for factor in &opportunity.risk_factors {
            if !risk_factors.contains(factor) {
                risk_factors.push(factor.clone());
            }
        }
    }
    for vector in vectors {
        score = score.max(vector.detection_probability * 0.5);
        for factor in &vector.risk_factors {
            if !risk_factors.contains(factor) {
                risk_factors.push(factor.clone());
            }
        }
    }
    if governance.count > 0 {
        score = score.max(0.4);
        risk_factors.push("governance_exposure".to_string());
    }
    RiskSummary {
        risk_score: score.clamp(0.0, MAX_RISK_SCORE),
        risk_factors,
    }
}
