//! # Protocol Interaction Graph
//!
//! Bounded breadth-first expansion over bytecode-derived call targets. Graphs
//! are built fresh per analysis request and owned by the caller; nothing here
//! is shared across concurrent requests.

mod vectors;

pub use vectors::find_vectors;

use crate::bytecode::CachedBytecodeAnalyzer;
use crate::config::GraphSettings;
use crate::errors::GraphError;
use crate::types::{
    GraphEdgeExport, GraphExport, GraphNodeExport, InteractionType, ProtocolType,
};
use ethers::types::Address;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ProtocolNode {
    pub address: Address,
    pub protocol_type: ProtocolType,
    pub chain_id: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct InteractionEdge {
    pub interaction_type: InteractionType,
}

/// Directed interaction graph rooted at the analyzed protocol.
pub struct ProtocolGraph {
    graph: DiGraph<ProtocolNode, InteractionEdge>,
    index: HashMap<Address, NodeIndex>,
    start: Address,
    chain_id: u64,
}

impl ProtocolGraph {
    pub fn start(&self) -> Address {
        self.start
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, address: Address) -> bool {
        self.index.contains_key(&address)
    }

    pub fn protocol_type_of(&self, address: Address) -> Option<ProtocolType> {
        self.index
            .get(&address)
            .map(|ix| self.graph[*ix].protocol_type)
    }

    /// Addresses of every governance-typed node in the graph.
    pub fn governance_nodes(&self) -> Vec<Address> {
        self.graph
            .node_weights()
            .filter(|n| n.protocol_type == ProtocolType::Governance)
            .map(|n| n.address)
            .collect()
    }

    /// Outgoing neighbors with the connecting interaction type.
    pub fn successors(&self, address: Address) -> Vec<(Address, InteractionType)> {
        let Some(ix) = self.index.get(&address) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(*ix, Direction::Outgoing)
            .map(|e| (self.graph[e.target()].address, e.weight().interaction_type))
            .collect()
    }

    /// BFS distance from the start node, if reachable.
    pub fn distance_from_start(&self, address: Address) -> Option<usize> {
        let start_ix = *self.index.get(&self.start)?;
        let target_ix = *self.index.get(&address)?;
        let mut dist: HashMap<NodeIndex, usize> = HashMap::from([(start_ix, 0)]);
        let mut queue = VecDeque::from([start_ix]);
        while let Some(ix) = queue.pop_front() {
            if ix == target_ix {
                return dist.get(&ix).copied();
            }
            let d = dist[&ix];
            for next in self.graph.neighbors_directed(ix, Direction::Outgoing) {
                if !dist.contains_key(&next) {
                    dist.insert(next, d + 1);
                    queue.push_back(next);
                }
            }
        }
        None
    }

    /// Exported snapshot for downstream reporting and visualization.
    pub fn export(&self) -> GraphExport {
        GraphExport {
            nodes: self
                .graph
                .node_weights()
                .map(|n| GraphNodeExport {
                    id: n.address,
                    protocol_type: n.protocol_type,
                    chain_id: n.chain_id,
                })
                .collect(),
            edges: self
                .graph
                .edge_references()
                .map(|e| GraphEdgeExport {
                    source: self.graph[e.source()].address,
                    target: self.graph[e.target()].address,
                    interaction_type: e.weight().interaction_type,
                })
                .collect(),
        }
    }

    pub(crate) fn inner(&self) -> &DiGraph<ProtocolNode, InteractionEdge> {
        &self.graph
    }

    pub(crate) fn node_index(&self, address: Address) -> Option<NodeIndex> {
        self.index.get(&address).copied()
    }
}

pub struct ProtocolGraphBuilder {
    bytecode: Arc<CachedBytecodeAnalyzer>,
    settings: GraphSettings,
}

impl ProtocolGraphBuilder {
    pub fn new(bytecode: Arc<CachedBytecodeAnalyzer>, settings: GraphSettings) -> Self {
        Self { bytecode, settings }
    }

    pub fn settings(&self) -> &GraphSettings {
        &self.settings
    }

    /// Breadth-first expansion from `start`, bounded by `max_depth`.
    ///
    /// Discovered call targets are only added once the bytecode analyzer
    /// classifies them as protocols; everything else is pruned. Frontier items
    /// are expanded only while their depth is strictly below `max_depth`, so
    /// no node's BFS distance from the start exceeds the bound.
    pub async fn build(
        &self,
        start: Address,
        chain_id: u64,
        max_depth: usize,
    ) -> Result<ProtocolGraph, GraphError> {
        let mut graph = DiGraph::new();
        let mut index: HashMap<Address, NodeIndex> = HashMap::new();

        let start_class = self
            .bytecode
            .classify(start)
            .await
            .map_err(|e| GraphError::Bytecode {
                address: format!("{start:?}"),
                source: e,
            })?;
        let start_ix = graph.add_node(ProtocolNode {
            address: start,
            protocol_type: start_class.protocol_type,
            chain_id,
        });
        index.insert(start, start_ix);

        let mut visited: HashSet<Address> = HashSet::from([start]);
        let mut pruned: HashSet<Address> = HashSet::new();
        let mut queue: VecDeque<(Address, usize)> = VecDeque::from([(start, 0)]);

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            let current_class = match self.bytecode.classify(current).await {
                Ok(c) => c,
                Err(e) => {
                    // A single unreadable contract prunes its subtree, it
                    // does not abort the build.
                    warn!(target: "protocol_graph", address = ?current, error = %e, "classification failed mid-expansion");
                    continue;
                }
            };
            for target in current_class.external_calls {
                if visited.contains(&target) || pruned.contains(&target) {
                    continue;
                }
                let target_class = match self.bytecode.classify(target).await {
                    Ok(c) => c,
                    Err(e) => {
                        warn!(target: "protocol_graph", address = ?target, error = %e, "classification failed for call target");
                        pruned.insert(target);
                        continue;
                    }
                };
                if !target_class.is_protocol {
                    pruned.insert(target);
                    continue;
                }
                visited.insert(target);
                let target_ix = graph.add_node(ProtocolNode {
                    address: target,
                    protocol_type: target_class.protocol_type,
                    chain_id,
                });
                index.insert(target, target_ix);
                let current_ix = index[&current];
                graph.add_edge(
                    current_ix,
                    target_ix,
                    InteractionEdge {
                        interaction_type: classify_interaction(
                            graph[current_ix].protocol_type,
                            target_class.protocol_type,
                        ),
                    },
                );
                queue.push_back((target, depth + 1));
            }
        }

        debug!(
            target: "protocol_graph",
            start = ?start,
            chain_id,
            max_depth,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            pruned = pruned.len(),
            "built protocol graph"
        );
        Ok(ProtocolGraph {
            graph,
            index,
            start,
            chain_id,
        })
    }
}

/// Edge classification for a (source, target) pair, independent of how the
/// nodes themselves were admitted to the graph.
fn classify_interaction(source: ProtocolType, target: ProtocolType) -> InteractionType {
    match (source, target) {
        (_, ProtocolType::FlashLoan) | (ProtocolType::FlashLoan, _) => InteractionType::FlashLoan,
        (_, ProtocolType::Governance) | (ProtocolType::Governance, _) => {
            InteractionType::Governance
        }
        (_, ProtocolType::Dex) | (ProtocolType::Dex, _) => InteractionType::PriceImpact,
        _ => InteractionType::Other,
    }
}
