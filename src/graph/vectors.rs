//! Interaction-vector analysis: enumerate simple paths through the protocol
//! graph and score each into an [`InteractionVector`].
//!
//! Path enumeration is exponential in branching factor; callers bound it via
//! the `cutoff` (maximum edges per path) and by keeping graph growth pruned
//! to protocol nodes.

use crate::graph::ProtocolGraph;
use crate::types::{InteractionType, InteractionVector, VectorType};
use ethers::types::Address;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::HashMap;
use tracing::debug;

/// Per-hop profit contribution, in the engine's profit units. Later hops are
/// discounted because each additional protocol compounds execution risk.
fn edge_profit(interaction: InteractionType) -> f64 {
    match interaction {
        InteractionType::FlashLoan => 120.0,
        InteractionType::PriceImpact => 80.0,
        InteractionType::Governance => 40.0,
        InteractionType::Other => 10.0,
    }
}

fn edge_success_probability(interaction: InteractionType) -> f64 {
    match interaction {
        InteractionType::FlashLoan => 0.7,
        InteractionType::PriceImpact => 0.6,
        InteractionType::Governance => 0.4,
        InteractionType::Other => 0.5,
    }
}

fn edge_detection_probability(interaction: InteractionType) -> f64 {
    match interaction {
        InteractionType::FlashLoan => 0.5,
        InteractionType::PriceImpact => 0.4,
        InteractionType::Governance => 0.6,
        InteractionType::Other => 0.2,
    }
}

const HOP_DISCOUNT: f64 = 0.8;

/// Capital needed at the first hop when no flash loan is available, per hop.
const CAPITAL_PER_HOP: f64 = 1_000.0;

/// Enumerates all simple paths from the graph's start node with at most
/// `cutoff` edges and scores each one. The result is sorted descending by
/// estimated profit.
pub fn find_vectors(graph: &ProtocolGraph, cutoff: usize) -> Vec<InteractionVector> {
    let Some(start_ix) = graph.node_index(graph.start()) else {
        return Vec::new();
    };
    let mut vectors = Vec::new();
    let mut path: Vec<(NodeIndex, Option<InteractionType>)> = vec![(start_ix, None)];
    walk(graph, start_ix, cutoff, &mut path, &mut vectors);
    vectors.sort_by(|a, b| b.estimated_profit.total_cmp(&a.estimated_profit));
    debug!(
        target: "protocol_graph",
        start = ?graph.start(),
        cutoff,
        vectors = vectors.len(),
        "scored interaction vectors"
    );
    vectors
}

fn walk(
    graph: &ProtocolGraph,
    current: NodeIndex,
    remaining: usize,
    path: &mut Vec<(NodeIndex, Option<InteractionType>)>,
    out: &mut Vec<InteractionVector>,
) {
    if remaining == 0 {
        return;
    }
    for edge in graph.inner().edges_directed(current, Direction::Outgoing) {
        let next = edge.target();
        if path.iter().any(|(ix, _)| *ix == next) {
            continue;
        }
        path.push((next, Some(edge.weight().interaction_type)));
        out.push(score_path(graph, path));
        walk(graph, next, remaining - 1, path, out);
        path.pop();
    }
}

fn score_path(
    graph: &ProtocolGraph,
    path: &[(NodeIndex, Option<InteractionType>)],
) -> InteractionVector {
    let inner = graph.inner();
    let entry_points: Vec<Address> = path.iter().map(|(ix, _)| inner[*ix].address).collect();
    let hops: Vec<InteractionType> = path.iter().filter_map(|(_, it)| *it).collect();

    let mut estimated_profit = 0.0;
    let mut success_probability = 1.0;
    let mut miss_probability = 1.0;
    for (i, interaction) in hops.iter().enumerate() {
        estimated_profit += edge_profit(*interaction) * HOP_DISCOUNT.powi(i as i32);
        success_probability *= edge_success_probability(*interaction);
        miss_probability *= 1.0 - edge_detection_probability(*interaction);
    }

    let uses_flash_loan = hops.contains(&InteractionType::FlashLoan);
    let crosses_governance = hops.contains(&InteractionType::Governance);

    let mut required_assets: HashMap<Address, f64> = HashMap::new();
    if !uses_flash_loan {
        // Without a flash loan in the path, the entry protocol has to be
        // capitalized up front.
        required_assets.insert(entry_points[0], CAPITAL_PER_HOP * hops.len() as f64);
    }

    let mut risk_factors = Vec::new();
    if uses_flash_loan {
        risk_factors.push("flash_loan_dependency".to_string());
    }
    if crosses_governance {
        risk_factors.push("governance_delay".to_string());
    }
    if hops.len() >= 3 {
        risk_factors.push("deep_call_chain".to_string());
    }

    InteractionVector {
        source_protocol: entry_points[0],
        target_protocol: *entry_points.last().unwrap_or(&entry_points[0]),
        interaction_type: *hops.last().unwrap_or(&InteractionType::Other),
        vector_type: if crosses_governance {
            VectorType::MultiTx
        } else {
            VectorType::Atomic
        },
        entry_points,
        required_assets,
        estimated_profit,
        complexity: (path.len() as u8).min(10),
        success_probability,
        risk_factors,
        detection_probability: 1.0 - miss_probability,
    }
}
