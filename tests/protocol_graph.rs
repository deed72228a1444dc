mod common;

use common::{addr, MockBytecodeAnalyzer};
use defi_analyzer::bytecode::CachedBytecodeAnalyzer;
use defi_analyzer::config::GraphSettings;
use defi_analyzer::graph::{find_vectors, ProtocolGraphBuilder};
use defi_analyzer::types::{ProtocolType, VectorType};
use std::sync::Arc;

fn builder(bytecode: MockBytecodeAnalyzer) -> ProtocolGraphBuilder {
    let settings = GraphSettings::default();
    let cached = Arc::new(CachedBytecodeAnalyzer::new(Arc::new(bytecode), &settings));
    ProtocolGraphBuilder::new(cached, settings)
}

#[tokio::test]
async fn expansion_respects_the_depth_bound() {
    // a -> b -> c -> d, all protocols.
    let bytecode = MockBytecodeAnalyzer::new()
        .protocol(addr(1), ProtocolType::Dex, vec![addr(2)])
        .protocol(addr(2), ProtocolType::Lending, vec![addr(3)])
        .protocol(addr(3), ProtocolType::Dex, vec![addr(4)])
        .protocol(addr(4), ProtocolType::Governance, vec![]);

    let graph = builder(bytecode).build(addr(1), 1, 2).await.unwrap();

    assert_eq!(graph.node_count(), 3);
    assert!(graph.contains(addr(3)));
    assert!(!graph.contains(addr(4)));
    assert_eq!(graph.distance_from_start(addr(3)), Some(2));
}

#[tokio::test]
async fn non_protocol_targets_are_pruned() {
    // addr(2) is a plain contract; its own calls must never be expanded.
    let bytecode = MockBytecodeAnalyzer::new()
        .protocol(addr(1), ProtocolType::Dex, vec![addr(2), addr(3)])
        .plain_contract(addr(2), vec![addr(4)])
        .protocol(addr(3), ProtocolType::Lending, vec![])
        .protocol(addr(4), ProtocolType::Dex, vec![]);

    let graph = builder(bytecode).build(addr(1), 1, 3).await.unwrap();

    assert!(graph.contains(addr(3)));
    assert!(!graph.contains(addr(2)));
    assert!(!graph.contains(addr(4)));
    assert_eq!(graph.edge_count(), 1);
}

#[tokio::test]
async fn start_node_is_kept_even_when_unclassifiable() {
    // Nothing is known about the start address, so it classifies as a
    // non-protocol; the analyzed contract itself still anchors the graph.
    let graph = builder(MockBytecodeAnalyzer::new())
        .build(addr(7), 1, 3)
        .await
        .unwrap();

    assert_eq!(graph.node_count(), 1);
    assert!(graph.contains(addr(7)));
    assert_eq!(graph.protocol_type_of(addr(7)), Some(ProtocolType::Unknown));
}

#[tokio::test]
async fn governance_exposure_is_reported() {
    let bytecode = MockBytecodeAnalyzer::new()
        .protocol(addr(1), ProtocolType::Dex, vec![addr(2)])
        .protocol(addr(2), ProtocolType::Governance, vec![]);

    let graph = builder(bytecode).build(addr(1), 1, 3).await.unwrap();

    assert_eq!(graph.governance_nodes(), vec![addr(2)]);
}

#[tokio::test]
async fn vectors_are_scored_and_sorted_by_profit() {
    // Flash-loan branch must outscore the plain lending branch.
    let bytecode = MockBytecodeAnalyzer::new()
        .protocol(addr(1), ProtocolType::Dex, vec![addr(2), addr(3)])
        .protocol(addr(2), ProtocolType::FlashLoan, vec![])
        .protocol(addr(3), ProtocolType::Lending, vec![]);

    let graph = builder(bytecode).build(addr(1), 1, 3).await.unwrap();
    let vectors = find_vectors(&graph, 3);

    assert_eq!(vectors.len(), 2);
    assert!(vectors[0].estimated_profit >= vectors[1].estimated_profit);
    assert!(vectors[0]
        .risk_factors
        .contains(&"flash_loan_dependency".to_string()));
    // A flash-loan path needs no upfront capital.
    assert!(vectors[0].required_assets.is_empty());
    assert!(!vectors[1].required_assets.is_empty());
}

#[tokio::test]
async fn governance_hops_force_multi_transaction_vectors() {
    let bytecode = MockBytecodeAnalyzer::new()
        .protocol(addr(1), ProtocolType::Lending, vec![addr(2)])
        .protocol(addr(2), ProtocolType::Governance, vec![addr(3)])
        .protocol(addr(3), ProtocolType::Dex, vec![]);

    let graph = builder(bytecode).build(addr(1), 1, 3).await.unwrap();
    let vectors = find_vectors(&graph, 3);

    assert!(!vectors.is_empty());
    for vector in &vectors {
        assert_eq!(vector.vector_type, VectorType::MultiTx);
    }
}
