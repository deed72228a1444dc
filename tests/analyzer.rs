mod common;

use common::{addr, test_config, MockBytecodeAnalyzer, MockChainAdapter};
use defi_analyzer::analyzer::CrossProtocolAnalyzer;
use defi_analyzer::types::{LendingAccount, PoolState, ProtocolFields, ProtocolType};
use serde_json::json;
use std::sync::Arc;

fn dex_protocol_fields() -> ProtocolFields {
    let pools = vec![
        PoolState {
            address: addr(10),
            token0: addr(1),
            token1: addr(2),
            reserve0: 100.0,
            reserve1: 200.0,
        },
        PoolState {
            address: addr(11),
            token0: addr(2),
            token1: addr(1),
            reserve0: 100.0,
            reserve1: 65.0,
        },
    ];
    let mut fields = ProtocolFields::new();
    fields.insert("protocol_type".into(), json!("dex"));
    fields.insert("pools".into(), serde_json::to_value(pools).unwrap());
    fields.insert("last_update".into(), json!(1_700_000_000));
    fields
}

fn lending_protocol_fields() -> ProtocolFields {
    let accounts = vec![LendingAccount {
        address: addr(42),
        collateral_value: 1_000.0,
        debt_value: 1_000.0,
        liquidation_bonus: 0.08,
    }];
    let mut fields = ProtocolFields::new();
    fields.insert("protocol_type".into(), json!("lending"));
    fields.insert("accounts".into(), serde_json::to_value(accounts).unwrap());
    fields.insert("last_update".into(), json!(1_700_000_000));
    fields
}

#[tokio::test]
async fn full_analysis_fills_every_report_slot() {
    let start = addr(100);
    let lending = addr(200);
    let flash = addr(300);

    let adapter = Arc::new(MockChainAdapter::new());
    adapter
        .states
        .lock()
        .unwrap()
        .insert(start, dex_protocol_fields());
    adapter
        .states
        .lock()
        .unwrap()
        .insert(lending, lending_protocol_fields());

    let bytecode = MockBytecodeAnalyzer::new()
        .protocol(start, ProtocolType::Dex, vec![lending, flash])
        .protocol(lending, ProtocolType::Lending, vec![])
        .protocol(flash, ProtocolType::FlashLoan, vec![]);

    let analyzer =
        CrossProtocolAnalyzer::new(adapter, Arc::new(bytecode), test_config());

    // Seed the cache with protocol state the engine can act on.
    analyzer
        .cache()
        .track_protocols(1, &[start, lending])
        .await
        .unwrap();

    let report = analyzer.analyze(start, 1).await;

    assert_eq!(report.address, start);
    assert_eq!(report.chain_id, 1);
    assert!(report.errors.is_empty(), "unexpected errors: {:?}", report.errors);
    assert_eq!(report.graph.nodes.len(), 3);
    assert!(!report.interaction_vectors.is_empty());
    // The seeded lending account is underwater, so at least the liquidation
    // detector fires.
    assert!(!report.opportunities.is_empty());
    assert!(report.risk.risk_score > 0.0);
    assert!(report.risk.risk_score <= 1.0);
}

#[tokio::test]
async fn governance_exposure_is_surfaced_in_the_report() {
    let start = addr(100);
    let governor = addr(400);

    let adapter = Arc::new(MockChainAdapter::new());
    let bytecode = MockBytecodeAnalyzer::new()
        .protocol(start, ProtocolType::Dex, vec![governor])
        .protocol(governor, ProtocolType::Governance, vec![]);

    let analyzer =
        CrossProtocolAnalyzer::new(adapter, Arc::new(bytecode), test_config());
    let report = analyzer.analyze(start, 1).await;

    assert_eq!(report.governance_exposure.count, 1);
    assert_eq!(report.governance_exposure.addresses, vec![governor]);
    assert!(report
        .risk
        .risk_factors
        .contains(&"governance_exposure".to_string()));
}

#[tokio::test]
async fn unsupported_chain_degrades_to_a_maximal_risk_report() {
    let adapter = Arc::new(MockChainAdapter::new());
    let bytecode = MockBytecodeAnalyzer::new().protocol(addr(100), ProtocolType::Dex, vec![]);

    let analyzer =
        CrossProtocolAnalyzer::new(adapter, Arc::new(bytecode), test_config());
    let report = analyzer.analyze(addr(100), 99).await;

    assert!(!report.errors.is_empty());
    assert!(report.opportunities.is_empty());
    assert_eq!(report.risk.risk_score, 1.0);
    assert!(report
        .risk
        .risk_factors
        .contains(&"state_unavailable".to_string()));
    // The graph does not depend on chain state and is still produced.
    assert_eq!(report.graph.nodes.len(), 1);
}
