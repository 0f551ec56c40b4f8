//! Integration tests for chain creation and reconciliation

use chrono::Utc;
use relayctl_planner::{ChainPlanner, HopSpec, MemoryStore, PlanError, Topology};
use relayctl_store::{Chain, ChainType, RelayNode};

/// Helper to build a relay node with the given port spec
fn node(id: i64, name: &str, ports: &str) -> RelayNode {
    RelayNode {
        id,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        name: name.to_string(),
        description: None,
        address: format!("{name}.relay.example.net:7000"),
        display_address: None,
        token: format!("{name}-token"),
        level: 1,
        is_public: true,
        version: None,
        egress_traffic: 0,
        ingress_traffic: 0,
        traffic_limit: 0,
        enlarge_scale: 1.0,
        ports: ports.to_string(),
        custom_cfg: serde_json::Value::Null,
        user_id: "operator".to_string(),
        shadow_user_id: None,
    }
}

/// Helper to build a persisted chain row
fn chain_row(
    id: i64,
    tunnel_id: i64,
    node_id: i64,
    chain_type: ChainType,
    index: i64,
    port: i64,
) -> Chain {
    Chain {
        id: Some(id),
        created_at: None,
        updated_at: None,
        tunnel_id,
        node_id,
        chain_type,
        index,
        port,
        strategy: "round".to_string(),
        transport: "raw".to_string(),
    }
}

fn rows_sorted_by_id(store: &MemoryStore) -> Vec<Chain> {
    let mut rows = store.all_chains();
    rows.sort_by_key(|row| row.id);
    rows
}

#[tokio::test]
async fn single_node_create_inserts_one_entry_row() {
    let store = MemoryStore::new();
    store.insert_node(node(1, "alpha", "1000-1005"));
    let planner = ChainPlanner::new(&store);

    let summary = planner
        .create(10, &Topology::Single { node_id: 1 })
        .await
        .unwrap();

    assert_eq!(summary.inserted, 1);
    assert_eq!(summary.updated, 0);
    assert_eq!(summary.deleted, 0);

    let rows = store.all_chains();
    assert_eq!(rows.len(), 1);
    let entry = &rows[0];
    assert_eq!(entry.chain_type, ChainType::In);
    assert_eq!(entry.node_id, 1);
    assert_eq!(entry.index, 0);
    assert_eq!(entry.port, 0);
    assert_eq!(entry.strategy, "round");
    assert_eq!(entry.transport, "raw");
}

#[tokio::test]
async fn entry_rows_never_consume_a_port() {
    // Entry rows carry port 0, so a node with no configured ranges can
    // still terminate a single-node tunnel.
    let store = MemoryStore::new();
    store.insert_node(node(1, "bare", ""));
    let planner = ChainPlanner::new(&store);

    planner
        .create(10, &Topology::Single { node_id: 1 })
        .await
        .unwrap();

    assert_eq!(store.all_chains()[0].port, 0);
}

#[tokio::test]
async fn multi_node_create_inserts_entry_hops_and_exit() {
    let store = MemoryStore::new();
    store.insert_node(node(1, "entry", "1000-1010"));
    store.insert_node(node(2, "mid", "2000-2010"));
    store.insert_node(node(3, "exit", "3000-3010"));
    let planner = ChainPlanner::new(&store);

    let topology = Topology::Multi {
        ingress_id: 1,
        hops: vec![HopSpec::new(2)
            .with_strategy("random")
            .with_transport("ws")],
        egress_id: 3,
    };
    let summary = planner.create(10, &topology).await.unwrap();
    assert_eq!(summary.inserted, 3);

    let rows = store.all_chains();
    assert_eq!(rows.len(), 3);

    let entry = rows
        .iter()
        .find(|row| row.chain_type == ChainType::In)
        .unwrap();
    assert_eq!((entry.node_id, entry.index, entry.port), (1, 0, 0));

    let hop = rows
        .iter()
        .find(|row| row.chain_type == ChainType::Chain)
        .unwrap();
    assert_eq!((hop.node_id, hop.index, hop.port), (2, 1, 2000));
    assert_eq!(hop.strategy, "random");
    assert_eq!(hop.transport, "ws");

    let exit = rows
        .iter()
        .find(|row| row.chain_type == ChainType::Out)
        .unwrap();
    assert_eq!((exit.node_id, exit.index, exit.port), (3, 0, 3000));
}

#[tokio::test]
async fn allocation_picks_the_smallest_free_port() {
    let store = MemoryStore::new();
    store.insert_node(node(1, "entry", "1000"));
    store.insert_node(node(2, "mid", "2000-2005"));
    store.insert_node(node(3, "exit", "3000"));
    // 2000 and 2001 already belong to other tunnels.
    store.seed_chain(chain_row(90, 98, 2, ChainType::Chain, 1, 2000));
    store.seed_chain(chain_row(91, 99, 2, ChainType::Out, 0, 2001));
    let planner = ChainPlanner::new(&store);

    planner
        .create(
            10,
            &Topology::Multi {
                ingress_id: 1,
                hops: vec![HopSpec::new(2)],
                egress_id: 3,
            },
        )
        .await
        .unwrap();

    let hop = store
        .all_chains()
        .into_iter()
        .find(|row| row.tunnel_id == 10 && row.chain_type == ChainType::Chain)
        .unwrap();
    assert_eq!(hop.port, 2002);
}

#[tokio::test]
async fn hops_on_the_same_node_get_distinct_ports() {
    let store = MemoryStore::new();
    store.insert_node(node(1, "entry", "1000"));
    store.insert_node(node(2, "mid", "2000-2005"));
    store.insert_node(node(3, "exit", "3000"));
    let planner = ChainPlanner::new(&store);

    planner
        .create(
            10,
            &Topology::Multi {
                ingress_id: 1,
                hops: vec![HopSpec::new(2), HopSpec::new(2)],
                egress_id: 3,
            },
        )
        .await
        .unwrap();

    let mut hop_ports: Vec<i64> = store
        .all_chains()
        .into_iter()
        .filter(|row| row.chain_type == ChainType::Chain)
        .map(|row| row.port)
        .collect();
    hop_ports.sort_unstable();
    assert_eq!(hop_ports, vec![2000, 2001]);
}

#[tokio::test]
async fn exhaustion_reports_node_name_and_range() {
    let store = MemoryStore::new();
    store.insert_node(node(1, "entry", "1000"));
    store.insert_node(node(2, "mid", "2000-2001"));
    store.insert_node(node(3, "exit", "3000"));
    store.seed_chain(chain_row(90, 99, 2, ChainType::Chain, 1, 2000));
    store.seed_chain(chain_row(91, 99, 2, ChainType::Chain, 2, 2001));
    let planner = ChainPlanner::new(&store);

    let err = planner
        .create(
            10,
            &Topology::Multi {
                ingress_id: 1,
                hops: vec![HopSpec::new(2)],
                egress_id: 3,
            },
        )
        .await
        .unwrap_err();

    match err {
        PlanError::PortsExhausted { node, range } => {
            assert_eq!(node, "mid");
            assert_eq!(range, "2000-2001");
        }
        other => panic!("expected exhaustion, got {other}"),
    }
    // Creation failed before any insert.
    assert_eq!(store.all_chains().len(), 2);
}

#[tokio::test]
async fn bad_nodes_fail_with_specific_errors() {
    let store = MemoryStore::new();
    store.insert_node(node(1, "entry", "1000"));
    store.insert_node(node(3, "exit", "3000"));
    store.insert_node(node(4, "blank", ""));
    store.insert_node(node(5, "garbled", "woof"));
    let planner = ChainPlanner::new(&store);

    let multi = |hop_node: i64| Topology::Multi {
        ingress_id: 1,
        hops: vec![HopSpec::new(hop_node)],
        egress_id: 3,
    };

    let missing = planner.create(10, &multi(42)).await.unwrap_err();
    assert!(matches!(missing, PlanError::NodeNotFound(42)));

    let blank = planner.create(11, &multi(4)).await.unwrap_err();
    assert!(matches!(blank, PlanError::NoPortsConfigured { node } if node == "blank"));

    let garbled = planner.create(12, &multi(5)).await.unwrap_err();
    assert!(matches!(garbled, PlanError::InvalidPortSpec { node, .. } if node == "garbled"));
}

#[tokio::test]
async fn unselected_hop_fails_before_later_rows_are_touched() {
    let store = MemoryStore::new();
    store.insert_node(node(1, "entry", "1000"));
    store.insert_node(node(2, "mid", "2000-2010"));
    store.insert_node(node(3, "exit", "3000-3010"));
    store.seed_chain(chain_row(1, 10, 1, ChainType::In, 0, 0));
    store.seed_chain(chain_row(2, 10, 2, ChainType::Chain, 1, 2000));
    store.seed_chain(chain_row(3, 10, 2, ChainType::Chain, 2, 2001));
    store.seed_chain(chain_row(4, 10, 3, ChainType::Out, 0, 3000));
    let planner = ChainPlanner::new(&store);

    let err = planner
        .reconcile(
            10,
            &Topology::Multi {
                ingress_id: 1,
                hops: vec![HopSpec::new(2), HopSpec::unselected()],
                egress_id: 3,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PlanError::HopNodeMissing(2)));

    // Rows past the failing position survive untouched, and the batched
    // deletes and inserts never ran.
    let rows = rows_sorted_by_id(&store);
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[2], chain_row(3, 10, 2, ChainType::Chain, 2, 2001));
    assert_eq!(rows[3], chain_row(4, 10, 3, ChainType::Out, 0, 3000));
}

#[tokio::test]
async fn shrinking_three_hops_to_one_keeps_the_survivor() {
    let store = MemoryStore::new();
    store.insert_node(node(1, "entry", "1000"));
    store.insert_node(node(2, "mid", "2000-2010"));
    store.insert_node(node(3, "exit", "3000-3010"));
    store.seed_chain(chain_row(1, 10, 1, ChainType::In, 0, 0));
    store.seed_chain(chain_row(2, 10, 2, ChainType::Chain, 1, 2000));
    store.seed_chain(chain_row(3, 10, 2, ChainType::Chain, 2, 2001));
    store.seed_chain(chain_row(4, 10, 2, ChainType::Chain, 3, 2002));
    store.seed_chain(chain_row(5, 10, 3, ChainType::Out, 0, 3000));
    let planner = ChainPlanner::new(&store);

    let summary = planner
        .reconcile(
            10,
            &Topology::Multi {
                ingress_id: 1,
                hops: vec![HopSpec::new(2)],
                egress_id: 3,
            },
        )
        .await
        .unwrap();

    assert_eq!(summary.deleted, 2);
    assert_eq!(summary.inserted, 0);
    // Entry, the surviving hop, and the exit were rewritten in place.
    assert_eq!(summary.updated, 3);

    let rows = store.all_chains();
    assert_eq!(rows.len(), 3);
    let hop = rows
        .iter()
        .find(|row| row.chain_type == ChainType::Chain)
        .unwrap();
    assert_eq!(hop.id, Some(2));
    assert_eq!(hop.index, 1);
    assert_eq!(hop.port, 2000);
    assert!(rows.iter().all(|row| row.id != Some(3) && row.id != Some(4)));
}

#[tokio::test]
async fn reconciling_an_unchanged_topology_changes_nothing() {
    let store = MemoryStore::new();
    store.insert_node(node(1, "entry", "1000-1010"));
    store.insert_node(node(2, "mid", "2000-2010"));
    store.insert_node(node(3, "exit", "3000-3010"));
    let planner = ChainPlanner::new(&store);
    let topology = Topology::Multi {
        ingress_id: 1,
        hops: vec![HopSpec::new(2)],
        egress_id: 3,
    };

    planner.create(10, &topology).await.unwrap();
    let before = rows_sorted_by_id(&store);

    // Each row is re-allocated with itself excluded, so every port is
    // reassigned to its current value.
    let summary = planner.reconcile(10, &topology).await.unwrap();
    assert_eq!(summary.inserted, 0);
    assert_eq!(summary.deleted, 0);
    assert_eq!(summary.updated, 3);
    assert_eq!(rows_sorted_by_id(&store), before);
}

#[tokio::test]
async fn converting_multi_to_single_keeps_only_the_entry_row() {
    let store = MemoryStore::new();
    store.insert_node(node(4, "solo", "4000-4010"));
    store.seed_chain(chain_row(1, 10, 1, ChainType::In, 0, 0));
    store.seed_chain(chain_row(2, 10, 2, ChainType::Chain, 1, 2000));
    store.seed_chain(chain_row(3, 10, 3, ChainType::Out, 0, 3000));
    let planner = ChainPlanner::new(&store);

    let summary = planner
        .reconcile(10, &Topology::Single { node_id: 4 })
        .await
        .unwrap();

    assert_eq!(summary.deleted, 2);
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.inserted, 0);

    let rows = store.all_chains();
    assert_eq!(rows.len(), 1);
    let entry = &rows[0];
    assert_eq!(entry.id, Some(1));
    assert_eq!(entry.chain_type, ChainType::In);
    assert_eq!(entry.node_id, 4);
    assert_eq!(entry.port, 0);
}

#[tokio::test]
async fn converting_single_to_multi_reuses_the_entry_row() {
    let store = MemoryStore::new();
    store.insert_node(node(1, "entry", "1000-1010"));
    store.insert_node(node(2, "mid", "2000-2010"));
    store.insert_node(node(3, "exit", "3000-3010"));
    store.seed_chain(chain_row(1, 10, 1, ChainType::In, 0, 0));
    let planner = ChainPlanner::new(&store);

    let summary = planner
        .reconcile(
            10,
            &Topology::Multi {
                ingress_id: 1,
                hops: vec![HopSpec::new(2)],
                egress_id: 3,
            },
        )
        .await
        .unwrap();

    assert_eq!(summary.updated, 1);
    assert_eq!(summary.inserted, 2);
    assert_eq!(summary.deleted, 0);

    let rows = rows_sorted_by_id(&store);
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].id, Some(1));
    assert_eq!(rows[0].port, 0);

    let hop = rows
        .iter()
        .find(|row| row.chain_type == ChainType::Chain)
        .unwrap();
    assert_eq!((hop.node_id, hop.index, hop.port), (2, 1, 2000));

    let exit = rows
        .iter()
        .find(|row| row.chain_type == ChainType::Out)
        .unwrap();
    assert_eq!((exit.node_id, exit.index, exit.port), (3, 0, 3000));
}

#[tokio::test]
async fn reconcile_builds_the_chain_when_no_rows_exist() {
    let store = MemoryStore::new();
    store.insert_node(node(1, "entry", "1000"));
    store.insert_node(node(2, "mid", "2000"));
    store.insert_node(node(3, "exit", "3000"));
    let planner = ChainPlanner::new(&store);

    let summary = planner
        .reconcile(
            10,
            &Topology::Multi {
                ingress_id: 1,
                hops: vec![HopSpec::new(2)],
                egress_id: 3,
            },
        )
        .await
        .unwrap();

    assert_eq!(summary.inserted, 3);
    assert_eq!(summary.updated, 0);
    assert_eq!(summary.deleted, 0);
    assert_eq!(store.all_chains().len(), 3);
}

#[tokio::test]
async fn hop_row_without_an_id_fails_with_the_hop_number() {
    let store = MemoryStore::new();
    store.insert_node(node(1, "entry", "1000"));
    store.insert_node(node(2, "mid", "2000-2010"));
    store.insert_node(node(3, "exit", "3000"));
    store.seed_chain(chain_row(1, 10, 1, ChainType::In, 0, 0));
    store.seed_chain(Chain {
        id: None,
        ..chain_row(0, 10, 2, ChainType::Chain, 1, 2000)
    });
    let planner = ChainPlanner::new(&store);

    let err = planner
        .reconcile(
            10,
            &Topology::Multi {
                ingress_id: 1,
                hops: vec![HopSpec::new(2)],
                egress_id: 3,
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, PlanError::HopRowMissingId(1)));
}
