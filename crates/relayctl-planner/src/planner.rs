//! Building and reconciling the chain rows behind a tunnel.

use tracing::info;

use relayctl_store::{Chain, ChainPatch, ChainType, NewChain};

use crate::alloc::PortAllocator;
use crate::error::PlanError;
use crate::store::ChainStore;

/// Strategy written to entry and exit rows.
pub const DEFAULT_STRATEGY: &str = "round";
/// Transport written to entry and exit rows.
pub const DEFAULT_TRANSPORT: &str = "raw";

/// One intermediate hop of a desired topology.
#[derive(Debug, Clone)]
pub struct HopSpec {
    /// Node the hop runs on. `None` means the operator has not picked one
    /// yet, which fails the plan naming the 1-based hop number.
    pub node_id: Option<i64>,
    pub strategy: String,
    pub transport: String,
}

impl HopSpec {
    pub fn new(node_id: i64) -> Self {
        Self {
            node_id: Some(node_id),
            strategy: DEFAULT_STRATEGY.to_string(),
            transport: DEFAULT_TRANSPORT.to_string(),
        }
    }

    /// A hop with no node picked yet.
    pub fn unselected() -> Self {
        Self {
            node_id: None,
            strategy: DEFAULT_STRATEGY.to_string(),
            transport: DEFAULT_TRANSPORT.to_string(),
        }
    }

    pub fn with_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = strategy.into();
        self
    }

    pub fn with_transport(mut self, transport: impl Into<String>) -> Self {
        self.transport = transport.into();
        self
    }
}

/// Desired hop layout for a tunnel.
#[derive(Debug, Clone)]
pub enum Topology {
    /// One node terminates the tunnel: a single entry row, no exit row.
    Single { node_id: i64 },
    /// Entry node, intermediate hops in traversal order, exit node.
    Multi {
        ingress_id: i64,
        hops: Vec<HopSpec>,
        egress_id: i64,
    },
}

/// What a plan changed, for logs and command output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
}

/// Builds and edits the chain rows backing a tunnel.
///
/// Write ordering: row updates are applied one by one as the walk
/// proceeds; deletions and insertions are collected and flushed as one
/// batch each at the very end, after every port allocation has succeeded.
/// Updates already applied when a later step fails stay applied; there is
/// no rollback, the store is the final arbiter.
pub struct ChainPlanner<'a, S: ChainStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: ChainStore + ?Sized> ChainPlanner<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Create the chain rows for a tunnel that has none yet.
    ///
    /// Entry rows always carry port 0 (the entry side listens on the
    /// node's public address, not on an allocated relay port), so a
    /// single-node tunnel performs no allocation at all. Multi-node
    /// tunnels allocate one port per intermediate hop and one for the
    /// exit, then insert every row in a single batch.
    pub async fn create(
        &self,
        tunnel_id: i64,
        topology: &Topology,
    ) -> Result<PlanSummary, PlanError> {
        let rows = match topology {
            Topology::Single { node_id } => vec![entry_row(tunnel_id, *node_id)],
            Topology::Multi {
                ingress_id,
                hops,
                egress_id,
            } => {
                let mut alloc = PortAllocator::new(self.store);
                let mut rows = Vec::with_capacity(hops.len() + 2);
                rows.push(entry_row(tunnel_id, *ingress_id));
                for (position, hop) in hops.iter().enumerate() {
                    let node_id = hop
                        .node_id
                        .ok_or(PlanError::HopNodeMissing(position + 1))?;
                    let port = alloc.next_free(node_id, &[]).await?;
                    rows.push(NewChain {
                        tunnel_id,
                        node_id,
                        chain_type: ChainType::Chain,
                        index: (position + 1) as i64,
                        port: i64::from(port),
                        strategy: hop.strategy.clone(),
                        transport: hop.transport.clone(),
                    });
                }
                let port = alloc.next_free(*egress_id, &[]).await?;
                rows.push(exit_row(tunnel_id, *egress_id, port));
                rows
            }
        };

        let inserted = self.store.insert_chains(rows).await?.len();
        info!(tunnel_id, inserted, "created tunnel chain rows");
        Ok(PlanSummary {
            inserted,
            ..Default::default()
        })
    }

    /// Rework a tunnel's existing rows to match `topology`, preserving row
    /// identity wherever a hop position survives.
    pub async fn reconcile(
        &self,
        tunnel_id: i64,
        topology: &Topology,
    ) -> Result<PlanSummary, PlanError> {
        let existing = self.store.tunnel_chains(tunnel_id).await?;
        let summary = match topology {
            Topology::Single { node_id } => {
                self.reconcile_single(tunnel_id, *node_id, &existing).await?
            }
            Topology::Multi {
                ingress_id,
                hops,
                egress_id,
            } => {
                self.reconcile_multi(tunnel_id, *ingress_id, hops, *egress_id, &existing)
                    .await?
            }
        };
        info!(
            tunnel_id,
            inserted = summary.inserted,
            updated = summary.updated,
            deleted = summary.deleted,
            "reconciled tunnel chain rows"
        );
        Ok(summary)
    }

    async fn reconcile_single(
        &self,
        tunnel_id: i64,
        node_id: i64,
        existing: &[Chain],
    ) -> Result<PlanSummary, PlanError> {
        let mut summary = PlanSummary::default();

        // Exit and intermediate rows have no place in a single-node tunnel.
        let stale: Vec<i64> = existing
            .iter()
            .filter(|row| row.chain_type != ChainType::In)
            .filter_map(|row| row.id)
            .collect();
        if !stale.is_empty() {
            self.store.delete_chains(&stale).await?;
            summary.deleted = stale.len();
        }

        let entry_id = existing
            .iter()
            .find(|row| row.chain_type == ChainType::In)
            .and_then(|row| row.id);
        match entry_id {
            Some(id) => {
                self.store
                    .update_chain(
                        id,
                        ChainPatch {
                            node_id: Some(node_id),
                            port: Some(0),
                            ..Default::default()
                        },
                    )
                    .await?;
                summary.updated = 1;
            }
            None => {
                summary.inserted = self
                    .store
                    .insert_chains(vec![entry_row(tunnel_id, node_id)])
                    .await?
                    .len();
            }
        }
        Ok(summary)
    }

    async fn reconcile_multi(
        &self,
        tunnel_id: i64,
        ingress_id: i64,
        hops: &[HopSpec],
        egress_id: i64,
        existing: &[Chain],
    ) -> Result<PlanSummary, PlanError> {
        let mut alloc = PortAllocator::new(self.store);
        let mut summary = PlanSummary::default();
        let mut to_delete: Vec<i64> = Vec::new();
        let mut to_insert: Vec<NewChain> = Vec::new();

        let entry_id = existing
            .iter()
            .find(|row| row.chain_type == ChainType::In)
            .and_then(|row| row.id);
        let exit_id = existing
            .iter()
            .find(|row| row.chain_type == ChainType::Out)
            .and_then(|row| row.id);
        let mut existing_hops: Vec<&Chain> = existing
            .iter()
            .filter(|row| row.chain_type == ChainType::Chain)
            .collect();
        existing_hops.sort_by_key(|row| row.index);

        // Entry row keeps its identity; only the node can change, and the
        // port is forced back to 0.
        match entry_id {
            Some(id) => {
                self.store
                    .update_chain(
                        id,
                        ChainPatch {
                            node_id: Some(ingress_id),
                            port: Some(0),
                            ..Default::default()
                        },
                    )
                    .await?;
                summary.updated += 1;
            }
            None => to_insert.push(entry_row(tunnel_id, ingress_id)),
        }

        // Walk hop positions. Overlap rewrites the row in place, surplus on
        // either side becomes an insert or a delete.
        for position in 0..hops.len().max(existing_hops.len()) {
            let hop_no = position + 1;
            match (hops.get(position), existing_hops.get(position)) {
                (Some(hop), Some(row)) => {
                    let node_id = hop.node_id.ok_or(PlanError::HopNodeMissing(hop_no))?;
                    let row_id = row.id.ok_or(PlanError::HopRowMissingId(hop_no))?;
                    let port = alloc.next_free(node_id, &[row_id]).await?;
                    self.store
                        .update_chain(
                            row_id,
                            ChainPatch {
                                node_id: Some(node_id),
                                index: Some(hop_no as i64),
                                port: Some(i64::from(port)),
                                strategy: Some(hop.strategy.clone()),
                                transport: Some(hop.transport.clone()),
                            },
                        )
                        .await?;
                    summary.updated += 1;
                }
                (Some(hop), None) => {
                    let node_id = hop.node_id.ok_or(PlanError::HopNodeMissing(hop_no))?;
                    let port = alloc.next_free(node_id, &[]).await?;
                    to_insert.push(NewChain {
                        tunnel_id,
                        node_id,
                        chain_type: ChainType::Chain,
                        index: hop_no as i64,
                        port: i64::from(port),
                        strategy: hop.strategy.clone(),
                        transport: hop.transport.clone(),
                    });
                }
                (None, Some(row)) => {
                    if let Some(id) = row.id {
                        to_delete.push(id);
                    }
                }
                (None, None) => break,
            }
        }

        // Exit row: keep identity, re-allocate with itself excluded so its
        // current port stays eligible.
        match exit_id {
            Some(id) => {
                let port = alloc.next_free(egress_id, &[id]).await?;
                self.store
                    .update_chain(
                        id,
                        ChainPatch {
                            node_id: Some(egress_id),
                            port: Some(i64::from(port)),
                            ..Default::default()
                        },
                    )
                    .await?;
                summary.updated += 1;
            }
            None => {
                let port = alloc.next_free(egress_id, &[]).await?;
                to_insert.push(exit_row(tunnel_id, egress_id, port));
            }
        }

        if !to_delete.is_empty() {
            self.store.delete_chains(&to_delete).await?;
            summary.deleted = to_delete.len();
        }
        if !to_insert.is_empty() {
            summary.inserted = self.store.insert_chains(to_insert).await?.len();
        }
        Ok(summary)
    }
}

fn entry_row(tunnel_id: i64, node_id: i64) -> NewChain {
    NewChain {
        tunnel_id,
        node_id,
        chain_type: ChainType::In,
        index: 0,
        port: 0,
        strategy: DEFAULT_STRATEGY.to_string(),
        transport: DEFAULT_TRANSPORT.to_string(),
    }
}

fn exit_row(tunnel_id: i64, node_id: i64, port: u16) -> NewChain {
    NewChain {
        tunnel_id,
        node_id,
        chain_type: ChainType::Out,
        index: 0,
        port: i64::from(port),
        strategy: DEFAULT_STRATEGY.to_string(),
        transport: DEFAULT_TRANSPORT.to_string(),
    }
}
