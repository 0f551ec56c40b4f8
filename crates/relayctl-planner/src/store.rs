//! Chain storage trait for the planner.
//!
//! The planner only needs node lookups, a used-port query, and chain row
//! writes, so that is the whole seam. Production code implements this for
//! the hosted backend client; [`MemoryStore`] keeps everything in process
//! for tests and embedders that plan against local fixtures.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

use relayctl_store::{Chain, ChainPatch, NewChain, RelayNode};

/// Errors from the underlying row store.
#[derive(Debug, Clone, Error)]
pub enum ChainStoreError {
    #[error("row not found: {0}")]
    NotFound(String),

    #[error("backend error: {0}")]
    Backend(String),
}

/// Row access the planner runs against.
#[async_trait]
pub trait ChainStore: Send + Sync {
    /// Node lookup. `Ok(None)` when the id is unknown.
    async fn relay_node(&self, id: i64) -> Result<Option<RelayNode>, ChainStoreError>;

    /// Ports currently held by chain rows on `node_id`, across all tunnels,
    /// excluding the given row ids (so a row being rewritten does not block
    /// itself).
    async fn ports_in_use(
        &self,
        node_id: i64,
        exclude_rows: &[i64],
    ) -> Result<Vec<i64>, ChainStoreError>;

    /// All chain rows of one tunnel. No ordering guarantee.
    async fn tunnel_chains(&self, tunnel_id: i64) -> Result<Vec<Chain>, ChainStoreError>;

    /// Insert a batch of rows in one atomic write, returning them as stored.
    async fn insert_chains(&self, rows: Vec<NewChain>) -> Result<Vec<Chain>, ChainStoreError>;

    /// Patch one row by id. Fails with [`ChainStoreError::NotFound`] when
    /// the row is gone.
    async fn update_chain(&self, id: i64, patch: ChainPatch) -> Result<Chain, ChainStoreError>;

    /// Delete a batch of rows by id.
    async fn delete_chains(&self, ids: &[i64]) -> Result<(), ChainStoreError>;
}

/// In-memory [`ChainStore`].
#[derive(Default)]
pub struct MemoryStore {
    nodes: Mutex<HashMap<i64, RelayNode>>,
    chains: Mutex<Vec<Chain>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_node(&self, node: RelayNode) {
        self.nodes.lock().unwrap().insert(node.id, node);
    }

    /// Store a chain row exactly as given, id included (or absent).
    pub fn seed_chain(&self, row: Chain) {
        self.chains.lock().unwrap().push(row);
    }

    /// Snapshot of every chain row, across all tunnels.
    pub fn all_chains(&self) -> Vec<Chain> {
        self.chains.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainStore for MemoryStore {
    async fn relay_node(&self, id: i64) -> Result<Option<RelayNode>, ChainStoreError> {
        Ok(self.nodes.lock().unwrap().get(&id).cloned())
    }

    async fn ports_in_use(
        &self,
        node_id: i64,
        exclude_rows: &[i64],
    ) -> Result<Vec<i64>, ChainStoreError> {
        let chains = self.chains.lock().unwrap();
        Ok(chains
            .iter()
            .filter(|row| row.node_id == node_id)
            .filter(|row| row.id.map_or(true, |id| !exclude_rows.contains(&id)))
            .map(|row| row.port)
            .collect())
    }

    async fn tunnel_chains(&self, tunnel_id: i64) -> Result<Vec<Chain>, ChainStoreError> {
        let chains = self.chains.lock().unwrap();
        Ok(chains
            .iter()
            .filter(|row| row.tunnel_id == tunnel_id)
            .cloned()
            .collect())
    }

    async fn insert_chains(&self, rows: Vec<NewChain>) -> Result<Vec<Chain>, ChainStoreError> {
        let mut chains = self.chains.lock().unwrap();
        let mut next_id = chains.iter().filter_map(|row| row.id).max().unwrap_or(0) + 1;
        let mut created = Vec::with_capacity(rows.len());
        for row in rows {
            let stored = Chain {
                id: Some(next_id),
                created_at: None,
                updated_at: None,
                tunnel_id: row.tunnel_id,
                node_id: row.node_id,
                chain_type: row.chain_type,
                index: row.index,
                port: row.port,
                strategy: row.strategy,
                transport: row.transport,
            };
            next_id += 1;
            chains.push(stored.clone());
            created.push(stored);
        }
        Ok(created)
    }

    async fn update_chain(&self, id: i64, patch: ChainPatch) -> Result<Chain, ChainStoreError> {
        let mut chains = self.chains.lock().unwrap();
        let row = chains
            .iter_mut()
            .find(|row| row.id == Some(id))
            .ok_or_else(|| ChainStoreError::NotFound(format!("chains id {id}")))?;
        if let Some(node_id) = patch.node_id {
            row.node_id = node_id;
        }
        if let Some(index) = patch.index {
            row.index = index;
        }
        if let Some(port) = patch.port {
            row.port = port;
        }
        if let Some(strategy) = patch.strategy {
            row.strategy = strategy;
        }
        if let Some(transport) = patch.transport {
            row.transport = transport;
        }
        Ok(row.clone())
    }

    async fn delete_chains(&self, ids: &[i64]) -> Result<(), ChainStoreError> {
        let mut chains = self.chains.lock().unwrap();
        chains.retain(|row| row.id.map_or(true, |id| !ids.contains(&id)));
        Ok(())
    }
}
