//! [`ChainStore`] against the hosted backend client.

use async_trait::async_trait;

use relayctl_store::{
    Chain, ChainPatch, Direction, NewChain, Query, RelayNode, StoreClient, StoreError,
};

use crate::store::{ChainStore, ChainStoreError};

#[async_trait]
impl ChainStore for StoreClient {
    async fn relay_node(&self, id: i64) -> Result<Option<RelayNode>, ChainStoreError> {
        self.relay_nodes().find(id).await.map_err(store_error)
    }

    async fn ports_in_use(
        &self,
        node_id: i64,
        exclude_rows: &[i64],
    ) -> Result<Vec<i64>, ChainStoreError> {
        let rows = self
            .chains()
            .list(
                Query::new()
                    .eq("node_id", node_id)
                    .not_null("port")
                    .not_in("id", exclude_rows),
            )
            .await
            .map_err(store_error)?;
        Ok(rows.into_iter().map(|row| row.port).collect())
    }

    async fn tunnel_chains(&self, tunnel_id: i64) -> Result<Vec<Chain>, ChainStoreError> {
        self.chains()
            .list(
                Query::new()
                    .eq("tunnel_id", tunnel_id)
                    .order("index", Direction::Ascending),
            )
            .await
            .map_err(store_error)
    }

    async fn insert_chains(&self, rows: Vec<NewChain>) -> Result<Vec<Chain>, ChainStoreError> {
        self.chains().insert_many(&rows).await.map_err(store_error)
    }

    async fn update_chain(&self, id: i64, patch: ChainPatch) -> Result<Chain, ChainStoreError> {
        self.chains().update(id, &patch).await.map_err(store_error)
    }

    async fn delete_chains(&self, ids: &[i64]) -> Result<(), ChainStoreError> {
        self.chains().delete_many(ids).await.map_err(store_error)
    }
}

fn store_error(error: StoreError) -> ChainStoreError {
    match error {
        StoreError::NotFound { table, id } => {
            ChainStoreError::NotFound(format!("{table} id {id}"))
        }
        other => ChainStoreError::Backend(other.to_string()),
    }
}
