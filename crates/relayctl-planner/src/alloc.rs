//! Port allocation against a node's configured ranges.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::PlanError;
use crate::range::parse_port_spec;
use crate::store::ChainStore;

/// Hands out free ports for the duration of one plan.
///
/// Each call checks the node's configured ranges against the ports already
/// held in the store, minus the caller's excluded row ids, plus everything
/// this allocator has handed out earlier in the same plan: two hops placed
/// on one node within a plan must not collide before the rows are written.
///
/// The check and the eventual write are separate requests; a concurrent
/// allocation can race this one. The store's uniqueness constraint is the
/// backstop.
pub struct PortAllocator<'a, S: ChainStore + ?Sized> {
    store: &'a S,
    claimed: HashMap<i64, HashSet<u16>>,
}

impl<'a, S: ChainStore + ?Sized> PortAllocator<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            claimed: HashMap::new(),
        }
    }

    /// Smallest configured port on `node_id` that is neither stored as in
    /// use (ignoring `exclude_rows`) nor already claimed by this plan.
    pub async fn next_free(
        &mut self,
        node_id: i64,
        exclude_rows: &[i64],
    ) -> Result<u16, PlanError> {
        let node = self
            .store
            .relay_node(node_id)
            .await?
            .ok_or(PlanError::NodeNotFound(node_id))?;

        let configured = parse_port_spec(&node.ports).map_err(|source| {
            PlanError::InvalidPortSpec {
                node: node.name.clone(),
                source,
            }
        })?;
        if configured.is_empty() {
            return Err(PlanError::NoPortsConfigured { node: node.name });
        }

        let in_use: HashSet<i64> = self
            .store
            .ports_in_use(node_id, exclude_rows)
            .await?
            .into_iter()
            .collect();
        let claimed = self.claimed.entry(node_id).or_default();

        // `configured` is sorted, so the first hit is the smallest free port.
        let free = configured
            .into_iter()
            .find(|port| !in_use.contains(&i64::from(*port)) && !claimed.contains(port));

        match free {
            Some(port) => {
                claimed.insert(port);
                debug!(node = %node.name, port, "allocated port");
                Ok(port)
            }
            None => Err(PlanError::PortsExhausted {
                node: node.name,
                range: node.ports,
            }),
        }
    }
}
