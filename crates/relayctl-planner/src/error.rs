//! Planner error taxonomy.

use thiserror::Error;

use crate::range::RangeError;
use crate::store::ChainStoreError;

/// Why a plan could not be built or applied.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The referenced relay node does not exist.
    #[error("relay node {0} not found")]
    NodeNotFound(i64),

    /// The node's port spec parses to an empty set.
    #[error("node {node} has no usable port configuration")]
    NoPortsConfigured { node: String },

    /// The node's port spec does not parse at all.
    #[error("node {node} has an invalid port configuration: {source}")]
    InvalidPortSpec {
        node: String,
        #[source]
        source: RangeError,
    },

    /// Every configured port on the node is taken.
    #[error("node {node} ports exhausted (range: {range})")]
    PortsExhausted { node: String, range: String },

    /// A desired hop has no node picked. 1-based hop number.
    #[error("hop {0} relay node not selected")]
    HopNodeMissing(usize),

    /// An existing hop row carries no id, so it can neither be updated nor
    /// deleted. 1-based hop number.
    #[error("hop {0} chain row missing id")]
    HopRowMissingId(usize),

    /// The underlying store rejected a read or write.
    #[error(transparent)]
    Store(#[from] ChainStoreError),
}
