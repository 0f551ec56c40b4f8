//! Tunnel chain planning.
//!
//! A tunnel is backed by chain rows: one entry row, any number of indexed
//! intermediate hops, and (for multi-node tunnels) one exit row. This crate
//! parses node port specs, finds free ports, and builds or reconciles a
//! tunnel's rows against a [`ChainStore`] (the hosted backend in
//! production, [`MemoryStore`] in tests).

pub mod alloc;
pub mod error;
pub mod planner;
pub mod range;
pub mod store;

mod backend;

pub use alloc::PortAllocator;
pub use error::PlanError;
pub use planner::{
    ChainPlanner, HopSpec, PlanSummary, Topology, DEFAULT_STRATEGY, DEFAULT_TRANSPORT,
};
pub use range::{parse_port_spec, RangeError};
pub use store::{ChainStore, ChainStoreError, MemoryStore};
