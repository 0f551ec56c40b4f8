//! Typed client for the hosted relay control-plane backend.
//!
//! The backend is an off-the-shelf hosted platform exposing every table
//! through a REST dialect (`/rest/v1/{table}`) and sessions through a token
//! endpoint (`/auth/v1`). This crate wraps both behind typed row structs, a
//! small query builder, and a watch-based session state that the rest of the
//! workspace can subscribe to.

pub mod client;
pub mod error;
pub mod models;
pub mod query;
pub mod session;
pub mod table;

pub use client::StoreClient;
pub use error::StoreError;
pub use models::{
    Announcement, Chain, ChainPatch, ChainType, NewChain, NewRelayNode, NewRelayRule, NewTunnel,
    NodePatch, RelayNode, RelayRule, RulePatch, Tenant, Tunnel, TunnelPatch,
};
pub use query::{Direction, Query};
pub use session::{AuthApi, AuthEvent, AuthState, AuthUser, Session, SessionEvents};
pub use table::{Page, PageRequest, TableClient};
