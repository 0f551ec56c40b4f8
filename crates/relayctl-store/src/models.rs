//! Row types for the control-plane schema.
//!
//! One struct per table, matching the backend columns one to one. Insert
//! payloads (`New*`) and partial updates (`*Patch`) are separate structs so
//! a write never sends columns the backend owns (ids, timestamps, traffic
//! counters).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A deployed relay process an operator can route tunnels through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayNode {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub name: String,
    pub description: Option<String>,
    /// Address the relay binary dials, host:port.
    pub address: String,
    /// Address shown to end users instead of `address`, if set.
    pub display_address: Option<String>,
    /// Shared secret the relay process authenticates with.
    pub token: String,
    pub level: i64,
    pub is_public: bool,
    pub version: Option<String>,
    pub egress_traffic: i64,
    pub ingress_traffic: i64,
    pub traffic_limit: i64,
    pub enlarge_scale: f64,
    /// Listen ports this node may hand out, e.g. `"1000-2000,3000"`.
    pub ports: String,
    pub custom_cfg: serde_json::Value,
    pub user_id: String,
    pub shadow_user_id: Option<String>,
}

/// Insert payload for `relay_nodes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRelayNode {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<i64>,
    pub is_public: bool,
    pub ports: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_cfg: Option<serde_json::Value>,
}

/// Partial update for `relay_nodes`; only set fields are sent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ports: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traffic_limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_cfg: Option<serde_json::Value>,
}

/// A named tunnel. Its hop layout lives in `chains`, one row per hop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tunnel {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub name: String,
    pub description: Option<String>,
    /// Address end users connect to, shown verbatim in listings.
    pub ingress_display_address: Option<String>,
    pub user_id: String,
}

/// Insert payload for `tunnels`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTunnel {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingress_display_address: Option<String>,
}

/// Partial update for `tunnels`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TunnelPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingress_display_address: Option<String>,
}

/// Position of a chain row within its tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainType {
    /// Entry hop. Always index 0 and port 0.
    In,
    /// Intermediate hop, indexed 1..N in traversal order.
    Chain,
    /// Exit hop. Index 0, carries an allocated port.
    Out,
}

impl ChainType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainType::In => "in",
            ChainType::Chain => "chain",
            ChainType::Out => "out",
        }
    }
}

/// One hop of a tunnel.
///
/// `id` stays optional so rows assembled client-side (tests, embedders) are
/// representable before they exist in the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chain {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    pub tunnel_id: i64,
    pub node_id: i64,
    pub chain_type: ChainType,
    pub index: i64,
    pub port: i64,
    pub strategy: String,
    pub transport: String,
}

/// Insert payload for `chains`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewChain {
    pub tunnel_id: i64,
    pub node_id: i64,
    pub chain_type: ChainType,
    pub index: i64,
    pub port: i64,
    pub strategy: String,
    pub transport: String,
}

/// Partial update for `chains`; only set fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,
}

/// A forwarding rule: listen on a node port, forward to `targets`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayRule {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub name: String,
    pub description: Option<String>,
    pub listen_port: i64,
    pub tunnel_id: Option<i64>,
    /// Forward targets, host:port list.
    pub targets: String,
    pub limit: Option<serde_json::Value>,
    pub upload_traffic: i64,
    pub download_traffic: i64,
    pub user_id: Option<String>,
}

/// Insert payload for `relay_rules`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRelayRule {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub listen_port: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tunnel_id: Option<i64>,
    pub targets: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<serde_json::Value>,
}

/// Partial update for `relay_rules`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listen_port: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tunnel_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub targets: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<serde_json::Value>,
}

/// A tenant an operator account can act under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub name: String,
    pub code: String,
    pub owner: String,
}

/// An operator-facing announcement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Announcement {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub title: String,
    pub content: String,
}
