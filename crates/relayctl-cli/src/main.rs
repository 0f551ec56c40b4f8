//! Relay control CLI - manage relay nodes, tunnels, and forwarding rules

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use relayctl_planner::{parse_port_spec, ChainPlanner, HopSpec, PortAllocator, Topology};
use relayctl_store::{
    Direction, NewRelayNode, NewRelayRule, NewTunnel, NodePatch, PageRequest, Query, RulePatch,
    StoreClient, TunnelPatch,
};

use relayctl_cli::config::ConfigManager;
use relayctl_cli::guard;

/// Relay control CLI - Operate a hosted relay network
#[derive(Parser, Debug)]
#[command(name = "relayctl")]
#[command(about = "Manage relay nodes, tunnels, and forwarding rules", long_about = None)]
#[command(version = env!("GIT_TAG"))]
#[command(long_version = concat!(env!("GIT_TAG"), "\nCommit: ", env!("GIT_HASH"), "\nBuilt: ", env!("BUILD_TIME")))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Backend URL (scheme + host)
    #[arg(long, env = "RELAYCTL_URL", global = true)]
    url: Option<String>,

    /// Project API key
    #[arg(long, env = "RELAYCTL_API_KEY", global = true)]
    api_key: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sign in and persist the session
    Login {
        /// Operator email
        email: String,
        /// Password
        #[arg(long, env = "RELAYCTL_PASSWORD")]
        password: String,
    },
    /// Sign out and discard the persisted session
    Logout,
    /// Show the signed-in operator
    Whoami,
    /// Show version and build information
    Version,
    /// Manage relay nodes
    Node {
        #[command(subcommand)]
        command: NodeCommands,
    },
    /// Manage tunnels and their hop chains
    Tunnel {
        #[command(subcommand)]
        command: TunnelCommands,
    },
    /// Manage forwarding rules
    Rule {
        #[command(subcommand)]
        command: RuleCommands,
    },
    /// Select the tenant to act under
    Tenant {
        #[command(subcommand)]
        command: TenantCommands,
    },
    /// Operator announcements
    Announcement {
        #[command(subcommand)]
        command: AnnouncementCommands,
    },
    /// Find the next free relay port on a node
    PortCheck {
        /// Relay node id
        node_id: i64,
    },
}

#[derive(Subcommand, Debug)]
enum NodeCommands {
    /// Register a relay node
    Create {
        /// Node name
        name: String,
        /// Address the relay binary dials (host:port)
        #[arg(long)]
        address: String,
        /// Usable relay ports, e.g. "2000-2500" or "2000,2010-2020"
        #[arg(long)]
        ports: String,
        #[arg(long)]
        description: Option<String>,
        /// Address shown to end users instead of the dial address
        #[arg(long)]
        display_address: Option<String>,
        /// Token the relay binary authenticates with
        #[arg(long)]
        token: Option<String>,
        /// Node tier
        #[arg(long)]
        level: Option<i64>,
        /// Make the node visible to every tenant
        #[arg(long)]
        public: bool,
    },
    /// List relay nodes
    List {
        #[arg(long, default_value = "1")]
        page: u64,
        #[arg(long, default_value = "20")]
        page_size: u64,
    },
    /// Show one node as JSON
    Show {
        /// Node id
        id: i64,
    },
    /// Update fields of a node
    Update {
        /// Node id
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        display_address: Option<String>,
        #[arg(long)]
        token: Option<String>,
        #[arg(long)]
        level: Option<i64>,
        /// Usable relay ports, e.g. "2000-2500"
        #[arg(long)]
        ports: Option<String>,
        /// Traffic limit in bytes
        #[arg(long)]
        traffic_limit: Option<i64>,
        /// Tenant visibility (true or false)
        #[arg(long)]
        public: Option<bool>,
    },
    /// Delete a node
    Delete {
        /// Node id
        id: i64,
    },
}

#[derive(Subcommand, Debug)]
enum TunnelCommands {
    /// Create a tunnel and plan its hop chain
    Create {
        /// Tunnel name
        name: String,
        #[arg(long)]
        description: Option<String>,
        /// Address shown to end users
        #[arg(long)]
        display_address: Option<String>,
        /// Entry node id
        #[arg(long)]
        ingress: i64,
        /// Intermediate hop node id, repeatable, in traversal order
        #[arg(long = "hop")]
        hops: Vec<i64>,
        /// Exit node id (omit for a single-node tunnel)
        #[arg(long)]
        egress: Option<i64>,
        /// Balancing strategy for relayed hops
        #[arg(long, default_value = "round")]
        strategy: String,
        /// Transport between hops
        #[arg(long, default_value = "raw")]
        transport: String,
    },
    /// List tunnels
    List {
        #[arg(long, default_value = "1")]
        page: u64,
        #[arg(long, default_value = "20")]
        page_size: u64,
    },
    /// Show a tunnel and its chain rows
    Show {
        /// Tunnel id
        id: i64,
    },
    /// Update tunnel metadata
    Update {
        /// Tunnel id
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Address shown to end users
        #[arg(long)]
        display_address: Option<String>,
    },
    /// Replace the hop chain of an existing tunnel
    SetChain {
        /// Tunnel id
        id: i64,
        /// Entry node id
        #[arg(long)]
        ingress: i64,
        /// Intermediate hop node id, repeatable, in traversal order
        #[arg(long = "hop")]
        hops: Vec<i64>,
        /// Exit node id (omit for a single-node tunnel)
        #[arg(long)]
        egress: Option<i64>,
        /// Balancing strategy for relayed hops
        #[arg(long, default_value = "round")]
        strategy: String,
        /// Transport between hops
        #[arg(long, default_value = "raw")]
        transport: String,
    },
    /// Delete a tunnel and its chain rows
    Delete {
        /// Tunnel id
        id: i64,
    },
}

#[derive(Subcommand, Debug)]
enum RuleCommands {
    /// Create a forwarding rule
    Create {
        /// Rule name
        name: String,
        /// Port the node listens on
        #[arg(long)]
        listen_port: i64,
        /// Forward targets (host:port list)
        #[arg(long)]
        targets: String,
        /// Tunnel backing this rule
        #[arg(long)]
        tunnel: Option<i64>,
        #[arg(long)]
        description: Option<String>,
        /// Rate/traffic limit as JSON
        #[arg(long)]
        limit: Option<String>,
    },
    /// List forwarding rules
    List {
        #[arg(long, default_value = "1")]
        page: u64,
        #[arg(long, default_value = "20")]
        page_size: u64,
    },
    /// Show one rule as JSON
    Show {
        /// Rule id
        id: i64,
    },
    /// Update fields of a rule
    Update {
        /// Rule id
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        listen_port: Option<i64>,
        #[arg(long)]
        targets: Option<String>,
        /// Tunnel backing this rule
        #[arg(long)]
        tunnel: Option<i64>,
        /// Rate/traffic limit as JSON
        #[arg(long)]
        limit: Option<String>,
    },
    /// Delete a rule
    Delete {
        /// Rule id
        id: i64,
    },
}

#[derive(Subcommand, Debug)]
enum TenantCommands {
    /// List tenants visible to the operator
    List,
    /// Persist the tenant to act under
    Switch {
        /// Tenant id
        id: i64,
    },
    /// Show the selected tenant
    Current,
}

#[derive(Subcommand, Debug)]
enum AnnouncementCommands {
    /// List operator announcements, newest first
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    let config = ConfigManager::new()?;

    match cli.command {
        Commands::Login { email, password } => {
            handle_login(&config, cli.url, cli.api_key, email, password).await
        }
        Commands::Version => handle_version(),
        Commands::Logout => {
            let client = protected_client(&config, cli.url, cli.api_key).await?;
            handle_logout(&client, &config).await
        }
        Commands::Whoami => {
            let client = protected_client(&config, cli.url, cli.api_key).await?;
            handle_whoami(&client).await
        }
        Commands::Node { command } => {
            let client = protected_client(&config, cli.url, cli.api_key).await?;
            handle_node_command(&client, command).await
        }
        Commands::Tunnel { command } => {
            let client = protected_client(&config, cli.url, cli.api_key).await?;
            handle_tunnel_command(&client, command).await
        }
        Commands::Rule { command } => {
            let client = protected_client(&config, cli.url, cli.api_key).await?;
            handle_rule_command(&client, command).await
        }
        Commands::Tenant { command } => {
            let client = protected_client(&config, cli.url, cli.api_key).await?;
            handle_tenant_command(&client, &config, command).await
        }
        Commands::Announcement { command } => {
            let client = protected_client(&config, cli.url, cli.api_key).await?;
            handle_announcement_command(&client, command).await
        }
        Commands::PortCheck { node_id } => {
            let client = protected_client(&config, cli.url, cli.api_key).await?;
            handle_port_check(&client, node_id).await
        }
    }
}

/// Build a client from flags or the stored config and require a live session.
async fn protected_client(
    config: &ConfigManager,
    url: Option<String>,
    api_key: Option<String>,
) -> Result<StoreClient> {
    let stored = config.load()?;

    let url = url
        .or(stored.backend_url)
        .context("No backend URL configured. Pass --url or run 'relayctl login'")?;
    let api_key = api_key
        .or(stored.api_key)
        .context("No API key configured. Pass --api-key or run 'relayctl login'")?;

    let client = StoreClient::new(&url, api_key)?;
    guard::require_session(&client, config).await?;
    Ok(client)
}

async fn handle_login(
    config: &ConfigManager,
    url: Option<String>,
    api_key: Option<String>,
    email: String,
    password: String,
) -> Result<()> {
    let mut stored = config.load()?;

    let url = url
        .or_else(|| stored.backend_url.clone())
        .context("No backend URL configured. Pass --url or set RELAYCTL_URL")?;
    let api_key = api_key
        .or_else(|| stored.api_key.clone())
        .context("No API key configured. Pass --api-key or set RELAYCTL_API_KEY")?;

    let client = StoreClient::new(&url, api_key.clone())?;
    let session = client
        .auth()
        .sign_in(&email, &password)
        .await
        .context("Sign-in failed")?;

    stored.backend_url = Some(url);
    stored.api_key = Some(api_key);
    stored.session = Some(session.clone());
    config.save(&stored)?;

    let who = session.user.email.as_deref().unwrap_or(&session.user.id);
    println!("✅ Signed in as {}", who);
    println!("   Session stored in: {}", config.path().display());
    Ok(())
}

async fn handle_logout(client: &StoreClient, config: &ConfigManager) -> Result<()> {
    client.auth().sign_out().await?;
    config.store_session(None)?;
    println!("✅ Signed out");
    Ok(())
}

async fn handle_whoami(client: &StoreClient) -> Result<()> {
    let user = client.auth().user().await?;
    match &user.email {
        Some(email) => println!("{} ({})", email, user.id),
        None => println!("{}", user.id),
    }
    Ok(())
}

fn handle_version() -> Result<()> {
    println!("relayctl {}", env!("GIT_TAG"));
    println!("Commit: {}", env!("GIT_HASH"));
    println!("Built: {}", env!("BUILD_TIME"));
    Ok(())
}

async fn handle_node_command(client: &StoreClient, command: NodeCommands) -> Result<()> {
    match command {
        NodeCommands::Create {
            name,
            address,
            ports,
            description,
            display_address,
            token,
            level,
            public,
        } => {
            let parsed = parse_port_spec(&ports).context("Invalid --ports value")?;
            if parsed.is_empty() {
                bail!("--ports must name at least one port");
            }

            let node = client
                .relay_nodes()
                .insert(&NewRelayNode {
                    name,
                    description,
                    address,
                    display_address,
                    token,
                    level,
                    is_public: public,
                    ports,
                    custom_cfg: None,
                })
                .await?;

            println!("✅ Node '{}' created (id {})", node.name, node.id);
            println!("   Address: {}", node.address);
            println!("   Ports: {}", node.ports);
            Ok(())
        }
        NodeCommands::List { page, page_size } => {
            let result = client
                .relay_nodes()
                .page(&PageRequest::new(page, page_size).with_sort("name", Direction::Ascending))
                .await?;

            if result.rows.is_empty() {
                println!("No relay nodes");
                return Ok(());
            }

            println!("Relay nodes ({} of {})", result.rows.len(), result.total);
            println!();
            for node in result.rows {
                let visibility = if node.is_public { "public" } else { "private" };
                println!("  {} {} ({})", node.id, node.name, visibility);
                println!("    Address: {}", node.address);
                println!("    Ports: {}", node.ports);
            }
            Ok(())
        }
        NodeCommands::Show { id } => {
            let node = client.relay_nodes().get(id).await?;
            println!("{}", serde_json::to_string_pretty(&node)?);
            Ok(())
        }
        NodeCommands::Update {
            id,
            name,
            description,
            address,
            display_address,
            token,
            level,
            ports,
            traffic_limit,
            public,
        } => {
            if let Some(spec) = &ports {
                let parsed = parse_port_spec(spec).context("Invalid --ports value")?;
                if parsed.is_empty() {
                    bail!("--ports must name at least one port");
                }
            }

            let node = client
                .relay_nodes()
                .update(
                    id,
                    &NodePatch {
                        name,
                        description,
                        address,
                        display_address,
                        token,
                        level,
                        is_public: public,
                        ports,
                        traffic_limit,
                        custom_cfg: None,
                    },
                )
                .await?;

            println!("✅ Node '{}' updated", node.name);
            Ok(())
        }
        NodeCommands::Delete { id } => {
            client.relay_nodes().delete(id).await?;
            println!("✅ Node {} deleted", id);
            Ok(())
        }
    }
}

async fn handle_tunnel_command(client: &StoreClient, command: TunnelCommands) -> Result<()> {
    match command {
        TunnelCommands::Create {
            name,
            description,
            display_address,
            ingress,
            hops,
            egress,
            strategy,
            transport,
        } => {
            let topology = build_topology(ingress, &hops, egress, &strategy, &transport)?;

            let tunnel = client
                .tunnels()
                .insert(&NewTunnel {
                    name,
                    description,
                    ingress_display_address: display_address,
                })
                .await?;

            let summary = ChainPlanner::new(client)
                .create(tunnel.id, &topology)
                .await
                .context("Tunnel created but chain planning failed")?;

            println!("✅ Tunnel '{}' created (id {})", tunnel.name, tunnel.id);
            println!("   Chain rows inserted: {}", summary.inserted);
            Ok(())
        }
        TunnelCommands::List { page, page_size } => {
            let result = client
                .tunnels()
                .page(&PageRequest::new(page, page_size).with_sort("name", Direction::Ascending))
                .await?;

            if result.rows.is_empty() {
                println!("No tunnels");
                return Ok(());
            }

            println!("Tunnels ({} of {})", result.rows.len(), result.total);
            println!();
            for tunnel in result.rows {
                println!("  {} {}", tunnel.id, tunnel.name);
                if let Some(address) = &tunnel.ingress_display_address {
                    println!("    Ingress: {}", address);
                }
            }
            Ok(())
        }
        TunnelCommands::Show { id } => {
            let tunnel = client.tunnels().get(id).await?;
            let rows = client
                .chains()
                .list(
                    Query::new()
                        .eq("tunnel_id", id)
                        .order("index", Direction::Ascending),
                )
                .await?;

            println!("{}", serde_json::to_string_pretty(&tunnel)?);
            println!();
            println!("Chain ({} rows)", rows.len());
            for row in rows {
                println!(
                    "  [{}] {} node {} port {}",
                    row.index,
                    row.chain_type.as_str(),
                    row.node_id,
                    row.port
                );
            }
            Ok(())
        }
        TunnelCommands::Update {
            id,
            name,
            description,
            display_address,
        } => {
            let tunnel = client
                .tunnels()
                .update(
                    id,
                    &TunnelPatch {
                        name,
                        description,
                        ingress_display_address: display_address,
                    },
                )
                .await?;

            println!("✅ Tunnel '{}' updated", tunnel.name);
            Ok(())
        }
        TunnelCommands::SetChain {
            id,
            ingress,
            hops,
            egress,
            strategy,
            transport,
        } => {
            let topology = build_topology(ingress, &hops, egress, &strategy, &transport)?;

            // Unknown tunnels fail here, before any chain writes.
            client.tunnels().get(id).await?;

            let summary = ChainPlanner::new(client).reconcile(id, &topology).await?;

            println!("✅ Tunnel {} chain updated", id);
            println!(
                "   {} inserted, {} updated, {} deleted",
                summary.inserted, summary.updated, summary.deleted
            );
            Ok(())
        }
        TunnelCommands::Delete { id } => {
            let rows = client
                .chains()
                .list(Query::new().eq("tunnel_id", id))
                .await?;
            let row_ids: Vec<i64> = rows.iter().filter_map(|row| row.id).collect();

            client.chains().delete_many(&row_ids).await?;
            client.tunnels().delete(id).await?;

            println!("✅ Tunnel {} deleted ({} chain rows removed)", id, row_ids.len());
            Ok(())
        }
    }
}

/// Turn the ingress/hop/egress flags into a chain topology.
fn build_topology(
    ingress: i64,
    hops: &[i64],
    egress: Option<i64>,
    strategy: &str,
    transport: &str,
) -> Result<Topology> {
    match egress {
        None if hops.is_empty() => Ok(Topology::Single { node_id: ingress }),
        None => bail!("Intermediate hops require --egress"),
        Some(egress_id) => Ok(Topology::Multi {
            ingress_id: ingress,
            hops: hops
                .iter()
                .map(|&node_id| {
                    HopSpec::new(node_id)
                        .with_strategy(strategy)
                        .with_transport(transport)
                })
                .collect(),
            egress_id,
        }),
    }
}

async fn handle_rule_command(client: &StoreClient, command: RuleCommands) -> Result<()> {
    match command {
        RuleCommands::Create {
            name,
            listen_port,
            targets,
            tunnel,
            description,
            limit,
        } => {
            let limit = parse_limit(limit)?;

            let rule = client
                .relay_rules()
                .insert(&NewRelayRule {
                    name,
                    description,
                    listen_port,
                    tunnel_id: tunnel,
                    targets,
                    limit,
                })
                .await?;

            println!("✅ Rule '{}' created (id {})", rule.name, rule.id);
            println!("   Listen port: {}", rule.listen_port);
            println!("   Targets: {}", rule.targets);
            Ok(())
        }
        RuleCommands::List { page, page_size } => {
            let result = client
                .relay_rules()
                .page(&PageRequest::new(page, page_size).with_sort("name", Direction::Ascending))
                .await?;

            if result.rows.is_empty() {
                println!("No forwarding rules");
                return Ok(());
            }

            println!("Forwarding rules ({} of {})", result.rows.len(), result.total);
            println!();
            for rule in result.rows {
                println!("  {} {}", rule.id, rule.name);
                println!("    Listen: {} -> {}", rule.listen_port, rule.targets);
                if let Some(tunnel_id) = rule.tunnel_id {
                    println!("    Tunnel: {}", tunnel_id);
                }
            }
            Ok(())
        }
        RuleCommands::Show { id } => {
            let rule = client.relay_rules().get(id).await?;
            println!("{}", serde_json::to_string_pretty(&rule)?);
            Ok(())
        }
        RuleCommands::Update {
            id,
            name,
            description,
            listen_port,
            targets,
            tunnel,
            limit,
        } => {
            let limit = parse_limit(limit)?;

            let rule = client
                .relay_rules()
                .update(
                    id,
                    &RulePatch {
                        name,
                        description,
                        listen_port,
                        tunnel_id: tunnel,
                        targets,
                        limit,
                    },
                )
                .await?;

            println!("✅ Rule '{}' updated", rule.name);
            Ok(())
        }
        RuleCommands::Delete { id } => {
            client.relay_rules().delete(id).await?;
            println!("✅ Rule {} deleted", id);
            Ok(())
        }
    }
}

fn parse_limit(limit: Option<String>) -> Result<Option<serde_json::Value>> {
    limit
        .map(|text| serde_json::from_str(&text).context("Invalid --limit JSON"))
        .transpose()
}

async fn handle_tenant_command(
    client: &StoreClient,
    config: &ConfigManager,
    command: TenantCommands,
) -> Result<()> {
    match command {
        TenantCommands::List => {
            let tenants = client
                .tenants()
                .list(Query::new().order("name", Direction::Ascending))
                .await?;

            if tenants.is_empty() {
                println!("No tenants");
                return Ok(());
            }

            let current = config.load()?.tenant_id;
            for tenant in tenants {
                let marker = if Some(tenant.id) == current { "*" } else { " " };
                println!("{} {} {} ({})", marker, tenant.id, tenant.name, tenant.code);
            }
            Ok(())
        }
        TenantCommands::Switch { id } => {
            let tenant = client.tenants().get(id).await?;
            config.store_tenant(Some(tenant.id))?;
            println!("✅ Switched to tenant '{}'", tenant.name);
            Ok(())
        }
        TenantCommands::Current => {
            let tenant = match config.load()?.tenant_id {
                Some(id) => client.tenants().get(id).await?,
                // No selection stored: default to the first tenant by name.
                None => client
                    .tenants()
                    .list(Query::new().order("name", Direction::Ascending).limit(1))
                    .await?
                    .into_iter()
                    .next()
                    .context("No tenants available")?,
            };
            println!("{} {} ({})", tenant.id, tenant.name, tenant.code);
            Ok(())
        }
    }
}

async fn handle_announcement_command(
    client: &StoreClient,
    command: AnnouncementCommands,
) -> Result<()> {
    match command {
        AnnouncementCommands::List => {
            let items = client
                .announcements()
                .list(Query::new().order("created_at", Direction::Descending))
                .await?;

            if items.is_empty() {
                println!("No announcements");
                return Ok(());
            }

            for item in items {
                println!("[{}] {}", item.created_at.format("%Y-%m-%d"), item.title);
                println!("{}", item.content);
                println!();
            }
            Ok(())
        }
    }
}

async fn handle_port_check(client: &StoreClient, node_id: i64) -> Result<()> {
    let node = client.relay_nodes().get(node_id).await?;
    let mut allocator = PortAllocator::new(client);
    let port = allocator.next_free(node_id, &[]).await?;
    println!("Next free port on '{}': {}", node.name, port);
    Ok(())
}

fn init_logging(log_level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(log_level))
        .context("Failed to initialize logging filter")?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}
