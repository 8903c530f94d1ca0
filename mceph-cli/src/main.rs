use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tabled::{Table, Tabled};
use tracing::info;
use tracing_subscriber::EnvFilter;

use mceph::audit::AuditLog;
use mceph::auth::{AuthReconciler, EntitySpec, EntityState};
use mceph::client::{ClusterClient, ClusterConn};
use mceph::image::{ImageReconciler, ImageSpec};
use mceph::pool::{PoolReconciler, PoolSpec};
use mceph::reconcile::Reconcile;
use mceph::status::cluster_status;

#[derive(Parser)]
#[command(name = "mceph")]
#[command(about = "Declarative reconciler for Ceph cluster resources", long_about = None)]
struct Cli {
    /// Path to the Ceph configuration file
    #[arg(long)]
    conf: Option<String>,

    /// Path to the keyring file
    #[arg(long)]
    keyring: Option<String>,

    /// Ceph user to authenticate as
    #[arg(long)]
    user: Option<String>,

    /// Per-command timeout in seconds (0 disables)
    #[arg(long, default_value = "120")]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a desired-state plan
    Apply {
        /// Path to the JSON plan file
        plan: PathBuf,
    },

    /// Print a cluster health snapshot
    Status,

    /// Delete every resource named in a plan
    Destroy {
        /// Path to the JSON plan file
        plan: PathBuf,
    },
}

/// Desired-state plan decoded from JSON.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Plan {
    #[serde(default)]
    pools: Vec<PoolSpec>,

    #[serde(default)]
    entities: Vec<EntitySpec>,

    #[serde(default)]
    images: Vec<ImageSpec>,
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "HEALTH")]
    health: String,
    #[tabled(rename = "OSD")]
    osds: u64,
    #[tabled(rename = "MON")]
    mons: u64,
    #[tabled(rename = "MGR")]
    mgrs: u64,
    #[tabled(rename = "POOLS")]
    pools: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("mceph=info".parse()?))
        .init();

    let cli = Cli::parse();

    let conn = ClusterConn {
        conf_file: cli.conf.clone(),
        keyring: cli.keyring.clone(),
        user: cli.user.clone(),
    };
    let mut client = ClusterClient::new(conn);
    if cli.timeout > 0 {
        client = client.with_timeout(Duration::from_secs(cli.timeout));
    }
    let client = Arc::new(client);
    let audit = Arc::new(AuditLog::new_tracing());

    match cli.command {
        Commands::Apply { plan } => apply(client, audit, &plan).await,
        Commands::Status => status(&client).await,
        Commands::Destroy { plan } => destroy(client, audit, &plan).await,
    }
}

fn load_plan(path: &Path) -> Result<Plan> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read plan {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse plan {}", path.display()))
}

/// Prior-state probe for an entity the CLI has no persisted state for.
fn entity_probe(spec: &EntitySpec) -> EntityState {
    EntityState {
        name: spec.name.clone(),
        caps: spec.caps.clone(),
        key: None,
    }
}

async fn apply(client: Arc<ClusterClient>, audit: Arc<AuditLog>, path: &Path) -> Result<()> {
    let plan = load_plan(path)?;
    info!(
        pools = plan.pools.len(),
        entities = plan.entities.len(),
        images = plan.images.len(),
        "Applying plan"
    );

    let pools = PoolReconciler::new(Arc::clone(&client), Arc::clone(&audit));
    for spec in &plan.pools {
        match pools.observe(spec).await? {
            None => {
                pools.create(spec).await?;
            }
            Some(prior) => {
                pools.update(spec, &prior).await?;
            }
        }
    }

    let entities = AuthReconciler::new(Arc::clone(&client), Arc::clone(&audit));
    for spec in &plan.entities {
        match entities.observe(&entity_probe(spec)).await? {
            None => {
                entities.create(spec).await?;
            }
            Some(prior) => {
                entities.update(spec, &prior).await?;
            }
        }
    }

    let images = ImageReconciler::new(Arc::clone(&client), Arc::clone(&audit));
    for spec in &plan.images {
        match images.observe(spec).await? {
            None => {
                images.create(spec).await?;
            }
            Some(prior) => {
                images.update(spec, &prior).await?;
            }
        }
    }

    Ok(())
}

async fn destroy(client: Arc<ClusterClient>, audit: Arc<AuditLog>, path: &Path) -> Result<()> {
    let plan = load_plan(path)?;

    // Images first: they live inside pools.
    let images = ImageReconciler::new(Arc::clone(&client), Arc::clone(&audit));
    for spec in &plan.images {
        if let Some(prior) = images.observe(spec).await? {
            images.delete(&prior).await?;
        }
    }

    let entities = AuthReconciler::new(Arc::clone(&client), Arc::clone(&audit));
    for spec in &plan.entities {
        if let Some(prior) = entities.observe(&entity_probe(spec)).await? {
            entities.delete(&prior).await?;
        }
    }

    let pools = PoolReconciler::new(Arc::clone(&client), Arc::clone(&audit));
    for spec in &plan.pools {
        if let Some(prior) = pools.observe(spec).await? {
            pools.delete(&prior).await?;
        }
    }

    Ok(())
}

async fn status(client: &ClusterClient) -> Result<()> {
    let snapshot = cluster_status(client).await;

    let rows = vec![StatusRow {
        health: snapshot.health,
        osds: snapshot.osd_count,
        mons: snapshot.mon_count,
        mgrs: snapshot.mgr_count,
        pools: snapshot.pool_count,
    }];
    println!("{}", Table::new(rows));

    Ok(())
}
