pub mod config;
pub mod exec;
pub mod inventory;
pub mod migration;
pub mod remote;
pub mod ssh;
pub mod transfer;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use config::MigrateConfig;
use exec::SystemRunner;
use inventory::MemoryInventory;
use migration::{
    DatabaseSelection, ItemSelection, ItemStatus, MigrationService, ProgressPublisher,
    ProjectSelection, WebsiteSelection, progress,
};
use remote::ConnectionInfo;

/// Command-line interface.
#[derive(Parser, Debug)]
#[command(
    name = "panel-migrate",
    version,
    about = "Migrate websites, databases and projects to a peer panel"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the peer connection and print its environment
    Precheck {
        /// Peer panel base URL (e.g. https://203.0.113.5:8888)
        #[arg(long)]
        url: String,

        /// API token identifier on the peer
        #[arg(long)]
        token_id: u64,

        /// Shared secret token (or PANEL_MIGRATION_TOKEN)
        #[arg(long, env = "PANEL_MIGRATION_TOKEN")]
        token: String,
    },
    /// Run a one-shot migration of everything in the inventory file
    Run {
        #[arg(long)]
        url: String,

        #[arg(long)]
        token_id: u64,

        #[arg(long, env = "PANEL_MIGRATION_TOKEN")]
        token: String,

        /// JSON file describing local websites/databases/projects
        #[arg(long)]
        inventory: PathBuf,

        /// Abort remaining items after the first failure
        #[arg(long, default_value_t = false)]
        stop_on_error: bool,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Precheck { url, token_id, token } => run_precheck(url, token_id, token),
        Commands::Run {
            url,
            token_id,
            token,
            inventory,
            stop_on_error,
        } => run_migration(url, token_id, token, inventory, stop_on_error),
    }
}

fn service_for(inventory: MemoryInventory) -> MigrationService {
    let inventory = Arc::new(inventory);
    MigrationService::new(
        MigrateConfig::from_env(),
        Arc::new(SystemRunner),
        inventory.clone(),
        inventory.clone(),
        inventory.clone(),
        inventory,
    )
}

fn run_precheck(url: String, token_id: u64, token: String) -> Result<()> {
    let service = service_for(MemoryInventory::new());
    let response = service.precheck(ConnectionInfo { url, token_id, token })?;
    println!("{}", serde_json::to_string_pretty(&response.remote)?);
    Ok(())
}

fn run_migration(
    url: String,
    token_id: u64,
    token: String,
    inventory_path: PathBuf,
    stop_on_error: bool,
) -> Result<()> {
    let raw = std::fs::read_to_string(&inventory_path)
        .with_context(|| format!("reading {}", inventory_path.display()))?;
    let inventory: MemoryInventory =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", inventory_path.display()))?;

    let selection = select_everything(&inventory, stop_on_error);
    let service = service_for(inventory);

    service.precheck(ConnectionInfo { url, token_id, token })?;
    service.items()?;
    let job = service.start(selection)?;

    // Stream frames to stdout until the publisher closes the channel on
    // completion.
    let (sink, frames) = progress::channel(64);
    let publisher =
        ProgressPublisher::new(service.state(), service.config().progress_tick).spawn(sink);
    for frame in frames {
        println!("{}", serde_json::to_string(&frame)?);
    }

    job.wait();
    let _ = publisher.join();

    let results = service.results();
    let failed = results
        .results
        .iter()
        .filter(|r| r.status == ItemStatus::Failed)
        .count();
    if failed > 0 {
        bail!("{failed} of {} items failed", results.results.len());
    }
    Ok(())
}

/// Select every inventory entry for migration.
fn select_everything(inventory: &MemoryInventory, stop_on_error: bool) -> ItemSelection {
    ItemSelection {
        websites: inventory
            .websites
            .iter()
            .map(|w| WebsiteSelection {
                id: w.id,
                name: w.name.clone(),
                path: w.path.clone(),
            })
            .collect(),
        databases: inventory
            .databases
            .iter()
            .map(|d| DatabaseSelection {
                name: d.name.clone(),
                kind: d.kind.clone(),
                server_id: d.server_id,
            })
            .collect(),
        projects: inventory
            .projects
            .iter()
            .map(|p| ProjectSelection {
                id: p.id,
                name: p.name.clone(),
                path: p.root_dir.clone(),
            })
            .collect(),
        stop_on_error,
    }
}
