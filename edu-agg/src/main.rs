//! edu-agg - Aggregate maintenance microservice
//!
//! Maintains the family statistics aggregate incrementally from family
//! changes, recomputes it on a schedule, and reconciles registry links.

use anyhow::Result;
use clap::Parser;
use edu_agg::aggregate::{AggregateMaintainer, MaintainerConfig};
use edu_agg::delivery::{spawn_delivery_worker, ChangeFeed, DeliveryPolicy};
use edu_agg::families::FamilyRepository;
use edu_agg::reconcile::{LinkReconciler, SqliteLinkStore};
use edu_agg::scheduler::{spawn_recompute_schedule, spawn_reconcile_schedule};
use edu_agg::store::SqliteAggregateStore;
use edu_agg::{build_router, AppState};
use edu_common::config::{RootFolderInitializer, RootFolderResolver, TomlConfig};
use edu_common::events::EventBus;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const MODULE_NAME: &str = "edu-agg";

#[derive(Debug, Parser)]
#[command(name = "edu-agg", version, about = "Aggregate maintenance service")]
struct Args {
    /// Root folder holding edu.db
    #[arg(long, env = "EDU_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Bootstrap TOML file (defaults to the platform config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the listen port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let resolver = RootFolderResolver::new(MODULE_NAME).with_cli_arg(args.root_folder.clone());
    let config_path = args.config.clone().or_else(|| resolver.config_file_path());
    let config = TomlConfig::load_or_default(config_path.as_deref());

    edu_common::logging::init_tracing(&config.logging)?;
    info!("Starting {} v{}", MODULE_NAME, env!("CARGO_PKG_VERSION"));

    let root_folder = resolver.resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer.ensure_directory_exists()?;

    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let pool = edu_common::db::init_database(&db_path).await?;

    let settings = config.aggregate.clone();
    let event_bus = EventBus::new(256);

    let (feed, rx) = ChangeFeed::channel(1024);
    let store = Arc::new(SqliteAggregateStore::new(pool.clone()));
    let maintainer = Arc::new(
        AggregateMaintainer::new(
            store,
            MaintainerConfig {
                aggregate_name: "families".to_string(),
                scan_batch_size: settings.scan_batch_size,
            },
        )
        .with_event_bus(event_bus.clone())
        .with_sequencer(feed.sequencer()),
    );

    match maintainer.snapshot().await {
        Ok(Some(_)) => info!("Loaded existing family statistics snapshot"),
        Ok(None) => {
            info!("No family statistics snapshot, computing from scratch");
            maintainer.recompute_all().await?;
        }
        Err(e) => warn!("Could not read snapshot at startup: {}", e),
    }

    let policy = DeliveryPolicy {
        max_attempts: settings.delivery_max_attempts,
        backoff: Duration::from_millis(settings.delivery_backoff_ms),
    };
    let (_delivery_stats, _worker) =
        spawn_delivery_worker(Arc::clone(&maintainer), rx, policy, event_bus.clone());

    let reconciler = Arc::new(
        LinkReconciler::new(
            Arc::new(SqliteLinkStore::new(pool.clone())),
            settings.reconcile_batch_size,
        )
        .with_event_bus(event_bus.clone()),
    );

    let _recompute = spawn_recompute_schedule(
        feed.clone(),
        Duration::from_secs(settings.recompute_interval_secs),
    );
    let _reconcile = spawn_reconcile_schedule(
        Arc::clone(&reconciler),
        Duration::from_secs(settings.reconcile_interval_secs),
    );

    let state = AppState {
        maintainer,
        families: Arc::new(FamilyRepository::new(pool, feed.clone())),
        feed,
        reconciler,
        event_bus,
    };
    let app = build_router(state);

    let port = args.port.unwrap_or(settings.port);
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
    info!("{} listening on http://127.0.0.1:{}", MODULE_NAME, port);
    info!("Health check: http://127.0.0.1:{}/health", port);

    axum::serve(listener, app).await?;

    Ok(())
}
