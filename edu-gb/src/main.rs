//! edu-gb - Gradebook microservice
//!
//! Serves per-student gradebook views reduced from course grade config
//! files and recorded question attempts.

use anyhow::Result;
use clap::Parser;
use edu_common::config::{RootFolderInitializer, RootFolderResolver, TomlConfig};
use edu_gb::courses::CourseCatalog;
use edu_gb::{build_router, AppState};
use std::path::PathBuf;
use tracing::{info, warn};

const MODULE_NAME: &str = "edu-gb";

#[derive(Debug, Parser)]
#[command(name = "edu-gb", version, about = "Gradebook service")]
struct Args {
    /// Root folder holding edu.db and courses/
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

    let initializer = RootFolderInitializer::new(resolver.resolve());
    initializer.ensure_directory_exists()?;

    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let pool = edu_common::db::init_database(&db_path).await?;

    let settings = config.gradebook.clone();
    let courses_dir = settings
        .courses_dir
        .clone()
        .unwrap_or_else(|| initializer.courses_dir());
    if !courses_dir.is_dir() {
        warn!(
            "Courses directory {} does not exist; every course lookup will be 404",
            courses_dir.display()
        );
    }
    info!("Courses: {}", courses_dir.display());

    let state = AppState::new(
        pool,
        CourseCatalog::new(courses_dir),
        settings.default_passing_threshold,
    );
    let app = build_router(state);

    let port = args.port.unwrap_or(settings.port);
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
    info!("{} listening on http://127.0.0.1:{}", MODULE_NAME, port);
    info!("Health check: http://127.0.0.1:{}/health", port);

    axum::serve(listener, app).await?;

    Ok(())
}
