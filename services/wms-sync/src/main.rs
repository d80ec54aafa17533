//! WMS resource registry CLI.
//!
//! Registers remote WMS endpoints, syncs their capabilities and previews
//! into the catalog, and inspects or removes registered resources.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use storage::{Catalog, ObjectStorage};
use wms_common::WmsResource;
use wms_sync::config::storage_for_root;
use wms_sync::{HttpTransport, ResourceSync, SyncConfig, SyncReport};

#[derive(Parser, Debug)]
#[command(name = "wms-sync")]
#[command(about = "Register WMS endpoints and sync their capabilities and previews")]
struct Args {
    /// YAML configuration file (default: environment variables)
    #[arg(long, env = "WMS_SYNC_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database URL
    #[arg(long, env = "WMS_SYNC_DATABASE_URL")]
    database_url: Option<String>,

    /// Preview storage directory, or "memory"
    #[arg(long, env = "WMS_SYNC_MEDIA_ROOT")]
    media_root: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long)]
    request_timeout: Option<u64>,

    /// Connect timeout in seconds
    #[arg(long)]
    connect_timeout: Option<u64>,

    /// User-Agent header sent to remote servers
    #[arg(long)]
    user_agent: Option<String>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a new WMS resource and sync it
    Register {
        /// Unique display name
        name: String,

        /// Base URI of the WMS endpoint
        uri: String,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        username: Option<String>,

        #[arg(long, env = "WMS_SYNC_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        #[arg(long, allow_negative_numbers = true)]
        north: Option<f64>,

        #[arg(long, allow_negative_numbers = true)]
        east: Option<f64>,

        #[arg(long, allow_negative_numbers = true)]
        south: Option<f64>,

        #[arg(long, allow_negative_numbers = true)]
        west: Option<f64>,

        #[arg(long)]
        zoom: Option<u8>,

        #[arg(long)]
        min_zoom: Option<u8>,

        #[arg(long)]
        max_zoom: Option<u8>,
    },

    /// Re-sync a resource and fetch a new preview
    Refresh { slug: String },

    /// Print a resource with its layers as JSON
    Show { slug: String },

    /// List registered resources
    List,

    /// Delete a resource, its layers and styles, and its preview
    Delete { slug: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs on stderr, command output on stdout
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(&args)?;

    let catalog = Catalog::connect(&config.database_url).await?;
    catalog.migrate().await?;
    let catalog = Arc::new(catalog);

    let storage = Arc::new(ObjectStorage::new(&config.storage)?);
    let http = HttpTransport::new(&config.http)?;
    let sync = ResourceSync::with_http(catalog.clone(), storage.clone(), http);

    match args.command {
        Command::Register {
            name,
            uri,
            description,
            username,
            password,
            north,
            east,
            south,
            west,
            zoom,
            min_zoom,
            max_zoom,
        } => {
            let mut resource = WmsResource::new(name, uri);
            resource.description = description.unwrap_or_default();
            resource.username = username;
            resource.password = password;
            resource.north = north;
            resource.east = east;
            resource.south = south;
            resource.west = west;
            resource.zoom = zoom;
            resource.min_zoom = min_zoom;
            if max_zoom.is_some() {
                resource.max_zoom = max_zoom;
            }
            resource.validate()?;

            let slug = resource.ensure_slug().to_string();
            if catalog.get_resource(&slug).await?.is_some() {
                bail!("A resource with slug '{}' is already registered", slug);
            }

            info!(slug = %slug, uri = %resource.uri, "Registering resource");
            let report = sync.save(&mut resource).await?;
            print_report(&resource, &report)?;
        }
        Command::Refresh { slug } => {
            let mut resource = catalog
                .get_resource(&slug)
                .await?
                .with_context(|| format!("No resource with slug '{}'", slug))?;

            let previous = resource.preview.clone();
            let report = sync.refresh(&mut resource).await?;

            if let Some(old) = previous.filter(|old| resource.preview.as_ref() != Some(old)) {
                storage.delete(&old).await?;
            }
            print_report(&resource, &report)?;
        }
        Command::Show { slug } => {
            let resource = catalog
                .get_resource(&slug)
                .await?
                .with_context(|| format!("No resource with slug '{}'", slug))?;
            let layers = catalog.layers(&slug).await?;

            let output = serde_json::json!({
                "resource": resource,
                "layers": layers,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::List => {
            for resource in catalog.list_resources().await? {
                println!("{}\t{}\t{}", resource.slug, resource.name, resource.uri);
            }
        }
        Command::Delete { slug } => {
            let resource = catalog.get_resource(&slug).await?;
            if !catalog.delete_resource(&slug).await? {
                bail!("No resource with slug '{}'", slug);
            }
            if let Some(preview) = resource.and_then(|r| r.preview) {
                storage.delete(&preview).await?;
            }
            info!(slug = %slug, "Deleted resource");
        }
    }

    Ok(())
}

fn load_config(args: &Args) -> Result<SyncConfig> {
    let mut config = match &args.config {
        Some(path) => SyncConfig::from_yaml(path)?,
        None => SyncConfig::from_env(),
    };

    if let Some(url) = &args.database_url {
        config.database_url = url.clone();
    }
    if let Some(root) = &args.media_root {
        config.storage = storage_for_root(root);
    }
    if let Some(secs) = args.request_timeout {
        config.http.request_timeout_secs = secs;
    }
    if let Some(secs) = args.connect_timeout {
        config.http.connect_timeout_secs = secs;
    }
    if let Some(agent) = &args.user_agent {
        config.http.user_agent = agent.clone();
    }

    Ok(config)
}

fn print_report(resource: &WmsResource, report: &SyncReport) -> Result<()> {
    let output = serde_json::json!({
        "slug": report.slug,
        "capabilities": format!("{:?}", report.capabilities),
        "layers": report.layers,
        "zoom_applied": report.zoom_applied,
        "preview": format!("{:?}", report.preview),
        "resource": resource,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
