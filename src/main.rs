use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use std::path::PathBuf;
use std::process::ExitCode;

use surf_store::api::{block_api, metadata_api};
use surf_store::app_state::{build_client, BlockAppState, MetadataAppState};
use surf_store::config::AppConfig;
use surf_store::{Result, StoreError};

#[derive(Parser)]
#[command(name = "surfstore", about = "Content-addressed file store with sharded block services")]
struct Cli {
    /// Configuration file (defaults to $SURFSTORE_CONFIG, then config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the block service for one configured shard
    Block {
        /// Index into `block_stores`
        #[arg(long, default_value_t = 0)]
        shard: usize,
    },
    /// Run the metadata service
    Metadata,
    /// Upload a local file
    Upload { path: PathBuf },
    /// Download a file into a directory
    Download { filename: String, destination: PathBuf },
    /// Delete a file
    Delete { filename: String },
    /// List known files
    List,
}

fn init_logging(config: &AppConfig) {
    if let Err(e) = log4rs::init_file(&config.logging.config_file, Default::default()) {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
        warn!("Could not load {}: {}; logging to stderr", config.logging.config_file, e);
    }
}

async fn run_block_service(config: AppConfig, shard: usize) -> Result<()> {
    let endpoint = config
        .block_stores
        .get(shard)
        .cloned()
        .ok_or(StoreError::InvalidShard { index: shard, shard_count: config.block_stores.len() })?;
    let state = web::Data::new(BlockAppState::new());
    let payload_limit = config.server.max_payload_size;

    info!("Starting block service for shard {} on {}", shard, endpoint.address());
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(state.clone())
            .app_data(web::PayloadConfig::default().limit(payload_limit))
            .configure(block_api::configure)
    })
    .workers(config.server.workers)
    .bind((endpoint.host.as_str(), endpoint.port))?
    .run()
    .await?;
    Ok(())
}

async fn run_metadata_service(config: AppConfig) -> Result<()> {
    let state = web::Data::new(MetadataAppState::from_config(&config)?);
    let payload_limit = config.server.max_payload_size;

    info!("Starting metadata service on {}", config.metadata.address());
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(state.clone())
            .app_data(web::JsonConfig::default().limit(payload_limit))
            .configure(metadata_api::configure)
    })
    .workers(config.server.workers)
    .bind((config.metadata.host.as_str(), config.metadata.port))?
    .run()
    .await?;
    Ok(())
}

async fn run(cli: Cli, config: AppConfig) -> Result<()> {
    match cli.command {
        Command::Block { shard } => run_block_service(config, shard).await,
        Command::Metadata => run_metadata_service(config).await,
        Command::Upload { path } => {
            let report = build_client(&config)?.upload(&path).await?;
            println!("OK {} v{}", report.filename, report.version);
            Ok(())
        }
        Command::Download { filename, destination } => {
            let report = build_client(&config)?.download(&filename, &destination).await?;
            println!("OK {} ({} bytes)", report.path.display(), report.bytes_written);
            Ok(())
        }
        Command::Delete { filename } => {
            let version = build_client(&config)?.delete(&filename).await?;
            println!("OK {} v{}", filename, version);
            Ok(())
        }
        Command::List => {
            for file in build_client(&config)?.list().await? {
                let state = if file.deleted { "deleted" } else { "active" };
                println!(
                    "{}\tv{}\t{}\t{} block(s)\t{}",
                    file.filename,
                    file.version,
                    state,
                    file.block_count,
                    file.updated_at.to_rfc3339()
                );
            }
            Ok(())
        }
    }
}

#[actix_web::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let loaded = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config);

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(StoreError::LocalFileNotFound(_)) | Err(StoreError::RemoteFileNotFound(_)) => {
            println!("Not Found");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
