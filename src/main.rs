use gifsplit::cli::Args;
use gifsplit::config;
use gifsplit::pipeline::{Pipeline, PipelineConfig};
use gifsplit::server::ApiServer;
use gifsplit::store::ArtifactStore;

use anyhow::Context;
use clap::Parser;
use log::{debug, info};
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    // Parse command-line arguments first (needed for log setup)
    let args = Args::parse();

    // Resolve storage root from CLI args and environment
    let storage_config = config::StorageConfig::from_env_and_cli(args.storage_dir.clone());
    let storage_root = config::ensure_dirs(&storage_config)?;

    // Determine log level based on verbosity flags
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    // Initialize logger based on --log flag
    if let Some(log_path_opt) = &args.log_file {
        // File logging with specified verbosity level
        let log_path = log_path_opt
            .as_ref()
            .cloned()
            .unwrap_or_else(|| storage_root.join("gifsplit.log"));

        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .filter_module("tiny_http", log::LevelFilter::Warn)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!(
            "Logging to file: {} (level: {:?})",
            log_path.display(),
            log_level
        );
    } else {
        // Console logging with specified verbosity level (respects RUST_LOG if set)
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };

        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .filter_module("tiny_http", log::LevelFilter::Warn)
            .format_timestamp_millis()
            .init();
    }

    info!("gifsplit v{} starting...", env!("CARGO_PKG_VERSION"));
    debug!("Command-line args: {:?}", args);

    let store = ArtifactStore::open(&storage_root)
        .with_context(|| format!("Failed to open artifact store: {}", storage_root.display()))?;

    let pipeline_config = PipelineConfig {
        canvas: args.canvas,
        ..PipelineConfig::default()
    };
    info!(
        "Output canvas {}x{}, storage {}",
        pipeline_config.canvas.0,
        pipeline_config.canvas.1,
        storage_root.display()
    );

    if let Some(dir) = &args.static_dir {
        info!("Static files from {}", dir.display());
    }

    let pipeline = Arc::new(Pipeline::new(store, pipeline_config));
    ApiServer::new(args.bind_addr(), pipeline, args.static_dir.clone()).run()
}
