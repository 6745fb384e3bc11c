//! # Image Squeeze - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Caricamento e validazione della configurazione
//! - Avvio del batch con renderer a barre o JSON
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI (input, quality, format, output, etc.)
//! 2. Configura il logging (INFO o DEBUG, sempre sovrascrivibile con `RUST_LOG`)
//! 3. Carica la configurazione da file e applica gli override della CLI
//! 4. Apre lo storico delle stime (in memoria se il file non è accessibile)
//! 5. Scopre le immagini, le aggiunge al batch e le comprime in sequenza
//!
//! ## Esempio di utilizzo:
//! ```bash
//! image-squeeze photos/ banner.png --quality 75 --format webp --output out/
//! image-squeeze --stats --json
//! ```

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use image_squeeze::estimation::EstimationStore;
use image_squeeze::file_manager::FileManager;
use image_squeeze::json_output::JsonMessage;
use image_squeeze::{
    BatchOrchestrator, BatchProgressView, Config, EstimationService, ImageFormat,
    JsonEstimationStore, MemoryEstimationStore, ToolCompressor,
};

#[derive(Parser)]
#[command(name = "image-squeeze")]
#[command(about = "Compress images with adaptive, self-correcting progress estimates")]
struct Args {
    /// Image files or directories to compress
    inputs: Vec<PathBuf>,

    /// Encoder quality (1-100)
    #[arg(short, long)]
    quality: Option<u8>,

    /// Output format (png, jpeg, webp); defaults to the input format
    #[arg(short, long)]
    format: Option<ImageFormat>,

    /// Use lossless encoder modes
    #[arg(long)]
    lossless: bool,

    /// Output directory for compressed files (if not specified, write next to originals)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Progress animation cadence in milliseconds
    #[arg(long)]
    tick_interval: Option<u64>,

    /// Output progress and status as JSON for programmatic use
    #[arg(long)]
    json: bool,

    /// Print the estimation history summary and exit
    #[arg(long)]
    stats: bool,

    /// Delete the estimation history and exit
    #[arg(long)]
    reset_stats: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // stdout belongs to the JSON stream
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    let subscriber = if json {
        builder.with_ansi(false).finish()
    } else {
        builder.finish()
    };

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

async fn load_config(args: &Args) -> Result<Config> {
    let mut config = match args.config {
        Some(ref path) => Config::from_file(path).await?,
        None => Config::default(),
    };

    if let Some(quality) = args.quality {
        config.quality = quality;
    }
    if args.format.is_some() {
        config.output_format = args.format;
    }
    if args.lossless {
        config.lossy = false;
    }
    if let Some(ref output) = args.output {
        if !output.exists() {
            std::fs::create_dir_all(output)?;
            info!("Created output directory: {}", output.display());
        }
        config.output_path = Some(output.clone());
    }
    if let Some(tick_interval) = args.tick_interval {
        config.tick_interval_ms = tick_interval;
    }
    config.json_output = args.json;

    config.validate()?;
    Ok(config)
}

fn open_store(config: &Config) -> Arc<dyn EstimationStore> {
    let path = match config.store_path.clone() {
        Some(path) => Ok(path),
        None => JsonEstimationStore::default_path(),
    };

    match path.and_then(|path| JsonEstimationStore::open(&path)) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!("⚠️  {}; estimation history will not be kept", e);
            Arc::new(MemoryEstimationStore::new())
        }
    }
}

fn report_stats(estimation: &EstimationService, json: bool) {
    let summary = estimation.summary();
    if json {
        JsonMessage::stats(&summary).emit();
        return;
    }

    println!("📊 Estimation history: {} samples", summary.total_samples);
    for pair in &summary.pairs {
        println!(
            "  {} → {}: {} samples, {:.1}% average reduction, ~{}ms",
            pair.input_format,
            pair.output_format,
            pair.samples,
            pair.average_reduction,
            pair.average_duration_ms
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.json)?;

    let config = match load_config(&args).await {
        Ok(config) => config,
        Err(e) => {
            if args.json {
                JsonMessage::error("Invalid configuration".to_string(), Some(e.to_string())).emit();
            }
            return Err(e);
        }
    };

    let estimation = Arc::new(
        EstimationService::new(open_store(&config))
            .with_quality_window(config.quality_window)
            .with_default_duration(config.fallback_duration_ms),
    );

    if args.reset_stats {
        estimation.reset()?;
        info!("🗑️  Estimation history cleared");
        return Ok(());
    }
    if args.stats {
        report_stats(&estimation, args.json);
        return Ok(());
    }

    if args.inputs.is_empty() {
        return Err(anyhow::anyhow!("No input files or directories given"));
    }
    let files = FileManager::find_images(&args.inputs)?;
    info!("Found {} images to compress", files.len());

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping running encoders");
            let _ = stop_tx.send(true);
        }
    });

    if args.verbose {
        ToolCompressor::print_available_tools().await;
    }

    let json = config.json_output;
    let orchestrator = BatchOrchestrator::new(
        config.clone(),
        ToolCompressor::with_cancellation(stop_rx),
        Arc::clone(&estimation),
    );

    let events = orchestrator.subscribe();
    let renderer = if json {
        JsonMessage::start(files.len(), &config).emit();
        tokio::spawn(JsonMessage::emit_events(events))
    } else {
        tokio::spawn(BatchProgressView::new().run(events))
    };

    let started = Instant::now();
    for file in &files {
        if let Err(e) = orchestrator.add_file(file).await {
            warn!("Skipping {}: {}", file.display(), e);
        }
    }

    let summary = orchestrator.process_pending().await;
    orchestrator.drain_recordings().await;
    if let Err(e) = renderer.await {
        error!("Progress renderer failed: {}", e);
    }

    if json {
        JsonMessage::complete(&summary, started.elapsed().as_secs_f64()).emit();
    } else {
        info!("✅ {}", summary.format_summary());
    }

    Ok(())
}
