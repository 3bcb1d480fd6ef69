//! ferry binary entry point: parse and validate flags, then hand the typed
//! request to the engine or the archive module.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Instant;

use ferry::archive;
use ferry::cli::{Args, Command};
use ferry::http::HttpSource;
use ferry::logger::{Logger, NoopLogger, TextLogger};
use ferry::progress::ProgressAggregator;
use ferry::storage::{OssConfig, StorageSink};
use ferry::transfer::{run_batch, BatchRequest, Transport};

fn main() -> Result<()> {
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted by user. Exiting (Ctrl-C)...");
        // Exit immediately with 130 (128 + SIGINT)
        std::process::exit(130);
    })
    .expect("Error setting Ctrl-C handler");

    let args = Args::parse();

    // Choose logger once; NoopLogger costs nothing in the hot paths
    let logger: Arc<dyn Logger> = if let Some(ref p) = args.log_file {
        match TextLogger::new(p) {
            Ok(l) => Arc::new(l),
            Err(_) => Arc::new(NoopLogger),
        }
    } else {
        Arc::new(NoopLogger)
    };

    match args.command {
        Command::Download(cmd) => {
            cmd.validate()?;
            let request = BatchRequest::new(cmd.pairs(), cmd.failure_mode(), cmd.timeout());
            let transport = Arc::new(HttpSource::new()?);
            run_transfers(transport, request, args.quiet, logger)
        }
        Command::Upload(cmd) => {
            cmd.validate()?;
            let raw = std::fs::read_to_string(&cmd.config)
                .with_context(|| format!("Failed to read config {}", cmd.config.display()))?;
            let config: OssConfig = serde_json::from_str(&raw)
                .with_context(|| format!("Config {} must be valid JSON", cmd.config.display()))?;
            let request = BatchRequest::new(cmd.pairs(), cmd.failure_mode(), cmd.timeout());
            let transport = Arc::new(StorageSink::connect(cmd.backend, &config)?);
            run_transfers(transport, request, args.quiet, logger)
        }
        Command::Pack(cmd) => {
            cmd.validate()?;
            let (files, bytes) =
                archive::pack(&cmd.inputs, cmd.recursive, &cmd.output, !args.quiet, &*logger)?;
            println!(
                "Packed {} files ({} bytes) into {}",
                files,
                bytes,
                cmd.output.display()
            );
            Ok(())
        }
        Command::Unpack(cmd) => {
            cmd.validate()?;
            let entries = archive::unpack(&cmd.input, &cmd.output, !args.quiet, &*logger)?;
            println!("Extracted {} entries into {}", entries, cmd.output.display());
            Ok(())
        }
    }
}

/// Run a download/upload batch on a fresh runtime and report the outcome.
fn run_transfers(
    transport: Arc<dyn Transport>,
    request: BatchRequest,
    quiet: bool,
    logger: Arc<dyn Logger>,
) -> Result<()> {
    let total = request.units.len();
    let start = Instant::now();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    let aggregator = Arc::new(if quiet {
        ProgressAggregator::hidden()
    } else {
        ProgressAggregator::new()
    });

    // Abort-mode failures propagate here as the batch error
    let result = rt.block_on(run_batch(transport, request, aggregator, logger.clone()))?;

    logger.summary(
        result.succeeded.len() as u64,
        result.failed.len() as u64,
        start.elapsed().as_secs_f64(),
    );

    if result.failed.is_empty() {
        println!("{} of {} transfers completed", result.succeeded.len(), total);
        Ok(())
    } else {
        for (unit, err) in &result.failed {
            eprintln!("failed: {} ({})", unit.source, err);
        }
        anyhow::bail!("{} of {} transfers failed", result.failed.len(), total)
    }
}
