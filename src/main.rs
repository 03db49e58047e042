mod app;
mod audio;
mod cli;
mod error;
mod pipeline;
mod server;
mod services;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use crate::audio::Mixer;
use crate::cli::{Args, Command, GenerateArgs};
use crate::error::{MuseError, Result};
use crate::pipeline::{Pipeline, PipelineRequest};
use crate::server::AppState;
use crate::services::{ServiceConfig, Services};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(args.verbose);

    info!("memomuse v{} starting", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(args).await {
        error!("Application error: {}", e);
        return Err(e);
    }

    Ok(())
}

/// Initialize tracing subscriber
fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();
}

fn service_config(args: &Args, work_dir: &Path) -> ServiceConfig {
    ServiceConfig {
        gemini_api_key: args.gemini_api_key.clone(),
        elevenlabs_api_key: args.elevenlabs_api_key.clone(),
        featherless_api_key: args.featherless_api_key.clone(),
        backboard_api_key: args.backboard_api_key.clone(),
        whisper_bin: args.whisper_bin.clone(),
        whisper_model: args.whisper_model.clone(),
        instrumental_seconds: args.instrumental_seconds,
        scratch_dir: work_dir.to_path_buf(),
    }
}

async fn run(args: Args) -> Result<()> {
    let work_dir = args.work_dir();
    tokio::fs::create_dir_all(&work_dir).await?;

    info!(
        work_dir = ?work_dir,
        format = ?args.format,
        instrumental_seconds = args.instrumental_seconds,
        "Configured"
    );

    let services = Services::from_config(&service_config(&args, &work_dir))
        .map_err(|e| MuseError::Config(format!("failed to build service clients: {}", e)))?;
    let pipeline = Arc::new(Pipeline::new(services, Mixer::new(args.format), work_dir));

    match args.command {
        Command::Generate(generate) => run_generate(&pipeline, generate).await,
        Command::Serve { host, port } => {
            let addr = format!("{}:{}", host, port);
            server::serve(AppState::new(pipeline), &addr).await?;
            Ok(())
        }
    }
}

/// Run one song and print the result as JSON
async fn run_generate(pipeline: &Pipeline, args: GenerateArgs) -> Result<()> {
    if !args.input.is_file() {
        return Err(MuseError::Config(format!(
            "input {} is not a readable file",
            args.input.display()
        )));
    }

    let request = PipelineRequest::new(&args.input, &args.genre).with_studio(args.studio());
    let mut result = pipeline.run(request).await?;

    if let Some(output) = args.output {
        result.output_path = move_output(&result.output_path, output).await?;
    }

    let json = serde_json::to_string_pretty(&result)
        .map_err(|e| MuseError::Config(format!("failed to encode result: {}", e)))?;
    println!("{}", json);
    Ok(())
}

/// Move the rendered song out of the work dir
async fn move_output(from: &Path, to: PathBuf) -> Result<PathBuf> {
    if let Some(parent) = to.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    // rename fails across filesystems
    if tokio::fs::rename(from, &to).await.is_err() {
        tokio::fs::copy(from, &to).await?;
        let _ = tokio::fs::remove_file(from).await;
    }
    info!(path = ?to, "Song saved");
    Ok(to)
}
