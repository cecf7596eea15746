//! Depot - Model Artifact Distribution CLI
//!
//! Depot manages the journey of a packaged ML model from uploaded bytes to
//! ready predictor replicas on the local node.
//!
//! ## Commands
//!
//! ### Registration
//! - `register` - Verify, chunk, and register a local package file
//! - `register-url` - Fetch a package from a URL (digest required) and register it
//!
//! ### Serving
//! - `deploy` - Reassemble a registered model and load it onto every device
//! - `predict` - Run one inference call (deploys first if needed)
//! - `undeploy` - Release a resident model and delete its disk caches
//!
//! ### Replication / inspection
//! - `fetch-chunk` - Read one stored chunk, for replication to a peer node
//! - `status` - Show one model's metadata, or list all registered models

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use depot::{
    init_simple_logging, ArtifactMeta, DepotConfig, EngineRegistry, FsStore, ModelConfig,
    ModelFormat, ModelKind, ModelManager,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Depot - model artifact distribution agent
#[derive(Parser, Debug)]
#[command(name = "depot")]
#[command(about = "Distribute and serve ML model artifacts", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Depot root directory (defaults to ~/.depot)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Device count exposed by the in-process engine
    #[arg(long, global = true, default_value_t = 1)]
    devices: usize,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Register a local model package file
    Register {
        /// Path to the package zip
        file: PathBuf,

        /// Model name
        #[arg(short, long)]
        name: String,

        /// Model version
        #[arg(long, default_value = "1.0.0")]
        version: String,

        /// Native format: torch_script | onnx
        #[arg(long, default_value = "torch_script")]
        format: String,

        /// Model kind: text_embedding | tokenizer_only | raw
        #[arg(long, default_value = "text_embedding")]
        kind: String,

        /// Expected SHA-256 of the package (verified when given)
        #[arg(long)]
        hash: Option<String>,
    },

    /// Register a package from an externally hosted URL
    RegisterUrl {
        /// Package URL
        url: String,

        /// Model name
        #[arg(short, long)]
        name: String,

        /// Model version
        #[arg(long, default_value = "1.0.0")]
        version: String,

        /// Native format: torch_script | onnx
        #[arg(long, default_value = "torch_script")]
        format: String,

        /// Model kind: text_embedding | tokenizer_only | raw
        #[arg(long, default_value = "text_embedding")]
        kind: String,

        /// Expected SHA-256 of the package (mandatory on this path)
        #[arg(long)]
        hash: String,
    },

    /// Deploy a registered model onto every local device
    Deploy {
        /// Model id
        model_id: String,
    },

    /// Run one inference call (deploys the model first if needed)
    Predict {
        /// Model id
        model_id: String,

        /// Input text
        input: String,
    },

    /// Release a resident model and delete its disk caches
    Undeploy {
        /// Model id
        model_id: String,
    },

    /// Fetch one stored chunk for replication
    FetchChunk {
        /// Model id
        model_id: String,

        /// Chunk index
        index: u32,

        /// Output file (stdout as hex if omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Show model metadata, or list all registered models
    Status {
        /// Model id (lists everything when omitted)
        model_id: Option<String>,
    },
}

fn parse_meta(name: String, version: String, format: &str, kind: &str) -> Result<ArtifactMeta> {
    let format = ModelFormat::parse(format)
        .ok_or_else(|| anyhow!("unknown format '{}', expected torch_script or onnx", format))?;
    let kind = ModelKind::parse(kind).ok_or_else(|| {
        anyhow!(
            "unknown kind '{}', expected text_embedding, tokenizer_only, or raw",
            kind
        )
    })?;
    Ok(ArtifactMeta {
        name,
        version,
        format,
        kind,
        config: ModelConfig::default(),
    })
}

fn build_manager(root: Option<PathBuf>, devices: usize) -> Result<ModelManager> {
    let config = match root {
        Some(root) => DepotConfig::for_root(root),
        None => DepotConfig::load_or_default()?,
    };
    config.validate()?;

    let store = Arc::new(FsStore::new(config.store_dir())?);
    let engines = Arc::new(EngineRegistry::with_stub_engines(devices));

    Ok(ModelManager::new(config, store.clone(), store, engines))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_simple_logging(&cli.log_level)?;

    let manager = build_manager(cli.root.clone(), cli.devices)?;

    match cli.command {
        Commands::Register {
            file,
            name,
            version,
            format,
            kind,
            hash,
        } => {
            let meta = parse_meta(name, version, &format, &kind)?;
            let bytes = std::fs::read(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let artifact = manager.register_from_bytes(meta, &bytes, hash).await?;

            println!("{}", "Model registered".green().bold());
            println!("  Model ID:  {}", artifact.model_id.cyan());
            println!("  Size:      {} bytes", artifact.total_size_bytes);
            println!("  Chunks:    {}", artifact.total_chunks);
            println!("  SHA-256:   {}", artifact.content_hash);
        }

        Commands::RegisterUrl {
            url,
            name,
            version,
            format,
            kind,
            hash,
        } => {
            let meta = parse_meta(name, version, &format, &kind)?;
            let artifact = manager.register_from_url(meta, &url, Some(hash)).await?;

            println!("{}", "Model registered".green().bold());
            println!("  Model ID:  {}", artifact.model_id.cyan());
            println!("  Size:      {} bytes", artifact.total_size_bytes);
            println!("  Chunks:    {}", artifact.total_chunks);
        }

        Commands::Deploy { model_id } => {
            manager.deploy(&model_id).await?;
            let devices = manager.devices(&model_id).await.unwrap_or_default();

            println!("{}", "Model deployed".green().bold());
            println!("  Model ID:  {}", model_id.cyan());
            println!(
                "  Devices:   {}",
                devices
                    .iter()
                    .map(|d| d.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        Commands::Predict { model_id, input } => {
            if !manager.is_deployed(&model_id).await {
                info!(model_id = %model_id, "Model not resident, deploying first");
                manager.deploy(&model_id).await?;
            }

            let output = manager.predict(&model_id, input.as_bytes()).await?;
            println!("{}", String::from_utf8_lossy(&output));

            if let Some(stats) = manager.stats(&model_id).await {
                println!(
                    "{}",
                    format!("served in {:.2}ms avg", stats.avg_latency_ms).dimmed()
                );
            }
        }

        Commands::Undeploy { model_id } => {
            let outcome = manager.undeploy(&model_id).await?;
            println!("{}: {}", model_id.cyan(), outcome);
        }

        Commands::FetchChunk {
            model_id,
            index,
            out,
        } => {
            let bytes = manager.fetch_chunk(&model_id, index).await?;
            match out {
                Some(path) => {
                    std::fs::write(&path, &bytes)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Wrote {} bytes to {}", bytes.len(), path.display());
                }
                None => println!("{}", hex::encode(&bytes)),
            }
        }

        Commands::Status { model_id } => match model_id {
            Some(model_id) => {
                let artifact = manager
                    .artifact(&model_id)
                    .await?
                    .ok_or_else(|| anyhow!("model not found: {}", model_id))?;

                println!("{}", "Model".bold().cyan());
                println!("  ID:       {}", artifact.model_id);
                println!("  Name:     {}", artifact.name);
                println!("  Version:  {}", artifact.version);
                println!("  Format:   {}", artifact.format);
                println!("  Kind:     {}", artifact.kind);
                println!("  State:    {}", artifact.state.to_string().yellow());
                println!("  Size:     {} bytes", artifact.total_size_bytes);
                println!("  Chunks:   {}", artifact.total_chunks);
                println!("  SHA-256:  {}", artifact.content_hash);
            }
            None => {
                let store = FsStore::new(manager.config().store_dir())?;
                let models = store.list_models().await?;
                if models.is_empty() {
                    println!("No models registered");
                } else {
                    println!("{}", "Registered models".bold().cyan());
                    for artifact in models {
                        println!(
                            "  {}  {}  {}  {}",
                            artifact.model_id,
                            artifact.name,
                            artifact.version,
                            artifact.state.to_string().yellow()
                        );
                    }
                }
            }
        },
    }

    Ok(())
}
