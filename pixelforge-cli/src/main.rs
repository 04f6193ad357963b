use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pixelforge_core::config::DEFAULT_BACKEND_URL;
use pixelforge_core::state::{DEFAULT_NEGATIVE_PROMPT, DEFAULT_PROMPT};
use pixelforge_core::{
    Backend, ClientConfig, GeneratorController, HttpBackend, ImageWriter, MockBackend, ModelKind,
    RequestStatus,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

mod render;

#[derive(Parser, Debug)]
#[command(author, version, about = "Pixel art generator client")]
struct Args {
    /// Base URL of the generation backend
    #[arg(long, env = "PIXELFORGE_BACKEND_URL", default_value = DEFAULT_BACKEND_URL)]
    backend_url: Url,

    /// Give up on requests after this many seconds (waits forever by default)
    #[arg(long)]
    timeout: Option<u64>,

    /// Use the built-in mock backend instead of talking to a server
    #[arg(long)]
    mock: bool,

    /// Simulated generation time of the mock backend, in milliseconds
    #[arg(long, default_value_t = 1500, requires = "mock")]
    mock_latency: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the checkpoints and LoRAs the backend offers
    Models,

    /// Generate images from a prompt
    Generate {
        #[arg(short, long, default_value = DEFAULT_PROMPT)]
        prompt: String,

        #[arg(short, long, default_value = DEFAULT_NEGATIVE_PROMPT)]
        negative_prompt: String,

        /// Checkpoint model to generate with
        #[arg(short, long)]
        checkpoint: Option<String>,

        /// Optional LoRA applied on top of the checkpoint
        #[arg(short, long)]
        lora: Option<String>,

        /// Save the generated images into this directory
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if args.mock {
        info!("using mock backend");
        let backend = MockBackend::new().with_latency(Duration::from_millis(args.mock_latency));
        run(backend, ImageWriter::default(), args.command).await
    } else {
        let mut config = ClientConfig::new(args.backend_url);
        if let Some(secs) = args.timeout {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        info!(url = %config.base_url(), "using backend");
        let backend = HttpBackend::new(config).context("failed to build http client")?;
        let writer = backend.image_writer();
        run(backend, writer, args.command).await
    }
}

async fn run<B: Backend>(backend: B, writer: ImageWriter, command: Command) -> Result<ExitCode> {
    let controller = GeneratorController::new(backend);
    let progress = tokio::spawn(render::progress(controller.subscribe()));

    controller.load_models().await;
    let code = match command {
        Command::Models => {
            let state = controller.state();
            render::catalog(&state);
            if state.models_error.is_some() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Command::Generate {
            prompt,
            negative_prompt,
            checkpoint,
            lora,
            output_dir,
        } => {
            generate(
                &controller,
                &writer,
                Selection {
                    prompt,
                    negative_prompt,
                    checkpoint,
                    lora,
                },
                output_dir,
            )
            .await?
        }
    };

    drop(controller);
    progress.await.ok();
    Ok(code)
}

struct Selection {
    prompt: String,
    negative_prompt: String,
    checkpoint: Option<String>,
    lora: Option<String>,
}

async fn generate<B: Backend>(
    controller: &GeneratorController<B>,
    writer: &ImageWriter,
    selection: Selection,
    output_dir: Option<PathBuf>,
) -> Result<ExitCode> {
    let state = controller.state();
    if let Some(error) = &state.models_error {
        eprintln!("{error}");
    }

    controller.set_prompt(selection.prompt);
    controller.set_negative_prompt(selection.negative_prompt);
    if let Some(checkpoint) = selection.checkpoint {
        if !state.catalog.contains(ModelKind::Checkpoints, &checkpoint) {
            warn!(%checkpoint, "checkpoint is not in the backend catalog");
        }
        controller.select_checkpoint(checkpoint);
    }
    if let Some(lora) = selection.lora {
        if !lora.is_empty() && !state.catalog.contains(ModelKind::Loras, &lora) {
            warn!(%lora, "LoRA is not in the backend catalog");
        }
        controller.select_lora(lora);
    }

    if !controller.state().generate_enabled() || !controller.generate().await {
        eprintln!("Select a checkpoint and enter a prompt to generate.");
        if !state.catalog.checkpoints.is_empty() {
            eprintln!("Available checkpoints:");
            for checkpoint in &state.catalog.checkpoints {
                eprintln!("  {checkpoint}");
            }
        }
        return Ok(ExitCode::FAILURE);
    }

    let state = controller.state();
    render::results(&state);

    if let (Some(dir), RequestStatus::Succeeded) = (output_dir, state.status()) {
        let paths = writer
            .save_all(&state.images, &dir)
            .await
            .with_context(|| format!("failed to save images to {}", dir.display()))?;
        for path in paths {
            println!("Saved {}", path.display());
        }
    }

    Ok(match state.status() {
        RequestStatus::Succeeded => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}
