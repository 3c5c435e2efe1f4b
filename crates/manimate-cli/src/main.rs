//! Manimate CLI
//!
//! Runs the HTTP service, or a single prompt-to-video generation from the
//! command line.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use manimate_render::Quality;
use manimate_server::{
    create_router, AppState, CodeSynthesizer, Config, ErrorReport, FixedSynthesizer,
    GeminiSynthesizer, GenerationRequest, Pipeline,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Manimate - prompt-to-animation generator
///
/// Turns natural-language descriptions into Manim animations and publishes
/// the rendered videos.
#[derive(Parser, Debug)]
#[command(name = "manimate")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: manimate.json in current directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API server
    Serve {
        /// Address to bind (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Generate and publish a single animation
    Render {
        /// Description of the animation
        #[arg(long)]
        prompt: String,

        /// Name of the published video, without extension
        #[arg(short, long)]
        output_name: String,

        /// Resolution tier: l, m or h (unrecognized values mean low)
        #[arg(short, long, default_value = "l", value_parser = parse_quality)]
        quality: Quality,

        /// Render this scene file instead of generating code from the prompt
        #[arg(long, value_name = "FILE")]
        scene_file: Option<PathBuf>,
    },
}

#[allow(clippy::unnecessary_wraps)]
fn parse_quality(value: &str) -> Result<Quality, String> {
    Ok(Quality::from_str_lenient(value))
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::debug!(config = ?args.config, "Config file");

    let result = match args.command {
        Command::Serve { host, port } => serve(args.config.as_deref(), host, port).await,
        Command::Render {
            prompt,
            output_name,
            quality,
            scene_file,
        } => {
            let request = GenerationRequest::new(prompt, output_name).with_quality(quality);
            render_once(args.config.as_deref(), request, scene_file.as_deref()).await
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

/// Starts the HTTP server and runs until Ctrl+C.
async fn serve(
    config_path: Option<&str>,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<ExitCode> {
    let mut config = load_config(config_path)?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config.validate()?;

    print_config(&config);
    config.ensure_directories().await?;

    let synthesizer = GeminiSynthesizer::from_env(&config.synthesizer).map_err(|e| {
        anyhow::anyhow!("{e}\n\nSuggestion: Export an API key, or use `manimate render --scene-file` to render an existing scene")
    })?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| {
            anyhow::anyhow!(
                "Invalid bind address '{}:{}': {e}",
                config.server.host,
                config.server.port
            )
        })?;

    let router = create_router(AppState::new(config, Arc::new(synthesizer)));
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port"
        )
    })?;

    println!();
    println!("Manimate API running on http://{addr}");
    println!("Press Ctrl+C to stop");
    tracing::info!(%addr, "HTTP server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP server stopped");
    Ok(ExitCode::SUCCESS)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received Ctrl+C, shutting down");
}

/// Runs one generation and prints the outcome or error report as JSON.
async fn render_once(
    config_path: Option<&str>,
    request: GenerationRequest,
    scene_file: Option<&Path>,
) -> anyhow::Result<ExitCode> {
    let config = load_config(config_path)?;
    config.ensure_directories().await?;

    let synthesizer: Arc<dyn CodeSynthesizer> = match scene_file {
        Some(path) => {
            let source = tokio::fs::read_to_string(path).await.map_err(|e| {
                anyhow::anyhow!("Failed to read scene file '{}': {e}", path.display())
            })?;
            Arc::new(FixedSynthesizer::new(source))
        }
        None => Arc::new(GeminiSynthesizer::from_env(&config.synthesizer)?),
    };

    let pipeline = Pipeline::new(Arc::new(config), synthesizer);
    match pipeline.generate(request).await {
        Ok(outcome) => {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            let report = ErrorReport::from(&err);
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(ExitCode::from(exit_code_for(&report)))
        }
    }
}

/// Maps an error report to a process exit code.
const fn exit_code_for(report: &ErrorReport) -> u8 {
    match report.kind {
        manimate_server::ErrorKind::ClientError => 2,
        manimate_server::ErrorKind::RendererDefect => 3,
        manimate_server::ErrorKind::Timeout => 4,
        manimate_server::ErrorKind::ServerError => 1,
    }
}

/// Loads configuration from the specified path or default location.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

/// Prints the loaded configuration.
fn print_config(config: &Config) {
    println!("Configuration loaded:");
    println!("  Generated sources: {}", config.generated_dir);
    println!("  Render output: {}", config.output_dir);
    println!("  Published videos: {}", config.public_dir);
    println!("  Renderer: {}", config.renderer.program);
    println!("  Render timeout: {}s", config.renderer.timeout_seconds);
    println!("  Model: {}", config.synthesizer.model);
}
