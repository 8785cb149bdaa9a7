use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use voxlink_core::config::Config;
use voxlink_engines::HttpEngineFactory;
use voxlink_server::{AppState, HttpIdentityVerifier, IdentityVerifier};
use voxlink_session::{LoopbackTransportFactory, NegotiationService, SessionRegistry};

#[derive(Parser)]
#[command(
    name = "voxlink",
    about = "Real-time voice agent server — WebRTC signaling and a streaming speech pipeline",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the signaling server
    Serve {
        /// Port to listen on (default: 7860)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    // Load config
    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("voxlink.json5"));
    let mut config = Config::load(&config_path)?;

    match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.server.get_or_insert_with(Default::default).port = Some(port);
            }
            let config = Arc::new(config);
            tracing::info!("Starting Voxlink on port {}", config.port());

            let registry = Arc::new(SessionRegistry::new());
            let engines = Arc::new(HttpEngineFactory::new(config.clone()));
            let transports = Arc::new(LoopbackTransportFactory::detached());
            let negotiation =
                NegotiationService::new(registry, transports, engines, config.clone());

            let verifier: Option<Arc<dyn IdentityVerifier>> = config
                .auth
                .as_ref()
                .map(|auth| Arc::new(HttpIdentityVerifier::new(auth)) as Arc<dyn IdentityVerifier>);
            if verifier.is_some() {
                tracing::info!("Bearer-token auth enabled");
            }

            let state = Arc::new(AppState::new(config, negotiation, verifier));
            voxlink_server::start_server(state).await?;
        }

        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
