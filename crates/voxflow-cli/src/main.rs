use std::sync::Arc;

use clap::{Parser, Subcommand};

use voxflow_core::config::{Config, ServerConfig};
use voxflow_server::metrics::install_prometheus_recorder;
use voxflow_server::{start_server, AppState};

#[derive(Parser)]
#[command(
    name = "voxflow",
    about = "Real-time voice assistant server — VAD, streaming STT/LLM/TTS over a single WebSocket",
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
    /// Start the voice server
    Serve {
        /// Port to listen on (default: 8080, or the PORT env var)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show system status
    Status,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Check the configuration for problems
    Validate,
}

fn init_logging(config: &Config, verbose: bool) {
    let logging = config.logging.clone();
    let default_level = if verbose {
        "debug".to_string()
    } else {
        logging
            .as_ref()
            .and_then(|l| l.level.clone())
            .unwrap_or_else(|| "info".to_string())
    };

    let mut filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&default_level));
    if let Some(logging) = &logging {
        for directive in &logging.filters {
            if let Ok(d) = directive.parse() {
                filter = filter.add_directive(d);
            }
        }
    }

    let json = logging.as_ref().is_some_and(|l| l.format == "json");
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(std::path::PathBuf::from)
        .unwrap_or_else(Config::config_path);

    let mut config = Config::load(&config_path)?;
    init_logging(&config, cli.verbose);

    match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                let bind = config.server.take().and_then(|s| s.bind);
                config.server = Some(ServerConfig { port, bind });
            }

            let (warnings, errors) = config.validate();
            for w in &warnings {
                tracing::warn!("{w}");
            }
            if !errors.is_empty() {
                for e in &errors {
                    tracing::error!("{e}");
                }
                anyhow::bail!("Invalid configuration");
            }

            let prometheus = install_prometheus_recorder();
            let state = Arc::new(AppState::from_config(Arc::new(config), prometheus));
            start_server(state).await?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let json = serde_json::to_string_pretty(&config)?;
                println!("{json}");
            }
            ConfigAction::Validate => {
                let (warnings, errors) = config.validate();
                for w in &warnings {
                    println!("warning: {w}");
                }
                for e in &errors {
                    println!("error: {e}");
                }
                if errors.is_empty() {
                    println!("Configuration OK");
                } else {
                    anyhow::bail!("Invalid configuration");
                }
            }
        },
        Commands::Status => {
            println!("Voxflow v{}", env!("CARGO_PKG_VERSION"));
            println!("Config: {}", config_path.display());
            println!("Port: {}", config.server_port());
            println!("STT model: {}", config.stt_model());
            println!("LLM model: {}", config.llm_model());
            println!("Language: {}", config.language());
        }
    }

    Ok(())
}
