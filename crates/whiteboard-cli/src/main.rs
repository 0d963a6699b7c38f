use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

use whiteboard_core::config::{Config, LoggingConfig, ServerConfig};

#[derive(Parser)]
#[command(
    name = "whiteboard",
    about = "Collaborative whiteboard server speaking a line-based TCP protocol",
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
    /// Start the whiteboard server
    Serve {
        /// Port to listen on (default: 4444)
        #[arg(long)]
        port: Option<u16>,

        /// Address to bind (default: 0.0.0.0)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show configuration summary and whether a server answers locally
    Status,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Check the configuration for problems
    Validate,
}

/// Level used when neither `RUST_LOG` nor the config says otherwise.
fn base_level(verbose: bool, logging: &LoggingConfig) -> String {
    if verbose {
        "debug".to_string()
    } else {
        logging.level.clone().unwrap_or_else(|| "info".to_string())
    }
}

fn build_filter(verbose: bool, logging: &LoggingConfig) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let mut filter = EnvFilter::new(base_level(verbose, logging));
    for directive in &logging.filters {
        match directive.parse::<Directive>() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => eprintln!("Ignoring log filter {directive:?}: {e}"),
        }
    }
    filter
}

fn init_logging(verbose: bool, logging: &LoggingConfig) {
    let filter = build_filter(verbose, logging);
    let writer = if logging.output == "stdout" {
        BoxMakeWriter::new(std::io::stdout)
    } else {
        BoxMakeWriter::new(std::io::stderr)
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(Config::config_path);

    let mut config = Config::load(&config_path)?;

    init_logging(cli.verbose, &config.logging.clone().unwrap_or_default());

    match cli.command {
        Commands::Serve { port, bind } => {
            if port.is_some() || bind.is_some() {
                let server = config.server.get_or_insert_with(|| ServerConfig {
                    port: whiteboard_core::protocol::DEFAULT_PORT,
                    bind: None,
                });
                if let Some(port) = port {
                    server.port = port;
                }
                if bind.is_some() {
                    server.bind = bind;
                }
            }

            let (warnings, errors) = config.validate();
            for warning in &warnings {
                tracing::warn!("{warning}");
            }
            if !errors.is_empty() {
                for error in &errors {
                    tracing::error!("{error}");
                }
                anyhow::bail!("Invalid configuration in {}", config_path.display());
            }

            let (width, height) = config.canvas_size();
            tracing::info!(
                port = config.port(),
                width,
                height,
                "Starting whiteboard server"
            );
            let state = whiteboard_server::ServerState::new(config);
            whiteboard_server::start_server(state).await?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let json = serde_json::to_string_pretty(&config)?;
                println!("{json}");
            }
            ConfigAction::Validate => {
                let (warnings, errors) = config.validate();
                for warning in &warnings {
                    println!("warning: {warning}");
                }
                for error in &errors {
                    println!("error: {error}");
                }
                if !errors.is_empty() {
                    anyhow::bail!("{} error(s) in {}", errors.len(), config_path.display());
                }
                println!("Config OK: {}", config_path.display());
            }
        },
        Commands::Status => {
            let port = config.port();
            let (width, height) = config.canvas_size();
            println!("Whiteboard v{}", env!("CARGO_PKG_VERSION"));
            println!("Config: {}", config_path.display());
            println!("Listen: {}:{port}", config.bind());
            println!("Canvas: {width}x{height}");

            let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
            let probe = tokio::time::timeout(
                Duration::from_secs(1),
                tokio::net::TcpStream::connect(addr),
            )
            .await;
            match probe {
                Ok(Ok(_)) => println!("Status: running"),
                _ => println!("Status: not running"),
            }
        }
    }

    Ok(())
}
