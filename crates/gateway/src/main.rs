//! Reference gateway binary: a `clap` CLI over a minimal `axum` server
//! exposing the `Conversation` façade as HTTP. Everything interesting —
//! the step loop, confirmation gating, condensation, stuck detection —
//! lives in `ac-conversation`; this binary only wires config, transport,
//! and logging around it.

mod api;
mod config;
mod llm_http;
mod state;

use std::sync::Arc;

use clap::{Parser, Subcommand};

use config::{load_config, Config};
use state::AppState;

#[derive(Debug, Parser)]
#[command(name = "ac-gateway", version, about = "Reference HTTP server for the agent runtime")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the HTTP server.
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        /// Reload the config file before serving (no-op beyond re-reading it once at startup).
        #[arg(long)]
        reload: bool,
    },
    /// Config inspection.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration as TOML.
    Show,
    /// Validate the effective configuration, exiting non-zero on error.
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).json().init();

    let cli = Cli::parse();
    let (mut config, config_path) = load_config()?;

    match cli.command.unwrap_or(Command::Serve { host: None, port: None, reload: false }) {
        Command::Serve { host, port, reload } => {
            if reload {
                let (reloaded, _) = load_config()?;
                config = reloaded;
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            run_server(config).await
        }
        Command::Config(ConfigCommand::Show) => {
            show_config(&config);
            Ok(())
        }
        Command::Config(ConfigCommand::Validate) => {
            if validate_config(&config, &config_path) {
                Ok(())
            } else {
                std::process::exit(1);
            }
        }
    }
}

fn show_config(config: &Config) {
    match toml::to_string_pretty(config) {
        Ok(rendered) => println!("{rendered}"),
        Err(e) => eprintln!("failed to render config: {e}"),
    }
}

fn validate_config(config: &Config, config_path: &str) -> bool {
    let issues = config.validate();
    if issues.is_empty() {
        println!("{config_path}: no issues found");
        return true;
    }
    for issue in &issues {
        println!("{issue}");
    }
    let errors = issues.iter().filter(|i| i.severity == config::ConfigSeverity::Error).count();
    errors == 0
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    let host = config.server.host.clone();
    let port = config.server.port;
    let cors_origins = config.server.cors.allowed_origins.clone();

    let state = Arc::new(AppState::new(config).await);
    let app = api::router(state);

    let cors = build_cors(&cors_origins);
    let app = app
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower::limit::ConcurrencyLimitLayer::new(64));

    let listener = tokio::net::TcpListener::bind((host.as_str(), port)).await?;
    tracing::info!(%host, port, "gateway listening");
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_cors(origins: &[String]) -> tower_http::cors::CorsLayer {
    use tower_http::cors::{AllowOrigin, CorsLayer};
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(AllowOrigin::any()).allow_methods(tower_http::cors::Any)
    } else {
        let parsed: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new().allow_origin(AllowOrigin::list(parsed)).allow_methods(tower_http::cors::Any)
    }
}
