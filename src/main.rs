mod auth;
mod cleanup;
mod config;
mod dates;
mod error;
mod output;
mod resolver;
mod session;
mod telegram;
mod web;

use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, ConfigSummary};
use crate::session::SessionStore;
use crate::telegram::ClientFactory;

#[derive(Parser)]
#[command(
    name = "tg-cleaner",
    version,
    about = "Web panel that removes Telegram join/leave service messages",
    after_help = "Examples:\n  tg-cleaner serve --port 8080\n  SESSION_STRING=... tg-cleaner serve\n  tg-cleaner doctor --json"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Run the web panel (default)")]
    Serve(ServeArgs),
    #[command(about = "Print the effective configuration")]
    Doctor(DoctorArgs),
}

#[derive(Args, Default)]
struct ServeArgs {
    #[arg(long, help = "Address to bind (overrides TG_CLEANER_HOST)")]
    host: Option<String>,

    #[arg(long, help = "Port to listen on (overrides PORT)")]
    port: Option<u16>,
}

#[derive(Args)]
struct DoctorArgs {
    #[arg(long, help = "Output JSON instead of text")]
    json: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DoctorReport {
    version: &'static str,
    backend: &'static str,
    cfg: ConfigSummary,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("{error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut config = Config::load();
    init_tracing(&config);

    match cli.command.unwrap_or(Command::Serve(ServeArgs::default())) {
        Command::Doctor(args) => {
            let report = DoctorReport {
                version: env!("CARGO_PKG_VERSION"),
                backend: telegram::BACKEND,
                cfg: config.summary(),
            };
            if args.json {
                output::print_json(&report, true)?;
            } else {
                println!("tg-cleaner {}", report.version);
                println!("backend: {}", report.backend);
                println!("listen: {}", config.bind_address());
                println!("session seeded: {}", report.cfg.session_seeded);
                println!("log filter: {}", report.cfg.log_filter);
            }
        }
        Command::Serve(args) => {
            if let Some(host) = args.host {
                config.host = host;
            }
            if let Some(port) = args.port {
                config.port = port;
            }
            serve(config).await?;
        }
    }

    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let factory = client_factory()?;
    let store = SessionStore::new(config.session_string.clone());
    if store.record().serialized_session.is_some() {
        info!("serialized session loaded from SESSION_STRING");
    }
    let app = web::router(web::Panel::new(store, factory));

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!(%address, backend = telegram::BACKEND, "panel listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

#[cfg(feature = "grammers")]
fn client_factory() -> Result<Arc<dyn ClientFactory>, Box<dyn std::error::Error>> {
    Ok(Arc::new(telegram::grammers::GrammersFactory))
}

#[cfg(not(feature = "grammers"))]
fn client_factory() -> Result<Arc<dyn ClientFactory>, Box<dyn std::error::Error>> {
    Err("tg-cleaner was built without a Telegram backend; rebuild with `--features grammers`".into())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}
