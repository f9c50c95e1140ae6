//! Car Profile Proxy - Teslamate API mock with car profile injection
//!
//! Proxies requests to a real Teslamate API instance and overlays car
//! specific information (model, trim badging, paint, wheels, ...) from a
//! JSON profile file onto the car endpoints.

use car_profile_proxy::{Config, ConfigOverrides, ProxyResult, ProxyServer};

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Car Profile Proxy - injects car profiles into Teslamate API responses
#[derive(Parser)]
#[command(name = "car-profile-proxy")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// TOML config file ([proxy] and [profiles] tables)
    #[arg(long, global = true, env = "CAR_PROXY_CONFIG")]
    config: Option<PathBuf>,

    /// Car profiles JSON file (default: cars.json)
    #[arg(long, global = true, env = "CAR_PROXY_CARS_FILE")]
    cars_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the proxy server
    Start {
        /// Upstream Teslamate API URL (e.g. http://localhost:4000)
        #[arg(short, long, env = "CAR_PROXY_UPSTREAM")]
        upstream: Option<String>,

        /// Car profile name from the profiles file
        #[arg(short, long, env = "CAR_PROXY_CAR")]
        car: Option<String>,

        /// Port to listen on (default: 4001)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (default: 127.0.0.1)
        #[arg(long)]
        host: Option<String>,

        /// Upstream request timeout in milliseconds (default: 30000)
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// List available car profiles
    Profiles,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Setup logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    if let Err(e) = run_command(cli).await {
        error!("{}", e.display_for_user());
        std::process::exit(1);
    }
}

async fn run_command(cli: Cli) -> ProxyResult<()> {
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Start {
            upstream,
            car,
            port,
            host,
            timeout_ms,
        } => {
            config.apply(ConfigOverrides {
                upstream_url: upstream,
                host,
                port,
                upstream_timeout_ms: timeout_ms,
                cars_file: cli.cars_file,
                car,
            });
            cmd_start(config).await
        }
        Commands::Profiles => {
            config.apply(ConfigOverrides {
                cars_file: cli.cars_file,
                ..Default::default()
            });
            cmd_profiles(config)
        }
    }
}

/// Start the proxy and run until Ctrl-C
async fn cmd_start(config: Config) -> ProxyResult<()> {
    let settings = config.resolve()?;
    let server = Arc::new(ProxyServer::new(settings)?);

    let settings = server.settings();
    info!("Starting Car Profile Proxy v{}", env!("CARGO_PKG_VERSION"));
    info!("  Upstream: {}", settings.upstream_url);
    info!("  Car profile: {}", settings.profile.name);
    info!(
        "  Overrides: {}",
        serde_json::to_string_pretty(&settings.profile.overrides)?
    );
    if settings.profile.overrides.is_empty() {
        info!("  Profile is empty, responses will be passed through unchanged");
    }
    info!("  Listening on: http://{}", settings.listen_addr());

    let listener = server.bind().await?;

    tokio::select! {
        result = Arc::clone(&server).serve(listener) => result,
        _ = tokio::signal::ctrl_c() => {
            info!(
                "Shutting down ({} responses rewritten)",
                server.injector().injected_count()
            );
            Ok(())
        }
    }
}

/// List available car profiles
fn cmd_profiles(mut config: Config) -> ProxyResult<()> {
    config.expand_paths();
    let profiles = config.load_profiles()?;

    if profiles.is_empty() {
        println!("No car profiles in {}", profiles.path().display());
        return Ok(());
    }

    println!("Available car profiles:");
    for profile in profiles.iter() {
        println!("  {}:", profile.name);
        println!("    {}", profile.summary());
    }

    Ok(())
}
