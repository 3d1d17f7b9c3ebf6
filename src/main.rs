use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use swerve_zenoh_runtime::config::SwerveConfig;

#[derive(Parser, Debug)]
#[command(name = "swerve-zenoh-runtime", about = "Swerve drivetrain control loop over Zenoh")]
struct Args {
    /// JSON drivetrain configuration; built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let config = match args.config {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            match SwerveConfig::load(&path) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Invalid configuration {}: {}", path.display(), e);
                    std::process::exit(2);
                }
            }
        }
        None => SwerveConfig::default(),
    };

    if let Err(e) = swerve_zenoh_runtime::runtime::run(config).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
