//! Mockingbird - CLI Entry Point

use anyhow::Result;
use clap::Parser;
use mockingbird::server::RequestLogWriter;
use mockingbird::{FsLoader, HttpServer, MockServer, MockServerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "mockingbird",
    about = "Configuration-driven HTTP mock server",
    version
)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "mockingbird.yaml")]
    config: PathBuf,

    /// Listen address, overriding settings.listen_addr (e.g., "0.0.0.0:8080")
    #[arg(long, value_name = "ADDR")]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Print an example configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.print_config {
        let default_config = include_str!("../demos/default-config.yaml");
        println!("{}", default_config);
        return Ok(());
    }

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {:?}", args.config);
    }
    info!(path = ?args.config, "Loading configuration");
    let mut config = MockServerConfig::from_file(&args.config)?;
    if let Some(listen) = args.listen {
        config.settings.listen_addr = Some(listen);
    }

    let mock = MockServer::from_config(&config, &FsLoader)?;

    if args.validate {
        println!(
            "Configuration is valid ({} mocks defined)",
            mock.rules().len()
        );
        return Ok(());
    }

    let mut server = HttpServer::new(Arc::new(mock));
    if let Some(path) = &config.settings.request_log_path {
        info!(path = %path.display(), "Writing request log");
        server = server.with_request_log(RequestLogWriter::open(path).await?);
    }

    let listen_addr = config.settings.listen_addr()?;
    info!(addr = %listen_addr, "Starting mock server");
    server.run(listen_addr).await
}
