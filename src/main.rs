//! tuku - tail a file and stream matching lines over WebSocket.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tuku::config::{ConfigLoader, ConfigOverrides, TukuConfig};
use tuku::display;
use tuku::error::TukuError;

/// Exit status for every fatal error.
const EXIT_FAILURE: u8 = 2;

#[derive(Parser)]
#[command(
    name = "tuku",
    about = "Tail a file and stream matching lines to WebSocket clients",
    version
)]
struct Cli {
    /// A file to tail.
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// A case-insensitive pattern to match (empty streams every line).
    #[arg(long)]
    filter: Option<String>,

    /// Port to bind to (values below 10 use the default, 8082).
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind to.
    #[arg(long)]
    host: Option<String>,

    /// Number of matching lines to keep for new subscribers.
    #[arg(short, long)]
    items: Option<usize>,

    /// Message sent to each subscriber when it connects.
    #[arg(long)]
    greeting: Option<String>,

    /// Existing lines of the file to replay on start (default 10).
    #[arg(long)]
    tail_lines: Option<usize>,

    /// Config file (defaults to .tuku.toml, then the user config dir).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            file: self.file.clone(),
            filter: self.filter.clone(),
            port: self.port,
            host: self.host.clone(),
            items: self.items,
            greeting: self.greeting.clone(),
            tail_lines: self.tail_lines,
        }
    }
}

fn init_tracing(verbosity: u8) {
    // Every line read is logged at info, so info is the floor.
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

fn load_config(cli: &Cli) -> Result<TukuConfig, TukuError> {
    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_path(path)?,
        None => ConfigLoader::new().load()?,
    };
    Ok(config.with_overrides(cli.overrides()))
}

async fn run(cli: Cli) -> Result<(), TukuError> {
    let config = load_config(&cli)?;
    let cancel = CancellationToken::new();

    let running = tuku::app::start(&config, cancel.clone()).await?;
    display::print_banner(
        running.local_addr(),
        &running.info().source,
        &running.info().pattern,
    );

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl-C, shutting down");
            cancel.cancel();
        }
    });

    running.wait().await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            display::print_error(&e.to_string());
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
