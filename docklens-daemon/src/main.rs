use anyhow::Result;
use clap::Parser;

use docklens_daemon::cli::DaemonCli;
use docklens_daemon::daemon::{Daemon, load_config};
use docklens_daemon::logging::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();
    let config = load_config(&cli).await?;

    if cli.validate {
        println!("configuration OK: {}", cli.config.display());
        return Ok(());
    }

    init_tracing(&config.general)?;
    tracing::info!(
        config = %cli.config.display(),
        version = env!("CARGO_PKG_VERSION"),
        "docklens-daemon starting"
    );

    let daemon = Daemon::build(config).await?;
    daemon.run().await
}
