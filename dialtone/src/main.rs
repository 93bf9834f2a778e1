mod cli;
mod console;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use dialtone_core::{bootstrap::load_config, logging, Config};
use dialtone_relay::RelayServer;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration, then apply command-line overrides
    let mut config = load_config(cli.config.as_deref())?;
    cli.command.apply(&mut config);

    // 1.5. Overrides can break a valid file, check again
    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("Config validation error: {e}");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s)",
            errors.len()
        ));
    }

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;

    match cli.command {
        Command::Serve { .. } => serve(config).await,
        Command::Phone {
            call, auto_answer, ..
        } => console::run(config, call, auto_answer).await,
    }
}

async fn serve(config: Config) -> Result<()> {
    info!("Dialtone relay starting...");
    info!("Listen address: {}", config.listen_address());

    RelayServer::new(&config).run().await?;
    Ok(())
}
