// Module declarations - aligned with lib.rs for consistency

pub mod cli;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod listing;
pub mod manifest;
pub mod models;
pub mod store;
pub mod tarball;

use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Execute command via command router
    match commands::execute_command(cli.command).await {
        Ok(()) => {
            info!("Command completed successfully");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Error: {}", e);
            Err(e.into())
        }
    }
}
