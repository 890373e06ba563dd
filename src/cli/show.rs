use crate::config::Config;
use crate::error::Result;
use clap::Subcommand;
use tracing::info;

#[derive(Subcommand, Debug)]
pub enum ShowResource {
    /// Show configuration, state and cache paths
    Paths,
}

impl ShowResource {
    pub async fn execute(&self) -> Result<()> {
        match self {
            ShowResource::Paths => show_paths(),
        }
    }
}

fn show_paths() -> Result<()> {
    info!(path = ?Config::config_file()?, "Config path");
    info!(path = ?Config::state_file()?, "State path");
    info!(path = ?Config::cache_dir()?, "Cache path");

    Ok(())
}
