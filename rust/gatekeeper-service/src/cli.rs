use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use gatekeeper_policy::{GatekeeperConfig, InitializationError};

#[derive(Debug, Parser)]
#[command(name = "gatekeeper")]
#[command(bin_name = "gatekeeper")]
#[command(about = "Authorizes and signs storage requests for untrusted clients", long_about = None)]
pub struct GatekeeperCli {
    /// JSON file selecting the policy components.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to listen on.
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    pub listen: SocketAddr,

    /// Route the gatekeeper is served at.
    #[arg(short, long, default_value = "/gatekeeper")]
    pub path: String,

    /// Log as JSON lines.
    #[arg(long)]
    pub json_logs: bool,
}

impl GatekeeperCli {
    /// Load the configuration file, or the defaults when none was given.
    pub fn load_config(&self) -> Result<GatekeeperConfig, InitializationError> {
        match &self.config {
            Some(path) => GatekeeperConfig::load(path),
            None => Ok(GatekeeperConfig::default()),
        }
    }
}
