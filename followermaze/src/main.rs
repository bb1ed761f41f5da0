mod http;
mod server;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use followermaze_core::{logging, Config};

use server::FollowerMazeServer;

#[derive(Parser, Debug)]
#[command(name = "followermaze")]
#[command(about = "Follower Maze event resequencing and fan-out server", long_about = None)]
struct Args {
    /// Path to a YAML or TOML config file
    #[arg(short, long, env = "FOLLOWERMAZE_CONFIG")]
    config: Option<String>,

    /// Port clients connect to
    #[arg(long)]
    client_port: Option<u16>,

    /// Port the event source connects to
    #[arg(long)]
    event_source_port: Option<u16>,

    /// Port serving Prometheus metrics
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Per-client delivery queue depth
    #[arg(long)]
    queue_depth: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    /// Command line flags win over file and environment settings
    fn apply(&self, config: &mut Config) {
        if let Some(port) = self.client_port {
            config.server.client_port = port;
        }
        if let Some(port) = self.event_source_port {
            config.server.event_source_port = port;
        }
        if let Some(port) = self.metrics_port {
            config.server.metrics_port = port;
        }
        if let Some(depth) = self.queue_depth {
            config.hub.client_queue_depth = depth;
        }
        if let Some(level) = &self.log_level {
            config.logging.level.clone_from(level);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load configuration
    let mut config = Config::load(args.config.as_deref())?;
    args.apply(&mut config);

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
    info!("Follower Maze server starting...");
    info!("Client address: {}", config.client_address());
    info!("Event source address: {}", config.event_source_address());

    // 3. Run until shutdown
    FollowerMazeServer::new(config).start().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "followermaze",
            "--client-port",
            "7000",
            "--queue-depth",
            "8",
            "--log-level",
            "debug",
        ]);
        let mut config = Config::default();

        args.apply(&mut config);

        assert_eq!(config.server.client_port, 7000);
        assert_eq!(config.server.event_source_port, 9090);
        assert_eq!(config.hub.client_queue_depth, 8);
        assert_eq!(config.logging.level, "debug");
    }
}
