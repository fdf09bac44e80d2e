//! CLI entry point for the module broker
//!
//! Provides:
//! - `daemon`: run the broker and serve the gRPC API until SIGINT/SIGTERM
//! - `client`: issue single requests against a running broker
//!
//! # Usage
//!
//! ```bash
//! module-broker daemon --config /etc/tai/mux/broker.toml --port 50051
//! module-broker client list
//! module-broker client create 3
//! module-broker client remove 0x1
//! ```

use anyhow::{Context, Result};
use broker_client::{BrokerClient, ServerAddress};
use broker_core::config::{BrokerConfig, DEFAULT_CONFIG_PATH};
use broker_core::types::Oid;
use broker_hardware::ModuleRegistry;
use broker_server::BrokerServer;
use clap::{Parser, Subcommand};
use module_broker::logging;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "module-broker")]
#[command(about = "Multiplexes transponder modules onto vendor backends", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the broker daemon
    Daemon {
        /// Configuration file (TOML). Missing files fall back to defaults and env.
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// gRPC port, overriding `server.port`
        #[arg(long)]
        port: Option<u16>,

        /// Bind address, overriding `server.bind_address`
        #[arg(long)]
        bind: Option<IpAddr>,

        /// Probe executable, overriding `platform.probe_path`
        #[arg(long)]
        probe: Option<PathBuf>,
    },

    /// Talk to a running daemon
    #[command(subcommand)]
    Client(ClientCommands),
}

#[derive(Subcommand)]
enum ClientCommands {
    /// Enumerate modules and their backends
    List {
        #[command(flatten)]
        target: Target,
    },
    /// Create a session for a location
    Create {
        /// Location key as printed by `list`
        location: String,
        #[command(flatten)]
        target: Target,
    },
    /// Remove a session
    Remove {
        /// Session oid (decimal or 0x-prefixed hex)
        #[arg(value_parser = parse_oid)]
        oid: Oid,
        #[command(flatten)]
        target: Target,
    },
    /// Show one session
    Info {
        /// Session oid (decimal or 0x-prefixed hex)
        #[arg(value_parser = parse_oid)]
        oid: Oid,
        #[command(flatten)]
        target: Target,
    },
    /// Show all live sessions
    Sessions {
        #[command(flatten)]
        target: Target,
    },
    /// Drop cached discovery results
    ResetDiscovery {
        #[command(flatten)]
        target: Target,
    },
    /// Show broker identity and health
    Broker {
        #[command(flatten)]
        target: Target,
    },
}

#[derive(clap::Args)]
struct Target {
    /// Broker address (`host:port` or `http://host:port`).
    /// Defaults to MODULE_BROKER_SERVER_ADDRESS/PORT, then 127.0.0.1:50051.
    #[arg(long)]
    addr: Option<ServerAddress>,
}

impl Target {
    async fn connect(self) -> Result<BrokerClient> {
        let address = match self.addr {
            Some(address) => address,
            None => ServerAddress::from_env()?,
        };
        BrokerClient::connect(&address)
            .await
            .with_context(|| format!("cannot reach module broker at {}", address))
    }
}

fn parse_oid(raw: &str) -> Result<Oid, String> {
    let raw = raw.trim();
    let value = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => raw.parse(),
    };
    value
        .map(Oid::new)
        .map_err(|e| format!("invalid oid '{}': {}", raw, e))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Daemon {
            config,
            port,
            bind,
            probe,
        } => run_daemon(config, port, bind, probe).await,
        Commands::Client(cmd) => {
            logging::init(logging::TracingConfig::new(tracing::Level::WARN))
                .map_err(anyhow::Error::msg)?;
            handle_client_command(cmd).await
        }
    }
}

async fn run_daemon(
    config_path: PathBuf,
    port: Option<u16>,
    bind: Option<IpAddr>,
    probe: Option<PathBuf>,
) -> Result<()> {
    let mut config = BrokerConfig::load_from(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(bind) = bind {
        config.server.bind_address = bind;
    }
    if let Some(probe) = probe {
        config.platform.probe_path = probe;
    }
    config.validate().map_err(anyhow::Error::msg)?;

    logging::init_from_config(&config.logging).map_err(anyhow::Error::msg)?;
    tracing::info!(
        adapter = %config.platform.adapter,
        probe = %config.platform.probe_path.display(),
        "starting module broker"
    );

    let registry = Arc::new(ModuleRegistry::from_config(&config)?);
    let listener = BrokerServer::bind(&config.server).await?;
    let server = BrokerServer::new(registry, &config.server);

    server.serve_with_shutdown(listener, shutdown_signal()).await?;
    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

async fn handle_client_command(cmd: ClientCommands) -> Result<()> {
    match cmd {
        ClientCommands::List { target } => {
            let client = target.connect().await?;
            let modules = client.list().await?;
            for module in modules.iter() {
                println!("{}\t{}", module.location, module.backend);
            }
        }
        ClientCommands::Create { location, target } => {
            let client = target.connect().await?;
            let session = client.create_module(location).await?;
            println!("{}", session.oid);
        }
        ClientCommands::Remove { oid, target } => {
            let client = target.connect().await?;
            client.remove(oid).await?;
            println!("removed {}", oid);
        }
        ClientCommands::Info { oid, target } => {
            let client = target.connect().await?;
            let info = client.get_module(oid).await?;
            let session = info.session;
            println!("oid:        {}", session.oid);
            println!("location:   {}", session.location);
            println!("backend:    {}", session.backend);
            println!("handle:     {}", session.backend_handle.id);
            println!("adapter:    {}", info.adapter);
            println!("created at: {}", session.created_at.to_rfc3339());
        }
        ClientCommands::Sessions { target } => {
            let client = target.connect().await?;
            for session in client.list_sessions().await? {
                println!(
                    "{}\t{}\t{}\t{}",
                    session.oid,
                    session.location,
                    session.backend,
                    session.created_at.to_rfc3339()
                );
            }
        }
        ClientCommands::ResetDiscovery { target } => {
            let client = target.connect().await?;
            client.reset_discovery().await?;
            println!("discovery cache cleared");
        }
        ClientCommands::Broker { target } => {
            let client = target.connect().await?;
            let status = client.broker_info().await?;
            let serving = client.is_serving().await?;
            println!("instance:   {}", status.instance_id);
            println!("version:    {}", status.version);
            println!("adapter:    {}", status.adapter);
            println!("started at: {}", status.started_at.to_rfc3339());
            println!("sessions:   {}", status.session_count);
            println!("serving:    {}", serving);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_oid() {
        assert_eq!(parse_oid("17").unwrap(), Oid::new(17));
        assert_eq!(parse_oid("0x1f").unwrap(), Oid::new(31));
        assert_eq!(parse_oid("0X10").unwrap(), Oid::new(16));
        assert!(parse_oid("0xzz").is_err());
        assert!(parse_oid("-1").is_err());
    }
}
