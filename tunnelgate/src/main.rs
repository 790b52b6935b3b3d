mod config;
mod logging;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::*;
use tunnelgate_common::keys::{fingerprint, generate_key};
use tunnelgate_common::{parse_single_user, UserTable};
use tunnelgate_core::{load_user_file, Services};
use tunnelgate_protocol_http::HTTPProtocolServer;

use crate::config::load_config;

#[derive(Parser, Debug)]
#[clap(author, version, about = "TCP-over-HTTP tunnel server", long_about = None)]
struct Cli {
    /// Path to the YAML config file.
    #[clap(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Overrides the config file's `listen` address.
    #[clap(long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::install_logging();

    let cli = Cli::parse();
    let mut config = load_config(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(listen) = cli.listen {
        config.store.listen = listen;
    }

    let mut user_table = match &config.store.user_file {
        Some(path) => load_user_file(path)
            .with_context(|| format!("loading user file {}", path.display()))?,
        None => UserTable::default(),
    };
    if let Some(spec) = &config.store.single_user {
        let (name, password) = parse_single_user(spec).map_err(anyhow::Error::msg)?;
        user_table = user_table.merge(
            UserTable::single(name, password).context("building single_user table")?,
        );
    }

    let host_key = generate_key(config.store.key_seed.as_deref())
        .context("generating host key")?;
    let host_fingerprint = fingerprint(&host_key).context("computing host key fingerprint")?;

    let listen = config.store.listen;
    let services = Services::new(config.store, user_table, host_key, host_fingerprint.clone());

    info!("--------------------------------------------");
    info!(fingerprint = %host_fingerprint, "Tunnelgate starting");
    info!(
        auth = if services.user_table.is_empty() { "disabled" } else { "enabled" },
        "Authentication"
    );
    info!(
        reverse_proxy = %services.config.proxy_target.as_ref().map(|u| u.to_string()).unwrap_or_else(|| "disabled".to_string()),
        "Reverse proxy fallback"
    );
    info!(
        socks5 = services.config.socks5_enabled,
        "SOCKS5 channels"
    );
    info!(%listen, "Listening");
    info!("--------------------------------------------");

    let server = HTTPProtocolServer::new(services);

    tokio::select! {
        result = server.run(listen) => {
            result.context("HTTP server")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C, shutting down");
        }
    }

    info!("Exiting");
    Ok(())
}
