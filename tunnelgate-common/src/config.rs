use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

fn _default_listen() -> SocketAddr {
    "0.0.0.0:8080".parse().expect("valid default listen address")
}

/// Immutable post-construction server configuration, loaded from YAML plus
/// `TUNNELGATE_`-prefixed environment overrides (see `tunnelgate::config`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Deterministic input to host-key generation. A fresh random key is
    /// generated when unset.
    #[serde(default)]
    pub key_seed: Option<String>,

    /// Path to the ACL file. See `tunnelgate_common::user_file`.
    #[serde(default)]
    pub user_file: Option<PathBuf>,

    /// `name:password` shorthand, merged into whatever `user_file` produces.
    #[serde(default)]
    pub single_user: Option<String>,

    /// Reverse-proxy fallback target for non-tunnel HTTP requests.
    #[serde(default)]
    pub proxy_target: Option<Url>,

    #[serde(default)]
    pub socks5_enabled: bool,

    #[serde(default = "_default_listen")]
    pub listen: SocketAddr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelgateConfig {
    #[serde(flatten)]
    pub store: ServerConfig,
}

/// Parses a `name:password` shorthand into its two halves. Fails loudly
/// rather than silently treating a malformed value as a username with an
/// empty password.
pub fn parse_single_user(spec: &str) -> Result<(String, String), String> {
    spec.split_once(':')
        .map(|(name, password)| (name.to_string(), password.to_string()))
        .ok_or_else(|| format!("single_user must be 'name:password', got {spec:?}"))
}
