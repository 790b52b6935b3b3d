use std::path::Path;

use anyhow::Context;
use config::{Config, Environment, FileFormat};
use tunnelgate_common::{ServerConfig, TunnelgateConfig, TunnelgateError};

/// Loads `ServerConfig` from a YAML file at `path` (a missing file is fine,
/// every field has a default) layered with `TUNNELGATE_`-prefixed
/// environment overrides, e.g. `TUNNELGATE_SOCKS5_ENABLED=true`.
pub fn load_config(path: &Path) -> anyhow::Result<TunnelgateConfig> {
    let store: ServerConfig = Config::builder()
        .add_source(
            config::File::new(&path.to_string_lossy(), FileFormat::Yaml).required(false),
        )
        .add_source(Environment::with_prefix("TUNNELGATE").try_parsing(true))
        .build()
        .context("loading configuration")?
        .try_deserialize()
        .map_err(|e| TunnelgateError::ConfigInvalid(e.to_string()))?;

    Ok(TunnelgateConfig { store })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_uses_defaults() {
        let config = load_config(Path::new("/nonexistent/tunnelgate-config.yaml")).unwrap();
        assert!(!config.store.socks5_enabled);
        assert!(config.store.proxy_target.is_none());
    }

    #[test]
    fn malformed_proxy_target_is_config_invalid() {
        let path = std::env::temp_dir().join("tunnelgate-config-test-bad-url.yaml");
        std::fs::write(&path, "proxy_target: \"not a url\"\n").unwrap();
        let result = load_config(&path);
        std::fs::remove_file(&path).ok();
        assert!(result.is_err());
    }

    #[test]
    fn env_override_takes_effect() {
        std::env::set_var("TUNNELGATE_SOCKS5_ENABLED", "true");
        let config = load_config(Path::new("/nonexistent/tunnelgate-config.yaml")).unwrap();
        std::env::remove_var("TUNNELGATE_SOCKS5_ENABLED");
        assert!(config.store.socks5_enabled);
    }
}
