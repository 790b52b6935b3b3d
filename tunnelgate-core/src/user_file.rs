use std::path::Path;

use serde::Deserialize;
use tunnelgate_common::{TunnelgateError, User, UserTable};

#[derive(Deserialize)]
struct UserFileEntry {
    name: String,
    password: String,
    #[serde(default)]
    allow: Vec<String>,
}

/// Parses the ACL file into a `UserTable`. The file is a YAML list of
/// `{name, password, allow}` entries, `allow` being regexes matched against
/// `host:port` (or the literal `socks`).
pub fn load_user_file(path: &Path) -> Result<UserTable, TunnelgateError> {
    let raw = std::fs::read_to_string(path)?;
    let entries: Vec<UserFileEntry> = serde_yaml::from_str(&raw)
        .map_err(|e| TunnelgateError::ConfigInvalid(format!("user file: {e}")))?;
    let users = entries
        .into_iter()
        .map(|e| User::new(e.name, e.password, e.allow))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TunnelgateError::ConfigInvalid(format!("user file: {e}")))?;
    Ok(UserTable::new(users))
}
