use std::sync::Arc;

use russh::keys::PrivateKey;
use tunnelgate_common::{ServerConfig, UserTable};

use crate::session_binding::SessionBindings;

/// Everything a protocol server needs, constructed once at startup and
/// shared read-only (bar the session binding map) across every accepted
/// connection.
#[derive(Clone)]
pub struct Services {
    pub config: Arc<ServerConfig>,
    pub user_table: Arc<UserTable>,
    pub sessions: SessionBindings,
    pub host_key: Arc<PrivateKey>,
    pub fingerprint: Arc<str>,
}

impl Services {
    pub fn new(
        config: ServerConfig,
        user_table: UserTable,
        host_key: PrivateKey,
        fingerprint: String,
    ) -> Self {
        Self {
            config: Arc::new(config),
            user_table: Arc::new(user_table),
            sessions: SessionBindings::default(),
            host_key: Arc::new(host_key),
            fingerprint: Arc::from(fingerprint.into_boxed_str()),
        }
    }
}
