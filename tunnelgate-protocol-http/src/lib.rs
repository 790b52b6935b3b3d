mod dispatch;
mod proxy;
mod ws_transport;

use std::fmt::Debug;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use poem::listener::TcpListener;
use poem::{EndpointExt, Route, Server};
use tracing::*;
use tunnelgate_core::Services;

/// Server Lifecycle (C9): binds the single listener that serves both tunnel
/// upgrades and the plain HTTP surface (C8's reverse-proxy fallback or 404).
/// There is no separate `start`/`wait`/`close` here — `run` is both, and the
/// caller (`tunnelgate`'s `main`) gets `close()`'s "in-flight requests fail at
/// their next I/O" behavior for free by racing this future against `ctrl_c`
/// and dropping it.
pub struct HTTPProtocolServer {
    services: Services,
}

impl HTTPProtocolServer {
    pub fn new(services: Services) -> Self {
        HTTPProtocolServer { services }
    }

    pub async fn run(self, address: SocketAddr) -> Result<()> {
        let app = Route::new()
            .nest_no_strip("/", dispatch::dispatch)
            .data(self.services);

        info!(?address, "Listening");
        Server::new(TcpListener::bind(address))
            .run(app)
            .await
            .context("HTTP listener failed")
    }
}

impl Debug for HTTPProtocolServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HTTPProtocolServer")
    }
}
