mod channel_writer;
mod russh_handler;
mod session;

use std::borrow::Cow;
use std::fmt::Debug;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use russh::keys::{Algorithm, HashAlg};
use russh::{MethodKind, MethodSet, Preferred};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::unbounded_channel;
use tracing::*;
use tunnelgate_common::PROTOCOL_VERSION;
use tunnelgate_core::Services;

pub use russh_handler::ServerHandler;
use session::ServerSession;

/// Runs one tunnel session (C7) over an already-accepted duplex byte stream
/// — the bytes underlying one upgraded WebSocket connection. Returns once
/// the transport closes, the handshake fails, or negotiation terminates the
/// session; every session-scoped error is handled and logged here, matching
/// the spec's propagation policy (only startup errors are process-fatal).
pub async fn run_tunnel_session<S>(services: Services, stream: S, peer_addr: SocketAddr)
where
    S: AsyncRead + AsyncWrite + Unpin + Debug + Send + 'static,
{
    let config = russh_server_config(&services);

    let (event_tx, event_rx) = unbounded_channel();
    let handler = ServerHandler { event_tx };

    let session_task = tokio::spawn(ServerSession::run(services, peer_addr, event_rx));

    if let Err(error) = russh::server::run_stream(config, stream, handler).await {
        debug!(%peer_addr, %error, "SSH transport closed");
    }

    // `run_stream`'s future only resolves once every `Handle`/`Channel` tied
    // to this connection has dropped, which also drops the handler's
    // `event_tx`; the session task observes `event_rx` close on its own and
    // releases its session binding (see session::ServerSession::run).
    if let Err(error) = session_task.await {
        error!(%peer_addr, %error, "tunnel session task panicked");
    }
}

fn russh_server_config(services: &Services) -> Arc<russh::server::Config> {
    Arc::new(russh::server::Config {
        server_id: russh::SshId::Standard(format!("SSH-2.0-{PROTOCOL_VERSION}-server")),
        auth_rejection_time: Duration::from_secs(1),
        auth_rejection_time_initial: Some(Duration::from_secs(0)),
        methods: MethodSet::from(&[MethodKind::Password][..]),
        keys: vec![(*services.host_key).clone()],
        nodelay: true,
        preferred: Preferred {
            key: Cow::Borrowed(&[
                Algorithm::Ed25519,
                Algorithm::Rsa {
                    hash: Some(HashAlg::Sha512),
                },
                Algorithm::Rsa {
                    hash: Some(HashAlg::Sha256),
                },
            ]),
            ..<_>::default()
        },
        ..<_>::default()
    })
}
