use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use russh::server::{Auth, Handle};
use russh::ChannelId;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::*;
use tunnelgate_common::{
    AuthOutcome, SessionId, TunnelgateError, User, UserTable, PROTOCOL_VERSION, SOCKS_ROUTING_KEY,
};
use tunnelgate_core::Services;

use crate::channel_stream::ChannelStream;
use crate::control::{self, ControlReply, ControlRequest};
use crate::forward::handle_tcp;
use crate::socks::handle_socks;

use super::channel_writer::ChannelWriter;
use super::russh_handler::ServerHandlerEvent;

/// Hard negotiation deadline from the point the SSH handshake/auth
/// completes (§4.7, §5). Owned solely by the main session loop so there is
/// one place that can say "too late" (P3).
const NEGOTIATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Drives one tunnel session end to end: SSH handshake/auth, negotiation
/// over the control channel, then the channel dispatcher and control
/// request pump until the transport closes. Releases the session binding
/// on every exit path, including a panic unwinding through this function.
pub struct ServerSession;

impl ServerSession {
    pub async fn run(
        services: Services,
        peer_addr: SocketAddr,
        event_rx: UnboundedReceiver<ServerHandlerEvent>,
    ) {
        let session_id: SessionId = uuid::Uuid::new_v4().to_string();
        let _release_guard = ReleaseGuard {
            services: services.clone(),
            session_id: session_id.clone(),
        };

        let mut state = Driver {
            services,
            session_id,
            peer_addr,
            event_rx,
            writer: Arc::new(ChannelWriter::new()),
            channels: HashMap::new(),
            conn_id: 0,
        };
        state.drive().await;
    }
}

/// Guarantees `SessionBindings::release` runs exactly once per session,
/// regardless of how the session task ends (P1). `SessionBindings::release`
/// is idempotent and harmless for unauthenticated/unrestricted sessions
/// that were never bound.
struct ReleaseGuard {
    services: Services,
    session_id: SessionId,
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        let services = self.services.clone();
        let session_id = self.session_id.clone();
        tokio::spawn(async move {
            services.sessions.release(&session_id).await;
        });
    }
}

struct Driver {
    services: Services,
    session_id: SessionId,
    peer_addr: SocketAddr,
    event_rx: UnboundedReceiver<ServerHandlerEvent>,
    writer: Arc<ChannelWriter>,
    channels: HashMap<ChannelId, UnboundedSender<Bytes>>,
    conn_id: u64,
}

impl Driver {
    async fn drive(&mut self) {
        let Some(handle) = self.handshake().await else {
            return;
        };

        let user = self.user_for_negotiation().await;
        if !self.negotiate(&handle, user).await {
            let _ = handle
                .disconnect(russh::Disconnect::ByApplication, String::new(), String::new())
                .await;
            return;
        }

        self.serve_open(&handle).await;
    }

    /// `UPGRADED -> HANDSHAKING -> NEGOTIATING`: processes auth attempts
    /// until either the handshake succeeds (`Authenticated`) or the
    /// transport closes first.
    async fn handshake(&mut self) -> Option<Handle> {
        loop {
            match self.event_rx.recv().await? {
                ServerHandlerEvent::AuthPassword(name, password, reply) => {
                    let outcome = self
                        .services
                        .user_table
                        .authenticate(name.expose_secret(), password.expose_secret());
                    match outcome {
                        AuthOutcome::Unrestricted => {
                            let _ = reply.send(Auth::Accept);
                        }
                        AuthOutcome::Bound(user) => {
                            self.services
                                .sessions
                                .bind(self.session_id.clone(), user)
                                .await;
                            let _ = reply.send(Auth::Accept);
                        }
                        AuthOutcome::Denied => {
                            // Deliberately not distinguishing "unknown user"
                            // from "wrong password", in the log as on the wire.
                            debug!(name = %name.expose_secret(), "Login failed");
                            let _ = reply.send(Auth::Reject {
                                proceed_with_methods: None,
                            });
                        }
                    }
                }
                ServerHandlerEvent::Authenticated(wrapper) => return Some(wrapper.0),
                // Nothing else is reachable before auth completes; russh
                // rejects channel/data events on an unauthenticated session.
                _ => {}
            }
        }
    }

    async fn user_for_negotiation(&self) -> Option<User> {
        self.services.sessions.get(&self.session_id).await
    }

    /// `NEGOTIATING -> OPEN`/`TERMINAL`: waits (with the 10s deadline) for
    /// the client to open the control channel and send its `config`
    /// message, replies, and returns whether the session may proceed.
    async fn negotiate(&mut self, handle: &Handle, user: Option<User>) -> bool {
        let deadline = Instant::now() + NEGOTIATION_TIMEOUT;
        let (outcome_tx, mut outcome_rx) = oneshot::channel::<bool>();
        let mut outcome_tx = Some(outcome_tx);
        let mut control_task = None;

        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    if let Some(task) = control_task.take() {
                        let task: tokio::task::JoinHandle<()> = task;
                        task.abort();
                    }
                    debug!(session = %self.session_id, "negotiation timed out");
                    return false;
                }
                result = &mut outcome_rx, if control_task.is_some() => {
                    return matches!(result, Ok(true));
                }
                event = self.event_rx.recv() => {
                    let Some(event) = event else {
                        return false;
                    };
                    match event {
                        ServerHandlerEvent::ChannelOpenSession(channel, reply) => {
                            if control_task.is_some() {
                                let _ = reply.send(false);
                                continue;
                            }
                            let (data_tx, data_rx) = unbounded_channel();
                            self.channels.insert(channel.0, data_tx);
                            let _ = reply.send(true);
                            let stream = ChannelStream::new(
                                handle.clone(),
                                channel.0,
                                self.writer.clone(),
                                data_rx,
                            );
                            let session_id = self.session_id.clone();
                            let user = user.clone();
                            let outcome_tx = outcome_tx
                                .take()
                                .expect("control channel can only be opened once per session");
                            control_task = Some(tokio::spawn(async move {
                                run_control_channel(session_id, user, stream, outcome_tx).await;
                            }));
                        }
                        ServerHandlerEvent::ChannelOpenDirectTcpIp(_, _, reply) => {
                            let _ = reply.send(false);
                        }
                        ServerHandlerEvent::Data(channel, data, reply) => {
                            if let Some(tx) = self.channels.get(&channel.0) {
                                let _ = tx.send(data);
                            }
                            let _ = reply.send(());
                        }
                        ServerHandlerEvent::ChannelEof(channel, reply) | ServerHandlerEvent::ChannelClose(channel, reply) => {
                            self.channels.remove(&channel.0);
                            let _ = reply.send(());
                        }
                        ServerHandlerEvent::AuthPassword(_, _, reply) => {
                            let _ = reply.send(Auth::Reject { proceed_with_methods: None });
                        }
                        ServerHandlerEvent::Authenticated(_) => {}
                    }
                }
            }
        }
    }

    /// `OPEN`: the channel dispatcher (C6) for every subsequent event —
    /// accepting/rejecting new data channels and routing bytes for every
    /// channel already open (including the control channel's `ping` pump,
    /// which by this point is an independent task).
    async fn serve_open(&mut self, handle: &Handle) {
        while let Some(event) = self.event_rx.recv().await {
            match event {
                ServerHandlerEvent::ChannelOpenSession(_, reply) => {
                    // Exactly one control channel per session (§3 invariants).
                    let _ = reply.send(false);
                }
                ServerHandlerEvent::ChannelOpenDirectTcpIp(channel, params, reply) => {
                    let routing_key = params.host_to_connect.clone();
                    if routing_key == SOCKS_ROUTING_KEY && !self.services.config.socks5_enabled {
                        debug!(
                            session = %self.session_id,
                            "rejecting channel: SOCKS5 is not enabled on the server"
                        );
                        let _ = reply.send(false);
                        continue;
                    }

                    let (data_tx, data_rx) = unbounded_channel();
                    self.channels.insert(channel.0, data_tx);
                    let _ = reply.send(true);

                    self.conn_id += 1;
                    let conn_id = self.conn_id;
                    let stream =
                        ChannelStream::new(handle.clone(), channel.0, self.writer.clone(), data_rx);

                    if routing_key == SOCKS_ROUTING_KEY {
                        tokio::spawn(async move {
                            debug!(conn_id, "SOCKS5 channel opened");
                            handle_socks(stream).await;
                            debug!(conn_id, "SOCKS5 channel closed");
                        });
                    } else {
                        tokio::spawn(async move {
                            debug!(conn_id, remote = %routing_key, "TCP forward channel opened");
                            handle_tcp(stream, &routing_key).await;
                        });
                    }
                }
                ServerHandlerEvent::Data(channel, data, reply) => {
                    if let Some(tx) = self.channels.get(&channel.0) {
                        let _ = tx.send(data);
                    }
                    let _ = reply.send(());
                }
                ServerHandlerEvent::ChannelEof(channel, reply)
                | ServerHandlerEvent::ChannelClose(channel, reply) => {
                    self.channels.remove(&channel.0);
                    let _ = reply.send(());
                }
                ServerHandlerEvent::AuthPassword(_, _, reply) => {
                    let _ = reply.send(Auth::Reject {
                        proceed_with_methods: None,
                    });
                }
                ServerHandlerEvent::Authenticated(_) => {}
            }
        }
        debug!(session = %self.session_id, peer = %self.peer_addr, "session transport closed");
    }
}

/// Reads the client's `config` message, enforces the ACL (P2), replies, and
/// — on success — keeps pumping `ping` requests until the control channel
/// closes (§4.7's request-pump). Runs as its own task so the main session
/// loop is free to keep routing `Data`/`ChannelEof` events for this and
/// every other channel concurrently.
async fn run_control_channel(
    session_id: SessionId,
    user: Option<User>,
    mut stream: ChannelStream,
    outcome_tx: oneshot::Sender<bool>,
) {
    let first = match control::read_request(&mut stream).await {
        Ok(request) => request,
        Err(TunnelgateError::DeserializeJson(error)) => {
            debug!(session = %session_id, %error, "negotiation: invalid config payload");
            let _ = control::write_reply(
                &mut stream,
                &ControlReply {
                    ok: false,
                    reason: "invalid config".to_string(),
                },
            )
            .await;
            let _ = outcome_tx.send(false);
            return;
        }
        Err(TunnelgateError::NegotiationProtocol(reason)) => {
            debug!(session = %session_id, %reason, "negotiation: invalid config payload");
            let _ = control::write_reply(&mut stream, &ControlReply { ok: false, reason }).await;
            let _ = outcome_tx.send(false);
            return;
        }
        Err(error) => {
            debug!(session = %session_id, %error, "negotiation: transport error awaiting config");
            let _ = outcome_tx.send(false);
            return;
        }
    };

    let config = match first {
        ControlRequest::Config(config) => config,
        ControlRequest::Ping => {
            let _ = control::write_reply(
                &mut stream,
                &ControlReply {
                    ok: false,
                    reason: "expected config request".to_string(),
                },
            )
            .await;
            let _ = outcome_tx.send(false);
            return;
        }
    };

    if config.version != PROTOCOL_VERSION {
        warn!(
            session = %session_id,
            client_version = %config.version,
            server_version = PROTOCOL_VERSION,
            "client/server protocol version mismatch, proceeding anyway"
        );
    }

    if let Err(addr) = UserTable::check_remotes(user.as_ref(), &config.remotes) {
        let reason = format!("access to '{addr}' denied");
        debug!(session = %session_id, %reason, "negotiation: access denied");
        let _ = control::write_reply(
            &mut stream,
            &ControlReply {
                ok: false,
                reason,
            },
        )
        .await;
        let _ = outcome_tx.send(false);
        return;
    }

    if control::write_reply(
        &mut stream,
        &ControlReply {
            ok: true,
            reason: String::new(),
        },
    )
    .await
    .is_err()
    {
        let _ = outcome_tx.send(false);
        return;
    }
    let _ = outcome_tx.send(true);

    loop {
        match control::read_request(&mut stream).await {
            Ok(ControlRequest::Ping) => {
                let reply = control::write_reply(
                    &mut stream,
                    &ControlReply {
                        ok: true,
                        reason: String::new(),
                    },
                )
                .await;
                if reply.is_err() {
                    break;
                }
            }
            Ok(ControlRequest::Config(_)) => {
                debug!(session = %session_id, "ignoring unexpected repeated config request");
            }
            Err(_) => break,
        }
    }
}
