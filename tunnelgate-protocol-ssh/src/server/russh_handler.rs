use std::fmt::Debug;

use bytes::Bytes;
use russh::server::{Auth, Handle, Msg, Session};
use russh::{Channel, ChannelId};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;
use tunnelgate_common::Secret;

use crate::common::{DirectTCPIPParams, ServerChannelId};

pub struct HandleWrapper(pub Handle);

impl Debug for HandleWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HandleWrapper")
    }
}

/// Every `russh::server::Handler` callback this server cares about,
/// forwarded as an event to the session's single-threaded event loop. Every
/// other callback (pty/shell/subsystem/exec/x11/tcpip-forward/...) is left
/// at its default trait implementation, which russh answers with a rejection
/// on its own — exactly the "discard loop" the protocol calls for on
/// requests it has no use for.
#[derive(Debug)]
pub enum ServerHandlerEvent {
    Authenticated(HandleWrapper),
    AuthPassword(Secret<String>, Secret<String>, oneshot::Sender<Auth>),
    ChannelOpenSession(ServerChannelId, oneshot::Sender<bool>),
    ChannelOpenDirectTcpIp(ServerChannelId, DirectTCPIPParams, oneshot::Sender<bool>),
    Data(ServerChannelId, Bytes, oneshot::Sender<()>),
    ChannelEof(ServerChannelId, oneshot::Sender<()>),
    ChannelClose(ServerChannelId, oneshot::Sender<()>),
}

pub struct ServerHandler {
    pub event_tx: UnboundedSender<ServerHandlerEvent>,
}

#[derive(thiserror::Error, Debug)]
pub enum ServerHandlerError {
    #[error("session event loop has stopped")]
    ChannelSend,
}

impl ServerHandler {
    fn send_event(&self, event: ServerHandlerEvent) -> Result<(), ServerHandlerError> {
        self.event_tx
            .send(event)
            .map_err(|_| ServerHandlerError::ChannelSend)
    }
}

impl russh::server::Handler for ServerHandler {
    type Error = anyhow::Error;

    async fn auth_succeeded(&mut self, session: &mut Session) -> Result<(), Self::Error> {
        let handle = session.handle();
        self.send_event(ServerHandlerEvent::Authenticated(HandleWrapper(handle)))?;
        Ok(())
    }

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        let user = Secret::new(user.to_string());
        let password = Secret::new(password.to_string());
        let (tx, rx) = oneshot::channel();
        self.send_event(ServerHandlerEvent::AuthPassword(user, password, tx))?;
        Ok(rx.await.unwrap_or(Auth::Reject {
            proceed_with_methods: None,
        }))
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        let (tx, rx) = oneshot::channel();
        self.send_event(ServerHandlerEvent::ChannelOpenSession(
            ServerChannelId(channel.id()),
            tx,
        ))?;
        Ok(rx.await.unwrap_or(false))
    }

    async fn channel_open_direct_tcpip(
        &mut self,
        channel: Channel<Msg>,
        host_to_connect: &str,
        port_to_connect: u32,
        originator_address: &str,
        originator_port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        let (tx, rx) = oneshot::channel();
        self.send_event(ServerHandlerEvent::ChannelOpenDirectTcpIp(
            ServerChannelId(channel.id()),
            DirectTCPIPParams {
                host_to_connect: host_to_connect.to_string(),
                port_to_connect,
                originator_address: originator_address.to_string(),
                originator_port,
            },
            tx,
        ))?;
        Ok(rx.await.unwrap_or(false))
    }

    async fn data(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        let (tx, rx) = oneshot::channel();
        self.send_event(ServerHandlerEvent::Data(
            ServerChannelId(channel),
            Bytes::from(data.to_vec()),
            tx,
        ))?;
        let _ = rx.await;
        Ok(())
    }

    async fn channel_eof(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        let (tx, rx) = oneshot::channel();
        self.send_event(ServerHandlerEvent::ChannelEof(ServerChannelId(channel), tx))?;
        let _ = rx.await;
        Ok(())
    }

    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        let (tx, rx) = oneshot::channel();
        self.send_event(ServerHandlerEvent::ChannelClose(
            ServerChannelId(channel),
            tx,
        ))?;
        let _ = rx.await;
        Ok(())
    }
}
