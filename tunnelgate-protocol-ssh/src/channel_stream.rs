use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use russh::server::Handle;
use russh::ChannelId;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::server::channel_writer::ChannelWriter;

/// Presents one SSH channel as a plain `AsyncRead + AsyncWrite` byte stream.
///
/// Inbound bytes are fed in by the session's event loop (the only place that
/// sees `Handler::data` calls for the whole session) via an unbounded
/// channel; the sender side is dropped when the session observes EOF or
/// close on this channel id, which surfaces here as a normal EOF.
/// Outbound bytes go through the shared `ChannelWriter` background task so a
/// slow client never blocks the event loop that feeds us.
pub struct ChannelStream {
    handle: Handle,
    channel_id: ChannelId,
    writer: Arc<ChannelWriter>,
    rx: UnboundedReceiver<Bytes>,
    pending: Bytes,
}

impl ChannelStream {
    pub fn new(
        handle: Handle,
        channel_id: ChannelId,
        writer: Arc<ChannelWriter>,
        rx: UnboundedReceiver<Bytes>,
    ) -> Self {
        Self {
            handle,
            channel_id,
            writer,
            rx,
            pending: Bytes::new(),
        }
    }
}

impl AsyncRead for ChannelStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        loop {
            if !self.pending.is_empty() {
                let n = self.pending.len().min(buf.remaining());
                let chunk = self.pending.split_to(n);
                buf.put_slice(&chunk);
                return Poll::Ready(Ok(()));
            }
            match self.rx.poll_recv(cx) {
                Poll::Ready(Some(data)) => {
                    self.pending = data;
                    continue;
                }
                Poll::Ready(None) => return Poll::Ready(Ok(())),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl AsyncWrite for ChannelStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        self.writer.write(
            self.handle.clone(),
            self.channel_id,
            russh::CryptoVec::from_slice(buf),
        );
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        let handle = self.handle.clone();
        let channel_id = self.channel_id;
        tokio::spawn(async move {
            let _ = handle.close(channel_id).await;
        });
        Poll::Ready(Ok(()))
    }
}
