use std::fmt::{self, Debug};
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use poem::web::websocket::{Message, WebSocketStream};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Presents an upgraded WebSocket connection as a plain `AsyncRead +
/// AsyncWrite` byte stream so the SSH transport underneath a tunnel session
/// can run over it exactly as it would over a raw TCP socket (§6.1).
///
/// Mirrors `tunnelgate_protocol_ssh`'s `ChannelStream`/`ChannelWriter` idiom
/// one layer up: a background task drains `Message::Binary` frames off the
/// WebSocket into an unbounded channel this type reads from, and a second
/// background task owns the sink so a slow peer never blocks whichever SSH
/// task is currently writing.
pub struct WsTransport {
    rx: UnboundedReceiver<Bytes>,
    tx: UnboundedSender<Vec<u8>>,
    pending: Bytes,
}

impl Debug for WsTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WsTransport")
    }
}

impl WsTransport {
    pub fn new(socket: WebSocketStream) -> Self {
        let (mut sink, mut stream) = socket.split();

        let (read_tx, read_rx) = unbounded_channel::<Bytes>();
        tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                match message {
                    Ok(Message::Binary(data)) => {
                        if read_tx.send(Bytes::from(data)).is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) | Err(_) => break,
                    // Text/Ping/Pong carry no tunnel payload; the protocol
                    // is binary-only end to end.
                    Ok(_) => continue,
                }
            }
        });

        let (write_tx, mut write_rx) = unbounded_channel::<Vec<u8>>();
        tokio::spawn(async move {
            while let Some(data) = write_rx.recv().await {
                if sink.send(Message::Binary(data)).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        Self {
            rx: read_rx,
            tx: write_tx,
            pending: Bytes::new(),
        }
    }
}

impl AsyncRead for WsTransport {
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

impl AsyncWrite for WsTransport {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.tx.send(buf.to_vec()) {
            Ok(()) => Poll::Ready(Ok(buf.len())),
            Err(_) => Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "websocket transport closed",
            ))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
