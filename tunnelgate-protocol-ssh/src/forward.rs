use tokio::net::TcpStream;
use tracing::*;

use crate::channel_stream::ChannelStream;
use crate::pump::pipe;

/// Dials `remote` and splices it with the channel. Best-effort: a dial
/// failure just closes the channel, no retries.
pub async fn handle_tcp(channel: ChannelStream, remote: &str) {
    let target = match TcpStream::connect(remote).await {
        Ok(s) => s,
        Err(error) => {
            debug!(%remote, %error, "TCP forward dial failed");
            return;
        }
    };
    let (sent, received) = pipe(channel, target).await;
    debug!(%remote, sent, received, "TCP forward closed");
}
