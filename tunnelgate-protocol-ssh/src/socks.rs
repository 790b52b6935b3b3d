use std::sync::Arc;

use fast_socks5::server::{Config as Socks5Config, Socks5Socket};
use tracing::*;

use crate::channel_stream::ChannelStream;

/// Wraps the channel as a byte stream and hands it to the in-process SOCKS5
/// server, which itself resolves the destination, dials it, and proxies
/// bytes for the rest of the channel's lifetime.
pub async fn handle_socks(channel: ChannelStream) {
    let config = Arc::new(Socks5Config::default());
    let mut socket = Socks5Socket::new(channel, config);
    if let Err(error) = socket.upgrade_to_socks5().await {
        debug!(%error, "SOCKS5 session failed");
    }
}
