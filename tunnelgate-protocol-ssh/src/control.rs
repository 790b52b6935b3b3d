use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use tunnelgate_common::TunnelgateError;

/// The control channel's framing: a 4-byte big-endian length prefix followed
/// by a JSON body. Mirrors the length-prefixed reassembly this codebase
/// already uses for other binary SSH subchannels.
const MAX_FRAME_LEN: u32 = 1 << 20;

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum ControlRequest {
    Config(tunnelgate_common::TunnelConfig),
    Ping,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ControlReply {
    pub ok: bool,
    #[serde(default)]
    pub reason: String,
}

pub async fn read_frame<R: tokio::io::AsyncRead + Unpin>(
    r: &mut R,
) -> Result<Vec<u8>, TunnelgateError> {
    let len = r.read_u32().await?;
    if len > MAX_FRAME_LEN {
        return Err(TunnelgateError::NegotiationProtocol(
            "frame too large".to_string(),
        ));
    }
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf).await?;
    Ok(buf)
}

pub async fn write_frame<W: tokio::io::AsyncWrite + Unpin>(
    w: &mut W,
    data: &[u8],
) -> Result<(), TunnelgateError> {
    w.write_u32(data.len() as u32).await?;
    w.write_all(data).await?;
    Ok(())
}

pub async fn read_request<R: tokio::io::AsyncRead + Unpin>(
    r: &mut R,
) -> Result<ControlRequest, TunnelgateError> {
    let frame = read_frame(r).await?;
    serde_json::from_slice(&frame).map_err(TunnelgateError::from)
}

pub async fn write_reply<W: tokio::io::AsyncWrite + Unpin>(
    w: &mut W,
    reply: &ControlReply,
) -> Result<(), TunnelgateError> {
    let frame = serde_json::to_vec(reply)?;
    write_frame(w, &frame).await
}
