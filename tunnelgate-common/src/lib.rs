mod config;
mod error;
pub mod keys;
mod types;
mod user;

pub use config::*;
pub use error::TunnelgateError;
pub use types::{Secret, SessionId};
pub use user::*;

/// The WebSocket subprotocol token clients present in `Sec-WebSocket-Protocol`
/// and the string this server's SSH identity is built from (`"{PROTOCOL_VERSION}-server"`).
/// Shared between the HTTP dispatcher and the SSH session layer so both sides
/// agree on it without a runtime handshake of their own.
pub const PROTOCOL_VERSION: &str = "tunnelgate-v1";
