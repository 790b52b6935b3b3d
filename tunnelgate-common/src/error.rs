#[derive(thiserror::Error, Debug)]
pub enum TunnelgateError {
    #[error("failed to parse URL: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("deserialization failed: {0}")]
    DeserializeJson(#[from] serde_json::Error),
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("SSH: {0}")]
    Ssh(#[from] russh::Error),
    #[error("key: {0}")]
    Key(#[from] russh::keys::Error),
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
    #[error("access to '{0}' denied")]
    AccessDenied(String),
    #[error("invalid config request: {0}")]
    NegotiationProtocol(String),
    #[error("negotiation timed out")]
    NegotiationTimeout,
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
