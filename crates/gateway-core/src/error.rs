//! Crate-wide error taxonomy (§7).
//!
//! Internal APIs return `Result<T, GatewayError>`; only binary entry points
//! flatten errors to `anyhow::Result<()>`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    // -- startup, fatal (§7) --
    #[error("missing or malformed required configuration: {0}")]
    ConfigMissing(String),

    #[error("SSH private key file not found at {0}")]
    KeyfileMissing(String),

    // -- connector (§4.3) --
    #[error("exhausted all (proxy, front-end) pairs after {rounds} rounds")]
    ConnectUnreachable { rounds: u32 },

    #[error("SSH authentication failed against {host}")]
    AuthFailed { host: String },

    #[error("proxy host {0} unreachable")]
    ProxyUnreachable(String),

    #[error("tunnel to front-end via proxy {proxy} unreachable")]
    TunnelUnreachable { proxy: String },

    #[error("front-end host {0} unreachable")]
    FrontendUnreachable(String),

    // -- message bus (§4.2, §7) --
    #[error("broker rejected publish to queue {queue}: {reason}")]
    PublishRejected { queue: String, reason: String },

    #[error("queue payload is not valid UTF-8 JSON: {0}")]
    PayloadMalformed(String),

    // -- datastore (§4.1) --
    #[error("entity already exists: {0}")]
    AlreadyExists(String),

    #[error("entity not found: {0}")]
    NotFound(String),

    #[error("referenced entity missing: {0}")]
    ReferencedEntityMissing(String),

    #[error("illegal job state transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    // -- executor / transfer (§4.4, §4.5, §7) --
    #[error("batch submission failed: {0}")]
    SubmitFailed(String),

    #[error("remote transfer failed during {phase}: {reason}")]
    TransferFailed { phase: String, reason: String },

    #[error("polling timed out before job reached a terminal state")]
    PollTimeout,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type GatewayResult<T> = Result<T, GatewayError>;
