use thiserror::Error;

use crate::bus::{CorrelationId, MessageKind};
use crate::sim::BodyId;

/// Failures surfaced by the message bus.
#[derive(Debug, Error)]
pub enum BusError {
    /// The request expired (or its table entry was dropped) before any
    /// matching response arrived.
    #[error("no response to request {0}")]
    NoResponse(CorrelationId),

    #[error("malformed {kind:?} payload: {source}")]
    Payload {
        kind: MessageKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("envelope is not valid json: {0}")]
    Envelope(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Failures reading or writing the shared store. Callers log these and fall
/// back to defaults, so they never reach the user.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("value under {key:?} does not decode: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("value for {key:?} does not encode: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Commands the simulation engine refuses.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("body {0} already exists")]
    DuplicateBody(BodyId),

    #[error("body {0} has a degenerate shape")]
    DegenerateShape(BodyId),

    #[error("body {0} not found")]
    UnknownBody(BodyId),
}

/// Failures of a simulation command, local or forwarded.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Debug, Error)]
pub enum PeerError {
    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Sim(#[from] ProxyError),

    #[error("peer is closed")]
    Closed,
}
