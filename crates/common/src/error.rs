//! Error kinds, one per recovery strategy.
//!
//! - [`MalformedInputError`]: discard the event or answer the source with a
//!   corrective message. Never escalated.
//! - [`UpstreamError`]: the responder failed; the user gets a fixed apology.
//! - [`TransportError`]: an outbound send failed; logged, never retried.
//! - [`PersistenceError`]: history could not be written; the event is aborted.

use std::time::Duration;

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MalformedInputError {
    #[error("payload is not valid JSON: {0}")]
    InvalidPayload(String),
    #[error("payload is missing required field '{0}'")]
    MissingField(&'static str),
    #[error("relay text has no ':' separator")]
    MissingSeparator,
    #[error("relay text has an empty chat identifier")]
    MissingTarget,
    #[error("relay target '{0}' is not a chat identifier")]
    InvalidTarget(String),
    #[error("relay text has an empty reply")]
    EmptyReply,
    #[error("relay target is the operator channel itself")]
    SelfTarget,
}

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("responder is not configured: {0}")]
    NotConfigured(String),
    #[error("responder timed out after {0:?}")]
    Timeout(Duration),
    #[error("responder request failed: {0}")]
    Transport(String),
    #[error("responder returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("responder returned an unusable response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("send timed out after {0:?}")]
    Timeout(Duration),
    #[error("send rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
#[error("{operation} failed: {source}")]
pub struct PersistenceError {
    pub operation: &'static str,
    #[source]
    pub source: BoxError,
}

impl PersistenceError {
    pub fn new(operation: &'static str, source: impl Into<BoxError>) -> Self {
        Self {
            operation,
            source: source.into(),
        }
    }
}
