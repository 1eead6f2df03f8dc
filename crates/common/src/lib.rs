//! Shared value types and the error taxonomy used across relaydesk crates.

pub mod error;
pub mod types;

pub use {
    error::{MalformedInputError, PersistenceError, TransportError, UpstreamError},
    types::{ChatId, ChatMode, InboundEvent},
};
