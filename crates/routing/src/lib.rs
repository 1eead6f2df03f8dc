//! Conversation mode routing.
//!
//! [`ChatRouter`] consumes one inbound event at a time, persists it, and hands
//! it to the responder, the operator, or (for the operator channel) the relay
//! protocol. State changes for one chat are serialized by [`ChatLocks`].

pub mod locks;
pub mod relay;
pub mod router;
pub mod sender;
pub mod texts;

pub use {
    locks::{ChatLockGuard, ChatLocks},
    relay::{RelayCommand, parse_relay},
    router::{ChatRouter, Collaborators, Outcome},
    sender::MessageSender,
    texts::{Command, CommandMatcher, normalize_command, render},
};
