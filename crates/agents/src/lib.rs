//! The automated responder: the [`model::ResponderClient`] seam, per-chat
//! conversation buffers, and an OpenAI-compatible implementation.

pub mod conversation;
pub mod model;
pub mod providers;

pub use {
    conversation::ConversationBuffers,
    model::{ResponderClient, Role, Turn},
    providers::openai::OpenAiResponder,
};
