//! Outbound messaging seam.
//!
//! A messaging platform (Telegram today) implements [`ChannelOutbound`]; the
//! router only ever builds an [`OutboundMessage`] and hands it over.

pub mod outbound;

pub use outbound::{ChannelOutbound, OutboundMessage, ReplyKeyboard, TextFormat};
