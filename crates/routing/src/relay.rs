//! Operator relay protocol: `<chat id>: <reply text>`.

use relaydesk_common::{ChatId, MalformedInputError};

/// A parsed operator reply addressed to one chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayCommand {
    pub target: ChatId,
    pub body: String,
}

/// Parse operator text. The first `:` separates the target from the reply;
/// later colons belong to the reply.
pub fn parse_relay(text: &str, operator: &ChatId) -> Result<RelayCommand, MalformedInputError> {
    let (target, body) = text
        .split_once(':')
        .ok_or(MalformedInputError::MissingSeparator)?;

    let target = target.trim();
    if target.is_empty() {
        return Err(MalformedInputError::MissingTarget);
    }
    if target.chars().any(char::is_whitespace) {
        return Err(MalformedInputError::InvalidTarget(target.to_string()));
    }

    let body = body.trim();
    if body.is_empty() {
        return Err(MalformedInputError::EmptyReply);
    }

    let target = ChatId::new(target);
    if &target == operator {
        return Err(MalformedInputError::SelfTarget);
    }

    Ok(RelayCommand {
        target,
        body: body.to_string(),
    })
}
