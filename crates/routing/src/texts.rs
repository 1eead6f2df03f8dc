//! Message templates and command recognition.

use relaydesk_config::TextsConfig;

/// Render `{name}` placeholders from `vars` in a single pass.
///
/// Substituted values are never scanned again, so user text containing braces
/// comes through verbatim. Unknown placeholders are kept as written.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };

        let name = &after[..close];
        if name.contains('{') {
            // `{{name}`: emit the first brace and rescan from the second.
            out.push('{');
            rest = after;
            continue;
        }

        match vars.iter().find(|(key, _)| *key == name) {
            Some((_, value)) => out.push_str(value),
            None => {
                out.push('{');
                out.push_str(name);
                out.push('}');
            },
        }
        rest = &after[close + 1..];
    }

    out.push_str(rest);
    out
}

/// Lowercase and collapse whitespace runs so commands match regardless of
/// how they were typed.
pub fn normalize_command(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    ConnectOperator,
    DisconnectOperator,
    /// Anything that is not a command.
    Text,
}

/// Recognizes commands in user text. The connect/disconnect phrases are the
/// keyboard button labels, so a button press arrives as the same text.
#[derive(Debug, Clone)]
pub struct CommandMatcher {
    connect: String,
    disconnect: String,
}

impl CommandMatcher {
    pub fn new(connect_phrase: &str, disconnect_phrase: &str) -> Self {
        Self {
            connect: normalize_command(connect_phrase),
            disconnect: normalize_command(disconnect_phrase),
        }
    }

    pub fn from_texts(texts: &TextsConfig) -> Self {
        Self::new(&texts.connect_operator, &texts.disconnect_operator)
    }

    pub fn classify(&self, text: &str) -> Command {
        let normalized = normalize_command(text);
        let first = normalized.split(' ').next().unwrap_or_default();

        if first == "/start" || first.starts_with("/start@") {
            Command::Start
        } else if normalized == self.connect {
            Command::ConnectOperator
        } else if normalized == self.disconnect {
            Command::DisconnectOperator
        } else {
            Command::Text
        }
    }
}
