use std::{fmt, sync::Arc, time::Duration};

use {
    relaydesk_agents::{ConversationBuffers, ResponderClient},
    relaydesk_channels::ChannelOutbound,
    relaydesk_common::{ChatId, ChatMode, InboundEvent, PersistenceError, UpstreamError},
    relaydesk_config::TextsConfig,
    relaydesk_sessions::{ChatModeStore, DialogueStore},
    tracing::{debug, info, warn},
};

use crate::{
    locks::ChatLocks,
    relay::parse_relay,
    sender::MessageSender,
    texts::{Command, CommandMatcher, render},
};

const DEFAULT_RESPONDER_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_TURNS: usize = 40;

/// What handling one event amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Welcomed,
    OperatorConnected,
    OperatorDisconnected,
    ForwardedToOperator,
    Answered,
    /// The responder failed and the user got the fallback apology.
    ResponderFallback,
    Relayed { target: ChatId },
    /// The relay was well formed but the target could not be reached.
    RelayUndelivered { target: ChatId },
    /// Operator text was not a valid relay; the operator got a format notice.
    RelayRejected,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Welcomed => "welcomed",
            Self::OperatorConnected => "operator_connected",
            Self::OperatorDisconnected => "operator_disconnected",
            Self::ForwardedToOperator => "forwarded_to_operator",
            Self::Answered => "answered",
            Self::ResponderFallback => "responder_fallback",
            Self::Relayed { .. } => "relayed",
            Self::RelayUndelivered { .. } => "relay_undelivered",
            Self::RelayRejected => "relay_rejected",
        };
        f.write_str(name)
    }
}

/// The external collaborators a router dispatches to.
pub struct Collaborators {
    pub modes: Arc<dyn ChatModeStore>,
    pub dialogues: Arc<dyn DialogueStore>,
    pub responder: Arc<dyn ResponderClient>,
    pub outbound: Arc<dyn ChannelOutbound>,
}

/// Per-chat mode state machine plus the operator relay.
pub struct ChatRouter {
    operator_chat_id: ChatId,
    modes: Arc<dyn ChatModeStore>,
    dialogues: Arc<dyn DialogueStore>,
    responder: Arc<dyn ResponderClient>,
    sender: MessageSender,
    buffers: ConversationBuffers,
    locks: ChatLocks,
    commands: CommandMatcher,
    texts: TextsConfig,
    responder_timeout: Duration,
}

impl ChatRouter {
    pub fn new(operator_chat_id: ChatId, collaborators: Collaborators, texts: TextsConfig) -> Self {
        let Collaborators {
            modes,
            dialogues,
            responder,
            outbound,
        } = collaborators;

        Self {
            operator_chat_id,
            sender: MessageSender::new(outbound, Arc::clone(&modes), &texts),
            modes,
            dialogues,
            responder,
            buffers: ConversationBuffers::new(DEFAULT_MAX_TURNS),
            locks: ChatLocks::new(),
            commands: CommandMatcher::from_texts(&texts),
            texts,
            responder_timeout: DEFAULT_RESPONDER_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_buffers(mut self, buffers: ConversationBuffers) -> Self {
        self.buffers = buffers;
        self
    }

    #[must_use]
    pub fn with_responder_timeout(mut self, timeout: Duration) -> Self {
        self.responder_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.sender = self.sender.with_timeout(timeout);
        self
    }

    pub fn operator_chat_id(&self) -> &ChatId {
        &self.operator_chat_id
    }

    pub fn buffers(&self) -> &ConversationBuffers {
        &self.buffers
    }

    /// Handle one inbound event.
    ///
    /// Only a [`PersistenceError`] aborts handling; responder and delivery
    /// failures are absorbed into the returned [`Outcome`].
    pub async fn handle(&self, event: &InboundEvent) -> Result<Outcome, PersistenceError> {
        let chat_id = &event.chat_id;
        let _guard = self.locks.acquire(chat_id).await;

        let dialogue = self.dialogues.ensure_dialogue(chat_id).await?;
        self.dialogues
            .append_message(&dialogue, &event.text, event.event_id.as_deref())
            .await?;

        let outcome = if *chat_id == self.operator_chat_id {
            self.relay(&event.text).await
        } else {
            self.dispatch(event).await?
        };

        info!(chat_id = %chat_id, outcome = %outcome, "event handled");
        Ok(outcome)
    }

    async fn dispatch(&self, event: &InboundEvent) -> Result<Outcome, PersistenceError> {
        let chat_id = &event.chat_id;
        let command = self.commands.classify(&event.text);
        if command == Command::Start {
            return self.start(chat_id).await;
        }

        let mode = self.modes.get(chat_id).await?;
        debug!(chat_id = %chat_id, mode = %mode, command = ?command, "dispatching");

        match (mode, command) {
            (ChatMode::Bot, Command::ConnectOperator) => self.connect(chat_id).await,
            (ChatMode::Operator, Command::DisconnectOperator) => self.disconnect(chat_id).await,
            (ChatMode::Operator, _) => Ok(self.forward(event).await),
            (ChatMode::Bot, _) => Ok(self.respond(event).await),
        }
    }

    // ── Transitions ─────────────────────────────────────────────────────

    async fn start(&self, chat_id: &ChatId) -> Result<Outcome, PersistenceError> {
        self.modes.set(chat_id, ChatMode::Bot).await?;
        self.buffers.clear(chat_id);

        let welcome = render(&self.texts.welcome, &[("chat_id", chat_id.as_str())]);
        let _ = self.sender.send(chat_id, &welcome, true).await;
        Ok(Outcome::Welcomed)
    }

    async fn connect(&self, chat_id: &ChatId) -> Result<Outcome, PersistenceError> {
        self.modes.set(chat_id, ChatMode::Operator).await?;

        let notice = render(&self.texts.operator_notice_connected, &[(
            "chat_id",
            chat_id.as_str(),
        )]);
        let _ = self.sender.send(&self.operator_chat_id, &notice, false).await;
        let _ = self
            .sender
            .send(chat_id, &self.texts.operator_connected, true)
            .await;
        Ok(Outcome::OperatorConnected)
    }

    async fn disconnect(&self, chat_id: &ChatId) -> Result<Outcome, PersistenceError> {
        self.modes.set(chat_id, ChatMode::Bot).await?;

        let notice = render(&self.texts.operator_notice_disconnected, &[(
            "chat_id",
            chat_id.as_str(),
        )]);
        let _ = self.sender.send(&self.operator_chat_id, &notice, false).await;
        let _ = self
            .sender
            .send(chat_id, &self.texts.operator_disconnected, true)
            .await;
        Ok(Outcome::OperatorDisconnected)
    }

    // ── Dispatch targets ────────────────────────────────────────────────

    async fn forward(&self, event: &InboundEvent) -> Outcome {
        let chat_id = event.chat_id.as_str();
        let text = match &event.reply_to_text {
            Some(original) => render(&self.texts.forwarded_reply, &[
                ("chat_id", chat_id),
                ("original", original.as_str()),
                ("text", event.text.as_str()),
            ]),
            None => render(&self.texts.forwarded_message, &[
                ("chat_id", chat_id),
                ("text", event.text.as_str()),
            ]),
        };
        let _ = self.sender.send_plain(&self.operator_chat_id, &text).await;
        Outcome::ForwardedToOperator
    }

    async fn respond(&self, event: &InboundEvent) -> Outcome {
        let chat_id = &event.chat_id;
        let conversation = self.buffers.snapshot(chat_id);

        let result = match tokio::time::timeout(
            self.responder_timeout,
            self.responder
                .send_and_get_reply(&conversation, &event.text),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(UpstreamError::Timeout(self.responder_timeout)),
        };

        match result {
            Ok(reply) => {
                self.buffers.record_exchange(chat_id, &event.text, &reply);
                let _ = self.sender.send_plain(chat_id, &reply).await;
                Outcome::Answered
            },
            Err(e) => {
                warn!(
                    chat_id = %chat_id,
                    responder = self.responder.name(),
                    error = %e,
                    "responder failed, sending fallback"
                );
                let _ = self
                    .sender
                    .send_plain(chat_id, &self.texts.responder_fallback)
                    .await;
                Outcome::ResponderFallback
            },
        }
    }

    async fn relay(&self, text: &str) -> Outcome {
        let command = match parse_relay(text, &self.operator_chat_id) {
            Ok(command) => command,
            Err(e) => {
                debug!(error = %e, "operator text is not a relay");
                let _ = self
                    .sender
                    .send_plain(&self.operator_chat_id, &self.texts.relay_format_error)
                    .await;
                return Outcome::RelayRejected;
            },
        };

        let reply = render(&self.texts.operator_reply, &[("text", command.body.as_str())]);
        match self.sender.send_plain(&command.target, &reply).await {
            Ok(()) => Outcome::Relayed {
                target: command.target,
            },
            Err(_) => {
                let notice = render(&self.texts.relay_delivery_failed, &[(
                    "chat_id",
                    command.target.as_str(),
                )]);
                let _ = self.sender.send_plain(&self.operator_chat_id, &notice).await;
                Outcome::RelayUndelivered {
                    target: command.target,
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        async_trait::async_trait,
        relaydesk_agents::Turn,
        relaydesk_channels::{OutboundMessage, ReplyKeyboard, TextFormat},
        relaydesk_common::TransportError,
        relaydesk_sessions::{
            Dialogue, DialogueSummary, MessageRecord, SqliteChatModeStore, SqliteDialogueStore,
            open_memory_pool,
        },
        std::{collections::HashSet, sync::Mutex},
    };

    const OPERATOR: &str = "-100900";

    // ── Test doubles ────────────────────────────────────────────────────

    #[derive(Default)]
    struct RecordingOutbound {
        sent: Mutex<Vec<OutboundMessage>>,
        unreachable: Mutex<HashSet<ChatId>>,
    }

    impl RecordingOutbound {
        fn sent(&self) -> Vec<OutboundMessage> {
            self.sent.lock().unwrap().clone()
        }

        fn sent_to(&self, chat: &str) -> Vec<OutboundMessage> {
            self.sent()
                .into_iter()
                .filter(|m| m.chat_id.as_str() == chat)
                .collect()
        }

        fn make_unreachable(&self, chat: &str) {
            self.unreachable.lock().unwrap().insert(ChatId::new(chat));
        }
    }

    #[async_trait]
    impl ChannelOutbound for RecordingOutbound {
        fn id(&self) -> &str {
            "recording"
        }

        async fn deliver(&self, message: &OutboundMessage) -> Result<(), TransportError> {
            if self.unreachable.lock().unwrap().contains(&message.chat_id) {
                return Err(TransportError::Rejected("chat not found".into()));
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    /// Replies `re: <text>`; fails for texts in `failing`.
    #[derive(Default)]
    struct ScriptedResponder {
        calls: Mutex<Vec<(Vec<Turn>, String)>>,
        failing: HashSet<String>,
        stall: bool,
    }

    impl ScriptedResponder {
        fn failing_on(text: &str) -> Self {
            Self {
                failing: HashSet::from([text.to_string()]),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<(Vec<Turn>, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ResponderClient for ScriptedResponder {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn send_and_get_reply(
            &self,
            conversation: &[Turn],
            new_text: &str,
        ) -> Result<String, UpstreamError> {
            self.calls
                .lock()
                .unwrap()
                .push((conversation.to_vec(), new_text.to_string()));
            if self.stall {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            if self.failing.contains(new_text) {
                return Err(UpstreamError::Status {
                    status: 500,
                    body: "boom".into(),
                });
            }
            Ok(format!("re: {new_text}"))
        }
    }

    struct Harness {
        router: Arc<ChatRouter>,
        outbound: Arc<RecordingOutbound>,
        responder: Arc<ScriptedResponder>,
        modes: Arc<SqliteChatModeStore>,
        dialogues: Arc<SqliteDialogueStore>,
    }

    impl Harness {
        async fn new() -> Self {
            Self::with_responder(ScriptedResponder::default()).await
        }

        async fn with_responder(responder: ScriptedResponder) -> Self {
            let pool = open_memory_pool().await.unwrap();
            let modes = Arc::new(SqliteChatModeStore::new(pool.clone()));
            let dialogues = Arc::new(SqliteDialogueStore::new(pool));
            let outbound = Arc::new(RecordingOutbound::default());
            let responder = Arc::new(responder);

            let router = ChatRouter::new(
                ChatId::new(OPERATOR),
                Collaborators {
                    modes: modes.clone(),
                    dialogues: dialogues.clone(),
                    responder: responder.clone(),
                    outbound: outbound.clone(),
                },
                TextsConfig::default(),
            )
            .with_responder_timeout(Duration::from_millis(200));

            Self {
                router: Arc::new(router),
                outbound,
                responder,
                modes,
                dialogues,
            }
        }

        async fn send(&self, chat: &str, text: &str) -> Outcome {
            self.router
                .handle(&InboundEvent::new(chat, text))
                .await
                .unwrap()
        }

        async fn mode(&self, chat: &str) -> ChatMode {
            self.modes.get(&ChatId::new(chat)).await.unwrap()
        }

        async fn history(&self, chat: &str) -> Vec<String> {
            let Some(dialogue) = self
                .dialogues
                .find_dialogue(&ChatId::new(chat))
                .await
                .unwrap()
            else {
                return Vec::new();
            };
            self.dialogues
                .messages(&dialogue)
                .await
                .unwrap()
                .into_iter()
                .map(|m| m.text)
                .collect()
        }
    }

    // ── /start ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn start_welcomes_with_chat_id_and_connect_button() {
        let h = Harness::new().await;

        assert_eq!(h.send("555", "/start").await, Outcome::Welcomed);

        let sent = h.outbound.sent_to("555");
        assert_eq!(sent.len(), 1);
        assert!(sent[0].text.contains("555"));
        assert_eq!(sent[0].format, TextFormat::Markdown);
        assert_eq!(
            sent[0].keyboard,
            Some(ReplyKeyboard::single("Connect operator"))
        );
        assert_eq!(h.mode("555").await, ChatMode::Bot);
    }

    #[tokio::test]
    async fn start_resets_operator_mode_and_buffer() {
        let h = Harness::new().await;
        h.send("555", "hello").await;
        h.send("555", "Connect operator").await;
        assert_eq!(h.mode("555").await, ChatMode::Operator);

        assert_eq!(h.send("555", "/start").await, Outcome::Welcomed);

        assert_eq!(h.mode("555").await, ChatMode::Bot);
        assert_eq!(h.router.buffers().len(&ChatId::new("555")), 0);
        let welcome = h.outbound.sent_to("555").pop().unwrap();
        assert_eq!(
            welcome.keyboard,
            Some(ReplyKeyboard::single("Connect operator"))
        );
    }

    // ── Connect / disconnect ────────────────────────────────────────────

    #[tokio::test]
    async fn connect_notifies_operator_and_user_once() {
        let h = Harness::new().await;

        assert_eq!(
            h.send("555", "connect OPERATOR").await,
            Outcome::OperatorConnected
        );

        assert_eq!(h.mode("555").await, ChatMode::Operator);
        let to_operator = h.outbound.sent_to(OPERATOR);
        assert_eq!(to_operator.len(), 1);
        assert!(to_operator[0].text.contains("555"));
        let to_user = h.outbound.sent_to("555");
        assert_eq!(to_user.len(), 1);
        assert_eq!(
            to_user[0].keyboard,
            Some(ReplyKeyboard::single("Disconnect operator"))
        );
        assert!(h.responder.calls().is_empty());
    }

    #[tokio::test]
    async fn disconnect_notifies_operator_and_user_once() {
        let h = Harness::new().await;
        h.send("555", "Connect operator").await;
        let before_operator = h.outbound.sent_to(OPERATOR).len();
        let before_user = h.outbound.sent_to("555").len();

        assert_eq!(
            h.send("555", "Disconnect operator").await,
            Outcome::OperatorDisconnected
        );

        assert_eq!(h.mode("555").await, ChatMode::Bot);
        assert_eq!(h.outbound.sent_to(OPERATOR).len(), before_operator + 1);
        let to_user = h.outbound.sent_to("555");
        assert_eq!(to_user.len(), before_user + 1);
        assert_eq!(
            to_user.last().unwrap().keyboard,
            Some(ReplyKeyboard::single("Connect operator"))
        );
    }

    #[tokio::test]
    async fn connecting_twice_stays_in_operator_mode() {
        let h = Harness::new().await;

        h.send("555", "Connect operator").await;
        let second = h.send("555", "Connect operator").await;

        assert_eq!(second, Outcome::ForwardedToOperator);
        assert_eq!(h.mode("555").await, ChatMode::Operator);
    }

    #[tokio::test]
    async fn disconnect_phrase_in_bot_mode_goes_to_responder() {
        let h = Harness::new().await;

        assert_eq!(
            h.send("555", "Disconnect operator").await,
            Outcome::Answered
        );
        assert_eq!(h.mode("555").await, ChatMode::Bot);
        assert_eq!(h.responder.calls().len(), 1);
    }

    // ── Operator mode forwarding ────────────────────────────────────────

    #[tokio::test]
    async fn operator_mode_forwards_text_verbatim() {
        let h = Harness::new().await;
        h.send("555", "Connect operator").await;

        assert_eq!(
            h.send("555", "My *order* is {late}").await,
            Outcome::ForwardedToOperator
        );

        let forwarded = h.outbound.sent_to(OPERATOR).pop().unwrap();
        assert_eq!(forwarded.format, TextFormat::Plain);
        assert!(forwarded.text.contains("555"));
        assert!(forwarded.text.contains("My *order* is {late}"));
        assert!(h.responder.calls().is_empty());
    }

    #[tokio::test]
    async fn operator_mode_forwards_reply_context() {
        let h = Harness::new().await;
        h.send("555", "Connect operator").await;

        let event = InboundEvent::new("555", "yes, that one").with_reply_to("Which order?");
        assert_eq!(
            h.router.handle(&event).await.unwrap(),
            Outcome::ForwardedToOperator
        );

        let forwarded = h.outbound.sent_to(OPERATOR).pop().unwrap();
        assert!(forwarded.text.contains("Which order?"));
        assert!(forwarded.text.contains("yes, that one"));
        assert_eq!(h.mode("555").await, ChatMode::Operator);
    }

    // ── Bot mode ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn bot_mode_logs_and_answers_every_text_in_order() {
        let h = Harness::new().await;

        for text in ["one", "two", "three"] {
            assert_eq!(h.send("555", text).await, Outcome::Answered);
        }

        assert_eq!(h.history("555").await, vec!["one", "two", "three"]);
        assert_eq!(h.responder.calls().len(), 3);
        let replies: Vec<_> = h
            .outbound
            .sent_to("555")
            .into_iter()
            .map(|m| (m.text, m.format))
            .collect();
        assert_eq!(replies, vec![
            ("re: one".to_string(), TextFormat::Plain),
            ("re: two".to_string(), TextFormat::Plain),
            ("re: three".to_string(), TextFormat::Plain),
        ]);
    }

    #[tokio::test]
    async fn conversation_context_is_per_chat() {
        let h = Harness::new().await;

        h.send("a", "from a").await;
        h.send("b", "from b").await;
        h.send("a", "again a").await;

        let calls = h.responder.calls();
        assert!(calls[1].0.is_empty());
        assert_eq!(calls[2].0, vec![
            Turn::user("from a"),
            Turn::assistant("re: from a")
        ]);
    }

    #[tokio::test]
    async fn reply_to_in_bot_mode_goes_to_responder() {
        let h = Harness::new().await;

        let event = InboundEvent::new("555", "and this?").with_reply_to("earlier answer");
        assert_eq!(h.router.handle(&event).await.unwrap(), Outcome::Answered);
        assert_eq!(h.responder.calls()[0].1, "and this?");
    }

    #[tokio::test]
    async fn responder_failure_sends_fallback_and_keeps_buffer_clean() {
        let h = Harness::with_responder(ScriptedResponder::failing_on("boom")).await;

        assert_eq!(h.send("555", "boom").await, Outcome::ResponderFallback);

        let sent = h.outbound.sent_to("555");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text, TextsConfig::default().responder_fallback);
        assert!(!sent[0].text.contains("500"));
        assert_eq!(h.router.buffers().len(&ChatId::new("555")), 0);
        assert_eq!(h.history("555").await, vec!["boom"]);
        assert_eq!(h.mode("555").await, ChatMode::Bot);
    }

    #[tokio::test]
    async fn responder_timeout_sends_fallback() {
        let h = Harness::with_responder(ScriptedResponder {
            stall: true,
            ..ScriptedResponder::default()
        })
        .await;

        assert_eq!(h.send("555", "hello").await, Outcome::ResponderFallback);
        assert_eq!(h.outbound.sent_to("555").len(), 1);
    }

    #[tokio::test]
    async fn delivery_failure_does_not_fail_the_event() {
        let h = Harness::new().await;
        h.outbound.make_unreachable("555");

        assert_eq!(h.send("555", "hello").await, Outcome::Answered);
        assert_eq!(h.history("555").await, vec!["hello"]);
    }

    // ── Relay ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn relay_sends_prefixed_reply_to_target_only() {
        let h = Harness::new().await;

        assert_eq!(h.send(OPERATOR, "555: hello there").await, Outcome::Relayed {
            target: ChatId::new("555"),
        });

        let sent = h.outbound.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].chat_id, ChatId::new("555"));
        assert_eq!(sent[0].text, "Operator reply: hello there");
        assert_eq!(sent[0].format, TextFormat::Plain);
        assert!(h.responder.calls().is_empty());
    }

    #[tokio::test]
    async fn relay_without_separator_answers_operator_only() {
        let h = Harness::new().await;

        assert_eq!(h.send(OPERATOR, "no colon here").await, Outcome::RelayRejected);

        let sent = h.outbound.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].chat_id, ChatId::new(OPERATOR));
        assert_eq!(sent[0].text, TextsConfig::default().relay_format_error);
    }

    #[tokio::test]
    async fn operator_commands_are_not_state_transitions() {
        let h = Harness::new().await;

        assert_eq!(
            h.send(OPERATOR, "Connect operator").await,
            Outcome::RelayRejected
        );
        assert_eq!(h.send(OPERATOR, "/start").await, Outcome::RelayRejected);
        assert_eq!(h.mode(OPERATOR).await, ChatMode::Bot);
    }

    #[tokio::test]
    async fn relay_to_operator_itself_is_rejected() {
        let h = Harness::new().await;

        let outcome = h.send(OPERATOR, &format!("{OPERATOR}: echo")).await;

        assert_eq!(outcome, Outcome::RelayRejected);
        assert_eq!(h.outbound.sent_to(OPERATOR).len(), 1);
    }

    #[tokio::test]
    async fn undeliverable_relay_notifies_operator() {
        let h = Harness::new().await;
        h.outbound.make_unreachable("777");

        assert_eq!(h.send(OPERATOR, "777: are you there?").await, Outcome::RelayUndelivered {
            target: ChatId::new("777"),
        });

        let to_operator = h.outbound.sent_to(OPERATOR);
        assert_eq!(to_operator.len(), 1);
        assert!(to_operator[0].text.contains("777"));
    }

    #[tokio::test]
    async fn operator_text_is_logged_in_its_own_dialogue() {
        let h = Harness::new().await;

        h.send(OPERATOR, "555: hi").await;

        assert_eq!(h.history(OPERATOR).await, vec!["555: hi"]);
        assert!(h.history("555").await.is_empty());
    }

    // ── Concurrency ─────────────────────────────────────────────────────

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_connects_transition_once() {
        let h = Harness::new().await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let router = Arc::clone(&h.router);
            handles.push(tokio::spawn(async move {
                router
                    .handle(&InboundEvent::new("555", "Connect operator"))
                    .await
                    .unwrap()
            }));
        }
        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.unwrap());
        }

        let connected = outcomes
            .iter()
            .filter(|o| **o == Outcome::OperatorConnected)
            .count();
        assert_eq!(connected, 1);
        assert_eq!(h.mode("555").await, ChatMode::Operator);
        assert_eq!(h.history("555").await.len(), 8);
        let confirmations = h
            .outbound
            .sent_to("555")
            .into_iter()
            .filter(|m| m.keyboard.is_some())
            .count();
        assert_eq!(confirmations, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn responder_failure_does_not_disturb_other_chats() {
        let h = Harness::with_responder(ScriptedResponder::failing_on("boom")).await;

        let failing = {
            let router = Arc::clone(&h.router);
            tokio::spawn(async move { router.handle(&InboundEvent::new("a", "boom")).await })
        };
        let connecting = {
            let router = Arc::clone(&h.router);
            tokio::spawn(async move {
                router
                    .handle(&InboundEvent::new("b", "Connect operator"))
                    .await
            })
        };

        assert_eq!(
            failing.await.unwrap().unwrap(),
            Outcome::ResponderFallback
        );
        assert_eq!(
            connecting.await.unwrap().unwrap(),
            Outcome::OperatorConnected
        );
        assert_eq!(h.mode("a").await, ChatMode::Bot);
        assert_eq!(h.mode("b").await, ChatMode::Operator);
        assert_eq!(h.history("a").await, vec!["boom"]);
        assert_eq!(h.history("b").await, vec!["Connect operator"]);
    }

    // ── Persistence failure ─────────────────────────────────────────────

    struct BrokenDialogues;

    #[async_trait]
    impl DialogueStore for BrokenDialogues {
        async fn ensure_dialogue(
            &self,
            _chat_id: &ChatId,
        ) -> Result<Dialogue, PersistenceError> {
            Err(PersistenceError::new("dialogues.ensure", "disk full"))
        }

        async fn append_message(
            &self,
            _dialogue: &Dialogue,
            _text: &str,
            _event_id: Option<&str>,
        ) -> Result<MessageRecord, PersistenceError> {
            Err(PersistenceError::new("dialogues.append", "disk full"))
        }

        async fn find_dialogue(
            &self,
            _chat_id: &ChatId,
        ) -> Result<Option<Dialogue>, PersistenceError> {
            Ok(None)
        }

        async fn messages(
            &self,
            _dialogue: &Dialogue,
        ) -> Result<Vec<MessageRecord>, PersistenceError> {
            Ok(Vec::new())
        }

        async fn list_dialogues(
            &self,
        ) -> Result<Vec<DialogueSummary>, PersistenceError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn persistence_failure_aborts_without_replying() {
        let pool = open_memory_pool().await.unwrap();
        let outbound = Arc::new(RecordingOutbound::default());
        let responder = Arc::new(ScriptedResponder::default());
        let router = ChatRouter::new(
            ChatId::new(OPERATOR),
            Collaborators {
                modes: Arc::new(SqliteChatModeStore::new(pool)),
                dialogues: Arc::new(BrokenDialogues),
                responder: responder.clone(),
                outbound: outbound.clone(),
            },
            TextsConfig::default(),
        );

        let err = router
            .handle(&InboundEvent::new("555", "hello"))
            .await
            .unwrap_err();

        assert_eq!(err.operation, "dialogues.ensure");
        assert!(outbound.sent().is_empty());
        assert!(responder.calls().is_empty());
    }
}
