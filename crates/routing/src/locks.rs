use std::sync::Arc;

use {
    dashmap::DashMap,
    relaydesk_common::ChatId,
    tokio::sync::{Mutex, OwnedMutexGuard},
};

type LockMap = DashMap<ChatId, Arc<Mutex<()>>>;

/// One async mutex per chat identifier, created on demand.
///
/// Entries are removed when the last holder or waiter lets go, so the map
/// only ever holds chats with an event in flight.
#[derive(Clone, Default)]
pub struct ChatLocks {
    inner: Arc<LockMap>,
}

impl ChatLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `chat_id`. Other chats are unaffected.
    pub async fn acquire(&self, chat_id: &ChatId) -> ChatLockGuard {
        // Clone out first: no shard lock may be held across the await.
        let mutex = Arc::clone(&self.inner.entry(chat_id.clone()).or_default());
        let guard = mutex.lock_owned().await;
        ChatLockGuard {
            chat_id: chat_id.clone(),
            locks: Arc::clone(&self.inner),
            guard: Some(guard),
        }
    }

    /// Chats that currently have a holder or waiter.
    pub fn active(&self) -> usize {
        self.inner.len()
    }
}

pub struct ChatLockGuard {
    chat_id: ChatId,
    locks: Arc<LockMap>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ChatLockGuard {
    fn drop(&mut self) {
        self.guard.take();
        // A waiter holds its own clone, so a count of one means nobody else
        // is interested in this chat.
        self.locks
            .remove_if(&self.chat_id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
