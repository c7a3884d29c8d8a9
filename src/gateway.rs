//! Outbound messaging and display-name lookup

use crate::errors::GatewayError;
use crate::games::types::{ScopeId, UserId};
use async_trait::async_trait;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Notify;
use tracing::warn;

pub type MessageId = u64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    /// Command text sent back when the button is pressed
    pub command: String,
}

impl Button {
    pub fn new(label: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            command: command.into(),
        }
    }
}

/// Inline keyboard attached to a message, row by row
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn row(mut self, buttons: Vec<Button>) -> Self {
        self.rows.push(buttons);
        self
    }
}

#[async_trait]
pub trait MessageGateway: Send + Sync {
    async fn send(&self, scope: ScopeId, text: &str, keyboard: Option<Keyboard>) -> Result<MessageId, GatewayError>;
    async fn delete_message(&self, scope: ScopeId, message_id: MessageId) -> Result<(), GatewayError>;
    async fn pin(&self, scope: ScopeId, message_id: MessageId) -> Result<(), GatewayError>;
    async fn unpin(&self, scope: ScopeId, message_id: MessageId) -> Result<(), GatewayError>;
}

/// Send and log instead of failing the caller; game flow never depends on delivery
pub async fn notify(gateway: &dyn MessageGateway, scope: ScopeId, text: &str, keyboard: Option<Keyboard>) -> Option<MessageId> {
    match gateway.send(scope, text, keyboard).await {
        Ok(id) => Some(id),
        Err(e) => {
            warn!(scope, error = %e, "Message delivery failed");
            None
        }
    }
}

/// Line emitted by [`ConsoleGateway`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum GatewayAction {
    Send {
        scope: ScopeId,
        message_id: MessageId,
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        keyboard: Option<Keyboard>,
    },
    Delete { scope: ScopeId, message_id: MessageId },
    Pin { scope: ScopeId, message_id: MessageId },
    Unpin { scope: ScopeId, message_id: MessageId },
}

/// Writes every action as a JSON line on stdout
pub struct ConsoleGateway {
    next_id: AtomicU64,
    stdout: tokio::sync::Mutex<tokio::io::Stdout>,
}

impl ConsoleGateway {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            stdout: tokio::sync::Mutex::new(tokio::io::stdout()),
        }
    }

    async fn emit(&self, scope: ScopeId, action: &GatewayAction) -> Result<(), GatewayError> {
        let failed = |reason: String| GatewayError::DeliveryFailed { scope, reason };
        let mut line = serde_json::to_vec(action).map_err(|e| failed(e.to_string()))?;
        line.push(b'\n');
        let mut stdout = self.stdout.lock().await;
        stdout.write_all(&line).await.map_err(|e| failed(e.to_string()))?;
        stdout.flush().await.map_err(|e| failed(e.to_string()))
    }
}

impl Default for ConsoleGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageGateway for ConsoleGateway {
    async fn send(&self, scope: ScopeId, text: &str, keyboard: Option<Keyboard>) -> Result<MessageId, GatewayError> {
        let message_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let action = GatewayAction::Send {
            scope,
            message_id,
            text: text.to_string(),
            keyboard,
        };
        self.emit(scope, &action).await?;
        Ok(message_id)
    }

    async fn delete_message(&self, scope: ScopeId, message_id: MessageId) -> Result<(), GatewayError> {
        self.emit(scope, &GatewayAction::Delete { scope, message_id }).await
    }

    async fn pin(&self, scope: ScopeId, message_id: MessageId) -> Result<(), GatewayError> {
        self.emit(scope, &GatewayAction::Pin { scope, message_id }).await
    }

    async fn unpin(&self, scope: ScopeId, message_id: MessageId) -> Result<(), GatewayError> {
        self.emit(scope, &GatewayAction::Unpin { scope, message_id }).await
    }
}

/// Keeps every action in memory so tests can assert on what was sent
#[derive(Default)]
pub struct RecordingGateway {
    next_id: AtomicU64,
    actions: Mutex<Vec<GatewayAction>>,
    changed: Notify,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, action: GatewayAction) {
        self.actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(action);
        self.changed.notify_waiters();
    }

    pub fn actions(&self) -> Vec<GatewayAction> {
        self.actions.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Texts sent to `scope`, oldest first
    pub fn texts(&self, scope: ScopeId) -> Vec<String> {
        self.actions()
            .into_iter()
            .filter_map(|action| match action {
                GatewayAction::Send { scope: s, text, .. } if s == scope => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn last_text(&self, scope: ScopeId) -> Option<String> {
        self.texts(scope).pop()
    }

    pub fn clear(&self) {
        self.actions.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// Wait until some text sent to `scope` contains `needle`
    pub async fn wait_for(&self, scope: ScopeId, needle: &str, timeout: Duration) -> bool {
        let search = async {
            loop {
                let notified = self.changed.notified();
                if self.texts(scope).iter().any(|t| t.contains(needle)) {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, search).await.is_ok()
    }
}

#[async_trait]
impl MessageGateway for RecordingGateway {
    async fn send(&self, scope: ScopeId, text: &str, keyboard: Option<Keyboard>) -> Result<MessageId, GatewayError> {
        let message_id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.record(GatewayAction::Send {
            scope,
            message_id,
            text: text.to_string(),
            keyboard,
        });
        Ok(message_id)
    }

    async fn delete_message(&self, scope: ScopeId, message_id: MessageId) -> Result<(), GatewayError> {
        self.record(GatewayAction::Delete { scope, message_id });
        Ok(())
    }

    async fn pin(&self, scope: ScopeId, message_id: MessageId) -> Result<(), GatewayError> {
        self.record(GatewayAction::Pin { scope, message_id });
        Ok(())
    }

    async fn unpin(&self, scope: ScopeId, message_id: MessageId) -> Result<(), GatewayError> {
        self.record(GatewayAction::Unpin { scope, message_id });
        Ok(())
    }
}

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn display_name(&self, user: UserId) -> Result<String, GatewayError>;
}

pub fn mention(user: UserId) -> String {
    format!("[id{}|id{}]", user, user)
}

/// Renders users as platform mentions without any lookup
#[derive(Debug, Default, Clone, Copy)]
pub struct MentionIdentity;

#[async_trait]
impl IdentityResolver for MentionIdentity {
    async fn display_name(&self, user: UserId) -> Result<String, GatewayError> {
        Ok(mention(user))
    }
}

/// LRU cache in front of a slower resolver
pub struct CachedIdentity<R> {
    inner: R,
    cache: Mutex<LruCache<UserId, String>>,
}

impl<R: IdentityResolver> CachedIdentity<R> {
    pub fn new(inner: R, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }
}

#[async_trait]
impl<R: IdentityResolver> IdentityResolver for CachedIdentity<R> {
    async fn display_name(&self, user: UserId) -> Result<String, GatewayError> {
        if let Some(name) = self.cache.lock().unwrap_or_else(PoisonError::into_inner).get(&user) {
            return Ok(name.clone());
        }
        let name = self.inner.display_name(user).await?;
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .put(user, name.clone());
        Ok(name)
    }
}

/// Resolve many names, falling back to a mention when lookup fails
pub async fn display_names(
    identity: &dyn IdentityResolver,
    users: impl IntoIterator<Item = UserId>,
) -> HashMap<UserId, String> {
    let mut names = HashMap::new();
    for user in users {
        if names.contains_key(&user) {
            continue;
        }
        let name = identity.display_name(user).await.unwrap_or_else(|e| {
            warn!(user, error = %e, "Display name lookup failed");
            mention(user)
        });
        names.insert(user, name);
    }
    names
}
