use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::debug;
use waypoint_core::{ChatModel, ChatTurn, CLASSIFIER_PREAMBLE};

pub const DEFAULT_SESSION_ID: &str = "default";
pub const DEFAULT_MAX_TURNS: usize = 40;

// The preamble and the model's acknowledgement.
const PREAMBLE_TURNS: usize = 2;
const MIN_MAX_TURNS: usize = PREAMBLE_TURNS + 2;

/// One conversation with the chat model. The preamble exchange is always the
/// first two turns of a primed session.
pub struct ConversationSession {
    model: Arc<dyn ChatModel>,
    history: Vec<ChatTurn>,
    primed: bool,
    max_turns: usize,
    last_active: DateTime<Utc>,
}

impl ConversationSession {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self::with_max_turns(model, DEFAULT_MAX_TURNS)
    }

    pub fn with_max_turns(model: Arc<dyn ChatModel>, max_turns: usize) -> Self {
        Self {
            model,
            history: Vec::new(),
            primed: false,
            max_turns: max_turns.max(MIN_MAX_TURNS),
            last_active: Utc::now(),
        }
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    pub fn is_primed(&self) -> bool {
        self.primed
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        self.last_active
    }

    /// Sends `text` and returns the raw reply. Primes the session first if
    /// it has not been primed yet.
    pub async fn send(&mut self, text: &str) -> Result<String> {
        if !self.primed {
            self.prime().await?;
        }
        let reply = self.exchange(text).await?;
        self.trim();
        Ok(reply)
    }

    /// Drops all history and re-sends the preamble. Returns the model's
    /// acknowledgement. On failure the session is left empty and unprimed.
    pub async fn reset(&mut self) -> Result<String> {
        self.history.clear();
        self.primed = false;
        self.prime().await
    }

    async fn prime(&mut self) -> Result<String> {
        let ack = self.exchange(CLASSIFIER_PREAMBLE).await?;
        self.primed = true;
        debug!(ack_len = ack.len(), "conversation primed");
        Ok(ack)
    }

    // History is only touched once the model has answered, so an error, a
    // panic or a dropped future all leave it as it was.
    async fn exchange(&mut self, text: &str) -> Result<String> {
        let turn = ChatTurn::user(text);
        let mut request = Vec::with_capacity(self.history.len() + 1);
        request.extend_from_slice(&self.history);
        request.push(turn.clone());

        let reply = self.model.complete(&request).await?;
        self.history.push(turn);
        self.history.push(ChatTurn::model(reply.clone()));
        self.last_active = Utc::now();
        Ok(reply)
    }

    fn trim(&mut self) {
        if self.history.len() <= self.max_turns {
            return;
        }
        let mut excess = self.history.len() - self.max_turns;
        excess += excess % 2;
        let end = (PREAMBLE_TURNS + excess).min(self.history.len());
        self.history.drain(PREAMBLE_TURNS..end);
    }
}

pub type SharedSession = Arc<Mutex<ConversationSession>>;

pub fn session_key(session_id: Option<&str>) -> String {
    session_id
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_SESSION_ID)
        .to_string()
}

/// Conversations keyed by session id. Each session has its own async lock,
/// held by a caller for a whole send-and-dispatch cycle.
pub struct SessionRegistry {
    model: Arc<dyn ChatModel>,
    sessions: RwLock<HashMap<String, SharedSession>>,
    max_turns: usize,
    idle_ttl: Duration,
}

impl SessionRegistry {
    pub fn new(model: Arc<dyn ChatModel>, max_turns: usize, idle_ttl: Duration) -> Self {
        Self {
            model,
            sessions: RwLock::new(HashMap::new()),
            max_turns,
            idle_ttl,
        }
    }

    pub fn session(&self, session_id: Option<&str>) -> SharedSession {
        let key = session_key(session_id);
        if let Some(session) = self.sessions.read().get(&key) {
            return session.clone();
        }

        self.sessions
            .write()
            .entry(key)
            .or_insert_with(|| {
                Arc::new(Mutex::new(ConversationSession::with_max_turns(
                    self.model.clone(),
                    self.max_turns,
                )))
            })
            .clone()
    }

    /// Looks up an existing session without creating one.
    pub fn get(&self, session_id: Option<&str>) -> Option<SharedSession> {
        self.sessions.read().get(&session_key(session_id)).cloned()
    }

    pub async fn reset(&self, session_id: Option<&str>) -> Result<String> {
        let session = self.session(session_id);
        let mut guard = session.lock().await;
        guard.reset().await
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Removes sessions idle for longer than the TTL. Sessions currently in
    /// use are kept.
    pub fn purge_idle(&self, now: DateTime<Utc>) -> usize {
        let mut removed = 0usize;
        self.sessions.write().retain(|_, session| {
            let Ok(guard) = session.try_lock() else {
                return true;
            };
            let keep = now - guard.last_active() <= self.idle_ttl;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }
}
