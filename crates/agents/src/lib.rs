mod dispatcher;
mod resolver;
mod session;
#[cfg(test)]
mod testing;
mod weather;

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::{Duration, Utc};
use tracing::{info, instrument};
use waypoint_core::{
    ChatModel, ChatTurn, CurrentLocation, DispatchOutcome, Geocoder, PromptInput, WeatherLookup,
};
use waypoint_observability::AppMetrics;

pub use dispatcher::IntentDispatcher;
pub use resolver::{clean_address, LocationResolver};
pub use session::{
    session_key, ConversationSession, SessionRegistry, SharedSession, DEFAULT_MAX_TURNS,
    DEFAULT_SESSION_ID,
};
pub use weather::WeatherFetcher;

#[derive(Clone)]
pub struct Collaborators {
    pub chat_model: Arc<dyn ChatModel>,
    pub geocoder: Arc<dyn Geocoder>,
    pub weather: Arc<dyn WeatherLookup>,
    pub current_location: Arc<dyn CurrentLocation>,
}

#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub max_turns: usize,
    pub idle_ttl: Duration,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_turns: DEFAULT_MAX_TURNS,
            idle_ttl: Duration::hours(1),
        }
    }
}

#[derive(Clone)]
pub struct TravelAgent {
    sessions: Arc<SessionRegistry>,
    dispatcher: Arc<IntentDispatcher>,
    metrics: Arc<AppMetrics>,
}

impl TravelAgent {
    pub fn new(
        collaborators: Collaborators,
        settings: AgentSettings,
        metrics: Arc<AppMetrics>,
    ) -> Self {
        let sessions = SessionRegistry::new(
            collaborators.chat_model,
            settings.max_turns,
            settings.idle_ttl,
        );
        let dispatcher = IntentDispatcher::new(
            collaborators.geocoder,
            collaborators.weather,
            collaborators.current_location,
            metrics.clone(),
        );
        Self {
            sessions: Arc::new(sessions),
            dispatcher: Arc::new(dispatcher),
            metrics,
        }
    }

    /// Classifies and resolves one prompt inside the caller's conversation.
    /// Prompts for the same session are handled one at a time.
    #[instrument(skip(self, input), fields(session_id = %session_key(input.session_id.as_deref())))]
    pub async fn handle_prompt(&self, input: PromptInput) -> DispatchOutcome {
        let started = Instant::now();
        self.metrics.inc_request();

        let session = self.sessions.session(input.session_id.as_deref());
        let outcome = {
            let mut guard = session.lock().await;
            self.dispatcher
                .dispatch(&mut guard, &input.text, input.caller)
                .await
        };

        self.metrics.observe_latency(started.elapsed());
        info!(
            intent = ?outcome.intent_code(),
            actionable = outcome.is_actionable(),
            latency_ms = started.elapsed().as_millis() as u64,
            "prompt handled"
        );

        outcome
    }

    pub async fn reset_conversation(&self, session_id: Option<&str>) -> Result<String> {
        self.metrics.inc_reset();
        let ack = self.sessions.reset(session_id).await?;
        info!(session_id = %session_key(session_id), "conversation reset");
        Ok(ack)
    }

    /// Empty for a session that does not exist; reading never creates one.
    pub async fn history(&self, session_id: Option<&str>) -> Vec<ChatTurn> {
        let Some(session) = self.sessions.get(session_id) else {
            return Vec::new();
        };
        let guard = session.lock().await;
        guard.history().to_vec()
    }

    pub fn purge_idle_sessions(&self) -> usize {
        let removed = self.sessions.purge_idle(Utc::now());
        if removed > 0 {
            info!(removed, "idle conversations purged");
        }
        removed
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use waypoint_core::{ChatRole, Coordinates};

    use super::*;
    use crate::testing::{EchoModel, ScriptedModel, StubGeocoder, StubLocation, StubWeather};

    fn agent(model: Arc<dyn ChatModel>) -> (TravelAgent, Arc<AppMetrics>) {
        let metrics = AppMetrics::shared();
        let agent = TravelAgent::new(
            Collaborators {
                chat_model: model,
                geocoder: StubGeocoder::with_places(&[("Paris", (48.85, 2.35))]),
                weather: StubWeather::returning(json!({"temp": 18})),
                current_location: StubLocation::at(1.0, 1.0),
            },
            AgentSettings::default(),
            metrics.clone(),
        );
        (agent, metrics)
    }

    #[tokio::test]
    async fn handle_prompt_counts_intents() {
        let (agent, metrics) = agent(ScriptedModel::replies([
            r#"("Type_1", ["null", "Paris"])"#,
            r#"("Type_5", "?")"#,
        ]));

        let outcome = agent
            .handle_prompt(PromptInput {
                session_id: Some("s1".to_string()),
                text: "to Paris".to_string(),
                caller: Some(Coordinates::new(10.0, 20.0)),
            })
            .await;
        assert_eq!(outcome.payload.to_wire(), json!([10.0, 20.0, 48.85, 2.35]));

        let outcome = agent
            .handle_prompt(PromptInput {
                session_id: Some("s1".to_string()),
                text: "hmm".to_string(),
                caller: None,
            })
            .await;
        assert!(!outcome.is_actionable());

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_total, 2);
        assert_eq!(snapshot.intent_route_total, 1);
        assert_eq!(snapshot.unrecognized_total, 1);
        assert_eq!(agent.active_sessions(), 1);
    }

    #[tokio::test]
    async fn reset_conversation_returns_acknowledgement() {
        let (agent, metrics) = agent(ScriptedModel::replies([r#"("Type_3", "hello")"#]));
        agent
            .handle_prompt(PromptInput {
                session_id: None,
                text: "hi".to_string(),
                caller: None,
            })
            .await;

        let ack = agent.reset_conversation(None).await.unwrap();

        assert_eq!(ack, ScriptedModel::ACK);
        assert_eq!(agent.history(None).await.len(), 2);
        assert_eq!(agent.history(Some("other")).await.len(), 0);
        assert_eq!(agent.active_sessions(), 1);
        assert_eq!(metrics.snapshot().resets_total, 1);
    }

    #[tokio::test]
    async fn concurrent_prompts_on_one_session_do_not_interleave() {
        let (agent, _) = agent(EchoModel::with_delay(std::time::Duration::from_millis(20)));
        let prompt = |text: &str| PromptInput {
            session_id: Some("shared".to_string()),
            text: text.to_string(),
            caller: None,
        };

        let (first, second) = tokio::join!(
            agent.handle_prompt(prompt("first")),
            agent.handle_prompt(prompt("second"))
        );
        assert_eq!(first.text, EchoModel::reply_to("first"));
        assert_eq!(second.text, EchoModel::reply_to("second"));

        let history = agent.history(Some("shared")).await;
        assert_eq!(history.len(), 6);
        for (index, pair) in history.chunks(2).enumerate() {
            assert_eq!(pair[0].role, ChatRole::User, "turn {}", index * 2);
            assert_eq!(pair[1].role, ChatRole::Model, "turn {}", index * 2 + 1);
        }
        for pair in history.chunks(2).skip(1) {
            assert_eq!(pair[1].text, EchoModel::reply_to(&pair[0].text));
        }
    }
}
