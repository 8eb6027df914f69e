// src/services/source.rs

//! Page sources.
//!
//! A [`PageSource`] yields the event listing, each event's participant
//! list, and each participant's raw detail fragment. The extraction run
//! only ever talks to a source through [`RetryingSource`], which bounds
//! every call with a timeout and retries transient failures.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{Event, ExtractConfig, Fragment, ParticipantRef};

/// Source of events, participant lists and participant fragments.
#[async_trait]
pub trait PageSource: Send {
    /// All events on the listing, in listing order.
    async fn list_events(&mut self) -> Result<Vec<Event>>;

    /// Participants of one event, in page order.
    async fn list_participants(&mut self, event: &Event) -> Result<Vec<ParticipantRef>>;

    /// Raw detail of one participant.
    async fn fetch_participant(
        &mut self,
        event: &Event,
        participant: &ParticipantRef,
    ) -> Result<Fragment>;
}

#[async_trait]
impl<'a, S: PageSource + ?Sized> PageSource for &'a mut S {
    async fn list_events(&mut self) -> Result<Vec<Event>> {
        (**self).list_events().await
    }

    async fn list_participants(&mut self, event: &Event) -> Result<Vec<ParticipantRef>> {
        (**self).list_participants(event).await
    }

    async fn fetch_participant(
        &mut self,
        event: &Event,
        participant: &ParticipantRef,
    ) -> Result<Fragment> {
        (**self).fetch_participant(event, participant).await
    }
}

/// Timeout and retry settings for page-source calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    /// Linear backoff step: the n-th retry waits `n * backoff`
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ExtractConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.fetch_timeout_secs.max(1)),
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }
}

/// Runs `$call` under the policy's timeout, retrying transient errors.
macro_rules! with_retry {
    ($policy:expr, $context:expr, $call:expr) => {{
        let policy: RetryPolicy = $policy;
        let context: String = $context;
        let mut attempt: u32 = 0;
        loop {
            let outcome = match tokio::time::timeout(policy.timeout, $call).await {
                Ok(result) => result,
                Err(_) => Err(AppError::Timeout {
                    context: context.clone(),
                    secs: policy.timeout.as_secs(),
                }),
            };
            match outcome {
                Ok(value) => break Ok(value),
                Err(e) if attempt < policy.max_retries && e.is_transient() => {
                    attempt += 1;
                    let wait = policy.backoff * attempt;
                    log::warn!(
                        "{} failed (attempt {}/{}): {}; retrying in {:?}",
                        context,
                        attempt,
                        policy.max_retries + 1,
                        e,
                        wait
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => break Err(e),
            }
        }
    }};
}

/// Wraps a source with bounded waits and retries.
pub struct RetryingSource<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: PageSource> RetryingSource<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

#[async_trait]
impl<S: PageSource> PageSource for RetryingSource<S> {
    async fn list_events(&mut self) -> Result<Vec<Event>> {
        with_retry!(
            self.policy,
            "event listing".to_string(),
            self.inner.list_events()
        )
    }

    async fn list_participants(&mut self, event: &Event) -> Result<Vec<ParticipantRef>> {
        with_retry!(
            self.policy,
            format!("participant list of {}", event.id),
            self.inner.list_participants(event)
        )
    }

    async fn fetch_participant(
        &mut self,
        event: &Event,
        participant: &ParticipantRef,
    ) -> Result<Fragment> {
        with_retry!(
            self.policy,
            format!("participant {} of {}", participant.id, event.id),
            self.inner.fetch_participant(event, participant)
        )
    }
}

/// A participant as stored in a capture file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedParticipant {
    #[serde(flatten)]
    pub reference: ParticipantRef,

    #[serde(default)]
    pub fragment: Fragment,

    /// Makes fetching this participant fail with the given message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// An event as stored in a capture file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedEvent {
    #[serde(flatten)]
    pub event: Event,

    #[serde(default)]
    pub participants: Vec<CapturedParticipant>,

    /// Makes listing this event's participants fail with the given message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Contents of a capture file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Capture {
    #[serde(default)]
    pub events: Vec<CapturedEvent>,
}

/// Serves pages from a previously captured JSON document.
#[derive(Debug, Default)]
pub struct ReplaySource {
    capture: Capture,
    by_id: HashMap<String, usize>,
    calls: Vec<String>,
}

impl ReplaySource {
    pub fn new(capture: Capture) -> Self {
        let by_id = capture
            .events
            .iter()
            .enumerate()
            .map(|(i, e)| (e.event.id.clone(), i))
            .collect();
        Self {
            capture,
            by_id,
            calls: Vec::new(),
        }
    }

    /// Load a capture file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let capture: Capture = crate::utils::fs::load_json(path)?;
        log::info!(
            "Loaded capture {} with {} events",
            path.display(),
            capture.events.len()
        );
        Ok(Self::new(capture))
    }

    /// Calls served so far, e.g. `participants:e1` or `fetch:e1/p3`.
    pub fn calls(&self) -> &[String] {
        &self.calls
    }

    fn event(&self, event: &Event) -> Result<&CapturedEvent> {
        self.by_id
            .get(&event.id)
            .map(|i| &self.capture.events[*i])
            .ok_or_else(|| AppError::fetch(&event.id, "event not in capture"))
    }
}

#[async_trait]
impl PageSource for ReplaySource {
    async fn list_events(&mut self) -> Result<Vec<Event>> {
        self.calls.push("events".to_string());
        Ok(self
            .capture
            .events
            .iter()
            .map(|e| e.event.clone())
            .collect())
    }

    async fn list_participants(&mut self, event: &Event) -> Result<Vec<ParticipantRef>> {
        self.calls.push(format!("participants:{}", event.id));
        let captured = self.event(event)?;
        if let Some(message) = &captured.error {
            return Err(AppError::fetch(&event.id, message));
        }
        Ok(captured
            .participants
            .iter()
            .map(|p| p.reference.clone())
            .collect())
    }

    async fn fetch_participant(
        &mut self,
        event: &Event,
        participant: &ParticipantRef,
    ) -> Result<Fragment> {
        self.calls
            .push(format!("fetch:{}/{}", event.id, participant.id));
        let context = format!("{}/{}", event.id, participant.id);
        let captured = self
            .event(event)?
            .participants
            .iter()
            .find(|p| p.reference.id == participant.id)
            .ok_or_else(|| AppError::fetch(&context, "participant not in capture"))?;
        match &captured.error {
            Some(message) => Err(AppError::fetch(&context, message)),
            None => Ok(captured.fragment.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FragmentItem;

    /// Fails the first `failures` calls, then succeeds.
    struct Flaky {
        failures: usize,
        calls: usize,
        transient: bool,
    }

    #[async_trait]
    impl PageSource for Flaky {
        async fn list_events(&mut self) -> Result<Vec<Event>> {
            self.calls += 1;
            if self.calls <= self.failures {
                if self.transient {
                    return Err(AppError::fetch("listing", "connection reset"));
                }
                return Err(AppError::validation("malformed listing"));
            }
            Ok(vec![Event::default()])
        }

        async fn list_participants(&mut self, _event: &Event) -> Result<Vec<ParticipantRef>> {
            std::future::pending().await
        }

        async fn fetch_participant(
            &mut self,
            _event: &Event,
            _participant: &ParticipantRef,
        ) -> Result<Fragment> {
            Ok(Vec::new())
        }
    }

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(50),
            max_retries,
            backoff: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let flaky = Flaky { failures: 2, calls: 0, transient: true };
        let mut source = RetryingSource::new(flaky, policy(2));
        assert_eq!(source.list_events().await.unwrap().len(), 1);
        assert_eq!(source.into_inner().calls, 3);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let flaky = Flaky { failures: 5, calls: 0, transient: true };
        let mut source = RetryingSource::new(flaky, policy(1));
        assert!(source.list_events().await.is_err());
        assert_eq!(source.into_inner().calls, 2);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let flaky = Flaky { failures: 1, calls: 0, transient: false };
        let mut source = RetryingSource::new(flaky, policy(3));
        assert!(source.list_events().await.is_err());
        assert_eq!(source.into_inner().calls, 1);
    }

    #[tokio::test]
    async fn hung_call_times_out() {
        let flaky = Flaky { failures: 0, calls: 0, transient: true };
        let mut source = RetryingSource::new(flaky, policy(0));
        let err = source.list_participants(&Event::default()).await.unwrap_err();
        assert!(matches!(err, AppError::Timeout { .. }));
    }

    #[tokio::test]
    async fn replay_serves_capture_and_injected_errors() {
        let capture: Capture = serde_json::from_value(serde_json::json!({
            "events": [{
                "id": "e1",
                "url": "https://example.com/zone/events/e1",
                "title": "Trofeo",
                "participants": [
                    {"id": "p1", "fragment": [{"kind": "pair", "label": "Perro", "value": "Luna"}]},
                    {"id": "p2", "error": "detail did not render"}
                ]
            }]
        }))
        .unwrap();
        let mut source = ReplaySource::new(capture);

        let events = source.list_events().await.unwrap();
        assert_eq!(events[0].title, "Trofeo");
        let refs = source.list_participants(&events[0]).await.unwrap();
        assert_eq!(refs.len(), 2);

        let fragment = source.fetch_participant(&events[0], &refs[0]).await.unwrap();
        assert_eq!(fragment, vec![FragmentItem::pair("Perro", "Luna")]);
        assert!(source.fetch_participant(&events[0], &refs[1]).await.is_err());
        assert_eq!(source.calls().len(), 4);
    }
}
