//! Learning from disclosures
//!
//! When a lookup misses, a filler reply goes out and a time-boxed window
//! opens on the event stream. The first disclosure from the question
//! source in the same channel is parsed and committed to the store.
//!
//! A window ends in exactly one way:
//! - `Learned`: disclosure parsed and committed
//! - `Unparsed`: disclosure arrived but its text did not match
//! - `Superseded`: a new round started in the channel first, so the
//!   disclosure for this round can no longer arrive
//! - `Expired`: nothing relevant before the deadline
//!
//! Windows are registered by (channel, category, key). A repeated
//! delivery of the same round does not open another window; a later round
//! with the same key replaces the open one.
//!
//! The event subscription must be taken when the round is accepted, before
//! the image is fetched, so a round title posted meanwhile still ends the
//! window.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::{AbortHandle, JoinHandle};

use crate::classifier;
use crate::disclosure::{self, Disclosure};
use crate::scheduler::ReplyScheduler;
use crate::store::KnowledgeStore;
use crate::types::{Category, ChatEvent, Fingerprint, RoundState};

/// What a missed round needs remembered until its disclosure arrives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingFact {
    /// Image whose country is unknown
    Image { category: Category, fingerprint: Fingerprint },
    /// Country whose capital is unknown
    Capital { country: String },
}

impl PendingFact {
    pub fn category(&self) -> Category {
        match self {
            PendingFact::Image { category, .. } => *category,
            PendingFact::Capital { .. } => Category::Capital,
        }
    }

    fn key(&self) -> &str {
        match self {
            PendingFact::Image { fingerprint, .. } => fingerprint.as_str(),
            PendingFact::Capital { country } => country,
        }
    }

    /// (store key, store value) for a disclosure, if it fits this fact
    fn entry(&self, disclosure: Disclosure) -> Option<(String, String)> {
        match (self, disclosure) {
            (PendingFact::Image { fingerprint, .. }, Disclosure::Country(country)) => {
                Some((country, fingerprint.to_string()))
            }
            (PendingFact::Capital { country: asked }, Disclosure::Capital { country, capital }) => {
                if &country != asked {
                    tracing::debug!("Disclosed capital is for {:?}, asked about {:?}", country, asked);
                }
                Some((capital, country))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct WindowKey {
    channel_id: String,
    category: Category,
    key: String,
}

/// Registered window: the round that opened it and how to abort it
struct OpenWindow {
    round_id: String,
    handle: AbortHandle,
}

/// How a learning window ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LearningOutcome {
    Learned {
        category: Category,
        key: String,
        value: String,
    },
    Unparsed,
    Superseded,
    Expired,
    /// The same round already has a window open
    Duplicate,
    /// Disclosure parsed but the store refused the write
    NotSaved,
}

impl LearningOutcome {
    pub fn state(&self) -> RoundState {
        match self {
            LearningOutcome::Learned { .. } => RoundState::Learned,
            LearningOutcome::Duplicate => RoundState::Skipped,
            _ => RoundState::Expired,
        }
    }
}

#[derive(Clone)]
pub struct LearningSubscriber {
    store: KnowledgeStore,
    scheduler: ReplyScheduler,
    events: broadcast::Sender<ChatEvent>,
    question_source_id: String,
    window: Duration,
    active: Arc<Mutex<HashMap<WindowKey, OpenWindow>>>,
}

impl LearningSubscriber {
    pub fn new(
        store: KnowledgeStore,
        scheduler: ReplyScheduler,
        events: broadcast::Sender<ChatEvent>,
        question_source_id: impl Into<String>,
        window: Duration,
    ) -> Self {
        Self {
            store,
            scheduler,
            events,
            question_source_id: question_source_id.into(),
            window,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Subscription for a round that may end up learning. Take it as soon
    /// as the round is accepted and hand it to [`learn`](Self::learn).
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    /// Send the filler reply and open a learning window for `pending`.
    ///
    /// `round_id` identifies the question message. `subscription` must
    /// come from [`subscribe`](Self::subscribe) and predate the lookup.
    pub fn learn(
        &self,
        round_id: &str,
        channel_id: &str,
        pending: PendingFact,
        subscription: broadcast::Receiver<ChatEvent>,
    ) -> JoinHandle<LearningOutcome> {
        let window_key = WindowKey {
            channel_id: channel_id.to_string(),
            category: pending.category(),
            key: pending.key().to_string(),
        };
        let channel_id = channel_id.to_string();
        let this = self.clone();

        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(open) = active.get(&window_key) {
            if open.round_id == round_id {
                tracing::debug!("Learning window already open for {} in {}", pending.category(), channel_id);
                return tokio::spawn(async move {
                    let _ = this.scheduler.send_now(&channel_id, pending.category().filler()).await;
                    LearningOutcome::Duplicate
                });
            }
            // Same fact shown again in a later round
            tracing::debug!("Replacing {} window in {} for round {}", pending.category(), channel_id, round_id);
            open.handle.abort();
        }

        let key = window_key.clone();
        let round = round_id.to_string();
        let handle = tokio::spawn(async move {
            let outcome = this.run_window(&channel_id, &pending, subscription).await;
            let mut active = this.active.lock().unwrap_or_else(PoisonError::into_inner);
            if active.get(&key).is_some_and(|open| open.round_id == round) {
                active.remove(&key);
            }
            outcome
        });

        active.insert(
            window_key,
            OpenWindow {
                round_id: round_id.to_string(),
                handle: handle.abort_handle(),
            },
        );
        handle
    }

    /// Number of windows currently open
    pub fn active_count(&self) -> usize {
        self.active.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Abort every open window without writing anything
    pub fn cancel_all(&self) -> usize {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        let cancelled = active.len();
        for (_, open) in active.drain() {
            open.handle.abort();
        }
        cancelled
    }

    async fn run_window(
        &self,
        channel_id: &str,
        pending: &PendingFact,
        mut receiver: broadcast::Receiver<ChatEvent>,
    ) -> LearningOutcome {
        let category = pending.category();
        let _ = self.scheduler.send_now(channel_id, category.filler()).await;
        tracing::info!("No {} match in {}, waiting for disclosure", category, channel_id);

        let event = match tokio::time::timeout(self.window, self.next_relevant(channel_id, &mut receiver)).await {
            Ok(Some(Relevant::Disclosure(event))) => event,
            Ok(Some(Relevant::NewRound)) => {
                tracing::info!("New round in {} before disclosure, dropping {} window", channel_id, category);
                return LearningOutcome::Superseded;
            }
            Ok(None) | Err(_) => {
                tracing::info!("No disclosure for {} in {} within {:?}", category, channel_id, self.window);
                return LearningOutcome::Expired;
            }
        };

        let parsed = match disclosure::parse(category, &event) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Could not learn from disclosure in {}: {}", channel_id, e);
                return LearningOutcome::Unparsed;
            }
        };

        let Some((key, value)) = pending.entry(parsed) else {
            return LearningOutcome::Unparsed;
        };

        match self.store.commit(category, &key, &value).await {
            Ok(_) => {
                tracing::info!("New {} entry added: {}", category, key);
                LearningOutcome::Learned { category, key, value }
            }
            Err(e) => {
                tracing::error!("Error saving learned {} entry {:?}: {}", category, key, e);
                LearningOutcome::NotSaved
            }
        }
    }

    /// Wait for the disclosure or the start of the next round in `channel_id`
    async fn next_relevant(
        &self,
        channel_id: &str,
        receiver: &mut broadcast::Receiver<ChatEvent>,
    ) -> Option<Relevant> {
        loop {
            let event = match receiver.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Learning window lagged, skipped {} events", skipped);
                    continue;
                }
                Err(RecvError::Closed) => return None,
            };

            if event.channel_id != channel_id || event.author_id != self.question_source_id {
                continue;
            }

            if disclosure::is_disclosure(&event, &self.question_source_id) {
                return Some(Relevant::Disclosure(event));
            }

            let new_round = event
                .primary_embed()
                .and_then(|embed| embed.title.as_deref())
                .map(classifier::is_round_title)
                .unwrap_or(false);
            if new_round {
                return Some(Relevant::NewRound);
            }
        }
    }
}

enum Relevant {
    Disclosure(ChatEvent),
    NewRound,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint_bytes;
    use crate::gateway::RecordingGateway;
    use crate::types::Embed;
    use chrono::Utc;
    use tempfile::tempdir;
    use tokio::time::Instant;

    const SOURCE: &str = "source-bot";

    struct Harness {
        learning: LearningSubscriber,
        store: KnowledgeStore,
        gateway: Arc<RecordingGateway>,
        events: broadcast::Sender<ChatEvent>,
        _dir: tempfile::TempDir,
    }

    fn setup() -> Harness {
        let dir = tempdir().unwrap();
        let store = KnowledgeStore::new(dir.path());
        let gateway = Arc::new(RecordingGateway::default());
        let (events, _) = broadcast::channel(16);
        let learning = LearningSubscriber::new(
            store.clone(),
            ReplyScheduler::new(gateway.clone()),
            events.clone(),
            SOURCE,
            Duration::from_secs(50),
        );
        Harness {
            learning,
            store,
            gateway,
            events,
            _dir: dir,
        }
    }

    fn message(author: &str, channel: &str, title: &str, description: &str) -> ChatEvent {
        ChatEvent {
            id: format!("{}-{}", author, title),
            author_id: author.to_string(),
            channel_id: channel.to_string(),
            embeds: vec![Embed {
                title: Some(title.to_string()),
                description: Some(description.to_string()),
                image: None,
            }],
            received_at: Utc::now(),
        }
    }

    fn open(h: &Harness, round: &str, channel: &str, pending: PendingFact) -> JoinHandle<LearningOutcome> {
        h.learning.learn(round, channel, pending, h.learning.subscribe())
    }

    fn flag_miss(bytes: &[u8]) -> PendingFact {
        PendingFact::Image {
            category: Category::Flag,
            fingerprint: fingerprint_bytes(bytes),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_learns_country_from_disclosure() {
        let h = setup();
        let pending = flag_miss(b"german flag");
        let fp = fingerprint_bytes(b"german flag");

        let handle = open(&h, "q1", "chan", pending);
        assert_eq!(h.learning.active_count(), 1);

        // Noise the window must skip
        h.events
            .send(message("player", "chan", "No one got it right!", "**Wrong**"))
            .unwrap();
        h.events
            .send(message(SOURCE, "elsewhere", "No one got it right!", "**Wrong**"))
            .unwrap();
        h.events
            .send(message(SOURCE, "chan", "No one got it right!", "It was **Germany**!"))
            .unwrap();

        let outcome = handle.await.unwrap();
        assert_eq!(
            outcome,
            LearningOutcome::Learned {
                category: Category::Flag,
                key: "Germany".to_string(),
                value: fp.to_string(),
            }
        );
        assert_eq!(outcome.state(), RoundState::Learned);
        assert_eq!(h.store.find_key(Category::Flag, fp.as_str()).await, Some("Germany".to_string()));
        assert_eq!(h.gateway.texts(), vec!["huH".to_string()]);
        assert_eq!(h.learning.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_expires_without_disclosure() {
        let h = setup();
        let start = Instant::now();

        let outcome = open(&h, "q1", "chan", flag_miss(b"x")).await.unwrap();

        assert_eq!(outcome, LearningOutcome::Expired);
        assert_eq!(outcome.state(), RoundState::Expired);
        assert!(start.elapsed() >= Duration::from_secs(50));
        assert!(h.store.load(Category::Flag).await.is_empty());
        assert!(!h.store.path(Category::Flag).exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_disclosure_is_ignored() {
        let h = setup();
        let handle = open(&h, "q1", "chan", flag_miss(b"x"));

        tokio::time::sleep(Duration::from_secs(51)).await;
        let _ = h
            .events
            .send(message(SOURCE, "chan", "No one got it right!", "**Chad**"));

        assert_eq!(handle.await.unwrap(), LearningOutcome::Expired);
        assert!(h.store.load(Category::Flag).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unparseable_disclosure_writes_nothing() {
        let h = setup();
        let handle = open(&h, "q1", "chan", flag_miss(b"x"));
        h.events
            .send(message(SOURCE, "chan", "No one got it right!", "It was Germany"))
            .unwrap();

        assert_eq!(handle.await.unwrap(), LearningOutcome::Unparsed);
        assert!(h.store.load(Category::Flag).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_learns_capital_pair() {
        let h = setup();
        let handle = open(
            &h,
            "q1",
            "chan",
            PendingFact::Capital {
                country: "France".to_string(),
            },
        );
        h.events
            .send(message(
                SOURCE,
                "chan",
                "No one got it right!",
                "The capital of **France** is **Paris**",
            ))
            .unwrap();

        let outcome = handle.await.unwrap();
        assert!(matches!(outcome, LearningOutcome::Learned { .. }));
        assert_eq!(h.store.find_key(Category::Capital, "France").await, Some("Paris".to_string()));
        assert_eq!(h.gateway.texts(), vec!["NuH".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_round_supersedes_window() {
        let h = setup();
        let stale = open(&h, "q1", "chan", flag_miss(b"round one"));

        h.events
            .send(message(SOURCE, "chan", "Question 2 of 10", "To which country..."))
            .unwrap();
        assert_eq!(stale.await.unwrap(), LearningOutcome::Superseded);

        // The next round's disclosure must not be credited to round one
        let fresh = open(&h, "q2", "chan", flag_miss(b"round two"));
        h.events
            .send(message(SOURCE, "chan", "No one got it right!", "**Chile**"))
            .unwrap();
        assert!(matches!(fresh.await.unwrap(), LearningOutcome::Learned { .. }));

        let table = h.store.load(Category::Flag).await;
        assert_eq!(table.len(), 1);
        assert_eq!(table["Chile"], fingerprint_bytes(b"round two").to_string());
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_window_is_not_opened() {
        let h = setup();
        let first = open(&h, "q1", "chan", flag_miss(b"same"));
        let second = open(&h, "q1", "chan", flag_miss(b"same"));

        assert_eq!(second.await.unwrap(), LearningOutcome::Duplicate);
        assert_eq!(h.learning.active_count(), 1);

        h.events
            .send(message(SOURCE, "chan", "No one got it right!", "**Peru**"))
            .unwrap();
        assert!(matches!(first.await.unwrap(), LearningOutcome::Learned { .. }));
        assert_eq!(h.gateway.texts(), vec!["huH".to_string(), "huH".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_windows_in_different_channels_are_independent() {
        let h = setup();
        let a = open(&h, "qa", "a", flag_miss(b"one"));
        let b = open(&h, "qb", "b", flag_miss(b"two"));
        assert_eq!(h.learning.active_count(), 2);

        h.events
            .send(message(SOURCE, "b", "No one got it right!", "**Togo**"))
            .unwrap();
        assert!(matches!(b.await.unwrap(), LearningOutcome::Learned { .. }));
        assert_eq!(a.await.unwrap(), LearningOutcome::Expired);

        let table = h.store.load(Category::Flag).await;
        assert_eq!(table.len(), 1);
        assert_eq!(table["Togo"], fingerprint_bytes(b"two").to_string());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_aborts_windows() {
        let h = setup();
        let handle = open(&h, "q1", "chan", flag_miss(b"x"));
        tokio::task::yield_now().await;

        assert_eq!(h.learning.cancel_all(), 1);
        assert!(handle.await.unwrap_err().is_cancelled());
        assert_eq!(h.learning.active_count(), 0);
        assert!(h.store.load(Category::Flag).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_round_with_same_image_replaces_window() {
        let h = setup();
        let first = open(&h, "q1", "chan", flag_miss(b"same"));
        tokio::task::yield_now().await;

        // Next round shows the same flag before the first window noticed
        let second = open(&h, "q2", "chan", flag_miss(b"same"));
        assert_eq!(h.learning.active_count(), 1);
        assert!(first.await.unwrap_err().is_cancelled());

        h.events
            .send(message(SOURCE, "chan", "No one got it right!", "**Peru**"))
            .unwrap();
        assert!(matches!(second.await.unwrap(), LearningOutcome::Learned { .. }));
        assert_eq!(h.learning.active_count(), 0);
        assert_eq!(
            h.store.find_key(Category::Flag, fingerprint_bytes(b"same").as_str()).await,
            Some("Peru".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_title_before_window_starts_still_supersedes() {
        let h = setup();
        // Subscribed when the question arrived, lookup still running
        let subscription = h.learning.subscribe();
        h.events
            .send(message(SOURCE, "chan", "Question 2 of 10", "To which country..."))
            .unwrap();
        h.events
            .send(message(SOURCE, "chan", "No one got it right!", "**Chile**"))
            .unwrap();

        let outcome = h
            .learning
            .learn("q1", "chan", flag_miss(b"round one"), subscription)
            .await
            .unwrap();
        assert_eq!(outcome, LearningOutcome::Superseded);
        assert!(h.store.load(Category::Flag).await.is_empty());
    }
}
