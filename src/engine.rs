//! The match-or-learn loop
//!
//! Every accepted event is handled in its own task: classify, resolve,
//! then either schedule a reply or open a learning window. Events from
//! other authors or channels never reach the core.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::classifier;
use crate::config::{Config, DelayRange};
use crate::error::OracleResult;
use crate::fingerprint::Fingerprinter;
use crate::learning::{LearningOutcome, LearningSubscriber};
use crate::resolver::{AnswerResolver, Resolution};
use crate::scheduler::{ChatGateway, ReplyScheduler};
use crate::store::KnowledgeStore;
use crate::types::{ChatEvent, Classification, RoundState};

pub const HASH_FAILURE_NOTICE: &str = "Failed to hash the image.";

/// What happened to one inbound event
#[derive(Debug)]
pub struct RoundReport {
    pub state: RoundState,
    pub classification: Option<Classification>,
    /// Pending reply, when the round was answered
    pub reply: Option<JoinHandle<OracleResult<()>>>,
    /// Open learning window, when the round missed
    pub learning: Option<JoinHandle<LearningOutcome>>,
}

impl RoundReport {
    fn skipped(classification: Option<Classification>) -> Self {
        Self {
            state: RoundState::Skipped,
            classification,
            reply: None,
            learning: None,
        }
    }

    /// Wait for the reply to go out or the learning window to close
    pub async fn settle(self) {
        if let Some(reply) = self.reply {
            let _ = reply.await;
        }
        if let Some(learning) = self.learning {
            let _ = learning.await;
        }
    }
}

/// Counts a round as in flight until dropped
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct Oracle {
    config: Arc<Config>,
    store: KnowledgeStore,
    resolver: AnswerResolver,
    scheduler: ReplyScheduler,
    learning: LearningSubscriber,
    in_flight: Arc<AtomicUsize>,
}

impl Oracle {
    /// Wire up an oracle. `events` is the stream learning windows listen on
    /// and must be the same one inbound events are published to.
    pub fn new(
        config: Config,
        fingerprinter: Fingerprinter,
        gateway: Arc<dyn ChatGateway>,
        events: broadcast::Sender<ChatEvent>,
    ) -> Self {
        let store = KnowledgeStore::new(config.data_dir.clone());
        let scheduler = ReplyScheduler::new(gateway);
        let resolver = AnswerResolver::new(store.clone(), fingerprinter);
        let learning = LearningSubscriber::new(
            store.clone(),
            scheduler.clone(),
            events,
            config.question_source_id.clone(),
            config.learning_window(),
        );

        Self {
            config: Arc::new(config),
            store,
            resolver,
            scheduler,
            learning,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn store(&self) -> &KnowledgeStore {
        &self.store
    }

    pub fn learning(&self) -> &LearningSubscriber {
        &self.learning
    }

    /// Rounds spawned by [`run`](Self::run) that are still fetching,
    /// waiting to reply or learning
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Event comes from the question source in an allowed channel
    pub fn accepts(&self, event: &ChatEvent) -> bool {
        event.author_id == self.config.question_source_id
            && !event.embeds.is_empty()
            && self.config.allows_channel(&event.channel_id)
    }

    fn delay_for(&self, classification: &Classification) -> DelayRange {
        match classification {
            Classification::ImageIdentify { .. } => self.config.image_delay_ms,
            Classification::CapitalByImage | Classification::CapitalByText { .. } => self.config.capital_delay_ms,
        }
    }

    /// Run one event through classification and resolution
    pub async fn handle_event(&self, event: &ChatEvent) -> RoundReport {
        let subscription = self.learning.subscribe();
        self.handle_subscribed(event, subscription).await
    }

    /// Like [`handle_event`](Self::handle_event), with the learning
    /// subscription taken when the event was received
    async fn handle_subscribed(
        &self,
        event: &ChatEvent,
        subscription: broadcast::Receiver<ChatEvent>,
    ) -> RoundReport {
        if !self.accepts(event) {
            return RoundReport::skipped(None);
        }

        let Some(question) = event.question() else {
            return RoundReport::skipped(None);
        };

        let Some(classification) = classifier::classify(&question) else {
            tracing::debug!("Ignoring message {} in {}", event.id, event.channel_id);
            return RoundReport::skipped(None);
        };

        let round = uuid::Uuid::new_v4();
        tracing::debug!("Round {} in {}: {:?}", round, question.channel_id, classification);

        match self.resolver.resolve(&classification, &question).await {
            Resolution::Answer(answer) => {
                tracing::debug!(
                    "Round {} resolved {}ms after receipt",
                    round,
                    event.age().num_milliseconds()
                );
                let range = self.delay_for(&classification);
                let reply = if classification == Classification::CapitalByImage {
                    self.scheduler.schedule_typing(&question.channel_id, &answer.text, range)
                } else {
                    self.scheduler.schedule(&question.channel_id, &answer.text, range)
                };
                RoundReport {
                    state: RoundState::Answered,
                    classification: Some(classification),
                    reply: Some(reply),
                    learning: None,
                }
            }
            Resolution::Miss(pending) => {
                let learning = self.learning.learn(&event.id, &question.channel_id, pending, subscription);
                RoundReport {
                    state: RoundState::Learning,
                    classification: Some(classification),
                    reply: None,
                    learning: Some(learning),
                }
            }
            Resolution::FetchFailed(_) => {
                let is_identify = matches!(classification, Classification::ImageIdentify { .. });
                if self.config.notify_hash_failure && is_identify {
                    let _ = self.scheduler.send_now(&question.channel_id, HASH_FAILURE_NOTICE).await;
                }
                RoundReport::skipped(Some(classification))
            }
            Resolution::Unanswerable(reason) => {
                tracing::debug!("Round {} unanswerable: {}", round, reason);
                RoundReport::skipped(Some(classification))
            }
        }
    }

    /// Consume events until `shutdown` resolves or the stream closes,
    /// one task per accepted event. Queued events are taken before
    /// `shutdown` is checked. Open learning windows are cancelled on the
    /// way out. Returns the number of accepted events.
    pub async fn run<F>(&self, mut events: broadcast::Receiver<ChatEvent>, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut handled = 0;

        loop {
            let event = tokio::select! {
                biased;
                received = events.recv() => match received {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Event loop lagged, skipped {} events", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = &mut shutdown => break,
            };

            if !self.accepts(&event) {
                continue;
            }

            handled += 1;
            let subscription = self.learning.subscribe();
            let round = InFlight::enter(&self.in_flight);
            let oracle = self.clone();
            tokio::spawn(async move {
                let _round = round;
                oracle.handle_subscribed(&event, subscription).await.settle().await;
            });
        }

        let cancelled = self.learning.cancel_all();
        if cancelled > 0 {
            tracing::info!("Abandoned {} open learning windows", cancelled);
        }
        handled
    }
}
