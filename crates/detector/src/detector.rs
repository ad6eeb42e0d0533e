//! The running detector: feed dispatcher, apply workers, and lifecycle.
//!
//! ```text
//!                                 ┌──▶ worker 0 ──┐
//! FeedSender ──mpsc──▶ dispatcher ┼──▶ worker 1 ──┼──▶ ConflictEngine::apply
//!                     (by entity) └──▶ worker N ──┘
//! ```
//!
//! The dispatcher hashes each event's entity id to pick a worker, so one
//! entity's events are applied in feed order while different entities are
//! applied concurrently. Events of different entities that share a bucket
//! are held back until the earlier one is applied, so every bucket also sees
//! its changes in feed order. Before handing an event off the dispatcher
//! registers the event's index with the [`Watermark`]; the worker finishes
//! it once applied.
//!
//! Shutdown closes the feed to new messages and drains everything that was
//! already accepted before the workers stop.
//!
//! A `caught_up` message marks the end of the metadata layer's initial
//! replay. Once the watermark reaches that index the detector turns ready
//! and starts answering queries.

use std::{
    hash::{DefaultHasher, Hash, Hasher},
    sync::Arc,
    time::Duration,
};

use inferadb_issues_types::{
    ChangeEvent, DetectorError, EntityId, FeedMessage, Result, config::DetectorConfig,
    error::ConfigSnafu,
};
use parking_lot::Mutex;
use snafu::ResultExt;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    classifier::{self, NameClassifier},
    engine::ConflictEngine,
    phase::{DetectorPhase, PhaseState},
    query::IssueQuery,
    sequencer::{Claim, Claims, Sequencer},
    view::MetadataView,
    watermark::Watermark,
};

// ============================================================================
// FeedSender
// ============================================================================

/// Producer side of the detector's inbound feed.
///
/// Cheap to clone. Sending waits while the feed is full.
#[derive(Debug, Clone)]
pub struct FeedSender {
    tx: mpsc::Sender<FeedMessage>,
    phase: PhaseState,
}

impl FeedSender {
    /// Delivers one feed message.
    ///
    /// # Errors
    ///
    /// [`DetectorError::ShuttingDown`] once shutdown has started,
    /// [`DetectorError::FeedClosed`] if the dispatcher has stopped.
    pub async fn send(&self, message: impl Into<FeedMessage>) -> Result<()> {
        if self.phase.phase() == DetectorPhase::ShuttingDown {
            return Err(DetectorError::ShuttingDown);
        }
        self.tx.send(message.into()).await.map_err(|_| DetectorError::FeedClosed)
    }

    /// Delivers messages in order, returning how many were accepted.
    ///
    /// # Errors
    ///
    /// Stops at the first failure; see [`send`](Self::send). Messages before
    /// the failing one were accepted and will be applied, but the error does
    /// not say how many; call [`send`](Self::send) per message to know.
    pub async fn send_all(&self, messages: impl IntoIterator<Item = FeedMessage>) -> Result<usize> {
        let mut sent = 0;
        for message in messages {
            self.send(message).await?;
            sent += 1;
        }
        Ok(sent)
    }

    /// Whether the dispatcher has stopped receiving.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// ============================================================================
// Detector
// ============================================================================

/// A running name-conflict detector.
///
/// Owns all detector state; nothing is process-global. Dropping the detector
/// stops the dispatcher; call [`shutdown`](Self::shutdown) to also wait for
/// queued events to drain.
#[derive(Debug)]
pub struct Detector {
    config: DetectorConfig,
    engine: Arc<ConflictEngine>,
    phase: PhaseState,
    watermark: Arc<Watermark>,
    feed: FeedSender,
    shutdown_tx: watch::Sender<bool>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl Detector {
    /// Validates `config` and starts the detector on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`DetectorError::Config`] if the configuration is invalid.
    pub fn spawn(config: DetectorConfig) -> Result<Self> {
        let classifier = classifier::from_config(&config.classifier);
        Self::spawn_with_classifier(config, classifier)
    }

    /// Like [`spawn`](Self::spawn), with a custom name classifier.
    ///
    /// # Errors
    ///
    /// Returns [`DetectorError::Config`] if the configuration is invalid.
    pub fn spawn_with_classifier(
        config: DetectorConfig,
        classifier: Arc<dyn NameClassifier>,
    ) -> Result<Self> {
        config.validate().context(ConfigSnafu)?;

        let policy = classifier.policy_name();
        let engine = Arc::new(ConflictEngine::with_classifier(&config, classifier));
        let phase = PhaseState::new();
        let watermark = Arc::new(Watermark::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (feed_tx, feed_rx) = mpsc::channel(config.feed_capacity);

        let sequencer = Arc::new(Sequencer::new());

        let (senders, handles): (Vec<_>, Vec<_>) = (0..config.workers)
            .map(|worker| {
                let (tx, rx) = mpsc::channel(config.feed_capacity);
                let handle = tokio::spawn(apply_worker(
                    worker,
                    Arc::clone(&engine),
                    Arc::clone(&sequencer),
                    Arc::clone(&watermark),
                    rx,
                ));
                (tx, handle)
            })
            .unzip();

        let router = Router {
            engine: Arc::clone(&engine),
            sequencer,
            watermark: Arc::clone(&watermark),
            senders,
        };
        let dispatcher =
            tokio::spawn(dispatch(feed_rx, router, handles, phase.clone(), shutdown_rx));

        info!(
            workers = config.workers,
            feed_capacity = config.feed_capacity,
            classifier = policy,
            "Issue detector started"
        );

        Ok(Self {
            feed: FeedSender { tx: feed_tx, phase: phase.clone() },
            config,
            engine,
            phase,
            watermark,
            shutdown_tx,
            dispatcher: Mutex::new(Some(dispatcher)),
        })
    }

    /// The inbound feed.
    pub fn feed(&self) -> FeedSender {
        self.feed.clone()
    }

    /// Read-only issue queries.
    pub fn query(&self) -> IssueQuery {
        IssueQuery::new(Arc::clone(&self.engine), self.phase.clone())
    }

    /// The metadata view.
    pub fn view(&self) -> &MetadataView {
        self.engine.view()
    }

    /// The active configuration.
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> DetectorPhase {
        self.phase.phase()
    }

    /// Shared phase cell, for health checks.
    pub fn phase_state(&self) -> PhaseState {
        self.phase.clone()
    }

    /// Highest index through which every received event has been applied.
    pub fn applied_index(&self) -> u64 {
        self.watermark.current()
    }

    /// Receiver observing every change of the applied watermark.
    pub fn subscribe_watermark(&self) -> watch::Receiver<u64> {
        self.watermark.subscribe()
    }

    /// Waits until every event with index `<= log_index` has been applied.
    ///
    /// # Errors
    ///
    /// Returns [`DetectorError::WatermarkTimeout`] if `timeout` elapses first.
    pub async fn wait_for_index(&self, log_index: u64, timeout: Option<Duration>) -> Result<u64> {
        self.watermark.wait_for(log_index, timeout).await
    }

    /// Stops accepting events, applies every message already accepted, and
    /// waits for the workers to finish. Idempotent.
    pub async fn shutdown(&self) {
        self.phase.mark_shutting_down();
        let _ = self.shutdown_tx.send(true);

        let dispatcher = self.dispatcher.lock().take();
        if let Some(handle) = dispatcher {
            if let Err(e) = handle.await {
                warn!(error = %e, "Feed dispatcher terminated abnormally");
            }
            info!(applied_index = self.applied_index(), "Issue detector stopped");
        }
    }
}

impl Drop for Detector {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Worker responsible for `entity_id` out of `workers`.
fn route(entity_id: &EntityId, workers: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    entity_id.hash(&mut hasher);
    (hasher.finish() % workers.max(1) as u64) as usize
}

/// An event handed to a worker, with the claims to release once applied.
#[derive(Debug)]
struct Job {
    event: ChangeEvent,
    claims: Claims,
}

/// Dispatcher state used to forward change events.
#[derive(Debug)]
struct Router {
    engine: Arc<ConflictEngine>,
    sequencer: Arc<Sequencer>,
    watermark: Arc<Watermark>,
    senders: Vec<mpsc::Sender<Job>>,
}

impl Router {
    /// Hands `event` to its worker once nothing it touches is in flight.
    ///
    /// Returns `false` if the worker is gone.
    async fn forward(&self, event: ChangeEvent) -> bool {
        let log_index = event.log_index;
        self.watermark.begin(log_index);

        // The entity's current bucket is only known once its own earlier
        // events are applied.
        self.sequencer.wait_free(&Claim::Entity(event.entity_id)).await;
        let claims = Claims::new(event.entity_id, self.engine.touched_buckets(&event));
        self.sequencer.acquire(&claims).await;

        let worker = route(&event.entity_id, self.senders.len());
        let sent = self.senders[worker].send(Job { event, claims }).await;
        if let Err(mpsc::error::SendError(job)) = sent {
            self.sequencer.release(&job.claims);
            self.watermark.finish(log_index);
            warn!(worker, "Apply worker gone; stopping feed dispatcher");
            return false;
        }
        true
    }
}

async fn dispatch(
    mut feed: mpsc::Receiver<FeedMessage>,
    router: Router,
    handles: Vec<JoinHandle<()>>,
    phase: PhaseState,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut closing = false;
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed(), if !closing => {
                // Refuse new messages but apply everything already accepted.
                feed.close();
                closing = true;
                debug!("Feed closed; draining accepted messages");
            },
            message = feed.recv() => match message {
                None => break,
                Some(FeedMessage::Change(event)) => {
                    if !router.forward(event).await {
                        break;
                    }
                },
                Some(FeedMessage::CaughtUp { log_index }) => {
                    debug!(log_index, "Metadata layer caught up");
                    router.watermark.observe(log_index);
                    if !closing {
                        tokio::spawn(mark_ready_at(
                            log_index,
                            Arc::clone(&router.watermark),
                            phase.clone(),
                            shutdown.clone(),
                        ));
                    }
                },
            },
        }
    }

    // Closing the worker queues lets each worker drain what it already has.
    drop(router);
    for handle in handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "Apply worker terminated abnormally");
        }
    }
    debug!("Feed dispatcher stopped");
}

async fn apply_worker(
    worker: usize,
    engine: Arc<ConflictEngine>,
    sequencer: Arc<Sequencer>,
    watermark: Arc<Watermark>,
    mut jobs: mpsc::Receiver<Job>,
) {
    while let Some(Job { event, claims }) = jobs.recv().await {
        // Skips are logged and counted by the engine.
        let _ = engine.apply(&event);
        sequencer.release(&claims);
        watermark.finish(event.log_index);
    }
    debug!(worker, "Apply worker stopped");
}

async fn mark_ready_at(
    log_index: u64,
    watermark: Arc<Watermark>,
    phase: PhaseState,
    mut shutdown: watch::Receiver<bool>,
) {
    tokio::select! {
        reached = watermark.wait_for(log_index, None) => {
            if reached.is_ok() && phase.mark_ready() {
                info!(log_index, "Initial metadata sync applied; serving issue queries");
            }
        },
        _ = shutdown.changed() => {},
    }
}
