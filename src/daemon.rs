//! The daemon loop: wake on a fixed tick, decide what is due, fan the
//! checks out with bounded concurrency, reconcile each result as it lands.
//!
//! Per-topic failures are folded into inconclusive results upstream; here a
//! failed tick is logged and retried on the next one, so the loop only ends
//! on shutdown.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

use crate::check::CheckExecutor;
use crate::config::{Configuration, Topic};
use crate::dedup::DedupFilter;
use crate::gate;
use crate::notify::Dispatcher;
use crate::power;
use crate::schedule;
use crate::signal::{self, ForceTarget};
use crate::store::ConfigStore;
use crate::verdict::CheckResult;

pub const DEFAULT_TICK: Duration = Duration::from_secs(60);
pub const DEFAULT_CONCURRENCY: usize = 2;
pub const DEFAULT_GRACE: Duration = Duration::from_secs(30);

pub struct Daemon {
    store: ConfigStore,
    executor: CheckExecutor,
    dedup: DedupFilter,
    dispatcher: Arc<Dispatcher>,
    tick: Duration,
    concurrency: usize,
    grace: Duration,
    announce_start: bool,
}

impl Daemon {
    pub fn new(store: ConfigStore, executor: CheckExecutor) -> Self {
        Self {
            store,
            executor,
            dedup: DedupFilter::default(),
            dispatcher: Arc::new(Dispatcher::desktop()),
            tick: DEFAULT_TICK,
            concurrency: DEFAULT_CONCURRENCY,
            grace: DEFAULT_GRACE,
            announce_start: true,
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = Arc::new(dispatcher);
        self
    }

    pub fn with_dedup(mut self, dedup: DedupFilter) -> Self {
        self.dedup = dedup;
        self
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn quiet_start(mut self) -> Self {
        self.announce_start = false;
        self
    }

    /// Run until `shutdown` flips to true. Refuses to start without a
    /// loadable configuration.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let cfg = self.store.load()?;
        tracing::info!(
            topics = cfg.topics.len(),
            config = %self.store.path().display(),
            "watchdog daemon started"
        );
        if self.announce_start {
            self.dispatcher.notify_started(cfg.topics.len()).await;
        }

        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }
            if let Err(e) = self.tick_once(&mut shutdown).await {
                tracing::warn!(error = ?e, "tick failed");
            }
            if *shutdown.borrow() {
                break;
            }
        }
        tracing::info!("watchdog daemon stopped");
        Ok(())
    }

    /// One scheduling pass: consume a pending force request, otherwise
    /// gate + due-set; then run whatever was selected.
    async fn tick_once(&self, shutdown: &mut watch::Receiver<bool>) -> anyhow::Result<()> {
        let force = signal::take(&self.store.dir());
        let cfg = self.store.load()?;
        let now = Utc::now();

        let batch: Vec<Topic> = match force {
            Some(target) => {
                let selected = resolve_force(&cfg, &target);
                tracing::info!(count = selected.len(), target = ?target, "force check requested");
                selected.into_iter().cloned().collect()
            }
            None => {
                let eligibility =
                    gate::evaluate(&cfg.policy(), power::power_state(), power::idle_minutes());
                if !eligibility.is_eligible() {
                    tracing::debug!(reason = eligibility.reason(), "skipping scheduled checks");
                    return Ok(());
                }
                schedule::due_topics(&cfg.topics, now)
                    .into_iter()
                    .cloned()
                    .collect()
            }
        };

        if batch.is_empty() {
            return Ok(());
        }
        tracing::info!(count = batch.len(), "starting check batch");
        self.run_batch(batch, shutdown).await;
        Ok(())
    }

    /// Bounded fan-out over the batch; each result is reconciled as soon as
    /// its check completes. On shutdown, in-flight checks get a grace
    /// period, then are abandoned (their topics stay due).
    async fn run_batch(&self, batch: Vec<Topic>, shutdown: &mut watch::Receiver<bool>) {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut set = JoinSet::new();
        for topic in batch {
            let executor = self.executor.clone();
            let semaphore = semaphore.clone();
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                executor.execute(&topic).await
            });
        }

        let mut deadline: Option<tokio::time::Instant> = None;
        loop {
            let joined = if let Some(d) = deadline {
                match tokio::time::timeout_at(d, set.join_next()).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        tracing::warn!(
                            abandoned = set.len(),
                            "grace period expired, abandoning in-flight checks"
                        );
                        set.abort_all();
                        break;
                    }
                }
            } else {
                tokio::select! {
                    joined = set.join_next() => joined,
                    res = shutdown.changed() => {
                        if res.is_err() || *shutdown.borrow() {
                            tracing::info!(grace = ?self.grace, "shutdown requested, draining in-flight checks");
                            deadline = Some(tokio::time::Instant::now() + self.grace);
                        }
                        continue;
                    }
                }
            };
            match joined {
                None => break,
                Some(Ok(result)) => self.reconcile(result).await,
                Some(Err(e)) if e.is_cancelled() => {}
                Some(Err(e)) => tracing::warn!(error = ?e, "check task failed"),
            }
        }
    }

    async fn reconcile(&self, result: CheckResult) {
        reconcile(&self.store, &self.dedup, &self.dispatcher, &result).await;
    }
}

/// What happened to a check result when it was folded into state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// New information: fingerprint persisted and notification dispatched.
    Notified,
    /// Completed attempt, nothing to tell the user.
    Silent,
    /// The topic was edited away while its check ran; result dropped.
    TopicGone,
    /// The config lock could not be taken; nothing persisted, the topic
    /// stays due and comes up again next tick.
    Deferred,
}

/// Fold one result into persisted state. The mutation happens under the
/// cross-process lock and the fingerprint is saved before the notification
/// goes out; a crash in between loses a notification instead of
/// duplicating one. Shared by the daemon loop and `watchdog check`.
pub async fn reconcile(
    store: &ConfigStore,
    dedup: &DedupFilter,
    dispatcher: &Dispatcher,
    result: &CheckResult,
) -> Reconciled {
    let now = Utc::now();
    let outcome = store.with_lock(|cfg| {
        let Some(topic) = cfg.topic_mut(&result.topic_name) else {
            return None;
        };
        topic.last_checked_at = Some(now);
        if dedup.accept(topic, result, now) {
            topic.last_signal = Some(result.fingerprint.clone());
            topic.last_notified_at = Some(now);
            Some(true)
        } else {
            Some(false)
        }
    });

    match outcome {
        Err(e) => {
            tracing::warn!(topic = %result.topic_name, error = ?e, "state update deferred");
            Reconciled::Deferred
        }
        Ok(None) => {
            tracing::debug!(topic = %result.topic_name, "topic edited away mid-check, result dropped");
            Reconciled::TopicGone
        }
        Ok(Some(true)) => {
            tracing::info!(topic = %result.topic_name, "update found, notifying");
            dispatcher
                .notify_update(
                    &result.topic_name,
                    &result.summary,
                    result.source_url.as_deref(),
                )
                .await;
            Reconciled::Notified
        }
        Ok(Some(false)) => {
            tracing::debug!(
                topic = %result.topic_name,
                verdict = ?result.verdict,
                "checked, nothing to notify"
            );
            Reconciled::Silent
        }
    }
}

/// Resolve a force request against the current configuration. An unknown
/// topic name is logged and yields an empty batch.
fn resolve_force<'a>(cfg: &'a Configuration, target: &ForceTarget) -> Vec<&'a Topic> {
    match target {
        ForceTarget::All => cfg.topics.iter().collect(),
        ForceTarget::Topic(name) => match cfg.topic(name) {
            Some(t) => vec![t],
            None => {
                tracing::warn!(topic = %name, "force check for unknown topic");
                Vec::new()
            }
        },
    }
}
