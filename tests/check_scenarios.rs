// tests/check_scenarios.rs
// The check lifecycle end to end against a scripted backend: due-set,
// execution, dedup, reconcile, notification.

use std::sync::Arc;

use chrono::{Duration, Utc};
use watchdog_agent::check::backend::ScriptedBackend;
use watchdog_agent::check::search::FixtureSearch;
use watchdog_agent::check::CheckExecutor;
use watchdog_agent::daemon::{reconcile, Reconciled};
use watchdog_agent::dedup::DedupFilter;
use watchdog_agent::notify::{Dispatcher, MemoryNotifier, Notification, Notifier};
use watchdog_agent::schedule;
use watchdog_agent::{ConfigStore, Configuration, Topic, Verdict};

struct SharedSink(Arc<MemoryNotifier>);

#[async_trait::async_trait]
impl Notifier for SharedSink {
    async fn send(&self, n: &Notification) -> anyhow::Result<()> {
        self.0.send(n).await
    }
}

struct Fixture {
    store: ConfigStore,
    memory: Arc<MemoryNotifier>,
    dispatcher: Dispatcher,
    dedup: DedupFilter,
    _tmp: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(tmp.path().join("config.toml"));
        let mut cfg = Configuration::default();
        let mut topic = Topic::new("Fedora 44 Release");
        topic.description = "Monitor for Fedora 44 release date and announcements".into();
        topic.search_queries = vec!["Fedora 44 release date".into()];
        topic.check_interval_hours = 48;
        cfg.add_topic(topic).unwrap();
        store.save(&cfg).unwrap();

        let memory = Arc::new(MemoryNotifier::default());
        let dispatcher =
            Dispatcher::with_sinks(vec![Box::new(SharedSink(memory.clone()))]);
        Fixture {
            store,
            memory,
            dispatcher,
            dedup: DedupFilter::default(),
            _tmp: tmp,
        }
    }

    fn executor(&self, turns: Vec<watchdog_agent::check::backend::BackendTurn>) -> CheckExecutor {
        CheckExecutor::new(Arc::new(ScriptedBackend::new(turns)))
            .with_search(Arc::new(FixtureSearch::default()))
    }

    fn topic(&self) -> Topic {
        self.store.load().unwrap().topics[0].clone()
    }

    fn notifications(&self) -> usize {
        self.memory.sent.lock().unwrap().len()
    }
}

fn changed_turn(summary: &str) -> watchdog_agent::check::backend::BackendTurn {
    ScriptedBackend::final_turn(&format!(
        r#"{{"verdict": "changed", "summary": "{summary}", "source_url": "https://fedoramagazine.org/"}}"#
    ))
}

fn unchanged_turn() -> watchdog_agent::check::backend::BackendTurn {
    ScriptedBackend::final_turn(r#"{"verdict": "unchanged", "summary": "No release yet."}"#)
}

#[tokio::test]
async fn scenario_first_check_unchanged_updates_timestamp_only() {
    let fx = Fixture::new();
    let topic = fx.topic();

    // Never checked: due regardless of now.
    assert!(schedule::is_due(&topic, Utc::now()));

    let exec = fx.executor(vec![unchanged_turn()]);
    let result = exec.execute(&topic).await;
    assert_eq!(result.verdict, Verdict::Unchanged);

    let outcome = reconcile(&fx.store, &fx.dedup, &fx.dispatcher, &result).await;
    assert_eq!(outcome, Reconciled::Silent);
    assert_eq!(fx.notifications(), 0);

    let after = fx.topic();
    assert!(after.last_checked_at.is_some());
    assert!(after.last_signal.is_none());
    assert!(after.last_notified_at.is_none());
}

#[tokio::test]
async fn scenario_changed_notifies_and_records_fingerprint() {
    let fx = Fixture::new();
    let topic = fx.topic();

    let exec = fx.executor(vec![changed_turn("Fedora 44 was released.")]);
    let result = exec.execute(&topic).await;
    assert_eq!(result.verdict, Verdict::Changed);

    let outcome = reconcile(&fx.store, &fx.dedup, &fx.dispatcher, &result).await;
    assert_eq!(outcome, Reconciled::Notified);
    assert_eq!(fx.notifications(), 1);

    let after = fx.topic();
    assert_eq!(after.last_signal.as_deref(), Some(result.fingerprint.as_str()));
    assert!(after.last_notified_at.is_some());
}

#[tokio::test]
async fn scenario_not_due_is_skipped_entirely() {
    let fx = Fixture::new();
    fx.store
        .with_lock(|cfg| {
            cfg.topic_mut("Fedora 44 Release").unwrap().last_checked_at = Some(Utc::now());
        })
        .unwrap();

    let topic = fx.topic();
    let now = Utc::now() + Duration::hours(47);
    assert!(!schedule::is_due(&topic, now));
    assert!(schedule::due_topics(&[topic.clone()], now).is_empty());
    // Inclusive at the boundary.
    assert!(schedule::is_due(&topic, Utc::now() + Duration::hours(48)));
}

#[tokio::test]
async fn scenario_repeat_fingerprint_is_suppressed_but_timestamp_advances() {
    let fx = Fixture::new();

    // First changed verdict: notified.
    let exec = fx.executor(vec![changed_turn("Fedora 44 was released.")]);
    let first = exec.execute(&fx.topic()).await;
    reconcile(&fx.store, &fx.dedup, &fx.dispatcher, &first).await;
    assert_eq!(fx.notifications(), 1);
    let checked_after_first = fx.topic().last_checked_at.unwrap();

    // Same substantive claim again: same fingerprint, suppressed.
    let exec = fx.executor(vec![changed_turn("Fedora 44 was released.")]);
    let second = exec.execute(&fx.topic()).await;
    assert_eq!(second.fingerprint, first.fingerprint);

    let outcome = reconcile(&fx.store, &fx.dedup, &fx.dispatcher, &second).await;
    assert_eq!(outcome, Reconciled::Silent);
    assert_eq!(fx.notifications(), 1, "duplicate must not re-notify");

    let after = fx.topic();
    assert!(after.last_checked_at.unwrap() >= checked_after_first);
    assert_eq!(after.last_signal.as_deref(), Some(first.fingerprint.as_str()));
}

#[tokio::test]
async fn topic_removed_mid_check_drops_the_result() {
    let fx = Fixture::new();
    let topic = fx.topic();

    let exec = fx.executor(vec![changed_turn("Something happened.")]);
    let result = exec.execute(&topic).await;

    // Editor removes the topic while the check was in flight.
    fx.store
        .with_lock(|cfg| {
            cfg.remove_topic("Fedora 44 Release").unwrap();
        })
        .unwrap();

    let outcome = reconcile(&fx.store, &fx.dedup, &fx.dispatcher, &result).await;
    assert_eq!(outcome, Reconciled::TopicGone);
    assert_eq!(fx.notifications(), 0);
}

#[tokio::test]
async fn failed_check_counts_as_a_completed_attempt() {
    let fx = Fixture::new();
    let topic = fx.topic();

    // Backend exhausted: the executor folds the error into inconclusive.
    let exec = fx.executor(vec![]);
    let result = exec.execute(&topic).await;
    assert_eq!(result.verdict, Verdict::Inconclusive);
    assert!(result.error.is_some());

    let outcome = reconcile(&fx.store, &fx.dedup, &fx.dispatcher, &result).await;
    assert_eq!(outcome, Reconciled::Silent);
    assert!(fx.topic().last_checked_at.is_some());
    assert!(fx.topic().last_signal.is_none());
}
