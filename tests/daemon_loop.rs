// tests/daemon_loop.rs
// The scheduling loop end to end: tick, due-set, bounded fan-out,
// reconcile, force-check consumption, clean shutdown.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use watchdog_agent::check::backend::ScriptedBackend;
use watchdog_agent::check::search::FixtureSearch;
use watchdog_agent::check::CheckExecutor;
use watchdog_agent::notify::{Dispatcher, MemoryNotifier, Notification, Notifier};
use watchdog_agent::signal::{self, ForceTarget};
use watchdog_agent::{ConfigStore, Configuration, Daemon, Topic};

struct SharedSink(Arc<MemoryNotifier>);

#[async_trait::async_trait]
impl Notifier for SharedSink {
    async fn send(&self, n: &Notification) -> anyhow::Result<()> {
        self.0.send(n).await
    }
}

fn store_with(cfg: &Configuration, tmp: &tempfile::TempDir) -> ConfigStore {
    let store = ConfigStore::new(tmp.path().join("config.toml"));
    store.save(cfg).unwrap();
    store
}

/// A config whose gate never interferes with the test run.
fn open_config() -> Configuration {
    Configuration {
        require_ac_power: false,
        idle_threshold_minutes: 0,
        topics: Vec::new(),
    }
}

fn daemon_under_test(
    store: &ConfigStore,
    turns: Vec<watchdog_agent::check::backend::BackendTurn>,
    memory: &Arc<MemoryNotifier>,
) -> Daemon {
    let executor = CheckExecutor::new(Arc::new(ScriptedBackend::new(turns)))
        .with_search(Arc::new(FixtureSearch::default()));
    Daemon::new(store.clone(), executor)
        .with_dispatcher(Dispatcher::with_sinks(vec![Box::new(SharedSink(
            memory.clone(),
        ))]))
        .with_tick(Duration::from_millis(50))
        .with_grace(Duration::from_millis(200))
        .quiet_start()
}

async fn run_briefly(daemon: Daemon, millis: u64) {
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(async move { daemon.run(rx).await });
    tokio::time::sleep(Duration::from_millis(millis)).await;
    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("daemon did not stop")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn due_topic_is_checked_and_notified_once() {
    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = open_config();
    let mut topic = Topic::new("Fedora 44 Release");
    topic.check_interval_hours = 48;
    cfg.add_topic(topic).unwrap();
    let store = store_with(&cfg, &tmp);

    let memory = Arc::new(MemoryNotifier::default());
    let daemon = daemon_under_test(
        &store,
        vec![ScriptedBackend::final_turn(
            r#"{"verdict": "changed", "summary": "Fedora 44 released."}"#,
        )],
        &memory,
    );
    run_briefly(daemon, 300).await;

    // Checked once on the first tick, then no longer due.
    let after = store.load().unwrap();
    assert!(after.topics[0].last_checked_at.is_some());
    assert!(after.topics[0].last_signal.is_some());
    assert_eq!(memory.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn force_check_runs_even_when_not_due() {
    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = open_config();
    let mut topic = Topic::new("Fedora 44 Release");
    topic.check_interval_hours = 168;
    topic.last_checked_at = Some(Utc::now()); // freshly checked: not due
    cfg.add_topic(topic).unwrap();
    let store = store_with(&cfg, &tmp);

    signal::request(&store.dir(), &ForceTarget::Topic("Fedora 44 Release".into())).unwrap();

    let memory = Arc::new(MemoryNotifier::default());
    let daemon = daemon_under_test(
        &store,
        vec![ScriptedBackend::final_turn(
            r#"{"verdict": "changed", "summary": "Surprise update."}"#,
        )],
        &memory,
    );
    let before = store.load().unwrap().topics[0].last_checked_at.unwrap();
    run_briefly(daemon, 300).await;

    let after = store.load().unwrap();
    assert!(after.topics[0].last_checked_at.unwrap() > before);
    assert_eq!(memory.sent.lock().unwrap().len(), 1);
    // The request file was consumed.
    assert_eq!(signal::take(&store.dir()), None);
}

#[tokio::test]
async fn unchanged_verdict_never_notifies_through_the_loop() {
    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = open_config();
    let mut topic = Topic::new("quiet");
    topic.check_interval_hours = 1;
    cfg.add_topic(topic).unwrap();
    let store = store_with(&cfg, &tmp);

    let memory = Arc::new(MemoryNotifier::default());
    let daemon = daemon_under_test(
        &store,
        vec![ScriptedBackend::final_turn(
            r#"{"verdict": "unchanged", "summary": "Nothing."}"#,
        )],
        &memory,
    );
    run_briefly(daemon, 300).await;

    assert_eq!(memory.sent.lock().unwrap().len(), 0);
    let after = store.load().unwrap();
    assert!(after.topics[0].last_checked_at.is_some());
    assert!(after.topics[0].last_signal.is_none());
}

#[tokio::test]
async fn daemon_refuses_to_start_without_config() {
    let tmp = tempfile::tempdir().unwrap();
    let store = ConfigStore::new(tmp.path().join("config.toml"));
    let memory = Arc::new(MemoryNotifier::default());
    let daemon = daemon_under_test(&store, vec![], &memory);

    let (_tx, rx) = watch::channel(false);
    let err = daemon.run(rx).await.unwrap_err();
    assert!(err.to_string().contains("not found"));
}
