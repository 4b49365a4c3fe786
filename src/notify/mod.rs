//! Notification dispatch: best-effort, never retried, never fatal.

pub mod desktop;

use anyhow::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Low,
    Normal,
    Critical,
}

/// One rendered notification, sink-agnostic.
#[derive(Debug, Clone)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub urgency: Urgency,
    pub timeout_ms: u32,
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// Fans a notification out to every configured sink. A sink failure is
/// logged and dropped; by then the fingerprint is already persisted, and a
/// missed display beats a notification storm on retry.
pub struct Dispatcher {
    sinks: Vec<Box<dyn Notifier>>,
}

impl Dispatcher {
    pub fn desktop() -> Self {
        Self {
            sinks: vec![Box::new(desktop::DesktopNotifier::default())],
        }
    }

    pub fn with_sinks(sinks: Vec<Box<dyn Notifier>>) -> Self {
        Self { sinks }
    }

    /// A genuine topic update.
    pub async fn notify_update(&self, topic: &str, summary: &str, source_url: Option<&str>) {
        let mut body = summary.to_string();
        if let Some(url) = source_url {
            body.push_str("\n\n");
            body.push_str(url);
        }
        self.send_all(&Notification {
            title: format!("Update: {topic}"),
            body,
            urgency: Urgency::Normal,
            timeout_ms: 15_000,
        })
        .await;
    }

    /// Low-urgency notice that the daemon came up.
    pub async fn notify_started(&self, topic_count: usize) {
        self.send_all(&Notification {
            title: "Watchdog Agent".into(),
            body: format!("Monitoring {topic_count} topic(s)"),
            urgency: Urgency::Low,
            timeout_ms: 3_000,
        })
        .await;
    }

    async fn send_all(&self, notification: &Notification) {
        for sink in &self.sinks {
            if let Err(e) = sink.send(notification).await {
                tracing::warn!(error = ?e, title = %notification.title, "notification failed");
            }
        }
    }
}

/// Records notifications instead of displaying them. Test helper.
#[derive(Default)]
pub struct MemoryNotifier {
    pub sent: std::sync::Mutex<Vec<Notification>>,
}

#[async_trait::async_trait]
impl Notifier for MemoryNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct FailingNotifier;

    #[async_trait::async_trait]
    impl Notifier for FailingNotifier {
        async fn send(&self, _n: &Notification) -> Result<()> {
            anyhow::bail!("sink unavailable")
        }
    }

    /// Shares the memory sink with the test while the dispatcher owns a box.
    struct SharedSink(Arc<MemoryNotifier>);

    #[async_trait::async_trait]
    impl Notifier for SharedSink {
        async fn send(&self, n: &Notification) -> Result<()> {
            self.0.send(n).await
        }
    }

    #[tokio::test]
    async fn update_body_includes_source_url() {
        let memory = Arc::new(MemoryNotifier::default());
        let d = Dispatcher::with_sinks(vec![Box::new(SharedSink(memory.clone()))]);
        d.notify_update("Fedora 44", "Released.", Some("https://fedoramagazine.org/"))
            .await;
        let sent = memory.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].title, "Update: Fedora 44");
        assert!(sent[0].body.contains("https://fedoramagazine.org/"));
    }

    #[tokio::test]
    async fn sink_failure_does_not_propagate() {
        let d = Dispatcher::with_sinks(vec![Box::new(FailingNotifier)]);
        // Must not panic or return an error surface.
        d.notify_update("t", "s", None).await;
    }
}
