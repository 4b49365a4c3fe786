//! Desktop notification sink (freedesktop notifications via notify-rust).

use anyhow::{Context, Result};

use super::{Notification, Notifier, Urgency};

pub struct DesktopNotifier {
    app_name: String,
    icon: String,
}

impl Default for DesktopNotifier {
    fn default() -> Self {
        Self {
            app_name: "Watchdog Agent".to_string(),
            icon: "dialog-information".to_string(),
        }
    }
}

impl From<Urgency> for notify_rust::Urgency {
    fn from(u: Urgency) -> Self {
        match u {
            Urgency::Low => notify_rust::Urgency::Low,
            Urgency::Normal => notify_rust::Urgency::Normal,
            Urgency::Critical => notify_rust::Urgency::Critical,
        }
    }
}

#[async_trait::async_trait]
impl Notifier for DesktopNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        let app_name = self.app_name.clone();
        let icon = self.icon.clone();
        let n = notification.clone();
        // The D-Bus round trip is synchronous; keep it off the runtime.
        tokio::task::spawn_blocking(move || {
            notify_rust::Notification::new()
                .appname(&app_name)
                .summary(&n.title)
                .body(&n.body)
                .icon(&icon)
                .urgency(n.urgency.into())
                .timeout(notify_rust::Timeout::Milliseconds(n.timeout_ms))
                .show()
                .map(|_| ())
        })
        .await
        .context("notification task")?
        .context("display notification")?;
        Ok(())
    }
}
