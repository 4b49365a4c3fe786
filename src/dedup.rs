//! Suppress notifications that would repeat what the user already knows.
//!
//! Two independent guards: the content fingerprint (same underlying fact,
//! new wording) and a re-notify cooldown (verdicts flapping between changed
//! and unchanged on noisy sources).

use chrono::{DateTime, Duration, Utc};

use crate::config::Topic;
use crate::verdict::{CheckResult, Verdict};

const MIN_COOLDOWN_HOURS: i64 = 1;

#[derive(Debug, Clone, Copy)]
pub struct DedupFilter {
    /// Cooldown as a fraction of the topic's check interval (denominator).
    cooldown_divisor: i64,
}

impl Default for DedupFilter {
    fn default() -> Self {
        // Half the check interval, floor one hour.
        Self { cooldown_divisor: 2 }
    }
}

impl DedupFilter {
    pub fn new(cooldown_divisor: i64) -> Self {
        Self {
            cooldown_divisor: cooldown_divisor.max(1),
        }
    }

    /// True when this result is new information worth notifying on.
    /// Callers update `last_signal`/`last_notified_at` and persist them
    /// before dispatching, so a crash loses a notification rather than
    /// duplicating one.
    pub fn accept(&self, topic: &Topic, result: &CheckResult, now: DateTime<Utc>) -> bool {
        match result.verdict {
            Verdict::Unchanged | Verdict::Inconclusive => false,
            Verdict::Changed => {
                if topic.last_signal.as_deref() == Some(result.fingerprint.as_str()) {
                    tracing::debug!(topic = %topic.name, "suppressed: fingerprint unchanged");
                    return false;
                }
                if let Some(last) = topic.last_notified_at {
                    if now - last < self.cooldown(topic) {
                        tracing::debug!(topic = %topic.name, "suppressed: within re-notify cooldown");
                        return false;
                    }
                }
                true
            }
        }
    }

    fn cooldown(&self, topic: &Topic) -> Duration {
        let hours =
            (i64::from(topic.check_interval_hours) / self.cooldown_divisor).max(MIN_COOLDOWN_HOURS);
        Duration::hours(hours)
    }
}
