//! Which topics are due for a check at a given instant.

use chrono::{DateTime, Duration, Utc};

use crate::config::Topic;

/// Topics whose interval has elapsed (inclusive) or that have never been
/// checked. Order follows the configuration, so logs and tests are
/// deterministic.
pub fn due_topics(topics: &[Topic], now: DateTime<Utc>) -> Vec<&Topic> {
    topics.iter().filter(|t| is_due(t, now)).collect()
}

pub fn is_due(topic: &Topic, now: DateTime<Utc>) -> bool {
    match topic.last_checked_at {
        None => true,
        Some(last) => now - last >= Duration::hours(i64::from(topic.check_interval_hours)),
    }
}

/// When the topic next becomes due; `None` means due now.
pub fn next_due_at(topic: &Topic, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let last = topic.last_checked_at?;
    let due = last + Duration::hours(i64::from(topic.check_interval_hours));
    (due > now).then_some(due)
}
