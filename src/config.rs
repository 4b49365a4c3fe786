//! Shared configuration: the watched topics plus the global check policy.
//!
//! One TOML document is the single source of truth for both the daemon and
//! the editor process; everything here round-trips through serde.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Allowed range for a topic's check interval, in hours.
pub const MIN_INTERVAL_HOURS: u32 = 1;
pub const MAX_INTERVAL_HOURS: u32 = 168;

/// A monitored subject. `name` is the identity used for lookups and edits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub search_queries: Vec<String>,
    #[serde(default)]
    pub urls_to_check: Vec<String>,
    #[serde(default = "default_interval")]
    pub check_interval_hours: u32,
    /// Set by the daemon after every completed check attempt, success or not.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked_at: Option<DateTime<Utc>>,
    /// Fingerprint of the last state we notified about ("nothing new beyond this").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_signal: Option<String>,
    /// When a notification was last actually dispatched for this topic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_notified_at: Option<DateTime<Utc>>,
}

fn default_interval() -> u32 {
    24
}

impl Topic {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            search_queries: Vec::new(),
            urls_to_check: Vec::new(),
            check_interval_hours: default_interval(),
            last_checked_at: None,
            last_signal: None,
            last_notified_at: None,
        }
    }

    /// Clamp the interval into the supported range. Applied on load so a
    /// hand-edited file cannot produce a zero or multi-month interval.
    pub fn clamp_interval(&mut self) {
        self.check_interval_hours = self
            .check_interval_hours
            .clamp(MIN_INTERVAL_HOURS, MAX_INTERVAL_HOURS);
    }
}

/// Check policy applied uniformly to all topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalPolicy {
    pub require_ac_power: bool,
    pub idle_threshold_minutes: u32,
}

/// The persisted aggregate: policy keys at the top level, then the topics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default = "default_require_ac")]
    pub require_ac_power: bool,
    #[serde(default = "default_idle_threshold")]
    pub idle_threshold_minutes: u32,
    #[serde(default)]
    pub topics: Vec<Topic>,
}

fn default_require_ac() -> bool {
    true
}

fn default_idle_threshold() -> u32 {
    5
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            require_ac_power: default_require_ac(),
            idle_threshold_minutes: default_idle_threshold(),
            topics: Vec::new(),
        }
    }
}

/// Name collisions are an error, not a silent overwrite.
#[derive(Debug, thiserror::Error)]
#[error("topic '{0}' already exists")]
pub struct DuplicateTopic(pub String);

impl Configuration {
    pub fn policy(&self) -> GlobalPolicy {
        GlobalPolicy {
            require_ac_power: self.require_ac_power,
            idle_threshold_minutes: self.idle_threshold_minutes,
        }
    }

    pub fn topic(&self, name: &str) -> Option<&Topic> {
        self.topics.iter().find(|t| t.name == name)
    }

    pub fn topic_mut(&mut self, name: &str) -> Option<&mut Topic> {
        self.topics.iter_mut().find(|t| t.name == name)
    }

    /// Append a topic, enforcing case-sensitive name uniqueness.
    pub fn add_topic(&mut self, mut topic: Topic) -> Result<(), DuplicateTopic> {
        if self.topic(&topic.name).is_some() {
            return Err(DuplicateTopic(topic.name));
        }
        topic.clamp_interval();
        self.topics.push(topic);
        Ok(())
    }

    /// Remove by name; returns the removed topic if it existed.
    pub fn remove_topic(&mut self, name: &str) -> Option<Topic> {
        let idx = self.topics.iter().position(|t| t.name == name)?;
        Some(self.topics.remove(idx))
    }

    /// Replace the topic named `original` in place. A rename to a name that
    /// another topic already holds is rejected.
    pub fn update_topic(&mut self, original: &str, updated: Topic) -> Result<(), DuplicateTopic> {
        if updated.name != original && self.topic(&updated.name).is_some() {
            return Err(DuplicateTopic(updated.name));
        }
        if let Some(slot) = self.topic_mut(original) {
            let mut updated = updated;
            updated.clamp_interval();
            *slot = updated;
        }
        Ok(())
    }

    /// Normalize after deserializing a file someone may have hand-edited.
    pub fn sanitize(&mut self) {
        for t in &mut self.topics {
            t.clamp_interval();
            t.search_queries.retain(|q| !q.trim().is_empty());
            t.urls_to_check.retain(|u| !u.trim().is_empty());
        }
    }
}

/// The commented starter config written by `watchdog init`, with the worked
/// example the upstream project ships.
pub const DEFAULT_CONFIG_TEXT: &str = r#"# Watchdog Agent configuration
# The daemon and the manager UI both read and write this file.

# Only run scheduled checks while on AC power.
require_ac_power = true

# Only run scheduled checks once the user has been idle this many minutes.
# 0 disables the idle gate.
idle_threshold_minutes = 5

[[topics]]
name = "HP ZBook Battery Charge Limit"
description = "Monitor for HP ZBook Ultra G1a battery charge threshold/limit support in BIOS or Linux"
search_queries = [
    "HP ZBook Ultra G1a battery charge limit",
    "HP ZBook G1a BIOS update battery",
    "HP laptop Linux charge threshold support",
]
urls_to_check = [
    "https://h30434.www3.hp.com/t5/Notebook-Software-and-How-To-Questions/Limit-Battery-Charge-to-80/td-p/8380809",
]
check_interval_hours = 48
"#;
