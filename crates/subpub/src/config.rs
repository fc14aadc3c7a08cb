//! Bus configuration.

use std::fmt;
use std::str::FromStr;

use crate::DEFAULT_QUEUE_CAPACITY;

/// Default number of in-flight handoffs per subscriber before warning.
pub const DEFAULT_HANDOFF_WARN_THRESHOLD: usize = 64;

/// What the dispatcher does when a subscriber's queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Hand the message to a spawned task that waits for queue space.
    ///
    /// The publisher never waits on the slow subscriber. The handed-off
    /// message may overtake or be overtaken by messages published
    /// concurrently, and a subscriber that never catches up accumulates
    /// handoff tasks.
    #[default]
    Handoff,

    /// Drop the message for that subscriber only.
    ///
    /// Memory stays bounded and delivered messages keep publish order.
    DropNewest,
}

impl OverflowPolicy {
    /// Configuration name of the policy.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Handoff => "handoff",
            Self::DropNewest => "drop-newest",
        }
    }
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing an [`OverflowPolicy`] from its configuration name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown overflow policy '{0}' (expected 'handoff' or 'drop-newest')")]
pub struct ParsePolicyError(pub String);

impl FromStr for OverflowPolicy {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "handoff" => Ok(Self::Handoff),
            "drop-newest" | "drop_newest" | "drop" => Ok(Self::DropNewest),
            other => Err(ParsePolicyError(other.to_string())),
        }
    }
}

/// Tuning for an [`InMemoryBus`](crate::InMemoryBus).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    /// Pending messages buffered per subscriber before overflow applies.
    pub queue_capacity: usize,

    /// Behavior when a subscriber's queue is full.
    pub overflow_policy: OverflowPolicy,

    /// In-flight handoffs for one subscriber at which a warning is logged.
    pub handoff_warn_threshold: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            overflow_policy: OverflowPolicy::default(),
            handoff_warn_threshold: DEFAULT_HANDOFF_WARN_THRESHOLD,
        }
    }
}

impl BusConfig {
    /// Set the per-subscriber queue capacity. Clamped to at least 1.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Set the overflow policy.
    #[must_use]
    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    /// Set the handoff warning threshold. Clamped to at least 1.
    #[must_use]
    pub fn with_handoff_warn_threshold(mut self, threshold: usize) -> Self {
        self.handoff_warn_threshold = threshold.max(1);
        self
    }

    /// Queue capacity actually used when creating channels.
    pub(crate) fn effective_capacity(&self) -> usize {
        self.queue_capacity.max(1)
    }
}
