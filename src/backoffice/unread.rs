//! Unread counting as a pure function of snapshots.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::backoffice::conversations::Message;

/// Unread messages addressed to one viewer, counted per counterpart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadCounts {
    by_counterpart: BTreeMap<String, u32>,
}

impl UnreadCounts {
    /// Counts messages with `receiver = viewer_id` and `read = false`, keyed by sender.
    /// Anything else in `messages` is ignored.
    pub fn tally(viewer_id: &str, messages: &[Message]) -> Self {
        let mut by_counterpart = BTreeMap::new();
        for message in messages.iter().filter(|m| m.is_unread_for(viewer_id)) {
            *by_counterpart.entry(message.sender_id.clone()).or_insert(0) += 1;
        }
        Self { by_counterpart }
    }

    pub fn for_counterpart(&self, counterpart_id: &str) -> u32 {
        self.by_counterpart.get(counterpart_id).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.by_counterpart.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.by_counterpart.iter().map(|(id, count)| (id.as_str(), *count))
    }

    pub fn is_empty(&self) -> bool {
        self.by_counterpart.is_empty()
    }
}

/// Result of folding a new snapshot into the previous total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnreadTransition {
    pub total: u32,
    pub should_notify: bool,
}

/// Notify only when there was a previous total, the new one is strictly greater,
/// and the viewer isn't muted. The first snapshot sets the baseline.
pub fn reduce(previous_total: Option<u32>, counts: &UnreadCounts, muted: bool) -> UnreadTransition {
    let total = counts.total();
    let should_notify = !muted && previous_total.is_some_and(|previous| total > previous);
    UnreadTransition {
        total,
        should_notify,
    }
}
