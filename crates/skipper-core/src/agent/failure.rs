//! Repeated dispatch-failure detection.
//!
//! Tracks (tool, error code, argument hash) signatures across dispatches.
//! When the same signature keeps recurring, the loop stops spending
//! correction rounds on it and aborts the branch instead.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::model::{ActionFeedback, DecisionAction};

/// Stop re-planning once the same failure has been seen this many times.
pub const REPEATED_FAILURE_THRESHOLD: usize = 2;

#[derive(Default)]
pub struct FailureTracker {
    counters: HashMap<String, usize>,
}

impl FailureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failed dispatch. Returns true when the signature has hit
    /// the repeat threshold.
    pub fn record_failure(&mut self, action: &DecisionAction, feedback: &ActionFeedback) -> bool {
        let signature = format!(
            "{}|{}|{}",
            action.tool_name,
            feedback.error_code.as_deref().unwrap_or("unknown"),
            hash_arguments(action),
        );
        let count = self
            .counters
            .entry(signature)
            .and_modify(|c| *c += 1)
            .or_insert(1);
        *count >= REPEATED_FAILURE_THRESHOLD
    }

    /// Any success clears the counters; the agent recovered.
    pub fn record_success(&mut self) {
        self.counters.clear();
    }
}

fn hash_arguments(action: &DecisionAction) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    serde_json::Value::Object(action.arguments.clone())
        .to_string()
        .hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::codes;
    use serde_json::json;

    fn action() -> DecisionAction {
        DecisionAction::new("click_element").with_arg("xpath", json!("//a[1]"))
    }

    #[test]
    fn trips_at_threshold() {
        let mut tracker = FailureTracker::new();
        let feedback = ActionFeedback::failed(codes::E_STALE_DOM, "gone");
        assert!(!tracker.record_failure(&action(), &feedback));
        assert!(tracker.record_failure(&action(), &feedback));
    }

    #[test]
    fn different_arguments_count_separately() {
        let mut tracker = FailureTracker::new();
        let feedback = ActionFeedback::failed(codes::E_STALE_DOM, "gone");
        let other = DecisionAction::new("click_element").with_arg("xpath", json!("//a[2]"));
        assert!(!tracker.record_failure(&action(), &feedback));
        assert!(!tracker.record_failure(&other, &feedback));
    }

    #[test]
    fn success_clears_counters() {
        let mut tracker = FailureTracker::new();
        let feedback = ActionFeedback::failed(codes::E_NET, "down");
        tracker.record_failure(&action(), &feedback);
        tracker.record_success();
        assert!(!tracker.record_failure(&action(), &feedback));
    }
}
