//! Dynamic Execution Graph
//!
//! The in-memory forest of execution nodes for one task. Single-writer:
//! only the owning decision loop mutates it; every other reader receives
//! deep-copied snapshots through the event bus.

pub mod render;

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::model::{ExecutionNode, NodeStatus, OnFailure, WebObservation};
use crate::template;

/// Deep copy of the graph suitable for serialization to the event bus
/// and the visualizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: BTreeMap<String, ExecutionNode>,
    pub root_node_id: Option<String>,
}

/// The node collection plus the structural invariants over it.
#[derive(Debug, Default)]
pub struct DecisionGraph {
    nodes: HashMap<String, ExecutionNode>,
    root: Option<String>,
}

impl DecisionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root_id(&self) -> Option<&str> {
        self.root.as_deref()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, node_id: &str) -> Option<&ExecutionNode> {
        self.nodes.get(node_id)
    }

    /// Children of a node in execution order (ascending priority,
    /// insertion order on ties).
    pub fn children(&self, node_id: &str) -> Vec<&ExecutionNode> {
        self.nodes
            .get(node_id)
            .map(|n| {
                n.child_ids
                    .iter()
                    .filter_map(|id| self.nodes.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Map of node id to resolved output for every SUCCESS node.
    pub fn outputs(&self) -> HashMap<String, String> {
        self.nodes
            .values()
            .filter(|n| n.status == NodeStatus::Success)
            .filter_map(|n| {
                n.resolved_output
                    .as_ref()
                    .map(|o| (n.node_id.clone(), o.clone()))
            })
            .collect()
    }

    /// Insert a node. `parent_id` overrides whatever the node carries;
    /// `None` makes it the root. Children lists stay sorted by priority,
    /// equal priorities keep insertion order.
    pub fn add_node(
        &mut self,
        mut node: ExecutionNode,
        parent_id: Option<&str>,
    ) -> Result<String, GraphError> {
        if self.nodes.contains_key(&node.node_id) {
            return Err(GraphError::DuplicateNode(node.node_id));
        }

        node.child_ids.clear();
        node.status = NodeStatus::Pending;
        node.parent_id = parent_id.map(|p| p.to_string());

        match parent_id {
            None => {
                if let Some(root) = &self.root {
                    return Err(GraphError::RootExists(root.clone()));
                }
                self.root = Some(node.node_id.clone());
            }
            Some(parent) => {
                if !self.nodes.contains_key(parent) {
                    return Err(GraphError::ParentMissing(parent.to_string()));
                }
            }
        }

        let id = node.node_id.clone();
        let priority = node.priority;
        self.nodes.insert(id.clone(), node);

        if let Some(parent) = parent_id {
            let siblings = self.nodes.get(parent).expect("parent exists").child_ids.clone();
            let insert_at = siblings
                .iter()
                .position(|cid| {
                    self.nodes
                        .get(cid)
                        .map(|c| c.priority > priority)
                        .unwrap_or(false)
                })
                .unwrap_or(siblings.len());
            let parent_node = self.nodes.get_mut(parent).expect("parent exists");
            parent_node.child_ids.insert(insert_at, id.clone());
        }

        Ok(id)
    }

    /// Deterministic priority-biased depth-first selection of the next
    /// runnable node.
    ///
    /// A PENDING node is runnable when its parent chain has led here
    /// (parent SUCCESS, or FAILED with descendants left pending for
    /// correction) and its precondition references all resolve. PRUNED,
    /// SKIPPED and RUNNING subtrees are opaque.
    pub fn next_runnable(&self) -> Option<&ExecutionNode> {
        let root = self.root.as_deref()?;
        let outputs = self.outputs();
        self.find_runnable(root, &outputs)
    }

    fn find_runnable<'a>(
        &'a self,
        node_id: &str,
        outputs: &HashMap<String, String>,
    ) -> Option<&'a ExecutionNode> {
        let node = self.nodes.get(node_id)?;
        match node.status {
            NodeStatus::Pending => {
                let ready = node
                    .required_precondition
                    .as_deref()
                    .map(|expr| template::resolvable(expr, outputs))
                    .unwrap_or(true);
                ready.then_some(node)
            }
            // SUCCESS continues into the subtree; FAILED stays transparent
            // so grafted corrections and their continuations are reachable.
            NodeStatus::Success | NodeStatus::Failed => node
                .child_ids
                .iter()
                .find_map(|cid| self.find_runnable(cid, outputs)),
            NodeStatus::Running | NodeStatus::Pruned | NodeStatus::Skipped => None,
        }
    }

    /// Transition a node, enforcing the legal lifecycle and applying the
    /// action's on-failure policy to descendants.
    pub fn mark(
        &mut self,
        node_id: &str,
        status: NodeStatus,
        reason: Option<String>,
        output: Option<String>,
        observation: Option<WebObservation>,
    ) -> Result<(), GraphError> {
        let node = self
            .nodes
            .get(node_id)
            .ok_or_else(|| GraphError::UnknownNode(node_id.to_string()))?;
        let from = node.status;

        let legal = matches!(
            (from, status),
            (NodeStatus::Pending, NodeStatus::Running)
                | (NodeStatus::Running, NodeStatus::Success)
                | (NodeStatus::Running, NodeStatus::Failed)
                | (NodeStatus::Pending, NodeStatus::Failed)
                | (NodeStatus::Pending, NodeStatus::Skipped)
                | (NodeStatus::Pending, NodeStatus::Pruned)
                | (NodeStatus::Pruned, NodeStatus::Pruned)
        );
        if !legal {
            return Err(GraphError::IllegalTransition {
                node: node_id.to_string(),
                from: format!("{from:?}"),
                to: format!("{status:?}"),
            });
        }

        let policy = node.action.on_failure;
        {
            let node = self.nodes.get_mut(node_id).expect("checked above");
            node.status = status;
            if let Some(reason) = reason {
                node.failure_reason = Some(reason);
            }
            if status == NodeStatus::Success {
                // Resolved output is written exactly once, on SUCCESS.
                if node.resolved_output.is_none() {
                    node.resolved_output = output;
                }
            }
            if let Some(obs) = observation {
                node.observation = Some(obs);
            }
        }

        if status == NodeStatus::Failed {
            match policy {
                OnFailure::Abort => {
                    for child in self.child_ids_of(node_id) {
                        self.prune(&child);
                    }
                }
                OnFailure::Skip => self.skip_descendants(node_id),
                // Descendants stay PENDING for the loop to re-examine
                // after correction or retry.
                OnFailure::ReEvaluate | OnFailure::RetryOnly => {}
            }
        }

        Ok(())
    }

    /// Set a node and every descendant to PRUNED. Idempotent; unknown ids
    /// are ignored.
    pub fn prune(&mut self, node_id: &str) {
        if !self.nodes.contains_key(node_id) {
            return;
        }
        let mut stack = vec![node_id.to_string()];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.status = NodeStatus::Pruned;
                stack.extend(node.child_ids.iter().cloned());
            }
        }
    }

    fn skip_descendants(&mut self, node_id: &str) {
        let mut stack = self.child_ids_of(node_id);
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(&id) {
                if node.status == NodeStatus::Pending {
                    node.status = NodeStatus::Skipped;
                }
                stack.extend(node.child_ids.iter().cloned());
            }
        }
    }

    fn child_ids_of(&self, node_id: &str) -> Vec<String> {
        self.nodes
            .get(node_id)
            .map(|n| n.child_ids.clone())
            .unwrap_or_default()
    }

    /// Graft a correction subplan under `after_node_id`.
    ///
    /// Nodes without a parent become children of the anchor; each injected
    /// node receives a priority strictly below every pre-existing PENDING
    /// sibling at its level, so corrections run before the original
    /// continuation. Returns the injected ids in insertion order.
    pub fn inject_correction(
        &mut self,
        after_node_id: &str,
        nodes: Vec<ExecutionNode>,
    ) -> Result<Vec<String>, GraphError> {
        let anchor = self
            .nodes
            .get(after_node_id)
            .ok_or_else(|| GraphError::UnknownNode(after_node_id.to_string()))?;
        if !matches!(anchor.status, NodeStatus::Failed | NodeStatus::Success) {
            return Err(GraphError::BadAnchor(after_node_id.to_string()));
        }

        let mut injected: Vec<String> = Vec::with_capacity(nodes.len());
        // Floors are the PRE-injection pending-sibling priorities, cached
        // per parent so injected nodes keep their relative order instead
        // of repeatedly undercutting each other.
        let mut floors: HashMap<String, Option<i64>> = HashMap::new();
        for mut node in nodes {
            let parent = node
                .parent_id
                .take()
                .filter(|p| self.nodes.contains_key(p) || injected.contains(p))
                .unwrap_or_else(|| after_node_id.to_string());

            let floor = *floors
                .entry(parent.clone())
                .or_insert_with(|| self.min_pending_sibling_priority(&parent));
            if let Some(floor) = floor {
                if node.priority >= floor {
                    node.priority = floor - 1;
                }
            }

            let id = self.add_node(node, Some(&parent))?;
            injected.push(id);
        }
        Ok(injected)
    }

    fn min_pending_sibling_priority(&self, parent: &str) -> Option<i64> {
        self.children(parent)
            .iter()
            .filter(|c| c.status == NodeStatus::Pending)
            .map(|c| c.priority)
            .min()
    }

    /// Deep copy for the event bus and the visualizer.
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self
                .nodes
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            root_node_id: self.root.clone(),
        }
    }

    /// Snapshot of a single node (for `node_update` events).
    pub fn node_snapshot(&self, node_id: &str) -> Option<ExecutionNode> {
        self.nodes.get(node_id).cloned()
    }

    /// Ids of every node that is not yet terminal, in deterministic order.
    pub fn non_terminal_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .nodes
            .values()
            .filter(|n| !n.status.is_terminal())
            .map(|n| n.node_id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Structural invariant check used by the test suite: parent/child
    /// links are mutual, the parent relation is acyclic from the root,
    /// aborted failures have fully pruned subtrees, and only terminal
    /// successes carry resolved outputs.
    #[doc(hidden)]
    pub fn check_invariants(&self) -> Result<(), String> {
        for node in self.nodes.values() {
            if let Some(parent_id) = &node.parent_id {
                let parent = self
                    .nodes
                    .get(parent_id)
                    .ok_or_else(|| format!("{}: dangling parent {parent_id}", node.node_id))?;
                if !parent.child_ids.contains(&node.node_id) {
                    return Err(format!(
                        "{}: parent {parent_id} does not list it as a child",
                        node.node_id
                    ));
                }
            } else if self.root.as_deref() != Some(node.node_id.as_str()) {
                return Err(format!("{}: parentless non-root node", node.node_id));
            }
            for child_id in &node.child_ids {
                let child = self
                    .nodes
                    .get(child_id)
                    .ok_or_else(|| format!("{}: dangling child {child_id}", node.node_id))?;
                if child.parent_id.as_deref() != Some(node.node_id.as_str()) {
                    return Err(format!("{child_id}: parent link does not match"));
                }
            }
            if node.resolved_output.is_some()
                && matches!(node.status, NodeStatus::Pending | NodeStatus::Running)
            {
                return Err(format!("{}: resolved output before completion", node.node_id));
            }
            if node.status == NodeStatus::Failed && node.action.on_failure == OnFailure::Abort {
                let mut stack = node.child_ids.clone();
                while let Some(id) = stack.pop() {
                    let d = &self.nodes[&id];
                    if d.status != NodeStatus::Pruned {
                        return Err(format!("{id}: unpruned descendant of aborted {}", node.node_id));
                    }
                    stack.extend(d.child_ids.iter().cloned());
                }
            }
        }

        // Acyclicity: every node must be reachable from the root exactly once.
        if let Some(root) = &self.root {
            let mut seen = HashSet::new();
            let mut stack = vec![root.clone()];
            while let Some(id) = stack.pop() {
                if !seen.insert(id.clone()) {
                    return Err(format!("{id}: visited twice (cycle)"));
                }
                if let Some(node) = self.nodes.get(&id) {
                    stack.extend(node.child_ids.iter().cloned());
                }
            }
            if seen.len() != self.nodes.len() {
                return Err("unreachable nodes exist".to_string());
            }
        } else if !self.nodes.is_empty() {
            return Err("nodes without a root".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DecisionAction;

    fn node(id: &str, priority: i64) -> ExecutionNode {
        ExecutionNode::new(id, DecisionAction::new("navigate_to")).with_priority(priority)
    }

    fn node_with_policy(id: &str, priority: i64, policy: OnFailure) -> ExecutionNode {
        let mut n = node(id, priority);
        n.action.on_failure = policy;
        n
    }

    fn run_then_fail(graph: &mut DecisionGraph, id: &str) {
        graph
            .mark(id, NodeStatus::Running, None, None, None)
            .unwrap();
        graph
            .mark(id, NodeStatus::Failed, Some("boom".into()), None, None)
            .unwrap();
    }

    fn run_then_succeed(graph: &mut DecisionGraph, id: &str, output: &str) {
        graph
            .mark(id, NodeStatus::Running, None, None, None)
            .unwrap();
        graph
            .mark(
                id,
                NodeStatus::Success,
                None,
                Some(output.to_string()),
                None,
            )
            .unwrap();
    }

    #[test]
    fn second_root_is_rejected() {
        let mut graph = DecisionGraph::new();
        graph.add_node(node("n1", 1), None).unwrap();
        let err = graph.add_node(node("n2", 1), None).unwrap_err();
        assert_eq!(err, GraphError::RootExists("n1".to_string()));
    }

    #[test]
    fn missing_parent_is_rejected() {
        let mut graph = DecisionGraph::new();
        graph.add_node(node("n1", 1), None).unwrap();
        let err = graph.add_node(node("n2", 1), Some("ghost")).unwrap_err();
        assert_eq!(err, GraphError::ParentMissing("ghost".to_string()));
    }

    #[test]
    fn children_are_priority_ordered_with_stable_ties() {
        let mut graph = DecisionGraph::new();
        graph.add_node(node("root", 1), None).unwrap();
        graph.add_node(node("b", 5), Some("root")).unwrap();
        graph.add_node(node("a", 2), Some("root")).unwrap();
        graph.add_node(node("c", 5), Some("root")).unwrap();

        let order: Vec<&str> = graph
            .children("root")
            .iter()
            .map(|n| n.node_id.as_str())
            .collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        graph.check_invariants().unwrap();
    }

    #[test]
    fn next_runnable_walks_depth_first_and_is_deterministic() {
        let mut graph = DecisionGraph::new();
        graph.add_node(node("root", 1), None).unwrap();
        graph.add_node(node("left", 1), Some("root")).unwrap();
        graph.add_node(node("right", 2), Some("root")).unwrap();

        assert_eq!(graph.next_runnable().unwrap().node_id, "root");
        run_then_succeed(&mut graph, "root", "ok");

        for _ in 0..3 {
            assert_eq!(graph.next_runnable().unwrap().node_id, "left");
        }
        run_then_succeed(&mut graph, "left", "ok");
        assert_eq!(graph.next_runnable().unwrap().node_id, "right");
        run_then_succeed(&mut graph, "right", "ok");
        assert!(graph.next_runnable().is_none());
    }

    #[test]
    fn unresolved_precondition_defers_to_siblings() {
        let mut graph = DecisionGraph::new();
        graph.add_node(node("root", 1), None).unwrap();
        let mut gated = node("gated", 1);
        gated.required_precondition = Some("${other.output}".to_string());
        graph.add_node(gated, Some("root")).unwrap();
        graph.add_node(node("free", 2), Some("root")).unwrap();

        run_then_succeed(&mut graph, "root", "ok");
        // "gated" has the lower priority but cannot run yet.
        assert_eq!(graph.next_runnable().unwrap().node_id, "free");

        run_then_succeed(&mut graph, "free", "ok");
        assert!(graph.next_runnable().is_none());
    }

    #[test]
    fn precondition_resolves_once_reference_succeeds() {
        let mut graph = DecisionGraph::new();
        graph.add_node(node("root", 1), None).unwrap();
        graph.add_node(node("source", 1), Some("root")).unwrap();
        let mut gated = node("gated", 2);
        gated.required_precondition = Some("${source.output}".to_string());
        graph.add_node(gated, Some("root")).unwrap();

        run_then_succeed(&mut graph, "root", "ok");
        run_then_succeed(&mut graph, "source", "the data");
        assert_eq!(graph.next_runnable().unwrap().node_id, "gated");
    }

    #[test]
    fn running_node_is_never_offered_twice() {
        let mut graph = DecisionGraph::new();
        graph.add_node(node("root", 1), None).unwrap();
        graph
            .mark("root", NodeStatus::Running, None, None, None)
            .unwrap();
        assert!(graph.next_runnable().is_none());
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        let mut graph = DecisionGraph::new();
        graph.add_node(node("root", 1), None).unwrap();
        // success straight from pending
        let err = graph
            .mark("root", NodeStatus::Success, None, None, None)
            .unwrap_err();
        assert!(matches!(err, GraphError::IllegalTransition { .. }));

        run_then_succeed(&mut graph, "root", "ok");
        // no revival
        assert!(graph
            .mark("root", NodeStatus::Running, None, None, None)
            .is_err());
    }

    #[test]
    fn resolved_output_is_immutable_after_success() {
        let mut graph = DecisionGraph::new();
        graph.add_node(node("root", 1), None).unwrap();
        run_then_succeed(&mut graph, "root", "first");
        assert_eq!(
            graph.get("root").unwrap().resolved_output.as_deref(),
            Some("first")
        );
    }

    #[test]
    fn abort_failure_prunes_descendants() {
        let mut graph = DecisionGraph::new();
        graph.add_node(node("root", 1), None).unwrap();
        graph
            .add_node(node_with_policy("mid", 1, OnFailure::Abort), Some("root"))
            .unwrap();
        graph.add_node(node("leaf", 1), Some("mid")).unwrap();
        graph.add_node(node("leaf2", 2), Some("mid")).unwrap();

        run_then_succeed(&mut graph, "root", "ok");
        run_then_fail(&mut graph, "mid");

        assert_eq!(graph.get("leaf").unwrap().status, NodeStatus::Pruned);
        assert_eq!(graph.get("leaf2").unwrap().status, NodeStatus::Pruned);
        assert!(graph.next_runnable().is_none());
        graph.check_invariants().unwrap();
    }

    #[test]
    fn skip_failure_skips_descendants() {
        let mut graph = DecisionGraph::new();
        graph.add_node(node("root", 1), None).unwrap();
        graph
            .add_node(node_with_policy("mid", 1, OnFailure::Skip), Some("root"))
            .unwrap();
        graph.add_node(node("leaf", 1), Some("mid")).unwrap();
        graph.add_node(node("after", 2), Some("root")).unwrap();

        run_then_succeed(&mut graph, "root", "ok");
        run_then_fail(&mut graph, "mid");

        assert_eq!(graph.get("leaf").unwrap().status, NodeStatus::Skipped);
        // The sibling branch is still schedulable.
        assert_eq!(graph.next_runnable().unwrap().node_id, "after");
    }

    #[test]
    fn re_evaluate_failure_leaves_descendants_pending() {
        let mut graph = DecisionGraph::new();
        graph.add_node(node("root", 1), None).unwrap();
        graph
            .add_node(
                node_with_policy("mid", 1, OnFailure::ReEvaluate),
                Some("root"),
            )
            .unwrap();
        graph.add_node(node("leaf", 1), Some("mid")).unwrap();

        run_then_succeed(&mut graph, "root", "ok");
        run_then_fail(&mut graph, "mid");

        assert_eq!(graph.get("leaf").unwrap().status, NodeStatus::Pending);
        // The failed node is transparent; the continuation is reachable.
        assert_eq!(graph.next_runnable().unwrap().node_id, "leaf");
    }

    #[test]
    fn prune_is_idempotent_and_total() {
        let mut graph = DecisionGraph::new();
        graph.add_node(node("root", 1), None).unwrap();
        graph.add_node(node("a", 1), Some("root")).unwrap();
        graph.add_node(node("b", 1), Some("a")).unwrap();
        run_then_succeed(&mut graph, "root", "ok");
        run_then_succeed(&mut graph, "a", "ok");

        graph.prune("a");
        let first = graph.snapshot();
        graph.prune("a");
        assert_eq!(graph.snapshot(), first);

        // No descendant remains pending, running or successful.
        assert_eq!(graph.get("a").unwrap().status, NodeStatus::Pruned);
        assert_eq!(graph.get("b").unwrap().status, NodeStatus::Pruned);
    }

    #[test]
    fn correction_runs_before_the_original_continuation() {
        let mut graph = DecisionGraph::new();
        graph.add_node(node("root", 1), None).unwrap();
        graph
            .add_node(
                node_with_policy("broken", 1, OnFailure::ReEvaluate),
                Some("root"),
            )
            .unwrap();
        graph.add_node(node("continuation", 3), Some("broken")).unwrap();

        run_then_succeed(&mut graph, "root", "ok");
        run_then_fail(&mut graph, "broken");

        let injected = graph
            .inject_correction("broken", vec![node("fix-1", 9), node("fix-2", 9)])
            .unwrap();
        assert_eq!(injected, vec!["fix-1", "fix-2"]);

        let fix1 = graph.get("fix-1").unwrap();
        let continuation = graph.get("continuation").unwrap();
        assert!(fix1.priority < continuation.priority);

        // Scheduler picks the grafted correction first.
        assert_eq!(graph.next_runnable().unwrap().node_id, "fix-1");
        run_then_succeed(&mut graph, "fix-1", "ok");
        assert_eq!(graph.next_runnable().unwrap().node_id, "fix-2");
        run_then_succeed(&mut graph, "fix-2", "ok");
        assert_eq!(graph.next_runnable().unwrap().node_id, "continuation");
        graph.check_invariants().unwrap();
    }

    #[test]
    fn correction_anchor_must_be_terminal() {
        let mut graph = DecisionGraph::new();
        graph.add_node(node("root", 1), None).unwrap();
        let err = graph
            .inject_correction("root", vec![node("fix", 1)])
            .unwrap_err();
        assert_eq!(err, GraphError::BadAnchor("root".to_string()));
    }

    #[test]
    fn snapshot_is_detached_from_later_mutations() {
        let mut graph = DecisionGraph::new();
        graph.add_node(node("root", 1), None).unwrap();
        let before = graph.snapshot();
        run_then_succeed(&mut graph, "root", "ok");
        assert_eq!(
            before.nodes["root"].status,
            NodeStatus::Pending,
            "snapshot must be a deep copy"
        );
    }

    #[test]
    fn invariants_hold_under_a_mixed_mutation_sequence() {
        let mut graph = DecisionGraph::new();
        graph.add_node(node("root", 1), None).unwrap();
        graph
            .add_node(node_with_policy("a", 1, OnFailure::ReEvaluate), Some("root"))
            .unwrap();
        graph.add_node(node("a1", 1), Some("a")).unwrap();
        graph.add_node(node("b", 2), Some("root")).unwrap();
        graph.check_invariants().unwrap();

        run_then_succeed(&mut graph, "root", "r");
        run_then_fail(&mut graph, "a");
        graph
            .inject_correction("a", vec![node("fix", 5)])
            .unwrap();
        graph.check_invariants().unwrap();

        run_then_succeed(&mut graph, "fix", "ok");
        run_then_succeed(&mut graph, "a1", "ok");
        graph.prune("b");
        graph.check_invariants().unwrap();
        assert!(graph.next_runnable().is_none());
    }
}
