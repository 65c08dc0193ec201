//! Decision loop - the lifecycle of one task.
//!
//! One instance per task, spawned by the registry. The loop owns the
//! graph and the browser session; planner and dispatcher are
//! collaborators carried in `LoopServices`. Explicit state machine:
//! initial plan, then schedule -> dispatch -> observe -> update, with
//! pruning or correction grafting on failure, until no runnable node or
//! a terminal condition holds.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::dispatch::DispatchResult;
use crate::error::codes;
use crate::graph::{render, DecisionGraph};
use crate::model::{NodeStatus, OnFailure, Severity, TaskGoal, TaskStatus, WebObservation};
use crate::tools::ToolContext;

use super::failure::FailureTracker;
use super::loop_events::BusEvent;
use super::registry::{LoopServices, TaskHandle};

/// Correction rounds allowed per task before failures force an abort.
pub const CORRECTION_BUDGET: usize = 3;

const WALL_CLOCK_FLOOR: Duration = Duration::from_secs(30);
const MEMORY_CONTEXT_LINES: usize = 5;

pub struct DecisionLoop {
    services: Arc<LoopServices>,
    handle: Arc<TaskHandle>,
    goal: TaskGoal,
    headless: bool,
}

/// Wall-clock budget: per-step budget times node count, floored.
fn wall_clock_budget(goal: &TaskGoal, node_count: usize) -> Duration {
    let product = goal
        .max_execution_time_seconds
        .saturating_mul(node_count.max(1) as u64);
    Duration::from_secs(product).max(WALL_CLOCK_FLOOR)
}

impl DecisionLoop {
    pub fn new(
        services: Arc<LoopServices>,
        handle: Arc<TaskHandle>,
        goal: TaskGoal,
        headless: bool,
    ) -> Self {
        Self {
            services,
            handle,
            goal,
            headless,
        }
    }

    pub async fn run(self) {
        let task_id = self.goal.task_id.clone();

        self.handle.update_execution(|e| {
            e.status = TaskStatus::Running;
            e.started_at = Some(chrono::Utc::now());
        });
        self.emit_task_update();
        self.log(Severity::Info, format!("task started: {}", self.goal.description), None);

        let browser = match self
            .services
            .provider
            .acquire(&task_id, self.headless)
            .await
        {
            Ok(browser) => browser,
            Err(e) => {
                self.log(
                    Severity::Error,
                    format!("browser session unavailable: {e}"),
                    None,
                );
                self.finalize(&DecisionGraph::new(), TaskStatus::Failed).await;
                return;
            }
        };

        let mut ctx = ToolContext::new(browser, self.goal.description.clone());
        ctx.screenshots_dir = self.services.screenshots_dir.clone();
        ctx.notes_dir = self.services.notes_dir.clone();

        let mut graph = DecisionGraph::new();
        let mut step: u64 = 0;
        let mut latest_observation: Option<WebObservation> = None;
        let mut memory: Vec<String> = Vec::new();
        let mut corrected: Vec<String> = Vec::new();
        let mut correction_rounds = 0usize;
        let mut failures = FailureTracker::new();
        let mut last_url = String::new();
        let started = Instant::now();
        let mut forced_failure: Option<String> = None;
        let mut cancelled = false;

        // ── INITIALIZING ───────────────────────────────────────────────
        match self.services.planner.plan(&self.goal, None, "").await {
            Ok(nodes) => {
                for node in nodes {
                    let anchor = match (node.parent_id.clone(), graph.root_id()) {
                        (Some(p), _) if graph.get(&p).is_some() => Some(p),
                        (_, None) => None,
                        (_, Some(root)) => Some(root.to_string()),
                    };
                    match graph.add_node(node, anchor.as_deref()) {
                        Ok(id) => {
                            step += 1;
                            self.after_mutation(&graph, &id, step);
                        }
                        Err(e) => self.log(
                            Severity::Warning,
                            format!("dropping planned node: {e}"),
                            None,
                        ),
                    }
                }
            }
            Err(e) => {
                self.log(Severity::Error, format!("planning failed: {e}"), None);
                self.finalize(&graph, TaskStatus::Failed).await;
                return;
            }
        }
        if graph.is_empty() {
            self.log(Severity::Error, "planner produced no nodes", None);
            self.finalize(&graph, TaskStatus::Failed).await;
            return;
        }

        // ── SCHEDULING / DISPATCHING ───────────────────────────────────
        loop {
            // Cooperative cancellation: nothing enters RUNNING once the
            // flag is observed.
            if self.handle.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let budget = wall_clock_budget(&self.goal, graph.len());
            let elapsed = started.elapsed();
            if elapsed >= budget {
                forced_failure = Some(self.wall_clock_exceeded(&mut graph, &mut step, None));
                break;
            }

            let Some((node_id, action)) = graph
                .next_runnable()
                .map(|n| (n.node_id.clone(), n.action.clone()))
            else {
                break;
            };

            if let Err(e) = graph.mark(&node_id, NodeStatus::Running, None, None, None) {
                self.log(Severity::Error, format!("scheduler error: {e}"), Some(node_id));
                break;
            }
            step += 1;
            self.after_mutation(&graph, &node_id, step);
            self.log(
                Severity::Info,
                format!("dispatching {}", action.tool_name),
                Some(node_id.clone()),
            );

            let outputs = graph.outputs();
            let memory_context = memory.join("\n");
            let remaining = budget.saturating_sub(elapsed);
            let dispatched = tokio::time::timeout(
                remaining,
                self.services.dispatcher.dispatch(
                    &action,
                    &ctx,
                    &outputs,
                    &self.handle.cancel,
                    &memory_context,
                ),
            )
            .await;

            let result: DispatchResult = match dispatched {
                Ok(result) => result,
                Err(_) => {
                    forced_failure =
                        Some(self.wall_clock_exceeded(&mut graph, &mut step, Some(&node_id)));
                    break;
                }
            };

            latest_observation = Some(result.observation.clone());
            push_memory(
                &mut memory,
                format!(
                    "{} -> {:?} {}",
                    action.tool_name,
                    result.feedback.status,
                    result.feedback.message
                ),
            );

            if result.observation.current_url != last_url
                && !result.observation.current_url.is_empty()
            {
                last_url = result.observation.current_url.clone();
                self.services
                    .bus
                    .publish(&self.goal.task_id, BusEvent::BrowserUrl {
                        url: last_url.clone(),
                    });
            }

            if result.feedback.is_success() {
                failures.record_success();
                if action.tool_name == "take_screenshot" {
                    if let Some(path) = &result.output {
                        self.handle.set_latest_screenshot(PathBuf::from(path));
                    }
                }
                if let Err(e) = graph.mark(
                    &node_id,
                    NodeStatus::Success,
                    None,
                    result.output,
                    Some(result.observation),
                ) {
                    self.log(Severity::Error, format!("mark failed: {e}"), Some(node_id.clone()));
                    break;
                }
                step += 1;
                self.after_mutation(&graph, &node_id, step);
                self.log(
                    Severity::Success,
                    format!("{} succeeded after {} attempt(s)", action.tool_name, result.attempts),
                    Some(node_id),
                );
                continue;
            }

            // ── Failure handling ───────────────────────────────────────
            let code = result
                .feedback
                .error_code
                .clone()
                .unwrap_or_else(|| "E_UNKNOWN".to_string());
            let reason = format!("{code}: {}", result.feedback.message);
            if let Err(e) = graph.mark(
                &node_id,
                NodeStatus::Failed,
                Some(reason.clone()),
                None,
                Some(result.observation),
            ) {
                self.log(Severity::Error, format!("mark failed: {e}"), Some(node_id.clone()));
                break;
            }
            step += 1;
            self.emit_subtree(&graph, &node_id, &mut step);
            self.log(
                Severity::Warning,
                format!(
                    "{} failed after {} attempt(s): {reason}",
                    action.tool_name, result.attempts
                ),
                Some(node_id.clone()),
            );
            let repeated = failures.record_failure(&action, &result.feedback);

            // A cancellation observed mid-dispatch still terminates the
            // attempt normally, but never spends a correction round.
            if self.handle.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            match action.on_failure {
                OnFailure::Abort => {
                    if graph.root_id() == Some(node_id.as_str()) {
                        break;
                    }
                }
                OnFailure::Skip => {}
                OnFailure::RetryOnly => {
                    forced_failure = Some(reason);
                    break;
                }
                OnFailure::ReEvaluate => {
                    if correction_rounds >= CORRECTION_BUDGET || repeated {
                        let diagnostic = if repeated {
                            format!(
                                "'{}' keeps failing with {code}; abandoning this branch",
                                action.tool_name
                            )
                        } else {
                            format!("correction budget ({CORRECTION_BUDGET}) exhausted")
                        };
                        self.log(Severity::Error, diagnostic, Some(node_id.clone()));
                        let children: Vec<String> = graph
                            .children(&node_id)
                            .iter()
                            .map(|c| c.node_id.clone())
                            .collect();
                        for child in children {
                            graph.prune(&child);
                        }
                        self.emit_subtree(&graph, &node_id, &mut step);
                        if graph.root_id() == Some(node_id.as_str()) {
                            break;
                        }
                        continue;
                    }

                    correction_rounds += 1;
                    let failed_node = graph.get(&node_id).cloned().expect("node exists");
                    match self
                        .services
                        .planner
                        .correct(
                            &self.goal,
                            latest_observation.as_ref(),
                            &failed_node,
                            &memory.join("\n"),
                        )
                        .await
                    {
                        Ok(nodes) => match graph.inject_correction(&node_id, nodes) {
                            Ok(ids) => {
                                corrected.push(node_id.clone());
                                for id in &ids {
                                    step += 1;
                                    self.after_mutation(&graph, id, step);
                                }
                                self.log(
                                    Severity::Info,
                                    format!("grafted {} correction step(s)", ids.len()),
                                    Some(node_id),
                                );
                            }
                            Err(e) => {
                                self.log(
                                    Severity::Error,
                                    format!("correction rejected: {e}"),
                                    Some(node_id),
                                );
                                forced_failure = Some(e.to_string());
                                break;
                            }
                        },
                        Err(e) => {
                            self.log(
                                Severity::Error,
                                format!("correction planning failed: {e}"),
                                Some(node_id),
                            );
                            forced_failure = Some(e.to_string());
                            break;
                        }
                    }
                }
            }
        }

        // ── FINALIZING ─────────────────────────────────────────────────
        let status = if cancelled {
            TaskStatus::Cancelled
        } else if forced_failure.is_some() {
            TaskStatus::Failed
        } else {
            final_outcome(&graph, &corrected)
        };
        self.finalize(&graph, status).await;
    }

    /// Fail the running node and every still-pending node with
    /// E_WALL_CLOCK; returns the diagnostic for the final log.
    fn wall_clock_exceeded(
        &self,
        graph: &mut DecisionGraph,
        step: &mut u64,
        running: Option<&str>,
    ) -> String {
        let message = format!("{}: wall-clock budget exhausted", codes::E_WALL_CLOCK);
        let mut to_fail: Vec<String> = Vec::new();
        if let Some(id) = running {
            to_fail.push(id.to_string());
        }
        to_fail.extend(graph.non_terminal_ids());
        for id in to_fail {
            let current = graph.get(&id).map(|n| n.status);
            if matches!(current, Some(NodeStatus::Running) | Some(NodeStatus::Pending)) {
                if graph
                    .mark(&id, NodeStatus::Failed, Some(message.clone()), None, None)
                    .is_ok()
                {
                    *step += 1;
                    self.after_mutation(graph, &id, *step);
                }
            }
        }
        self.log(Severity::Error, message.clone(), None);
        message
    }

    /// Commit the mutated graph to the shared snapshot, then publish the
    /// node update and (optionally) persist a visualization snapshot.
    /// Events are emitted only after the mutation is committed.
    fn after_mutation(&self, graph: &DecisionGraph, node_id: &str, step: u64) {
        let snapshot = graph.snapshot();
        self.handle.update_execution(|e| {
            e.nodes = snapshot.nodes.clone();
            e.root_node_id = snapshot.root_node_id.clone();
        });

        if let Some(node) = graph.node_snapshot(node_id) {
            self.services
                .bus
                .publish(&self.goal.task_id, BusEvent::NodeUpdate { node });
        }

        if let Some(dir) = &self.services.graphs_dir {
            let path = dir.join(format!(
                "{}_{}_{}.html",
                crate::paths::slug(&self.goal.task_id),
                step,
                crate::paths::slug(node_id)
            ));
            let html = render::to_html(
                &snapshot,
                &format!("{} - step {step}", self.goal.task_id),
            );
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            if let Err(e) = std::fs::write(&path, html) {
                tracing::warn!(task_id = %self.goal.task_id, "Failed to write graph snapshot: {e}");
            }
        }
    }

    /// Publish node updates for a node and all its descendants after a
    /// policy applied to the whole subtree.
    fn emit_subtree(&self, graph: &DecisionGraph, node_id: &str, step: &mut u64) {
        self.after_mutation(graph, node_id, *step);
        let mut stack: Vec<String> = graph
            .children(node_id)
            .iter()
            .map(|c| c.node_id.clone())
            .collect();
        while let Some(id) = stack.pop() {
            *step += 1;
            self.after_mutation(graph, &id, *step);
            stack.extend(graph.children(&id).iter().map(|c| c.node_id.clone()));
        }
    }

    async fn finalize(&self, graph: &DecisionGraph, status: TaskStatus) {
        let snapshot = graph.snapshot();
        self.handle.update_execution(|e| {
            e.nodes = snapshot.nodes.clone();
            e.root_node_id = snapshot.root_node_id.clone();
            e.status = status;
            e.finished_at = Some(chrono::Utc::now());
        });

        match status {
            TaskStatus::Completed => self.log(Severity::Success, "task completed", None),
            TaskStatus::Cancelled => self.log(Severity::Error, "task cancelled", None),
            _ => self.log(Severity::Error, "task failed", None),
        }
        self.emit_task_update();

        self.services.provider.release(&self.goal.task_id).await;
        tracing::info!(
            task_id = %self.goal.task_id,
            status = ?status,
            "Decision loop finished"
        );
    }

    fn emit_task_update(&self) {
        let task = self.handle.snapshot();
        self.services
            .bus
            .publish(&self.goal.task_id, BusEvent::TaskUpdate { task });
    }

    fn log(&self, severity: Severity, message: impl Into<String>, node_id: Option<String>) {
        let entry = self.handle.append_log(severity, message, node_id);
        tracing::debug!(task_id = %self.goal.task_id, "{}", entry.message);
        self.services
            .bus
            .publish(&self.goal.task_id, BusEvent::Log(entry));
    }
}

fn push_memory(memory: &mut Vec<String>, line: String) {
    memory.push(line);
    if memory.len() > MEMORY_CONTEXT_LINES {
        let excess = memory.len() - MEMORY_CONTEXT_LINES;
        memory.drain(..excess);
    }
}

/// Completed iff at least one node succeeded and every FAILED node was
/// recovered by a grafted correction; anything else is a failure.
fn final_outcome(graph: &DecisionGraph, corrected: &[String]) -> TaskStatus {
    let snapshot = graph.snapshot();
    let any_success = snapshot
        .nodes
        .values()
        .any(|n| n.status == NodeStatus::Success);
    let unrecovered_failure = snapshot
        .nodes
        .values()
        .any(|n| n.status == NodeStatus::Failed && !corrected.contains(&n.node_id));
    if any_success && !unrecovered_failure {
        TaskStatus::Completed
    } else {
        TaskStatus::Failed
    }
}
