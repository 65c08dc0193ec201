//! Task registry - process-local mapping of task ids to live executions.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::browser::SessionProvider;
use crate::dispatch::Dispatcher;
use crate::lm::LanguageModel;
use crate::model::{
    validate, LogEntry, Severity, TaskExecution, TaskGoal, TaskStatus, ValidationError,
};
use crate::paths;
use crate::planner::Planner;
use crate::tools::{register_all_tools, ToolRegistry};

use super::cancellation::CancelFlag;
use super::event_bus::EventBus;
use super::orchestrator::DecisionLoop;

/// Caller-tunable knobs for one task. Everything defaults.
#[derive(Debug, Clone, Default)]
pub struct TaskOptions {
    pub headless: Option<bool>,
    pub allowed_actions: Option<Vec<String>>,
    pub priority: Option<u8>,
    pub max_execution_time_seconds: Option<u64>,
    pub agent_persona: Option<String>,
    pub required_data: HashMap<String, String>,
}

/// Live state of one task. The decision loop is the single writer of
/// `execution`; other threads read snapshots. The log store is
/// append-only.
pub struct TaskHandle {
    execution: RwLock<TaskExecution>,
    pub cancel: CancelFlag,
    logs: RwLock<Vec<LogEntry>>,
    latest_screenshot: RwLock<Option<PathBuf>>,
    created_at: DateTime<Utc>,
    /// Creation order, the tie-breaker when timestamps collide.
    seq: u64,
}

impl TaskHandle {
    fn new(execution: TaskExecution, seq: u64) -> Self {
        Self {
            execution: RwLock::new(execution),
            cancel: CancelFlag::new(),
            logs: RwLock::new(Vec::new()),
            latest_screenshot: RwLock::new(None),
            created_at: Utc::now(),
            seq,
        }
    }

    pub fn snapshot(&self) -> TaskExecution {
        self.execution.read().clone()
    }

    /// Mutate the execution unless it already reached a terminal state
    /// (compare-and-set on status). Returns false if left untouched.
    pub(crate) fn update_execution(&self, mutate: impl FnOnce(&mut TaskExecution)) -> bool {
        let mut execution = self.execution.write();
        if execution.status.is_terminal() {
            return false;
        }
        mutate(&mut execution);
        true
    }

    /// Append one trace entry and return it for publication.
    pub(crate) fn append_log(
        &self,
        severity: Severity,
        message: impl Into<String>,
        node_id: Option<String>,
    ) -> LogEntry {
        let mut logs = self.logs.write();
        let mut entry = LogEntry::new(logs.len() as u64 + 1, severity, message);
        entry.node_id = node_id;
        logs.push(entry.clone());
        entry
    }

    pub fn logs(&self) -> Vec<LogEntry> {
        self.logs.read().clone()
    }

    pub(crate) fn set_latest_screenshot(&self, path: PathBuf) {
        *self.latest_screenshot.write() = Some(path);
    }

    pub fn latest_screenshot(&self) -> Option<PathBuf> {
        self.latest_screenshot.read().clone()
    }
}

/// Shared collaborators every decision loop needs.
pub struct LoopServices {
    pub planner: Planner,
    pub dispatcher: Dispatcher,
    pub provider: Arc<dyn SessionProvider>,
    pub bus: Arc<EventBus>,
    /// When set, one HTML graph snapshot is written here per transition.
    pub graphs_dir: Option<PathBuf>,
    pub screenshots_dir: PathBuf,
    pub notes_dir: PathBuf,
}

impl LoopServices {
    pub fn new(
        lm: Arc<dyn LanguageModel>,
        provider: Arc<dyn SessionProvider>,
        bus: Arc<EventBus>,
    ) -> Self {
        let mut registry = ToolRegistry::new();
        register_all_tools(&mut registry);
        Self {
            planner: Planner::new(lm),
            dispatcher: Dispatcher::new(Arc::new(registry)),
            provider,
            bus,
            graphs_dir: None,
            screenshots_dir: paths::screenshots_dir(),
            notes_dir: paths::notes_dir(),
        }
    }

    /// Persist a visualization snapshot after every graph transition.
    pub fn with_graph_snapshots(mut self, dir: PathBuf) -> Self {
        self.graphs_dir = Some(dir);
        self
    }

    /// Redirect artifact output, mainly for tests.
    pub fn with_artifact_dirs(mut self, screenshots: PathBuf, notes: PathBuf) -> Self {
        self.screenshots_dir = screenshots;
        self.notes_dir = notes;
        self
    }
}

/// Process-local registry of live executions. Nothing survives a
/// restart.
pub struct TaskRegistry {
    services: Arc<LoopServices>,
    tasks: DashMap<String, Arc<TaskHandle>>,
    default_headless: bool,
    creation_counter: AtomicU64,
}

impl TaskRegistry {
    pub fn new(services: Arc<LoopServices>) -> Self {
        Self {
            services,
            tasks: DashMap::new(),
            default_headless: true,
            creation_counter: AtomicU64::new(0),
        }
    }

    pub fn with_default_headless(mut self, headless: bool) -> Self {
        self.default_headless = headless;
        self
    }

    pub fn bus(&self) -> Arc<EventBus> {
        self.services.bus.clone()
    }

    /// Create a task and spawn its decision loop.
    pub fn create(
        &self,
        description: &str,
        options: TaskOptions,
    ) -> Result<TaskExecution, ValidationError> {
        let task_id = uuid::Uuid::new_v4().to_string();
        let headless = options.headless.unwrap_or(self.default_headless);

        let mut goal = TaskGoal::new(task_id.clone(), description);
        goal.environment = if headless { "headless" } else { "headed" }.to_string();
        if let Some(allowed) = options.allowed_actions {
            goal.allowed_actions = allowed;
        }
        if let Some(priority) = options.priority {
            goal.priority = priority;
        }
        if let Some(budget) = options.max_execution_time_seconds {
            goal.max_execution_time_seconds = budget;
        }
        if let Some(persona) = options.agent_persona {
            goal.agent_persona = persona;
        }
        goal.required_data = options.required_data;
        validate::goal(&goal)?;

        let seq = self.creation_counter.fetch_add(1, Ordering::SeqCst);
        let handle = Arc::new(TaskHandle::new(TaskExecution::new(goal.clone()), seq));
        self.tasks.insert(task_id.clone(), handle.clone());

        let loop_ = DecisionLoop::new(self.services.clone(), handle.clone(), goal, headless);
        tokio::spawn(async move {
            loop_.run().await;
        });

        tracing::info!(task_id = %task_id, "Task created");
        Ok(handle.snapshot())
    }

    pub fn get(&self, task_id: &str) -> Option<TaskExecution> {
        self.tasks.get(task_id).map(|h| h.snapshot())
    }

    pub fn handle(&self, task_id: &str) -> Option<Arc<TaskHandle>> {
        self.tasks.get(task_id).map(|h| h.clone())
    }

    /// All executions, most recently started first.
    pub fn list(&self) -> Vec<TaskExecution> {
        let mut handles: Vec<Arc<TaskHandle>> =
            self.tasks.iter().map(|e| e.value().clone()).collect();
        handles.sort_by(|a, b| (b.created_at, b.seq).cmp(&(a.created_at, a.seq)));
        handles.iter().map(|h| h.snapshot()).collect()
    }

    /// Set the cooperative cancellation flag. Returns false for unknown
    /// or already-terminal tasks.
    pub fn stop(&self, task_id: &str) -> bool {
        match self.tasks.get(task_id) {
            Some(handle) => {
                if handle.snapshot().status.is_terminal() {
                    return false;
                }
                handle.cancel.cancel();
                tracing::info!(task_id = %task_id, "Cancellation requested");
                true
            }
            None => false,
        }
    }

    pub fn logs(&self, task_id: &str) -> Vec<LogEntry> {
        self.tasks
            .get(task_id)
            .map(|h| h.logs())
            .unwrap_or_default()
    }

    pub fn latest_screenshot(&self, task_id: &str) -> Option<PathBuf> {
        self.tasks.get(task_id).and_then(|h| h.latest_screenshot())
    }

    /// DevTools URL plus a coarse readiness tag for the UI.
    pub fn cdp_status(&self, task_id: &str) -> Option<(Option<String>, TaskStatus)> {
        let status = self.get(task_id)?.status;
        Some((self.services.provider.cdp_url(task_id), status))
    }
}
