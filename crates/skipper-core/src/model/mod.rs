//! Decision models
//!
//! Declarative shapes for goals, observations, actions and nodes, plus
//! validation rules and JSON-schema export. These are plain values with
//! structural equality; nothing in here performs I/O.

pub mod action;
pub mod execution;
pub mod goal;
pub mod log;
pub mod node;
pub mod observation;
pub mod schema;
pub mod validate;

pub use action::{DecisionAction, OnFailure, MAX_ATTEMPTS_CEILING};
pub use execution::{TaskExecution, TaskStatus};
pub use goal::{TaskGoal, DEFAULT_ALLOWED_ACTIONS, DEFAULT_STEP_BUDGET_SECS};
pub use log::{LogEntry, Severity};
pub use node::{ExecutionNode, NodeStatus};
pub use observation::{
    ActionFeedback, BoundingBox, BrowserHealth, FeedbackStatus, KeyElement, WebObservation,
};
pub use validate::ValidationError;
