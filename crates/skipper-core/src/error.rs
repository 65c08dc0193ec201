//! Error types and the wire-level error codes shared across the core.

use thiserror::Error;

/// Error codes carried in `ActionFeedback.error_code` and log messages.
///
/// Transient codes are retried by the dispatcher with backoff; permanent
/// codes fail the attempt immediately.
pub mod codes {
    /// Network-level failure reported by the browser collaborator.
    pub const E_NET: &str = "E_NET";
    /// The DOM changed under the tool (element went stale).
    pub const E_STALE_DOM: &str = "E_STALE_DOM";
    /// The action's execution timeout ceiling was hit.
    pub const E_TIMEOUT: &str = "E_TIMEOUT";
    /// An argument template referenced a node without a resolved output.
    pub const E_UNRESOLVED_REF: &str = "E_UNRESOLVED_REF";
    /// Tool arguments failed shape validation.
    pub const E_BAD_ARG: &str = "E_BAD_ARG";
    /// The action named a tool not present in the registry.
    pub const E_TOOL_UNKNOWN: &str = "E_TOOL_UNKNOWN";
    /// The per-task wall-clock budget was exhausted.
    pub const E_WALL_CLOCK: &str = "E_WALL_CLOCK";

    /// Codes the dispatcher retries with exponential backoff.
    pub const TRANSIENT: &[&str] = &[E_NET, E_STALE_DOM, E_TIMEOUT];

    pub fn is_transient(code: &str) -> bool {
        TRANSIENT.contains(&code)
    }
}

/// Structural errors raised by the decision graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("parent node '{0}' does not exist")]
    ParentMissing(String),

    #[error("graph already has a root node '{0}'")]
    RootExists(String),

    #[error("node '{0}' does not exist")]
    UnknownNode(String),

    #[error("node '{0}' already exists")]
    DuplicateNode(String),

    #[error("illegal status transition for node '{node}': {from} -> {to}")]
    IllegalTransition {
        node: String,
        from: String,
        to: String,
    },

    #[error("correction anchor '{0}' must be FAILED or SUCCESS")]
    BadAnchor(String),
}

/// Planner failures surfaced to the decision loop.
#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("plan failed validation at {path}: {reason}")]
    Validation { path: String, reason: String },

    #[error("model response is not an execution plan: {0}")]
    MalformedResponse(String),

    #[error("language model call failed: {0}")]
    Lm(#[from] LmError),
}

/// Failures of the language-model capability.
#[derive(Debug, Error)]
pub enum LmError {
    #[error("model call timed out after {0}s")]
    Timeout(u64),

    #[error("model transport error: {0}")]
    Transport(String),

    #[error("model returned non-JSON output: {0}")]
    BadOutput(String),
}
