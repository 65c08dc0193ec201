//! Agent system for Skipper
//!
//! ## Decision loop
//! - `DecisionLoop` - one per task: plan, schedule, dispatch, observe,
//!   prune or correct, finalize
//! - `BusEvent` - event protocol between the loop and its observers
//! - `LoopServices` - planner/dispatcher/browser/bus collaborators
//!
//! ## Infrastructure
//! - `TaskRegistry` / `TaskHandle` - process-local live executions
//! - `EventBus` / `Subscription` - per-task fan-out with bounded queues
//! - `CancelFlag` - cooperative cancellation
//! - `FailureTracker` - repeated-failure fingerprinting

pub mod cancellation;
pub mod event_bus;
pub mod failure;
pub mod loop_events;
pub mod orchestrator;
pub mod registry;

pub use cancellation::CancelFlag;
pub use event_bus::{EventBus, Subscription, SUBSCRIBER_QUEUE_CAP};
pub use failure::{FailureTracker, REPEATED_FAILURE_THRESHOLD};
pub use loop_events::BusEvent;
pub use orchestrator::{DecisionLoop, CORRECTION_BUDGET};
pub use registry::{LoopServices, TaskHandle, TaskOptions, TaskRegistry};
