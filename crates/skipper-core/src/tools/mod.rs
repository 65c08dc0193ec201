//! Tool layer: the registry, the tool contract, and the built-in set.

pub mod implementations;
pub mod registry;

pub use implementations::register_all_tools;
pub use registry::{parse_params, Tool, ToolContext, ToolOutcome, ToolRegistry};
