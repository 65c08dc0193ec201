//! Built-in tool implementations over the browser collaborator.

pub mod extract;
pub mod interact;
pub mod navigation;
pub mod notepad;
pub mod screenshot;
pub mod scroll;
pub mod waiting;

use std::sync::Arc;

use super::registry::ToolRegistry;

/// Register the full built-in tool set.
pub fn register_all_tools(registry: &mut ToolRegistry) {
    registry.register(Arc::new(navigation::NavigateTool));
    registry.register(Arc::new(interact::ClickElementTool));
    registry.register(Arc::new(interact::ClickNthTool));
    registry.register(Arc::new(interact::TypeTextTool));
    registry.register(Arc::new(scroll::ScrollTool));
    registry.register(Arc::new(waiting::WaitTool));
    registry.register(Arc::new(waiting::WaitForTool));
    registry.register(Arc::new(extract::ExtractDataTool));
    registry.register(Arc::new(extract::GetAttributeTool));
    registry.register(Arc::new(extract::FindLinkTool));
    registry.register(Arc::new(screenshot::TakeScreenshotTool));
    registry.register(Arc::new(notepad::OpenNotepadTool));
}
