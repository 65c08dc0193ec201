//! Centralized path utilities
//!
//! All artifact paths and filename slugging in one place for consistency.

use std::path::PathBuf;

use chrono::Utc;

const CONFIG_DIR_NAME: &str = ".skipper";
const SLUG_MAX_LEN: usize = 64;

/// Get the skipper config directory (~/.skipper)
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

/// Get the graph-snapshot directory (~/.skipper/logs/graphs)
pub fn graphs_dir() -> PathBuf {
    config_dir().join("logs").join("graphs")
}

/// Get the text-notes directory (~/.skipper/temp/notes)
pub fn notes_dir() -> PathBuf {
    config_dir().join("temp").join("notes")
}

/// Get the screenshots directory (~/.skipper/temp/screenshots)
pub fn screenshots_dir() -> PathBuf {
    config_dir().join("temp").join("screenshots")
}

/// Filesystem-safe derivative of a human string: characters outside
/// `[A-Za-z0-9_-]` become `_`, runs of `_` collapse, truncated at 64.
pub fn slug(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_underscore = false;
    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' {
            out.push(ch);
            last_was_underscore = false;
        } else if !last_was_underscore && !out.is_empty() {
            out.push('_');
            last_was_underscore = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out.chars().take(SLUG_MAX_LEN).collect()
}

fn timestamp() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Path for a text note derived from the task description.
pub fn note_path(description: &str) -> PathBuf {
    notes_dir().join(format!("{}_{}.txt", slug(description), timestamp()))
}

/// Path for a screenshot derived from the task description/topic.
pub fn screenshot_path(topic: &str) -> PathBuf {
    screenshots_dir().join(format!("{}_{}.png", slug(topic), timestamp()))
}

/// Path for one graph visualization snapshot.
pub fn graph_snapshot_path(task_id: &str, step: u64, node_id: &str) -> PathBuf {
    graphs_dir().join(format!("{}_{}_{}.html", slug(task_id), step, slug(node_id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_strips_and_collapses() {
        assert_eq!(slug("navigate to https://example.com!"), "navigate_to_https_example_com");
        assert_eq!(slug("a   b___c"), "a_b_c");
        assert_eq!(slug("keep-dash_and_word9"), "keep-dash_and_word9");
    }

    #[test]
    fn slug_truncates_at_64() {
        let long = "x".repeat(200);
        assert_eq!(slug(&long).len(), 64);
    }

    #[test]
    fn slug_drops_leading_and_trailing_runs() {
        assert_eq!(slug("  hello  "), "hello");
        assert_eq!(slug("!!!"), "");
    }

    #[test]
    fn artifact_paths_carry_extensions() {
        assert!(note_path("my task").to_string_lossy().ends_with(".txt"));
        assert!(screenshot_path("my task").to_string_lossy().ends_with(".png"));
        assert!(graph_snapshot_path("t", 3, "n1")
            .to_string_lossy()
            .ends_with("_3_n1.html"));
    }
}
