//! Graph visualization - renderable text form of a snapshot.
//!
//! Pure functions over `GraphSnapshot`: a Mermaid flowchart (node label =
//! tool name, class = status) and a self-contained HTML page the loop can
//! persist after each transition.

use crate::model::NodeStatus;

use super::GraphSnapshot;

fn status_class(status: NodeStatus) -> &'static str {
    match status {
        NodeStatus::Pending => "pending",
        NodeStatus::Running => "running",
        NodeStatus::Success => "success",
        NodeStatus::Failed => "failed",
        NodeStatus::Pruned => "pruned",
        NodeStatus::Skipped => "skipped",
    }
}

fn sanitize_id(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn escape_label(label: &str) -> String {
    label.replace('"', "#quot;")
}

/// Render a snapshot as a Mermaid `graph TD` diagram.
pub fn to_mermaid(snapshot: &GraphSnapshot) -> String {
    let mut out = String::from("graph TD\n");

    // Deterministic output: BTreeMap iteration is ordered by node id.
    for (id, node) in &snapshot.nodes {
        let nid = sanitize_id(id);
        out.push_str(&format!(
            "    {}[\"{}<br/>{}\"]:::{}\n",
            nid,
            escape_label(id),
            escape_label(&node.action.tool_name),
            status_class(node.status),
        ));
    }
    for (id, node) in &snapshot.nodes {
        for child in &node.child_ids {
            out.push_str(&format!(
                "    {} --> {}\n",
                sanitize_id(id),
                sanitize_id(child)
            ));
        }
    }

    out.push_str("    classDef pending fill:#f4f4f4,stroke:#7c7c7c\n");
    out.push_str("    classDef running fill:#fff3bf,stroke:#f59f00\n");
    out.push_str("    classDef success fill:#d3f9d8,stroke:#2b8a3e\n");
    out.push_str("    classDef failed fill:#ffe3e3,stroke:#c92a2a\n");
    out.push_str("    classDef pruned fill:#e9ecef,stroke:#adb5bd,stroke-dasharray: 4 4\n");
    out.push_str("    classDef skipped fill:#e7f5ff,stroke:#74c0fc,stroke-dasharray: 4 4\n");
    out
}

/// Render a snapshot as a standalone HTML page around the Mermaid text.
pub fn to_html(snapshot: &GraphSnapshot, title: &str) -> String {
    let mermaid = to_mermaid(snapshot);
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n\
         <script src=\"https://cdn.jsdelivr.net/npm/mermaid@10/dist/mermaid.min.js\"></script>\n\
         </head>\n<body>\n<h3>{title}</h3>\n<pre class=\"mermaid\">\n{mermaid}</pre>\n\
         <script>mermaid.initialize({{ startOnLoad: true }});</script>\n</body>\n</html>\n"
    )
}
