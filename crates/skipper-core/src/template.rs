//! `${node_id.field}` reference templates.
//!
//! Preconditions and tool arguments may embed references to prior nodes'
//! resolved outputs. Resolution is string substitution against the map of
//! SUCCESS outputs; the only supported field today is `output`.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

static TEMPLATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z0-9_\-]+)\.([A-Za-z0-9_]+)\}").expect("template regex"));

/// One parsed `${node_id.field}` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRef {
    pub node_id: String,
    pub field: String,
}

/// Extract every reference embedded in `text`, in order of appearance.
pub fn references(text: &str) -> Vec<TemplateRef> {
    TEMPLATE_RE
        .captures_iter(text)
        .map(|c| TemplateRef {
            node_id: c[1].to_string(),
            field: c[2].to_string(),
        })
        .collect()
}

/// True when every reference in `text` can be resolved against `outputs`.
pub fn resolvable(text: &str, outputs: &HashMap<String, String>) -> bool {
    references(text)
        .iter()
        .all(|r| outputs.contains_key(&r.node_id))
}

/// Substitute every reference in `text`, or return the first reference
/// that does not resolve (as the offending `${...}` path).
pub fn resolve(text: &str, outputs: &HashMap<String, String>) -> Result<String, String> {
    for r in references(text) {
        if !outputs.contains_key(&r.node_id) {
            return Err(format!("${{{}.{}}}", r.node_id, r.field));
        }
    }
    let resolved = TEMPLATE_RE.replace_all(text, |caps: &regex::Captures<'_>| {
        outputs.get(&caps[1]).cloned().unwrap_or_default()
    });
    Ok(resolved.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outputs() -> HashMap<String, String> {
        HashMap::from([("n1".to_string(), "https://example.com/".to_string())])
    }

    #[test]
    fn extracts_references_in_order() {
        let refs = references("go to ${n1.output} then ${n2.output}");
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].node_id, "n1");
        assert_eq!(refs[1].node_id, "n2");
    }

    #[test]
    fn resolves_against_known_outputs() {
        let out = resolve("visit ${n1.output} now", &outputs()).unwrap();
        assert_eq!(out, "visit https://example.com/ now");
    }

    #[test]
    fn reports_the_unresolved_path() {
        let err = resolve("${missing.output}", &outputs()).unwrap_err();
        assert_eq!(err, "${missing.output}");
        assert!(!resolvable("${missing.output}", &outputs()));
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(resolve("no refs", &outputs()).unwrap(), "no refs");
        assert!(resolvable("no refs", &HashMap::new()));
    }
}
