use crate::errors::ToolError;
use crate::utils::suggest::suggest;

/// Error for a tool name or handler action that is not wired, with "did you
/// mean" candidates drawn from `known`.
pub fn unknown_tool_error(kind: &str, requested: &str, known: &[&str]) -> ToolError {
    let known: Vec<String> = known.iter().map(|s| s.to_string()).collect();
    let suggestions = suggest(requested, &known, 5);
    let hint = if suggestions.is_empty() {
        format!("Call tools/list to see the available {}s.", kind)
    } else {
        format!("Did you mean: {}?", suggestions.join(", "))
    };
    ToolError::validation(format!("Unknown {}: {}", kind, requested))
        .with_hint(hint)
        .with_details(serde_json::json!({ "did_you_mean": suggestions }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn includes_suggestions_in_hint() {
        let err = unknown_tool_error("tool", "purge_url", &["purge_urls", "purge_tags"]);
        assert!(err.message.contains("purge_url"));
        assert!(err.hint.unwrap_or_default().contains("purge_urls"));
    }
}
