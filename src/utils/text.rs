/// Cuts `value` to at most `max_chars` characters, marking the cut with `…`.
pub fn truncate_chars(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    if max_chars == 0 {
        return String::new();
    }
    let mut out: String = value.chars().take(max_chars - 1).collect();
    out.push('…');
    out
}

/// Makes a value safe to place in a markdown pipe-table cell.
pub fn table_cell(value: &str) -> String {
    let flattened = value.replace(['\r', '\n'], " ").replace('|', "\\|");
    truncate_chars(flattened.trim(), 120)
}

/// Short display form of a JSON scalar; objects and arrays are summarised.
pub fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "-".to_string(),
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Array(items) => {
            let scalars: Vec<String> = items
                .iter()
                .filter(|item| !item.is_object() && !item.is_array())
                .map(display_value)
                .collect();
            if scalars.len() == items.len() {
                truncate_chars(&scalars.join(", "), 200)
            } else {
                format!("[{} items]", items.len())
            }
        }
        serde_json::Value::Object(map) => format!("{{{} fields}}", map.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 5), "héll…");
        assert_eq!(truncate_chars("short", 10), "short");
    }

    #[test]
    fn table_cells_escape_pipes_and_newlines() {
        assert_eq!(table_cell("a|b\nc"), "a\\|b c");
    }

    #[test]
    fn display_value_summarises_nested_values() {
        assert_eq!(display_value(&json!(["a", "b"])), "a, b");
        assert_eq!(display_value(&json!([{"x": 1}])), "[1 items]");
        assert_eq!(display_value(&json!(null)), "-");
    }
}
