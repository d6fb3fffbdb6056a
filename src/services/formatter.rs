use crate::constants::limits::TABLE_ROW_LIMIT;
use crate::errors::ToolError;
use crate::utils::text::table_cell;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl OutputFormat {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_lowercase()) {
            Some(s) if s == "json" => OutputFormat::Json,
            _ => OutputFormat::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Section {
    Bullets { heading: String, items: Vec<String> },
    KeyValues { heading: String, pairs: Vec<(String, String)> },
    Table { heading: String, columns: Vec<String>, rows: Vec<Vec<String>> },
    Notice(String),
    Paragraph(String),
}

/// Presentation of a tool result for the text format.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Report {
    pub title: String,
    pub summary: Option<String>,
    pub sections: Vec<Section>,
}

impl Report {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            summary: None,
            sections: Vec::new(),
        }
    }

    pub fn summary(mut self, text: impl Into<String>) -> Self {
        self.summary = Some(text.into());
        self
    }

    pub fn bullets(mut self, heading: impl Into<String>, items: Vec<String>) -> Self {
        self.sections.push(Section::Bullets {
            heading: heading.into(),
            items,
        });
        self
    }

    pub fn key_values(mut self, heading: impl Into<String>, pairs: Vec<(String, String)>) -> Self {
        self.sections.push(Section::KeyValues {
            heading: heading.into(),
            pairs,
        });
        self
    }

    pub fn table(mut self, heading: impl Into<String>, columns: &[&str], rows: Vec<Vec<String>>) -> Self {
        self.sections.push(Section::Table {
            heading: heading.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        });
        self
    }

    pub fn notice(mut self, text: impl Into<String>) -> Self {
        self.sections.push(Section::Notice(text.into()));
        self
    }

    pub fn paragraph(mut self, text: impl Into<String>) -> Self {
        self.sections.push(Section::Paragraph(text.into()));
        self
    }
}

/// Successful tool result: structured data plus its text presentation.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub data: Value,
    pub report: Report,
}

impl ToolOutput {
    pub fn new(data: Value, report: Report) -> Self {
        Self { data, report }
    }
}

pub fn render(output: &ToolOutput, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => render_json(&output.data),
        OutputFormat::Text => render_text(&output.report),
    }
}

pub fn render_json(data: &Value) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string())
}

pub fn render_text(report: &Report) -> String {
    let mut lines = vec![format!("# {}", report.title)];
    if let Some(summary) = &report.summary {
        lines.push(String::new());
        lines.push(summary.clone());
    }
    for section in &report.sections {
        lines.push(String::new());
        match section {
            Section::Bullets { heading, items } => {
                lines.push(format!("## {}", heading));
                if items.is_empty() {
                    lines.push("_none_".to_string());
                }
                lines.extend(items.iter().map(|item| format!("- {}", item)));
            }
            Section::KeyValues { heading, pairs } => {
                lines.push(format!("## {}", heading));
                lines.extend(pairs.iter().map(|(k, v)| format!("- **{}**: {}", k, v)));
            }
            Section::Table {
                heading,
                columns,
                rows,
            } => {
                lines.push(format!("## {}", heading));
                if rows.is_empty() {
                    lines.push("_none_".to_string());
                    continue;
                }
                lines.push(format!("| {} |", columns.join(" | ")));
                lines.push(format!("|{}|", vec!["---"; columns.len()].join("|")));
                for row in rows.iter().take(TABLE_ROW_LIMIT) {
                    let cells: Vec<String> = row.iter().map(|c| table_cell(c)).collect();
                    lines.push(format!("| {} |", cells.join(" | ")));
                }
                if rows.len() > TABLE_ROW_LIMIT {
                    lines.push(format!(
                        "_{} more rows omitted; use format \"json\" for the full list._",
                        rows.len() - TABLE_ROW_LIMIT
                    ));
                }
            }
            Section::Notice(text) => lines.push(format!("> **Note:** {}", text)),
            Section::Paragraph(text) => lines.push(text.clone()),
        }
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Error text: what failed, why, and what to do next.
pub fn render_error(tool: &str, error: &ToolError, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => render_json(&serde_json::json!({
            "error": {
                "tool": tool,
                "kind": error.kind.as_str(),
                "code": error.code,
                "message": error.message,
                "why": error.kind.explanation(),
                "hint": error.hint_or_default(),
                "retryable": error.retryable,
                "details": error.details,
            }
        })),
        OutputFormat::Text => {
            let mut lines = vec![
                format!("# Error: {} failed", tool),
                String::new(),
                format!("**What failed:** {}", error.message),
                format!("**Why:** {}", error.kind.explanation()),
                format!("**Next step:** {}", error.hint_or_default()),
            ];
            if let Some(fields) = error
                .details
                .as_ref()
                .and_then(|d| d.get("fields"))
                .and_then(|f| f.as_array())
            {
                lines.push(String::new());
                lines.push("## Invalid fields".to_string());
                for field in fields {
                    let name = field.get("field").and_then(|v| v.as_str()).unwrap_or("?");
                    let message = field.get("message").and_then(|v| v.as_str()).unwrap_or("");
                    lines.push(format!("- `{}`: {}", name, message));
                }
            }
            let mut out = lines.join("\n");
            out.push('\n');
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_report_renders_markdown_sections() {
        let report = Report::new("Groups")
            .summary("2 groups")
            .table(
                "Groups",
                &["Group", "Name"],
                vec![
                    vec!["grp_1".into(), "Root".into()],
                    vec!["grp_2".into(), "A|B".into()],
                ],
            )
            .notice("cached");
        let text = render_text(&report);
        assert_eq!(
            text,
            "# Groups\n\n2 groups\n\n## Groups\n| Group | Name |\n|---|---|\n| grp_1 | Root |\n| grp_2 | A\\|B |\n\n> **Note:** cached\n"
        );
    }

    #[test]
    fn key_values_and_empty_bullets() {
        let report = Report::new("Property")
            .key_values("Details", vec![("Name".into(), "site".into())])
            .bullets("Hostnames", vec![]);
        let text = render_text(&report);
        assert!(text.contains("- **Name**: site"));
        assert!(text.contains("## Hostnames\n_none_"));
    }

    #[test]
    fn json_format_renders_data() {
        let output = ToolOutput::new(json!({"propertyId": "prp_1"}), Report::new("x"));
        let rendered = render(&output, OutputFormat::Json);
        let parsed: Value = serde_json::from_str(&rendered).expect("json");
        assert_eq!(parsed["propertyId"], "prp_1");
    }

    #[test]
    fn error_text_has_what_why_next() {
        let err = ToolError::not_found("Property prp_1 not found");
        let text = render_error("property_get", &err, OutputFormat::Text);
        assert!(text.contains("**What failed:** Property prp_1 not found"));
        assert!(text.contains("**Why:**"));
        assert!(text.contains("**Next step:** Use group_list"));
    }

    #[test]
    fn error_json_has_kind() {
        let err = ToolError::rate_limited("slow down");
        let parsed: Value =
            serde_json::from_str(&render_error("purge_urls", &err, OutputFormat::Json)).expect("json");
        assert_eq!(parsed["error"]["kind"], "rate_limit");
        assert_eq!(parsed["error"]["retryable"], true);
    }

    #[test]
    fn format_parse_defaults_to_text() {
        assert_eq!(OutputFormat::parse(Some("JSON")), OutputFormat::Json);
        assert_eq!(OutputFormat::parse(None), OutputFormat::Text);
    }
}
