//! Output formatting for CLI

use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
    Table,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "table" => OutputFormat::Table,
            _ => OutputFormat::Text,
        }
    }
}

/// JSON rendering for machine-readable output
pub fn to_json<T: Serialize>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
}

/// Render rows as JSON or a table; `None` means the caller prints text itself
pub fn format_rows<T: Serialize + Tabled>(rows: &[T], format: OutputFormat) -> Option<String> {
    match format {
        OutputFormat::Json => Some(to_json(&rows)),
        OutputFormat::Table => Some(Table::new(rows).to_string()),
        OutputFormat::Text => None,
    }
}

/// Milliseconds as `h:mm:ss` (or `m:ss` under an hour)
pub fn format_offset(ms: u64) -> String {
    let total = ms / 1000;
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

/// One selectable quality
#[derive(Debug, Serialize, Tabled)]
pub struct QualityRow {
    pub id: u32,
    pub label: String,
    pub entitled: bool,
    pub cached: bool,
    pub access: String,
}

/// One remembered position
#[derive(Debug, Serialize, Tabled)]
pub struct PositionRow {
    pub video_id: String,
    pub position: String,
    pub offset_ms: u64,
    pub updated_at: String,
}
