//! JSON output format for comparison reports

use crate::regression::ComparisonTable;
use serde::Serialize;

/// Complete comparison report
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutput {
    /// Resolved old ref
    pub old: String,
    /// Resolved new ref
    pub new: String,
    /// Regression threshold as a fraction, if one was set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    pub tables: Vec<ComparisonTable>,
}

impl JsonOutput {
    pub fn new(old: &str, new: &str, threshold: Option<f64>) -> Self {
        Self {
            old: old.to_string(),
            new: new.to_string(),
            threshold,
            tables: Vec::new(),
        }
    }

    pub fn add_table(&mut self, table: ComparisonTable) {
        self.tables.push(table);
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
