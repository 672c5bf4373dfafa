//! CSV output format for comparison tables
//!
//! One block per metric, separated by a blank line, with raw means so the
//! numbers can be charted directly.

use crate::regression::ComparisonTable;

/// CSV output formatter
#[derive(Debug, Default)]
pub struct CsvOutput {
    tables: Vec<ComparisonTable>,
}

impl CsvOutput {
    /// Create a new CSV output formatter
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, table: ComparisonTable) {
        self.tables.push(table);
    }

    /// Escape CSV field (handle commas, quotes, newlines)
    fn escape_field(field: &str) -> String {
        if field.contains(',') || field.contains('"') || field.contains('\n') {
            format!("\"{}\"", field.replace('"', "\"\""))
        } else {
            field.to_string()
        }
    }

    fn header(metric: &str) -> String {
        let old = format!("old {}", metric);
        let new = format!("new {}", metric);
        [
            "package",
            "name",
            old.as_str(),
            "±",
            new.as_str(),
            "±",
            "delta",
            "note",
        ]
        .iter()
        .map(|h| Self::escape_field(h))
        .collect::<Vec<_>>()
        .join(",")
    }

    /// Generate CSV output as string
    pub fn to_csv(&self) -> String {
        let mut blocks = Vec::new();
        for table in &self.tables {
            let mut output = Self::header(&table.metric);
            output.push('\n');
            for row in &table.rows {
                let fields = [
                    Self::escape_field(&row.package),
                    Self::escape_field(&row.benchmark),
                    row.old.mean.to_string(),
                    format!("{:.0}%", row.old.range_pct()),
                    row.new.mean.to_string(),
                    format!("{:.0}%", row.new.range_pct()),
                    Self::escape_field(&row.delta),
                    Self::escape_field(&row.note),
                ];
                output.push_str(&fields.join(","));
                output.push('\n');
            }
            blocks.push(output);
        }
        blocks.join("\n")
    }
}
