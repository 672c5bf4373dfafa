//! Aligned text tables, one per metric
//!
//! Rows keep the order the engine produced; a `pkg:` line is emitted each
//! time the package differs from the previous row's.
//!
//! ```text
//! name       old time/op    new time/op    delta
//! pkg: github.com/org/repo/pkg/kv
//! Get-8      100ns ± 2%      50ns ± 2%     -50.00%  (p=0.000 n=10+10)
//! ```

use crate::regression::{format_value, ComparisonTable, Summary};

/// Text output formatter
#[derive(Debug, Default)]
pub struct TextOutput {
    tables: Vec<ComparisonTable>,
}

impl TextOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, table: ComparisonTable) {
        self.tables.push(table);
    }

    pub fn to_text(&self) -> String {
        let blocks: Vec<String> = self.tables.iter().map(format_table).collect();
        blocks.join("\n")
    }
}

fn cell(metric: &str, summary: &Summary) -> String {
    let value = format_value(metric, summary.mean);
    if summary.n < 2 {
        return value;
    }
    format!("{} ± {:.0}%", value, summary.range_pct())
}

fn format_table(table: &ComparisonTable) -> String {
    let metric = table.metric.as_str();
    let header = [
        "name".to_string(),
        format!("old {}", metric),
        format!("new {}", metric),
        "delta".to_string(),
    ];
    let cells: Vec<[String; 4]> = table
        .rows
        .iter()
        .map(|r| {
            [
                r.benchmark.clone(),
                cell(metric, &r.old),
                cell(metric, &r.new),
                r.delta.clone(),
            ]
        })
        .collect();

    let mut widths = header.clone().map(|h| h.chars().count());
    for row in &cells {
        for (w, c) in widths.iter_mut().zip(row) {
            *w = (*w).max(c.chars().count());
        }
    }

    let mut out = String::new();
    out.push_str(&format!(
        "{:<w0$}  {:>w1$}  {:>w2$}  {}\n",
        header[0],
        header[1],
        header[2],
        header[3],
        w0 = widths[0],
        w1 = widths[1],
        w2 = widths[2],
    ));

    let mut package: Option<&str> = None;
    for (row, c) in table.rows.iter().zip(&cells) {
        if package != Some(row.package.as_str()) {
            package = Some(row.package.as_str());
            if !row.package.is_empty() {
                out.push_str(&format!("pkg: {}\n", row.package));
            }
        }
        out.push_str(&format!(
            "{:<w0$}  {:>w1$}  {:>w2$}  {:<w3$}  {}\n",
            c[0],
            c[1],
            c[2],
            c[3],
            row.note,
            w0 = widths[0],
            w1 = widths[1],
            w2 = widths[2],
            w3 = widths[3],
        ));
    }
    out
}
