//! HTML output format for comparison reports
//!
//! A standalone page with embedded CSS: one table per metric, regressions
//! and improvements highlighted.

use crate::regression::{format_value, Change, ComparisonTable, Row, Summary};

/// HTML output formatter
#[derive(Debug)]
pub struct HtmlOutput {
    title: String,
    tables: Vec<ComparisonTable>,
}

impl HtmlOutput {
    /// `old`/`new` are the refs shown in the page title
    pub fn new(old: &str, new: &str) -> Self {
        Self {
            title: format!("benchdiff: {} → {}", old, new),
            tables: Vec::new(),
        }
    }

    pub fn add_table(&mut self, table: ComparisonTable) {
        self.tables.push(table);
    }

    /// Escape HTML special characters to prevent XSS
    fn escape_html(text: &str) -> String {
        text.replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
            .replace('"', "&quot;")
            .replace('\'', "&#39;")
    }

    fn generate_styles() -> &'static str {
        r#"
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            margin: 20px;
            background-color: #f5f5f5;
        }
        h1, h2 {
            color: #333;
        }
        table {
            border-collapse: collapse;
            background-color: white;
            box-shadow: 0 1px 3px rgba(0,0,0,0.1);
            margin-bottom: 20px;
        }
        th, td {
            border: 1px solid #ddd;
            padding: 6px 10px;
        }
        th {
            background-color: #4a90d9;
            color: white;
        }
        td.num {
            font-family: monospace;
            text-align: right;
        }
        td.pkg {
            background-color: #eef3fa;
            font-family: monospace;
            font-weight: bold;
        }
        tr.better td.delta {
            color: #2a7a2a;
            font-weight: bold;
        }
        tr.worse td.delta {
            color: #cc0000;
            font-weight: bold;
        }
        .note {
            font-size: 0.85em;
            color: #888;
        }
        "#
    }

    fn cell(metric: &str, summary: &Summary) -> String {
        let value = format_value(metric, summary.mean);
        if summary.n < 2 {
            return value;
        }
        format!("{} ± {:.0}%", value, summary.range_pct())
    }

    fn format_row(metric: &str, row: &Row) -> String {
        let class = match row.change {
            Change::Better => "better",
            Change::Worse => "worse",
            Change::Unchanged => "unchanged",
        };
        format!(
            r#"<tr class="{}"><td>{}</td><td class="num">{}</td><td class="num">{}</td><td class="num delta">{}</td><td class="note">{}</td></tr>"#,
            class,
            Self::escape_html(&row.benchmark),
            Self::escape_html(&Self::cell(metric, &row.old)),
            Self::escape_html(&Self::cell(metric, &row.new)),
            Self::escape_html(&row.delta),
            Self::escape_html(&row.note),
        )
    }

    fn render_table(table: &ComparisonTable) -> String {
        let metric = Self::escape_html(&table.metric);
        let mut html = String::new();
        html.push_str(&format!("    <h2>{}</h2>\n", metric));
        html.push_str("    <table>\n");
        html.push_str(&format!(
            "        <tr><th>name</th><th>old {0}</th><th>new {0}</th><th>delta</th><th></th></tr>\n",
            metric
        ));

        let mut package: Option<&str> = None;
        for row in &table.rows {
            if !row.package.is_empty() && package != Some(row.package.as_str()) {
                html.push_str(&format!(
                    "        <tr><td class=\"pkg\" colspan=\"5\">pkg: {}</td></tr>\n",
                    Self::escape_html(&row.package)
                ));
                package = Some(row.package.as_str());
            }
            html.push_str("        ");
            html.push_str(&Self::format_row(&table.metric, row));
            html.push('\n');
        }

        html.push_str("    </table>\n");
        html
    }

    /// Generate complete HTML document
    pub fn to_html(&self) -> String {
        let title = Self::escape_html(&self.title);
        let mut html = String::new();

        html.push_str("<!DOCTYPE html>\n");
        html.push_str("<html lang=\"en\">\n");

        html.push_str("<head>\n");
        html.push_str("    <meta charset=\"UTF-8\">\n");
        html.push_str(&format!("    <title>{}</title>\n", title));
        html.push_str("    <style>");
        html.push_str(Self::generate_styles());
        html.push_str("</style>\n");
        html.push_str("</head>\n");

        html.push_str("<body>\n");
        html.push_str(&format!("    <h1>{}</h1>\n", title));
        if self.tables.is_empty() {
            html.push_str("    <p>No benchmarks in common.</p>\n");
        }
        for table in &self.tables {
            html.push_str(&Self::render_table(table));
        }
        html.push_str("</body>\n");
        html.push_str("</html>\n");

        html
    }
}
