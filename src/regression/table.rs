// Comparison tables: one per metric, one row per benchmark present in both logs

use super::parse::{higher_is_better, BenchKey, BenchSamples};
use super::statistics::{compare_distributions, remove_outliers, summarize, Summary};
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Direction of a statistically significant change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Change {
    Better,
    Worse,
    Unchanged,
}

impl Change {
    /// +1 for better, -1 for worse, 0 otherwise
    pub fn sign(self) -> f64 {
        match self {
            Change::Better => 1.0,
            Change::Worse => -1.0,
            Change::Unchanged => 0.0,
        }
    }
}

/// Row ordering within a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Package, then benchmark name
    Name,
    /// Largest improvement first, largest regression last
    #[default]
    Delta,
}

#[derive(Debug, Clone, Serialize)]
pub struct Row {
    pub benchmark: String,
    pub package: String,
    pub old: Summary,
    pub new: Summary,
    /// Formatted percentage change, or `~` when not significant
    pub delta: String,
    pub pct_delta: f64,
    pub change: Change,
    /// `(p=0.000 n=10+10)`
    pub note: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pvalue: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonTable {
    pub metric: String,
    pub rows: Vec<Row>,
}

impl ComparisonTable {
    /// Build the table for `metric` from both sides' samples
    pub fn build(
        metric: &str,
        old: &BenchSamples,
        new: &BenchSamples,
        alpha: f64,
    ) -> Result<Option<Self>> {
        let mut rows = Vec::new();
        for key in old.keys(metric) {
            let (Some(old_values), Some(new_values)) = (old.get(metric, key), new.get(metric, key))
            else {
                tracing::debug!("{} {}: only in old results", metric, key.name);
                continue;
            };
            rows.push(build_row(metric, key, old_values, new_values, alpha)?);
        }
        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self {
            metric: metric.to_string(),
            rows,
        }))
    }

    pub fn sort(&mut self, order: SortOrder) {
        match order {
            SortOrder::Name => self.rows.sort_by(|a, b| {
                (a.package.as_str(), a.benchmark.as_str())
                    .cmp(&(b.package.as_str(), b.benchmark.as_str()))
            }),
            SortOrder::Delta => self
                .rows
                .sort_by(|a, b| delta_score(b).total_cmp(&delta_score(a))),
        }
    }
}

fn delta_score(row: &Row) -> f64 {
    row.pct_delta.abs() * row.change.sign()
}

fn build_row(
    metric: &str,
    key: &BenchKey,
    old_values: &[f64],
    new_values: &[f64],
    alpha: f64,
) -> Result<Row> {
    let old_kept = remove_outliers(&to_f32(old_values))?;
    let new_kept = remove_outliers(&to_f32(new_values))?;
    let old = summarize(&old_kept)?;
    let new = summarize(&new_kept)?;

    let pvalue = if old.n >= 2 && new.n >= 2 {
        Some(compare_distributions(&old_kept, &new_kept)?.pvalue as f64)
    } else {
        None
    };

    let note = match pvalue {
        Some(p) => format!("(p={:.3} n={}+{})", p, old.n, new.n),
        None => format!("(n={}+{})", old.n, new.n),
    };

    let significant = pvalue.is_some_and(|p| p < alpha) && old.mean != 0.0;
    let (delta, pct_delta, change) = if significant {
        let pct = (new.mean / old.mean - 1.0) * 100.0;
        let change = if pct == 0.0 {
            Change::Unchanged
        } else if (pct < 0.0) != higher_is_better(metric) {
            Change::Better
        } else {
            Change::Worse
        };
        (format!("{:+.2}%", pct), pct, change)
    } else {
        ("~".to_string(), 0.0, Change::Unchanged)
    };

    Ok(Row {
        benchmark: key.name.clone(),
        package: key.package.clone(),
        old,
        new,
        delta,
        pct_delta,
        change,
        note,
        pvalue,
    })
}

fn to_f32(values: &[f64]) -> Vec<f32> {
    values.iter().map(|v| *v as f32).collect()
}

/// Render a value of `metric` with a readable unit (`1.23µs`, `4.50kB`)
pub fn format_value(metric: &str, value: f64) -> String {
    match metric {
        "time/op" => scaled(value, &[(1e9, "s"), (1e6, "ms"), (1e3, "µs"), (1.0, "ns")]),
        "alloc/op" => scaled(value, &[(1e9, "GB"), (1e6, "MB"), (1e3, "kB"), (1.0, "B")]),
        "speed" => format!("{}MB/s", significant_digits(value)),
        _ => significant_digits(value),
    }
}

fn scaled(value: f64, scales: &[(f64, &str)]) -> String {
    for (factor, suffix) in scales {
        if value.abs() >= *factor {
            return format!("{}{}", significant_digits(value / factor), suffix);
        }
    }
    let (_, smallest) = scales[scales.len() - 1];
    format!("{}{}", significant_digits(value), smallest)
}

/// Three significant digits, without scientific notation
fn significant_digits(value: f64) -> String {
    let magnitude = value.abs();
    if magnitude >= 100.0 || magnitude == 0.0 {
        format!("{:.0}", value)
    } else if magnitude >= 10.0 {
        format!("{:.1}", value)
    } else {
        format!("{:.2}", value)
    }
}
