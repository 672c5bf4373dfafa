// Statistical comparison of two benchmark logs
//
// The old and new logs are parsed into per-metric samples, outliers are
// trimmed, and each benchmark present on both sides becomes a table row
// whose delta is reported only when Welch's t-test finds it significant.
//
// Implementation:
// - Uses aprender (crates.io) for hypothesis testing (t-tests) and quantiles
// - Uses trueno (crates.io) for vector statistics
// - Parsing, table assembly and the threshold gate are the only local logic

mod config;
mod gate;
mod parse;
mod statistics;
mod table;

pub use config::StatConfig;
pub use gate::{evaluate, ThresholdGate};
pub use parse::{higher_is_better, metric_for_unit, parse_bench_output, BenchKey, BenchSamples};
pub use statistics::{
    compare_distributions, median, remove_outliers, summarize, StatisticalTest, Summary,
};
pub use table::{format_value, Change, ComparisonTable, Row, SortOrder};

use crate::error::{IoContext, Result};
use std::io::Read;

/// Turns two raw benchmark logs into comparison tables
pub trait StatEngine {
    fn compare(&self, old: &mut dyn Read, new: &mut dyn Read) -> Result<Vec<ComparisonTable>>;
}

/// Welch t-test engine over Go benchmark output
#[derive(Debug, Clone, Default)]
pub struct BenchstatEngine {
    config: StatConfig,
}

impl BenchstatEngine {
    pub fn new(config: StatConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StatConfig {
        &self.config
    }

    /// Compare already-parsed samples; one table per metric seen in `old`
    pub fn compare_samples(
        &self,
        old: &BenchSamples,
        new: &BenchSamples,
    ) -> Result<Vec<ComparisonTable>> {
        let mut tables = Vec::new();
        for metric in old.metrics() {
            if let Some(mut table) =
                ComparisonTable::build(metric, old, new, self.config.significance_level)?
            {
                table.sort(self.config.order);
                tables.push(table);
            }
        }
        Ok(tables)
    }
}

impl StatEngine for BenchstatEngine {
    fn compare(&self, old: &mut dyn Read, new: &mut dyn Read) -> Result<Vec<ComparisonTable>> {
        let old = read_samples(old, "old")?;
        let new = read_samples(new, "new")?;
        self.compare_samples(&old, &new)
    }
}

fn read_samples(log: &mut dyn Read, label: &str) -> Result<BenchSamples> {
    let mut bytes = Vec::new();
    log.read_to_end(&mut bytes)
        .io_context(|| format!("reading {} benchmark output", label))?;
    Ok(parse_bench_output(&String::from_utf8_lossy(&bytes)))
}
