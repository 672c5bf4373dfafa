// Threshold gate: fail the comparison when a significant regression is too large

use super::table::{Change, ComparisonTable};
use crate::error::{BenchError, Result};

/// Maximum tolerated regression as a fraction (0.2 = 20%)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdGate {
    threshold: Option<f64>,
}

impl ThresholdGate {
    pub fn new(threshold: Option<f64>) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> Option<f64> {
        self.threshold
    }

    /// Pass unless some row got worse by more than the threshold.
    ///
    /// Tables are inspected in order and the first offending row is reported.
    pub fn evaluate(&self, tables: &[ComparisonTable]) -> Result<()> {
        let Some(threshold) = self.threshold else {
            return Ok(());
        };
        let threshold_pct = threshold * 100.0;

        for table in tables {
            for row in &table.rows {
                if row.change == Change::Worse && row.pct_delta.abs() > threshold_pct {
                    return Err(BenchError::ThresholdViolation {
                        metric: table.metric.clone(),
                        benchmark: row.benchmark.clone(),
                        delta: row.delta.clone(),
                        threshold_pct,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Shorthand for `ThresholdGate::new(threshold).evaluate(tables)`
pub fn evaluate(threshold: Option<f64>, tables: &[ComparisonTable]) -> Result<()> {
    ThresholdGate::new(threshold).evaluate(tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regression::statistics::Summary;
    use crate::regression::table::Row;

    fn table(metric: &str, rows: &[(&str, f64, Change)]) -> ComparisonTable {
        let summary = Summary {
            mean: 1.0,
            min: 1.0,
            max: 1.0,
            n: 10,
        };
        ComparisonTable {
            metric: metric.to_string(),
            rows: rows
                .iter()
                .map(|(name, pct, change)| Row {
                    benchmark: name.to_string(),
                    package: String::new(),
                    old: summary,
                    new: summary,
                    delta: format!("{:+.2}%", pct),
                    pct_delta: *pct,
                    change: *change,
                    note: String::new(),
                    pvalue: Some(0.001),
                })
                .collect(),
        }
    }

    #[test]
    fn test_no_threshold_always_passes() {
        let tables = [table("time/op", &[("Scan", 900.0, Change::Worse)])];
        assert!(evaluate(None, &tables).is_ok());
    }

    #[test]
    fn test_regression_over_threshold_fails() {
        let tables = [table("time/op", &[("Scan", 25.0, Change::Worse)])];
        let err = evaluate(Some(0.2), &tables).unwrap_err();
        assert_eq!(
            err.to_string(),
            "time/op regression in Scan of +25.00% exceeded threshold of 20.00%"
        );
    }

    #[test]
    fn test_regression_under_threshold_passes() {
        let tables = [table("time/op", &[("Scan", 15.0, Change::Worse)])];
        assert!(evaluate(Some(0.2), &tables).is_ok());
    }

    #[test]
    fn test_boundary_is_not_a_violation() {
        let tables = [table("time/op", &[("Scan", 20.0, Change::Worse)])];
        assert!(evaluate(Some(0.2), &tables).is_ok());
    }

    #[test]
    fn test_large_improvement_passes() {
        let tables = [table("time/op", &[("Scan", -80.0, Change::Better)])];
        assert!(evaluate(Some(0.2), &tables).is_ok());
    }

    #[test]
    fn test_speed_drop_uses_absolute_delta() {
        let tables = [table("speed", &[("Put", -35.0, Change::Worse)])];
        let err = evaluate(Some(0.2), &tables).unwrap_err();
        assert!(matches!(err, BenchError::ThresholdViolation { ref metric, .. } if metric == "speed"));
    }

    #[test]
    fn test_first_violation_reported() {
        let tables = [
            table("time/op", &[("Fine", 1.0, Change::Worse)]),
            table(
                "alloc/op",
                &[("First", 50.0, Change::Worse), ("Second", 90.0, Change::Worse)],
            ),
        ];
        match evaluate(Some(0.1), &tables).unwrap_err() {
            BenchError::ThresholdViolation { benchmark, .. } => assert_eq!(benchmark, "First"),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
