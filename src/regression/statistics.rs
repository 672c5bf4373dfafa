// Sample statistics for benchmark comparison
//
// Wraps aprender's hypothesis testing and trueno's vector primitives:
// - Welch's t-test (unequal variances) from aprender for the p-value
// - aprender::stats::DescriptiveStats for quartiles and median
// - trueno::Vector for mean, extremes and variance
//
// Nothing here implements inference itself.

use crate::error::{BenchError, Result};
use aprender::stats::DescriptiveStats;
use trueno::Vector;

/// Tukey fence multiplier for outlier removal
pub const IQR_FENCE: f32 = 1.5;

/// Central value and spread of one benchmark's samples
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Summary {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// Samples kept after outlier removal
    pub n: usize,
}

impl Summary {
    /// Largest deviation from the mean as a percentage of the mean (benchstat's `±`)
    pub fn range_pct(&self) -> f64 {
        if self.mean == 0.0 {
            return 0.0;
        }
        let spread = (self.max - self.mean).max(self.mean - self.min);
        spread / self.mean.abs() * 100.0
    }
}

/// Result of a Welch t-test between old and new samples
#[derive(Debug, Clone)]
pub struct StatisticalTest {
    /// t-statistic value
    pub statistic: f32,

    /// Two-tailed p-value
    pub pvalue: f32,

    /// Degrees of freedom
    pub df: f32,

    pub baseline_median: f32,
    pub current_median: f32,
}

/// Compare two distributions using Welch's independent t-test
///
/// # Example
/// ```ignore
/// let old = vec![10.0, 12.0, 11.0, 13.0, 10.0];
/// let new = vec![25.0, 27.0, 26.0, 28.0, 25.0];
///
/// let result = compare_distributions(&old, &new).unwrap();
/// assert!(result.pvalue < 0.05);
/// ```
pub fn compare_distributions(baseline: &[f32], current: &[f32]) -> Result<StatisticalTest> {
    if baseline.len() < 2 || current.len() < 2 {
        return Err(BenchError::stats(
            "need at least 2 samples per distribution for t-test",
        ));
    }

    let baseline_vec = Vector::from_slice(baseline);
    let current_vec = Vector::from_slice(current);
    let baseline_median = median(&baseline_vec)?;
    let current_median = median(&current_vec)?;

    // Zero variance on both sides leaves the t statistic undefined; the
    // answer is then exact.
    let baseline_variance = baseline_vec.variance().unwrap_or(0.0);
    let current_variance = current_vec.variance().unwrap_or(0.0);
    if baseline_variance == 0.0 && current_variance == 0.0 {
        let same = baseline_vec.mean().unwrap_or(0.0) == current_vec.mean().unwrap_or(0.0);
        return Ok(StatisticalTest {
            statistic: 0.0,
            pvalue: if same { 1.0 } else { 0.0 },
            df: (baseline.len() + current.len() - 2) as f32,
            baseline_median,
            current_median,
        });
    }

    let ttest = aprender::stats::hypothesis::ttest_ind(baseline, current, false)
        .map_err(|e| BenchError::stats(format!("t-test failed: {}", e)))?;

    Ok(StatisticalTest {
        statistic: ttest.statistic,
        pvalue: if ttest.pvalue.is_nan() { 1.0 } else { ttest.pvalue },
        df: ttest.df,
        baseline_median,
        current_median,
    })
}

/// Calculate median using aprender's DescriptiveStats
pub fn median(vector: &Vector<f32>) -> Result<f32> {
    quantile(vector, 0.5)
}

fn quantile(vector: &Vector<f32>, q: f64) -> Result<f32> {
    DescriptiveStats::new(vector)
        .quantile(q)
        .map_err(|e| BenchError::stats(format!("computing quantile {}: {}", q, e)))
}

/// Drop samples outside the Tukey fences `[Q1 - 1.5 IQR, Q3 + 1.5 IQR]`
pub fn remove_outliers(values: &[f32]) -> Result<Vec<f32>> {
    if values.len() < 2 {
        return Ok(values.to_vec());
    }
    let vector = Vector::from_slice(values);
    let q1 = quantile(&vector, 0.25)?;
    let q3 = quantile(&vector, 0.75)?;
    let fence = IQR_FENCE * (q3 - q1);
    let (lo, hi) = (q1 - fence, q3 + fence);
    Ok(values
        .iter()
        .copied()
        .filter(|v| (lo..=hi).contains(v))
        .collect())
}

/// Mean and extremes of samples that have already had outliers removed
pub fn summarize(values: &[f32]) -> Result<Summary> {
    if values.is_empty() {
        return Err(BenchError::stats("cannot summarize an empty sample"));
    }
    let vector = Vector::from_slice(values);
    Ok(Summary {
        mean: vector.mean().unwrap_or(0.0) as f64,
        min: vector.min().unwrap_or(0.0) as f64,
        max: vector.max().unwrap_or(0.0) as f64,
        n: values.len(),
    })
}
