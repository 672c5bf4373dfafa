// Configuration for benchmark comparison statistics

use super::table::SortOrder;
use crate::error::{BenchError, Result};
use serde::{Deserialize, Serialize};

/// How the two logs are compared and ordered
///
/// # Example
/// ```
/// use benchdiff::regression::StatConfig;
///
/// let config = StatConfig::default();
/// assert_eq!(config.significance_level, 0.05); // 95% confidence
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatConfig {
    /// Statistical significance level (alpha)
    ///
    /// Deltas with a p-value at or above this level are reported as `~`.
    ///
    /// - 0.05 (default): 95% confidence
    /// - 0.01: stricter, fewer reported changes
    pub significance_level: f64,

    /// Row ordering within each table
    pub order: SortOrder,
}

impl Default for StatConfig {
    fn default() -> Self {
        Self {
            significance_level: 0.05,
            order: SortOrder::Delta,
        }
    }
}

impl StatConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.significance_level > 0.0 && self.significance_level < 1.0) {
            return Err(BenchError::config(format!(
                "significance level must be in (0, 1), got {}",
                self.significance_level
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StatConfig::default();
        assert_eq!(config.significance_level, 0.05);
        assert_eq!(config.order, SortOrder::Delta);
        assert!(config.validate().is_ok());
    }

    #[test]
    #[allow(clippy::field_reassign_with_default)]
    fn test_invalid_significance_level() {
        let mut config = StatConfig::default();
        config.significance_level = 1.5;
        assert!(config.validate().is_err());

        config.significance_level = 0.0;
        assert!(config.validate().is_err());

        config.significance_level = f64::NAN;
        assert!(config.validate().is_err());
    }
}
