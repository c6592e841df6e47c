//! Summary aggregation over error categories.
//!
//! `total_errors` counts violation instances; `error_rows` counts distinct
//! `row_idx` values. A row violating two rules adds two to the first and one
//! to the second.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::ErrorCategory;
use crate::error::{ModelError, ModelResult};

/// Aggregate counts for one validation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ErrorSummary {
    /// Number of violation instances.
    pub total_errors: usize,
    /// Number of distinct rows with at least one violation.
    pub error_rows: usize,
    /// Instance count per category name.
    #[serde(default)]
    pub categories: BTreeMap<String, usize>,
}

impl ErrorSummary {
    /// Compute the summary from categories.
    pub fn compute(categories: &[ErrorCategory]) -> Self {
        let mut distinct = BTreeSet::new();
        let mut per_category = BTreeMap::new();
        let mut total = 0;

        for category in categories {
            let count = category.instance_count();
            total += count;
            *per_category.entry(category.name.clone()).or_insert(0) += count;
            for group in &category.errors {
                distinct.extend(group.rows.iter().map(|r| r.row_idx));
            }
        }

        Self {
            total_errors: total,
            error_rows: distinct.len(),
            categories: per_category,
        }
    }

    /// Compare a producer-supplied summary with the recomputed one.
    pub fn check_against(&self, categories: &[ErrorCategory]) -> ModelResult<()> {
        let computed = Self::compute(categories);
        let mismatch = |field: &str, declared: usize, computed: usize| ModelError::SummaryMismatch {
            field: field.to_string(),
            declared,
            computed,
        };

        if self.total_errors != computed.total_errors {
            return Err(mismatch("total_errors", self.total_errors, computed.total_errors));
        }
        if self.error_rows != computed.error_rows {
            return Err(mismatch("error_rows", self.error_rows, computed.error_rows));
        }
        for (name, &count) in &computed.categories {
            let declared = self.categories.get(name).copied().unwrap_or(0);
            if declared != count {
                return Err(mismatch(&format!("categories.{}", name), declared, count));
            }
        }
        for (name, &declared) in &self.categories {
            if !computed.categories.contains_key(name) && declared != 0 {
                return Err(mismatch(&format!("categories.{}", name), declared, 0));
            }
        }
        Ok(())
    }
}
