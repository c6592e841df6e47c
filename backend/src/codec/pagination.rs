//! Paginated views of an error snapshot.
//!
//! Pages are 1-based windows over a category's instances, flattened in group
//! then detection order. For a stable snapshot every instance lands on
//! exactly one page.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{CodecError, CodecResult, ModelError};
use crate::models::{ErrorCategory, ErrorData, ErrorGroup, Row};

/// Per-category pagination metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryMetadata {
    pub name: String,
    pub total_errors: usize,
    pub total_pages: usize,
}

/// Metadata endpoint payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMetadata {
    pub total_errors: usize,
    pub error_rows: usize,
    /// Number of categories.
    pub error_categories: usize,
    pub categories: Vec<CategoryMetadata>,
}

/// Dataset-wide totals carried on every page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSummary {
    pub total_errors: usize,
    pub error_rows: usize,
}

/// One page of one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginatedErrorData {
    pub category_name: String,
    pub page: usize,
    pub total_pages: usize,
    pub errors_on_page: usize,
    pub summary: PageSummary,
    /// Snapshots of the rows on this page only.
    pub rows_data: BTreeMap<usize, Row>,
    /// Groups with at least one row on this page, each trimmed to the window.
    pub error_groups: Vec<ErrorGroup>,
}

/// `ceil(count / page_size)`.
pub fn total_pages(count: usize, page_size: usize) -> CodecResult<usize> {
    if page_size == 0 {
        return Err(CodecError::InvalidPageSize);
    }
    Ok(count.div_ceil(page_size))
}

/// Build the metadata payload.
pub fn metadata(data: &ErrorData, page_size: usize) -> CodecResult<ErrorMetadata> {
    let categories = data
        .categories
        .iter()
        .map(|c| {
            let total = c.instance_count();
            Ok(CategoryMetadata {
                name: c.name.clone(),
                total_errors: total,
                total_pages: total_pages(total, page_size)?,
            })
        })
        .collect::<CodecResult<Vec<_>>>()?;

    Ok(ErrorMetadata {
        total_errors: data.summary.total_errors,
        error_rows: data.summary.error_rows,
        error_categories: data.categories.len(),
        categories,
    })
}

/// Slice page `page` (1-based) of `category_name`.
pub fn page(
    data: &ErrorData,
    category_name: &str,
    page: usize,
    page_size: usize,
) -> CodecResult<PaginatedErrorData> {
    let category = data
        .category(category_name)
        .ok_or_else(|| CodecError::UnknownCategory(category_name.to_string()))?;
    let total = total_pages(category.instance_count(), page_size)?;
    if page == 0 || page > total {
        return Err(CodecError::PageOutOfRange {
            category: category_name.to_string(),
            page,
            total_pages: total,
        });
    }

    let start = (page - 1) * page_size;
    let end = start + page_size;
    let error_groups = slice_groups(category, start, end);

    let mut rows_data = BTreeMap::new();
    for group in &error_groups {
        for row in &group.rows {
            let snapshot = data.row(row.row_idx).ok_or_else(|| ModelError::MissingRowData {
                category: category.name.clone(),
                reason: group.reason.clone(),
                row_idx: row.row_idx,
            })?;
            rows_data.insert(row.row_idx, snapshot.clone());
        }
    }

    Ok(PaginatedErrorData {
        category_name: category.name.clone(),
        page,
        total_pages: total,
        errors_on_page: error_groups.iter().map(|g| g.rows.len()).sum(),
        summary: PageSummary {
            total_errors: data.summary.total_errors,
            error_rows: data.summary.error_rows,
        },
        rows_data,
        error_groups,
    })
}

/// Every page of a category, in order.
pub fn pages(
    data: &ErrorData,
    category_name: &str,
    page_size: usize,
) -> CodecResult<Vec<PaginatedErrorData>> {
    let category = data
        .category(category_name)
        .ok_or_else(|| CodecError::UnknownCategory(category_name.to_string()))?;
    let total = total_pages(category.instance_count(), page_size)?;
    (1..=total)
        .map(|n| page(data, category_name, n, page_size))
        .collect()
}

/// Groups restricted to the flattened instance window `[start, end)`.
fn slice_groups(category: &ErrorCategory, start: usize, end: usize) -> Vec<ErrorGroup> {
    let mut offset = 0;
    let mut sliced = Vec::new();

    for group in &category.errors {
        let len = group.rows.len();
        let lo = start.max(offset);
        let hi = end.min(offset + len);
        if lo < hi {
            sliced.push(ErrorGroup {
                reason: group.reason.clone(),
                rows: group.rows[lo - offset..hi - offset].to_vec(),
                columns: group.columns.clone(),
            });
        }
        offset += len;
        if offset >= end {
            break;
        }
    }

    sliced
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::sample_data;
    use crate::models::{ErrorRow, Row};
    use proptest::prelude::*;

    /// One category spread over groups of the given sizes, row indices unique.
    fn data_with_groups(name: &str, sizes: &[usize]) -> ErrorData {
        let mut rows_data = BTreeMap::new();
        let mut next = 0;
        let groups = sizes
            .iter()
            .enumerate()
            .map(|(g, &size)| {
                let rows = (0..size)
                    .map(|_| {
                        next += 1;
                        rows_data.insert(next, Row::new().with("Date", format!("d{}", next)));
                        ErrorRow::new(next, None, Row::new())
                    })
                    .collect();
                ErrorGroup::new(format!("rule {}", g), vec!["Date".into()]).with_rows(rows)
            })
            .collect();
        ErrorData::new(rows_data, vec![ErrorCategory::new(name, groups)])
    }

    #[test]
    fn test_date_errors_scenario() {
        let data = data_with_groups("DATE_ERRORS", &[1000, 200, 34]);
        let meta = metadata(&data, 100).unwrap();
        assert_eq!(meta.categories[0].total_errors, 1234);
        assert_eq!(meta.categories[0].total_pages, 13);

        let last = page(&data, "DATE_ERRORS", 13, 100).unwrap();
        assert_eq!(last.errors_on_page, 34);
        assert_eq!(last.rows_data.len(), 34);
        assert_eq!(last.total_pages, 13);
    }

    #[test]
    fn test_page_spanning_groups() {
        let data = data_with_groups("DATE_ERRORS", &[3, 4]);
        let p = page(&data, "DATE_ERRORS", 2, 2).unwrap();
        assert_eq!(p.error_groups.len(), 2);
        assert_eq!(p.error_groups[0].rows.len(), 1);
        assert_eq!(p.error_groups[1].rows.len(), 1);
        assert_eq!(p.rows_data.keys().copied().collect::<Vec<_>>(), vec![3, 4]);
    }

    #[test]
    fn test_rows_data_restricted_to_page() {
        let data = sample_data();
        let p = page(&data, "DATA_ERRORS", 1, 1).unwrap();
        assert_eq!(p.rows_data.keys().copied().collect::<Vec<_>>(), vec![42]);
        assert_eq!(p.summary.total_errors, data.summary.total_errors);
    }

    #[test]
    fn test_invalid_requests() {
        let data = sample_data();
        assert_eq!(total_pages(5, 0), Err(CodecError::InvalidPageSize));
        assert!(matches!(
            page(&data, "DATA_ERRORS", 0, 10),
            Err(CodecError::PageOutOfRange { .. })
        ));
        assert!(matches!(
            page(&data, "DATA_ERRORS", 2, 10),
            Err(CodecError::PageOutOfRange { total_pages: 1, .. })
        ));
        assert!(matches!(
            page(&data, "NOPE", 1, 10),
            Err(CodecError::UnknownCategory(_))
        ));
    }

    #[test]
    fn test_empty_category_has_no_pages() {
        let data = data_with_groups("EMPTY", &[0, 0]);
        let meta = metadata(&data, 10).unwrap();
        assert_eq!(meta.categories[0].total_pages, 0);
        assert!(pages(&data, "EMPTY", 10).unwrap().is_empty());
    }

    #[test]
    fn test_missing_snapshot_surfaces() {
        let mut data = sample_data();
        data.rows_data.remove(&42);
        assert!(matches!(
            page(&data, "DATA_ERRORS", 1, 10),
            Err(CodecError::Model(ModelError::MissingRowData { row_idx: 42, .. }))
        ));
    }

    proptest! {
        #[test]
        fn prop_pages_cover_every_instance_once(
            sizes in proptest::collection::vec(0usize..40, 0..6),
            page_size in 1usize..25,
        ) {
            let data = data_with_groups("CAT", &sizes);
            let meta = metadata(&data, page_size).unwrap();
            let all = pages(&data, "CAT", page_size).unwrap();
            prop_assert_eq!(all.len(), meta.categories[0].total_pages);

            let on_pages: usize = all.iter().map(|p| p.errors_on_page).sum();
            prop_assert_eq!(on_pages, meta.categories[0].total_errors);

            let seen: Vec<usize> = all
                .iter()
                .flat_map(|p| p.error_groups.iter().flat_map(|g| g.rows.iter().map(|r| r.row_idx)))
                .collect();
            let expected: Vec<usize> = data.instances().map(|i| i.row.row_idx).collect();
            prop_assert_eq!(seen, expected);
        }
    }
}
