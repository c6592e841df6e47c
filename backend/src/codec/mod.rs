//! Compact and paginated projections of [`ErrorData`](crate::models::ErrorData).
//!
//! Both transforms are pure functions of an immutable snapshot:
//!
//! - [`pagination`]: metadata plus `(category, page)` slices, for incremental loading
//! - [`compact`]: positional, schema-driven encoding for bulk transfer
//!
//! ```text
//! ErrorData ──▶ metadata(page_size) ──▶ ErrorMetadata
//!     │
//!     ├───────▶ page(category, n) ────▶ PaginatedErrorData (rows_data restricted)
//!     │
//!     └───────▶ encode ──▶ OptimizedErrorData ──▶ decode ──▶ ErrorData (equal)
//! ```

pub mod compact;
pub mod pagination;

pub use compact::{decode, encode, CompactMeta, CompactSchemas, OptimizedErrorData};
pub use pagination::{
    metadata, page, pages, total_pages, CategoryMetadata, ErrorMetadata, PageSummary,
    PaginatedErrorData,
};
