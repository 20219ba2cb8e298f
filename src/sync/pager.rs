//! Derived pagination over synced records.
//!
//! Pages are recomputed on every read and never persisted.

use serde::Serialize;

use crate::types::TokenRecord;

/// One rendered page plus the bookkeeping a list view needs.
#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub items: Vec<TokenRecord>,
    pub page_number: usize,
    pub page_size: usize,
    pub total_items: usize,
    pub total_pages: usize,
}

/// Total page count. Minimum 1 even with zero records, so views render
/// "no items" instead of "page 0 of 0".
pub fn total_pages(count: usize, page_size: usize) -> usize {
    if page_size == 0 {
        return 1;
    }
    count.div_ceil(page_size).max(1)
}

/// Contiguous slice for a 1-based `page_number`; empty once the range is
/// past the end of `records`.
pub fn paginate(records: &[TokenRecord], page_size: usize, page_number: usize) -> Vec<TokenRecord> {
    if page_size == 0 || page_number == 0 {
        return Vec::new();
    }
    let start = (page_number - 1).saturating_mul(page_size);
    if start >= records.len() {
        return Vec::new();
    }
    let end = (start + page_size).min(records.len());
    records[start..end].to_vec()
}

pub fn page(records: &[TokenRecord], page_size: usize, page_number: usize) -> Page {
    Page {
        items: paginate(records, page_size, page_number),
        page_number,
        page_size,
        total_items: records.len(),
        total_pages: total_pages(records.len(), page_size),
    }
}
