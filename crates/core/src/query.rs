//! Filtering and pagination of per-item batch results.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::batch::{ItemStatus, ItemView};

/// Default page size for result listings.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Maximum page size for result listings.
pub const MAX_PAGE_SIZE: usize = 500;

/// Query parameters for `GET /batches/{id}/results`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Validate)]
pub struct ResultQuery {
    /// 1-based page number.
    #[validate(range(min = 1))]
    pub page: Option<usize>,
    #[validate(range(min = 1, max = 500))]
    pub page_size: Option<usize>,
    /// Only include items in this status.
    #[serde(alias = "status_filter")]
    pub status: Option<ItemStatus>,
    /// Only include successful items scoring at least this much.
    #[validate(range(max = 100))]
    pub min_score: Option<u8>,
    /// Only include successful items scoring at most this much.
    #[validate(range(max = 100))]
    pub max_score: Option<u8>,
}

impl ResultQuery {
    fn matches(&self, item: &ItemView) -> bool {
        if let Some(status) = self.status {
            if item.status != status {
                return false;
            }
        }
        if self.min_score.is_none() && self.max_score.is_none() {
            return true;
        }
        match item.outcome.as_ref().and_then(|o| o.score()) {
            Some(score) => {
                self.min_score.is_none_or(|min| score >= min)
                    && self.max_score.is_none_or(|max| score <= max)
            }
            None => false,
        }
    }
}

/// One page of filtered results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultPage {
    pub items: Vec<ItemView>,
    pub page: usize,
    pub page_size: usize,
    /// Number of items matching the filter across all pages.
    pub total_count: usize,
    pub total_pages: usize,
}

/// Filter `items` (already in index order) and cut out the requested page.
pub fn paginate(items: Vec<ItemView>, query: &ResultQuery) -> ResultPage {
    let page = query.page.unwrap_or(1).max(1);
    let page_size = query
        .page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let matching: Vec<ItemView> = items.into_iter().filter(|i| query.matches(i)).collect();
    let total_count = matching.len();
    let total_pages = total_count.div_ceil(page_size);

    let items = matching
        .into_iter()
        .skip((page - 1).saturating_mul(page_size))
        .take(page_size)
        .collect();

    ResultPage {
        items,
        page,
        page_size,
        total_count,
        total_pages,
    }
}
