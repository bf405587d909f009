use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Pagination strategy for sources that return results page by page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationMode {
    /// Monotonically increasing page index advanced by one per fetch.
    Offset,
    /// Opaque continuation token extracted from the previous response.
    Cursor,
}

/// Pagination configuration for a paged extractor.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaginationConfig {
    pub mode: PaginationMode,
    /// Number of records requested per page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// First page index for offset pagination.
    #[serde(default = "default_start_page")]
    pub start_page: u32,
    /// Hard cap on pages fetched in one extraction.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    /// Dot-notation path to the next-cursor field in a response body.
    ///
    /// Required in cursor mode; fetchers use it to locate the continuation
    /// token. A response with no value at this path ends the pagination.
    pub cursor_path: Option<String>,
}

fn default_page_size() -> u32 {
    100
}

fn default_start_page() -> u32 {
    1
}

fn default_max_pages() -> u32 {
    100
}

impl PaginationConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.page_size == 0 {
            return Err(ValidationError::PageSizeZero);
        }
        if self.max_pages == 0 {
            return Err(ValidationError::MaxPagesZero);
        }
        if self.mode == PaginationMode::Cursor && self.cursor_path.is_none() {
            return Err(ValidationError::MissingCursorPath);
        }

        Ok(())
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            mode: PaginationMode::Offset,
            page_size: default_page_size(),
            start_page: default_start_page(),
            max_pages: default_max_pages(),
            cursor_path: None,
        }
    }
}
