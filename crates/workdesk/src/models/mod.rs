//! Data models for the Workdesk resources

mod calendar;
mod document;
mod file;
mod folder;
mod message;
mod notification;
mod role;
mod team;
mod user;

pub use calendar::*;
pub use document::*;
pub use file::*;
pub use folder::*;
pub use message::*;
pub use notification::*;
pub use role::*;
pub use team::*;
pub use user::*;

use serde::Deserialize;

/// Upper bound for any page size
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Resolved page window for list queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Pagination {
    /// Apply defaults and bounds: page >= 1, 1 <= limit <= 100
    pub fn new(page: Option<u32>, limit: Option<u32>, default_limit: u32) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(default_limit).clamp(1, MAX_PAGE_LIMIT),
        }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.limit)
    }
}

/// Paginated response
#[derive(Debug, Clone, serde::Serialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: u64, page: u32, limit: u32) -> Self {
        let total_pages = if limit > 0 {
            total.div_ceil(u64::from(limit)) as u32
        } else {
            0
        };
        Self {
            items,
            total,
            page,
            limit,
            total_pages,
        }
    }
}

/// Body of the batch-delete endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct BatchDeleteRequest {
    pub ids: Vec<String>,
}

/// Number of rows a batch delete actually flipped
#[derive(Debug, Clone, serde::Serialize)]
pub struct BatchDeleteResult {
    pub deleted: u64,
}
