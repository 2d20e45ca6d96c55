//! Response envelope: `{success, data?, message?, meta?}`

use serde::Serialize;

use crate::models::PaginatedResponse;

/// Pagination metadata attached to list responses
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unread_count: Option<i64>,
}

/// Standard success envelope
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<PageMeta>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn data(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            meta: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_meta(mut self, meta: PageMeta) -> Self {
        self.meta = Some(meta);
        self
    }
}

impl ApiResponse<()> {
    /// Envelope carrying only a message
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
            meta: None,
        }
    }
}

impl<T: Serialize> ApiResponse<Vec<T>> {
    /// Unpaginated list; the whole collection is a single page
    pub fn list(items: Vec<T>) -> Self {
        let count = items.len();
        let meta = PageMeta {
            total: count as u64,
            page: 1,
            limit: u32::try_from(count).unwrap_or(u32::MAX),
            total_pages: 1,
            unread_count: None,
        };
        ApiResponse::data(items).with_meta(meta)
    }
}

impl<T: Serialize> From<PaginatedResponse<T>> for ApiResponse<Vec<T>> {
    fn from(page: PaginatedResponse<T>) -> Self {
        let meta = PageMeta {
            total: page.total,
            page: page.page,
            limit: page.limit,
            total_pages: page.total_pages,
            unread_count: None,
        };
        ApiResponse::data(page.items).with_meta(meta)
    }
}
