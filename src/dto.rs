//! Response envelope and shared API contract types.
//!
//! Conventions:
//! - Every success body is wrapped in [`ApiResponse`]
//! - Paginated listings use [`PagedResponse`] which adds a `pagination` block
//! - `*Request` types are deserialized from client JSON and validated with
//!   `validator` derive macros

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Standard response envelope: `{success, data, message, timestamp, request_id}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub request_id: Uuid,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            message: None,
            timestamp: Utc::now(),
            request_id: Uuid::new_v4(),
        }
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::ok(data)
        }
    }
}

/// Envelope for paginated listings.
#[derive(Debug, Serialize)]
pub struct PagedResponse<T> {
    pub success: bool,
    pub data: Vec<T>,
    pub pagination: PaginationInfo,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub request_id: Uuid,
}

impl<T> PagedResponse<T> {
    pub fn new(data: Vec<T>, pagination: PaginationInfo) -> Self {
        Self {
            success: true,
            data,
            pagination,
            message: None,
            timestamp: Utc::now(),
            request_id: Uuid::new_v4(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaginationInfo {
    pub page: i64,
    pub page_size: i64,
    pub total_items: i64,
    pub total_pages: i64,
    pub has_next: bool,
    pub has_previous: bool,
}

impl PaginationInfo {
    pub fn new(page: i64, page_size: i64, total_items: i64) -> Self {
        let total_pages = if total_items == 0 {
            0
        } else {
            (total_items + page_size - 1) / page_size
        };
        Self {
            page,
            page_size,
            total_items,
            total_pages,
            has_next: page < total_pages,
            has_previous: page > 1 && total_items > 0,
        }
    }
}

/// Raw pagination query parameters, before clamping.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl PageQuery {
    /// Clamp to page >= 1 and 1 <= page_size <= 100.
    pub fn clamp(&self) -> (i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let page_size = self
            .page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        (page, page_size)
    }

    pub fn offset(&self) -> i64 {
        let (page, page_size) = self.clamp();
        (page - 1) * page_size
    }
}

/// Standard success message response
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Standard delete confirmation
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
    pub id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_query_clamps_lower_bounds() {
        let q = PageQuery {
            page: Some(0),
            page_size: Some(0),
        };
        assert_eq!(q.clamp(), (1, 1));

        let q = PageQuery {
            page: Some(-5),
            page_size: Some(-1),
        };
        assert_eq!(q.clamp(), (1, 1));
    }

    #[test]
    fn test_page_query_clamps_upper_page_size() {
        let q = PageQuery {
            page: Some(3),
            page_size: Some(500),
        };
        assert_eq!(q.clamp(), (3, MAX_PAGE_SIZE));
    }

    #[test]
    fn test_page_query_defaults() {
        let q = PageQuery::default();
        assert_eq!(q.clamp(), (1, DEFAULT_PAGE_SIZE));
        assert_eq!(q.offset(), 0);
    }

    #[test]
    fn test_pagination_info_math() {
        let p = PaginationInfo::new(2, 20, 41);
        assert_eq!(p.total_pages, 3);
        assert!(p.has_next);
        assert!(p.has_previous);

        let p = PaginationInfo::new(3, 20, 41);
        assert!(!p.has_next);

        let p = PaginationInfo::new(1, 20, 0);
        assert_eq!(p.total_pages, 0);
        assert!(!p.has_next);
        assert!(!p.has_previous);
    }
}
