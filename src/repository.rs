//! Read side of persistence.

use crate::entity::{Entity, EntityId};
use crate::error::Result;
use serde::Deserialize;
use std::future::Future;

/// Largest page a client may request.
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Lookup contract the endpoints and the query gateway read through.
///
/// # Example
///
/// ```ignore
/// impl DataRepository<Book> for BookRepository {
///     async fn find(&self, id: EntityId) -> Result<Option<Book>> {
///         self.db.select_book(id).await
///     }
///
///     async fn find_all_with_pagination(&self, page: Page) -> Result<Vec<Book>> {
///         self.db.select_books(page.offset(), page.limit).await
///     }
/// }
/// ```
pub trait DataRepository<T: Entity>: Send + Sync {
    /// Fetch one entity, `None` if no row has this id.
    fn find(&self, id: EntityId) -> impl Future<Output = Result<Option<T>>> + Send;

    /// Fetch one page ordered by id.
    fn find_all_with_pagination(&self, page: Page) -> impl Future<Output = Result<Vec<T>>> + Send;
}

/// Raw `?page=&limit=` query; missing values fall back to per-endpoint defaults.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Normalized pagination window. Pages are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Page {
    /// `page` below 1 becomes 1; `limit` is clamped to `1..=MAX_PAGE_LIMIT`.
    pub fn new(page: u32, limit: u32) -> Self {
        Page {
            page: page.max(1),
            limit: limit.clamp(1, MAX_PAGE_LIMIT),
        }
    }

    pub fn from_query(query: PageQuery, default_limit: u32) -> Self {
        Page::new(query.page.unwrap_or(1), query.limit.unwrap_or(default_limit))
    }

    pub fn offset(&self) -> usize {
        (self.page as usize - 1).saturating_mul(self.limit as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_defaults_and_clamping() {
        let page = Page::from_query(PageQuery::default(), 3);
        assert_eq!(page, Page { page: 1, limit: 3 });

        let page = Page::from_query(
            PageQuery {
                page: Some(0),
                limit: Some(0),
            },
            3,
        );
        assert_eq!(page, Page { page: 1, limit: 1 });

        assert_eq!(Page::new(2, 10_000).limit, MAX_PAGE_LIMIT);
    }

    #[test]
    fn test_offset() {
        assert_eq!(Page::new(1, 4).offset(), 0);
        assert_eq!(Page::new(3, 4).offset(), 8);
        assert_eq!(Page::new(u32::MAX, MAX_PAGE_LIMIT).offset(), (u32::MAX as usize - 1) * 100);
    }
}
