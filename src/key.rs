//! Cache key and tag naming.

use crate::error::{Error, Result};
use crate::repository::Page;

/// Tag carried by every cached book listing.
pub const BOOKS_TAG: &str = "booksCache";

/// Tag carried by every cached author listing.
pub const AUTHORS_TAG: &str = "authorCache";

/// memcached rejects longer keys
const MAX_KEY_LEN: usize = 250;

pub struct CacheKeyBuilder;

impl CacheKeyBuilder {
    /// Key for one page of a listing: `"{endpoint}-{page}-{limit}"`.
    ///
    /// ```
    /// use bookshelf_api::key::CacheKeyBuilder;
    /// use bookshelf_api::repository::Page;
    ///
    /// assert_eq!(CacheKeyBuilder::list("getAllBooks", Page::new(2, 3)), "getAllBooks-2-3");
    /// ```
    pub fn list(endpoint: &str, page: Page) -> String {
        format!("{}-{}-{}", endpoint, page.page, page.limit)
    }

    /// Key holding the current stamp of `tag`.
    pub fn tag(tag: &str) -> String {
        format!("tag:{}", tag)
    }

    /// Reject keys no backend can store.
    pub fn validate(key: &str) -> Result<()> {
        if key.is_empty() || key.len() > MAX_KEY_LEN {
            return Err(Error::ValidationError(format!(
                "cache key length must be 1..={}, got {}",
                MAX_KEY_LEN,
                key.len()
            )));
        }
        if key.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(Error::ValidationError(format!(
                "cache key contains whitespace or control characters: {:?}",
                key
            )));
        }
        Ok(())
    }
}
