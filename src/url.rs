//! Absolute URLs for named routes, used in `Location` headers.

use crate::entity::EntityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteName {
    DetailBook,
    DetailAuthor,
}

impl RouteName {
    fn path(self, id: EntityId) -> String {
        match self {
            RouteName::DetailBook => format!("/api/books/{}", id),
            RouteName::DetailAuthor => format!("/api/author/{}", id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UrlGenerator {
    base: String,
}

impl UrlGenerator {
    /// Create a generator rooted at `public_url` (trailing `/` ignored).
    pub fn new(public_url: impl Into<String>) -> Self {
        let base = public_url.into().trim_end_matches('/').to_string();
        UrlGenerator { base }
    }

    /// ```
    /// use bookshelf_api::url::{RouteName, UrlGenerator};
    ///
    /// let urls = UrlGenerator::new("http://localhost:8000/");
    /// assert_eq!(urls.generate(RouteName::DetailBook, 4), "http://localhost:8000/api/books/4");
    /// ```
    pub fn generate(&self, route: RouteName, id: EntityId) -> String {
        format!("{}{}", self.base, route.path(id))
    }
}
