//! Cached paginated listings.
//!
//! A listing is serialized once per `(endpoint, page, limit)` and served from
//! the tagged cache until a mutation invalidates the endpoint's tag.

use crate::backend::CacheBackend;
use crate::entity::Entity;
use crate::error::Result;
use crate::expander::CacheExpander;
use crate::key::{CacheKeyBuilder, AUTHORS_TAG, BOOKS_TAG};
use crate::repository::{DataRepository, Page};
use crate::view::{self, Group, Normalize, SerializationContext};
use std::future::Future;
use std::sync::Arc;

/// A cached listing: its key prefix and the tag its entries carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListEndpoint {
    pub name: &'static str,
    pub tag: &'static str,
}

pub const BOOK_LIST: ListEndpoint = ListEndpoint {
    name: "getAllBooks",
    tag: BOOKS_TAG,
};

pub const AUTHOR_LIST: ListEndpoint = ListEndpoint {
    name: "getAllAuthor",
    tag: AUTHORS_TAG,
};

pub struct QueryGateway<B: CacheBackend> {
    cache: Arc<CacheExpander<B>>,
    retry: u32,
}

impl<B: CacheBackend> Clone for QueryGateway<B> {
    fn clone(&self) -> Self {
        QueryGateway {
            cache: Arc::clone(&self.cache),
            retry: self.retry,
        }
    }
}

impl<B: CacheBackend> QueryGateway<B> {
    /// Create a gateway over a shared expander, without retries.
    pub fn new(cache: Arc<CacheExpander<B>>) -> Self {
        QueryGateway { cache, retry: 0 }
    }

    /// Retry failing repository reads `retry` times before giving up.
    pub fn with_retry(mut self, retry: u32) -> Self {
        self.retry = retry;
        self
    }

    /// JSON array for one page of `endpoint`, rendered under `getBooks`.
    ///
    /// The repository is only read on a cache miss.
    pub async fn list<T, R>(&self, endpoint: ListEndpoint, repository: &R, page: Page) -> Result<Vec<u8>>
    where
        T: Entity + Normalize,
        R: DataRepository<T>,
    {
        let key = CacheKeyBuilder::list(endpoint.name, page);

        self.cache
            .builder(key)
            .with_tag(endpoint.tag)
            .with_retry(self.retry)
            .execute(move || async move {
                let items = repository.find_all_with_pagination(page).await?;
                debug!(
                    "Loaded {} {} for page {} (limit {})",
                    items.len(),
                    T::resource(),
                    page.page,
                    page.limit
                );
                let context = SerializationContext::create().with_groups(&[Group::GET_BOOKS]);
                view::to_json(items.as_slice(), &context)
            })
            .await
    }

    /// Drop every cached page carrying any of `tags`.
    pub async fn invalidate(&self, tags: &[&str]) -> Result<()> {
        self.cache.invalidate_tags(tags).await
    }

    /// Run `write` between two invalidations of `tags`.
    ///
    /// A page rebuilt while `write` is in flight holds pre-write rows under
    /// the first fresh stamp; the second invalidation retires it.
    pub async fn invalidate_around<F, Fut, T>(&self, tags: &[&str], write: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.invalidate(tags).await?;
        let output = write().await?;
        self.invalidate(tags).await?;
        Ok(output)
    }

    pub async fn health_check(&self) -> Result<bool> {
        self.cache.backend().health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::entity::{Book, EntityId};
    use crate::store::MemoryStore;
    use serde_json::Value;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Counts page reads going through to the store.
    struct CountingRepository {
        inner: MemoryStore,
        page_reads: AtomicU32,
    }

    impl DataRepository<Book> for CountingRepository {
        async fn find(&self, id: EntityId) -> Result<Option<Book>> {
            DataRepository::<Book>::find(&self.inner, id).await
        }

        async fn find_all_with_pagination(&self, page: Page) -> Result<Vec<Book>> {
            self.page_reads.fetch_add(1, Ordering::SeqCst);
            DataRepository::<Book>::find_all_with_pagination(&self.inner, page).await
        }
    }

    async fn repository_with_books(count: usize) -> CountingRepository {
        let store = MemoryStore::new();
        let mut uow = store.unit_of_work();
        for i in 0..count {
            uow.persist(&mut Book::new(format!("Book {}", i)));
        }
        uow.flush().await.expect("Failed to flush");
        CountingRepository {
            inner: store,
            page_reads: AtomicU32::new(0),
        }
    }

    fn gateway() -> QueryGateway<InMemoryBackend> {
        QueryGateway::new(Arc::new(CacheExpander::new(InMemoryBackend::new())))
    }

    #[tokio::test]
    async fn test_repeated_reads_hit_repository_once() {
        let gateway = gateway();
        let repository = repository_with_books(5).await;

        let first = gateway
            .list::<Book, _>(BOOK_LIST, &repository, Page::new(1, 3))
            .await
            .expect("Failed to list");
        let second = gateway
            .list::<Book, _>(BOOK_LIST, &repository, Page::new(1, 3))
            .await
            .expect("Failed to list");

        assert_eq!(first, second);
        assert_eq!(repository.page_reads.load(Ordering::SeqCst), 1);

        let value: Value = serde_json::from_slice(&first).expect("Failed to parse");
        assert_eq!(value.as_array().map(Vec::len), Some(3));
        // Listings carry no version context, so versioned fields are present
        assert!(value[0].get("comment").is_some());
    }

    #[tokio::test]
    async fn test_pages_are_cached_separately() {
        let gateway = gateway();
        let repository = repository_with_books(5).await;

        gateway
            .list::<Book, _>(BOOK_LIST, &repository, Page::new(1, 3))
            .await
            .expect("Failed to list");
        let second_page = gateway
            .list::<Book, _>(BOOK_LIST, &repository, Page::new(2, 3))
            .await
            .expect("Failed to list");

        let value: Value = serde_json::from_slice(&second_page).expect("Failed to parse");
        assert_eq!(value.as_array().map(Vec::len), Some(2));
        assert_eq!(repository.page_reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidation_reloads() {
        let gateway = gateway();
        let repository = repository_with_books(1).await;

        gateway
            .list::<Book, _>(BOOK_LIST, &repository, Page::new(1, 3))
            .await
            .expect("Failed to list");

        let mut uow = repository.inner.unit_of_work();
        uow.persist(&mut Book::new("Late arrival"));
        uow.flush().await.expect("Failed to flush");

        // Author invalidation leaves book pages alone
        gateway
            .invalidate(&[AUTHORS_TAG])
            .await
            .expect("Failed to invalidate");
        let stale = gateway
            .list::<Book, _>(BOOK_LIST, &repository, Page::new(1, 3))
            .await
            .expect("Failed to list");
        let value: Value = serde_json::from_slice(&stale).expect("Failed to parse");
        assert_eq!(value.as_array().map(Vec::len), Some(1));

        gateway
            .invalidate(&[BOOKS_TAG])
            .await
            .expect("Failed to invalidate");
        let fresh = gateway
            .list::<Book, _>(BOOK_LIST, &repository, Page::new(1, 3))
            .await
            .expect("Failed to list");
        let value: Value = serde_json::from_slice(&fresh).expect("Failed to parse");
        assert_eq!(value.as_array().map(Vec::len), Some(2));
        assert_eq!(repository.page_reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_page_rebuilt_during_write_is_retired() {
        let gateway = gateway();
        let repository = repository_with_books(2).await;
        let doomed = DataRepository::<Book>::find(&repository.inner, 1)
            .await
            .expect("Failed to find")
            .expect("Book not found");

        let (gateway, repository, doomed) = (&gateway, &repository, &doomed);
        gateway
            .invalidate_around(&[BOOKS_TAG], move || async move {
                // A reader slips in before the removal lands
                let racing = gateway
                    .list::<Book, _>(BOOK_LIST, repository, Page::new(1, 3))
                    .await?;
                let value: Value = serde_json::from_slice(&racing)?;
                assert_eq!(value.as_array().map(Vec::len), Some(2));

                let mut uow = repository.inner.unit_of_work();
                uow.remove(doomed);
                uow.flush().await
            })
            .await
            .expect("Failed to write");

        let after = gateway
            .list::<Book, _>(BOOK_LIST, repository, Page::new(1, 3))
            .await
            .expect("Failed to list");
        let value: Value = serde_json::from_slice(&after).expect("Failed to parse");
        assert_eq!(value.as_array().map(Vec::len), Some(1));
        assert_eq!(value[0]["title"], "Book 1");
        assert_eq!(repository.page_reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_health_check() {
        assert!(gateway().health_check().await.expect("Health check failed"));
    }
}
