//! In-memory persistence store with unit-of-work flushes.
//!
//! Writes are staged on a [`UnitOfWork`] with `persist`/`remove` and applied
//! by `flush`, all or nothing. Ids come from per-table sequences at persist
//! time so a caller can build URLs before flushing.

use crate::entity::{Author, Book, Entity, EntityId};
use crate::error::{Error, Result};
use crate::repository::{DataRepository, Page};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct AuthorRow {
    first_name: String,
    last_name: String,
}

#[derive(Debug, Clone)]
struct BookRow {
    title: String,
    cover_text: Option<String>,
    comment: Option<String>,
    author_id: Option<EntityId>,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    authors: BTreeMap<EntityId, AuthorRow>,
    books: BTreeMap<EntityId, BookRow>,
}

impl Tables {
    fn author(&self, id: EntityId) -> Option<Author> {
        self.authors.get(&id).map(|row| Author {
            id: Some(id),
            first_name: row.first_name.clone(),
            last_name: row.last_name.clone(),
        })
    }

    fn book(&self, id: EntityId, row: &BookRow) -> Book {
        Book {
            id: Some(id),
            title: row.title.clone(),
            cover_text: row.cover_text.clone(),
            comment: row.comment.clone(),
            author: row.author_id.and_then(|author_id| self.author(author_id)),
        }
    }

    fn apply(&mut self, change: Change) -> Result<()> {
        match change {
            Change::SaveAuthor(author) => {
                let id = require_id(author.id, "author")?;
                self.authors.insert(
                    id,
                    AuthorRow {
                        first_name: author.first_name,
                        last_name: author.last_name,
                    },
                );
            }
            Change::SaveBook(book) => {
                let id = require_id(book.id, "book")?;
                let author_id = book.author_id();
                self.books.insert(
                    id,
                    BookRow {
                        title: book.title,
                        cover_text: book.cover_text,
                        comment: book.comment,
                        author_id,
                    },
                );
            }
            Change::RemoveAuthor(id) => {
                self.authors.remove(&id);
            }
            Change::RemoveAuthorCascade(id) => {
                self.authors.remove(&id);
                self.books.retain(|_, row| row.author_id != Some(id));
            }
            Change::RemoveBook(id) => {
                self.books.remove(&id);
            }
        }
        Ok(())
    }

    /// Unlink saved books whose author disappeared before the flush.
    fn detach_missing_authors(&mut self, saved: &[EntityId]) {
        for id in saved {
            let Some(row) = self.books.get_mut(id) else {
                continue;
            };
            if let Some(author_id) = row.author_id {
                if !self.authors.contains_key(&author_id) {
                    debug!("Book {} saved without missing author {}", id, author_id);
                    row.author_id = None;
                }
            }
        }
    }

    fn check_references(&self) -> Result<()> {
        for (id, book) in &self.books {
            if let Some(author_id) = book.author_id {
                if !self.authors.contains_key(&author_id) {
                    return Err(Error::ConstraintViolation(format!(
                        "book {} references missing author {}",
                        id, author_id
                    )));
                }
            }
        }
        Ok(())
    }
}

fn require_id(id: Option<EntityId>, resource: &str) -> Result<EntityId> {
    id.ok_or_else(|| Error::RepositoryError(format!("{} staged without an id", resource)))
}

/// A pending write recorded on a [`UnitOfWork`].
#[derive(Debug, Clone)]
pub enum Change {
    SaveAuthor(Author),
    SaveBook(Book),
    RemoveAuthor(EntityId),
    /// Remove an author and every book pointing at it.
    RemoveAuthorCascade(EntityId),
    RemoveBook(EntityId),
}

/// Entities the store knows how to write.
pub trait Persistable: Entity {
    fn next_id(store: &MemoryStore) -> EntityId;

    fn save(self) -> Change;

    fn removal(id: EntityId) -> Change;
}

impl Persistable for Author {
    fn next_id(store: &MemoryStore) -> EntityId {
        store.author_seq.fetch_add(1, Ordering::SeqCst)
    }

    fn save(self) -> Change {
        Change::SaveAuthor(self)
    }

    fn removal(id: EntityId) -> Change {
        Change::RemoveAuthor(id)
    }
}

impl Persistable for Book {
    fn next_id(store: &MemoryStore) -> EntityId {
        store.book_seq.fetch_add(1, Ordering::SeqCst)
    }

    fn save(self) -> Change {
        Change::SaveBook(self)
    }

    fn removal(id: EntityId) -> Change {
        Change::RemoveBook(id)
    }
}

/// Shared in-memory database.
#[derive(Debug)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    author_seq: AtomicI64,
    book_seq: AtomicI64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store; ids start at 1.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            author_seq: AtomicI64::new(1),
            book_seq: AtomicI64::new(1),
        }
    }

    /// Start staging writes.
    pub fn unit_of_work(&self) -> UnitOfWork<'_> {
        UnitOfWork {
            store: self,
            changes: Vec::new(),
        }
    }

    /// All books whose author is `author_id`, ordered by id.
    pub async fn books_by_author(&self, author_id: EntityId) -> Result<Vec<Book>> {
        let tables = self.tables.read().await;
        Ok(tables
            .books
            .iter()
            .filter(|(_, row)| row.author_id == Some(author_id))
            .map(|(id, row)| tables.book(*id, row))
            .collect())
    }

    pub async fn book_count(&self) -> usize {
        self.tables.read().await.books.len()
    }

    pub async fn author_count(&self) -> usize {
        self.tables.read().await.authors.len()
    }
}

impl DataRepository<Author> for MemoryStore {
    async fn find(&self, id: EntityId) -> Result<Option<Author>> {
        Ok(self.tables.read().await.author(id))
    }

    async fn find_all_with_pagination(&self, page: Page) -> Result<Vec<Author>> {
        let tables = self.tables.read().await;
        Ok(tables
            .authors
            .keys()
            .skip(page.offset())
            .take(page.limit as usize)
            .filter_map(|id| tables.author(*id))
            .collect())
    }
}

impl DataRepository<Book> for MemoryStore {
    async fn find(&self, id: EntityId) -> Result<Option<Book>> {
        let tables = self.tables.read().await;
        Ok(tables.books.get(&id).map(|row| tables.book(id, row)))
    }

    async fn find_all_with_pagination(&self, page: Page) -> Result<Vec<Book>> {
        let tables = self.tables.read().await;
        Ok(tables
            .books
            .iter()
            .skip(page.offset())
            .take(page.limit as usize)
            .map(|(id, row)| tables.book(*id, row))
            .collect())
    }
}

/// Staged writes against a [`MemoryStore`].
///
/// Dropping a unit of work without flushing discards its changes.
pub struct UnitOfWork<'a> {
    store: &'a MemoryStore,
    changes: Vec<Change>,
}

impl UnitOfWork<'_> {
    /// Stage an insert or update; assigns an id to new entities.
    pub fn persist<T: Persistable>(&mut self, entity: &mut T) -> EntityId {
        let id = match entity.id() {
            Some(id) => id,
            None => {
                let id = T::next_id(self.store);
                entity.assign_id(id);
                id
            }
        };
        self.changes.push(entity.clone().save());
        id
    }

    /// Stage a delete. Entities that were never persisted are ignored.
    pub fn remove<T: Persistable>(&mut self, entity: &T) {
        match entity.id() {
            Some(id) => self.changes.push(T::removal(id)),
            None => debug!("Ignoring removal of unpersisted {}", T::resource()),
        }
    }

    /// Stage an author delete that takes the author's books with it,
    /// including books written by concurrent flushes.
    pub fn remove_with_books(&mut self, author: &Author) {
        match author.id {
            Some(id) => self.changes.push(Change::RemoveAuthorCascade(id)),
            None => debug!("Ignoring removal of unpersisted author"),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Apply every staged change atomically.
    ///
    /// Books saved in this unit whose author no longer exists are stored
    /// without an author.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConstraintViolation` if the result would leave a book
    /// pointing at a missing author; nothing is written in that case.
    pub async fn flush(self) -> Result<()> {
        let mut tables = self.store.tables.write().await;
        let mut staged = tables.clone();
        let count = self.changes.len();

        let mut saved_books = Vec::new();
        for change in self.changes {
            if let Change::SaveBook(book) = &change {
                saved_books.extend(book.id);
            }
            staged.apply(change)?;
        }
        staged.detach_missing_authors(&saved_books);
        staged.check_references()?;

        *tables = staged;
        debug!("Flushed {} change(s)", count);
        Ok(())
    }
}
