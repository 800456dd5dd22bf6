//! Persisted entities.

/// Identifier assigned by the store on first persist.
pub type EntityId = i64;

/// Id given by clients that mean "no author".
pub const NO_ID: EntityId = -1;

/// Trait implemented by every persisted entity.
///
/// # Example
///
/// ```
/// use bookshelf_api::entity::{Author, Entity};
///
/// let mut author = Author::new("Ursula", "Le Guin");
/// assert_eq!(author.id(), None);
/// author.assign_id(7);
/// assert_eq!(author.id(), Some(7));
/// assert_eq!(Author::resource(), "author");
/// ```
pub trait Entity: Send + Sync + Clone + 'static {
    /// `None` until the entity has been persisted.
    fn id(&self) -> Option<EntityId>;

    fn assign_id(&mut self, id: EntityId);

    /// Resource name used in log lines and cache tags.
    fn resource() -> &'static str;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub id: Option<EntityId>,
    pub first_name: String,
    pub last_name: String,
}

impl Author {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Author {
            id: None,
            first_name: first_name.into(),
            last_name: last_name.into(),
        }
    }
}

impl Entity for Author {
    fn id(&self) -> Option<EntityId> {
        self.id
    }

    fn assign_id(&mut self, id: EntityId) {
        self.id = Some(id);
    }

    fn resource() -> &'static str {
        "author"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Book {
    pub id: Option<EntityId>,
    pub title: String,
    pub cover_text: Option<String>,
    /// Only exposed from API version 2.0 onwards.
    pub comment: Option<String>,
    /// Resolved author; `None` when the book has no author.
    pub author: Option<Author>,
}

impl Book {
    /// Unsaved book with no author.
    pub fn new(title: impl Into<String>) -> Self {
        Book {
            id: None,
            title: title.into(),
            cover_text: None,
            comment: None,
            author: None,
        }
    }

    pub fn author_id(&self) -> Option<EntityId> {
        self.author.as_ref().and_then(|author| author.id)
    }
}

impl Entity for Book {
    fn id(&self) -> Option<EntityId> {
        self.id
    }

    fn assign_id(&mut self, id: EntityId) {
        self.id = Some(id);
    }

    fn resource() -> &'static str {
        "books"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_book_author_id() {
        let mut book = Book::new("The Dispossessed");
        assert_eq!(book.author_id(), None);

        let mut author = Author::new("Ursula", "Le Guin");
        book.author = Some(author.clone());
        // An unpersisted author has no id yet
        assert_eq!(book.author_id(), None);

        author.assign_id(3);
        book.author = Some(author);
        assert_eq!(book.author_id(), Some(3));
    }

    #[test]
    fn test_resources() {
        assert_eq!(Book::resource(), "books");
        assert_eq!(Author::resource(), "author");
    }
}
