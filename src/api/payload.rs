//! Request bodies.
//!
//! Every field is optional so the same payload serves create and partial
//! update. Nullable fields use a double `Option`: absent is `None`, an
//! explicit `null` is `Some(None)`.

use crate::api::error::ApiError;
use crate::entity::{Author, Book, EntityId};
use serde::{Deserialize, Deserializer};

fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Decode a JSON body, mapping syntax and type errors to 400.
pub fn decode<'a, T: Deserialize<'a>>(body: &'a [u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| {
        debug!("Rejected request body: {}", e);
        ApiError::BadRequest(format!("Invalid JSON body: {}", e))
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookPayload {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub cover_text: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub comment: Option<Option<String>>,
    /// Author reference; not a book field.
    #[serde(default, deserialize_with = "present")]
    pub id_author: Option<Option<EntityId>>,
}

impl BookPayload {
    /// New, unpersisted book. A missing title becomes empty and fails validation.
    pub fn to_book(&self) -> Book {
        let mut book = Book::new(self.title.clone().unwrap_or_default());
        self.apply_to(&mut book);
        book
    }

    /// Overwrite the fields present in the payload.
    pub fn apply_to(&self, book: &mut Book) {
        if let Some(title) = &self.title {
            book.title = title.clone();
        }
        if let Some(cover_text) = &self.cover_text {
            book.cover_text = cover_text.clone();
        }
        if let Some(comment) = &self.comment {
            book.comment = comment.clone();
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorPayload {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl AuthorPayload {
    pub fn to_author(&self) -> Author {
        let mut author = Author::new(String::new(), String::new());
        self.apply_to(&mut author);
        author
    }

    pub fn apply_to(&self, author: &mut Author) {
        if let Some(first_name) = &self.first_name {
            author.first_name = first_name.clone();
        }
        if let Some(last_name) = &self.last_name {
            author.last_name = last_name.clone();
        }
    }
}
