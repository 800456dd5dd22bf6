//! Entity constraints checked before anything is persisted.

use crate::entity::{Author, Book};
use serde::Serialize;

pub const TITLE_MAX_LEN: usize = 255;
pub const COVER_TEXT_MAX_LEN: usize = 2000;
pub const NAME_MAX_LEN: usize = 255;

/// One failed constraint, rendered as `{"propertyPath": ..., "message": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub property_path: String,
    pub message: String,
}

/// Ordered list of violations; serializes as a JSON array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ConstraintViolationList(Vec<Violation>);

impl ConstraintViolationList {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Violation> {
        self.0.iter()
    }

    fn add(&mut self, property_path: &str, message: impl Into<String>) {
        self.0.push(Violation {
            property_path: property_path.to_string(),
            message: message.into(),
        });
    }

    fn not_blank(&mut self, property_path: &str, value: &str, message: &str) {
        if value.trim().is_empty() {
            self.add(property_path, message);
        }
    }

    fn max_length(&mut self, property_path: &str, value: &str, max: usize) {
        if value.chars().count() > max {
            self.add(
                property_path,
                format!("This value is too long. It should have {} characters or less.", max),
            );
        }
    }
}

pub trait Validate {
    fn validate(&self) -> ConstraintViolationList;
}

impl Validate for Book {
    fn validate(&self) -> ConstraintViolationList {
        let mut violations = ConstraintViolationList::default();
        violations.not_blank("title", &self.title, "The book title is required");
        violations.max_length("title", &self.title, TITLE_MAX_LEN);
        if let Some(cover_text) = &self.cover_text {
            violations.max_length("coverText", cover_text, COVER_TEXT_MAX_LEN);
        }
        violations
    }
}

impl Validate for Author {
    fn validate(&self) -> ConstraintViolationList {
        let mut violations = ConstraintViolationList::default();
        violations.not_blank("lastName", &self.last_name, "The author last name is required");
        violations.max_length("lastName", &self.last_name, NAME_MAX_LEN);
        violations.max_length("firstName", &self.first_name, NAME_MAX_LEN);
        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_book() {
        let mut book = Book::new("Excession");
        book.cover_text = Some("An Outside Context Problem".to_string());
        assert!(book.validate().is_empty());
    }

    #[test]
    fn test_blank_title() {
        let violations = Book::new("   ").validate();
        assert_eq!(violations.len(), 1);
        assert_eq!(
            serde_json::to_value(&violations).expect("Failed to serialize"),
            json!([{"propertyPath": "title", "message": "The book title is required"}])
        );
    }

    #[test]
    fn test_length_limits() {
        let mut book = Book::new("t".repeat(TITLE_MAX_LEN + 1));
        book.cover_text = Some("c".repeat(COVER_TEXT_MAX_LEN + 1));
        let paths: Vec<_> = book
            .validate()
            .iter()
            .map(|v| v.property_path.clone())
            .collect();
        assert_eq!(paths, vec!["title", "coverText"]);

        // Limits count characters, not bytes
        assert!(Book::new("é".repeat(TITLE_MAX_LEN)).validate().is_empty());
    }

    #[test]
    fn test_author_constraints() {
        assert!(Author::new("", "Banks").validate().is_empty());

        let violations = Author::new("Iain", "").validate();
        assert_eq!(
            violations.iter().next().map(|v| v.message.as_str()),
            Some("The author last name is required")
        );

        let violations = Author::new("f".repeat(NAME_MAX_LEN + 1), "Banks").validate();
        assert_eq!(
            violations.iter().next().map(|v| v.property_path.as_str()),
            Some("firstName")
        );
    }
}
