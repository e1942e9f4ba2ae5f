//! Book models.

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum stored title length.
pub const MAX_TITLE_LENGTH: usize = 200;

/// A stored book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub publication_year: i32,

    /// Owning author's id.
    #[serde(rename = "author")]
    pub author_id: i64,
}

/// A book together with its author's name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct BookRecord {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub book: Book,
    pub author_name: String,
}

/// Book fields nested under an author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct BookSummary {
    pub id: i64,
    pub title: String,
    pub publication_year: i32,
}

impl From<&Book> for BookSummary {
    fn from(book: &Book) -> Self {
        Self {
            id: book.id,
            title: book.title.clone(),
            publication_year: book.publication_year,
        }
    }
}

/// Number of books published in one year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct YearBucket {
    pub publication_year: i32,
    pub book_count: i64,
}

/// A single invalid input field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Request body for creating or updating a book.
///
/// Every field is optional so PATCH can send a subset; PUT and POST
/// require all of them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookInput {
    pub title: Option<String>,
    pub publication_year: Option<i32>,
    pub author: Option<i64>,
}

impl BookInput {
    /// Require every field.
    pub fn into_complete(self) -> Result<NewBook, FieldError> {
        let required = |field| FieldError::new(field, "This field is required.");
        Ok(NewBook {
            title: self.title.ok_or_else(|| required("title"))?,
            publication_year: self
                .publication_year
                .ok_or_else(|| required("publication_year"))?,
            author_id: self.author.ok_or_else(|| required("author"))?,
        })
    }

    /// Overlay the supplied fields onto `existing`.
    pub fn merge(self, existing: &Book) -> NewBook {
        NewBook {
            title: self.title.unwrap_or_else(|| existing.title.clone()),
            publication_year: self.publication_year.unwrap_or(existing.publication_year),
            author_id: self.author.unwrap_or(existing.author_id),
        }
    }
}

/// Validated values for inserting or replacing a book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBook {
    pub title: String,
    pub publication_year: i32,
    pub author_id: i64,
}

impl NewBook {
    pub fn new(title: impl Into<String>, publication_year: i32, author_id: i64) -> Self {
        Self {
            title: title.into(),
            publication_year,
            author_id,
        }
    }

    /// Check title and year against the current calendar year.
    pub fn validate(&self) -> Result<(), FieldError> {
        self.validate_for_year(chrono::Utc::now().year())
    }

    pub fn validate_for_year(&self, current_year: i32) -> Result<(), FieldError> {
        if self.title.trim().is_empty() {
            return Err(FieldError::new("title", "This field may not be blank."));
        }
        if self.title.chars().count() > MAX_TITLE_LENGTH {
            return Err(FieldError::new(
                "title",
                format!("Ensure this field has no more than {MAX_TITLE_LENGTH} characters."),
            ));
        }
        if self.publication_year > current_year {
            return Err(FieldError::new(
                "publication_year",
                "Publication year cannot be in the future.",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn stored() -> Book {
        Book {
            id: 7,
            title: "Emma".into(),
            publication_year: 1815,
            author_id: 5,
        }
    }

    #[test]
    fn book_serializes_author_id_as_author() {
        let json = serde_json::to_value(stored()).unwrap();
        assert_eq!(json["author"], 5);
        assert!(json.get("author_id").is_none());
    }

    #[test]
    fn record_flattens_book() {
        let record = BookRecord {
            book: stored(),
            author_name: "Jane Austen".into(),
        };
        let json = serde_json::to_value(record).unwrap();
        assert_eq!(json["title"], "Emma");
        assert_eq!(json["author_name"], "Jane Austen");
    }

    #[test]
    fn complete_input_requires_every_field() {
        let input = BookInput {
            title: Some("Emma".into()),
            publication_year: None,
            author: Some(5),
        };
        assert_eq!(input.into_complete().unwrap_err().field, "publication_year");
    }

    #[test]
    fn partial_input_merges_over_existing() {
        let input = BookInput {
            publication_year: Some(1816),
            ..Default::default()
        };
        let merged = input.merge(&stored());
        assert_eq!(merged, NewBook::new("Emma", 1816, 5));
    }

    #[test]
    fn future_year_is_rejected() {
        let err = NewBook::new("Later", 2031, 1)
            .validate_for_year(2030)
            .unwrap_err();
        assert_eq!(err.field, "publication_year");
        assert!(NewBook::new("Now", 2030, 1).validate_for_year(2030).is_ok());
    }

    #[test]
    fn title_length_is_bounded() {
        let long = "x".repeat(MAX_TITLE_LENGTH + 1);
        assert_eq!(
            NewBook::new(long, 1900, 1).validate_for_year(2030).unwrap_err().field,
            "title"
        );
        assert!(NewBook::new("   ", 1900, 1).validate_for_year(2030).is_err());
    }
}
