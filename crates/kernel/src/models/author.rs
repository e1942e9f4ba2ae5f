//! Author models.

use serde::{Deserialize, Serialize};

use super::book::{BookSummary, FieldError};

/// A stored author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Author {
    pub id: i64,
    pub name: String,
}

/// An author as returned by listings and detail lookups.
///
/// Aggregates are present only when the query computed them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorRecord {
    #[serde(flatten)]
    pub author: Author,

    /// Number of books by this author.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub books_count: Option<i64>,

    /// Most recent publication year, `None` when the author has no books.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_book_year: Option<i32>,

    /// Books by this author, filled when prefetched.
    pub books: Vec<BookSummary>,
}

impl AuthorRecord {
    pub fn new(author: Author) -> Self {
        Self {
            author,
            books_count: None,
            latest_book_year: None,
            books: Vec::new(),
        }
    }
}

/// Input for creating an author.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAuthor {
    pub name: String,
}

impl NewAuthor {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn validate(&self) -> Result<(), FieldError> {
        if self.name.trim().is_empty() {
            return Err(FieldError::new("name", "This field may not be blank."));
        }
        Ok(())
    }
}
