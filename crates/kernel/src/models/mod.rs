//! Catalog models.

pub mod author;
pub mod book;

pub use author::{Author, AuthorRecord, NewAuthor};
pub use book::{Book, BookInput, BookRecord, BookSummary, FieldError, NewBook, YearBucket};
