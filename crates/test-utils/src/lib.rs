//! Folio test utilities.
//!
//! Helpers for integration testing: catalog fixtures, request body
//! builders, and assertion utilities for JSON responses.
//!
//! Fixture ids assume a fresh store that numbers rows from 1 in insertion
//! order, which is how the in-memory catalog behaves.

use serde_json::{Value as JsonValue, json};

/// Create a test author.
pub fn test_author(name: &str) -> TestAuthor {
    TestAuthor {
        name: name.to_string(),
    }
}

/// An author fixture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestAuthor {
    pub name: String,
}

impl TestAuthor {
    /// Body for `POST /authors/create/`.
    pub fn to_json(&self) -> JsonValue {
        json!({ "name": self.name })
    }
}

/// Create a test book owned by `author`.
pub fn test_book(title: &str, publication_year: i32, author: i64) -> TestBook {
    TestBook {
        title: title.to_string(),
        publication_year,
        author,
    }
}

/// A book fixture builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestBook {
    pub title: String,
    pub publication_year: i32,
    pub author: i64,
}

impl TestBook {
    /// Set the publication year.
    pub fn with_year(mut self, publication_year: i32) -> Self {
        self.publication_year = publication_year;
        self
    }

    /// Set the owning author id.
    pub fn with_author(mut self, author: i64) -> Self {
        self.author = author;
        self
    }

    /// Body for `POST /books/create/` and `PUT /books/update/{id}/`.
    pub fn to_json(&self) -> JsonValue {
        json!({
            "title": self.title,
            "publication_year": self.publication_year,
            "author": self.author,
        })
    }
}

/// A set of authors and books to load in order.
#[derive(Debug, Clone, Default)]
pub struct Library {
    pub authors: Vec<TestAuthor>,
    pub books: Vec<TestBook>,
}

impl Library {
    /// Id the first book titled `title` receives when loaded.
    pub fn book_id(&self, title: &str) -> Option<i64> {
        self.books
            .iter()
            .position(|b| b.title == title)
            .map(|i| i as i64 + 1)
    }

    /// Id the author named `name` receives when loaded.
    pub fn author_id(&self, name: &str) -> Option<i64> {
        self.authors
            .iter()
            .position(|a| a.name == name)
            .map(|i| i as i64 + 1)
    }
}

/// Six authors and thirteen books spanning 1813 to 2015.
///
/// Ids, in load order:
///
/// | id | title                                    | year | author |
/// |----|------------------------------------------|------|--------|
/// | 1  | 1984                                     | 1949 | 1      |
/// | 2  | Animal Farm                              | 1945 | 1      |
/// | 3  | Harry Potter and the Philosopher's Stone | 1997 | 2      |
/// | 4  | Harry Potter and the Chamber of Secrets  | 1998 | 2      |
/// | 5  | Harry Potter and the Prisoner of Azkaban | 1999 | 2      |
/// | 6  | To Kill a Mockingbird                    | 1960 | 3      |
/// | 7  | Go Set a Watchman                        | 2015 | 3      |
/// | 8  | The Tale of Peter Rabbit                 | 1902 | 4      |
/// | 9  | Pride and Prejudice                      | 1813 | 5      |
/// | 10 | Emma                                     | 1815 | 5      |
/// | 11 | The Wonderful Wizard of Oz               | 1900 | 6      |
/// | 12 | The Tale of Squirrel Nutkin              | 1903 | 4      |
/// | 13 | The Tale of Benjamin Bunny               | 1904 | 4      |
pub fn library() -> Library {
    let authors = [
        "George Orwell",
        "J.K. Rowling",
        "Harper Lee",
        "Beatrix Potter",
        "Jane Austen",
        "L. Frank Baum",
    ];
    let books = [
        ("1984", 1949, 1),
        ("Animal Farm", 1945, 1),
        ("Harry Potter and the Philosopher's Stone", 1997, 2),
        ("Harry Potter and the Chamber of Secrets", 1998, 2),
        ("Harry Potter and the Prisoner of Azkaban", 1999, 2),
        ("To Kill a Mockingbird", 1960, 3),
        ("Go Set a Watchman", 2015, 3),
        ("The Tale of Peter Rabbit", 1902, 4),
        ("Pride and Prejudice", 1813, 5),
        ("Emma", 1815, 5),
        ("The Wonderful Wizard of Oz", 1900, 6),
        ("The Tale of Squirrel Nutkin", 1903, 4),
        ("The Tale of Benjamin Bunny", 1904, 4),
    ];

    Library {
        authors: authors.iter().map(|name| test_author(name)).collect(),
        books: books
            .iter()
            .map(|&(title, year, author)| test_book(title, year, author))
            .collect(),
    }
}

/// Three authors owning zero, one and three books.
pub fn shelf_counts() -> Library {
    Library {
        authors: vec![
            test_author("Empty Shelf"),
            test_author("Single Shelf"),
            test_author("Full Shelf"),
        ],
        books: vec![
            test_book("Only", 2001, 2),
            test_book("First", 1990, 3),
            test_book("Second", 1995, 3),
            test_book("Third", 2010, 3),
        ],
    }
}

/// Assertion helpers for JSON responses.
pub mod assert {
    use std::collections::BTreeSet;

    use serde_json::Value;

    /// Assert that a JSON value has a specific key.
    pub fn has_key(value: &Value, key: &str) {
        assert!(
            value.get(key).is_some(),
            "Expected JSON to have key '{key}', got: {value}"
        );
    }

    /// Assert that a string contains a substring.
    pub fn contains(haystack: &str, needle: &str) {
        assert!(
            haystack.contains(needle),
            "Expected string to contain '{needle}'\nActual: {haystack}"
        );
    }

    /// The `id` of every object in a JSON array, in order.
    pub fn ids(value: &Value) -> Vec<i64> {
        value
            .as_array()
            .unwrap_or_else(|| panic!("Expected a JSON array, got: {value}"))
            .iter()
            .map(|row| {
                row["id"]
                    .as_i64()
                    .unwrap_or_else(|| panic!("Expected an integer id in: {row}"))
            })
            .collect()
    }

    /// Assert the array holds exactly `expected` ids, in any order.
    pub fn id_set(value: &Value, expected: &[i64]) {
        let actual: BTreeSet<i64> = ids(value).into_iter().collect();
        let expected: BTreeSet<i64> = expected.iter().copied().collect();
        assert_eq!(actual, expected, "id mismatch in: {value}");
    }

    /// Assert an error body names `field`.
    pub fn field_error(value: &Value, field: &str) {
        assert_eq!(
            value["field"], field,
            "Expected an error on '{field}', got: {value}"
        );
        has_key(value, "error");
    }
}
