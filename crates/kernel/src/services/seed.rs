//! Sample catalog data.

use tracing::info;

use crate::catalog::{CatalogStore, StoreResult};
use crate::models::NewBook;

const AUTHORS: [&str; 5] = [
    "George Orwell",
    "J.K. Rowling",
    "Harper Lee",
    "F. Scott Fitzgerald",
    "Jane Austen",
];

/// `(title, publication_year, index into AUTHORS)`.
const BOOKS: [(&str, i32, usize); 8] = [
    ("1984", 1949, 0),
    ("Animal Farm", 1945, 0),
    ("Harry Potter and the Philosopher's Stone", 1997, 1),
    ("Harry Potter and the Chamber of Secrets", 1998, 1),
    ("To Kill a Mockingbird", 1960, 2),
    ("The Great Gatsby", 1925, 3),
    ("Pride and Prejudice", 1813, 4),
    ("Emma", 1815, 4),
];

/// Rows touched by [`populate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SeedReport {
    pub authors_created: usize,
    pub books_created: usize,
}

/// Insert the sample authors and books, skipping rows that already exist.
pub async fn populate(store: &dyn CatalogStore) -> StoreResult<SeedReport> {
    info!("creating sample authors and books");
    let mut report = SeedReport::default();

    let mut authors = Vec::with_capacity(AUTHORS.len());
    for name in AUTHORS {
        let (author, created) = store.find_or_create_author(name).await?;
        if created {
            report.authors_created += 1;
            info!(author = %author.name, "created author");
        } else {
            info!(author = %author.name, "author already exists");
        }
        authors.push(author);
    }

    for (title, year, index) in BOOKS {
        let Some(author) = authors.get(index) else {
            continue;
        };
        let (book, created) = store
            .find_or_create_book(&NewBook::new(title, year, author.id))
            .await?;
        if created {
            report.books_created += 1;
            info!(book = %book.title, author = %author.name, "created book");
        } else {
            info!(book = %book.title, author = %author.name, "book already exists");
        }
    }

    info!(
        authors = authors.len(),
        books = BOOKS.len(),
        "populated catalog with sample data"
    );
    Ok(report)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::query::{ComposedQuery, Entity};

    #[tokio::test]
    async fn populate_is_idempotent() {
        let catalog = MemoryCatalog::new();

        let first = populate(&catalog).await.unwrap();
        assert_eq!(
            first,
            SeedReport {
                authors_created: 5,
                books_created: 8
            }
        );

        let second = populate(&catalog).await.unwrap();
        assert_eq!(second, SeedReport::default());

        let books = catalog.count(&ComposedQuery::new(Entity::Book)).await.unwrap();
        assert_eq!(books, 8);
    }
}
