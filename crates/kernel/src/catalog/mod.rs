//! Catalog storage.
//!
//! Provides the [`CatalogStore`] trait the HTTP layer and reporter talk to,
//! with a Postgres implementation and an in-memory one used when no
//! database is configured and throughout the tests.

mod memory;
mod postgres;

pub use memory::MemoryCatalog;
pub use postgres::PgCatalog;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Author, AuthorRecord, Book, BookRecord, NewAuthor, NewBook, YearBucket};
use crate::query::{
    ComposedQuery, Entity, FieldPath, Lookup, Operand, Predicate, QueryError, Scalar,
};

/// Errors raised by a catalog store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A book referenced an author id with no row.
    #[error("author {0} does not exist")]
    MissingAuthor(i64),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("database error")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Executes composed queries and single-row writes.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Books matching `query`, each with its author's name.
    async fn fetch_books(&self, query: &ComposedQuery) -> StoreResult<Vec<BookRecord>>;

    /// Authors matching `query`, with requested annotations and prefetches.
    async fn fetch_authors(&self, query: &ComposedQuery) -> StoreResult<Vec<AuthorRecord>>;

    /// Number of rows `query` matches, ignoring ordering and limit.
    async fn count(&self, query: &ComposedQuery) -> StoreResult<u64>;

    /// Largest publication-year buckets.
    async fn year_buckets(&self, limit: u64) -> StoreResult<Vec<YearBucket>>;

    async fn create_author(&self, input: &NewAuthor) -> StoreResult<Author>;

    /// First author named exactly `name`, inserting one if none exists.
    ///
    /// Returns the author and whether it was created.
    async fn find_or_create_author(&self, name: &str) -> StoreResult<(Author, bool)>;

    /// Delete an author and, by cascade, all of its books.
    async fn delete_author(&self, id: i64) -> StoreResult<Option<Author>>;

    async fn create_book(&self, input: &NewBook) -> StoreResult<Book>;

    /// First book with identical title, year and author, inserting one if
    /// none exists.
    async fn find_or_create_book(&self, input: &NewBook) -> StoreResult<(Book, bool)>;

    /// Replace every field of a book. `None` when the id is unknown.
    async fn update_book(&self, id: i64, input: &NewBook) -> StoreResult<Option<Book>>;

    /// Delete a book, returning the removed row.
    async fn delete_book(&self, id: i64) -> StoreResult<Option<Book>>;

    /// Whether the backing store is reachable.
    async fn is_healthy(&self) -> bool;

    /// Look up one book with its author's name.
    async fn find_book(&self, id: i64) -> StoreResult<Option<BookRecord>> {
        let mut query = by_id(Entity::Book, id)?;
        query.select_related("author");
        Ok(self.fetch_books(&query).await?.into_iter().next())
    }

    /// Look up one author with nested books.
    async fn find_author(&self, id: i64) -> StoreResult<Option<AuthorRecord>> {
        let mut query = by_id(Entity::Author, id)?;
        query.prefetch_related("books");
        Ok(self.fetch_authors(&query).await?.into_iter().next())
    }
}

/// Single-row lookup query for `entity`.
pub fn by_id(entity: Entity, id: i64) -> Result<ComposedQuery, QueryError> {
    let mut query = ComposedQuery::new(entity);
    query.and_where(Predicate::compare(
        Operand::Column(FieldPath::field("id").resolve(entity)?),
        Lookup::Equal,
        Scalar::Int(id),
    ));
    Ok(query.with_limit(1))
}

/// Query for every book owned by `author_ids`, in id order.
pub(crate) fn books_of(author_ids: &[i64]) -> Result<ComposedQuery, QueryError> {
    let mut query = ComposedQuery::new(Entity::Book);
    query.and_where(Predicate::In {
        operand: Operand::Column(FieldPath::related("author", "id").resolve(Entity::Book)?),
        values: author_ids.iter().copied().map(Scalar::Int).collect(),
    });
    query.order_by(crate::query::OrderClause::asc(Operand::Column(
        FieldPath::field("id").resolve(Entity::Book)?,
    )));
    Ok(query)
}
