//! PostgreSQL catalog store.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::debug;

use super::{CatalogStore, StoreError, StoreResult, books_of};
use crate::db;
use crate::models::{
    Author, AuthorRecord, Book, BookRecord, BookSummary, NewAuthor, NewBook, YearBucket,
};
use crate::query::{Aggregate, CatalogQueryBuilder, ComposedQuery, Entity, QueryError};

/// Postgres foreign-key violation.
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Catalog backed by a Postgres pool.
#[derive(Debug, Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn author_exists(&self, id: i64) -> StoreResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM author WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn require_author(&self, id: i64) -> StoreResult<()> {
        if self.author_exists(id).await? {
            Ok(())
        } else {
            Err(StoreError::MissingAuthor(id))
        }
    }

    /// Nested book summaries keyed by author id.
    async fn prefetch_books(&self, author_ids: &[i64]) -> StoreResult<HashMap<i64, Vec<BookSummary>>> {
        let sql = CatalogQueryBuilder::new(&books_of(author_ids)?).build()?;
        debug!(sql = %sql, "prefetching books");

        let books: Vec<Book> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        let mut grouped: HashMap<i64, Vec<BookSummary>> = HashMap::new();
        for book in &books {
            grouped
                .entry(book.author_id)
                .or_default()
                .push(BookSummary::from(book));
        }
        Ok(grouped)
    }
}

fn check_entity(query: &ComposedQuery, entity: Entity) -> StoreResult<()> {
    if query.entity == entity {
        Ok(())
    } else {
        Err(QueryError::Config(format!("{} query executed as a {entity} fetch", query.entity)).into())
    }
}

/// Map a foreign-key violation on `author_id` to a missing author.
fn missing_author(err: sqlx::Error, author_id: i64) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err
        && db_err.code().as_deref() == Some(FOREIGN_KEY_VIOLATION)
    {
        return StoreError::MissingAuthor(author_id);
    }
    StoreError::Database(err)
}

#[async_trait]
impl CatalogStore for PgCatalog {
    async fn fetch_books(&self, query: &ComposedQuery) -> StoreResult<Vec<BookRecord>> {
        check_entity(query, Entity::Book)?;

        // Records always carry the author's name.
        let mut query = query.clone();
        query.select_related("author");

        let sql = CatalogQueryBuilder::new(&query).build()?;
        debug!(sql = %sql, "fetching books");

        let books = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        Ok(books)
    }

    async fn fetch_authors(&self, query: &ComposedQuery) -> StoreResult<Vec<AuthorRecord>> {
        check_entity(query, Entity::Author)?;

        let sql = CatalogQueryBuilder::new(query).build()?;
        debug!(sql = %sql, "fetching authors");

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let mut record = AuthorRecord::new(Author {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
            });
            for annotation in &query.annotations {
                match annotation.aggregate {
                    Aggregate::Count => {
                        record.books_count = Some(row.try_get(annotation.name)?);
                    }
                    Aggregate::Max(_) => {
                        record.latest_book_year = row.try_get(annotation.name)?;
                    }
                }
            }
            records.push(record);
        }

        if query.prefetch_related.contains(&"books") && !records.is_empty() {
            let ids: Vec<i64> = records.iter().map(|r| r.author.id).collect();
            let mut books = self.prefetch_books(&ids).await?;
            for record in &mut records {
                record.books = books.remove(&record.author.id).unwrap_or_default();
            }
        }

        Ok(records)
    }

    async fn count(&self, query: &ComposedQuery) -> StoreResult<u64> {
        let sql = CatalogQueryBuilder::new(query).build_count()?;
        debug!(sql = %sql, "counting rows");

        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn year_buckets(&self, limit: u64) -> StoreResult<Vec<YearBucket>> {
        let sql = CatalogQueryBuilder::year_buckets(limit);
        let buckets = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        Ok(buckets)
    }

    async fn create_author(&self, input: &NewAuthor) -> StoreResult<Author> {
        let author = sqlx::query_as("INSERT INTO author (name) VALUES ($1) RETURNING id, name")
            .bind(&input.name)
            .fetch_one(&self.pool)
            .await?;
        Ok(author)
    }

    async fn find_or_create_author(&self, name: &str) -> StoreResult<(Author, bool)> {
        let existing: Option<Author> =
            sqlx::query_as("SELECT id, name FROM author WHERE name = $1 ORDER BY id LIMIT 1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        if let Some(author) = existing {
            return Ok((author, false));
        }
        let author = self.create_author(&NewAuthor::new(name)).await?;
        Ok((author, true))
    }

    async fn delete_author(&self, id: i64) -> StoreResult<Option<Author>> {
        // book.author_id cascades.
        let author = sqlx::query_as("DELETE FROM author WHERE id = $1 RETURNING id, name")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(author)
    }

    async fn create_book(&self, input: &NewBook) -> StoreResult<Book> {
        self.require_author(input.author_id).await?;
        sqlx::query_as(
            "INSERT INTO book (title, publication_year, author_id) VALUES ($1, $2, $3) \
             RETURNING id, title, publication_year, author_id",
        )
        .bind(&input.title)
        .bind(input.publication_year)
        .bind(input.author_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| missing_author(e, input.author_id))
    }

    async fn find_or_create_book(&self, input: &NewBook) -> StoreResult<(Book, bool)> {
        let existing: Option<Book> = sqlx::query_as(
            "SELECT id, title, publication_year, author_id FROM book \
             WHERE title = $1 AND publication_year = $2 AND author_id = $3 \
             ORDER BY id LIMIT 1",
        )
        .bind(&input.title)
        .bind(input.publication_year)
        .bind(input.author_id)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(book) = existing {
            return Ok((book, false));
        }
        Ok((self.create_book(input).await?, true))
    }

    async fn update_book(&self, id: i64, input: &NewBook) -> StoreResult<Option<Book>> {
        self.require_author(input.author_id).await?;
        sqlx::query_as(
            "UPDATE book SET title = $1, publication_year = $2, author_id = $3 WHERE id = $4 \
             RETURNING id, title, publication_year, author_id",
        )
        .bind(&input.title)
        .bind(input.publication_year)
        .bind(input.author_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| missing_author(e, input.author_id))
    }

    async fn delete_book(&self, id: i64) -> StoreResult<Option<Book>> {
        let book = sqlx::query_as(
            "DELETE FROM book WHERE id = $1 RETURNING id, title, publication_year, author_id",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(book)
    }

    async fn is_healthy(&self) -> bool {
        db::check_health(&self.pool).await
    }
}
