//! Aggregation reporter: cross-entity statistics.
//!
//! Every call composes its own queries and reads current store state; no
//! results are cached between calls.

use serde::Serialize;
use tracing::debug;

use crate::catalog::{CatalogStore, StoreResult};
use crate::models::{BookRecord, BookSummary, YearBucket};
use crate::query::{
    BOOKS_COUNT, ComposedQuery, Entity, FieldPath, FilterSet, LATEST_BOOK_YEAR, Lookup, Operand,
    OrderClause, QueryError, QueryParams,
};

/// Rows in each summary table.
const TOP_N: u64 = 5;

/// Search results returned when no `limit` is given.
pub const DEFAULT_SEARCH_LIMIT: u64 = 20;

/// Upper bound on `limit`.
pub const MAX_SEARCH_LIMIT: u64 = 100;

/// Global catalog statistics.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogSummary {
    pub total_books: u64,
    pub total_authors: u64,
    pub books_by_year: Vec<YearBucket>,
    pub top_authors: Vec<AuthorStat>,
    pub recent_books: Vec<BookRecord>,
}

/// An author with its book count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorStat {
    pub id: i64,
    pub name: String,
    pub book_count: i64,
}

/// One row of the author analytics report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorAnalytics {
    pub id: i64,
    pub name: String,
    pub book_count: i64,
    pub latest_book_year: Option<i32>,
    pub books: Vec<BookSummary>,
}

/// Sort keys accepted by [`Reporter::author_analytics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AnalyticsSort {
    Name,
    BookCount,
    LatestBook,
}

impl AnalyticsSort {
    fn parse(raw: Option<&str>) -> Result<Self, QueryError> {
        match raw.map(str::trim) {
            None | Some("") | Some("name") => Ok(Self::Name),
            Some("book_count") => Ok(Self::BookCount),
            Some("latest_book") => Ok(Self::LatestBook),
            Some(other) => Err(QueryError::validation(
                "sort_by",
                format!("expected one of name, book_count, latest_book; got '{other}'"),
            )),
        }
    }
}

/// Computes the statistics endpoints.
#[derive(Debug, Clone)]
pub struct Reporter {
    search_filters: FilterSet,
    analytics_filters: FilterSet,
}

impl Reporter {
    pub fn new() -> Result<Self, QueryError> {
        let search_filters = FilterSet::builder(Entity::Book)
            .search(
                "term",
                [FieldPath::field("title"), FieldPath::related("author", "name")],
            )
            .field(
                "year_min",
                FieldPath::field("publication_year"),
                Lookup::GreaterOrEqual,
            )
            .field(
                "year_max",
                FieldPath::field("publication_year"),
                Lookup::LessOrEqual,
            )
            .field("author_id", FieldPath::related("author", "id"), Lookup::Equal)
            .build()?;

        let analytics_filters = FilterSet::builder(Entity::Author)
            .aggregate("min_books", BOOKS_COUNT, Lookup::GreaterOrEqual)
            .build()?;

        Ok(Self {
            search_filters,
            analytics_filters,
        })
    }

    /// Totals plus the top-5 tables.
    pub async fn summary(&self, store: &dyn CatalogStore) -> StoreResult<CatalogSummary> {
        let total_books = store.count(&ComposedQuery::new(Entity::Book)).await?;
        let total_authors = store.count(&ComposedQuery::new(Entity::Author)).await?;
        let books_by_year = store.year_buckets(TOP_N).await?;

        let mut top = ComposedQuery::new(Entity::Author);
        top.ensure_annotation(BOOKS_COUNT);
        top.order_by(OrderClause::desc(Operand::Annotation(BOOKS_COUNT)));
        top.order_by(OrderClause::asc(column(Entity::Author, "name")?));
        top.order_by(OrderClause::asc(column(Entity::Author, "id")?));
        let top_authors = store
            .fetch_authors(&top.with_limit(TOP_N))
            .await?
            .into_iter()
            .map(|record| AuthorStat {
                id: record.author.id,
                name: record.author.name,
                book_count: record.books_count.unwrap_or_default(),
            })
            .collect();

        let mut recent = ComposedQuery::new(Entity::Book);
        recent.select_related("author");
        recent.order_by(OrderClause::desc(column(Entity::Book, "publication_year")?));
        recent.order_by(OrderClause::asc(column(Entity::Book, "id")?));
        let recent_books = store.fetch_books(&recent.with_limit(TOP_N)).await?;

        Ok(CatalogSummary {
            total_books,
            total_authors,
            books_by_year,
            top_authors,
            recent_books,
        })
    }

    /// Books matching `term`, year bounds and author, newest first.
    pub async fn search(
        &self,
        store: &dyn CatalogStore,
        params: &QueryParams,
    ) -> StoreResult<Vec<BookRecord>> {
        let limit = search_limit(params.get("limit"))?;

        let mut query = self
            .search_filters
            .apply(ComposedQuery::new(Entity::Book), params)?;
        query.select_related("author");
        query.order_by(OrderClause::desc(column(Entity::Book, "publication_year")?));
        query.order_by(OrderClause::asc(column(Entity::Book, "id")?));
        debug!(conditions = query.conditions.len(), limit, "reporter search");

        store.fetch_books(&query.with_limit(limit)).await
    }

    /// Authors with at least `min_books` books, with nested summaries.
    pub async fn author_analytics(
        &self,
        store: &dyn CatalogStore,
        params: &QueryParams,
    ) -> StoreResult<Vec<AuthorAnalytics>> {
        let sort = AnalyticsSort::parse(params.get("sort_by"))?;
        let min_books = params
            .get("min_books")
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or("1");
        let threshold = QueryParams::new().with("min_books", min_books);

        let mut query = self
            .analytics_filters
            .apply(ComposedQuery::new(Entity::Author), &threshold)?;
        query.ensure_annotation(BOOKS_COUNT);
        query.ensure_annotation(LATEST_BOOK_YEAR);
        match sort {
            AnalyticsSort::Name => {}
            AnalyticsSort::BookCount => {
                query.order_by(OrderClause::desc(Operand::Annotation(BOOKS_COUNT)));
            }
            AnalyticsSort::LatestBook => {
                query.order_by(OrderClause::desc(Operand::Annotation(LATEST_BOOK_YEAR)).nulls_last());
            }
        }
        query.order_by(OrderClause::asc(column(Entity::Author, "name")?));
        query.order_by(OrderClause::asc(column(Entity::Author, "id")?));
        query.prefetch_related("books");
        debug!(sort = ?sort, "author analytics");

        Ok(store
            .fetch_authors(&query)
            .await?
            .into_iter()
            .map(|record| AuthorAnalytics {
                id: record.author.id,
                name: record.author.name,
                book_count: record.books_count.unwrap_or_default(),
                latest_book_year: record.latest_book_year,
                books: record.books,
            })
            .collect())
    }
}

fn column(entity: Entity, field: &'static str) -> Result<Operand, QueryError> {
    Ok(Operand::Column(FieldPath::field(field).resolve(entity)?))
}

fn search_limit(raw: Option<&str>) -> Result<u64, QueryError> {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(DEFAULT_SEARCH_LIMIT);
    };
    match raw.parse::<u64>() {
        Ok(limit) if limit >= 1 => Ok(limit.min(MAX_SEARCH_LIMIT)),
        _ => Err(QueryError::validation(
            "limit",
            format!("expected a positive integer, got '{raw}'"),
        )),
    }
}
