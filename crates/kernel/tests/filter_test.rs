#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Integration tests for filter sets and the query composer.
//!
//! Queries are composed through the public API and executed against the
//! in-memory catalog; the same composed values are rendered to SQL to
//! check the Postgres path sees identical conditions.

use folio_kernel::catalog::{CatalogStore, MemoryCatalog};
use folio_kernel::models::{NewAuthor, NewBook};
use folio_kernel::query::{
    Aggregate, Annotation, BOOKS_COUNT, CatalogQueryBuilder, ComposedQuery, Entity, FieldPath,
    FilterSet, ListEndpoint, Lookup, OrderingField, QueryError, QueryParams, author_filter_set,
    book_filter_set,
};
use folio_test_utils::{Library, library, shelf_counts};

async fn catalog(library: &Library) -> MemoryCatalog {
    let catalog = MemoryCatalog::new();
    for author in &library.authors {
        catalog
            .create_author(&NewAuthor::new(&author.name))
            .await
            .unwrap();
    }
    for book in &library.books {
        catalog
            .create_book(&NewBook::new(&book.title, book.publication_year, book.author))
            .await
            .unwrap();
    }
    catalog
}

async fn book_ids(catalog: &MemoryCatalog, params: QueryParams) -> Vec<i64> {
    let query = ListEndpoint::books().unwrap().compose(&params).unwrap();
    catalog
        .fetch_books(&query)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.book.id)
        .collect()
}

fn sorted(mut ids: Vec<i64>) -> Vec<i64> {
    ids.sort_unstable();
    ids
}

// =============================================================================
// Filter Set Tests
// =============================================================================

#[test]
fn book_filter_keys_are_declared_in_order() {
    let filters = book_filter_set().unwrap();
    let keys = filters.keys();

    assert_eq!(keys.first().map(String::as_str), Some("title"));
    assert_eq!(keys.last().map(String::as_str), Some("search"));
    for key in [
        "author__name",
        "publication_year__gt",
        "publication_year_range_min",
        "publication_year_range_max",
        "id__in",
    ] {
        assert!(keys.iter().any(|k| k == key), "missing {key}");
    }
}

#[test]
fn author_filter_keys() {
    let keys = author_filter_set().unwrap().keys();
    assert_eq!(
        keys,
        vec![
            "name",
            "name_exact",
            "name_startswith",
            "books_count",
            "books_count__gte",
            "books_count__lte",
        ]
    );
}

#[test]
fn duplicate_keys_fail_at_build() {
    let err = FilterSet::builder(Entity::Book)
        .range("year", FieldPath::field("publication_year"))
        .field("year_min", FieldPath::field("publication_year"), Lookup::GreaterOrEqual)
        .build()
        .unwrap_err();
    assert!(matches!(err, QueryError::Config(ref msg) if msg.contains("year_min")));
}

#[test]
fn lookup_must_fit_field_kind() {
    let err = FilterSet::builder(Entity::Book)
        .field("year", FieldPath::field("publication_year"), Lookup::Contains)
        .build()
        .unwrap_err();
    assert!(matches!(err, QueryError::Config(_)));

    let err = FilterSet::builder(Entity::Book)
        .search("q", [FieldPath::field("publication_year")])
        .build()
        .unwrap_err();
    assert!(matches!(err, QueryError::Config(_)));
}

#[test]
fn unknown_paths_fail_at_build() {
    let err = FilterSet::builder(Entity::Book)
        .field("isbn", FieldPath::field("isbn"), Lookup::Equal)
        .build()
        .unwrap_err();
    assert!(matches!(err, QueryError::Config(_)));

    let err = FilterSet::builder(Entity::Author)
        .field("publisher", FieldPath::related("publisher", "name"), Lookup::Equal)
        .build()
        .unwrap_err();
    assert!(matches!(err, QueryError::Config(_)));
}

#[test]
fn aggregates_need_a_to_many_relation() {
    let per_book = Annotation {
        name: "author_count",
        relation: "author",
        aggregate: Aggregate::Count,
    };
    let err = FilterSet::builder(Entity::Book)
        .aggregate("author_count", per_book, Lookup::GreaterOrEqual)
        .build()
        .unwrap_err();
    assert!(matches!(err, QueryError::Config(_)));

    let err = FilterSet::builder(Entity::Author)
        .aggregate("books_count", BOOKS_COUNT, Lookup::Contains)
        .build()
        .unwrap_err();
    assert!(matches!(err, QueryError::Config(_)));
}

#[test]
fn malformed_values_name_the_parameter() {
    let filters = book_filter_set().unwrap();
    for (key, value) in [
        ("publication_year__gte", "soon"),
        ("id__in", "1,two,3"),
        ("publication_year_range", "1990"),
        ("publication_year_range_max", "later"),
    ] {
        let err = filters
            .apply(
                ComposedQuery::new(Entity::Book),
                &QueryParams::new().with(key, value),
            )
            .unwrap_err();
        match err {
            QueryError::Validation { param, .. } => assert_eq!(param, key),
            other => panic!("expected a validation error for {key}, got {other:?}"),
        }
    }
}

#[test]
fn empty_values_add_no_conditions() {
    let filters = book_filter_set().unwrap();
    let query = filters
        .apply(
            ComposedQuery::new(Entity::Book),
            &QueryParams::new()
                .with("title", "")
                .with("publication_year__gte", " ")
                .with("id__in", ",,")
                .with("search", ""),
        )
        .unwrap();
    assert!(query.conditions.is_empty());

    let query = filters
        .apply(
            ComposedQuery::new(Entity::Book),
            &QueryParams::new().with("title_exact", ""),
        )
        .unwrap();
    assert_eq!(query.conditions.len(), 1);
}

#[test]
fn filter_set_rejects_other_entities() {
    let err = author_filter_set()
        .unwrap()
        .apply(ComposedQuery::new(Entity::Book), &QueryParams::new())
        .unwrap_err();
    assert!(matches!(err, QueryError::Config(_)));
}

// =============================================================================
// Composer Tests
// =============================================================================

#[test]
fn composing_twice_never_double_counts() {
    let authors = ListEndpoint::authors().unwrap();
    let params = QueryParams::new()
        .with("books_count__gte", "2")
        .with("books_count__lte", "5")
        .with("ordering", "-books_count");

    let first = authors.compose(&params).unwrap();
    let second = authors.compose(&params).unwrap();

    assert_eq!(first, second);
    assert_eq!(first.annotations, vec![BOOKS_COUNT]);
    assert_eq!(first.group_conditions().count(), 2);
    assert_eq!(first.row_conditions().count(), 0);
}

#[test]
fn endpoint_build_rejects_bad_configuration() {
    let err = ListEndpoint::builder(Entity::Author, book_filter_set().unwrap())
        .build()
        .unwrap_err();
    assert!(matches!(err, QueryError::Config(_)));

    let err = ListEndpoint::builder(Entity::Book, book_filter_set().unwrap())
        .ordering_field(OrderingField::field("title", FieldPath::field("title")))
        .default_ordering("publication_year")
        .build()
        .unwrap_err();
    assert!(matches!(err, QueryError::Config(ref msg) if msg.contains("publication_year")));

    let err = ListEndpoint::builder(Entity::Book, book_filter_set().unwrap())
        .prefetch_related("author")
        .build()
        .unwrap_err();
    assert!(matches!(err, QueryError::Config(_)));
}

#[test]
fn composed_sql_matches_memory_semantics() {
    let params = QueryParams::new()
        .with("search", "potter")
        .with("publication_year__lte", "1998")
        .with("ordering", "-publication_year");
    let query = ListEndpoint::books().unwrap().compose(&params).unwrap();
    let sql = CatalogQueryBuilder::new(&query).build().unwrap();

    assert!(sql.contains("\"book\".\"publication_year\" <= 1998"));
    assert!(sql.contains("LOWER(\"author\".\"name\") LIKE '%potter%'"));
    assert!(sql.contains("ORDER BY \"book\".\"publication_year\" DESC, \"book\".\"id\" ASC"));
}

// =============================================================================
// Store Execution Tests
// =============================================================================

#[tokio::test]
async fn conjunction_returns_rows_satisfying_every_filter() {
    let lib = library();
    let catalog = catalog(&lib).await;
    let params = QueryParams::new()
        .with("author__name", "beatrix")
        .with("publication_year__gte", "1903")
        .with("title_startswith", "The Tale");

    let ids = sorted(book_ids(&catalog, params).await);
    let expected: Vec<i64> = lib
        .books
        .iter()
        .enumerate()
        .filter(|(_, b)| {
            b.author == 4 && b.publication_year >= 1903 && b.title.starts_with("The Tale")
        })
        .map(|(i, _)| i as i64 + 1)
        .collect();
    assert_eq!(ids, expected);
    assert_eq!(ids, vec![12, 13]);
}

#[tokio::test]
async fn starts_with_is_case_sensitive() {
    let catalog = catalog(&library()).await;
    let ids = book_ids(&catalog, QueryParams::new().with("title_startswith", "the tale")).await;
    assert!(ids.is_empty());
}

#[tokio::test]
async fn exact_author_name() {
    let catalog = catalog(&library()).await;
    let ids = book_ids(
        &catalog,
        QueryParams::new().with("author__name_exact", "Jane Austen"),
    )
    .await;
    assert_eq!(sorted(ids), vec![9, 10]);
}

#[tokio::test]
async fn half_open_year_range() {
    let catalog = catalog(&library()).await;

    let ids = book_ids(&catalog, QueryParams::new().with("publication_year_range", "1998,")).await;
    assert_eq!(sorted(ids), vec![4, 5, 7]);

    let ids = book_ids(
        &catalog,
        QueryParams::new()
            .with("publication_year_range", "1800,1900")
            .with("publication_year_range_max", "1850"),
    )
    .await;
    assert_eq!(sorted(ids), vec![9, 10]);
}

#[tokio::test]
async fn aggregate_filter_over_zero_one_and_many() {
    let catalog = catalog(&shelf_counts()).await;

    assert_eq!(
        author_counts(&catalog, QueryParams::new().with("books_count__gte", "2")).await,
        vec![(3, Some(3))]
    );
    assert_eq!(
        author_counts(
            &catalog,
            QueryParams::new()
                .with("books_count__lte", "1")
                .with("ordering", "books_count"),
        )
        .await,
        vec![(1, Some(0)), (2, Some(1))]
    );
}

async fn author_counts(catalog: &MemoryCatalog, params: QueryParams) -> Vec<(i64, Option<i64>)> {
    let query = ListEndpoint::authors().unwrap().compose(&params).unwrap();
    catalog
        .fetch_authors(&query)
        .await
        .unwrap()
        .into_iter()
        .map(|a| (a.author.id, a.books_count))
        .collect()
}

#[tokio::test]
async fn count_matches_fetched_rows() {
    let catalog = catalog(&library()).await;
    let query = ListEndpoint::books()
        .unwrap()
        .compose(&QueryParams::new().with("search", "the"))
        .unwrap();

    let rows = catalog.fetch_books(&query).await.unwrap().len() as u64;
    assert_eq!(catalog.count(&query).await.unwrap(), rows);
    assert_eq!(catalog.count(&query.clone().with_limit(2)).await.unwrap(), rows);
}
