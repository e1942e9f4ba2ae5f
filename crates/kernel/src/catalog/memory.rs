//! In-memory catalog store.
//!
//! Evaluates composed queries directly over two ordered maps. Comparisons
//! involving a missing value (an aggregate over no rows) are false, and
//! missing values sort after present ones unless the clause says otherwise.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{CatalogStore, StoreError, StoreResult, books_of};
use crate::models::{
    Author, AuthorRecord, Book, BookRecord, BookSummary, NewAuthor, NewBook, YearBucket,
};
use crate::query::schema::Cardinality;
use crate::query::{
    Aggregate, Annotation, ComposedQuery, Entity, Lookup, NullsOrder, Operand, Predicate,
    QueryError, ResolvedField, Scalar, SortDirection,
};

#[derive(Debug, Default)]
struct Tables {
    authors: BTreeMap<i64, Author>,
    books: BTreeMap<i64, Book>,
    next_author_id: i64,
    next_book_id: i64,
}

/// Catalog held in process memory.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    tables: RwLock<Tables>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Tables {
    fn insert_author(&mut self, name: &str) -> Author {
        self.next_author_id += 1;
        let author = Author {
            id: self.next_author_id,
            name: name.to_string(),
        };
        self.authors.insert(author.id, author.clone());
        author
    }

    fn insert_book(&mut self, input: &NewBook) -> StoreResult<Book> {
        self.require_author(input.author_id)?;
        self.next_book_id += 1;
        let book = Book {
            id: self.next_book_id,
            title: input.title.clone(),
            publication_year: input.publication_year,
            author_id: input.author_id,
        };
        self.books.insert(book.id, book.clone());
        Ok(book)
    }

    fn require_author(&self, id: i64) -> StoreResult<()> {
        if self.authors.contains_key(&id) {
            Ok(())
        } else {
            Err(StoreError::MissingAuthor(id))
        }
    }

    /// Ids of `entity` rows satisfying `query`, ordered and limited.
    fn select(&self, query: &ComposedQuery, entity: Entity) -> StoreResult<Vec<i64>> {
        if query.entity != entity {
            return Err(QueryError::Config(format!(
                "{} query executed as a {entity} fetch",
                query.entity
            ))
            .into());
        }

        let ids: Vec<i64> = match entity {
            Entity::Author => self.authors.keys().copied().collect(),
            Entity::Book => self.books.keys().copied().collect(),
        };

        let mut rows: Vec<Row<'_>> = ids
            .into_iter()
            .map(|id| Row {
                tables: self,
                entity,
                id,
            })
            .filter(|row| query.conditions.iter().all(|p| row.satisfies(p)))
            .collect();

        // Stable sort keeps id order for equal keys.
        rows.sort_by(|a, b| {
            for clause in &query.ordering {
                let ordering = compare_nullable(
                    a.operand(&clause.target),
                    b.operand(&clause.target),
                    clause.direction,
                    clause.nulls,
                );
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });

        let limit = query
            .limit
            .and_then(|l| usize::try_from(l).ok())
            .unwrap_or(usize::MAX);
        Ok(rows.into_iter().take(limit).map(|row| row.id).collect())
    }

    fn book_record(&self, book: &Book) -> BookRecord {
        BookRecord {
            book: book.clone(),
            author_name: self
                .authors
                .get(&book.author_id)
                .map(|a| a.name.clone())
                .unwrap_or_default(),
        }
    }
}

/// One row viewed through the schema.
struct Row<'a> {
    tables: &'a Tables,
    entity: Entity,
    id: i64,
}

impl Row<'_> {
    fn satisfies(&self, predicate: &Predicate) -> bool {
        match predicate {
            Predicate::Compare {
                operand,
                lookup,
                value,
            } => self
                .operand(operand)
                .is_some_and(|actual| matches_lookup(&actual, *lookup, value)),
            Predicate::In { operand, values } => self
                .operand(operand)
                .is_some_and(|actual| values.contains(&actual)),
            Predicate::Any(parts) => parts.iter().any(|p| self.satisfies(p)),
            Predicate::All(parts) => parts.iter().all(|p| self.satisfies(p)),
        }
    }

    fn operand(&self, operand: &Operand) -> Option<Scalar> {
        match operand {
            Operand::Column(field) => self.column(field),
            Operand::Annotation(annotation) => self.annotation(annotation),
        }
    }

    fn column(&self, field: &ResolvedField) -> Option<Scalar> {
        let Some(relation) = field.relation else {
            return self.tables.column(self.entity, self.id, field.column);
        };
        let relation = self.entity.schema().relation(relation)?;
        let Cardinality::ToOne { local_column } = relation.cardinality else {
            return None;
        };
        let target_id = self
            .tables
            .column(self.entity, self.id, local_column)?
            .as_i64()?;
        self.tables.column(relation.target, target_id, field.column)
    }

    fn annotation(&self, annotation: &Annotation) -> Option<Scalar> {
        let relation = self.entity.schema().relation(annotation.relation)?;
        let Cardinality::ToMany { foreign_column } = relation.cardinality else {
            return None;
        };
        let related = self.tables.related_ids(relation.target, foreign_column, self.id);
        match annotation.aggregate {
            Aggregate::Count => i64::try_from(related.len()).ok().map(Scalar::Int),
            Aggregate::Max(field) => related
                .iter()
                .filter_map(|&id| self.tables.column(relation.target, id, field)?.as_i64())
                .max()
                .map(Scalar::Int),
        }
    }
}

impl Tables {
    fn column(&self, entity: Entity, id: i64, column: &str) -> Option<Scalar> {
        match entity {
            Entity::Author => {
                let author = self.authors.get(&id)?;
                match column {
                    "id" => Some(Scalar::Int(author.id)),
                    "name" => Some(Scalar::Text(author.name.clone())),
                    _ => None,
                }
            }
            Entity::Book => {
                let book = self.books.get(&id)?;
                match column {
                    "id" => Some(Scalar::Int(book.id)),
                    "title" => Some(Scalar::Text(book.title.clone())),
                    "publication_year" => Some(Scalar::Int(i64::from(book.publication_year))),
                    "author_id" => Some(Scalar::Int(book.author_id)),
                    _ => None,
                }
            }
        }
    }

    /// Ids of `entity` rows whose `column` equals `owner`.
    fn related_ids(&self, entity: Entity, column: &str, owner: i64) -> Vec<i64> {
        let ids: Vec<i64> = match entity {
            Entity::Author => self.authors.keys().copied().collect(),
            Entity::Book => self.books.keys().copied().collect(),
        };
        ids.into_iter()
            .filter(|&id| self.column(entity, id, column) == Some(Scalar::Int(owner)))
            .collect()
    }
}

fn matches_lookup(actual: &Scalar, lookup: Lookup, expected: &Scalar) -> bool {
    match lookup {
        Lookup::Equal => actual == expected,
        Lookup::Contains => match (actual, expected) {
            (Scalar::Text(a), Scalar::Text(e)) => a.to_lowercase().contains(&e.to_lowercase()),
            _ => false,
        },
        Lookup::StartsWith => match (actual, expected) {
            (Scalar::Text(a), Scalar::Text(e)) => a.starts_with(e.as_str()),
            _ => false,
        },
        Lookup::GreaterThan => compare(actual, expected) == Some(Ordering::Greater),
        Lookup::GreaterOrEqual => compare(actual, expected).is_some_and(Ordering::is_ge),
        Lookup::LessThan => compare(actual, expected) == Some(Ordering::Less),
        Lookup::LessOrEqual => compare(actual, expected).is_some_and(Ordering::is_le),
        Lookup::In => actual == expected,
    }
}

fn compare(a: &Scalar, b: &Scalar) -> Option<Ordering> {
    match (a, b) {
        (Scalar::Int(a), Scalar::Int(b)) => Some(a.cmp(b)),
        (Scalar::Text(a), Scalar::Text(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn compare_nullable(
    a: Option<Scalar>,
    b: Option<Scalar>,
    direction: SortDirection,
    nulls: Option<NullsOrder>,
) -> Ordering {
    let nulls = nulls.unwrap_or(match direction {
        SortDirection::Asc => NullsOrder::Last,
        SortDirection::Desc => NullsOrder::First,
    });
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => match nulls {
            NullsOrder::First => Ordering::Less,
            NullsOrder::Last => Ordering::Greater,
        },
        (Some(_), None) => match nulls {
            NullsOrder::First => Ordering::Greater,
            NullsOrder::Last => Ordering::Less,
        },
        (Some(a), Some(b)) => {
            let ordering = compare(&a, &b).unwrap_or(Ordering::Equal);
            match direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        }
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn fetch_books(&self, query: &ComposedQuery) -> StoreResult<Vec<BookRecord>> {
        let tables = self.tables.read();
        let ids = tables.select(query, Entity::Book)?;
        Ok(ids
            .iter()
            .filter_map(|id| tables.books.get(id))
            .map(|book| tables.book_record(book))
            .collect())
    }

    async fn fetch_authors(&self, query: &ComposedQuery) -> StoreResult<Vec<AuthorRecord>> {
        let tables = self.tables.read();
        let ids = tables.select(query, Entity::Author)?;

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(author) = tables.authors.get(&id) else {
                continue;
            };
            let row = Row {
                tables: &tables,
                entity: Entity::Author,
                id,
            };
            let mut record = AuthorRecord::new(author.clone());
            for annotation in &query.annotations {
                let value = row.annotation(annotation);
                match annotation.aggregate {
                    Aggregate::Count => record.books_count = value.and_then(|v| v.as_i64()),
                    Aggregate::Max(_) => {
                        record.latest_book_year = value
                            .and_then(|v| v.as_i64())
                            .and_then(|y| i32::try_from(y).ok());
                    }
                }
            }
            records.push(record);
        }

        if query.prefetch_related.contains(&"books") && !records.is_empty() {
            let owners: Vec<i64> = records.iter().map(|r| r.author.id).collect();
            let book_ids = tables.select(&books_of(&owners)?, Entity::Book)?;
            for book in book_ids.iter().filter_map(|id| tables.books.get(id)) {
                if let Some(record) = records.iter_mut().find(|r| r.author.id == book.author_id) {
                    record.books.push(BookSummary::from(book));
                }
            }
        }

        Ok(records)
    }

    async fn count(&self, query: &ComposedQuery) -> StoreResult<u64> {
        let mut unbounded = query.clone();
        unbounded.limit = None;
        unbounded.ordering.clear();
        let tables = self.tables.read();
        let ids = tables.select(&unbounded, query.entity)?;
        Ok(ids.len() as u64)
    }

    async fn year_buckets(&self, limit: u64) -> StoreResult<Vec<YearBucket>> {
        let tables = self.tables.read();
        let mut counts: BTreeMap<i32, i64> = BTreeMap::new();
        for book in tables.books.values() {
            *counts.entry(book.publication_year).or_default() += 1;
        }
        let mut buckets: Vec<YearBucket> = counts
            .into_iter()
            .map(|(publication_year, book_count)| YearBucket {
                publication_year,
                book_count,
            })
            .collect();
        buckets.sort_by(|a, b| {
            b.book_count
                .cmp(&a.book_count)
                .then(b.publication_year.cmp(&a.publication_year))
        });
        buckets.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(buckets)
    }

    async fn create_author(&self, input: &NewAuthor) -> StoreResult<Author> {
        Ok(self.tables.write().insert_author(&input.name))
    }

    async fn find_or_create_author(&self, name: &str) -> StoreResult<(Author, bool)> {
        let mut tables = self.tables.write();
        if let Some(author) = tables.authors.values().find(|a| a.name == name) {
            return Ok((author.clone(), false));
        }
        Ok((tables.insert_author(name), true))
    }

    async fn delete_author(&self, id: i64) -> StoreResult<Option<Author>> {
        let mut tables = self.tables.write();
        let Some(author) = tables.authors.remove(&id) else {
            return Ok(None);
        };
        tables.books.retain(|_, book| book.author_id != id);
        Ok(Some(author))
    }

    async fn create_book(&self, input: &NewBook) -> StoreResult<Book> {
        self.tables.write().insert_book(input)
    }

    async fn find_or_create_book(&self, input: &NewBook) -> StoreResult<(Book, bool)> {
        let mut tables = self.tables.write();
        let existing = tables.books.values().find(|b| {
            b.title == input.title
                && b.publication_year == input.publication_year
                && b.author_id == input.author_id
        });
        if let Some(book) = existing {
            return Ok((book.clone(), false));
        }
        Ok((tables.insert_book(input)?, true))
    }

    async fn update_book(&self, id: i64, input: &NewBook) -> StoreResult<Option<Book>> {
        let mut tables = self.tables.write();
        if !tables.books.contains_key(&id) {
            return Ok(None);
        }
        tables.require_author(input.author_id)?;
        let book = Book {
            id,
            title: input.title.clone(),
            publication_year: input.publication_year,
            author_id: input.author_id,
        };
        tables.books.insert(id, book.clone());
        Ok(Some(book))
    }

    async fn delete_book(&self, id: i64) -> StoreResult<Option<Book>> {
        Ok(self.tables.write().books.remove(&id))
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::query::{ListEndpoint, QueryParams};

    async fn seeded() -> MemoryCatalog {
        let catalog = MemoryCatalog::new();
        let (orwell, _) = catalog.find_or_create_author("George Orwell").await.unwrap();
        let (austen, _) = catalog.find_or_create_author("Jane Austen").await.unwrap();
        catalog.find_or_create_author("Nobody").await.unwrap();
        for (title, year, author) in [
            ("1984", 1949, orwell.id),
            ("Animal Farm", 1945, orwell.id),
            ("Emma", 1815, austen.id),
        ] {
            catalog
                .create_book(&NewBook::new(title, year, author))
                .await
                .unwrap();
        }
        catalog
    }

    async fn titles(catalog: &MemoryCatalog, params: QueryParams) -> Vec<String> {
        let query = ListEndpoint::books().unwrap().compose(&params).unwrap();
        catalog
            .fetch_books(&query)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.book.title)
            .collect()
    }

    #[tokio::test]
    async fn ids_are_sequential() {
        let catalog = seeded().await;
        let books = titles(&catalog, QueryParams::new().with("ordering", "publication_year")).await;
        assert_eq!(books, vec!["Emma", "Animal Farm", "1984"]);
        assert_eq!(catalog.find_book(1).await.unwrap().unwrap().book.title, "1984");
    }

    #[tokio::test]
    async fn related_field_filters_join_author() {
        let catalog = seeded().await;
        let books = titles(&catalog, QueryParams::new().with("author__name", "ORWELL")).await;
        assert_eq!(books, vec!["1984", "Animal Farm"]);
    }

    #[tokio::test]
    async fn annotations_and_prefetch() {
        let catalog = seeded().await;
        let query = ListEndpoint::authors()
            .unwrap()
            .compose(&QueryParams::new().with("ordering", "-books_count"))
            .unwrap();
        let authors = catalog.fetch_authors(&query).await.unwrap();

        let counts: Vec<_> = authors.iter().map(|a| a.books_count).collect();
        assert_eq!(counts, vec![Some(2), Some(1), Some(0)]);
        assert_eq!(authors[0].books.len(), 2);
        assert!(authors[2].books.is_empty());
    }

    #[tokio::test]
    async fn missing_max_sorts_last_ascending() {
        let catalog = seeded().await;
        let mut query = ComposedQuery::new(Entity::Author);
        query.ensure_annotation(crate::query::LATEST_BOOK_YEAR);
        query.order_by(crate::query::OrderClause::asc(Operand::Annotation(
            crate::query::LATEST_BOOK_YEAR,
        )));
        let authors = catalog.fetch_authors(&query).await.unwrap();
        let years: Vec<_> = authors.iter().map(|a| a.latest_book_year).collect();
        assert_eq!(years, vec![Some(1815), Some(1949), None]);
    }

    #[tokio::test]
    async fn count_ignores_limit() {
        let catalog = seeded().await;
        let query = ComposedQuery::new(Entity::Book).with_limit(1);
        assert_eq!(catalog.count(&query).await.unwrap(), 3);
        assert_eq!(catalog.fetch_books(&query).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn book_for_missing_author_is_rejected() {
        let catalog = seeded().await;
        let err = catalog
            .create_book(&NewBook::new("Orphan", 2000, 99))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingAuthor(99)));

        let err = catalog
            .update_book(1, &NewBook::new("1984", 1949, 99))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingAuthor(99)));
        assert!(
            catalog
                .update_book(42, &NewBook::new("x", 1949, 1))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn deleting_author_cascades() {
        let catalog = seeded().await;
        catalog.delete_author(1).await.unwrap().unwrap();
        assert!(catalog.find_book(1).await.unwrap().is_none());
        assert!(catalog.find_book(3).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn find_or_create_is_idempotent() {
        let catalog = seeded().await;
        let (_, created) = catalog
            .find_or_create_book(&NewBook::new("Emma", 1815, 2))
            .await
            .unwrap();
        assert!(!created);
        let (_, created) = catalog.find_or_create_author("Jane Austen").await.unwrap();
        assert!(!created);
    }

    #[tokio::test]
    async fn year_buckets_order_by_count_then_year() {
        let catalog = seeded().await;
        catalog
            .create_book(&NewBook::new("Sense and Sensibility", 1815, 2))
            .await
            .unwrap();
        let buckets = catalog.year_buckets(2).await.unwrap();
        assert_eq!(
            buckets,
            vec![
                YearBucket {
                    publication_year: 1815,
                    book_count: 2
                },
                YearBucket {
                    publication_year: 1949,
                    book_count: 1
                },
            ]
        );
    }
}
