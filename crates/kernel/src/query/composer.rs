//! List endpoint composition.
//!
//! A [`ListEndpoint`] turns the raw parameters of one listing request into a
//! [`ComposedQuery`] through a fixed sequence of stages:
//!
//! `base_collection → filtered → searched → ordered → annotated → final`
//!
//! Endpoints are assembled once at startup; every declaration problem is
//! reported as [`QueryError::Config`] from [`ListEndpointBuilder::build`].

use super::QueryError;
use super::filter_set::{FilterSet, author_filter_set, book_filter_set};
use super::matcher::CompositeSearchMatcher;
use super::params::QueryParams;
use super::schema::{Cardinality, Entity, FieldPath};
use super::types::{Annotation, BOOKS_COUNT, ComposedQuery, Operand, OrderClause, SortDirection};

/// Parameter carrying the requested ordering.
pub const ORDERING_PARAM: &str = "ordering";

/// An allow-listed `ordering` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderingField {
    /// Order by a stored field.
    Field { key: &'static str, path: FieldPath },
    /// Order by an aggregate annotation.
    Annotation {
        key: &'static str,
        annotation: Annotation,
    },
}

impl OrderingField {
    pub fn field(key: &'static str, path: FieldPath) -> Self {
        Self::Field { key, path }
    }

    pub fn annotation(key: &'static str, annotation: Annotation) -> Self {
        Self::Annotation { key, annotation }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Self::Field { key, .. } | Self::Annotation { key, .. } => key,
        }
    }

    fn resolve(&self, entity: Entity) -> Result<Operand, QueryError> {
        match self {
            Self::Field { path, .. } => Ok(Operand::Column(path.resolve(entity)?)),
            Self::Annotation { annotation, .. } => {
                annotation.validate(entity)?;
                Ok(Operand::Annotation(*annotation))
            }
        }
    }
}

/// Builder for a [`ListEndpoint`].
#[derive(Debug)]
pub struct ListEndpointBuilder {
    entity: Entity,
    filter_set: FilterSet,
    search: Option<(&'static str, Vec<FieldPath>)>,
    ordering_fields: Vec<OrderingField>,
    default_ordering: Vec<&'static str>,
    annotations: Vec<Annotation>,
    select_related: Vec<&'static str>,
    prefetch_related: Vec<&'static str>,
}

impl ListEndpointBuilder {
    /// Endpoint-level free-text search read from `param`.
    pub fn search(mut self, param: &'static str, paths: impl IntoIterator<Item = FieldPath>) -> Self {
        self.search = Some((param, paths.into_iter().collect()));
        self
    }

    pub fn ordering_field(mut self, field: OrderingField) -> Self {
        self.ordering_fields.push(field);
        self
    }

    /// Ordering used when the request names no allow-listed key.
    ///
    /// Accepts the same syntax as the `ordering` parameter.
    pub fn default_ordering(mut self, spec: &'static str) -> Self {
        self.default_ordering = split_ordering(spec).collect();
        self
    }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    /// Load a to-one relation in the same query.
    pub fn select_related(mut self, relation: &'static str) -> Self {
        self.select_related.push(relation);
        self
    }

    /// Load a to-many relation with one extra query per page.
    pub fn prefetch_related(mut self, relation: &'static str) -> Self {
        self.prefetch_related.push(relation);
        self
    }

    pub fn build(self) -> Result<ListEndpoint, QueryError> {
        let entity = self.entity;
        if self.filter_set.entity() != entity {
            return Err(QueryError::config(format!(
                "{} filter set attached to {entity} endpoint",
                self.filter_set.entity()
            )));
        }

        let search = self
            .search
            .map(|(param, paths)| CompositeSearchMatcher::new(param, entity, &paths))
            .transpose()?;

        let mut ordering = Vec::with_capacity(self.ordering_fields.len());
        for field in &self.ordering_fields {
            if ordering.iter().any(|(key, _)| *key == field.key()) {
                return Err(QueryError::config(format!(
                    "duplicate ordering key '{}' on {entity}",
                    field.key()
                )));
            }
            ordering.push((field.key(), field.resolve(entity)?));
        }

        let default_ordering = self
            .default_ordering
            .iter()
            .map(|term| {
                order_clause(&ordering, term).ok_or_else(|| {
                    QueryError::config(format!(
                        "default ordering '{term}' is not an allowed ordering on {entity}"
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        for annotation in &self.annotations {
            annotation.validate(entity)?;
        }
        for relation in &self.select_related {
            check_relation(entity, relation, false)?;
        }
        for relation in &self.prefetch_related {
            check_relation(entity, relation, true)?;
        }

        let tie_breaker = OrderClause::asc(Operand::Column(FieldPath::field("id").resolve(entity)?));

        Ok(ListEndpoint {
            entity,
            filter_set: self.filter_set,
            search,
            ordering,
            default_ordering,
            tie_breaker,
            annotations: self.annotations,
            select_related: self.select_related,
            prefetch_related: self.prefetch_related,
        })
    }
}

/// Composes listing queries for one entity.
#[derive(Debug, Clone)]
pub struct ListEndpoint {
    entity: Entity,
    filter_set: FilterSet,
    search: Option<CompositeSearchMatcher>,
    ordering: Vec<(&'static str, Operand)>,
    default_ordering: Vec<OrderClause>,
    tie_breaker: OrderClause,
    annotations: Vec<Annotation>,
    select_related: Vec<&'static str>,
    prefetch_related: Vec<&'static str>,
}

impl ListEndpoint {
    pub fn builder(entity: Entity, filter_set: FilterSet) -> ListEndpointBuilder {
        ListEndpointBuilder {
            entity,
            filter_set,
            search: None,
            ordering_fields: Vec::new(),
            default_ordering: Vec::new(),
            annotations: Vec::new(),
            select_related: Vec::new(),
            prefetch_related: Vec::new(),
        }
    }

    /// `/books/` listing.
    pub fn books() -> Result<Self, QueryError> {
        let title = || FieldPath::field("title");
        let author_name = || FieldPath::related("author", "name");

        Self::builder(Entity::Book, book_filter_set()?)
            .search("search", [title(), author_name()])
            .ordering_field(OrderingField::field("title", title()))
            .ordering_field(OrderingField::field(
                "publication_year",
                FieldPath::field("publication_year"),
            ))
            .ordering_field(OrderingField::field("author__name", author_name()))
            .default_ordering("title")
            .select_related("author")
            .build()
    }

    /// `/authors/` listing.
    pub fn authors() -> Result<Self, QueryError> {
        Self::builder(Entity::Author, author_filter_set()?)
            .search("search", [FieldPath::field("name")])
            .ordering_field(OrderingField::field("name", FieldPath::field("name")))
            .ordering_field(OrderingField::annotation("books_count", BOOKS_COUNT))
            .default_ordering("name")
            .annotate(BOOKS_COUNT)
            .prefetch_related("books")
            .build()
    }

    /// Compose the query for one request.
    pub fn compose(&self, params: &QueryParams) -> Result<ComposedQuery, QueryError> {
        let query = ComposedQuery::new(self.entity);
        tracing::debug!(entity = ?self.entity, stage = "base_collection", "composing list query");

        let query = self.filter_set.apply(query, params)?;
        tracing::debug!(
            entity = ?self.entity,
            stage = "filtered",
            conditions = query.conditions.len(),
            "applied filter set"
        );

        let query = match &self.search {
            Some(search) => search.evaluate_terms(query, params.get(search.param()))?,
            None => query,
        };
        tracing::debug!(
            entity = ?self.entity,
            stage = "searched",
            conditions = query.conditions.len(),
            "applied search terms"
        );

        let query = self.apply_ordering(query, params.get(ORDERING_PARAM));
        tracing::debug!(
            entity = ?self.entity,
            stage = "ordered",
            terms = query.ordering.len(),
            "applied ordering"
        );

        let mut query = query;
        for annotation in &self.annotations {
            query.ensure_annotation(*annotation);
        }
        for relation in &self.select_related {
            query.select_related(relation);
        }
        for relation in &self.prefetch_related {
            query.prefetch_related(relation);
        }
        tracing::debug!(
            entity = ?self.entity,
            stage = "annotated",
            annotations = query.annotations.len(),
            prefetch = ?query.prefetch_related,
            "composed list query"
        );

        Ok(query)
    }

    /// Apply allow-listed ordering terms; unknown keys are skipped.
    fn apply_ordering(&self, mut query: ComposedQuery, raw: Option<&str>) -> ComposedQuery {
        let mut clauses: Vec<OrderClause> = Vec::new();
        for term in raw.map(split_ordering).into_iter().flatten() {
            match order_clause(&self.ordering, term) {
                Some(clause) if !clauses.iter().any(|c| c.target == clause.target) => {
                    clauses.push(clause);
                }
                Some(_) => {}
                None => tracing::debug!(entity = ?self.entity, term, "ignoring unknown ordering key"),
            }
        }
        if clauses.is_empty() {
            clauses.clone_from(&self.default_ordering);
        }

        for clause in clauses {
            if let Operand::Annotation(annotation) = clause.target {
                query.ensure_annotation(annotation);
            }
            query.order_by(clause);
        }
        query.order_by(self.tie_breaker);
        query
    }
}

fn split_ordering(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|t| !t.is_empty())
}

/// Parse one `[-]key` term against the allow-list.
fn order_clause(allowed: &[(&'static str, Operand)], term: &str) -> Option<OrderClause> {
    let (key, direction) = match term.strip_prefix('-') {
        Some(key) => (key, SortDirection::Desc),
        None => (term, SortDirection::Asc),
    };
    allowed
        .iter()
        .find(|(allowed_key, _)| *allowed_key == key)
        .map(|(_, target)| OrderClause {
            target: *target,
            direction,
            nulls: None,
        })
}

fn check_relation(entity: Entity, name: &str, to_many: bool) -> Result<(), QueryError> {
    let relation = entity
        .schema()
        .relation(name)
        .ok_or_else(|| QueryError::config(format!("{entity} has no relation '{name}'")))?;
    let is_to_many = matches!(relation.cardinality, Cardinality::ToMany { .. });
    if is_to_many != to_many {
        let expected = if to_many { "prefetched" } else { "selected" };
        return Err(QueryError::config(format!(
            "relation '{name}' on {entity} cannot be {expected}"
        )));
    }
    Ok(())
}
