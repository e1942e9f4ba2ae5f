//! Catalog query composition.
//!
//! This module provides:
//! - Schema: entity, field, and relation descriptions plus typed field paths
//! - Matchers: field, range, aggregate, and composite search matchers
//! - FilterSet: declarative, per-entity bundles of matchers keyed by parameter
//! - ListEndpoint: the composer that turns request parameters into a ComposedQuery
//! - CatalogQueryBuilder: SeaQuery-based SQL generation for Postgres

mod composer;
mod error;
mod filter_set;
mod matcher;
mod params;
pub mod schema;
mod sql;
pub mod types;

pub use composer::{ListEndpoint, ListEndpointBuilder, OrderingField};
pub use error::QueryError;
pub use filter_set::{FilterSet, FilterSetBuilder, author_filter_set, book_filter_set};
pub use matcher::{
    AggregateMatcher, CompositeSearchMatcher, FieldMatcher, MatcherDescriptor, MatcherKind,
    RangeMatcher,
};
pub use params::QueryParams;
pub use schema::{Entity, FieldKind, FieldPath, ResolvedField};
pub use sql::{CatalogQueryBuilder, escape_like_wildcards};
pub use types::{
    Aggregate, Annotation, BOOKS_COUNT, ComposedQuery, LATEST_BOOK_YEAR, Lookup, NullsOrder,
    Operand, OrderClause, Predicate, Scalar, SortDirection,
};
