//! Filter sets: per-entity, ordered bundles of matchers.

use std::collections::HashMap;

use super::QueryError;
use super::matcher::{Matcher, MatcherDescriptor, MatcherKind};
use super::params::QueryParams;
use super::schema::{Entity, FieldPath};
use super::types::{Annotation, BOOKS_COUNT, ComposedQuery, Lookup};

/// Builder for a [`FilterSet`].
///
/// Matchers apply in the order they are declared.
#[derive(Debug)]
pub struct FilterSetBuilder {
    entity: Entity,
    descriptors: Vec<MatcherDescriptor>,
}

impl FilterSetBuilder {
    pub fn new(entity: Entity) -> Self {
        Self {
            entity,
            descriptors: Vec::new(),
        }
    }

    /// Single-field comparison.
    pub fn field(self, name: &'static str, path: FieldPath, lookup: Lookup) -> Self {
        self.descriptor(MatcherDescriptor::field(name, path, lookup))
    }

    /// Inclusive range over `path`.
    pub fn range(self, name: &'static str, path: FieldPath) -> Self {
        self.descriptor(MatcherDescriptor {
            name,
            kind: MatcherKind::Range { path },
        })
    }

    /// Comparison against an aggregate annotation.
    pub fn aggregate(self, name: &'static str, annotation: Annotation, lookup: Lookup) -> Self {
        self.descriptor(MatcherDescriptor {
            name,
            kind: MatcherKind::Aggregate { annotation, lookup },
        })
    }

    /// Free-text search across `paths`.
    pub fn search(self, name: &'static str, paths: impl IntoIterator<Item = FieldPath>) -> Self {
        self.descriptor(MatcherDescriptor {
            name,
            kind: MatcherKind::CompositeSearch {
                paths: paths.into_iter().collect(),
            },
        })
    }

    pub fn descriptor(mut self, descriptor: MatcherDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Resolve every matcher and index its keys.
    ///
    /// Fails on a duplicate key or any matcher that does not fit the schema.
    pub fn build(self) -> Result<FilterSet, QueryError> {
        let mut keys = HashMap::new();
        let mut matchers = Vec::with_capacity(self.descriptors.len());

        for (index, descriptor) in self.descriptors.iter().enumerate() {
            for key in descriptor.keys() {
                if keys.insert(key.clone(), index).is_some() {
                    return Err(QueryError::config(format!(
                        "duplicate filter key '{key}' on {}",
                        self.entity
                    )));
                }
            }
            matchers.push(descriptor.bind(self.entity)?);
        }

        Ok(FilterSet {
            entity: self.entity,
            descriptors: self.descriptors,
            matchers,
            keys,
        })
    }
}

/// Closed list of recognised parameters for one entity.
#[derive(Debug, Clone)]
pub struct FilterSet {
    entity: Entity,
    descriptors: Vec<MatcherDescriptor>,
    matchers: Vec<Matcher>,
    keys: HashMap<String, usize>,
}

impl FilterSet {
    pub fn builder(entity: Entity) -> FilterSetBuilder {
        FilterSetBuilder::new(entity)
    }

    pub fn entity(&self) -> Entity {
        self.entity
    }

    /// Every recognised parameter key, in declaration order.
    pub fn keys(&self) -> Vec<String> {
        self.descriptors.iter().flat_map(|d| d.keys()).collect()
    }

    /// Descriptor bound to `key`, if any.
    pub fn descriptor_for(&self, key: &str) -> Option<&MatcherDescriptor> {
        self.keys.get(key).map(|&index| &self.descriptors[index])
    }

    /// Fold every active matcher into `query`.
    ///
    /// Unknown keys are ignored. Stops at the first invalid value.
    pub fn apply(
        &self,
        query: ComposedQuery,
        params: &QueryParams,
    ) -> Result<ComposedQuery, QueryError> {
        if query.entity != self.entity {
            return Err(QueryError::config(format!(
                "filter set for {} applied to a {} query",
                self.entity, query.entity
            )));
        }
        self.matchers
            .iter()
            .try_fold(query, |query, matcher| matcher.apply(query, params))
    }
}

/// Filters recognised by the book listing.
pub fn book_filter_set() -> Result<FilterSet, QueryError> {
    let title = || FieldPath::field("title");
    let year = || FieldPath::field("publication_year");
    let author_name = || FieldPath::related("author", "name");

    FilterSet::builder(Entity::Book)
        .field("title", title(), Lookup::Contains)
        .field("title_exact", title(), Lookup::Equal)
        .field("title_startswith", title(), Lookup::StartsWith)
        .field("author__name", author_name(), Lookup::Contains)
        .field("author__name_exact", author_name(), Lookup::Equal)
        .field("author", FieldPath::related("author", "id"), Lookup::Equal)
        .field("publication_year", year(), Lookup::Equal)
        .field("publication_year__gte", year(), Lookup::GreaterOrEqual)
        .field("publication_year__lte", year(), Lookup::LessOrEqual)
        .field("publication_year__gt", year(), Lookup::GreaterThan)
        .field("publication_year__lt", year(), Lookup::LessThan)
        .range("publication_year_range", year())
        .field("id", FieldPath::field("id"), Lookup::Equal)
        .field("id__in", FieldPath::field("id"), Lookup::In)
        .search("search", [title(), author_name()])
        .build()
}

/// Filters recognised by the author listing.
pub fn author_filter_set() -> Result<FilterSet, QueryError> {
    let name = || FieldPath::field("name");

    FilterSet::builder(Entity::Author)
        .field("name", name(), Lookup::Contains)
        .field("name_exact", name(), Lookup::Equal)
        .field("name_startswith", name(), Lookup::StartsWith)
        .aggregate("books_count", BOOKS_COUNT, Lookup::Equal)
        .aggregate("books_count__gte", BOOKS_COUNT, Lookup::GreaterOrEqual)
        .aggregate("books_count__lte", BOOKS_COUNT, Lookup::LessOrEqual)
        .build()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::query::types::{Operand, Predicate, Scalar};

    #[test]
    fn builtin_filter_sets_build() {
        let books = book_filter_set().unwrap();
        assert!(books.keys().contains(&"publication_year_range_max".to_string()));
        assert_eq!(books.keys().len(), 17);

        let authors = author_filter_set().unwrap();
        assert_eq!(
            authors.keys(),
            vec![
                "name",
                "name_exact",
                "name_startswith",
                "books_count",
                "books_count__gte",
                "books_count__lte"
            ]
        );
    }

    #[test]
    fn duplicate_key_is_config_error() {
        let err = FilterSet::builder(Entity::Book)
            .field("title", FieldPath::field("title"), Lookup::Contains)
            .field("title", FieldPath::field("title"), Lookup::Equal)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("duplicate filter key 'title'"));
    }

    #[test]
    fn range_suffix_collision_is_config_error() {
        let err = FilterSet::builder(Entity::Book)
            .field(
                "year_min",
                FieldPath::field("publication_year"),
                Lookup::GreaterOrEqual,
            )
            .range("year", FieldPath::field("publication_year"))
            .build()
            .unwrap_err();
        assert!(matches!(err, QueryError::Config(_)));
    }

    #[test]
    fn unknown_relation_in_aggregate_is_config_error() {
        let reviews = Annotation {
            name: "reviews_count",
            relation: "reviews",
            aggregate: crate::query::types::Aggregate::Count,
        };
        let err = FilterSet::builder(Entity::Author)
            .aggregate("reviews", reviews, Lookup::Equal)
            .build()
            .unwrap_err();
        assert!(matches!(err, QueryError::Config(_)));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let books = book_filter_set().unwrap();
        let params = QueryParams::new()
            .with("format", "json")
            .with("page", "2")
            .with("title", "emma");
        let query = books
            .apply(ComposedQuery::new(Entity::Book), &params)
            .unwrap();
        assert_eq!(query.conditions.len(), 1);
    }

    #[test]
    fn matchers_fold_in_declaration_order() {
        let books = book_filter_set().unwrap();
        let params = QueryParams::new()
            .with("id__in", "1,2")
            .with("title", "a")
            .with("publication_year__gte", "1900");
        let query = books
            .apply(ComposedQuery::new(Entity::Book), &params)
            .unwrap();

        let lookups: Vec<_> = query
            .conditions
            .iter()
            .map(|p| match p {
                Predicate::Compare { lookup, .. } => *lookup,
                Predicate::In { .. } => Lookup::In,
                _ => panic!("unexpected predicate"),
            })
            .collect();
        assert_eq!(
            lookups,
            vec![Lookup::Contains, Lookup::GreaterOrEqual, Lookup::In]
        );
    }

    #[test]
    fn invalid_value_names_parameter() {
        let books = book_filter_set().unwrap();
        let params = QueryParams::new().with("author", "orwell");
        let err = books
            .apply(ComposedQuery::new(Entity::Book), &params)
            .unwrap_err();
        assert!(matches!(err, QueryError::Validation { ref param, .. } if param == "author"));
    }

    #[test]
    fn author_filter_compares_against_count() {
        let authors = author_filter_set().unwrap();
        let params = QueryParams::new().with("books_count__gte", "2");
        let query = authors
            .apply(ComposedQuery::new(Entity::Author), &params)
            .unwrap();
        assert_eq!(
            query.conditions,
            vec![Predicate::compare(
                Operand::Annotation(BOOKS_COUNT),
                Lookup::GreaterOrEqual,
                Scalar::Int(2),
            )]
        );
        assert!(query.has_annotation("books_count"));
    }

    #[test]
    fn descriptor_lookup_by_key() {
        let books = book_filter_set().unwrap();
        let descriptor = books.descriptor_for("publication_year_range_min").unwrap();
        assert_eq!(descriptor.name, "publication_year_range");
        assert!(books.descriptor_for("isbn").is_none());
    }

    #[test]
    fn wrong_entity_is_rejected() {
        let authors = author_filter_set().unwrap();
        assert!(
            authors
                .apply(ComposedQuery::new(Entity::Book), &QueryParams::new())
                .is_err()
        );
    }
}
