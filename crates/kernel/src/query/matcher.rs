//! Matchers: units that turn one request parameter into one predicate.
//!
//! A [`MatcherDescriptor`] is plain data. Binding it to an entity resolves
//! its field paths once and yields one of the concrete matchers below, each
//! of which refines a [`ComposedQuery`] from a raw parameter value.

use super::params::QueryParams;
use super::schema::{Entity, FieldKind, FieldPath, ResolvedField};
use super::types::{Annotation, ComposedQuery, Lookup, Operand, Predicate, Scalar};
use super::QueryError;

/// Declared matcher: a parameter name plus what it matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatcherDescriptor {
    pub name: &'static str,
    pub kind: MatcherKind,
}

/// What a matcher compares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatcherKind {
    /// One field, one comparison mode.
    Field { path: FieldPath, lookup: Lookup },
    /// Inclusive two-sided bound on one field.
    Range { path: FieldPath },
    /// Comparison against a per-row aggregate.
    Aggregate {
        annotation: Annotation,
        lookup: Lookup,
    },
    /// Case-insensitive contains, OR-ed across several text fields.
    CompositeSearch { paths: Vec<FieldPath> },
}

impl MatcherDescriptor {
    pub fn field(name: &'static str, path: FieldPath, lookup: Lookup) -> Self {
        Self {
            name,
            kind: MatcherKind::Field { path, lookup },
        }
    }

    /// Parameter keys this matcher reads.
    ///
    /// A range reads its bare name plus `<name>_min` and `<name>_max`.
    pub fn keys(&self) -> Vec<String> {
        match self.kind {
            MatcherKind::Range { .. } => vec![
                self.name.to_string(),
                format!("{}_min", self.name),
                format!("{}_max", self.name),
            ],
            _ => vec![self.name.to_string()],
        }
    }

    /// Resolve this descriptor against `entity`.
    pub(crate) fn bind(&self, entity: Entity) -> Result<Matcher, QueryError> {
        let bound = match &self.kind {
            MatcherKind::Field { path, lookup } => {
                Matcher::Field(FieldMatcher::new(self.name, entity, path, *lookup)?)
            }
            MatcherKind::Range { path } => Matcher::Range(RangeMatcher::new(self.name, entity, path)?),
            MatcherKind::Aggregate { annotation, lookup } => {
                Matcher::Aggregate(AggregateMatcher::new(self.name, entity, *annotation, *lookup)?)
            }
            MatcherKind::CompositeSearch { paths } => {
                Matcher::Search(CompositeSearchMatcher::new(self.name, entity, paths)?)
            }
        };
        Ok(bound)
    }
}

/// A descriptor resolved against an entity.
#[derive(Debug, Clone)]
pub(crate) enum Matcher {
    Field(FieldMatcher),
    Range(RangeMatcher),
    Aggregate(AggregateMatcher),
    Search(CompositeSearchMatcher),
}

impl Matcher {
    /// Refine `query` from whichever of this matcher's keys are present.
    pub(crate) fn apply(
        &self,
        query: ComposedQuery,
        params: &QueryParams,
    ) -> Result<ComposedQuery, QueryError> {
        match self {
            Matcher::Field(m) => m.evaluate(query, params.get(m.param)),
            Matcher::Range(m) => m.evaluate(query, params),
            Matcher::Aggregate(m) => m.evaluate(query, params.get(m.param)),
            Matcher::Search(m) => m.evaluate(query, params.get(m.param)),
        }
    }
}

/// Compares one scalar field against a parameter value.
#[derive(Debug, Clone)]
pub struct FieldMatcher {
    param: &'static str,
    field: ResolvedField,
    lookup: Lookup,
}

impl FieldMatcher {
    pub fn new(
        param: &'static str,
        entity: Entity,
        path: &FieldPath,
        lookup: Lookup,
    ) -> Result<Self, QueryError> {
        let field = path.resolve(entity)?;
        if !lookup.supports(field.kind) {
            return Err(QueryError::config(format!(
                "matcher '{param}' uses {lookup:?} on non-text field '{path}'"
            )));
        }
        Ok(Self {
            param,
            field,
            lookup,
        })
    }

    /// Refine `query`; an absent value leaves it unchanged.
    pub fn evaluate(
        &self,
        mut query: ComposedQuery,
        raw: Option<&str>,
    ) -> Result<ComposedQuery, QueryError> {
        let Some(raw) = raw else {
            return Ok(query);
        };
        if let Some(predicate) = self.predicate(raw)? {
            query.and_where(predicate);
        }
        Ok(query)
    }

    /// Predicate for `raw`, or `None` when the value constrains nothing.
    pub fn predicate(&self, raw: &str) -> Result<Option<Predicate>, QueryError> {
        comparison(
            self.param,
            Operand::Column(self.field),
            self.field.kind,
            self.lookup,
            raw,
        )
    }
}

/// Inclusive lower and upper bound on one field.
///
/// Reads `<name>_min` / `<name>_max`, or the bare key as `"min,max"`. The
/// suffixed keys take precedence over the corresponding side of the bare key.
#[derive(Debug, Clone)]
pub struct RangeMatcher {
    param: &'static str,
    min_key: String,
    max_key: String,
    field: ResolvedField,
}

impl RangeMatcher {
    pub fn new(param: &'static str, entity: Entity, path: &FieldPath) -> Result<Self, QueryError> {
        let field = path.resolve(entity)?;
        Ok(Self {
            param,
            min_key: format!("{param}_min"),
            max_key: format!("{param}_max"),
            field,
        })
    }

    pub fn evaluate(
        &self,
        mut query: ComposedQuery,
        params: &QueryParams,
    ) -> Result<ComposedQuery, QueryError> {
        let (mut min, mut max) = match params.get(self.param) {
            Some(bare) => self.split_bare(bare)?,
            None => (None, None),
        };
        if let Some(value) = params.get(&self.min_key) {
            min = Some((self.min_key.as_str(), value));
        }
        if let Some(value) = params.get(&self.max_key) {
            max = Some((self.max_key.as_str(), value));
        }

        for (bound, lookup) in [(min, Lookup::GreaterOrEqual), (max, Lookup::LessOrEqual)] {
            let Some((key, raw)) = bound else { continue };
            if let Some(predicate) =
                comparison(key, Operand::Column(self.field), self.field.kind, lookup, raw)?
            {
                query.and_where(predicate);
            }
        }
        Ok(query)
    }

    #[allow(clippy::type_complexity)]
    fn split_bare<'a>(
        &'a self,
        bare: &'a str,
    ) -> Result<(Option<(&'a str, &'a str)>, Option<(&'a str, &'a str)>), QueryError> {
        if bare.trim().is_empty() {
            return Ok((None, None));
        }
        let Some((min, max)) = bare.split_once(',') else {
            return Err(QueryError::validation(
                self.param,
                format!("expected 'min,max', got '{bare}'"),
            ));
        };
        Ok((Some((self.param, min)), Some((self.param, max))))
    }
}

/// Compares a per-row aggregate against a parameter value.
#[derive(Debug, Clone)]
pub struct AggregateMatcher {
    param: &'static str,
    annotation: Annotation,
    lookup: Lookup,
}

impl AggregateMatcher {
    pub fn new(
        param: &'static str,
        entity: Entity,
        annotation: Annotation,
        lookup: Lookup,
    ) -> Result<Self, QueryError> {
        annotation.validate(entity)?;
        if !lookup.supports(FieldKind::Integer) {
            return Err(QueryError::config(format!(
                "matcher '{param}' uses {lookup:?} on aggregate '{}'",
                annotation.name
            )));
        }
        Ok(Self {
            param,
            annotation,
            lookup,
        })
    }

    /// Ensure the annotation exists, then compare against it.
    pub fn evaluate(
        &self,
        mut query: ComposedQuery,
        raw: Option<&str>,
    ) -> Result<ComposedQuery, QueryError> {
        let Some(raw) = raw else {
            return Ok(query);
        };
        let predicate = comparison(
            self.param,
            Operand::Annotation(self.annotation),
            FieldKind::Integer,
            self.lookup,
            raw,
        )?;
        if let Some(predicate) = predicate {
            query.ensure_annotation(self.annotation);
            query.and_where(predicate);
        }
        Ok(query)
    }
}

/// Case-insensitive contains OR-ed across several text fields.
#[derive(Debug, Clone)]
pub struct CompositeSearchMatcher {
    param: &'static str,
    fields: Vec<ResolvedField>,
}

impl CompositeSearchMatcher {
    pub fn new(param: &'static str, entity: Entity, paths: &[FieldPath]) -> Result<Self, QueryError> {
        if paths.is_empty() {
            return Err(QueryError::config(format!(
                "search matcher '{param}' has no fields"
            )));
        }
        let mut fields = Vec::with_capacity(paths.len());
        for path in paths {
            let field = path.resolve(entity)?;
            if field.kind != FieldKind::Text {
                return Err(QueryError::config(format!(
                    "search matcher '{param}' includes non-text field '{path}'"
                )));
            }
            fields.push(field);
        }
        Ok(Self { param, fields })
    }

    pub fn param(&self) -> &'static str {
        self.param
    }

    /// Match the whole value against any field.
    pub fn evaluate(
        &self,
        mut query: ComposedQuery,
        raw: Option<&str>,
    ) -> Result<ComposedQuery, QueryError> {
        if let Some(term) = raw.map(str::trim).filter(|t| !t.is_empty()) {
            query.and_where(self.any_field_contains(term));
        }
        Ok(query)
    }

    /// Split the value on whitespace and commas; every term must match some
    /// field.
    pub fn evaluate_terms(
        &self,
        mut query: ComposedQuery,
        raw: Option<&str>,
    ) -> Result<ComposedQuery, QueryError> {
        let Some(raw) = raw else {
            return Ok(query);
        };
        for term in raw
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|t| !t.is_empty())
        {
            query.and_where(self.any_field_contains(term));
        }
        Ok(query)
    }

    fn any_field_contains(&self, term: &str) -> Predicate {
        Predicate::Any(
            self.fields
                .iter()
                .map(|field| {
                    Predicate::compare(
                        Operand::Column(*field),
                        Lookup::Contains,
                        Scalar::Text(term.to_string()),
                    )
                })
                .collect(),
        )
    }
}

/// Build one comparison predicate from a raw parameter value.
///
/// Empty values constrain nothing, except exact text equality which matches
/// the empty string.
fn comparison(
    param: &str,
    operand: Operand,
    kind: FieldKind,
    lookup: Lookup,
    raw: &str,
) -> Result<Option<Predicate>, QueryError> {
    let value = raw.trim();

    if lookup == Lookup::In {
        let values = value
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| coerce(param, kind, item))
            .collect::<Result<Vec<_>, _>>()?;
        if values.is_empty() {
            return Ok(None);
        }
        return Ok(Some(Predicate::In { operand, values }));
    }

    if value.is_empty() && !(lookup == Lookup::Equal && kind == FieldKind::Text) {
        return Ok(None);
    }

    Ok(Some(Predicate::compare(
        operand,
        lookup,
        coerce(param, kind, value)?,
    )))
}

fn coerce(param: &str, kind: FieldKind, value: &str) -> Result<Scalar, QueryError> {
    match kind {
        FieldKind::Integer => value.parse::<i64>().map(Scalar::Int).map_err(|_| {
            QueryError::validation(param, format!("expected an integer, got '{value}'"))
        }),
        FieldKind::Text => Ok(Scalar::Text(value.to_string())),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::query::types::BOOKS_COUNT;

    fn books() -> ComposedQuery {
        ComposedQuery::new(Entity::Book)
    }

    fn year_matcher(lookup: Lookup) -> FieldMatcher {
        FieldMatcher::new(
            "publication_year",
            Entity::Book,
            &FieldPath::field("publication_year"),
            lookup,
        )
        .unwrap()
    }

    #[test]
    fn absent_value_is_noop() {
        let query = year_matcher(Lookup::Equal).evaluate(books(), None).unwrap();
        assert!(query.conditions.is_empty());
    }

    #[test]
    fn integer_values_are_trimmed_and_coerced() {
        let query = year_matcher(Lookup::GreaterOrEqual)
            .evaluate(books(), Some(" 1900 "))
            .unwrap();
        match &query.conditions[0] {
            Predicate::Compare { lookup, value, .. } => {
                assert_eq!(*lookup, Lookup::GreaterOrEqual);
                assert_eq!(*value, Scalar::Int(1900));
            }
            other => panic!("unexpected predicate {other:?}"),
        }
    }

    #[test]
    fn non_numeric_value_is_validation_error() {
        let err = year_matcher(Lookup::Equal)
            .evaluate(books(), Some("nineteen"))
            .unwrap_err();
        assert_eq!(
            err,
            QueryError::Validation {
                param: "publication_year".into(),
                message: "expected an integer, got 'nineteen'".into(),
            }
        );
    }

    #[test]
    fn in_list_skips_blanks_and_rejects_garbage() {
        let matcher =
            FieldMatcher::new("id__in", Entity::Book, &FieldPath::field("id"), Lookup::In).unwrap();

        let query = matcher.evaluate(books(), Some("1, ,3,")).unwrap();
        assert_eq!(
            query.conditions[0],
            Predicate::In {
                operand: Operand::Column(FieldPath::field("id").resolve(Entity::Book).unwrap()),
                values: vec![Scalar::Int(1), Scalar::Int(3)],
            }
        );

        let query = matcher.evaluate(books(), Some(" , ")).unwrap();
        assert!(query.conditions.is_empty());

        assert!(matcher.evaluate(books(), Some("1,x")).is_err());
    }

    #[test]
    fn empty_text_equal_is_applied_but_contains_is_not() {
        let exact = FieldMatcher::new(
            "title_exact",
            Entity::Book,
            &FieldPath::field("title"),
            Lookup::Equal,
        )
        .unwrap();
        assert_eq!(exact.evaluate(books(), Some("")).unwrap().conditions.len(), 1);

        let contains =
            FieldMatcher::new("title", Entity::Book, &FieldPath::field("title"), Lookup::Contains)
                .unwrap();
        assert!(contains.evaluate(books(), Some("  ")).unwrap().conditions.is_empty());
    }

    #[test]
    fn contains_on_integer_is_config_error() {
        let err = FieldMatcher::new(
            "year",
            Entity::Book,
            &FieldPath::field("publication_year"),
            Lookup::Contains,
        )
        .unwrap_err();
        assert!(matches!(err, QueryError::Config(_)));
    }

    #[test]
    fn range_reads_suffixed_and_bare_keys() {
        let range = RangeMatcher::new(
            "publication_year_range",
            Entity::Book,
            &FieldPath::field("publication_year"),
        )
        .unwrap();

        let params = QueryParams::new().with("publication_year_range_min", "1900");
        let query = range.evaluate(books(), &params).unwrap();
        assert_eq!(query.conditions.len(), 1);

        let params = QueryParams::new().with("publication_year_range", "1900,2000");
        assert_eq!(range.evaluate(books(), &params).unwrap().conditions.len(), 2);

        let params = QueryParams::new().with("publication_year_range", ",2000");
        assert_eq!(range.evaluate(books(), &params).unwrap().conditions.len(), 1);

        let params = QueryParams::new().with("publication_year_range", "1900");
        assert!(matches!(
            range.evaluate(books(), &params),
            Err(QueryError::Validation { .. })
        ));
    }

    #[test]
    fn aggregate_matcher_ensures_annotation_once() {
        let gte = AggregateMatcher::new(
            "books_count__gte",
            Entity::Author,
            BOOKS_COUNT,
            Lookup::GreaterOrEqual,
        )
        .unwrap();
        let lte =
            AggregateMatcher::new("books_count__lte", Entity::Author, BOOKS_COUNT, Lookup::LessOrEqual)
                .unwrap();

        let query = gte
            .evaluate(ComposedQuery::new(Entity::Author), Some("1"))
            .unwrap();
        let query = lte.evaluate(query, Some("3")).unwrap();

        assert_eq!(query.annotations, vec![BOOKS_COUNT]);
        assert_eq!(query.group_conditions().count(), 2);
    }

    #[test]
    fn aggregate_on_book_is_config_error() {
        let err = AggregateMatcher::new("books_count", Entity::Book, BOOKS_COUNT, Lookup::Equal)
            .unwrap_err();
        assert!(matches!(err, QueryError::Config(_)));
    }

    #[test]
    fn composite_search_ors_fields() {
        let search = CompositeSearchMatcher::new(
            "search",
            Entity::Book,
            &[FieldPath::field("title"), FieldPath::related("author", "name")],
        )
        .unwrap();

        let query = search.evaluate(books(), Some("potter")).unwrap();
        match &query.conditions[0] {
            Predicate::Any(parts) => assert_eq!(parts.len(), 2),
            other => panic!("unexpected predicate {other:?}"),
        }

        assert!(search.evaluate(books(), Some("")).unwrap().conditions.is_empty());
        assert!(search.evaluate(books(), None).unwrap().conditions.is_empty());
    }

    #[test]
    fn search_terms_each_add_a_condition() {
        let search =
            CompositeSearchMatcher::new("search", Entity::Book, &[FieldPath::field("title")]).unwrap();
        let query = search
            .evaluate_terms(books(), Some("harry, potter  goblet"))
            .unwrap();
        assert_eq!(query.conditions.len(), 3);
    }

    #[test]
    fn range_descriptor_reads_three_keys() {
        let descriptor = MatcherDescriptor {
            name: "publication_year_range",
            kind: MatcherKind::Range {
                path: FieldPath::field("publication_year"),
            },
        };
        assert_eq!(
            descriptor.keys(),
            vec![
                "publication_year_range",
                "publication_year_range_min",
                "publication_year_range_max"
            ]
        );
    }
}
