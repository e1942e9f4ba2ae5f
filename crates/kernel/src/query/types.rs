//! Query description types.
//!
//! A [`ComposedQuery`] is an inert description of one read: entity,
//! conjunctive conditions, aggregate annotations, ordering, and
//! eager-loading hints. Stores execute it; nothing here touches data.

use serde::{Deserialize, Serialize};

use super::QueryError;
use super::schema::{Cardinality, Entity, FieldKind, ResolvedField};

/// A coerced parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Text(String),
}

impl Scalar {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Int(i) => Some(*i),
            Scalar::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            Scalar::Int(_) => None,
        }
    }
}

/// Comparison modes supported by matchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lookup {
    /// Exact match.
    Equal,
    /// Case-insensitive substring match.
    Contains,
    /// Case-sensitive prefix match.
    StartsWith,
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
    /// Value in a comma-separated list.
    In,
}

impl Lookup {
    /// Whether this lookup only makes sense on text fields.
    pub fn is_textual(self) -> bool {
        matches!(self, Lookup::Contains | Lookup::StartsWith)
    }

    /// Whether this lookup is valid for a field of `kind`.
    pub fn supports(self, kind: FieldKind) -> bool {
        !(self.is_textual() && kind == FieldKind::Integer)
    }
}

/// Per-group aggregate function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aggregate {
    /// Number of related rows.
    Count,
    /// Maximum of an integer column on the related rows.
    Max(&'static str),
}

/// A derived column computed over a to-many relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Annotation {
    /// Output alias.
    pub name: &'static str,
    /// To-many relation the aggregate runs over.
    pub relation: &'static str,
    pub aggregate: Aggregate,
}

/// Number of books per author.
pub const BOOKS_COUNT: Annotation = Annotation {
    name: "books_count",
    relation: "books",
    aggregate: Aggregate::Count,
};

/// Most recent publication year per author.
pub const LATEST_BOOK_YEAR: Annotation = Annotation {
    name: "latest_book_year",
    relation: "books",
    aggregate: Aggregate::Max("publication_year"),
};

impl Annotation {
    /// Check the annotation against `entity`'s schema.
    pub fn validate(&self, entity: Entity) -> Result<(), QueryError> {
        let relation = entity.schema().relation(self.relation).ok_or_else(|| {
            QueryError::config(format!(
                "annotation '{}' references unknown relation '{}' on {entity}",
                self.name, self.relation
            ))
        })?;
        if !matches!(relation.cardinality, Cardinality::ToMany { .. }) {
            return Err(QueryError::config(format!(
                "annotation '{}' needs a to-many relation, '{}' is to-one",
                self.name, self.relation
            )));
        }
        if let Aggregate::Max(field) = self.aggregate {
            let target = relation.target.schema().field(field).ok_or_else(|| {
                QueryError::config(format!(
                    "annotation '{}' aggregates unknown field '{field}'",
                    self.name
                ))
            })?;
            if target.kind != FieldKind::Integer {
                return Err(QueryError::config(format!(
                    "annotation '{}' can only take the maximum of an integer field",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// Left-hand side of a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    Column(ResolvedField),
    Annotation(Annotation),
}

/// A boolean condition over one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// `operand <lookup> value` (never `Lookup::In`).
    Compare {
        operand: Operand,
        lookup: Lookup,
        value: Scalar,
    },
    /// `operand IN (values)`; `values` is never empty.
    In { operand: Operand, values: Vec<Scalar> },
    /// Logical OR.
    Any(Vec<Predicate>),
    /// Logical AND.
    All(Vec<Predicate>),
}

impl Predicate {
    pub fn compare(operand: Operand, lookup: Lookup, value: Scalar) -> Self {
        Predicate::Compare {
            operand,
            lookup,
            value,
        }
    }

    /// Whether evaluating this predicate needs a grouped aggregate.
    pub fn references_annotation(&self) -> bool {
        match self {
            Predicate::Compare { operand, .. } | Predicate::In { operand, .. } => {
                matches!(operand, Operand::Annotation(_))
            }
            Predicate::Any(parts) | Predicate::All(parts) => {
                parts.iter().any(Predicate::references_annotation)
            }
        }
    }

    /// Columns this predicate reads.
    pub fn columns(&self) -> Vec<ResolvedField> {
        match self {
            Predicate::Compare { operand, .. } | Predicate::In { operand, .. } => match operand {
                Operand::Column(field) => vec![*field],
                Operand::Annotation(_) => Vec::new(),
            },
            Predicate::Any(parts) | Predicate::All(parts) => {
                parts.iter().flat_map(Predicate::columns).collect()
            }
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// NULL ordering preference.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NullsOrder {
    First,
    Last,
}

/// One ORDER BY term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderClause {
    pub target: Operand,
    pub direction: SortDirection,
    pub nulls: Option<NullsOrder>,
}

impl OrderClause {
    pub fn asc(target: Operand) -> Self {
        Self {
            target,
            direction: SortDirection::Asc,
            nulls: None,
        }
    }

    pub fn desc(target: Operand) -> Self {
        Self {
            target,
            direction: SortDirection::Desc,
            nulls: None,
        }
    }

    pub fn nulls_last(mut self) -> Self {
        self.nulls = Some(NullsOrder::Last);
        self
    }
}

/// Final, executable description of one catalog read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedQuery {
    /// Entity being listed.
    pub entity: Entity,
    /// Conditions, combined with AND.
    pub conditions: Vec<Predicate>,
    /// Derived per-row aggregates; never contains duplicates.
    pub annotations: Vec<Annotation>,
    /// ORDER BY terms, most significant first.
    pub ordering: Vec<OrderClause>,
    /// To-one relations loaded in the same query.
    pub select_related: Vec<&'static str>,
    /// To-many relations loaded with one extra query for the whole page.
    pub prefetch_related: Vec<&'static str>,
    /// Maximum number of rows.
    pub limit: Option<u64>,
}

impl ComposedQuery {
    /// The unrestricted collection of `entity`.
    pub fn new(entity: Entity) -> Self {
        Self {
            entity,
            conditions: Vec::new(),
            annotations: Vec::new(),
            ordering: Vec::new(),
            select_related: Vec::new(),
            prefetch_related: Vec::new(),
            limit: None,
        }
    }

    /// AND another condition onto the query.
    pub fn and_where(&mut self, predicate: Predicate) {
        self.conditions.push(predicate);
    }

    /// Add `annotation` unless it is already present.
    ///
    /// Returns true when the annotation was added.
    pub fn ensure_annotation(&mut self, annotation: Annotation) -> bool {
        if self.annotations.iter().any(|a| a.name == annotation.name) {
            return false;
        }
        self.annotations.push(annotation);
        true
    }

    pub fn has_annotation(&self, name: &str) -> bool {
        self.annotations.iter().any(|a| a.name == name)
    }

    pub fn order_by(&mut self, clause: OrderClause) {
        self.ordering.push(clause);
    }

    pub fn select_related(&mut self, relation: &'static str) {
        if !self.select_related.contains(&relation) {
            self.select_related.push(relation);
        }
    }

    pub fn prefetch_related(&mut self, relation: &'static str) {
        if !self.prefetch_related.contains(&relation) {
            self.prefetch_related.push(relation);
        }
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether the query groups rows to compute annotations.
    pub fn is_grouped(&self) -> bool {
        !self.annotations.is_empty()
    }

    /// Conditions evaluated per row (SQL `WHERE`).
    pub fn row_conditions(&self) -> impl Iterator<Item = &Predicate> {
        self.conditions
            .iter()
            .filter(|p| !p.references_annotation())
    }

    /// Conditions evaluated per group (SQL `HAVING`).
    pub fn group_conditions(&self) -> impl Iterator<Item = &Predicate> {
        self.conditions
            .iter()
            .filter(|p| p.references_annotation())
    }

    /// To-one relations that must be joined: eager-loaded or filtered on.
    pub fn joined_relations(&self) -> Vec<&'static str> {
        let mut relations = self.select_related.clone();
        let referenced = self
            .conditions
            .iter()
            .flat_map(Predicate::columns)
            .chain(self.ordering.iter().filter_map(|o| match o.target {
                Operand::Column(field) => Some(field),
                Operand::Annotation(_) => None,
            }))
            .filter_map(|field| field.relation);
        for relation in referenced {
            if !relations.contains(&relation) {
                relations.push(relation);
            }
        }
        relations
    }
}
