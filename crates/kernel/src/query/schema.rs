//! Catalog entity schema.
//!
//! Describes the tables, scalar fields, and relations the query layer can
//! filter over. Field paths are resolved against this description once,
//! while filter sets and endpoints are built.

use std::fmt;

use serde::Serialize;

use super::QueryError;

/// Queryable catalog entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Entity {
    Author,
    Book,
}

impl Entity {
    /// Static schema for this entity.
    pub fn schema(self) -> &'static EntitySchema {
        match self {
            Entity::Author => &AUTHOR,
            Entity::Book => &BOOK,
        }
    }

    /// Backing table name.
    pub fn table(self) -> &'static str {
        self.schema().table
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// Scalar kind of a stored field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Integer,
    Text,
}

/// A stored scalar field.
#[derive(Debug)]
pub struct FieldDef {
    pub name: &'static str,
    pub column: &'static str,
    pub kind: FieldKind,
}

/// How a relation is keyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// The local column holds the target's id.
    ToOne { local_column: &'static str },
    /// The target's column holds this entity's id.
    ToMany { foreign_column: &'static str },
}

/// A named relation from one entity to another.
#[derive(Debug)]
pub struct RelationDef {
    pub name: &'static str,
    pub target: Entity,
    pub cardinality: Cardinality,
}

/// Schema of one entity.
#[derive(Debug)]
pub struct EntitySchema {
    pub entity: Entity,
    pub table: &'static str,
    pub fields: &'static [FieldDef],
    pub relations: &'static [RelationDef],
}

impl EntitySchema {
    pub fn field(&self, name: &str) -> Option<&'static FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn relation(&self, name: &str) -> Option<&'static RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }
}

static AUTHOR: EntitySchema = EntitySchema {
    entity: Entity::Author,
    table: "author",
    fields: &[
        FieldDef {
            name: "id",
            column: "id",
            kind: FieldKind::Integer,
        },
        FieldDef {
            name: "name",
            column: "name",
            kind: FieldKind::Text,
        },
    ],
    relations: &[RelationDef {
        name: "books",
        target: Entity::Book,
        cardinality: Cardinality::ToMany {
            foreign_column: "author_id",
        },
    }],
};

static BOOK: EntitySchema = EntitySchema {
    entity: Entity::Book,
    table: "book",
    fields: &[
        FieldDef {
            name: "id",
            column: "id",
            kind: FieldKind::Integer,
        },
        FieldDef {
            name: "title",
            column: "title",
            kind: FieldKind::Text,
        },
        FieldDef {
            name: "publication_year",
            column: "publication_year",
            kind: FieldKind::Integer,
        },
    ],
    relations: &[RelationDef {
        name: "author",
        target: Entity::Author,
        cardinality: Cardinality::ToOne {
            local_column: "author_id",
        },
    }],
};

/// Typed path from an entity to a scalar field: an ordered list of hops.
///
/// `FieldPath::related("author", "name")` on Book reaches `author.name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath(Vec<&'static str>);

impl FieldPath {
    /// A field stored on the entity itself.
    pub fn field(name: &'static str) -> Self {
        Self(vec![name])
    }

    /// A field reached through one relation hop.
    pub fn related(relation: &'static str, field: &'static str) -> Self {
        Self(vec![relation, field])
    }

    /// Build a path from explicit hops.
    pub fn from_hops(hops: impl IntoIterator<Item = &'static str>) -> Self {
        Self(hops.into_iter().collect())
    }

    /// Resolve this path against `entity`'s schema.
    ///
    /// Only to-one relations may be traversed, and only one hop deep.
    pub fn resolve(&self, entity: Entity) -> Result<ResolvedField, QueryError> {
        let schema = entity.schema();
        match self.0.as_slice() {
            [name] => {
                let field = schema.field(name).ok_or_else(|| {
                    QueryError::config(format!("{entity} has no field '{name}'"))
                })?;
                Ok(ResolvedField {
                    entity,
                    column: field.column,
                    kind: field.kind,
                    relation: None,
                })
            }
            [hop, name] => {
                let relation = schema.relation(hop).ok_or_else(|| {
                    QueryError::config(format!("{entity} has no relation '{hop}'"))
                })?;
                let Cardinality::ToOne { local_column } = relation.cardinality else {
                    return Err(QueryError::config(format!(
                        "relation '{hop}' on {entity} is to-many and cannot be traversed by a filter"
                    )));
                };
                let target = relation.target;
                let field = target.schema().field(name).ok_or_else(|| {
                    QueryError::config(format!("{target} has no field '{name}'"))
                })?;

                // The related id is already stored locally; no join needed.
                if field.name == "id" {
                    return Ok(ResolvedField {
                        entity,
                        column: local_column,
                        kind: FieldKind::Integer,
                        relation: None,
                    });
                }

                Ok(ResolvedField {
                    entity: target,
                    column: field.column,
                    kind: field.kind,
                    relation: Some(relation.name),
                })
            }
            _ => Err(QueryError::config(format!(
                "field path '{self}' must have one or two hops"
            ))),
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// A field path resolved to a concrete table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResolvedField {
    /// Entity whose table holds the column.
    pub entity: Entity,
    /// Column name.
    pub column: &'static str,
    /// Scalar kind.
    pub kind: FieldKind,
    /// To-one relation joined to reach the column, if any.
    pub relation: Option<&'static str>,
}

impl ResolvedField {
    pub fn table(&self) -> &'static str {
        self.entity.table()
    }
}
