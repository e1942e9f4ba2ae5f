//! Catalog query builder using SeaQuery.
//!
//! Renders a [`ComposedQuery`] into Postgres SQL:
//! - to-one relations become `INNER JOIN`s aliased by relation name
//! - annotations become a `LEFT JOIN` plus `GROUP BY`, with comparisons
//!   against them in `HAVING`
//! - case-insensitive contains compares `LOWER(column)` with `LIKE`

use sea_query::{
    Alias, Asterisk, Cond, Expr, Func, JoinType, NullOrdering, Order, PostgresQueryBuilder, Query,
    SelectStatement, SimpleExpr, Value,
};

use super::QueryError;
use super::schema::{Cardinality, Entity, RelationDef};
use super::types::{
    Aggregate, Annotation, ComposedQuery, Lookup, NullsOrder, Operand, Predicate, Scalar,
    SortDirection,
};

/// A plain column in the projection.
struct ProjectedColumn {
    qualifier: &'static str,
    column: &'static str,
    alias: Option<String>,
}

/// Query builder for catalog reads.
pub struct CatalogQueryBuilder<'a> {
    query: &'a ComposedQuery,
}

impl<'a> CatalogQueryBuilder<'a> {
    pub fn new(query: &'a ComposedQuery) -> Self {
        Self { query }
    }

    /// Build the SELECT with ordering and limit.
    pub fn build(&self) -> Result<String, QueryError> {
        let mut select = self.select()?;

        // ORDER BY
        self.add_sorts(&mut select);

        if let Some(limit) = self.query.limit {
            select.limit(limit);
        }

        Ok(select.to_string(PostgresQueryBuilder))
    }

    /// Build a COUNT over the filtered (and grouped) rows.
    pub fn build_count(&self) -> Result<String, QueryError> {
        let inner = self.select()?;

        let mut count = Query::select();
        count
            .expr(Expr::col(Asterisk).count())
            .from_subquery(inner, Alias::new("filtered"));

        Ok(count.to_string(PostgresQueryBuilder))
    }

    /// Book counts per publication year, largest buckets first.
    pub fn year_buckets(limit: u64) -> String {
        let year = (Alias::new("book"), Alias::new("publication_year"));
        let count = Expr::col((Alias::new("book"), Alias::new("id"))).count();

        let mut select = Query::select();
        select
            .column(year.clone())
            .expr_as(count.clone(), Alias::new("book_count"))
            .from(Alias::new("book"))
            .group_by_col(year.clone())
            .order_by_expr(count, Order::Desc)
            .order_by(year, Order::Desc)
            .limit(limit);

        select.to_string(PostgresQueryBuilder)
    }

    fn select(&self) -> Result<SelectStatement, QueryError> {
        let mut select = Query::select();

        // FROM base table
        select.from(Alias::new(self.base()));

        // SELECT columns and annotations
        let columns = self.projected_columns()?;
        for column in &columns {
            let col = Expr::col((Alias::new(column.qualifier), Alias::new(column.column)));
            match &column.alias {
                Some(alias) => {
                    select.expr_as(col, Alias::new(alias));
                }
                None => {
                    select.expr(col);
                }
            }
        }
        for annotation in &self.query.annotations {
            select.expr_as(self.aggregate_expr(annotation), Alias::new(annotation.name));
        }

        // JOINs
        self.add_joins(&mut select)?;

        // WHERE / HAVING
        for predicate in self.query.row_conditions() {
            select.and_where(self.condition(predicate));
        }
        if self.query.is_grouped() {
            for column in &columns {
                select.group_by_col((Alias::new(column.qualifier), Alias::new(column.column)));
            }
            for predicate in self.query.group_conditions() {
                select.and_having(self.condition(predicate));
            }
        }

        Ok(select)
    }

    fn base(&self) -> &'static str {
        self.query.entity.table()
    }

    /// Stored fields, to-one keys, and columns of eager-loaded relations.
    fn projected_columns(&self) -> Result<Vec<ProjectedColumn>, QueryError> {
        let schema = self.query.entity.schema();
        let base = self.base();

        let mut columns: Vec<ProjectedColumn> = schema
            .fields
            .iter()
            .map(|field| ProjectedColumn {
                qualifier: base,
                column: field.column,
                alias: None,
            })
            .collect();

        for relation in schema.relations {
            if let Cardinality::ToOne { local_column } = relation.cardinality {
                columns.push(ProjectedColumn {
                    qualifier: base,
                    column: local_column,
                    alias: None,
                });
            }
        }

        for name in &self.query.select_related {
            let relation = to_one(self.query.entity, name)?;
            for field in relation.target.schema().fields {
                if field.name == "id" {
                    continue;
                }
                columns.push(ProjectedColumn {
                    qualifier: relation.name,
                    column: field.column,
                    alias: Some(format!("{}_{}", relation.name, field.name)),
                });
            }
        }

        Ok(columns)
    }

    /// Add JOIN clauses: INNER for to-one, LEFT for aggregated to-many.
    fn add_joins(&self, select: &mut SelectStatement) -> Result<(), QueryError> {
        let entity = self.query.entity;
        let base = self.base();

        for name in self.query.joined_relations() {
            let relation = to_one(entity, name)?;
            let Cardinality::ToOne { local_column } = relation.cardinality else {
                continue;
            };
            select.join_as(
                JoinType::InnerJoin,
                Alias::new(relation.target.table()),
                Alias::new(relation.name),
                Expr::col((Alias::new(base), Alias::new(local_column)))
                    .equals((Alias::new(relation.name), Alias::new("id"))),
            );
        }

        let mut aggregated: Vec<&'static str> = Vec::new();
        for annotation in &self.query.annotations {
            if aggregated.contains(&annotation.relation) {
                continue;
            }
            let relation = entity.schema().relation(annotation.relation).ok_or_else(|| {
                QueryError::config(format!(
                    "{entity} has no relation '{}'",
                    annotation.relation
                ))
            })?;
            let Cardinality::ToMany { foreign_column } = relation.cardinality else {
                return Err(QueryError::config(format!(
                    "annotation '{}' needs a to-many relation",
                    annotation.name
                )));
            };
            select.join_as(
                JoinType::LeftJoin,
                Alias::new(relation.target.table()),
                Alias::new(relation.name),
                Expr::col((Alias::new(base), Alias::new("id")))
                    .equals((Alias::new(relation.name), Alias::new(foreign_column))),
            );
            aggregated.push(annotation.relation);
        }

        Ok(())
    }

    fn add_sorts(&self, select: &mut SelectStatement) {
        for clause in &self.query.ordering {
            let order = match clause.direction {
                SortDirection::Asc => Order::Asc,
                SortDirection::Desc => Order::Desc,
            };
            let expr = self.operand_expr(&clause.target);
            match clause.nulls {
                Some(nulls) => {
                    let nulls = match nulls {
                        NullsOrder::First => NullOrdering::First,
                        NullsOrder::Last => NullOrdering::Last,
                    };
                    select.order_by_expr_with_nulls(expr, order, nulls);
                }
                None => {
                    select.order_by_expr(expr, order);
                }
            }
        }
    }

    /// Build one WHERE/HAVING condition.
    fn condition(&self, predicate: &Predicate) -> SimpleExpr {
        match predicate {
            Predicate::Compare {
                operand,
                lookup,
                value,
            } => self.comparison(operand, *lookup, value),
            Predicate::In { operand, values } => Expr::expr(self.operand_expr(operand))
                .is_in(values.iter().map(sql_value).collect::<Vec<_>>()),
            Predicate::Any(parts) => {
                if parts.is_empty() {
                    return Expr::cust("FALSE");
                }
                parts
                    .iter()
                    .fold(Cond::any(), |cond, part| cond.add(self.condition(part)))
                    .into()
            }
            Predicate::All(parts) => {
                if parts.is_empty() {
                    return Expr::cust("TRUE");
                }
                parts
                    .iter()
                    .fold(Cond::all(), |cond, part| cond.add(self.condition(part)))
                    .into()
            }
        }
    }

    fn comparison(&self, operand: &Operand, lookup: Lookup, value: &Scalar) -> SimpleExpr {
        let expr = Expr::expr(self.operand_expr(operand));
        match lookup {
            Lookup::Equal => expr.eq(sql_value(value)),
            Lookup::Contains => {
                let term = text(value).to_lowercase();
                Expr::expr(Func::lower(self.operand_expr(operand)))
                    .like(format!("%{}%", escape_like_wildcards(&term)))
            }
            Lookup::StartsWith => {
                expr.like(format!("{}%", escape_like_wildcards(&text(value))))
            }
            Lookup::GreaterThan => expr.gt(sql_value(value)),
            Lookup::GreaterOrEqual => expr.gte(sql_value(value)),
            Lookup::LessThan => expr.lt(sql_value(value)),
            Lookup::LessOrEqual => expr.lte(sql_value(value)),
            Lookup::In => expr.is_in([sql_value(value)]),
        }
    }

    fn operand_expr(&self, operand: &Operand) -> SimpleExpr {
        match operand {
            Operand::Column(field) => {
                let qualifier = field.relation.unwrap_or_else(|| field.table());
                Expr::col((Alias::new(qualifier), Alias::new(field.column))).into()
            }
            Operand::Annotation(annotation) => self.aggregate_expr(annotation),
        }
    }

    /// `COUNT(rel.id)` or `MAX(rel.column)` over the joined relation.
    fn aggregate_expr(&self, annotation: &Annotation) -> SimpleExpr {
        let relation = annotation.relation;
        match annotation.aggregate {
            Aggregate::Count => Expr::col((Alias::new(relation), Alias::new("id"))).count(),
            Aggregate::Max(field) => {
                let column = self
                    .query
                    .entity
                    .schema()
                    .relation(relation)
                    .and_then(|r| r.target.schema().field(field))
                    .map_or(field, |f| f.column);
                Expr::col((Alias::new(relation), Alias::new(column))).max()
            }
        }
    }
}

fn to_one(entity: Entity, name: &str) -> Result<&'static RelationDef, QueryError> {
    entity
        .schema()
        .relation(name)
        .filter(|r| matches!(r.cardinality, Cardinality::ToOne { .. }))
        .ok_or_else(|| QueryError::config(format!("{entity} has no to-one relation '{name}'")))
}

fn sql_value(scalar: &Scalar) -> Value {
    match scalar {
        Scalar::Int(i) => (*i).into(),
        Scalar::Text(s) => s.clone().into(),
    }
}

fn text(scalar: &Scalar) -> String {
    match scalar {
        Scalar::Int(i) => i.to_string(),
        Scalar::Text(s) => s.clone(),
    }
}

/// Escape SQL LIKE wildcard characters in a user-provided value.
///
/// Prevents `%` and `_` from being interpreted as wildcards in LIKE patterns.
pub fn escape_like_wildcards(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
