//! The query builder the resolver plugs into.
//!
//! Only the primitives the resolver and its scope callbacks need are here:
//! `where_*` clauses, grouping, projection and compilation. Relation
//! existence lives in [`crate::existence`], count annotation in
//! [`crate::aggregate`].

use std::sync::Arc;

use sea_query::{Value, Values};

use crate::catalog::Catalog;
use crate::connection::Connection;
use crate::error::Result;
use crate::plan::{Boolean, Clause, FromClause, Operator, Predicate, Projection, QueryPlan};
use crate::relation::qualify;
use crate::sql_compiler::SqlCompiler;

/// Extra constraints applied to a relation subquery, as if it were a fresh
/// top-level query on the related entity.
pub type Scope<'c> = Box<dyn FnOnce(&mut Query<'c>) -> Result<()> + 'c>;

/// How one relation was attached to the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// Plain correlated subquery on a joinable namespace.
    Embedded,
    /// Subquery `FROM` replaced with a cross-connection marker.
    MarkerEncoded { token: String },
    /// Owner keys fetched from the related connection and inlined.
    Decomposed { fetched: usize },
    /// Databases differ but the connection cannot emit cross-database SQL.
    BestEffort,
    /// The comparison could be decided without touching the related table.
    Constant(bool),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub relation: String,
    pub strategy: Strategy,
}

/// A select on one entity, bound to that entity's connection.
#[derive(Debug)]
pub struct Query<'c> {
    pub(crate) catalog: &'c Catalog,
    pub(crate) entity: String,
    pub(crate) connection: Arc<dyn Connection>,
    pub(crate) plan: QueryPlan,
    /// Subquery nesting level, 0 for the top-level query.
    pub(crate) depth: usize,
    pub(crate) dispatches: Vec<Dispatch>,
}

impl<'c> Query<'c> {
    pub fn new(catalog: &'c Catalog, entity: &str) -> Result<Self> {
        let def = catalog.entity(entity)?;
        let connection = Arc::clone(catalog.connection(&def.connection)?);
        let plan = QueryPlan::new(def.table.clone(), connection.descriptor().clone());
        Ok(Self {
            catalog,
            entity: entity.to_string(),
            connection,
            plan,
            depth: 0,
            dispatches: Vec::new(),
        })
    }

    /// Query on `entity` nested one level below `self`, optionally aliased.
    pub(crate) fn subquery(&self, entity: &str, connection: Arc<dyn Connection>, alias: Option<String>) -> Result<Self> {
        let def = self.catalog.entity(entity)?;
        let mut plan = QueryPlan::new(def.table.clone(), connection.descriptor().clone());
        plan.from = FromClause::Table {
            name: def.table.clone(),
            alias,
        };
        Ok(Self {
            catalog: self.catalog,
            entity: entity.to_string(),
            connection,
            plan,
            depth: self.depth + 1,
            dispatches: Vec::new(),
        })
    }

    /// Same entity and table reference, empty clause list; used for grouping.
    pub(crate) fn fork(&self) -> Self {
        let mut plan = QueryPlan::new(self.table(), self.plan.connection.clone());
        plan.from = self.plan.from.clone();
        Self {
            catalog: self.catalog,
            entity: self.entity.clone(),
            connection: Arc::clone(&self.connection),
            plan,
            depth: self.depth,
            dispatches: Vec::new(),
        }
    }

    pub fn catalog(&self) -> &'c Catalog {
        self.catalog
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    pub fn into_plan(self) -> QueryPlan {
        self.plan
    }

    /// Strategies chosen so far, nested subqueries first.
    pub fn dispatches(&self) -> &[Dispatch] {
        &self.dispatches
    }

    /// Physical table name, before any marker substitution.
    pub fn table(&self) -> &str {
        match &self.plan.from {
            FromClause::Table { name, .. } => name,
            FromClause::Marker { .. } => self
                .catalog
                .entity(&self.entity)
                .map(|def| def.table.as_str())
                .unwrap_or_default(),
        }
    }

    /// Name columns of this query are qualified with: the alias if any, else the table.
    pub fn table_ref(&self) -> &str {
        self.plan.from.alias().unwrap_or_else(|| self.table())
    }

    pub fn qualify(&self, column: &str) -> String {
        qualify(self.table_ref(), column)
    }

    pub(crate) fn push(&mut self, boolean: Boolean, predicate: Predicate) -> &mut Self {
        self.plan.predicates.push(Clause::new(boolean, predicate));
        self
    }

    pub(crate) fn record(&mut self, relation: &str, strategy: Strategy) {
        self.dispatches.push(Dispatch {
            relation: relation.to_string(),
            strategy,
        });
    }

    /// Splits a finished subquery into its plan and the dispatches it accumulated.
    pub(crate) fn finish(self) -> (QueryPlan, Vec<Dispatch>) {
        (self.plan, self.dispatches)
    }

    pub fn where_col(&mut self, column: &str, op: Operator, value: impl Into<Value>) -> &mut Self {
        let column = self.qualify(column);
        self.push(
            Boolean::And,
            Predicate::Compare {
                column,
                op,
                value: value.into(),
            },
        )
    }

    pub fn or_where_col(&mut self, column: &str, op: Operator, value: impl Into<Value>) -> &mut Self {
        let column = self.qualify(column);
        self.push(
            Boolean::Or,
            Predicate::Compare {
                column,
                op,
                value: value.into(),
            },
        )
    }

    /// Column-to-column comparison; both sides are qualified with this query's table.
    pub fn where_column(&mut self, left: &str, op: Operator, right: &str) -> &mut Self {
        let (left, right) = (self.qualify(left), self.qualify(right));
        self.push(Boolean::And, Predicate::Columns { left, op, right })
    }

    pub fn where_in<I, V>(&mut self, column: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let column = self.qualify(column);
        let values = values.into_iter().map(Into::into).collect();
        self.push(
            Boolean::And,
            Predicate::In {
                column,
                values,
                negated: false,
            },
        )
    }

    pub fn where_not_in<I, V>(&mut self, column: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let column = self.qualify(column);
        let values = values.into_iter().map(Into::into).collect();
        self.push(
            Boolean::And,
            Predicate::In {
                column,
                values,
                negated: true,
            },
        )
    }

    pub fn where_null(&mut self, column: &str) -> &mut Self {
        let column = self.qualify(column);
        self.push(Boolean::And, Predicate::Null { column, negated: false })
    }

    pub fn where_not_null(&mut self, column: &str) -> &mut Self {
        let column = self.qualify(column);
        self.push(Boolean::And, Predicate::Null { column, negated: true })
    }

    /// Parenthesised group of clauses built by `build`. Empty groups are dropped.
    pub fn where_group<F>(&mut self, boolean: Boolean, build: F) -> Result<&mut Self>
    where
        F: FnOnce(&mut Query<'c>) -> Result<()>,
    {
        let mut group = self.fork();
        build(&mut group)?;
        let (plan, dispatches) = group.finish();
        self.dispatches.extend(dispatches);
        if !plan.predicates.is_empty() {
            self.push(boolean, Predicate::Group(plan.predicates));
        }
        Ok(self)
    }

    /// Adds plain columns to the projection.
    pub fn select<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for column in columns {
            let column = self.qualify(column.as_ref());
            self.plan.projection.push(Projection::Column(column));
        }
        self
    }

    /// Compiles for this query's connection, values inlined.
    pub fn to_sql(&self) -> Result<String> {
        SqlCompiler::for_driver(self.plan.connection.driver).to_sql(&self.plan)
    }

    /// Compiles for this query's connection with placeholders.
    pub fn build(&self) -> Result<(String, Values)> {
        SqlCompiler::for_driver(self.plan.connection.driver).build(&self.plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::EntityDef;
    use crate::connection::{ConnectionDescriptor, Driver, StaticConnection};

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog
            .add_connection(
                "main",
                Arc::new(StaticConnection::new(
                    "main",
                    ConnectionDescriptor::new(Driver::Sqlite, "", 0, "main"),
                )),
            )
            .add_entity("User", EntityDef::new("users", "main"));
        catalog
    }

    #[test]
    fn test_where_primitives_qualify_columns() {
        let catalog = catalog();
        let mut query = catalog.query("User").unwrap();
        query
            .where_col("name", Operator::Eq, "ada")
            .or_where_col("other.name", Operator::NotEq, "bob")
            .where_null("deleted_at");

        let predicates = &query.plan().predicates;
        assert_eq!(predicates.len(), 3);
        assert_eq!(predicates[1].boolean, Boolean::Or);
        assert_eq!(
            predicates[0].predicate,
            Predicate::Compare {
                column: "users.name".to_string(),
                op: Operator::Eq,
                value: Value::from("ada"),
            }
        );
        assert!(matches!(&predicates[1].predicate, Predicate::Compare { column, .. } if column == "other.name"));
    }

    #[test]
    fn test_where_group_nests_and_drops_empty() {
        let catalog = catalog();
        let mut query = catalog.query("User").unwrap();
        query
            .where_group(Boolean::And, |q| {
                q.where_in("id", [1i64, 2]).or_where_col("admin", Operator::Eq, true);
                Ok(())
            })
            .unwrap()
            .where_group(Boolean::Or, |_| Ok(()))
            .unwrap();

        assert_eq!(query.plan().predicates.len(), 1);
        let sql = query.to_sql().unwrap();
        assert!(sql.contains(r#"WHERE "users"."id" IN (1, 2) OR "users"."admin" = "#));
    }

    #[test]
    fn test_unknown_entity() {
        let catalog = catalog();
        assert!(catalog.query("Nope").is_err());
    }

    #[test]
    fn test_select_and_build() {
        let catalog = catalog();
        let mut query = catalog.query("User").unwrap();
        query.select(["id", "name"]).where_not_in("id", [7i64]);
        let (sql, values) = query.build().unwrap();
        assert_eq!(sql, r#"SELECT "users"."id", "users"."name" FROM "users" WHERE "users"."id" NOT IN (?)"#);
        assert_eq!(values.0, vec![Value::from(7i64)]);
    }
}
