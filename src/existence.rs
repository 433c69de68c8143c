//! Relation existence: `has` and friends.
//!
//! ## Dispatch
//!
//! ```text
//! has(relation, op, count, boolean, scope)
//!   ├─ dotted path      → has_nested()  (outer levels: >= 1, leaf: op/count)
//!   ├─ MorphTo          → UnsupportedRelationKind (use has_morph)
//!   └─ route()
//!        ├─ other host + BelongsTo        → decided at counts 0/1? constant clause
//!        │                                  else decompose(): fetch owner keys, local IN
//!        ├─ same database                 → embed as is
//!        ├─ outer can cross databases     → marker in subquery FROM
//!        └─ otherwise                     → best effort (or error when strict)
//! ```
//!
//! The relation subquery (`existence_query()`: exists-shaped for `(>=, 1)`,
//! count-shaped otherwise) is only built once a route needs it.

use std::rc::Rc;

use sea_query::Value;
use tracing::{debug, info, warn};

use crate::connection::same_host;
use crate::error::{ResolveError, Result};
use crate::marker::apply_marker;
use crate::plan::{Boolean, Clause, LinkingPredicate, Operator, Predicate, Projection};
use crate::query::{Query, Scope, Strategy};
use crate::relation::RelationDescriptor;
use crate::sql_compiler::SqlCompiler;

/// Projection of a relation subquery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// `SELECT 1`, wrapped in `EXISTS`.
    Exists,
    /// `SELECT COUNT(*)`, compared against the count.
    Count,
}

impl Shape {
    /// Only "at least one" may use the exists form.
    pub fn for_comparison(op: Operator, count: u64) -> Self {
        if op == Operator::Gte && count == 1 {
            Shape::Exists
        } else {
            Shape::Count
        }
    }
}

/// Where a relation subquery can run relative to the owning query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Route {
    Embed,
    Marker,
    Decompose,
    BestEffort,
}

/// Which related-row counts (0 or 1) satisfy a comparison on a belongs-to relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Always,
    Never,
    /// Satisfied by a matching owner row.
    Present,
    /// Satisfied by no matching owner row, null foreign keys included.
    Absent,
}

impl Membership {
    pub fn for_comparison(op: Operator, count: u64) -> Self {
        match (op.holds(0, count), op.holds(1, count)) {
            (true, true) => Membership::Always,
            (false, false) => Membership::Never,
            (false, true) => Membership::Present,
            (true, false) => Membership::Absent,
        }
    }

    /// The outcome when it does not depend on the related row.
    pub fn decided(self) -> Option<bool> {
        match self {
            Membership::Always => Some(true),
            Membership::Never => Some(false),
            Membership::Present | Membership::Absent => None,
        }
    }
}

impl<'c> Query<'c> {
    /// Filters on the number of related rows: `count(relation) <op> count`.
    ///
    /// `relation` may be a dotted path. `scope` constrains the related rows
    /// (at the leaf, for paths).
    pub fn has(
        &mut self,
        relation: &str,
        op: Operator,
        count: u64,
        boolean: Boolean,
        scope: Option<Scope<'c>>,
    ) -> Result<&mut Self> {
        if relation.contains('.') {
            return self.has_nested(relation, op, count, boolean, scope);
        }
        let descriptor = self.catalog.relation(&self.entity, relation)?;
        self.has_relation(&descriptor, op, count, boolean, scope)
    }

    pub fn or_has(&mut self, relation: &str, op: Operator, count: u64) -> Result<&mut Self> {
        self.has(relation, op, count, Boolean::Or, None)
    }

    pub fn doesnt_have(&mut self, relation: &str) -> Result<&mut Self> {
        self.has(relation, Operator::Lt, 1, Boolean::And, None)
    }

    pub fn or_doesnt_have(&mut self, relation: &str) -> Result<&mut Self> {
        self.has(relation, Operator::Lt, 1, Boolean::Or, None)
    }

    pub fn where_has<F>(&mut self, relation: &str, scope: F) -> Result<&mut Self>
    where
        F: FnOnce(&mut Query<'c>) -> Result<()> + 'c,
    {
        self.has(relation, Operator::Gte, 1, Boolean::And, Some(Box::new(scope)))
    }

    pub fn or_where_has<F>(&mut self, relation: &str, scope: F) -> Result<&mut Self>
    where
        F: FnOnce(&mut Query<'c>) -> Result<()> + 'c,
    {
        self.has(relation, Operator::Gte, 1, Boolean::Or, Some(Box::new(scope)))
    }

    pub fn where_doesnt_have<F>(&mut self, relation: &str, scope: F) -> Result<&mut Self>
    where
        F: FnOnce(&mut Query<'c>) -> Result<()> + 'c,
    {
        self.has(relation, Operator::Lt, 1, Boolean::And, Some(Box::new(scope)))
    }

    pub fn or_where_doesnt_have<F>(&mut self, relation: &str, scope: F) -> Result<&mut Self>
    where
        F: FnOnce(&mut Query<'c>) -> Result<()> + 'c,
    {
        self.has(relation, Operator::Lt, 1, Boolean::Or, Some(Box::new(scope)))
    }

    pub fn where_has_count<F>(&mut self, relation: &str, op: Operator, count: u64, scope: F) -> Result<&mut Self>
    where
        F: FnOnce(&mut Query<'c>) -> Result<()> + 'c,
    {
        self.has(relation, op, count, Boolean::And, Some(Box::new(scope)))
    }

    /// `has` for an already resolved relation.
    pub fn has_relation(
        &mut self,
        relation: &RelationDescriptor,
        op: Operator,
        count: u64,
        boolean: Boolean,
        scope: Option<Scope<'c>>,
    ) -> Result<&mut Self> {
        relation.ensure_not_polymorphic()?;
        let route = self.route(relation)?;
        let shape = Shape::for_comparison(op, count);

        if route == Route::Decompose {
            let membership = Membership::for_comparison(op, count);
            if let Some(holds) = membership.decided() {
                // scope is never run
                debug!(relation = %relation.name, %op, count, holds, "comparison decided without fetching");
                self.record(&relation.name, Strategy::Constant(holds));
                return Ok(self.push(boolean, Predicate::Constant(holds)));
            }
            let sub = self.existence_query(relation, shape, scope)?;
            return self.decompose(relation, sub, membership, boolean);
        }

        let sub = self.existence_query(relation, shape, scope)?;
        self.add_has_where(relation, route, sub, shape, op, count, boolean)
    }

    /// Nested existence along `a.b.c`.
    ///
    /// Every level but the leaf is a plain "exists" check; only the leaf
    /// carries `op`, `count` and `scope`.
    pub fn has_nested(
        &mut self,
        path: &str,
        op: Operator,
        count: u64,
        boolean: Boolean,
        scope: Option<Scope<'c>>,
    ) -> Result<&mut Self> {
        let chain = self.resolve_path(path)?;
        debug!(path, depth = chain.len(), "resolving nested relation path");

        let Some((_, rest)) = path.split_once('.') else {
            return self.has_relation(&chain[0], op, count, boolean, scope);
        };

        let rest = rest.to_string();
        let inner: Scope<'c> = Box::new(move |query: &mut Query<'c>| {
            query.has(&rest, op, count, Boolean::And, scope)?;
            Ok(())
        });
        self.has_relation(&chain[0], Operator::Gte, 1, boolean, Some(inner))
    }

    /// Bare lookup of every segment of a dotted path, outermost first.
    fn resolve_path(&self, path: &str) -> Result<Vec<RelationDescriptor>> {
        let mut entity = self.entity.clone();
        let mut chain = Vec::new();
        for segment in path.split('.') {
            let relation = self.catalog.relation(&entity, segment)?;
            relation.ensure_not_polymorphic()?;
            entity = relation.related_entity.clone();
            chain.push(relation);
        }
        Ok(chain)
    }

    /// Relation subquery: related table, linking predicate, shape projection,
    /// base constraints, then the caller's scope.
    pub(crate) fn existence_query(
        &self,
        relation: &RelationDescriptor,
        shape: Shape,
        scope: Option<Scope<'c>>,
    ) -> Result<Query<'c>> {
        let alias = (relation.related_table == self.table())
            .then(|| format!("{}_self_{}", relation.related_table, self.depth + 1));
        let mut sub = self.subquery(&relation.related_entity, relation.connection.clone(), alias)?;

        sub.plan.linking = Some(LinkingPredicate {
            related: sub.qualify(&relation.related_key),
            parent: self.qualify(&relation.parent_key),
        });
        sub.plan.projection = match shape {
            Shape::Exists => vec![Projection::Constant(1)],
            Shape::Count => vec![Projection::CountAll],
        };
        for constraint in &relation.constraints {
            let predicate = constraint.to_predicate(sub.table_ref());
            sub.push(Boolean::And, predicate);
        }

        if let Some(scope) = scope {
            scope(&mut sub)?;
        }
        Ok(sub)
    }

    /// Decides how the relation subquery can be attached to `self`.
    pub(crate) fn route(&self, relation: &RelationDescriptor) -> Result<Route> {
        let outer = self.connection.descriptor();
        let related = relation.connection_descriptor();
        let capabilities = relation.kind.capabilities();

        let route = if !same_host(outer, related) && capabilities.decomposition {
            Route::Decompose
        } else if outer.database == related.database {
            Route::Embed
        } else if outer.cross_database && capabilities.marker_encoding {
            Route::Marker
        } else if self.catalog.resolver_config().strict_cross_connection {
            return Err(ResolveError::UnsupportedCrossConnectionEmission {
                connection: self.connection.name().to_string(),
                relation: relation.name.clone(),
            });
        } else {
            warn!(
                relation = %relation.name,
                connection = self.connection.name(),
                related = relation.connection.name(),
                "connection cannot emit cross-database SQL; embedding subquery as is"
            );
            Route::BestEffort
        };

        debug!(
            relation = %relation.name,
            kind = ?relation.kind,
            route = ?route,
            "dispatching relation subquery"
        );
        Ok(route)
    }

    #[allow(clippy::too_many_arguments)]
    fn add_has_where(
        &mut self,
        relation: &RelationDescriptor,
        route: Route,
        mut sub: Query<'c>,
        shape: Shape,
        op: Operator,
        count: u64,
        boolean: Boolean,
    ) -> Result<&mut Self> {
        let strategy = embed(route, relation, &mut sub);
        let (plan, dispatches) = sub.finish();
        self.dispatches.extend(dispatches);
        self.record(&relation.name, strategy);

        let predicate = match shape {
            Shape::Exists => Predicate::Exists(Box::new(plan)),
            Shape::Count => Predicate::Count {
                plan: Box::new(plan),
                op,
                count,
            },
        };
        Ok(self.push(boolean, predicate))
    }

    /// Rewrites a cross-host belongs-to check as a local membership test on
    /// the foreign key, fetching the owner keys from the related connection.
    fn decompose(
        &mut self,
        relation: &RelationDescriptor,
        sub: Query<'c>,
        membership: Membership,
        boolean: Boolean,
    ) -> Result<&mut Self> {
        let foreign_key = self.qualify(&relation.parent_key);
        let values = self.fetch_owner_keys(relation, sub)?;
        self.record(
            &relation.name,
            Strategy::Decomposed {
                fetched: values.len(),
            },
        );

        let predicate = if membership == Membership::Present {
            Predicate::In {
                column: foreign_key,
                values,
                negated: false,
            }
        } else {
            Predicate::Group(vec![
                Clause::and(Predicate::In {
                    column: foreign_key.clone(),
                    values,
                    negated: true,
                }),
                Clause::or(Predicate::Null {
                    column: foreign_key,
                    negated: false,
                }),
            ])
        };
        Ok(self.push(boolean, predicate))
    }

    /// Runs the relation subquery on the related connection without its
    /// linking predicate, projecting only the owner key.
    pub(crate) fn fetch_owner_keys(&mut self, relation: &RelationDescriptor, sub: Query<'c>) -> Result<Vec<Value>> {
        let owner_key = sub.qualify(&relation.related_key);
        let (mut plan, dispatches) = sub.finish();
        self.dispatches.extend(dispatches);

        plan.linking = None;
        plan.projection = vec![Projection::Column(owner_key)];

        let connection = &relation.connection;
        let (sql, values) = SqlCompiler::for_driver(connection.descriptor().driver).build(&plan)?;
        let rows = connection
            .select_column(&sql, &values)
            .map_err(|source| ResolveError::RemoteFetchFailure {
                connection: connection.name().to_string(),
                source,
            })?;

        info!(
            relation = %relation.name,
            connection = connection.name(),
            fetched = rows.len(),
            "fetched owner keys for cross-host relation"
        );
        Ok(rows)
    }

    /// Existence across the concrete types of a polymorphic relation.
    ///
    /// Builds `(type = 'A' AND <A exists>) OR (type = 'B' AND <B exists>)`,
    /// attached to the query with `boolean`.
    pub fn has_morph(
        &mut self,
        relation: &str,
        types: &[&str],
        op: Operator,
        count: u64,
        boolean: Boolean,
    ) -> Result<&mut Self> {
        self.has_morph_scoped(relation, types, op, count, boolean, None)
    }

    /// `has_morph` with a scope that receives each concrete type name.
    pub fn where_has_morph<F>(&mut self, relation: &str, types: &[&str], scope: F) -> Result<&mut Self>
    where
        F: Fn(&mut Query<'c>, &str) -> Result<()> + 'c,
    {
        self.has_morph_scoped(relation, types, Operator::Gte, 1, Boolean::And, Some(Rc::new(scope)))
    }

    #[allow(clippy::type_complexity)]
    fn has_morph_scoped(
        &mut self,
        relation: &str,
        types: &[&str],
        op: Operator,
        count: u64,
        boolean: Boolean,
        scope: Option<Rc<dyn Fn(&mut Query<'c>, &str) -> Result<()> + 'c>>,
    ) -> Result<&mut Self> {
        let morph = self.catalog.relation(&self.entity, relation)?;
        let Some(type_column) = morph.morph_type.clone() else {
            return Err(ResolveError::UnsupportedRelationKind {
                entity: self.entity.clone(),
                relation: relation.to_string(),
                kind: morph.kind,
            });
        };

        if types.is_empty() {
            return Ok(self.push(boolean, Predicate::Constant(false)));
        }

        let catalog = self.catalog;
        self.where_group(boolean, |group| {
            for entity in types {
                let target = catalog.morph_target(&morph, entity)?;
                let alias = catalog.morph_alias(entity)?;
                let scope = scope.clone().map(|scope| {
                    let entity = entity.to_string();
                    Box::new(move |query: &mut Query<'c>| (*scope)(query, &entity)) as Scope<'c>
                });

                group.where_group(Boolean::Or, |branch| {
                    branch.where_col(&type_column, Operator::Eq, alias);
                    branch.has_relation(&target, op, count, Boolean::And, scope)?;
                    Ok(())
                })?;
            }
            Ok(())
        })
    }
}

/// Applies a non-decomposing route to `sub` and names the strategy used.
///
/// Shared by `has` and `with_count` so both attach subqueries identically.
pub(crate) fn embed(route: Route, relation: &RelationDescriptor, sub: &mut Query<'_>) -> Strategy {
    match route {
        Route::Marker => Strategy::MarkerEncoded {
            token: apply_marker(&mut sub.plan, relation.connection_descriptor()),
        },
        Route::BestEffort => Strategy::BestEffort,
        Route::Embed | Route::Decompose => Strategy::Embedded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_selection() {
        assert_eq!(Shape::for_comparison(Operator::Gte, 1), Shape::Exists);
        assert_eq!(Shape::for_comparison(Operator::Gte, 2), Shape::Count);
        assert_eq!(Shape::for_comparison(Operator::Gt, 0), Shape::Count);
        assert_eq!(Shape::for_comparison(Operator::Lt, 1), Shape::Count);
    }

    #[test]
    fn test_membership_reduction() {
        assert_eq!(Membership::for_comparison(Operator::Gte, 1), Membership::Present);
        assert_eq!(Membership::for_comparison(Operator::Eq, 1), Membership::Present);
        assert_eq!(Membership::for_comparison(Operator::Gt, 0), Membership::Present);
        assert_eq!(Membership::for_comparison(Operator::Lt, 1), Membership::Absent);
        assert_eq!(Membership::for_comparison(Operator::Eq, 0), Membership::Absent);
        assert_eq!(Membership::for_comparison(Operator::Lt, 2), Membership::Always);
        assert_eq!(Membership::for_comparison(Operator::Gte, 0), Membership::Always);
        assert_eq!(Membership::for_comparison(Operator::Gte, 2), Membership::Never);
        assert_eq!(Membership::for_comparison(Operator::NotEq, 1), Membership::Absent);
    }

    #[test]
    fn test_membership_decided() {
        assert_eq!(Membership::Always.decided(), Some(true));
        assert_eq!(Membership::Never.decided(), Some(false));
        assert_eq!(Membership::Present.decided(), None);
        assert_eq!(Membership::Absent.decided(), None);
    }
}
