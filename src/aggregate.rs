//! Count annotation (`with_count`): one sub-selected count column per relation.

use convert_case::{Case, Casing};
use tracing::debug;

use crate::error::Result;
use crate::existence::{embed, Route, Shape};
use crate::plan::{Projection, QueryPlan};
use crate::query::{Query, Scope, Strategy};

/// One entry of a `with_count` call: `"name"` or `"name as alias"`, optionally scoped.
pub struct CountRelation<'c> {
    /// `name` or `name as alias`
    pub expr: String,
    pub scope: Option<Scope<'c>>,
}

impl<'c> CountRelation<'c> {
    pub fn new(expr: impl Into<String>) -> Self {
        Self {
            expr: expr.into(),
            scope: None,
        }
    }

    pub fn scoped<F>(expr: impl Into<String>, scope: F) -> Self
    where
        F: FnOnce(&mut Query<'c>) -> Result<()> + 'c,
    {
        Self {
            expr: expr.into(),
            scope: Some(Box::new(scope)),
        }
    }
}

impl From<&str> for CountRelation<'_> {
    fn from(expr: &str) -> Self {
        CountRelation::new(expr)
    }
}

impl From<String> for CountRelation<'_> {
    fn from(expr: String) -> Self {
        CountRelation::new(expr)
    }
}

/// Splits `"name as alias"`. Anything but exactly three tokens with a
/// case-insensitive `as` in the middle is a plain relation name.
pub fn parse_alias(expr: &str) -> (&str, Option<&str>) {
    let tokens: Vec<&str> = expr.split_whitespace().collect();
    match tokens.as_slice() {
        [name, keyword, alias] if keyword.eq_ignore_ascii_case("as") => (name, Some(alias)),
        _ => (expr, None),
    }
}

/// `postComments` → `post_comments_count`
pub fn count_column_name(relation: &str) -> String {
    format!("{}_count", relation.to_case(Case::Snake))
}

impl<'c> Query<'c> {
    /// Appends a `<relation>_count` column (or the given alias) per entry.
    ///
    /// Entries are independent; the same relation may be counted several
    /// times under different aliases. On error the query is left as it was.
    pub fn with_count<I>(&mut self, relations: I) -> Result<&mut Self>
    where
        I: IntoIterator,
        I::Item: Into<CountRelation<'c>>,
    {
        let mut relations = relations.into_iter().peekable();
        if relations.peek().is_none() {
            return Ok(self);
        }

        let (projected, dispatched) = (self.plan.projection.len(), self.dispatches.len());
        if let Err(err) = self.add_count_columns(relations) {
            self.plan.projection.truncate(projected);
            self.dispatches.truncate(dispatched);
            return Err(err);
        }
        Ok(self)
    }

    fn add_count_columns<I>(&mut self, relations: I) -> Result<()>
    where
        I: Iterator,
        I::Item: Into<CountRelation<'c>>,
    {
        if self.plan.projection.is_empty() {
            let all = Projection::AllColumns(self.table_ref().to_string());
            self.plan.projection.push(all);
        }

        for entry in relations {
            let CountRelation { expr, scope } = entry.into();
            let (name, alias) = parse_alias(&expr);
            let column = alias.map_or_else(|| count_column_name(name), str::to_string);

            let relation = self.catalog.relation(&self.entity, name)?;
            relation.ensure_not_polymorphic()?;
            let route = self.route(&relation)?;
            let mut sub = self.existence_query(&relation, Shape::Count, scope)?;

            let projection = match route {
                Route::Decompose => {
                    let values = self.fetch_owner_keys(&relation, sub)?;
                    self.record(
                        &relation.name,
                        Strategy::Decomposed {
                            fetched: values.len(),
                        },
                    );
                    Projection::Membership {
                        column: self.qualify(&relation.parent_key),
                        values,
                        alias: column,
                    }
                }
                route => {
                    let strategy = embed(route, &relation, &mut sub);
                    let (plan, dispatches) = sub.finish();
                    self.dispatches.extend(dispatches);
                    self.record(&relation.name, strategy);
                    Projection::SubSelect {
                        plan: Box::new(single_column(plan)),
                        alias: column,
                    }
                }
            };

            debug!(relation = name, column = projection.alias(), "added count column");
            self.plan.projection.push(projection);
        }

        Ok(())
    }
}

/// Keeps only the first projected column of a count subquery.
fn single_column(mut plan: QueryPlan) -> QueryPlan {
    plan.projection.truncate(1);
    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_alias() {
        assert_eq!(parse_alias("posts as p"), ("posts", Some("p")));
        assert_eq!(parse_alias("posts AS recent"), ("posts", Some("recent")));
        assert_eq!(parse_alias("  posts   As   p "), ("posts", Some("p")));
        assert_eq!(parse_alias("posts"), ("posts", None));
        assert_eq!(parse_alias("posts p"), ("posts p", None));
        assert_eq!(parse_alias("posts as"), ("posts as", None));
        assert_eq!(parse_alias("posts to p"), ("posts to p", None));
        assert_eq!(parse_alias("posts as p q"), ("posts as p q", None));
    }

    #[test]
    fn test_count_column_name() {
        assert_eq!(count_column_name("posts"), "posts_count");
        assert_eq!(count_column_name("approvedComments"), "approved_comments_count");
        assert_eq!(count_column_name("line_items"), "line_items_count");
    }
}
