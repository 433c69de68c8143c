//! SQL compiler that lowers a `QueryPlan` to dialect-specific SQL using sea-query.
//!
//! This is the only place marker tokens are expanded back into
//! fully qualified table references.

use sea_query::{
    Alias, Asterisk, Expr, Func, Iden, MysqlQueryBuilder, PostgresQueryBuilder, SelectStatement, SimpleExpr,
    SqliteQueryBuilder, SubQueryStatement, Values,
};

use crate::connection::Driver;
use crate::error::Result;
use crate::marker::CrossConnectionMarker;
use crate::plan::{Boolean, Clause, FromClause, LinkingPredicate, Operator, Predicate, Projection, QueryPlan};

/// Identifier wrapper for sea-query
#[derive(Debug, Clone)]
pub struct Ident(pub String);

impl Iden for Ident {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        write!(s, "{}", self.0).unwrap();
    }
}

/// Compiles plans for one SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct SqlCompiler {
    driver: Driver,
}

impl SqlCompiler {
    pub fn for_driver(driver: Driver) -> Self {
        Self { driver }
    }

    pub fn driver(&self) -> Driver {
        self.driver
    }

    /// Renders the plan with values inlined.
    pub fn to_sql(&self, plan: &QueryPlan) -> Result<String> {
        let select = self.compile(plan)?;
        Ok(match self.driver {
            Driver::Mysql => select.to_string(MysqlQueryBuilder),
            Driver::Postgres => select.to_string(PostgresQueryBuilder),
            Driver::Sqlite => select.to_string(SqliteQueryBuilder),
        })
    }

    /// Renders the plan with placeholders and the bound values.
    pub fn build(&self, plan: &QueryPlan) -> Result<(String, Values)> {
        let select = self.compile(plan)?;
        Ok(match self.driver {
            Driver::Mysql => select.build(MysqlQueryBuilder),
            Driver::Postgres => select.build(PostgresQueryBuilder),
            Driver::Sqlite => select.build(SqliteQueryBuilder),
        })
    }

    pub fn compile(&self, plan: &QueryPlan) -> Result<SelectStatement> {
        let mut select = SelectStatement::new();
        self.compile_from(&mut select, &plan.from)?;

        if plan.projection.is_empty() {
            select.column(Asterisk);
        }
        for projection in &plan.projection {
            self.compile_projection(&mut select, projection)?;
        }

        if let Some(linking) = &plan.linking {
            select.and_where(compile_linking(linking));
        }
        if let Some(condition) = self.compile_clauses(&plan.predicates)? {
            select.and_where(condition);
        }

        Ok(select)
    }

    fn compile_from(&self, select: &mut SelectStatement, from: &FromClause) -> Result<()> {
        match from {
            FromClause::Table { name, alias: None } => {
                select.from(Ident(name.clone()));
            }
            FromClause::Table {
                name,
                alias: Some(alias),
            } => {
                select.from_as(Ident(name.clone()), Ident(alias.clone()));
            }
            FromClause::Marker { token, alias } => {
                let marker = CrossConnectionMarker::decode(token)?;
                let physical = marker.prefixed_table();
                // Columns are qualified with the bare table name, so keep it reachable.
                let alias = alias
                    .clone()
                    .or_else(|| (physical != marker.table).then(|| marker.table.clone()));
                let table = (Ident(marker.database), Ident(physical));
                match alias {
                    Some(alias) => select.from_as(table, Ident(alias)),
                    None => select.from(table),
                };
            }
        }
        Ok(())
    }

    fn compile_projection(&self, select: &mut SelectStatement, projection: &Projection) -> Result<()> {
        match projection {
            Projection::AllColumns(table) => {
                select.column((Ident(table.clone()), Asterisk));
            }
            Projection::Column(column) => {
                select.expr(column_expr(column));
            }
            Projection::Constant(value) => {
                select.expr(Expr::val(*value));
            }
            Projection::CountAll => {
                select.expr(Func::count(Expr::col(Asterisk)));
            }
            Projection::SubSelect { plan, alias } => {
                select.expr_as(self.subquery(plan)?, Alias::new(alias.as_str()));
            }
            Projection::Membership { column, values, alias } => {
                let case = Expr::case(column_expr(column).is_in(values.iter().cloned()), 1).finally(0);
                select.expr_as(case, Alias::new(alias.as_str()));
            }
        }
        Ok(())
    }

    /// Folds clauses left to right with their own booleans; the first boolean is ignored.
    fn compile_clauses(&self, clauses: &[Clause]) -> Result<Option<SimpleExpr>> {
        let mut combined: Option<SimpleExpr> = None;
        for clause in clauses {
            let expr = self.compile_predicate(&clause.predicate)?;
            combined = Some(match combined {
                None => expr,
                Some(acc) => match clause.boolean {
                    Boolean::And => acc.and(expr),
                    Boolean::Or => acc.or(expr),
                },
            });
        }
        Ok(combined)
    }

    fn compile_predicate(&self, predicate: &Predicate) -> Result<SimpleExpr> {
        let expr = match predicate {
            Predicate::Compare { column, op, value } => compare(column_expr(column), *op, value.clone()),
            Predicate::Columns { left, op, right } => compare(column_expr(left), *op, column_expr(right)),
            Predicate::In {
                column,
                values,
                negated: false,
            } => column_expr(column).is_in(values.iter().cloned()),
            Predicate::In {
                column,
                values,
                negated: true,
            } => column_expr(column).is_not_in(values.iter().cloned()),
            Predicate::Null { column, negated: false } => column_expr(column).is_null(),
            Predicate::Null { column, negated: true } => column_expr(column).is_not_null(),
            Predicate::Exists(plan) => Expr::exists(self.compile(plan)?),
            Predicate::Count { plan, op, count } => compare(Expr::expr(self.subquery(plan)?), *op, *count),
            Predicate::Group(clauses) => match self.compile_clauses(clauses)? {
                Some(expr) => expr,
                None => Expr::val(true).into(),
            },
            Predicate::Constant(value) => Expr::val(*value).into(),
        };
        Ok(expr)
    }

    fn subquery(&self, plan: &QueryPlan) -> Result<SimpleExpr> {
        Ok(SimpleExpr::SubQuery(
            None,
            Box::new(SubQueryStatement::SelectStatement(self.compile(plan)?)),
        ))
    }
}

fn compile_linking(linking: &LinkingPredicate) -> SimpleExpr {
    column_expr(&linking.related).eq(column_expr(&linking.parent))
}

/// `table.column` or bare `column`
fn column_expr(name: &str) -> Expr {
    match name.split_once('.') {
        Some((table, column)) => Expr::col((Ident(table.to_string()), Ident(column.to_string()))),
        None => Expr::col(Ident(name.to_string())),
    }
}

fn compare<V>(lhs: Expr, op: Operator, rhs: V) -> SimpleExpr
where
    V: Into<SimpleExpr>,
{
    match op {
        Operator::Eq => lhs.eq(rhs),
        Operator::NotEq => lhs.ne(rhs),
        Operator::Gt => lhs.gt(rhs),
        Operator::Lt => lhs.lt(rhs),
        Operator::Gte => lhs.gte(rhs),
        Operator::Lte => lhs.lte(rhs),
    }
}
