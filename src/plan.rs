//! In-memory query plans built by the resolver and lowered by the SQL compiler.

use std::fmt;
use std::str::FromStr;

use sea_query::Value;
use serde::{Deserialize, Serialize};

use crate::connection::ConnectionDescriptor;
use crate::error::ResolveError;
use crate::marker::CrossConnectionMarker;

/// Comparison operator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "<")]
    Lt, // <
    #[serde(rename = "<=")]
    Lte, // <=
    #[default]
    #[serde(rename = "=")]
    Eq, // =
    #[serde(rename = ">=")]
    Gte, // >=
    #[serde(rename = ">")]
    Gt, // >
    #[serde(rename = "<>", alias = "!=")]
    NotEq, // <>
}

impl Operator {
    /// Evaluates `lhs <op> rhs`.
    pub fn holds(self, lhs: u64, rhs: u64) -> bool {
        match self {
            Operator::Lt => lhs < rhs,
            Operator::Lte => lhs <= rhs,
            Operator::Eq => lhs == rhs,
            Operator::Gte => lhs >= rhs,
            Operator::Gt => lhs > rhs,
            Operator::NotEq => lhs != rhs,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Eq => "=",
            Operator::Gte => ">=",
            Operator::Gt => ">",
            Operator::NotEq => "<>",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Lte),
            "=" => Ok(Operator::Eq),
            ">=" => Ok(Operator::Gte),
            ">" => Ok(Operator::Gt),
            "<>" | "!=" => Ok(Operator::NotEq),
            other => Err(ResolveError::InvalidOperator(other.to_string())),
        }
    }
}

/// How a clause joins the clauses before it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Boolean {
    #[default]
    And,
    Or,
}

impl FromStr for Boolean {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("and") {
            Ok(Boolean::And)
        } else if s.eq_ignore_ascii_case("or") {
            Ok(Boolean::Or)
        } else {
            Err(ResolveError::InvalidBoolean(s.to_string()))
        }
    }
}

/// The `FROM` target of a plan.
#[derive(Debug, Clone, PartialEq)]
pub enum FromClause {
    Table { name: String, alias: Option<String> },
    /// Encoded [`CrossConnectionMarker`]; expanded by the compiler.
    Marker { token: String, alias: Option<String> },
}

impl FromClause {
    pub fn table(name: impl Into<String>) -> Self {
        FromClause::Table {
            name: name.into(),
            alias: None,
        }
    }

    pub fn alias(&self) -> Option<&str> {
        match self {
            FromClause::Table { alias, .. } | FromClause::Marker { alias, .. } => alias.as_deref(),
        }
    }

    pub fn marker_token(&self) -> Option<&str> {
        match self {
            FromClause::Marker { token, .. } => Some(token),
            FromClause::Table { .. } => None,
        }
    }
}

/// Column equality tying a relation subquery to its owning query.
///
/// Kept apart from the predicate list so decomposition can drop it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkingPredicate {
    /// Qualified key on the related (subquery) table.
    pub related: String,
    /// Qualified key on the owning (outer) table.
    pub parent: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare { column: String, op: Operator, value: Value },
    Columns { left: String, op: Operator, right: String },
    In { column: String, values: Vec<Value>, negated: bool },
    Null { column: String, negated: bool },
    Exists(Box<QueryPlan>),
    /// `(SELECT COUNT(*) ...) <op> count`
    Count { plan: Box<QueryPlan>, op: Operator, count: u64 },
    Group(Vec<Clause>),
    Constant(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub boolean: Boolean,
    pub predicate: Predicate,
}

impl Clause {
    pub fn new(boolean: Boolean, predicate: Predicate) -> Self {
        Self { boolean, predicate }
    }

    pub fn and(predicate: Predicate) -> Self {
        Self::new(Boolean::And, predicate)
    }

    pub fn or(predicate: Predicate) -> Self {
        Self::new(Boolean::Or, predicate)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// `table.*`
    AllColumns(String),
    Column(String),
    Constant(i64),
    CountAll,
    SubSelect { plan: Box<QueryPlan>, alias: String },
    /// `CASE WHEN column IN (values) THEN 1 ELSE 0 END AS alias`
    Membership { column: String, values: Vec<Value>, alias: String },
}

impl Projection {
    pub fn alias(&self) -> Option<&str> {
        match self {
            Projection::SubSelect { alias, .. } | Projection::Membership { alias, .. } => Some(alias),
            _ => None,
        }
    }
}

/// A select under construction.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub from: FromClause,
    pub projection: Vec<Projection>,
    pub predicates: Vec<Clause>,
    pub linking: Option<LinkingPredicate>,
    /// Connection the plan is meant to run on.
    pub connection: ConnectionDescriptor,
}

impl QueryPlan {
    pub fn new(table: impl Into<String>, connection: ConnectionDescriptor) -> Self {
        Self {
            from: FromClause::table(table),
            projection: Vec::new(),
            predicates: Vec::new(),
            linking: None,
            connection,
        }
    }

    /// Marker tokens anywhere in this plan, nested subqueries included.
    pub fn marker_tokens(&self) -> Vec<String> {
        let mut tokens = Vec::new();
        self.collect_markers(&mut tokens);
        tokens
    }

    fn collect_markers(&self, tokens: &mut Vec<String>) {
        if let Some(token) = self.from.marker_token() {
            tokens.push(token.to_string());
        }
        for projection in &self.projection {
            if let Projection::SubSelect { plan, .. } = projection {
                plan.collect_markers(tokens);
            }
        }
        collect_clause_markers(&self.predicates, tokens);
    }

    /// Decoded markers, for callers that need the triple back.
    pub fn markers(&self) -> Vec<CrossConnectionMarker> {
        self.marker_tokens()
            .iter()
            .filter_map(|token| CrossConnectionMarker::decode(token).ok())
            .collect()
    }
}

fn collect_clause_markers(clauses: &[Clause], tokens: &mut Vec<String>) {
    for clause in clauses {
        match &clause.predicate {
            Predicate::Exists(plan) | Predicate::Count { plan, .. } => plan.collect_markers(tokens),
            Predicate::Group(inner) => collect_clause_markers(inner, tokens),
            _ => {}
        }
    }
}
