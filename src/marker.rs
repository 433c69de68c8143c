//! Cross-connection marker tokens.
//!
//! A marker stands in for a fully qualified table on another database. It is
//! placed in the `FROM` position of a relation subquery and expanded by
//! [`crate::sql_compiler::SqlCompiler`] into `database.prefix_table`.
//!
//! Identifiers containing [`MARKER_DELIMITER`] are not supported.

use std::fmt;

use tracing::debug;

use crate::connection::ConnectionDescriptor;
use crate::error::{ResolveError, Result};
use crate::plan::{FromClause, QueryPlan};

/// Reserved delimiter between the three marker fields.
pub const MARKER_DELIMITER: &str = "<-->";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CrossConnectionMarker {
    pub table_prefix: String,
    pub table: String,
    pub database: String,
}

impl CrossConnectionMarker {
    pub fn new(
        table_prefix: impl Into<String>,
        table: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            table_prefix: table_prefix.into(),
            table: table.into(),
            database: database.into(),
        }
    }

    /// `prefix<-->table<-->database`
    pub fn encode(&self) -> String {
        [self.table_prefix.as_str(), self.table.as_str(), self.database.as_str()].join(MARKER_DELIMITER)
    }

    pub fn decode(token: &str) -> Result<Self> {
        let parts: Vec<&str> = token.split(MARKER_DELIMITER).collect();
        match parts.as_slice() {
            [prefix, table, database] if !table.is_empty() && !database.is_empty() => {
                Ok(Self::new(*prefix, *table, *database))
            }
            _ => Err(ResolveError::MalformedMarker(token.to_string())),
        }
    }

    pub fn is_marker(token: &str) -> bool {
        token.contains(MARKER_DELIMITER)
    }

    /// Physical table name on the remote database.
    pub fn prefixed_table(&self) -> String {
        format!("{}{}", self.table_prefix, self.table)
    }
}

impl fmt::Display for CrossConnectionMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Points `plan` at its table on `related`'s database and returns the token.
///
/// Shared by the existence and count paths so both encode identically.
pub fn apply_marker(plan: &mut QueryPlan, related: &ConnectionDescriptor) -> String {
    let (table, alias) = match &plan.from {
        FromClause::Table { name, alias } => (name.clone(), alias.clone()),
        FromClause::Marker { token, .. } => return token.clone(),
    };

    let token = CrossConnectionMarker::new(&related.table_prefix, table, &related.database).encode();
    debug!(token = %token, "encoded cross-connection marker");
    plan.from = FromClause::Marker {
        token: token.clone(),
        alias,
    };
    token
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Driver;
    use proptest::prelude::*;

    #[test]
    fn test_encode_layout() {
        let marker = CrossConnectionMarker::new("arc_", "comments", "archive");
        assert_eq!(marker.encode(), "arc_<-->comments<-->archive");
        assert_eq!(marker.to_string(), marker.encode());
        assert_eq!(marker.prefixed_table(), "arc_comments");
    }

    #[test]
    fn test_decode_empty_prefix() {
        let marker = CrossConnectionMarker::decode("<-->posts<-->blog").unwrap();
        assert_eq!(marker, CrossConnectionMarker::new("", "posts", "blog"));
    }

    #[test]
    fn test_decode_rejects_malformed_tokens() {
        for token in ["posts", "a<-->b", "a<-->b<-->c<-->d", "p<--><-->db", "p<-->t<-->"] {
            assert!(
                matches!(CrossConnectionMarker::decode(token), Err(ResolveError::MalformedMarker(_))),
                "{token} should not decode"
            );
        }
    }

    #[test]
    fn test_apply_marker_keeps_alias() {
        let related = ConnectionDescriptor::new(Driver::Mysql, "a", 3306, "archive").with_table_prefix("arc_");
        let mut plan = QueryPlan::new("comments", ConnectionDescriptor::new(Driver::Mysql, "a", 3306, "app"));
        plan.from = FromClause::Table {
            name: "comments".to_string(),
            alias: Some("c".to_string()),
        };

        let token = apply_marker(&mut plan, &related);
        assert_eq!(token, "arc_<-->comments<-->archive");
        assert_eq!(
            plan.from,
            FromClause::Marker {
                token: token.clone(),
                alias: Some("c".to_string())
            }
        );

        // Re-applying leaves the existing marker alone.
        assert_eq!(apply_marker(&mut plan, &related), token);
        assert_eq!(plan.marker_tokens(), vec![token]);
    }

    proptest! {
        #[test]
        fn marker_round_trip(
            prefix in "[a-z_]{0,6}",
            table in "[a-z][a-z0-9_]{0,15}",
            database in "[a-z][a-z0-9_]{0,15}",
        ) {
            let marker = CrossConnectionMarker::new(prefix, table, database);
            let token = marker.encode();
            prop_assert!(CrossConnectionMarker::is_marker(&token));
            prop_assert_eq!(CrossConnectionMarker::decode(&token).unwrap(), marker);
        }
    }
}
