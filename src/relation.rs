//! Relation kinds, their capabilities and resolved relation descriptors.

use std::sync::Arc;

use sea_query::Value;
use serde::{Deserialize, Serialize};

use crate::connection::{Connection, ConnectionDescriptor};
use crate::error::{ResolveError, Result};
use crate::plan::{Operator, Predicate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Related row holds a foreign key to the owner; at most one match.
    HasOne,
    /// Related rows hold a foreign key to the owner.
    HasMany,
    /// Owning row holds the foreign key; the related row holds the owner key.
    BelongsTo,
    /// Owning row holds an id and a type column naming the related entity.
    MorphTo,
}

/// Cross-connection strategies a relation kind can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Existence reduces to `foreign_key IN (owner keys)`.
    pub decomposition: bool,
    pub marker_encoding: bool,
}

impl RelationKind {
    pub const fn capabilities(self) -> Capabilities {
        match self {
            RelationKind::HasOne | RelationKind::HasMany => Capabilities {
                decomposition: false,
                marker_encoding: true,
            },
            RelationKind::BelongsTo => Capabilities {
                decomposition: true,
                marker_encoding: true,
            },
            RelationKind::MorphTo => Capabilities {
                decomposition: false,
                marker_encoding: false,
            },
        }
    }

    pub const fn is_polymorphic(self) -> bool {
        matches!(self, RelationKind::MorphTo)
    }
}

/// A fixed condition every query through a relation carries, e.g. `published = true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub column: String,
    #[serde(default, rename = "operator")]
    pub op: Operator,
    /// JSON scalar; `null` becomes an `IS [NOT] NULL` check and an array an `IN` list.
    pub value: serde_json::Value,
}

impl Constraint {
    pub fn new(column: impl Into<String>, op: Operator, value: impl Into<serde_json::Value>) -> Self {
        Self {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    /// Lowers the constraint against the table (or alias) named `table_ref`.
    pub fn to_predicate(&self, table_ref: &str) -> Predicate {
        let column = qualify(table_ref, &self.column);
        match &self.value {
            serde_json::Value::Null => Predicate::Null {
                column,
                negated: self.op == Operator::NotEq,
            },
            serde_json::Value::Array(items) => Predicate::In {
                column,
                values: items.iter().map(json_to_value).collect(),
                negated: self.op == Operator::NotEq,
            },
            scalar => Predicate::Compare {
                column,
                op: self.op,
                value: json_to_value(scalar),
            },
        }
    }
}

fn json_to_value(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::String(None),
        serde_json::Value::Bool(b) => Value::Bool(Some(*b)),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::BigInt(Some(i)),
            None => Value::Double(n.as_f64()),
        },
        serde_json::Value::String(s) => Value::String(Some(Box::new(s.clone()))),
        other => Value::String(Some(Box::new(other.to_string()))),
    }
}

/// `table.column`, unless the column is already qualified.
pub fn qualify(table_ref: &str, column: &str) -> String {
    if column.contains('.') {
        column.to_string()
    } else {
        format!("{}.{}", table_ref, column)
    }
}

/// One relationship of one entity, resolved against the catalog.
///
/// Keys are stored unqualified; the planner qualifies them with whatever
/// name (table or alias) each side carries in the query being built.
#[derive(Debug, Clone)]
pub struct RelationDescriptor {
    pub name: String,
    pub kind: RelationKind,
    pub parent_entity: String,
    pub parent_table: String,
    /// Empty for `MorphTo`, whose target is only known per concrete type.
    pub related_entity: String,
    pub related_table: String,
    /// Key column on the owning table (the foreign key for `BelongsTo`).
    pub parent_key: String,
    /// Key column on the related table (the owner key for `BelongsTo`).
    pub related_key: String,
    /// Type column on the owning table, `MorphTo` only.
    pub morph_type: Option<String>,
    pub constraints: Vec<Constraint>,
    pub connection: Arc<dyn Connection>,
}

impl RelationDescriptor {
    pub fn connection_descriptor(&self) -> &ConnectionDescriptor {
        self.connection.descriptor()
    }

    /// Fails for relations the single-relation entry points cannot plan.
    pub fn ensure_not_polymorphic(&self) -> Result<()> {
        if self.kind.is_polymorphic() {
            return Err(ResolveError::UnsupportedRelationKind {
                entity: self.parent_entity.clone(),
                relation: self.name.clone(),
                kind: self.kind,
            });
        }
        Ok(())
    }
}
