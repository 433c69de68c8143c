//! Relation existence and count queries across database connections.
//!
//! A [`Query`] on one entity can filter on related rows (`has`, `where_has`,
//! nested paths, polymorphic `has_morph`) and annotate counts (`with_count`)
//! even when the related entity lives in another database or on another
//! server. Each relation is dispatched to one of:
//!
//! - a plain correlated subquery (same database),
//! - a subquery whose `FROM` carries a [`marker::CrossConnectionMarker`]
//!   (same server, other database),
//! - a decomposed membership test on locally inlined owner keys (other server).

pub mod aggregate;
pub mod catalog;
pub mod config;
pub mod connection;
pub mod error;
pub mod existence;
pub mod marker;
pub mod plan;
pub mod query;
pub mod relation;
pub mod sql_compiler;

pub use aggregate::CountRelation;
pub use catalog::{Catalog, EntityDef, RelationDef};
pub use config::{CatalogConfig, ConfigError, ResolverConfig};
pub use connection::{Connection, ConnectionDescriptor, Driver, StaticConnection};
pub use error::{ResolveError, Result};
pub use marker::CrossConnectionMarker;
pub use plan::{Boolean, Operator, QueryPlan};
pub use query::{Dispatch, Query, Scope, Strategy};
pub use relation::{Constraint, RelationDescriptor, RelationKind};
pub use sql_compiler::SqlCompiler;
