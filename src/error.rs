//! Errors raised while resolving relation existence and count queries.

use thiserror::Error;

use crate::relation::RelationKind;

/// Convenience alias for `Result<T, ResolveError>`.
pub type Result<T, E = ResolveError> = std::result::Result<T, E>;

/// Every failure is fatal to the builder call that raised it; nothing here is retried.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// Polymorphic relations must go through `Query::has_morph`.
    #[error("relation `{relation}` on `{entity}` is {kind:?}, which this entry point does not accept")]
    UnsupportedRelationKind {
        entity: String,
        relation: String,
        kind: RelationKind,
    },

    /// The eager owner-key fetch of a decomposed relation failed on the related connection.
    #[error("remote fetch on connection `{connection}` failed: {source}")]
    RemoteFetchFailure {
        connection: String,
        #[source]
        source: anyhow::Error,
    },

    /// Only raised when `strict_cross_connection` is enabled.
    #[error("connection `{connection}` cannot emit cross-database SQL for relation `{relation}`")]
    UnsupportedCrossConnectionEmission { connection: String, relation: String },

    #[error("unknown entity `{0}`")]
    UnknownEntity(String),

    #[error("unknown relation `{relation}` on `{entity}`")]
    UnknownRelation { entity: String, relation: String },

    #[error("unknown connection `{0}`")]
    UnknownConnection(String),

    #[error("malformed cross-connection marker `{0}`")]
    MalformedMarker(String),

    #[error("invalid comparison operator `{0}`")]
    InvalidOperator(String),

    #[error("invalid boolean combinator `{0}`")]
    InvalidBoolean(String),
}
