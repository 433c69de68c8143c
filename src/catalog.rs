//! Entity catalog: table metadata, relation definitions and the connection registry.
//!
//! The catalog is the relation descriptor provider of the resolver. A lookup
//! returns a bare [`RelationDescriptor`]: keys and connection resolved, no
//! constraints applied to any query yet.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{CatalogConfig, ConfigError, ResolverConfig};
use crate::connection::{Connection, ConnectionDescriptor};
use crate::error::{ResolveError, Result};
use crate::query::Query;
use crate::relation::{Constraint, RelationDescriptor, RelationKind};

fn default_primary_key() -> String {
    "id".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationDef {
    pub kind: RelationKind,
    /// Related entity name; unused for `morph_to`.
    #[serde(default)]
    pub related: String,
    /// Foreign key column: on the related table for `has_*`, on the owning
    /// table for `belongs_to` and `morph_to`.
    pub foreign_key: String,
    /// Local key for `has_*`, owner key for `belongs_to`/`morph_to`.
    /// Defaults to the primary key of the side it lives on.
    #[serde(default)]
    pub local_key: Option<String>,
    /// Type column for `morph_to`; defaults to `{relation}_type`.
    #[serde(default)]
    pub morph_type: Option<String>,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
}

impl RelationDef {
    fn new(kind: RelationKind, related: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            kind,
            related: related.into(),
            foreign_key: foreign_key.into(),
            local_key: None,
            morph_type: None,
            constraints: Vec::new(),
        }
    }

    pub fn has_one(related: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self::new(RelationKind::HasOne, related, foreign_key)
    }

    pub fn has_many(related: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self::new(RelationKind::HasMany, related, foreign_key)
    }

    pub fn belongs_to(related: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self::new(RelationKind::BelongsTo, related, foreign_key)
    }

    pub fn morph_to(id_column: impl Into<String>, type_column: impl Into<String>) -> Self {
        let mut def = Self::new(RelationKind::MorphTo, String::new(), id_column);
        def.morph_type = Some(type_column.into());
        def
    }

    pub fn local_key(mut self, key: impl Into<String>) -> Self {
        self.local_key = Some(key.into());
        self
    }

    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDef {
    pub table: String,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    /// Name of the connection in the catalog.
    pub connection: String,
    /// Value stored in morph type columns; defaults to the entity name.
    #[serde(default)]
    pub morph_alias: Option<String>,
    #[serde(default)]
    pub relations: BTreeMap<String, RelationDef>,
}

impl EntityDef {
    pub fn new(table: impl Into<String>, connection: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            primary_key: default_primary_key(),
            connection: connection.into(),
            morph_alias: None,
            relations: BTreeMap::new(),
        }
    }

    pub fn primary_key(mut self, key: impl Into<String>) -> Self {
        self.primary_key = key.into();
        self
    }

    pub fn morph_alias(mut self, alias: impl Into<String>) -> Self {
        self.morph_alias = Some(alias.into());
        self
    }

    pub fn relation(mut self, name: impl Into<String>, def: RelationDef) -> Self {
        self.relations.insert(name.into(), def);
        self
    }
}

#[derive(Debug, Default)]
pub struct Catalog {
    entities: BTreeMap<String, EntityDef>,
    connections: HashMap<String, Arc<dyn Connection>>,
    resolver: ResolverConfig,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a catalog from configuration, opening each connection through `connector`.
    pub fn from_config<F>(config: CatalogConfig, mut connector: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str, &ConnectionDescriptor) -> Arc<dyn Connection>,
    {
        config.validate()?;

        let mut catalog = Catalog::new().with_resolver_config(config.resolver);
        for (name, descriptor) in &config.connections {
            catalog.add_connection(name.clone(), connector(name, descriptor));
        }
        for (name, entity) in config.entities {
            catalog.add_entity(name, entity);
        }
        Ok(catalog)
    }

    pub fn with_resolver_config(mut self, resolver: ResolverConfig) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn add_connection(&mut self, name: impl Into<String>, connection: Arc<dyn Connection>) -> &mut Self {
        self.connections.insert(name.into(), connection);
        self
    }

    pub fn add_entity(&mut self, name: impl Into<String>, entity: EntityDef) -> &mut Self {
        self.entities.insert(name.into(), entity);
        self
    }

    pub fn resolver_config(&self) -> &ResolverConfig {
        &self.resolver
    }

    pub fn entity(&self, name: &str) -> Result<&EntityDef> {
        self.entities
            .get(name)
            .ok_or_else(|| ResolveError::UnknownEntity(name.to_string()))
    }

    pub fn connection(&self, name: &str) -> Result<&Arc<dyn Connection>> {
        self.connections
            .get(name)
            .ok_or_else(|| ResolveError::UnknownConnection(name.to_string()))
    }

    /// Starts a top-level query on `entity`.
    pub fn query(&self, entity: &str) -> Result<Query<'_>> {
        Query::new(self, entity)
    }

    /// Bare relation lookup.
    pub fn relation(&self, entity: &str, name: &str) -> Result<RelationDescriptor> {
        let parent = self.entity(entity)?;
        let def = parent
            .relations
            .get(name)
            .ok_or_else(|| ResolveError::UnknownRelation {
                entity: entity.to_string(),
                relation: name.to_string(),
            })?;

        if def.kind == RelationKind::MorphTo {
            return Ok(RelationDescriptor {
                name: name.to_string(),
                kind: def.kind,
                parent_entity: entity.to_string(),
                parent_table: parent.table.clone(),
                related_entity: String::new(),
                related_table: String::new(),
                parent_key: def.foreign_key.clone(),
                related_key: def.local_key.clone().unwrap_or_default(),
                morph_type: Some(
                    def.morph_type
                        .clone()
                        .unwrap_or_else(|| format!("{}_type", name)),
                ),
                constraints: def.constraints.clone(),
                connection: Arc::clone(self.connection(&parent.connection)?),
            });
        }

        let related = self.entity(&def.related)?;
        let (parent_key, related_key) = match def.kind {
            RelationKind::BelongsTo => (
                def.foreign_key.clone(),
                def.local_key.clone().unwrap_or_else(|| related.primary_key.clone()),
            ),
            _ => (
                def.local_key.clone().unwrap_or_else(|| parent.primary_key.clone()),
                def.foreign_key.clone(),
            ),
        };

        Ok(RelationDescriptor {
            name: name.to_string(),
            kind: def.kind,
            parent_entity: entity.to_string(),
            parent_table: parent.table.clone(),
            related_entity: def.related.clone(),
            related_table: related.table.clone(),
            parent_key,
            related_key,
            morph_type: None,
            constraints: def.constraints.clone(),
            connection: Arc::clone(self.connection(&related.connection)?),
        })
    }

    /// Narrows a `MorphTo` relation to one concrete entity, as a `BelongsTo`.
    pub fn morph_target(&self, morph: &RelationDescriptor, entity: &str) -> Result<RelationDescriptor> {
        let target = self.entity(entity)?;
        let related_key = if morph.related_key.is_empty() {
            target.primary_key.clone()
        } else {
            morph.related_key.clone()
        };

        Ok(RelationDescriptor {
            name: format!("{}<{}>", morph.name, entity),
            kind: RelationKind::BelongsTo,
            parent_entity: morph.parent_entity.clone(),
            parent_table: morph.parent_table.clone(),
            related_entity: entity.to_string(),
            related_table: target.table.clone(),
            parent_key: morph.parent_key.clone(),
            related_key,
            morph_type: None,
            constraints: morph.constraints.clone(),
            connection: Arc::clone(self.connection(&target.connection)?),
        })
    }

    /// Value a morph type column holds for `entity`.
    pub fn morph_alias(&self, entity: &str) -> Result<String> {
        Ok(self
            .entity(entity)?
            .morph_alias
            .clone()
            .unwrap_or_else(|| entity.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{Driver, StaticConnection};

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog
            .add_connection(
                "main",
                Arc::new(StaticConnection::new(
                    "main",
                    ConnectionDescriptor::new(Driver::Mysql, "a", 3306, "app"),
                )),
            )
            .add_connection(
                "remote",
                Arc::new(StaticConnection::new(
                    "remote",
                    ConnectionDescriptor::new(Driver::Mysql, "b", 3306, "crm"),
                )),
            )
            .add_entity(
                "User",
                EntityDef::new("users", "main")
                    .relation("posts", RelationDef::has_many("Post", "author_id"))
                    .relation("account", RelationDef::belongs_to("Account", "account_uuid").local_key("uuid")),
            )
            .add_entity("Post", EntityDef::new("posts", "main"))
            .add_entity("Account", EntityDef::new("accounts", "remote").morph_alias("account"))
            .add_entity(
                "Image",
                EntityDef::new("images", "main").relation("imageable", RelationDef::morph_to("imageable_id", "imageable_type")),
            );
        catalog
    }

    #[test]
    fn test_has_many_keys() {
        let relation = catalog().relation("User", "posts").unwrap();
        assert_eq!(relation.kind, RelationKind::HasMany);
        assert_eq!(relation.parent_key, "id");
        assert_eq!(relation.related_key, "author_id");
        assert_eq!(relation.related_table, "posts");
        assert_eq!(relation.connection.name(), "main");
    }

    #[test]
    fn test_belongs_to_keys_and_connection() {
        let relation = catalog().relation("User", "account").unwrap();
        assert_eq!(relation.parent_key, "account_uuid");
        assert_eq!(relation.related_key, "uuid");
        assert_eq!(relation.connection_descriptor().host, "b");
    }

    #[test]
    fn test_unknown_lookups() {
        let catalog = catalog();
        assert!(matches!(catalog.relation("Nope", "posts"), Err(ResolveError::UnknownEntity(_))));
        assert!(matches!(
            catalog.relation("User", "nope"),
            Err(ResolveError::UnknownRelation { .. })
        ));
    }

    #[test]
    fn test_morph_to_and_target() {
        let catalog = catalog();
        let morph = catalog.relation("Image", "imageable").unwrap();
        assert_eq!(morph.kind, RelationKind::MorphTo);
        assert_eq!(morph.morph_type.as_deref(), Some("imageable_type"));

        let target = catalog.morph_target(&morph, "Account").unwrap();
        assert_eq!(target.kind, RelationKind::BelongsTo);
        assert_eq!(target.parent_key, "imageable_id");
        assert_eq!(target.related_key, "id");
        assert_eq!(target.related_table, "accounts");
        assert_eq!(catalog.morph_alias("Account").unwrap(), "account");
        assert_eq!(catalog.morph_alias("Post").unwrap(), "Post");
    }
}
