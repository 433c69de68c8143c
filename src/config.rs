//! 配置模块，负责从JSON加载连接、实体与解析器配置

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::catalog::{EntityDef, RelationDef};
use crate::connection::{ConnectionDescriptor, Driver};
use crate::relation::{Constraint, RelationKind};
use crate::plan::Operator;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置文件不存在: {}", .0.display())]
    NotFound(PathBuf),

    #[error("无法读取配置文件 {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("无法解析JSON配置 {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("配置错误: {0}")]
    Invalid(String),
}

/// 解析器行为开关
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// 跨库关系遇到不支持跨库SQL的连接时直接报错，而不是尝试普通子查询
    #[serde(default)]
    pub strict_cross_connection: bool,
}

/// 目录配置结构
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// 连接名到连接描述的映射
    pub connections: BTreeMap<String, ConnectionDescriptor>,
    /// 实体名到实体定义的映射
    #[serde(default)]
    pub entities: BTreeMap<String, EntityDef>,
    #[serde(default)]
    pub resolver: ResolverConfig,
}

impl CatalogConfig {
    /// 从JSON文件加载配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();

        // 检查文件是否存在
        if !path_ref.exists() {
            return Err(ConfigError::NotFound(path_ref.to_path_buf()));
        }

        let content = fs::read_to_string(path_ref).map_err(|source| ConfigError::Io {
            path: path_ref.to_path_buf(),
            source,
        })?;

        let config: CatalogConfig = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            origin: path_ref.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// 从JSON字符串加载配置
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: CatalogConfig = serde_json::from_str(content).map_err(|source| ConfigError::Parse {
            origin: "<inline>".to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// 检查实体引用的连接与关联实体是否存在
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, entity) in &self.entities {
            if !self.connections.contains_key(&entity.connection) {
                return Err(ConfigError::Invalid(format!(
                    "实体 {} 引用了未知连接 {}",
                    name, entity.connection
                )));
            }
            for (relation, def) in &entity.relations {
                if def.kind != RelationKind::MorphTo && !self.entities.contains_key(&def.related) {
                    return Err(ConfigError::Invalid(format!(
                        "关系 {}.{} 引用了未知实体 {}",
                        name, relation, def.related
                    )));
                }
            }
        }
        Ok(())
    }

    /// 演示用配置（配置文件缺失时的fallback）
    ///
    /// `primary` 与 `archive` 在同一台主机上、数据库不同；`billing` 在另一台主机上。
    pub fn demo() -> Self {
        let mut connections = BTreeMap::new();
        connections.insert(
            "primary".to_string(),
            ConnectionDescriptor::new(Driver::Mysql, "db-a.internal", 3306, "app").with_cross_database(true),
        );
        connections.insert(
            "archive".to_string(),
            ConnectionDescriptor::new(Driver::Mysql, "db-a.internal", 3306, "archive").with_table_prefix("arc_"),
        );
        connections.insert(
            "billing".to_string(),
            ConnectionDescriptor::new(Driver::Mysql, "db-b.internal", 3306, "billing"),
        );

        let mut entities = BTreeMap::new();
        entities.insert(
            "User".to_string(),
            EntityDef::new("users", "primary")
                .relation("posts", RelationDef::has_many("Post", "user_id"))
                .relation("team", RelationDef::belongs_to("Team", "team_id"))
                .relation("manager", RelationDef::belongs_to("User", "manager_id")),
        );
        entities.insert(
            "Post".to_string(),
            EntityDef::new("posts", "primary")
                .morph_alias("post")
                .relation("comments", RelationDef::has_many("Comment", "post_id"))
                .relation(
                    "approvedComments",
                    RelationDef::has_many("Comment", "post_id")
                        .constraint(Constraint::new("approved", Operator::Eq, true)),
                )
                .relation("author", RelationDef::belongs_to("User", "user_id")),
        );
        entities.insert(
            "Comment".to_string(),
            EntityDef::new("comments", "archive").relation("post", RelationDef::belongs_to("Post", "post_id")),
        );
        entities.insert("Team".to_string(), EntityDef::new("teams", "billing").morph_alias("team"));
        entities.insert(
            "Image".to_string(),
            EntityDef::new("images", "primary")
                .relation("imageable", RelationDef::morph_to("imageable_id", "imageable_type")),
        );

        Self {
            connections,
            entities,
            resolver: ResolverConfig::default(),
        }
    }
}
