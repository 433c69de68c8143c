//! Connection descriptors, host identity and the driver boundary used by remote fetches.

use std::fmt;
use std::sync::Mutex;

use anyhow::anyhow;
use sea_query::{Value, Values};
use serde::{Deserialize, Serialize};

/// SQL dialect spoken by a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    Mysql,
    Postgres,
    Sqlite,
}

/// Physical identity of a connection plus its cross-database capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    pub driver: Driver,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    pub database: String,
    #[serde(default)]
    pub table_prefix: String,
    /// Whether queries on this connection may reference tables of another
    /// database through a cross-connection marker.
    #[serde(default)]
    pub cross_database: bool,
}

impl ConnectionDescriptor {
    pub fn new(driver: Driver, host: impl Into<String>, port: u16, database: impl Into<String>) -> Self {
        Self {
            driver,
            host: host.into(),
            port,
            database: database.into(),
            table_prefix: String::new(),
            cross_database: false,
        }
    }

    pub fn with_table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    pub fn with_cross_database(mut self, enabled: bool) -> Self {
        self.cross_database = enabled;
        self
    }

    pub fn same_host(&self, other: &ConnectionDescriptor) -> bool {
        same_host(self, other)
    }
}

/// Two connections live on the same physical server iff driver, host and port match.
/// The database name is deliberately ignored.
pub fn same_host(a: &ConnectionDescriptor, b: &ConnectionDescriptor) -> bool {
    a.driver == b.driver && a.host == b.host && a.port == b.port
}

/// A live connection as seen by the resolver.
///
/// Only decomposition ever calls `select_column`; every other path just
/// builds plans. Driver failures stay opaque and are wrapped into
/// [`crate::ResolveError::RemoteFetchFailure`] by the caller.
pub trait Connection: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    fn descriptor(&self) -> &ConnectionDescriptor;

    /// Runs a single-column select and returns the column values in row order.
    fn select_column(&self, sql: &str, values: &Values) -> anyhow::Result<Vec<Value>>;
}

/// Connection answering every fetch from a fixed row set.
///
/// Records each statement it receives. Used for dry runs of the planner.
#[derive(Debug)]
pub struct StaticConnection {
    name: String,
    descriptor: ConnectionDescriptor,
    rows: Vec<Value>,
    failure: Option<String>,
    executed: Mutex<Vec<String>>,
}

impl StaticConnection {
    pub fn new(name: impl Into<String>, descriptor: ConnectionDescriptor) -> Self {
        Self {
            name: name.into(),
            descriptor,
            rows: Vec::new(),
            failure: None,
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn with_rows<I, V>(mut self, rows: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.rows = rows.into_iter().map(Into::into).collect();
        self
    }

    /// Makes every fetch fail with the given message.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Statements received so far, oldest first.
    pub fn executed(&self) -> Vec<String> {
        self.executed
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }
}

impl Connection for StaticConnection {
    fn name(&self) -> &str {
        &self.name
    }

    fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    fn select_column(&self, sql: &str, _values: &Values) -> anyhow::Result<Vec<Value>> {
        self.executed
            .lock()
            .map_err(|_| anyhow!("statement log poisoned"))?
            .push(sql.to_string());

        match &self.failure {
            Some(message) => Err(anyhow!("{}", message)),
            None => Ok(self.rows.clone()),
        }
    }
}
