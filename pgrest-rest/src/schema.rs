//! Database schema metadata
//!
//! The REST layer reads table, enum and composite metadata through the
//! [`SchemaProvider`] capability. [`SchemaCache`] is the bundled provider:
//! it holds one immutable [`SchemaSnapshot`] at a time and reloads it from a
//! [`SchemaLoader`] once the configured TTL elapses or after an explicit
//! [`SchemaProvider::invalidate`].

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pgrest_common::error::{Error, Result};
use pgrest_common::types::{ColumnInfo, ForeignKeyInfo, TableInfo};

/// One generation of schema metadata
#[derive(Debug, Clone, Default)]
pub struct SchemaSnapshot {
    pub tables: HashMap<String, TableInfo>,
    pub enums: HashMap<String, Vec<String>>,
    /// Composite type fields in declaration order: `(field, type)`
    pub composites: HashMap<String, Vec<(String, String)>>,
}

impl SchemaSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_table(mut self, table: TableInfo) -> Self {
        self.tables.insert(table.name.clone(), table);
        self
    }

    #[must_use]
    pub fn with_enum(mut self, name: &str, values: &[&str]) -> Self {
        self.enums.insert(
            name.to_string(),
            values.iter().map(|v| (*v).to_string()).collect(),
        );
        self
    }

    #[must_use]
    pub fn with_composite(mut self, name: &str, fields: &[(&str, &str)]) -> Self {
        self.composites.insert(
            name.to_string(),
            fields
                .iter()
                .map(|(f, t)| ((*f).to_string(), (*t).to_string()))
                .collect(),
        );
        self
    }

    pub fn table(&self, name: &str) -> Option<&TableInfo> {
        self.tables.get(name)
    }

    pub fn columns(&self, table: &str) -> Result<&[ColumnInfo]> {
        self.table(table)
            .map(|t| t.columns.as_slice())
            .ok_or_else(|| Error::TableNotFound(table.to_string()))
    }

    /// Tables holding a foreign key that points at `table`
    pub fn referencing_tables(&self, table: &str) -> Vec<(&TableInfo, &ForeignKeyInfo)> {
        let mut results: Vec<_> = self
            .tables
            .values()
            .flat_map(|info| {
                info.foreign_keys
                    .iter()
                    .filter(move |fk| fk.referenced_table == table)
                    .map(move |fk| (info, fk))
            })
            .collect();
        results.sort_by(|a, b| a.0.name.cmp(&b.0.name));
        results
    }
}

/// Source of fresh schema snapshots (catalog reflection lives here)
pub trait SchemaLoader: Send + Sync {
    fn load(&self) -> Result<SchemaSnapshot>;
}

/// A fixed snapshot reloads as itself
impl SchemaLoader for SchemaSnapshot {
    fn load(&self) -> Result<SchemaSnapshot> {
        Ok(self.clone())
    }
}

/// Read-only schema capability consumed by the REST layer
pub trait SchemaProvider: Send + Sync {
    /// Current snapshot of all tables
    fn snapshot(&self) -> Result<Arc<SchemaSnapshot>>;

    /// Drop the cached snapshot so the next read reloads it
    fn invalidate(&self);

    fn table_schema(&self) -> Result<HashMap<String, TableInfo>> {
        Ok(self.snapshot()?.tables.clone())
    }

    fn table(&self, name: &str) -> Result<Option<TableInfo>> {
        Ok(self.snapshot()?.table(name).cloned())
    }

    fn enum_values(&self, type_name: &str) -> Result<Option<Vec<String>>> {
        Ok(self.snapshot()?.enums.get(type_name).cloned())
    }

    fn composite_definition(&self, type_name: &str) -> Result<Option<Vec<(String, String)>>> {
        Ok(self.snapshot()?.composites.get(type_name).cloned())
    }
}

struct Cached {
    snapshot: Arc<SchemaSnapshot>,
    loaded_at: Instant,
}

/// TTL cache over a [`SchemaLoader`]
pub struct SchemaCache {
    loader: Arc<dyn SchemaLoader>,
    ttl: Duration,
    current: RwLock<Option<Cached>>,
    last_refresh: RwLock<Option<chrono::DateTime<chrono::Utc>>>,
}

impl SchemaCache {
    /// Create a cache that reloads through `loader` every `ttl`
    pub fn new(loader: Arc<dyn SchemaLoader>, ttl: Duration) -> Self {
        Self {
            loader,
            ttl,
            current: RwLock::new(None),
            last_refresh: RwLock::new(None),
        }
    }

    /// Serve a fixed snapshot
    pub fn from_snapshot(snapshot: SchemaSnapshot) -> Self {
        Self::new(Arc::new(snapshot), Duration::MAX)
    }

    pub fn last_refresh(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        *self.last_refresh.read()
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.snapshot()
            .map(|s| s.tables.contains_key(name))
            .unwrap_or(false)
    }

    fn fresh(&self) -> Option<Arc<SchemaSnapshot>> {
        self.current
            .read()
            .as_ref()
            .filter(|c| c.loaded_at.elapsed() < self.ttl)
            .map(|c| c.snapshot.clone())
    }
}

impl SchemaProvider for SchemaCache {
    fn snapshot(&self) -> Result<Arc<SchemaSnapshot>> {
        if let Some(snapshot) = self.fresh() {
            return Ok(snapshot);
        }

        let mut current = self.current.write();
        // another reader may have reloaded while we waited for the lock
        if let Some(c) = current.as_ref().filter(|c| c.loaded_at.elapsed() < self.ttl) {
            return Ok(c.snapshot.clone());
        }

        let snapshot = Arc::new(self.loader.load()?);
        tracing::debug!(tables = snapshot.tables.len(), "schema snapshot loaded");
        *current = Some(Cached {
            snapshot: snapshot.clone(),
            loaded_at: Instant::now(),
        });
        *self.last_refresh.write() = Some(chrono::Utc::now());
        Ok(snapshot)
    }

    fn invalidate(&self) {
        tracing::info!("schema cache invalidated");
        *self.current.write() = None;
    }
}
