//! File-backed schema metadata
//!
//! Tables, enums and composite types declared in TOML. The file is re-read
//! every time the schema cache expires or is invalidated.
//!
//! ```toml
//! [[tables]]
//! name = "posts"
//! columns = [
//!     { name = "id", type = "integer", primary_key = true },
//!     { name = "author_id", type = "integer" },
//! ]
//! foreign_keys = [{ column = "author_id", references = "authors.id" }]
//!
//! [enums]
//! post_status = ["draft", "published"]
//! ```

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use pgrest_common::error::{Error, Result};
use pgrest_common::types::{ColumnInfo, TableInfo};
use pgrest_rest::{SchemaLoader, SchemaSnapshot};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SchemaFile {
    pub tables: Vec<TableDef>,
    pub enums: HashMap<String, Vec<String>>,
    pub composites: HashMap<String, Vec<FieldDef>>,
}

#[derive(Debug, Deserialize)]
pub struct TableDef {
    pub name: String,
    pub schema: Option<String>,
    #[serde(default)]
    pub view: bool,
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyDef>,
}

#[derive(Debug, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub not_null: bool,
    #[serde(default)]
    pub has_default: bool,
}

#[derive(Debug, Deserialize)]
pub struct ForeignKeyDef {
    pub column: String,
    /// `table.column`
    pub references: String,
}

#[derive(Debug, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

impl SchemaFile {
    /// # Errors
    /// `ConfigError` when the text is not a valid schema description.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigError(e.to_string()))
    }

    /// # Errors
    /// `ConfigError` for malformed foreign key references.
    pub fn into_snapshot(self) -> Result<SchemaSnapshot> {
        let mut snapshot = SchemaSnapshot::new();
        for def in self.tables {
            let columns = def
                .columns
                .into_iter()
                .map(|c| {
                    let mut column = ColumnInfo::new(c.name, c.data_type);
                    if c.primary_key {
                        column = column.primary_key();
                    }
                    if c.not_null {
                        column = column.not_null();
                    }
                    if c.has_default {
                        column = column.with_default();
                    }
                    column
                })
                .collect();

            let mut table = TableInfo::new(def.name, columns);
            if let Some(schema) = def.schema {
                table.schema = schema;
            }
            for fk in def.foreign_keys {
                let (referenced_table, referenced_column) =
                    fk.references.split_once('.').ok_or_else(|| {
                        Error::ConfigError(format!(
                            "{}.{}: foreign key reference '{}' must be table.column",
                            table.name, fk.column, fk.references
                        ))
                    })?;
                table = table.with_foreign_key(&fk.column, referenced_table, referenced_column);
            }
            if def.view {
                table = table.as_view();
            }
            snapshot = snapshot.with_table(table);
        }

        snapshot.enums = self.enums;
        snapshot.composites = self
            .composites
            .into_iter()
            .map(|(name, fields)| {
                let fields = fields.into_iter().map(|f| (f.name, f.data_type)).collect();
                (name, fields)
            })
            .collect();
        Ok(snapshot)
    }
}

/// Loads a [`SchemaFile`] from disk on every refresh
#[derive(Debug, Clone)]
pub struct FileSchemaLoader {
    path: PathBuf,
}

impl FileSchemaLoader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl SchemaLoader for FileSchemaLoader {
    fn load(&self) -> Result<SchemaSnapshot> {
        let content = std::fs::read_to_string(&self.path)?;
        SchemaFile::from_toml_str(&content)?.into_snapshot()
    }
}
