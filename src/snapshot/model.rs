//! Snapshot data model
//!
//! A snapshot is the full structural capture of a schema: tables, their
//! columns and the column attributes, plus optional literal row data. The
//! serialized shape is the persisted contract shared with existing history:
//!
//! ```json
//! { "tables": { "users": { "columns": { "id": { "type": "integer", "nullable": false, "default": null, "pk": true } } } } }
//! ```

use crate::error::AppError;
use crate::snapshot::ordered::Ordered;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One literal row: column name -> JSON value
pub type Row = Ordered<serde_json::Value>;

/// Complete schema capture at a point in time
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub tables: Ordered<TableDef>,
}

/// Table definition inside a snapshot
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableDef {
    #[serde(default)]
    pub columns: Ordered<ColumnDef>,
    /// Literal row data captured alongside the structure, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Row>>,
}

/// Column attributes tracked by the diff engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default, alias = "primaryKey")]
    pub pk: bool,
}

fn default_nullable() -> bool {
    true
}

impl Snapshot {
    /// The snapshot used as the base when a branch has no history yet
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse an untyped payload, reporting a missing `tables` mapping explicitly
    pub fn from_value(value: serde_json::Value) -> Result<Self, AppError> {
        match value.get("tables") {
            Some(serde_json::Value::Object(_)) => {}
            Some(_) => {
                return Err(AppError::MalformedSnapshot(
                    "`tables` must be an object keyed by table name".to_string(),
                ))
            }
            None => {
                return Err(AppError::MalformedSnapshot(
                    "snapshot has no `tables` mapping".to_string(),
                ))
            }
        }

        let snapshot: Snapshot = serde_json::from_value(value)
            .map_err(|e| AppError::MalformedSnapshot(e.to_string()))?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Structural checks that serde cannot express
    pub fn validate(&self) -> Result<(), AppError> {
        for (table_name, table) in self.tables.iter() {
            if table_name.trim().is_empty() {
                return Err(AppError::MalformedSnapshot("table with an empty name".to_string()));
            }
            for (column_name, column) in table.columns.iter() {
                if column_name.trim().is_empty() {
                    return Err(AppError::MalformedSnapshot(format!(
                        "table '{}' has a column with an empty name",
                        table_name
                    )));
                }
                if column.data_type.trim().is_empty() {
                    return Err(AppError::MalformedSnapshot(format!(
                        "column '{}.{}' has no type",
                        table_name, column_name
                    )));
                }
                // Types are spliced into DDL verbatim on rollback
                if column.data_type.contains(';') || column.data_type.contains("--") {
                    return Err(AppError::MalformedSnapshot(format!(
                        "column '{}.{}' has an invalid type '{}'",
                        table_name, column_name, column.data_type
                    )));
                }
            }
        }
        Ok(())
    }

    /// Content hash of the serialized snapshot (hex sha256)
    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(self).unwrap_or_default());
        format!("{:x}", hasher.finalize())
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn column_count(&self) -> usize {
        self.tables.values().map(|t| t.columns.len()).sum()
    }
}

impl TableDef {
    /// Names of the primary key columns, in column order
    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|(_, c)| c.pk)
            .map(|(name, _)| name)
            .collect()
    }
}

/// Builders for fixtures
#[cfg(test)]
impl Snapshot {
    pub fn with_table(mut self, name: impl Into<String>, table: TableDef) -> Self {
        self.tables.insert(name, table);
        self
    }
}

#[cfg(test)]
impl TableDef {
    pub fn with_column(mut self, name: impl Into<String>, column: ColumnDef) -> Self {
        self.columns.insert(name, column);
        self
    }

    pub fn with_row(mut self, row: Row) -> Self {
        self.rows.get_or_insert_with(Vec::new).push(row);
        self
    }
}

#[cfg(test)]
impl ColumnDef {
    /// Nullable, no default, not part of the primary key
    pub fn new(data_type: impl Into<String>) -> Self {
        Self {
            data_type: data_type.into(),
            nullable: true,
            default: None,
            pk: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.pk = true;
        self.nullable = false;
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }
}
