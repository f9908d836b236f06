//! Schema Diff Engine
//!
//! The "git diff" for a database schema: compares two snapshots and lists the
//! structural changes between them. Pure and total; any two well-formed
//! snapshots produce a diff, and identical snapshots produce an empty one.
//!
//! Output order: every `ADD_TABLE`, then every `DROP_TABLE`, then the column
//! changes of each table present on both sides. Within each group the order is
//! the snapshots' own table/column order. Renames are not detected; a renamed
//! table shows up as a drop plus an add.

use crate::snapshot::model::{ColumnDef, Snapshot, TableDef};
use crate::snapshot::ordered::Ordered;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Ordered list of structural changes between two snapshots
pub type Diff = Vec<Change>;

/// A single structural delta
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Change {
    AddTable {
        #[serde(rename = "tableName", alias = "table")]
        table: String,
        columns: Ordered<ColumnDef>,
    },
    DropTable {
        #[serde(rename = "tableName", alias = "table")]
        table: String,
    },
    AddColumn {
        #[serde(rename = "tableName", alias = "table")]
        table: String,
        #[serde(rename = "columnName", alias = "column")]
        column: String,
        #[serde(rename = "details", alias = "def")]
        def: ColumnDef,
    },
    DropColumn {
        #[serde(rename = "tableName", alias = "table")]
        table: String,
        #[serde(rename = "columnName", alias = "column")]
        column: String,
    },
    AlterColumn {
        #[serde(rename = "tableName", alias = "table")]
        table: String,
        #[serde(rename = "columnName", alias = "column")]
        column: String,
        modifications: Vec<Modification>,
    },
}

/// Column attribute compared by the diff engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    Type,
    Nullable,
    #[serde(alias = "primaryKey", alias = "pk")]
    PrimaryKey,
    Default,
}

/// One attribute that differs between the old and new column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Modification {
    #[serde(rename = "trait", alias = "attribute")]
    pub attribute: Attribute,
    #[serde(rename = "old", alias = "oldValue")]
    pub old_value: Value,
    #[serde(rename = "new", alias = "newValue")]
    pub new_value: Value,
}

impl Change {
    pub fn table(&self) -> &str {
        match self {
            Change::AddTable { table, .. }
            | Change::DropTable { table }
            | Change::AddColumn { table, .. }
            | Change::DropColumn { table, .. }
            | Change::AlterColumn { table, .. } => table,
        }
    }

    pub fn column(&self) -> Option<&str> {
        match self {
            Change::AddColumn { column, .. }
            | Change::DropColumn { column, .. }
            | Change::AlterColumn { column, .. } => Some(column),
            Change::AddTable { .. } | Change::DropTable { .. } => None,
        }
    }

    /// Wire tag of the variant
    pub fn kind(&self) -> &'static str {
        match self {
            Change::AddTable { .. } => "ADD_TABLE",
            Change::DropTable { .. } => "DROP_TABLE",
            Change::AddColumn { .. } => "ADD_COLUMN",
            Change::DropColumn { .. } => "DROP_COLUMN",
            Change::AlterColumn { .. } => "ALTER_COLUMN",
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = match self {
            Change::AddTable { .. } | Change::AddColumn { .. } => '+',
            Change::DropTable { .. } | Change::DropColumn { .. } => '-',
            Change::AlterColumn { .. } => '~',
        };
        write!(f, "{} {:<12} {}", marker, self.kind(), self.table())?;
        if let Some(column) = self.column() {
            write!(f, ".{}", column)?;
        }
        match self {
            Change::AddTable { columns, .. } => {
                let names: Vec<_> = columns.keys().collect();
                write!(f, " [{}]", names.join(", "))
            }
            Change::AddColumn { def, .. } => write!(f, " ({})", def.data_type),
            Change::AlterColumn { modifications, .. } => {
                for m in modifications {
                    write!(f, " [{:?}: {} -> {}]", m.attribute, m.old_value, m.new_value)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Counts per change kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffSummary {
    pub tables_added: usize,
    pub tables_dropped: usize,
    pub columns_added: usize,
    pub columns_dropped: usize,
    pub columns_altered: usize,
    pub total_changes: usize,
}

impl DiffSummary {
    pub fn from_changes(changes: &[Change]) -> Self {
        let mut summary = DiffSummary {
            total_changes: changes.len(),
            ..Default::default()
        };
        for change in changes {
            match change {
                Change::AddTable { .. } => summary.tables_added += 1,
                Change::DropTable { .. } => summary.tables_dropped += 1,
                Change::AddColumn { .. } => summary.columns_added += 1,
                Change::DropColumn { .. } => summary.columns_dropped += 1,
                Change::AlterColumn { .. } => summary.columns_altered += 1,
            }
        }
        summary
    }
}

/// The diff engine that compares schema snapshots
pub struct DiffEngine;

impl DiffEngine {
    /// Compare two snapshots and return every structural difference
    pub fn diff(old: &Snapshot, new: &Snapshot) -> Diff {
        let mut changes = Vec::new();

        for (name, table) in new.tables.iter() {
            if !old.tables.contains_key(name) {
                changes.push(Change::AddTable {
                    table: name.to_string(),
                    columns: table.columns.clone(),
                });
            }
        }

        for name in old.tables.keys() {
            if !new.tables.contains_key(name) {
                changes.push(Change::DropTable {
                    table: name.to_string(),
                });
            }
        }

        for (name, old_table) in old.tables.iter() {
            if let Some(new_table) = new.tables.get(name) {
                Self::diff_columns(name, old_table, new_table, &mut changes);
            }
        }

        changes
    }

    fn diff_columns(table: &str, old: &TableDef, new: &TableDef, changes: &mut Vec<Change>) {
        for (name, column) in new.columns.iter() {
            if !old.columns.contains_key(name) {
                changes.push(Change::AddColumn {
                    table: table.to_string(),
                    column: name.to_string(),
                    def: column.clone(),
                });
            }
        }

        for name in old.columns.keys() {
            if !new.columns.contains_key(name) {
                changes.push(Change::DropColumn {
                    table: table.to_string(),
                    column: name.to_string(),
                });
            }
        }

        for (name, old_column) in old.columns.iter() {
            if let Some(new_column) = new.columns.get(name) {
                let modifications = Self::compare_columns(old_column, new_column);
                if !modifications.is_empty() {
                    changes.push(Change::AlterColumn {
                        table: table.to_string(),
                        column: name.to_string(),
                        modifications,
                    });
                }
            }
        }
    }

    fn compare_columns(old: &ColumnDef, new: &ColumnDef) -> Vec<Modification> {
        let mut modifications = Vec::new();

        if old.data_type != new.data_type {
            modifications.push(Modification {
                attribute: Attribute::Type,
                old_value: Value::from(old.data_type.as_str()),
                new_value: Value::from(new.data_type.as_str()),
            });
        }

        if old.nullable != new.nullable {
            modifications.push(Modification {
                attribute: Attribute::Nullable,
                old_value: Value::Bool(old.nullable),
                new_value: Value::Bool(new.nullable),
            });
        }

        if old.pk != new.pk {
            modifications.push(Modification {
                attribute: Attribute::PrimaryKey,
                old_value: Value::Bool(old.pk),
                new_value: Value::Bool(new.pk),
            });
        }

        if old.default != new.default {
            modifications.push(Modification {
                attribute: Attribute::Default,
                old_value: old.default.clone().map_or(Value::Null, Value::String),
                new_value: new.default.clone().map_or(Value::Null, Value::String),
            });
        }

        modifications
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_change_display_lines() {
        let add = Change::AddTable {
            table: "orders".to_string(),
            columns: [("id", ColumnDef::new("integer")), ("total", ColumnDef::new("numeric"))]
                .into_iter()
                .collect(),
        };
        assert_eq!(add.to_string(), "+ ADD_TABLE    orders [id, total]");

        let drop = Change::DropColumn {
            table: "users".to_string(),
            column: "name".to_string(),
        };
        assert_eq!(drop.to_string(), "- DROP_COLUMN  users.name");

        let alter = Change::AlterColumn {
            table: "users".to_string(),
            column: "email".to_string(),
            modifications: vec![Modification {
                attribute: Attribute::Type,
                old_value: json!("text"),
                new_value: json!("varchar(255)"),
            }],
        };
        assert_eq!(alter.to_string(), "~ ALTER_COLUMN users.email [Type: \"text\" -> \"varchar(255)\"]");
    }

    fn users_v1() -> Snapshot {
        Snapshot::empty().with_table(
            "users",
            TableDef::default()
                .with_column("id", ColumnDef::new("integer").primary_key())
                .with_column("name", ColumnDef::new("text")),
        )
    }

    fn shop() -> Snapshot {
        users_v1()
            .with_table(
                "orders",
                TableDef::default()
                    .with_column("id", ColumnDef::new("integer").primary_key())
                    .with_column("user_id", ColumnDef::new("integer").not_null())
                    .with_column("placed_at", ColumnDef::new("timestamp").with_default("now()")),
            )
            .with_table("audit", TableDef::default())
    }

    #[test]
    fn test_identical_snapshots_produce_empty_diff() {
        assert!(DiffEngine::diff(&shop(), &shop()).is_empty());
        assert!(DiffEngine::diff(&Snapshot::empty(), &Snapshot::empty()).is_empty());
    }

    #[test]
    fn test_diff_from_empty_adds_every_table_with_full_columns() {
        let target = shop();
        let changes = DiffEngine::diff(&Snapshot::empty(), &target);

        assert_eq!(changes.len(), target.table_count());
        for ((name, table), change) in target.tables.iter().zip(&changes) {
            assert_eq!(
                change,
                &Change::AddTable {
                    table: name.to_string(),
                    columns: table.columns.clone(),
                }
            );
        }
    }

    #[test]
    fn test_additive_changes_cover_new_schema() {
        let old = users_v1().with_table("legacy", TableDef::default());
        let mut new = shop();
        new.tables.insert(
            "users",
            TableDef::default()
                .with_column("id", ColumnDef::new("bigint").primary_key())
                .with_column("email", ColumnDef::new("text")),
        );

        let mut rebuilt = old.clone();
        for change in DiffEngine::diff(&old, &new) {
            match change {
                Change::AddTable { table, columns } => {
                    rebuilt.tables.insert(table, TableDef { columns, rows: None });
                }
                Change::AddColumn { table, column, def } => {
                    let mut existing = rebuilt.tables.get(&table).cloned().unwrap();
                    existing.columns.insert(column, def);
                    rebuilt.tables.insert(table, existing);
                }
                _ => {}
            }
        }

        for (name, table) in new.tables.iter() {
            let rebuilt_table = rebuilt.tables.get(name).expect("table missing after additive replay");
            for column in table.columns.keys() {
                assert!(rebuilt_table.columns.contains_key(column), "{}.{} missing", name, column);
            }
        }
    }

    #[test]
    fn test_type_only_change_yields_single_modification() {
        let old = users_v1();
        let mut new = users_v1();
        new.tables.insert(
            "users",
            TableDef::default()
                .with_column("id", ColumnDef::new("integer").primary_key())
                .with_column("name", ColumnDef::new("varchar(255)")),
        );

        let changes = DiffEngine::diff(&old, &new);
        assert_eq!(
            changes,
            vec![Change::AlterColumn {
                table: "users".into(),
                column: "name".into(),
                modifications: vec![Modification {
                    attribute: Attribute::Type,
                    old_value: json!("text"),
                    new_value: json!("varchar(255)"),
                }],
            }]
        );
    }

    #[test]
    fn test_add_nullable_email_column_wire_format() {
        let old = users_v1();
        let mut new = users_v1();
        let users = new.tables.get("users").cloned().unwrap().with_column("email", ColumnDef::new("text"));
        new.tables.insert("users", users);

        let changes = DiffEngine::diff(&old, &new);
        assert_eq!(changes.len(), 1);

        let wire = serde_json::to_value(&changes[0]).unwrap();
        assert_eq!(wire["type"], "ADD_COLUMN");
        assert_eq!(wire["tableName"], "users");
        assert_eq!(wire["columnName"], "email");
        assert_eq!(wire["details"]["type"], "text");
        assert_eq!(wire["details"]["nullable"], true);
    }

    #[test]
    fn test_group_order_adds_then_drops_then_columns() {
        let old = shop();
        let mut new = Snapshot::empty()
            .with_table("invoices", TableDef::default().with_column("id", ColumnDef::new("integer")))
            .with_table("users", users_v1().tables.get("users").cloned().unwrap());
        let orders = shop().tables.get("orders").cloned().unwrap();
        let orders = TableDef {
            columns: orders
                .columns
                .iter()
                .filter(|(name, _)| *name != "placed_at")
                .map(|(name, def)| (name.to_string(), def.clone()))
                .collect(),
            rows: None,
        };
        new.tables.insert("orders", orders.with_column("total", ColumnDef::new("numeric")));

        let kinds: Vec<_> = DiffEngine::diff(&old, &new)
            .iter()
            .map(|c| format!("{} {}", c.kind(), c.column().unwrap_or(c.table())))
            .collect();
        assert_eq!(
            kinds,
            vec!["ADD_TABLE invoices", "DROP_TABLE audit", "ADD_COLUMN total", "DROP_COLUMN placed_at"]
        );
    }

    #[test]
    fn test_default_present_versus_null_is_a_change() {
        let old = Snapshot::empty().with_table("t", TableDef::default().with_column("c", ColumnDef::new("int")));
        let new = Snapshot::empty().with_table(
            "t",
            TableDef::default().with_column("c", ColumnDef::new("int").with_default("0").not_null()),
        );

        let changes = DiffEngine::diff(&old, &new);
        let Change::AlterColumn { modifications, .. } = &changes[0] else {
            panic!("expected ALTER_COLUMN, got {:?}", changes[0]);
        };
        let attributes: Vec<_> = modifications.iter().map(|m| m.attribute).collect();
        assert_eq!(attributes, vec![Attribute::Nullable, Attribute::Default]);
        assert_eq!(modifications[1].old_value, Value::Null);
        assert_eq!(modifications[1].new_value, json!("0"));
    }

    #[test]
    fn test_rename_is_drop_plus_add() {
        let old = Snapshot::empty().with_table("people", TableDef::default());
        let new = Snapshot::empty().with_table("persons", TableDef::default());
        let summary = DiffSummary::from_changes(&DiffEngine::diff(&old, &new));
        assert_eq!(summary.tables_added, 1);
        assert_eq!(summary.tables_dropped, 1);
        assert_eq!(summary.total_changes, 2);
    }

    #[test]
    fn test_stored_history_in_original_format_deserializes() {
        let stored = json!([
            { "type": "DROP_TABLE", "tableName": "old" },
            { "type": "ALTER_COLUMN", "tableName": "users", "columnName": "id",
              "modifications": [{ "trait": "primary_key", "old": false, "new": true }] },
            { "type": "ADD_COLUMN", "table": "users", "column": "email", "def": { "type": "text" } }
        ]);
        let diff: Diff = serde_json::from_value(stored).unwrap();
        assert_eq!(diff[0], Change::DropTable { table: "old".into() });
        assert_eq!(diff[2].column(), Some("email"));
        let Change::AlterColumn { modifications, .. } = &diff[1] else { unreachable!() };
        assert_eq!(modifications[0].attribute, Attribute::PrimaryKey);
    }
}
