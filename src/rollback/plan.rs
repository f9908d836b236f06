//! Rollback planning
//!
//! Turns a target's current table list and a stored snapshot into the ordered
//! SQL that rebuilds the snapshot: drops, then creates, then literal rows.
//! Pure; nothing here touches a database.

use crate::db::queries::SqlBuilder;
use crate::snapshot::{ColumnDef, Snapshot, TableDef};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

/// Knobs for how a snapshot is rebuilt
#[derive(Debug, Clone)]
pub struct RollbackOptions {
    pub schema: String,
    /// Never dropped and never recreated
    pub reserved_table: String,
    /// Reapply NOT NULL, DEFAULT and PRIMARY KEY as well as types
    pub full_fidelity: bool,
    pub statement_timeout_ms: Option<u64>,
}

impl Default for RollbackOptions {
    fn default() -> Self {
        Self {
            schema: "public".to_string(),
            reserved_table: "_dbgit_meta".to_string(),
            full_fidelity: false,
            statement_timeout_ms: None,
        }
    }
}

/// One statement of the plan, tagged with the table it affects
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedStatement {
    pub table: String,
    pub sql: String,
}

/// Ordered SQL that replaces the target schema with a snapshot
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackPlan {
    pub setup: Vec<String>,
    pub drops: Vec<PlannedStatement>,
    pub creates: Vec<PlannedStatement>,
    pub inserts: Vec<PlannedStatement>,
    /// Snapshot tables with no columns
    pub skipped_tables: Vec<String>,
}

impl RollbackPlan {
    pub fn build(existing_tables: &[String], snapshot: &Snapshot, options: &RollbackOptions) -> Self {
        let mut plan = RollbackPlan::default();

        if let Some(ms) = options.statement_timeout_ms {
            plan.setup.push(format!("SET LOCAL statement_timeout = {}", ms));
        }

        for table in existing_tables {
            if *table == options.reserved_table {
                continue;
            }
            plan.drops.push(PlannedStatement {
                table: table.clone(),
                sql: SqlBuilder::drop_table(&options.schema, table),
            });
        }

        for (name, table) in snapshot.tables.iter() {
            if name == options.reserved_table {
                continue;
            }
            if table.columns.is_empty() {
                warn!("Skipping table '{}': snapshot records no columns", name);
                plan.skipped_tables.push(name.to_string());
                continue;
            }

            plan.creates.push(PlannedStatement {
                table: name.to_string(),
                sql: SqlBuilder::create_table(&options.schema, name, &column_definitions(name, table, options)),
            });

            for row in table.rows.iter().flatten() {
                let columns: Vec<&str> = row.keys().collect();
                let values: Vec<String> = row.values().map(render_literal).collect();
                plan.inserts.push(PlannedStatement {
                    table: name.to_string(),
                    sql: SqlBuilder::insert(&options.schema, name, &columns, &values),
                });
            }
        }

        plan
    }

    /// Every statement in execution order
    pub fn statements(&self) -> impl Iterator<Item = &str> {
        self.setup
            .iter()
            .map(String::as_str)
            .chain(self.drops.iter().map(|s| s.sql.as_str()))
            .chain(self.creates.iter().map(|s| s.sql.as_str()))
            .chain(self.inserts.iter().map(|s| s.sql.as_str()))
    }
}

fn column_definitions(table_name: &str, table: &TableDef, options: &RollbackOptions) -> Vec<String> {
    let mut defs: Vec<String> = table
        .columns
        .iter()
        .map(|(name, column)| column_definition(table_name, name, column, options.full_fidelity))
        .collect();

    if options.full_fidelity {
        let pk = table.primary_key();
        if !pk.is_empty() {
            let cols: Vec<String> = pk.iter().map(|c| SqlBuilder::quote_ident(c)).collect();
            defs.push(format!("PRIMARY KEY ({})", cols.join(", ")));
        }
    }

    defs
}

fn column_definition(table_name: &str, name: &str, column: &ColumnDef, full_fidelity: bool) -> String {
    let mut def = format!("{} {}", SqlBuilder::quote_ident(name), column.data_type);
    if !full_fidelity {
        return def;
    }

    if !column.nullable {
        def.push_str(" NOT NULL");
    }
    match column.default.as_deref() {
        // The sequence was dropped with the old table
        Some(expr) if expr.contains("nextval(") => {
            warn!("Not restoring sequence default of {}.{}: {}", table_name, name, expr);
        }
        Some(expr) => {
            def.push_str(" DEFAULT ");
            def.push_str(expr);
        }
        None => {}
    }
    def
}

/// Untyped quoted literal; the column type decides the conversion
pub fn render_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => SqlBuilder::quote_literal(if *b { "true" } else { "false" }),
        Value::Number(n) => SqlBuilder::quote_literal(&n.to_string()),
        Value::String(s) => SqlBuilder::quote_literal(s),
        Value::Array(_) | Value::Object(_) => SqlBuilder::quote_literal(&value.to_string()),
    }
}
