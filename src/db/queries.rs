//! SQL query constants and builders
//!
//! Metadata store DDL and queries, the catalog query used by rollback, and
//! helpers for quoting identifiers and literals.

/// Metadata tables, created on startup
pub const BOOTSTRAP: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS projects (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        description TEXT,
        target_database_url TEXT,
        owner_id TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS branches (
        id UUID PRIMARY KEY,
        project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        head_commit_id TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        UNIQUE (project_id, name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS commits (
        seq BIGSERIAL UNIQUE,
        id TEXT PRIMARY KEY,
        project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        branch_id UUID NOT NULL REFERENCES branches(id) ON DELETE CASCADE,
        message TEXT NOT NULL,
        author TEXT NOT NULL,
        snapshot TEXT NOT NULL,
        diff TEXT NOT NULL,
        parent_commit_id TEXT REFERENCES commits(id),
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_branches_project_id ON branches(project_id)",
    "CREATE INDEX IF NOT EXISTS idx_commits_project_log ON commits(project_id, created_at DESC, seq DESC)",
];

const PROJECT_COLUMNS: &str =
    "id, name, description, target_database_url, owner_id, created_at, updated_at";

const BRANCH_COLUMNS: &str = "id, project_id, name, head_commit_id, created_at";

const COMMIT_COLUMNS: &str =
    "id, project_id, branch_id, message, author, snapshot, diff, parent_commit_id, created_at";

pub fn select_project_by_name() -> String {
    format!("SELECT {} FROM projects WHERE name = $1", PROJECT_COLUMNS)
}

pub fn insert_project() -> String {
    format!(
        "INSERT INTO projects ({}) VALUES ($1, $2, $3, $4, $5, $6, $6) RETURNING {}",
        PROJECT_COLUMNS, PROJECT_COLUMNS
    )
}

/// `$3` only replaces the target URL when non-null
pub fn update_project() -> String {
    format!(
        "UPDATE projects SET description = $2, target_database_url = COALESCE($3, target_database_url), updated_at = now() \
         WHERE id = $1 RETURNING {}",
        PROJECT_COLUMNS
    )
}

pub fn select_branches() -> String {
    format!(
        "SELECT {} FROM branches WHERE project_id = $1 ORDER BY created_at, name",
        BRANCH_COLUMNS
    )
}

pub fn select_branch() -> String {
    format!("SELECT {} FROM branches WHERE project_id = $1 AND name = $2", BRANCH_COLUMNS)
}

/// Locks the branch row until the surrounding transaction ends
pub fn select_branch_for_update() -> String {
    format!("{} FOR UPDATE", select_branch())
}

pub const INSERT_BRANCH: &str = r#"
    INSERT INTO branches (id, project_id, name, created_at)
    VALUES ($1, $2, $3, now())
    ON CONFLICT (project_id, name) DO NOTHING
"#;

pub const ADVANCE_HEAD: &str = "UPDATE branches SET head_commit_id = $2 WHERE id = $1";

pub fn insert_commit() -> String {
    format!(
        "INSERT INTO commits ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now()) RETURNING {}",
        COMMIT_COLUMNS, COMMIT_COLUMNS
    )
}

pub fn select_commit() -> String {
    format!("SELECT {} FROM commits WHERE project_id = $1 AND id = $2", COMMIT_COLUMNS)
}

pub fn select_commits_by_prefix() -> String {
    format!(
        "SELECT {} FROM commits WHERE project_id = $1 AND left(id, length($2)) = $2 ORDER BY seq LIMIT $3",
        COMMIT_COLUMNS
    )
}

pub fn select_commit_log() -> String {
    format!(
        "SELECT {} FROM commits WHERE project_id = $1 ORDER BY created_at DESC, seq DESC LIMIT $2",
        COMMIT_COLUMNS
    )
}

/// Base tables of one schema on a target database
pub const LIST_USER_TABLES: &str = r#"
    SELECT c.relname::text AS name
    FROM pg_catalog.pg_class c
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    WHERE c.relkind IN ('r', 'p')
        AND n.nspname = $1
        AND NOT c.relispartition
    ORDER BY c.relname
"#;

/// SQL builder helper for dynamic queries
pub struct SqlBuilder;

impl SqlBuilder {
    /// Quote an identifier (table/column name) safely
    pub fn quote_ident(ident: &str) -> String {
        // PostgreSQL identifier quoting
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Schema-qualified, quoted table name
    pub fn qualified(schema: &str, table: &str) -> String {
        format!("{}.{}", Self::quote_ident(schema), Self::quote_ident(table))
    }

    /// Quote a string literal (standard_conforming_strings)
    pub fn quote_literal(value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// Build DROP TABLE query
    pub fn drop_table(schema: &str, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {} CASCADE", Self::qualified(schema, table))
    }

    /// Build CREATE TABLE query
    pub fn create_table(schema: &str, table: &str, column_defs: &[String]) -> String {
        format!(
            "CREATE TABLE {} ({})",
            Self::qualified(schema, table),
            column_defs.join(", ")
        )
    }

    /// Build INSERT query from already rendered values
    pub fn insert(schema: &str, table: &str, columns: &[&str], values: &[String]) -> String {
        if columns.is_empty() {
            return format!("INSERT INTO {} DEFAULT VALUES", Self::qualified(schema, table));
        }
        let columns: Vec<String> = columns.iter().map(|c| Self::quote_ident(c)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            Self::qualified(schema, table),
            columns.join(", "),
            values.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_lock_query_shape() {
        assert_eq!(
            select_branch_for_update(),
            "SELECT id, project_id, name, head_commit_id, created_at FROM branches \
             WHERE project_id = $1 AND name = $2 FOR UPDATE"
        );
    }

    #[test]
    fn test_prefix_query_is_scoped_and_bounded() {
        let sql = select_commits_by_prefix();
        assert!(sql.starts_with(&format!("SELECT {} FROM commits", COMMIT_COLUMNS)));
        assert!(sql.contains("WHERE project_id = $1 AND left(id, length($2)) = $2"));
        assert!(sql.ends_with("ORDER BY seq LIMIT $3"));
        assert!(!sql.contains("LIKE"));
    }

    #[test]
    fn test_commit_log_orders_newest_first_with_sequence_tiebreak() {
        assert!(select_commit_log().ends_with("ORDER BY created_at DESC, seq DESC LIMIT $2"));
    }

    #[test]
    fn test_column_lists_match_row_mapper_positions() {
        let commit: Vec<_> = COMMIT_COLUMNS.split(", ").collect();
        assert_eq!(
            commit,
            vec!["id", "project_id", "branch_id", "message", "author", "snapshot", "diff", "parent_commit_id", "created_at"]
        );
        let branch: Vec<_> = BRANCH_COLUMNS.split(", ").collect();
        assert_eq!(branch, vec!["id", "project_id", "name", "head_commit_id", "created_at"]);
        let project: Vec<_> = PROJECT_COLUMNS.split(", ").collect();
        assert_eq!(
            project,
            vec!["id", "name", "description", "target_database_url", "owner_id", "created_at", "updated_at"]
        );
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(SqlBuilder::quote_ident("users"), "\"users\"");
        assert_eq!(SqlBuilder::quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_quote_literal_escapes_single_quotes() {
        assert_eq!(SqlBuilder::quote_literal("O'Brien"), "'O''Brien'");
    }

    #[test]
    fn test_insert_without_columns_uses_default_values() {
        assert_eq!(
            SqlBuilder::insert("public", "t", &[], &[]),
            "INSERT INTO \"public\".\"t\" DEFAULT VALUES"
        );
        assert_eq!(
            SqlBuilder::insert("public", "t", &["a", "b"], &["'1'".to_string(), "NULL".to_string()]),
            "INSERT INTO \"public\".\"t\" (\"a\", \"b\") VALUES ('1', NULL)"
        );
    }
}
