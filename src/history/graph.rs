//! Commit graph service
//!
//! Project-level operations over a [`HistoryStore`]: project creation,
//! committing, head lookup, log and id/prefix resolution.

use super::{Branch, Commit, CommitSummary, HistoryStore, NewCommit, NewProject, Project, ProjectWithBranches};
use crate::error::AppError;
use std::sync::Arc;
use tracing::{debug, info};

/// Branch created with every project and used when none is named
pub const DEFAULT_BRANCH: &str = "main";

/// Log length when the caller gives none
pub const DEFAULT_LOG_LIMIT: usize = 20;

/// Prefix matches fetched when resolving an abbreviated commit id
const PREFIX_CANDIDATES: usize = 5;

/// Ids are stored as lowercase hyphenated UUIDs
fn normalize_commit_id(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

/// Service over the commit graph
#[derive(Clone)]
pub struct CommitGraph {
    store: Arc<dyn HistoryStore>,
}

impl CommitGraph {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self { store }
    }

    /// Create a project, or refresh the description of an existing one
    pub async fn create_project(&self, project: NewProject) -> Result<Project, AppError> {
        match self.store.find_project(&project.name).await? {
            Some(existing) => {
                debug!("Project '{}' exists, updating metadata", existing.name);
                self.store
                    .update_project(existing.id, project.description, project.target_database_url)
                    .await
            }
            None => {
                let created = self.store.insert_project(project).await?;
                info!("Created project '{}' ({})", created.name, created.id);
                Ok(created)
            }
        }
    }

    pub async fn get_project(&self, name: &str) -> Result<ProjectWithBranches, AppError> {
        let project = self.require_project(name).await?;
        let branches = self.store.list_branches(project.id).await?;
        Ok(ProjectWithBranches { project, branches })
    }

    /// Explicit branch lookup; unlike committing, a missing branch is an error here
    pub async fn get_branch(&self, project_name: &str, branch_name: &str) -> Result<Branch, AppError> {
        let project = self.require_project(project_name).await?;
        self.store
            .find_branch(project.id, branch_name)
            .await?
            .ok_or_else(|| AppError::BranchNotFound(branch_name.to_string()))
    }

    /// Record a snapshot on a branch and advance its head
    pub async fn create_commit(&self, project_name: &str, mut commit: NewCommit) -> Result<Commit, AppError> {
        let project = self.require_project(project_name).await?;
        commit.snapshot.validate()?;
        commit.parent_commit_id = commit
            .parent_commit_id
            .as_deref()
            .map(normalize_commit_id)
            .filter(|id| !id.is_empty());
        debug!(
            "Snapshot for '{}': {} tables, {} columns",
            project.name,
            commit.snapshot.table_count(),
            commit.snapshot.column_count()
        );

        let branch_name = commit
            .branch_name
            .clone()
            .filter(|b| !b.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BRANCH.to_string());

        let created = self.store.append_commit(project.id, &branch_name, commit).await?;
        info!(
            "Committed {} to {}/{} (parent: {}, {} changes)",
            created.id,
            project.name,
            branch_name,
            created.parent_commit_id.as_deref().unwrap_or("none"),
            created.diff.len()
        );
        for change in &created.diff {
            debug!("  {}", change);
        }
        Ok(created)
    }

    /// Head commit of a branch; `None` when the branch is missing or empty
    pub async fn get_latest_commit(&self, project_name: &str, branch: Option<&str>) -> Result<Option<Commit>, AppError> {
        let project = self.require_project(project_name).await?;
        let branch_name = branch.unwrap_or(DEFAULT_BRANCH);

        let Some(branch) = self.store.find_branch(project.id, branch_name).await? else {
            debug!("Branch '{}' not found in '{}'", branch_name, project.name);
            return Ok(None);
        };
        match branch.head_commit_id {
            Some(head) => self.store.find_commit(project.id, &head).await,
            None => Ok(None),
        }
    }

    /// Newest commits first across all branches
    pub async fn get_commit_log(&self, project_name: &str, limit: Option<usize>) -> Result<Vec<CommitSummary>, AppError> {
        let project = self.require_project(project_name).await?;
        let limit = limit.unwrap_or(DEFAULT_LOG_LIMIT);
        let commits = self.store.list_commits(project.id, limit).await?;
        Ok(commits.iter().map(CommitSummary::from).collect())
    }

    /// Exact id first, then a unique prefix
    pub async fn get_commit_by_id(&self, project_name: &str, id_or_prefix: &str) -> Result<Option<Commit>, AppError> {
        let project = self.require_project(project_name).await?;
        let needle = normalize_commit_id(id_or_prefix);
        if needle.is_empty() {
            return Err(AppError::Validation("Commit identifier must not be empty".to_string()));
        }

        if let Some(commit) = self.store.find_commit(project.id, &needle).await? {
            return Ok(Some(commit));
        }

        let mut matches = self
            .store
            .find_commits_by_prefix(project.id, &needle, PREFIX_CANDIDATES)
            .await?;
        debug!("Prefix '{}' matched {} commit(s)", needle, matches.len());

        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            _ => Err(AppError::AmbiguousIdentifier {
                prefix: needle,
                candidates: matches.into_iter().map(|c| c.id).collect(),
            }),
        }
    }

    /// Like `get_commit_by_id`, but a miss is an error
    pub async fn resolve_commit(&self, project_name: &str, id_or_prefix: &str) -> Result<Commit, AppError> {
        self.get_commit_by_id(project_name, id_or_prefix)
            .await?
            .ok_or_else(|| AppError::CommitNotFound(id_or_prefix.to_string()))
    }

    pub async fn require_project(&self, name: &str) -> Result<Project, AppError> {
        self.store
            .find_project(name)
            .await?
            .ok_or_else(|| AppError::ProjectNotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryHistoryStore;
    use crate::snapshot::{Change, ColumnDef, Snapshot, TableDef};
    use pretty_assertions::assert_eq;

    fn graph() -> CommitGraph {
        CommitGraph::new(Arc::new(MemoryHistoryStore::new()))
    }

    async fn graph_with_project(name: &str) -> CommitGraph {
        let graph = graph();
        graph
            .create_project(NewProject {
                name: name.to_string(),
                description: Some("test project".to_string()),
                target_database_url: None,
                owner_id: "alice".to_string(),
            })
            .await
            .unwrap();
        graph
    }

    fn commit(message: &str, snapshot: Snapshot) -> NewCommit {
        NewCommit {
            message: message.to_string(),
            author: "alice".to_string(),
            snapshot,
            diff: None,
            branch_name: None,
            parent_commit_id: None,
        }
    }

    fn users(extra_columns: &[&str]) -> Snapshot {
        let mut table = TableDef::default().with_column("id", ColumnDef::new("integer").primary_key());
        for name in extra_columns {
            table = table.with_column(*name, ColumnDef::new("text"));
        }
        Snapshot::empty().with_table("users", table)
    }

    #[tokio::test]
    async fn test_parent_chain_terminates_at_root() {
        let graph = graph_with_project("shop").await;
        let mut ids = Vec::new();
        for i in 0..4 {
            let snapshot = users(&[]).with_table(format!("t{}", i), TableDef::default());
            ids.push(graph.create_commit("shop", commit("step", snapshot)).await.unwrap().id);
        }

        let mut current = graph.get_latest_commit("shop", None).await.unwrap().unwrap();
        assert_eq!(&current.id, ids.last().unwrap());
        let mut hops = 0;
        while let Some(parent) = current.parent_commit_id.clone() {
            current = graph.get_commit_by_id("shop", &parent).await.unwrap().unwrap();
            hops += 1;
        }
        assert_eq!(hops, 3);
        assert_eq!(current.id, ids[0]);
    }

    #[tokio::test]
    async fn test_latest_commit_on_fresh_and_unknown_projects() {
        let graph = graph_with_project("shop").await;
        assert_eq!(graph.get_latest_commit("shop", None).await.unwrap(), None);
        assert_eq!(graph.get_latest_commit("shop", Some("feature")).await.unwrap(), None);

        let err = graph.get_latest_commit("ghost", None).await.unwrap_err();
        assert!(matches!(err, AppError::ProjectNotFound(name) if name == "ghost"));
    }

    #[tokio::test]
    async fn test_commit_to_unknown_project_fails() {
        let err = graph().create_commit("ghost", commit("init", users(&[]))).await.unwrap_err();
        assert!(matches!(err, AppError::ProjectNotFound(_)));
    }

    #[tokio::test]
    async fn test_commit_to_new_branch_creates_it() {
        let graph = graph_with_project("shop").await;
        let mut feature = commit("feature work", users(&["email"]));
        feature.branch_name = Some("feature".to_string());
        let created = graph.create_commit("shop", feature).await.unwrap();

        let project = graph.get_project("shop").await.unwrap();
        let names: Vec<_> = project.branches.iter().map(|b| b.name.as_str()).collect();
        assert!(names.contains(&"feature"));
        assert_eq!(created.parent_commit_id, None);

        let head = graph.get_latest_commit("shop", Some("feature")).await.unwrap().unwrap();
        assert_eq!(head.id, created.id);
        assert_eq!(graph.get_latest_commit("shop", None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_explicit_parent_is_respected_and_validated() {
        let graph = graph_with_project("shop").await;
        let first = graph.create_commit("shop", commit("one", users(&[]))).await.unwrap();
        graph.create_commit("shop", commit("two", users(&["name"]))).await.unwrap();

        let mut branched = commit("from one", users(&["email"]));
        branched.parent_commit_id = Some(first.id.clone());
        let third = graph.create_commit("shop", branched).await.unwrap();
        assert_eq!(third.parent_commit_id.as_deref(), Some(first.id.as_str()));
        assert_eq!(
            third.diff,
            vec![Change::AddColumn {
                table: "users".into(),
                column: "email".into(),
                def: ColumnDef::new("text"),
            }]
        );

        let mut shouted = commit("from one again", users(&["phone"]));
        shouted.parent_commit_id = Some(format!("  {}\n", first.id.to_ascii_uppercase()));
        let fourth = graph.create_commit("shop", shouted).await.unwrap();
        assert_eq!(fourth.parent_commit_id.as_deref(), Some(first.id.as_str()));

        let mut dangling = commit("bad parent", users(&[]));
        dangling.parent_commit_id = Some("00000000-0000-4000-8000-000000000000".to_string());
        let err = graph.create_commit("shop", dangling).await.unwrap_err();
        assert!(matches!(err, AppError::CommitNotFound(_)));
    }

    #[tokio::test]
    async fn test_root_diff_computed_against_empty_snapshot() {
        let graph = graph_with_project("shop").await;
        let root = graph.create_commit("shop", commit("init", users(&["name"]))).await.unwrap();
        assert_eq!(root.diff.len(), 1);
        assert!(matches!(&root.diff[0], Change::AddTable { table, .. } if table == "users"));
    }

    #[tokio::test]
    async fn test_supplied_diff_is_stored_verbatim() {
        let graph = graph_with_project("shop").await;
        let mut input = commit("init", users(&[]));
        input.diff = Some(vec![]);
        let created = graph.create_commit("shop", input).await.unwrap();
        assert!(created.diff.is_empty());
    }

    #[tokio::test]
    async fn test_exact_and_prefix_lookup() {
        let graph = graph_with_project("shop").await;
        let created = graph.create_commit("shop", commit("init", users(&[]))).await.unwrap();

        let exact = graph.get_commit_by_id("shop", &created.id).await.unwrap().unwrap();
        assert_eq!(exact.id, created.id);

        let by_prefix = graph.get_commit_by_id("shop", &created.id[..8]).await.unwrap().unwrap();
        assert_eq!(by_prefix.id, created.id);

        let upper = created.id[..8].to_ascii_uppercase();
        assert!(graph.get_commit_by_id("shop", &upper).await.unwrap().is_some());

        assert_eq!(graph.get_commit_by_id("shop", "zzzz").await.unwrap(), None);
        assert!(matches!(
            graph.get_commit_by_id("shop", "  ").await.unwrap_err(),
            AppError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn test_shared_prefix_is_ambiguous() {
        let graph = graph_with_project("shop").await;
        // 17 ids over 16 hex digits: two must share their first character
        let mut ids = Vec::new();
        for i in 0..17 {
            let snapshot = users(&[]).with_table(format!("t{}", i), TableDef::default());
            ids.push(graph.create_commit("shop", commit("c", snapshot)).await.unwrap().id);
        }
        let prefix = ids
            .iter()
            .map(|id| &id[..1])
            .find(|p| ids.iter().filter(|id| id.starts_with(*p)).count() > 1)
            .unwrap()
            .to_string();

        match graph.get_commit_by_id("shop", &prefix).await {
            Err(AppError::AmbiguousIdentifier { prefix: reported, candidates }) => {
                assert_eq!(reported, prefix);
                assert!(candidates.len() > 1);
                assert!(candidates.iter().all(|c| c.starts_with(&prefix)));
            }
            other => panic!("expected ambiguity, got {:?}", other.map(|c| c.map(|c| c.id))),
        }
    }

    #[tokio::test]
    async fn test_log_is_newest_first_and_limited() {
        let graph = graph_with_project("shop").await;
        let mut ids = Vec::new();
        for i in 0..5 {
            let snapshot = users(&[]).with_table(format!("t{}", i), TableDef::default());
            ids.push(graph.create_commit("shop", commit(&format!("c{}", i), snapshot)).await.unwrap().id);
        }

        let log = graph.get_commit_log("shop", Some(3)).await.unwrap();
        let logged: Vec<_> = log.iter().map(|c| c.id.clone()).collect();
        assert_eq!(logged, vec![ids[4].clone(), ids[3].clone(), ids[2].clone()]);
        assert_eq!(log[0].short_id, &ids[4][..7]);

        assert_eq!(graph.get_commit_log("shop", None).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_create_project_twice_updates_description() {
        let graph = graph_with_project("shop").await;
        let again = graph
            .create_project(NewProject {
                name: "shop".to_string(),
                description: Some("renamed".to_string()),
                target_database_url: Some("postgres://u:p@localhost/shop".to_string()),
                owner_id: "bob".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(again.description.as_deref(), Some("renamed"));
        assert_eq!(again.owner_id, "alice");
        assert_eq!(graph.get_project("shop").await.unwrap().branches.len(), 1);
    }

    #[tokio::test]
    async fn test_get_branch_reports_missing_branch() {
        let graph = graph_with_project("shop").await;
        let main = graph.get_branch("shop", DEFAULT_BRANCH).await.unwrap();
        assert!(main.head_commit_id.is_none());

        let err = graph.get_branch("shop", "feature").await.unwrap_err();
        assert!(matches!(err, AppError::BranchNotFound(name) if name == "feature"));
    }
}
