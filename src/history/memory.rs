//! In-memory history store
//!
//! Everything lives behind one `RwLock`, so `append_commit` is a single
//! write-locked critical section. Used in tests and when `DATABASE_URL` is unset.

use super::{finalize_diff, new_commit_id, Branch, Commit, HistoryStore, NewCommit, NewProject, Project};
use crate::error::AppError;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    projects: HashMap<Uuid, Project>,
    /// Project name -> project id
    project_names: HashMap<String, Uuid>,
    branches: HashMap<Uuid, Branch>,
    /// Insertion order doubles as the tie-break sequence for the log
    commits: Vec<Commit>,
    /// Commit id -> position in `commits`
    commit_index: HashMap<String, usize>,
}

impl Inner {
    fn branch_by_name(&self, project_id: Uuid, name: &str) -> Option<&Branch> {
        self.branches
            .values()
            .find(|b| b.project_id == project_id && b.name == name)
    }

    fn commit(&self, project_id: Uuid, id: &str) -> Option<&Commit> {
        self.commit_index
            .get(id)
            .map(|&i| &self.commits[i])
            .filter(|c| c.project_id == project_id)
    }

    fn create_branch(&mut self, project_id: Uuid, name: &str) -> Branch {
        let branch = Branch {
            id: Uuid::new_v4(),
            project_id,
            name: name.to_string(),
            head_commit_id: None,
            created_at: Utc::now(),
        };
        self.branches.insert(branch.id, branch.clone());
        branch
    }
}

/// History store backed by process memory
#[derive(Default)]
pub struct MemoryHistoryStore {
    inner: RwLock<Inner>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn find_project(&self, name: &str) -> Result<Option<Project>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .project_names
            .get(name)
            .and_then(|id| inner.projects.get(id))
            .cloned())
    }

    async fn insert_project(&self, project: NewProject) -> Result<Project, AppError> {
        let mut inner = self.inner.write().await;
        if inner.project_names.contains_key(&project.name) {
            return Err(AppError::Conflict(format!("Project '{}' already exists", project.name)));
        }

        let now = Utc::now();
        let project = Project {
            id: Uuid::new_v4(),
            name: project.name,
            description: project.description,
            target_database_url: project.target_database_url,
            owner_id: project.owner_id,
            created_at: now,
            updated_at: now,
        };

        inner.project_names.insert(project.name.clone(), project.id);
        inner.projects.insert(project.id, project.clone());
        inner.create_branch(project.id, super::graph::DEFAULT_BRANCH);

        Ok(project)
    }

    async fn update_project(
        &self,
        project_id: Uuid,
        description: Option<String>,
        target_database_url: Option<String>,
    ) -> Result<Project, AppError> {
        let mut inner = self.inner.write().await;
        let project = inner
            .projects
            .get_mut(&project_id)
            .ok_or_else(|| AppError::ProjectNotFound(project_id.to_string()))?;

        project.description = description;
        if target_database_url.is_some() {
            project.target_database_url = target_database_url;
        }
        project.updated_at = Utc::now();

        Ok(project.clone())
    }

    async fn list_branches(&self, project_id: Uuid) -> Result<Vec<Branch>, AppError> {
        let inner = self.inner.read().await;
        let mut branches: Vec<Branch> = inner
            .branches
            .values()
            .filter(|b| b.project_id == project_id)
            .cloned()
            .collect();
        branches.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
        Ok(branches)
    }

    async fn find_branch(&self, project_id: Uuid, name: &str) -> Result<Option<Branch>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner.branch_by_name(project_id, name).cloned())
    }

    async fn append_commit(&self, project_id: Uuid, branch_name: &str, commit: NewCommit) -> Result<Commit, AppError> {
        let mut inner = self.inner.write().await;

        if !inner.projects.contains_key(&project_id) {
            return Err(AppError::ProjectNotFound(project_id.to_string()));
        }

        let branch = match inner.branch_by_name(project_id, branch_name) {
            Some(branch) => branch.clone(),
            None => inner.create_branch(project_id, branch_name),
        };

        let parent_id = match commit.parent_commit_id {
            Some(explicit) => {
                if inner.commit(project_id, &explicit).is_none() {
                    return Err(AppError::CommitNotFound(explicit));
                }
                Some(explicit)
            }
            None => branch.head_commit_id.clone(),
        };

        let parent_snapshot = parent_id
            .as_deref()
            .and_then(|id| inner.commit(project_id, id))
            .map(|c| &c.snapshot);
        let diff = finalize_diff(commit.diff, parent_snapshot, &commit.snapshot);

        let record = Commit {
            id: new_commit_id(),
            project_id,
            branch_id: branch.id,
            message: commit.message,
            author: commit.author,
            snapshot: commit.snapshot,
            diff,
            parent_commit_id: parent_id,
            created_at: Utc::now(),
        };

        let position = inner.commits.len();
        inner.commit_index.insert(record.id.clone(), position);
        inner.commits.push(record.clone());
        if let Some(branch) = inner.branches.get_mut(&branch.id) {
            branch.head_commit_id = Some(record.id.clone());
        }

        Ok(record)
    }

    async fn find_commit(&self, project_id: Uuid, id: &str) -> Result<Option<Commit>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner.commit(project_id, id).cloned())
    }

    async fn find_commits_by_prefix(&self, project_id: Uuid, prefix: &str, limit: usize) -> Result<Vec<Commit>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .commits
            .iter()
            .filter(|c| c.project_id == project_id && c.id.starts_with(prefix))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_commits(&self, project_id: Uuid, limit: usize) -> Result<Vec<Commit>, AppError> {
        let inner = self.inner.read().await;
        let mut commits: Vec<(usize, &Commit)> = inner
            .commits
            .iter()
            .enumerate()
            .filter(|(_, c)| c.project_id == project_id)
            .collect();
        commits.sort_by(|(seq_a, a), (seq_b, b)| b.created_at.cmp(&a.created_at).then(seq_b.cmp(seq_a)));
        Ok(commits.into_iter().take(limit).map(|(_, c)| c.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{ColumnDef, Snapshot, TableDef};

    fn new_project(name: &str) -> NewProject {
        NewProject {
            name: name.to_string(),
            description: None,
            target_database_url: None,
            owner_id: "tester".to_string(),
        }
    }

    fn new_commit(message: &str, snapshot: Snapshot) -> NewCommit {
        NewCommit {
            message: message.to_string(),
            author: "tester".to_string(),
            snapshot,
            diff: None,
            branch_name: None,
            parent_commit_id: None,
        }
    }

    #[tokio::test]
    async fn test_insert_project_creates_main_branch() {
        let store = MemoryHistoryStore::new();
        let project = store.insert_project(new_project("shop")).await.unwrap();

        let branches = store.list_branches(project.id).await.unwrap();
        assert_eq!(branches.len(), 1);
        assert_eq!(branches[0].name, "main");
        assert_eq!(branches[0].head_commit_id, None);
    }

    #[tokio::test]
    async fn test_duplicate_project_name_conflicts() {
        let store = MemoryHistoryStore::new();
        store.insert_project(new_project("shop")).await.unwrap();
        let err = store.insert_project(new_project("shop")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_commits_are_scoped_to_their_project() {
        let store = MemoryHistoryStore::new();
        let a = store.insert_project(new_project("a")).await.unwrap();
        let b = store.insert_project(new_project("b")).await.unwrap();

        let commit = store
            .append_commit(a.id, "main", new_commit("init", Snapshot::empty()))
            .await
            .unwrap();

        assert!(store.find_commit(a.id, &commit.id).await.unwrap().is_some());
        assert!(store.find_commit(b.id, &commit.id).await.unwrap().is_none());
        assert!(store.find_commits_by_prefix(b.id, &commit.id[..4], 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_appends_on_one_branch_form_a_chain() {
        let store = std::sync::Arc::new(MemoryHistoryStore::new());
        let project_id = store.insert_project(new_project("shop")).await.unwrap().id;

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let snapshot = Snapshot::empty().with_table(
                    format!("t{}", i),
                    TableDef::default().with_column("id", ColumnDef::new("integer")),
                );
                store
                    .append_commit(project_id, "main", new_commit("parallel", snapshot))
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // Every commit has a distinct parent, so none was lost
        let commits = store.list_commits(project_id, 100).await.unwrap();
        let mut parents: Vec<_> = commits.iter().map(|c| c.parent_commit_id.clone()).collect();
        parents.sort();
        parents.dedup();
        assert_eq!(parents.len(), 8);
        assert_eq!(commits.iter().filter(|c| c.parent_commit_id.is_none()).count(), 1);

        let head = store.find_branch(project_id, "main").await.unwrap().unwrap().head_commit_id;
        assert_eq!(head.as_deref(), Some(commits[0].id.as_str()));
    }
}
