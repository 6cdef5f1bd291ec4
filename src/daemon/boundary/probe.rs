use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::daemon::storage::entities::WORKSPACE_NAME_DELIMITER;

/// Label used when no workspace is configured.
pub const NO_WORKSPACE_LABEL: &str = "--";

/// What the tracked time is attributed to. Two identities are equal when the workspaces match
/// and they contain the same set of repository heads.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkspaceIdentity {
    workspaces: Vec<String>,
    repositories: Vec<String>,
}

impl WorkspaceIdentity {
    pub fn new(workspaces: Vec<String>, mut repositories: Vec<String>) -> Self {
        repositories.sort();
        repositories.dedup();
        Self {
            workspaces,
            repositories,
        }
    }

    pub fn workspaces(&self) -> &[String] {
        &self.workspaces
    }

    pub fn repositories(&self) -> &[String] {
        &self.repositories
    }

    /// Workspace whose total is shown in the status line.
    pub fn primary_workspace(&self) -> Option<&str> {
        self.workspaces.first().map(String::as_str)
    }

    pub fn workspace_label(&self) -> String {
        if self.workspaces.is_empty() {
            NO_WORKSPACE_LABEL.to_owned()
        } else {
            self.workspaces.join(WORKSPACE_NAME_DELIMITER)
        }
    }

    pub fn repository_labels(&self) -> Option<Vec<String>> {
        (!self.repositories.is_empty()).then(|| self.repositories.clone())
    }
}

/// Everything whose change splits the tracked interval. Repository heads are kept sorted by
/// [WorkspaceIdentity], so equality is enough to detect a crossing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boundary {
    pub identity: WorkspaceIdentity,
    pub track_git_branch: bool,
}

impl Boundary {
    pub fn new(identity: WorkspaceIdentity, track_git_branch: bool) -> Self {
        Self {
            identity,
            track_git_branch,
        }
    }
}

/// Intended to serve as a contract for finding out what the user is currently working on.
#[cfg_attr(test, mockall::automock)]
pub trait WorkspaceProbe: Send {
    fn identity(
        &mut self,
        workspaces: &[PathBuf],
        track_git_branch: bool,
    ) -> Result<WorkspaceIdentity>;
}

/// Reads workspace names from directory names and branches from `.git/HEAD`.
pub struct FsWorkspaceProbe;

impl WorkspaceProbe for FsWorkspaceProbe {
    fn identity(
        &mut self,
        workspaces: &[PathBuf],
        track_git_branch: bool,
    ) -> Result<WorkspaceIdentity> {
        let names: Vec<String> = workspaces.iter().map(|v| workspace_name(v)).collect();

        let mut repositories = vec![];
        if track_git_branch {
            for path in workspaces {
                if let Some(branch) = git_head(path)? {
                    repositories.push(format!("{}/{branch}", workspace_name(path)));
                }
            }
        }

        trace!("Probed {names:?} {repositories:?}");
        Ok(WorkspaceIdentity::new(names, repositories))
    }
}

fn workspace_name(path: &Path) -> String {
    path.file_name()
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

const DETACHED_HEAD_LENGTH: usize = 7;

/// Returns the checked out branch of a repository rooted at `root`, or the abbreviated commit for
/// a detached head. `None` if `root` isn't a repository.
fn git_head(root: &Path) -> Result<Option<String>> {
    let dot_git = root.join(".git");
    let git_dir = if dot_git.is_dir() {
        dot_git
    } else if dot_git.is_file() {
        // Worktrees and submodules point to the real git directory
        let contents = std::fs::read_to_string(&dot_git)
            .with_context(|| format!("Failed to read {dot_git:?}"))?;
        match contents.trim().strip_prefix("gitdir:") {
            Some(dir) => root.join(dir.trim()),
            None => return Ok(None),
        }
    } else {
        return Ok(None);
    };

    let head_path = git_dir.join("HEAD");
    let head = match std::fs::read_to_string(&head_path) {
        Ok(v) => v,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {head_path:?}")),
    };
    Ok(parse_head(head.trim()))
}

fn parse_head(head: &str) -> Option<String> {
    if let Some(reference) = head.strip_prefix("ref:") {
        let reference = reference.trim();
        let branch = reference.strip_prefix("refs/heads/").unwrap_or(reference);
        return Some(branch.to_owned());
    }
    if head.is_empty() {
        return None;
    }
    Some(head.chars().take(DETACHED_HEAD_LENGTH).collect())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use anyhow::Result;
    use tempfile::tempdir;

    use super::{parse_head, FsWorkspaceProbe, WorkspaceIdentity, WorkspaceProbe};

    #[test]
    fn test_parse_head() {
        assert_eq!(parse_head("ref: refs/heads/main"), Some("main".into()));
        assert_eq!(
            parse_head("ref: refs/heads/feature/login"),
            Some("feature/login".into())
        );
        assert_eq!(
            parse_head("3f786850e387550fdab836ed7e6dc881de23001b"),
            Some("3f78685".into())
        );
        assert_eq!(parse_head(""), None);
    }

    #[test]
    fn test_identity_labels() {
        let identity = WorkspaceIdentity::new(
            vec!["Alpha".into(), "Beta".into()],
            vec!["beta/dev".into(), "alpha/main".into()],
        );
        assert_eq!(identity.workspace_label(), "Alpha; Beta");
        assert_eq!(
            identity.repository_labels(),
            Some(vec!["alpha/main".into(), "beta/dev".into()])
        );
        assert_eq!(identity.primary_workspace(), Some("Alpha"));

        let empty = WorkspaceIdentity::default();
        assert_eq!(empty.workspace_label(), "--");
        assert_eq!(empty.repository_labels(), None);
    }

    #[test]
    fn test_repository_order_does_not_matter() {
        let a = WorkspaceIdentity::new(vec!["w".into()], vec!["a/x".into(), "b/y".into()]);
        let b = WorkspaceIdentity::new(vec!["w".into()], vec!["b/y".into(), "a/x".into()]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_fs_probe_reads_branches() -> Result<()> {
        let dir = tempdir()?;
        let repo = dir.path().join("alpha");
        fs::create_dir_all(repo.join(".git"))?;
        fs::write(repo.join(".git/HEAD"), "ref: refs/heads/main\n")?;
        let plain = dir.path().join("notes");
        fs::create_dir_all(&plain)?;

        let workspaces = vec![repo.clone(), plain.clone()];
        let identity = FsWorkspaceProbe.identity(&workspaces, true)?;
        assert_eq!(identity.workspace_label(), "alpha; notes");
        assert_eq!(identity.repository_labels(), Some(vec!["alpha/main".into()]));

        let untracked = FsWorkspaceProbe.identity(&workspaces, false)?;
        assert_eq!(untracked.repository_labels(), None);
        Ok(())
    }

    #[test]
    fn test_fs_probe_follows_worktree_link() -> Result<()> {
        let dir = tempdir()?;
        let real_git = dir.path().join("real-git");
        fs::create_dir_all(&real_git)?;
        fs::write(real_git.join("HEAD"), "ref: refs/heads/hotfix\n")?;
        let worktree = dir.path().join("worktree");
        fs::create_dir_all(&worktree)?;
        fs::write(worktree.join(".git"), format!("gitdir: {}\n", real_git.display()))?;

        let identity = FsWorkspaceProbe.identity(&[worktree], true)?;
        assert_eq!(
            identity.repository_labels(),
            Some(vec!["worktree/hotfix".into()])
        );
        Ok(())
    }
}
