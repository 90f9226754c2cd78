//! Host-side git worktree management for multi-agent checkouts.
//!
//! Agent 1 owns the primary checkout; agents 2..n get secondary worktrees on
//! per-agent branches. Everything is idempotent: stale worktree metadata is
//! repaired, dirty trees are preserved with a warning.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::domain::overlay::normalize;
use crate::domain::paths::AGENT_WORKTREES_DIR;
use crate::infra::runner::Runner;

pub struct WorktreeManager<'a> {
    runner: &'a Runner,
}

impl<'a> WorktreeManager<'a> {
    #[must_use]
    pub fn new(runner: &'a Runner) -> Self {
        Self { runner }
    }

    /// Ensure worktrees and branches exist for agents 1..n.
    ///
    /// `devkit_root` is the kit root; the dev root (holding the repos) is its
    /// parent. Branches are `<prefix><i>` tracking `origin/<base_branch>`.
    pub async fn setup(
        &self,
        devkit_root: &Path,
        repo: &str,
        n: u32,
        base_branch: &str,
        branch_prefix: &str,
    ) -> Result<()> {
        let dev_root = normalize(&devkit_root.join(".."));
        let repo_path = dev_root.join(repo);
        let repo_str = repo_path.display().to_string();
        let dry = self.runner.dry_run();

        let repo_worktrees_dir = if dry {
            None
        } else {
            self.repo_worktrees_dir(&repo_path).await
        };

        self.git(&["-C", &repo_str, "fetch", "--all", "--prune"]).await?;
        self.git(&["-C", &repo_str, "config", "push.default", "upstream"])
            .await?;
        self.git(&["-C", &repo_str, "config", "worktree.useRelativePaths", "true"])
            .await?;

        // Agent 1 stays on the primary path; only a clean tree gets its
        // branch moved.
        let b1 = format!("{branch_prefix}1");
        let origin_base = format!("origin/{base_branch}");
        let upstream_flag = format!("--set-upstream-to={origin_base}");
        if dry || !self.is_dirty(&repo_str).await? {
            self.git(&["-C", &repo_str, "checkout", "-B", &b1, &origin_base])
                .await?;
            self.git(&["-C", &repo_str, "branch", &upstream_flag, &b1])
                .await?;
        } else {
            warn_dirty(&repo_str);
        }

        let worktrees_root = dev_root.join(AGENT_WORKTREES_DIR);
        if !dry {
            let _ = std::fs::create_dir_all(&worktrees_root);
        }

        for i in 2..=n {
            let bi = format!("{branch_prefix}{i}");
            let parent = worktrees_root.join(&bi);
            if !dry {
                let _ = std::fs::create_dir_all(&parent);
            }
            let wt = parent.join(repo);
            let wt_str = wt.display().to_string();

            if !dry {
                clean_worktree_path(repo_worktrees_dir.as_deref(), &wt)?;
                if wt.exists() {
                    if self.is_dirty(&wt_str).await? {
                        warn_dirty(&wt_str);
                        continue;
                    }
                }
            }

            // Best effort: drop stale references before re-adding.
            let _ = self.git(&["-C", &repo_str, "worktree", "prune"]).await;
            let _ = self
                .git(&["-C", &repo_str, "worktree", "remove", "-f", &wt_str])
                .await;

            let add_args = [
                "-C",
                repo_str.as_str(),
                "worktree",
                "add",
                wt_str.as_str(),
                "-B",
                bi.as_str(),
                origin_base.as_str(),
            ];
            if let Err(e) = self.git(&add_args).await {
                if dry {
                    return Err(e);
                }
                // A half-created directory blocks the add; clear and retry once.
                std::fs::remove_dir_all(&wt)
                    .or_else(ignore_not_found)
                    .with_context(|| format!("remove stale worktree {wt_str}"))?;
                self.git(&add_args).await?;
            }

            if !dry {
                self.rewrite_gitdir(&wt).await;
            }
            self.git(&["-C", &wt_str, "branch", &upstream_flag, &bi]).await?;
        }
        Ok(())
    }

    /// Run git with the container SSH settings scrubbed: host git must not
    /// inherit `GIT_SSH_COMMAND`, and `core.sshCommand` is forced to plain
    /// ssh.
    async fn git(&self, args: &[&str]) -> Result<()> {
        let mut full = vec!["-u", "GIT_SSH_COMMAND", "git", "-c", "core.sshCommand=ssh"];
        full.extend_from_slice(args);
        self.runner.host("env", &full).await
    }

    async fn git_capture(&self, args: &[&str]) -> Result<String> {
        let mut full = vec!["-u", "GIT_SSH_COMMAND", "git", "-c", "core.sshCommand=ssh"];
        full.extend_from_slice(args);
        let out = self.runner.capture("env", &full).await?;
        if !out.status.success() {
            anyhow::bail!(
                "git {:?}: exit {}",
                args,
                out.status.code().unwrap_or(1)
            );
        }
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }

    async fn is_dirty(&self, path: &str) -> Result<bool> {
        let out = self
            .git_capture(&["-C", path, "status", "--porcelain"])
            .await
            .with_context(|| format!("git status --porcelain {path}"))?;
        Ok(!out.trim().is_empty())
    }

    /// Resolved `<gitdir>/worktrees` directory of the primary repo; used to
    /// tell our worktrees apart from foreign ones.
    async fn repo_worktrees_dir(&self, repo_path: &Path) -> Option<PathBuf> {
        let repo_str = repo_path.display().to_string();
        let out = self
            .git_capture(&["-C", &repo_str, "rev-parse", "--git-dir"])
            .await
            .ok()?;
        let gitdir = out.trim();
        if gitdir.is_empty() {
            return None;
        }
        let gitdir = if Path::new(gitdir).is_absolute() {
            PathBuf::from(gitdir)
        } else {
            normalize(&repo_path.join(gitdir))
        };
        let gitdir = gitdir.canonicalize().unwrap_or(gitdir);
        let worktrees = gitdir.join("worktrees");
        Some(worktrees.canonicalize().unwrap_or_else(|_| normalize(&worktrees)))
    }

    /// Point the worktree's `.git` file at a relative gitdir so the same
    /// on-disk layout resolves from container mounts where the host absolute
    /// path differs.
    async fn rewrite_gitdir(&self, wt: &Path) {
        let wt_str = wt.display().to_string();
        let Ok(out) = self
            .git_capture(&["-C", &wt_str, "rev-parse", "--git-dir"])
            .await
        else {
            return;
        };
        let gitdir = out.trim();
        if gitdir.is_empty() {
            return;
        }
        if let Some(rel) = relative_path(wt, Path::new(gitdir)) {
            let _ = std::fs::write(wt.join(".git"), format!("gitdir: {}\n", rel.display()));
        }
    }
}

/// Remove the target directory when it is clearly stale: missing `.git`
/// metadata, pointing at a different repository, or referencing a gitdir
/// that no longer exists. A directory that still looks like a valid worktree
/// of the given repo is kept.
pub fn clean_worktree_path(repo_worktrees_dir: Option<&Path>, wt: &Path) -> Result<()> {
    let meta = match std::fs::symlink_metadata(wt) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e).with_context(|| format!("stat {}", wt.display())),
    };
    if !meta.is_dir() {
        return remove_all(wt);
    }
    let git_file = wt.join(".git");
    let data = match std::fs::read_to_string(&git_file) {
        Ok(d) => d,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return remove_all(wt),
        Err(e) => return Err(e).with_context(|| format!("reading {}", git_file.display())),
    };
    let content = data.trim();
    let Some(gitdir) = content.strip_prefix("gitdir:") else {
        return remove_all(wt);
    };
    let gitdir = gitdir.trim();
    if gitdir.is_empty() {
        return remove_all(wt);
    }
    let gitdir_path = if Path::new(gitdir).is_absolute() {
        PathBuf::from(gitdir)
    } else {
        normalize(&wt.join(gitdir))
    };
    let resolved = match gitdir_path.canonicalize() {
        Ok(r) => r,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return remove_all(wt),
        Err(e) => return Err(e).with_context(|| format!("resolving {}", gitdir_path.display())),
    };
    if let Some(owned) = repo_worktrees_dir {
        if !resolved.starts_with(owned) {
            return remove_all(wt);
        }
    }
    Ok(())
}

fn remove_all(path: &Path) -> Result<()> {
    std::fs::remove_dir_all(path)
        .or_else(|e| {
            if e.kind() == std::io::ErrorKind::NotADirectory {
                std::fs::remove_file(path)
            } else {
                Err(e)
            }
        })
        .or_else(ignore_not_found)
        .with_context(|| format!("removing {}", path.display()))
}

fn ignore_not_found(e: std::io::Error) -> std::io::Result<()> {
    if e.kind() == std::io::ErrorKind::NotFound {
        Ok(())
    } else {
        Err(e)
    }
}

fn warn_dirty(path: &str) {
    eprintln!("[worktrees] warning: uncommitted changes in {path}; leaving worktree intact");
}

/// Relative path from `base` to `target`, both lexically normalized.
fn relative_path(base: &Path, target: &Path) -> Option<PathBuf> {
    let base = normalize(base);
    let target = normalize(target);
    if !target.is_absolute() {
        // Already relative to the worktree.
        return Some(target);
    }
    let base_comps: Vec<_> = base.components().collect();
    let target_comps: Vec<_> = target.components().collect();
    let common = base_comps
        .iter()
        .zip(target_comps.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let mut out = PathBuf::new();
    for _ in common..base_comps.len() {
        out.push("..");
    }
    for comp in &target_comps[common..] {
        out.push(comp);
    }
    Some(out)
}
