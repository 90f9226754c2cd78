//! Command handlers. Each handler is thin: argument checks, then calls into
//! `application`/`infra`.

pub mod allow;
pub mod bootstrap;
pub mod compose;
pub mod doctor;
pub mod exec;
pub mod hooks;
pub mod hosts;
pub mod layout;
pub mod network;
pub mod preflight;
pub mod ssh;
pub mod tmux;
pub mod verify;
pub mod worktrees;

use std::path::PathBuf;

use anyhow::Result;

use crate::domain::error::UsageError;
use crate::domain::paths::DEFAULT_SERVICE;
use crate::infra::compose::KitPaths;
use crate::infra::overlay_store;
use crate::infra::runner::Runner;
use crate::seed::agent::SeedTracker;
use crate::seed::pool::PoolConfig;

/// Pre-parsed data and handles shared by all command handlers.
pub struct CmdContext {
    pub runner: Runner,
    pub paths: KitPaths,
    pub project: String,
    pub profile: String,
    /// Compose `-f` args resolved for the current project + profile.
    pub files: Vec<String>,
    pub no_seed: bool,
    pub reseed: bool,
    pub pool: PoolConfig,
    pub exe: PathBuf,
    pub tracker: SeedTracker,
}

impl CmdContext {
    /// The overlay project, or a usage error when `-p` was omitted.
    pub fn require_project(&self) -> Result<&str> {
        let p = self.project.trim();
        if p.is_empty() {
            return Err(UsageError::MissingProject.into());
        }
        Ok(p)
    }

    /// The overlay's declared agent service, defaulting to `dev-agent`.
    pub fn resolve_service(&self) -> String {
        if self.project.trim().is_empty() {
            return DEFAULT_SERVICE.to_string();
        }
        match overlay_store::read_overlay(&self.paths.overlay_paths, self.project.trim()) {
            Ok((cfg, _)) if !cfg.service.trim().is_empty() => cfg.service.trim().to_string(),
            _ => DEFAULT_SERVICE.to_string(),
        }
    }
}

/// Parse a positive count argument.
pub fn parse_count(s: &str) -> Result<u32> {
    match s.trim().parse::<u32>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(UsageError::InvalidCount.into()),
    }
}
