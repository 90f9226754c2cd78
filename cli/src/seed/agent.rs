//! Builds the `bash -lc` command string that opens a shell in an agent
//! container: anchors HOME, optionally seeds Codex, sets git identity, and
//! `cd`s into the working directory.

use std::collections::HashSet;
use std::sync::Mutex;

use anyhow::Result;

use crate::domain::error::ConfigError;
use crate::domain::identity::GitIdentity;
use crate::domain::paths::{anchor_base, anchor_home, DEFAULT_SERVICE};
use crate::infra::compose::compose_project_name;
use crate::infra::runner::Runner;
use crate::seed::scripts::{build_anchor_scripts, join_scripts, sh_single_quote, AnchorConfig};

// ── Seed tracker ─────────────────────────────────────────────────────────────

/// Tracks which containers have already been seeded during this invocation,
/// so repeat windows for the same container skip the Codex copy.
#[derive(Default)]
pub struct SeedTracker {
    seen: Mutex<HashSet<String>>,
}

impl SeedTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true exactly once per non-empty container name.
    pub fn should_seed(&self, container_name: &str) -> bool {
        let name = container_name.trim();
        if name.is_empty() {
            return true;
        }
        let mut seen = self.seen.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        seen.insert(name.to_string())
    }
}

// ── Git identity discovery ───────────────────────────────────────────────────

/// Layered lookup: devkit env overrides, then generic git envs, then the
/// host's global git config.
pub async fn discover_git_identity(runner: &Runner) -> Option<GitIdentity> {
    let devkit_name = std::env::var("DEVKIT_GIT_USER_NAME").ok();
    let devkit_email = std::env::var("DEVKIT_GIT_USER_EMAIL").ok();
    let author_name = std::env::var("GIT_AUTHOR_NAME").ok();
    let author_email = std::env::var("GIT_AUTHOR_EMAIL").ok();
    let committer_name = std::env::var("GIT_COMMITTER_NAME").ok();
    let committer_email = std::env::var("GIT_COMMITTER_EMAIL").ok();

    if let Some(id) = GitIdentity::from_sources(
        [
            devkit_name.as_deref(),
            author_name.as_deref(),
            committer_name.as_deref(),
        ],
        [
            devkit_email.as_deref(),
            author_email.as_deref(),
            committer_email.as_deref(),
        ],
    ) {
        return Some(id);
    }

    let host_name = runner
        .capture_ok("git", &["config", "--global", "user.name"])
        .await;
    let host_email = runner
        .capture_ok("git", &["config", "--global", "user.email"])
        .await;
    GitIdentity::from_sources(
        [
            devkit_name.as_deref(),
            author_name.as_deref(),
            committer_name.as_deref(),
            Some(host_name.as_str()),
        ],
        [
            devkit_email.as_deref(),
            author_email.as_deref(),
            committer_email.as_deref(),
            Some(host_email.as_str()),
        ],
    )
}

// ── Command builder ──────────────────────────────────────────────────────────

/// Inputs for building one agent window command.
#[derive(Debug, Clone, Default)]
pub struct CommandOpts {
    /// Compose `-f` args for the shell-side fallback lookup.
    pub files: Vec<String>,
    pub project: String,
    /// 1-based agent index as a string; empty means 1.
    pub index: String,
    /// Target directory to `cd` into.
    pub dest: String,
    pub service: String,
    pub compose_project: String,
    /// Concrete container name when resolved at build time; empty triggers
    /// the in-shell poll loop.
    pub container_name: String,
    pub git_identity: Option<GitIdentity>,
    pub seed_codex: bool,
}

/// Build the `docker exec` invocation that anchors HOME, optionally seeds
/// Codex, sets git identity, and opens an interactive bash shell at `dest`.
///
/// # Errors
///
/// Fails when no git identity was discovered — callers must surface this as
/// a fatal configuration error.
pub fn build_command(opts: &CommandOpts) -> Result<String> {
    let Some(identity) = &opts.git_identity else {
        return Err(ConfigError::MissingGitIdentity.into());
    };

    let project = opts.project.trim();
    let service = if opts.service.trim().is_empty() {
        DEFAULT_SERVICE
    } else {
        opts.service.trim()
    };
    let idx = match opts.index.trim().parse::<usize>() {
        Ok(n) if n >= 1 => n.to_string(),
        _ => "1".to_string(),
    };
    let compose_project = if opts.compose_project.trim().is_empty() {
        compose_project_name(project)
    } else {
        opts.compose_project.trim().to_string()
    };

    let anchor = anchor_home(project);
    let base = anchor_base(project);
    let scripts = build_anchor_scripts(&AnchorConfig {
        anchor: anchor.to_string(),
        base: base.to_string(),
        seed_codex: opts.seed_codex,
    });

    let mut shell = String::from("set -e; ");
    let joined = join_scripts(&scripts);
    if !joined.is_empty() {
        shell.push_str(&joined);
        shell.push_str("; ");
    }
    shell.push_str(&format!(
        "export HOME=\"{anchor}\" CODEX_HOME=\"{anchor}/.codex\" \
         CODEX_ROLLOUT_DIR=\"{anchor}/.codex/rollouts\" XDG_CACHE_HOME=\"{anchor}/.cache\" \
         XDG_CONFIG_HOME=\"{anchor}/.config\" SBT_GLOBAL_BASE=\"{anchor}/.sbt\"; "
    ));
    shell.push_str(&format!(
        "git config --global user.name {} && git config --global user.email {}; ",
        sh_single_quote(&identity.name),
        sh_single_quote(&identity.email)
    ));
    shell.push_str(&format!(
        "cd \"{}\" 2>/dev/null || true; exec bash",
        opts.dest
    ));

    let script = sh_single_quote(&shell);
    let container_name = opts.container_name.trim();
    if !container_name.is_empty() {
        return Ok(format!(
            "docker exec -it {} bash -lc {script}",
            sh_single_quote(container_name)
        ));
    }

    let lookup = build_lookup_loop(&opts.files, service, &idx, &compose_project);
    let msg = if compose_project.is_empty() {
        format!("No container for service {service} yet.")
    } else {
        format!("No container for {compose_project}/{service} yet.")
    };
    Ok(format!(
        "{lookup}if [ -z \"$name\" ]; then echo {}; exec bash; fi; \
         docker exec -it \"$name\" bash -lc {script}",
        sh_single_quote(&msg)
    ))
}

/// A shell-side poll (≤60 s) that picks the Nth container by compose
/// project+service labels, falling back to service-label-only and to the
/// first container.
fn build_lookup_loop(files: &[String], service: &str, idx: &str, compose_project: &str) -> String {
    let mut clauses: Vec<String> = Vec::with_capacity(6);
    let cp = compose_project.trim();
    if !cp.is_empty() {
        clauses.push(format!(
            "name=$(docker ps --filter label=com.docker.compose.project={} --filter label=com.docker.compose.service={} --format '{{{{.Names}}}}' | sed -n '{idx}p')",
            sh_single_quote(cp),
            sh_single_quote(service),
        ));
        clauses.push(format!(
            "name=$(docker ps --filter label=com.docker.compose.project={} --filter label=com.docker.compose.service={} --format '{{{{.Names}}}}' | sed -n '1p')",
            sh_single_quote(cp),
            sh_single_quote(service),
        ));
    }
    if !files.is_empty() {
        let file_str = files.join(" ");
        clauses.push(format!(
            "name=$(docker compose {file_str} ps --format '{{{{.Name}}}}' {} | sed -n '{idx}p')",
            sh_single_quote(service),
        ));
        clauses.push(format!(
            "name=$(docker compose {file_str} ps --format '{{{{.Name}}}}' {} | sed -n '1p')",
            sh_single_quote(service),
        ));
    }
    clauses.push(format!(
        "name=$(docker ps --filter label=com.docker.compose.service={} --format '{{{{.Names}}}}' | sed -n '{idx}p')",
        sh_single_quote(service),
    ));
    clauses.push(format!(
        "name=$(docker ps --filter label=com.docker.compose.service={} --format '{{{{.Names}}}}' | sed -n '1p')",
        sh_single_quote(service),
    ));

    let mut loop_str = String::from("name=''; for i in $(seq 1 120); do ");
    for clause in &clauses {
        loop_str.push_str(clause);
        loop_str.push_str("; if [ -n \"$name\" ]; then break; fi; ");
    }
    loop_str.push_str("sleep 0.5; done; ");
    loop_str
}
