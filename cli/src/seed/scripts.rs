//! Idempotent bash snippets that anchor HOME and seed Codex credentials.
//!
//! Snippets are built from structured data and transported as strings into
//! `bash -lc` inside agent containers; they are never executed on the host.
//! Multiple agents may run them concurrently against shared volumes, so
//! every mutation stays under the container-unique `$target` directory.

/// How to anchor HOME for a container and whether to seed Codex afterwards.
#[derive(Debug, Clone)]
pub struct AnchorConfig {
    /// Anchor symlink path exposed to tooling, e.g. `/workspace/.devhome`.
    pub anchor: String,
    /// Directory holding per-container homes, e.g. `/workspace/.devhomes`.
    pub base: String,
    /// Whether Codex credentials should be copied after relinking.
    pub seed_codex: bool,
}

/// Wrap `s` in POSIX-safe single quotes (`'` escapes as `'\''`).
#[must_use]
pub fn sh_single_quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    format!("'{}'", s.replace('\'', r#"'"'"'"#))
}

/// The anchor snippet: resolve the container-unique home, create its
/// skeleton, and atomically re-point the anchor symlink.
#[must_use]
pub fn anchor_script(cfg: &AnchorConfig) -> String {
    format!(
        "cid=$(hostname); target=\"{base}\"/\"$cid\"; \
         mkdir -p \"$target/.ssh\" \"$target/.codex/rollouts\" \"$target/.cache\" \
         \"$target/.config\" \"$target/.local\" \"$target/.sbt\"; \
         chmod 700 \"$target/.ssh\"; ln -sfn \"$target\" \"{anchor}\"",
        base = cfg.base,
        anchor = cfg.anchor,
    )
}

/// Link the container user's `.ssh`/`.gitconfig` at the anchor when
/// `/home/dev` exists and is writable.
#[must_use]
pub fn link_user_home_script(anchor: &str) -> String {
    format!(
        "if [ -d /home/dev ] && [ -w /home/dev ]; then \
         if [ -e /home/dev/.ssh ] && [ ! -L /home/dev/.ssh ]; then rm -rf /home/dev/.ssh; fi; \
         ln -sfn \"{anchor}/.ssh\" /home/dev/.ssh; \
         if [ -e /home/dev/.gitconfig ] && [ ! -L /home/dev/.gitconfig ]; then rm -f /home/dev/.gitconfig; fi; \
         ln -sfn \"{anchor}/.gitconfig\" /home/dev/.gitconfig; fi"
    )
}

/// Mirror build caches and record the docker endpoint for testcontainers.
#[must_use]
pub fn toolchain_dirs_script(anchor: &str) -> String {
    format!(
        "mkdir -p \"{anchor}/.ivy2\" \"{anchor}/.sbt\"; \
         if [ -n \"${{DOCKER_HOST:-}}\" ]; then \
         printf 'docker.host=%s\\n' \"$DOCKER_HOST\" > \"{anchor}/.testcontainers.properties\"; fi"
    )
}

/// Wait (up to ~10s) for host-mounted credential sources to appear.
#[must_use]
pub fn wait_for_host_mounts_script() -> String {
    "for i in $(seq 1 20); do { [ -d /var/host-codex ] || [ -f /var/auth.json ]; } \
     && break || sleep 0.5; done"
        .to_string()
}

/// Reset `$HOME/.codex` and ensure auxiliary dirs exist.
#[must_use]
pub fn reset_and_create_dirs_script(home: &str) -> String {
    format!(
        "rm -rf '{home}/.codex' && mkdir -p '{home}/.codex' '{home}/.codex/rollouts' \
         '{home}/.cache' '{home}/.config' '{home}/.local'"
    )
}

/// Clone the entire `/var/host-codex` into `$HOME/.codex` when present.
#[must_use]
pub fn clone_host_codex_script(home: &str) -> String {
    format!("if [ -d /var/host-codex ]; then cp -a /var/host-codex/. '{home}/.codex/'; fi")
}

/// Copy `/var/auth.json` into `$HOME/.codex/auth.json` when still missing.
#[must_use]
pub fn fallback_copy_auth_script(home: &str) -> String {
    format!(
        "if [ ! -f '{home}/.codex/auth.json' ] && [ -r /var/auth.json ]; then \
         cp -f /var/auth.json '{home}/.codex/auth.json'; fi"
    )
}

#[must_use]
pub fn tighten_perms_script(home: &str) -> String {
    format!("if [ -f '{home}/.codex/auth.json' ]; then chmod 600 '{home}/.codex/auth.json'; fi")
}

/// The full Codex refresh sequence for one agent home.
#[must_use]
pub fn build_seed_scripts(home: &str) -> Vec<String> {
    vec![
        wait_for_host_mounts_script(),
        reset_and_create_dirs_script(home),
        clone_host_codex_script(home),
        fallback_copy_auth_script(home),
        tighten_perms_script(home),
    ]
}

/// One-shot Codex seed, guarded by the `.seeded` marker so repeat windows
/// for the same container do not re-copy credentials.
#[must_use]
pub fn seed_codex_once_script(home: &str) -> String {
    format!(
        "if [ ! -f '{home}/.codex/.seeded' ]; then {}; touch '{home}/.codex/.seeded'; fi",
        join_scripts(&build_seed_scripts(home))
    )
}

/// Reset plan for credential-pool seeding: wipe the codex dir, copy the
/// slot contents, tighten permissions.
#[must_use]
pub fn pool_seed_scripts(slot_path: &str, home: &str) -> Vec<String> {
    vec![
        reset_and_create_dirs_script(home),
        format!("cp -a '{slot_path}/.' '{home}/.codex/'"),
        tighten_perms_script(home),
    ]
}

/// Bash snippets that (1) ensure the anchor symlink points at the
/// container-unique directory and (2) optionally seed Codex beneath it.
#[must_use]
pub fn build_anchor_scripts(cfg: &AnchorConfig) -> Vec<String> {
    let anchor = cfg.anchor.trim();
    let base = cfg.base.trim();
    if anchor.is_empty() || base.is_empty() {
        return Vec::new();
    }
    let mut steps = vec![
        anchor_script(cfg),
        link_user_home_script(anchor),
        toolchain_dirs_script(anchor),
    ];
    if cfg.seed_codex {
        steps.push(seed_codex_once_script(anchor));
    }
    steps
}

/// Join snippets with `; `, dropping empties.
#[must_use]
pub fn join_scripts(scripts: &[String]) -> String {
    scripts
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Mark per-agent home directories as ignored inside a repo checkout.
#[must_use]
pub fn update_git_exclude_script(repo_path: &str, pattern: &str) -> String {
    format!(
        "if [ -d '{repo_path}/.git' ] || [ -f '{repo_path}/.git' ]; then \
         mkdir -p '{repo_path}/.git/info' 2>/dev/null || true; \
         grep -qxF '{pattern}' '{repo_path}/.git/info/exclude' 2>/dev/null || \
         echo '{pattern}' >> '{repo_path}/.git/info/exclude' 2>/dev/null || true; fi"
    )
}
