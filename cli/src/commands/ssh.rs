//! SSH provisioning and repo remote management inside agent containers.

use anyhow::Result;

use crate::application::seeding::AgentSeeder;
use crate::cli::{RepoArgs, SshSetupArgs};
use crate::commands::{allow, CmdContext};
use crate::domain::error::UsageError;
use crate::domain::paths::{agent_repo_path, anchor_base, anchor_home, MULTI_REPO_PROJECT};
use crate::infra::overlay_store;
use crate::seed::scripts::AnchorConfig;
use crate::seed::ssh::{build_github_config, build_write_steps, rsa_write_step};

/// Install host SSH keys, known_hosts, and a GitHub ssh config into agent N,
/// then configure and validate git over that transport.
pub async fn ssh_setup(ctx: &CmdContext, args: &SshSetupArgs) -> Result<()> {
    let project = ctx.require_project()?;

    let ssh_dir = dirs::home_dir().unwrap_or_default().join(".ssh");
    let mut host_key = args
        .key
        .clone()
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| ssh_dir.join("id_ed25519"));
    if !host_key.exists() {
        host_key = ssh_dir.join("id_rsa");
    }
    if !host_key.exists() {
        return Err(
            UsageError::Message(format!("Host key not found: {}", host_key.display())).into(),
        );
    }
    let pub_path = host_key.with_extension("pub");
    let pub_data = std::fs::read(&pub_path).unwrap_or_default();
    if pub_data.is_empty() {
        return Err(
            UsageError::Message(format!("Public key not found: {}", pub_path.display())).into(),
        );
    }

    // The SSH route must pass the egress allowlist before any git calls.
    let _ = allow::ensure_ssh_github(&ctx.paths);
    ctx.runner
        .compose(&ctx.files, &["restart", "tinyproxy", "dns"])
        .await?;

    let repo_name = default_repo(ctx, project);
    let anchor = anchor_home(project);
    let base = anchor_base(project);
    let service = ctx.resolve_service();
    let seeder = AgentSeeder::new(&ctx.runner);
    seeder
        .run_anchor_plan(
            &ctx.files,
            &service,
            &args.index,
            &AnchorConfig {
                anchor: anchor.to_string(),
                base: base.to_string(),
                seed_codex: true,
            },
        )
        .await?;

    let key_bytes = std::fs::read(&host_key).unwrap_or_default();
    let ed_bytes = std::fs::read(ssh_dir.join("id_ed25519")).unwrap_or_default();
    let rsa_bytes = std::fs::read(ssh_dir.join("id_rsa")).unwrap_or_default();
    let known_bytes = std::fs::read(ssh_dir.join("known_hosts")).unwrap_or_default();

    let has_ed = !ed_bytes.is_empty()
        || (host_key.ends_with("id_ed25519") && !key_bytes.is_empty());
    let has_rsa = !rsa_bytes.is_empty() || (host_key.ends_with("id_rsa") && !key_bytes.is_empty());
    let ed_bytes = if has_ed && ed_bytes.is_empty() {
        key_bytes.clone()
    } else {
        ed_bytes
    };
    let rsa_bytes = if has_rsa && rsa_bytes.is_empty() {
        key_bytes
    } else {
        rsa_bytes
    };

    let config = build_github_config(anchor, has_ed, has_rsa);
    for step in build_write_steps(anchor, &ed_bytes, &pub_data, &known_bytes, &config) {
        seeder
            .exec_script_input(&ctx.files, &service, &args.index, &step.content, &step.script)
            .await?;
    }
    if has_rsa {
        let step = rsa_write_step(anchor, &rsa_bytes);
        seeder
            .exec_script_input(&ctx.files, &service, &args.index, &step.content, &step.script)
            .await?;
    }

    let repo_path = agent_repo_path(project, &args.index, &repo_name);
    seeder
        .configure_git(&ctx.files, &service, &args.index, anchor, &repo_path)
        .await
}

pub async fn ssh_test(ctx: &CmdContext, index: &str) -> Result<()> {
    let project = ctx.require_project()?;
    let anchor = anchor_home(project);
    let script = format!(
        "set -e; export HOME=\"{anchor}\"; cfg=\"$HOME/.ssh/config\"; \
         ssh -F \"$cfg\" -T github.com -o BatchMode=yes || true"
    );
    let service = ctx.resolve_service();
    AgentSeeder::new(&ctx.runner)
        .exec_script(&ctx.files, &service, index, &script)
        .await
}

pub async fn repo_config_ssh(ctx: &CmdContext, args: &RepoArgs) -> Result<()> {
    let project = ctx.require_project()?;
    let dest = repo_dest(project, &args.repo);
    let home = format!("/workspace/.devhome-agent{}", args.index);
    let cmd = format!(
        "set -euo pipefail; export HOME='{home}'; cd '{dest}'; \
         url=$(git remote get-url origin 2>/dev/null || true); \
         if [ -z \"$url\" ]; then echo 'No origin remote configured' >&2; exit 1; fi; \
         if [[ \"$url\" =~ ^https://github.com/([^/]+)/([^/.]+)(\\.git)?$ ]]; then \
         newurl=git@github.com:${{BASH_REMATCH[1]}}/${{BASH_REMATCH[2]}}.git; \
         echo Setting SSH origin to \"$newurl\"; git remote set-url origin \"$newurl\"; \
         else echo \"Origin already SSH: $url\"; fi"
    );
    let service = ctx.resolve_service();
    AgentSeeder::new(&ctx.runner)
        .exec_script(&ctx.files, &service, &args.index, &cmd)
        .await
}

pub async fn repo_config_https(ctx: &CmdContext, args: &RepoArgs) -> Result<()> {
    let project = ctx.require_project()?;
    let dest = repo_dest(project, &args.repo);
    let cmd = format!(
        "set -euo pipefail; cd '{dest}'; \
         url=$(git remote get-url origin 2>/dev/null || true); \
         if [ -z \"$url\" ]; then echo 'No origin remote configured' >&2; exit 1; fi; \
         if [[ \"$url\" =~ ^git@github.com:([^/]+)/([^/.]+)(\\.git)?$ ]]; then \
         newurl=https://github.com/${{BASH_REMATCH[1]}}/${{BASH_REMATCH[2]}}.git; \
         echo Setting HTTPS origin to \"$newurl\"; git remote set-url origin \"$newurl\"; \
         else echo \"Origin already HTTPS: $url\"; fi"
    );
    let service = ctx.resolve_service();
    AgentSeeder::new(&ctx.runner)
        .exec_script(&ctx.files, &service, &args.index, &cmd)
        .await
}

pub async fn repo_push_ssh(ctx: &CmdContext, args: &RepoArgs) -> Result<()> {
    let project = ctx.require_project()?;
    let dest = repo_dest(project, &args.repo);
    let home = format!("/workspace/.devhome-agent{}", args.index);
    let cmd = format!(
        "set -euo pipefail; home=\"{home}\"; export HOME=\"$home\"; cd '{dest}'; \
         cur=$(git rev-parse --abbrev-ref HEAD); \
         url=$(git remote get-url origin 2>/dev/null || true); \
         if [ -z \"$url\" ]; then echo 'No origin remote configured' >&2; exit 1; fi; \
         if [[ \"$url\" =~ ^https://github.com/([^/]+)/([^/.]+)(\\.git)?$ ]]; then \
         newurl=git@github.com:${{BASH_REMATCH[1]}}/${{BASH_REMATCH[2]}}.git; \
         echo Setting SSH origin to \"$newurl\"; git remote set-url origin \"$newurl\"; fi; \
         echo Pushing branch \"$cur\" to origin...; \
         GIT_SSH_COMMAND=\"ssh -F \\\"$home/.ssh/config\\\"\" git push -u origin HEAD"
    );
    let service = ctx.resolve_service();
    AgentSeeder::new(&ctx.runner)
        .exec_script(&ctx.files, &service, &args.index, &cmd)
        .await
}

pub async fn repo_push_https(ctx: &CmdContext, args: &RepoArgs) -> Result<()> {
    let project = ctx.require_project()?;
    let dest = repo_dest(project, &args.repo);
    let cmd = format!(
        "set -euo pipefail; cd '{dest}'; \
         echo Pushing branch $(git rev-parse --abbrev-ref HEAD) to origin...; \
         git push -u origin HEAD"
    );
    let service = ctx.resolve_service();
    ctx.runner
        .compose(
            &ctx.files,
            &["exec", "--index", &args.index, &service, "bash", "-lc", &cmd],
        )
        .await
}

fn repo_dest(project: &str, repo: &str) -> String {
    let base = if project == MULTI_REPO_PROJECT {
        "/workspaces/dev"
    } else {
        "/workspace"
    };
    if repo.is_empty() || repo == "." {
        base.to_string()
    } else {
        format!("{base}/{repo}")
    }
}

fn default_repo(ctx: &CmdContext, project: &str) -> String {
    if project == MULTI_REPO_PROJECT {
        if let Ok((cfg, _)) = overlay_store::read_overlay(&ctx.paths.overlay_paths, project) {
            if !cfg.defaults.repo.trim().is_empty() {
                return cfg.defaults.repo.trim().to_string();
            }
        }
    }
    String::new()
}
