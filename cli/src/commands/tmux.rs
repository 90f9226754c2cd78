//! tmux-facing commands: shells, open/fresh-open, window sync, and the
//! windows-only layout apply.

use anyhow::{bail, Result};

use crate::application::layout_engine::read_layout;
use crate::application::seeding::AgentSeeder;
use crate::cli::{TmuxAddCdArgs, TmuxApplyLayoutArgs, TmuxSyncArgs};
use crate::commands::{parse_count, CmdContext};
use crate::domain::error::ConfigError;
use crate::domain::paths::{agent_home_path, agent_repo_path, clean_window_path, DEFAULT_SERVICE};
use crate::infra::compose;
use crate::infra::containers::ContainerResolver;
use crate::infra::tmux::{self, TmuxManager};
use crate::seed::agent::{build_command, discover_git_identity, CommandOpts};
use crate::seed::pool::{self, CredMode};
use crate::seed::scripts;

/// Build the window command for one agent, polling for the container in the
/// shell so windows appear even while the service is still starting.
pub async fn build_window_cmd(
    ctx: &CmdContext,
    files: &[String],
    project: &str,
    idx: &str,
    dest: &str,
    service: &str,
    compose_project: &str,
) -> Result<String> {
    let identity = discover_git_identity(&ctx.runner)
        .await
        .ok_or(ConfigError::MissingGitIdentity)?;
    let compose_project = if compose_project.trim().is_empty() {
        compose::compose_project_name(project)
    } else {
        compose_project.trim().to_string()
    };
    let seed_key = format!("{compose_project}/{service}/{idx}");
    build_command(&CommandOpts {
        files: files.to_vec(),
        project: project.to_string(),
        index: idx.to_string(),
        dest: dest.to_string(),
        service: service.to_string(),
        compose_project,
        container_name: String::new(),
        git_identity: Some(identity),
        seed_codex: ctx.tracker.should_seed(&seed_key),
    })
}

/// Direct `docker exec` command for a known container and indexed home.
fn indexed_shell_cmd(name: &str, home: &str, dest: &str) -> String {
    format!(
        "docker exec -it {name} bash -lc 'mkdir -p \"{home}/.codex/rollouts\" \"{home}/.cache\" \
         \"{home}/.config\" \"{home}/.local\"; export HOME=\"{home}\"; \
         export CODEX_HOME=\"{home}/.codex\"; export CODEX_ROLLOUT_DIR=\"{home}/.codex/rollouts\"; \
         export XDG_CACHE_HOME=\"{home}/.cache\"; export XDG_CONFIG_HOME=\"{home}/.config\"; \
         cd \"{dest}\"; exec bash'"
    )
}

async fn up_scaled(ctx: &CmdContext, n: u32) -> Result<()> {
    let scale = format!("dev-agent={n}");
    ctx.runner
        .compose(&ctx.files, &["up", "-d", "--scale", &scale])
        .await
}

async fn open_session(ctx: &CmdContext, session: &str, n: u32, dest_for: impl Fn(u32) -> String) -> Result<()> {
    if tmux::skip_tmux() {
        return Ok(());
    }
    let resolver = ContainerResolver::new(&ctx.runner);
    let names = resolver.list_compose(&ctx.files, DEFAULT_SERVICE).await;
    if names.is_empty() && !ctx.runner.dry_run() {
        bail!("no dev-agent containers running");
    }
    let manager = TmuxManager::new(&ctx.runner);
    let project = ctx.project.trim();
    let first_name = names.first().map(String::as_str).unwrap_or("dev-agent-1");
    let home1 = agent_home_path(project, "1", "");
    let cmd = indexed_shell_cmd(first_name, &home1, &dest_for(1));
    manager.create_session(session, "agent-1", &cmd).await?;
    for i in 2..=n {
        if (i as usize) > names.len() && !ctx.runner.dry_run() {
            break;
        }
        let idx = i.to_string();
        let home = agent_home_path(project, &idx, "");
        let name = names
            .get((i - 1) as usize)
            .map(String::as_str)
            .unwrap_or(first_name);
        let cmd = indexed_shell_cmd(name, &home, &dest_for(i));
        manager.add_window(session, &format!("agent-{i}"), &cmd).await?;
    }
    manager.attach_session(session).await
}

pub async fn tmux_shells(ctx: &CmdContext, count: Option<&str>) -> Result<()> {
    ctx.require_project()?;
    let n = count.map_or(Ok(2), parse_count)?;
    up_scaled(ctx, n).await?;
    open_session(ctx, "devkit-shells", n, |_| "/workspace".to_string()).await
}

pub async fn open(ctx: &CmdContext, count: Option<&str>) -> Result<()> {
    ctx.require_project()?;
    let n = count.map_or(Ok(2), parse_count)?;
    up_scaled(ctx, n).await?;
    open_session(ctx, "devkit-open", n, |_| "/workspace".to_string()).await
}

/// Tear everything down, bring N agents up fresh, reseed credentials, and
/// open tmux windows. `reset` is an alias.
pub async fn fresh_open(ctx: &CmdContext, count: Option<&str>) -> Result<()> {
    let project = ctx.require_project()?;
    let n = count.map_or(Ok(3), parse_count)?;

    let mut all = compose::all_profiles_files(&ctx.paths, project);
    if ctx.pool.mode == CredMode::Pool {
        all.push("-f".to_string());
        all.push(ctx.paths.kit.join("compose.pool.yml").display().to_string());
    }

    ctx.runner.compose(&all, &["down"]).await?;
    if !tmux::skip_tmux() {
        let manager = TmuxManager::new(&ctx.runner);
        for session in ["devkit-open", "devkit-shells", "devkit-worktrees"] {
            manager.kill_session_best_effort(session).await;
        }
    }
    ctx.runner
        .host_best_effort(
            "docker",
            &["rm", "-f", "devkit_envoy", "devkit_envoy_sni", "devkit_dns", "devkit_tinyproxy"],
        )
        .await;
    ctx.runner
        .host_best_effort("docker", &["network", "rm", "devkit_dev-internal", "devkit_dev-egress"])
        .await;

    let scale = format!("dev-agent={n}");
    ctx.runner
        .compose(&all, &["up", "-d", "--scale", &scale])
        .await?;

    if !ctx.no_seed || ctx.reseed {
        seed_fresh_agents(ctx, &all, n).await?;
    }

    if tmux::skip_tmux() {
        return Ok(());
    }
    let manager = TmuxManager::new(&ctx.runner);
    let cmd = build_window_cmd(ctx, &all, project, "1", "/workspace", DEFAULT_SERVICE, "").await?;
    manager.create_session("devkit-open", "agent-1", &cmd).await?;
    for i in 2..=n {
        let idx = i.to_string();
        let cmd =
            build_window_cmd(ctx, &all, project, &idx, "/workspace", DEFAULT_SERVICE, "").await?;
        manager
            .add_window("devkit-open", &format!("agent-{i}"), &cmd)
            .await?;
    }
    manager.attach_session("devkit-open").await
}

/// Credential refresh for agents 1..n: pool slots when configured and
/// available, host-mounted sources otherwise.
async fn seed_fresh_agents(ctx: &CmdContext, files: &[String], n: u32) -> Result<()> {
    let seeder = AgentSeeder::new(&ctx.runner);
    let slots = if ctx.pool.mode == CredMode::Pool {
        pool::discover(&ctx.pool.dir)?
    } else {
        Vec::new()
    };
    for j in 1..=n {
        let idx = j.to_string();
        let home = agent_home_path(ctx.project.trim(), &idx, "");
        if slots.is_empty() {
            for script in scripts::build_seed_scripts(&home) {
                seeder
                    .exec_script(files, DEFAULT_SERVICE, &idx, &script)
                    .await?;
            }
        } else {
            let assigner = ctx.pool.assigner(slots.len());
            let slot = assigner.assign(&slots, j as usize);
            for script in scripts::pool_seed_scripts(&slot.path, &home) {
                seeder
                    .exec_script(files, DEFAULT_SERVICE, &idx, &script)
                    .await?;
            }
            println!("[seed] Agent {j} -> slot {}", slot.name);
        }
    }
    Ok(())
}

/// Ensure windows `<prefix>1..count` exist in the target session.
pub async fn sync_windows(
    ctx: &CmdContext,
    session: &str,
    name_prefix: &str,
    cd_path: &str,
    count: u32,
    service: &str,
) -> Result<()> {
    let project = ctx.project.trim();
    let session = if session.is_empty() {
        tmux::default_session_name(project)
    } else {
        session.to_string()
    };
    let manager = TmuxManager::new(&ctx.runner);
    let session_exists = manager.session_exists(&session).await;
    let mut present = if session_exists {
        manager.window_names(&session).await
    } else {
        Default::default()
    };

    let mut start = 1;
    if !session_exists {
        let dest = if cd_path.trim().is_empty() {
            agent_repo_path(project, "1", "")
        } else {
            cd_path.to_string()
        };
        let cmd = build_window_cmd(ctx, &ctx.files, project, "1", &dest, service, "").await?;
        let window = format!("{name_prefix}1");
        manager.create_session(&session, &window, &cmd).await?;
        present.insert(window);
        start = 2;
    }
    for i in start..=count {
        let idx = i.to_string();
        let window = format!("{name_prefix}{idx}");
        if present.contains(&window) {
            continue;
        }
        let dest = if cd_path.trim().is_empty() {
            agent_repo_path(project, &idx, "")
        } else {
            cd_path.to_string()
        };
        let cmd = build_window_cmd(ctx, &ctx.files, project, &idx, &dest, service, "").await?;
        manager.add_window(&session, &window, &cmd).await?;
    }
    Ok(())
}

pub async fn tmux_sync(ctx: &CmdContext, args: &TmuxSyncArgs) -> Result<()> {
    ctx.require_project()?;
    let count = match &args.count {
        Some(c) => parse_count(c)?,
        None => {
            let resolver = ContainerResolver::new(&ctx.runner);
            let running = resolver.list_compose(&ctx.files, &args.service).await.len() as u32;
            if running == 0 {
                bail!("no dev-agent containers running; use up/scale first or provide --count");
            }
            running
        }
    };
    sync_windows(
        ctx,
        args.session.as_deref().unwrap_or(""),
        &args.name_prefix,
        args.cd.as_deref().unwrap_or(""),
        count,
        &args.service,
    )
    .await
}

pub async fn tmux_add_cd(ctx: &CmdContext, args: &TmuxAddCdArgs) -> Result<()> {
    let project = ctx.require_project()?;
    let session = args
        .session
        .clone()
        .unwrap_or_else(|| tmux::default_session_name(project));
    let dest = if args.subpath.starts_with('/') {
        args.subpath.clone()
    } else {
        format!("/workspaces/dev/{}", args.subpath)
    };
    let window = args
        .name
        .clone()
        .unwrap_or_else(|| format!("agent-{}", args.index));
    let cmd =
        build_window_cmd(ctx, &ctx.files, project, &args.index, &dest, &args.service, "").await?;
    let manager = TmuxManager::new(&ctx.runner);
    if !manager.session_exists(&session).await {
        manager.create_session(&session, &window, &cmd).await?;
        manager.attach_session(&session).await?;
        return Ok(());
    }
    manager.add_window(&session, &window, &cmd).await
}

/// Apply only the windows of a layout file; overlays are assumed up.
pub async fn tmux_apply_layout(ctx: &CmdContext, args: &TmuxApplyLayoutArgs) -> Result<()> {
    let project = ctx.require_project()?;
    let layout = read_layout(std::path::Path::new(&args.file))?;
    let session = args
        .session
        .clone()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| {
            if layout.session.trim().is_empty() {
                tmux::default_session_name(project)
            } else {
                layout.session.trim().to_string()
            }
        });

    let manager = TmuxManager::new(&ctx.runner);
    let mut session_exists = manager.session_exists(&session).await;
    let mut present = if session_exists {
        manager.window_names(&session).await
    } else {
        Default::default()
    };

    for w in &layout.windows {
        let idx = w.index.to_string();
        let win_project = if w.project.trim().is_empty() {
            project
        } else {
            w.project.trim()
        };
        let files = compose::files(&ctx.paths, win_project, &ctx.profile)?;
        let dest = clean_window_path(win_project, &w.path);
        let service = if w.service.trim().is_empty() {
            DEFAULT_SERVICE
        } else {
            w.service.trim()
        };
        let name = if w.name.trim().is_empty() {
            format!("agent-{idx}")
        } else {
            w.name.trim().to_string()
        };
        if present.contains(&name) {
            continue;
        }
        let cmd = build_window_cmd(ctx, &files, win_project, &idx, &dest, service, "").await?;
        if session_exists {
            manager.add_window(&session, &name, &cmd).await?;
        } else {
            manager.create_session(&session, &name, &cmd).await?;
            session_exists = true;
        }
        present.insert(name);
    }
    if args.attach {
        manager.attach_session(&session).await?;
    }
    Ok(())
}
