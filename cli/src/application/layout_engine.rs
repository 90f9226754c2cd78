//! The layout engine: applies a declarative layout end to end.
//!
//! Phase order matters — network allocation precedes compose up, compose up
//! precedes container resolution, resolution precedes seeding. Re-running
//! an unchanged layout converges: teardown + up reuse containers when the
//! config is unchanged, seeding is marker-guarded, and tmux windows are
//! only added when absent.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::domain::identity::GitIdentity;
use crate::domain::layout::{self, LayoutFile};
use crate::domain::network::Subnet;
use crate::domain::paths::{anchor_base, anchor_home, clean_window_path, DEFAULT_SERVICE, MULTI_REPO_PROJECT};
use crate::application::seeding::AgentSeeder;
use crate::infra::compose::{self, KitPaths};
use crate::infra::network::NetworkAllocator;
use crate::infra::overlay_store;
use crate::infra::runner::Runner;
use crate::infra::tmux::{self, TmuxManager};
use crate::infra::worktrees::WorktreeManager;
use crate::seed::agent::{build_command, discover_git_identity, CommandOpts, SeedTracker};
use crate::seed::scripts::AnchorConfig;

/// Attempts per overlay before giving up on subnet conflicts.
const MAX_SUBNET_ATTEMPTS: usize = 64;

/// Legacy fixed-name sidecars removed during teardown.
const LEGACY_SIDECARS: &[&str] = &["devkit_envoy", "devkit_envoy_sni", "devkit_dns", "devkit_tinyproxy"];

pub struct LayoutEngine<'a> {
    runner: &'a Runner,
    paths: &'a KitPaths,
    /// Default project for windows that don't name one.
    project: String,
    profile: String,
    no_seed: bool,
}

impl<'a> LayoutEngine<'a> {
    #[must_use]
    pub fn new(
        runner: &'a Runner,
        paths: &'a KitPaths,
        project: String,
        profile: String,
        no_seed: bool,
    ) -> Self {
        Self {
            runner,
            paths,
            project,
            profile,
            no_seed,
        }
    }

    /// Apply a layout file: worktrees, teardown, bring-up, seeding, tmux.
    pub async fn apply(&self, layout_path: &Path, attach: bool) -> Result<()> {
        let layout = read_layout(layout_path)?;

        let (warnings, errors) = layout::validate(&layout, &self.project);
        for w in &warnings {
            eprintln!("[layout] warning: {w}");
        }
        if !errors.is_empty() {
            bail!("layout validation failed:\n- {}", errors.join("\n- "));
        }

        // Identity is required for every window command; fail before any
        // container state changes.
        let identity = discover_git_identity(self.runner)
            .await
            .ok_or(crate::domain::error::ConfigError::MissingGitIdentity)?;

        self.prepare_worktrees(&layout).await?;

        let project_map = self.compose_projects(&layout);
        self.teardown_projects(&project_map).await;

        self.bring_up(&layout).await?;

        if !self.no_seed {
            self.seed_containers(&layout).await?;
        }

        self.materialize_tmux(&layout, &project_map, &identity, attach)
            .await?;
        Ok(())
    }

    /// Phase: host-side worktrees for multi-repo overlays that declare them.
    async fn prepare_worktrees(&self, layout: &LayoutFile) -> Result<()> {
        for ov in &layout.overlays {
            if ov.project.trim() != MULTI_REPO_PROJECT {
                continue;
            }
            let Some(wt) = &ov.worktrees else { continue };
            let repo = wt.repo.trim();
            if repo.is_empty() {
                continue;
            }
            let count = wt.count.max(ov.count).max(1) as u32;
            let (mut base_branch, mut branch_prefix) =
                (wt.base_branch.trim().to_string(), wt.branch_prefix.trim().to_string());
            if base_branch.is_empty() || branch_prefix.is_empty() {
                let (cfg, _) =
                    overlay_store::read_overlay(&self.paths.overlay_paths, MULTI_REPO_PROJECT)?;
                if base_branch.is_empty() {
                    base_branch = cfg.defaults.base_branch.trim().to_string();
                }
                if branch_prefix.is_empty() {
                    branch_prefix = cfg.defaults.branch_prefix.trim().to_string();
                }
            }
            if base_branch.is_empty() {
                base_branch = "main".to_string();
            }
            if branch_prefix.is_empty() {
                branch_prefix = "agent".to_string();
            }
            WorktreeManager::new(self.runner)
                .setup(&self.paths.root, repo, count, &base_branch, &branch_prefix)
                .await
                .context("worktrees setup failed")?;
        }
        Ok(())
    }

    /// Distinct compose project per overlay, in declaration order.
    fn compose_projects(&self, layout: &LayoutFile) -> HashMap<String, String> {
        let mut map = HashMap::new();
        for ov in &layout.overlays {
            let ov_project = ov.project.trim();
            if ov_project.is_empty() {
                continue;
            }
            let pname = if ov.compose_project.trim().is_empty() {
                compose::default_compose_project(ov_project)
            } else {
                ov.compose_project.trim().to_string()
            };
            map.insert(ov_project.to_string(), pname);
        }
        map
    }

    /// Phase: tear each compose project down once so stale networks with
    /// mismatched IPAM don't survive into the bring-up.
    async fn teardown_projects(&self, project_map: &HashMap<String, String>) {
        let mut seen: Vec<&String> = project_map.values().collect();
        seen.sort();
        seen.dedup();
        for pname in seen {
            self.teardown_project(pname).await;
        }
    }

    async fn teardown_project(&self, pname: &str) {
        self.runner
            .host_best_effort(
                "docker",
                &["compose", "-p", pname, "down", "--remove-orphans"],
            )
            .await;
        if std::env::var("DEVKIT_SKIP_SHARED_CLEANUP").as_deref() != Ok("1") {
            let mut rm_args = vec!["rm", "-f"];
            rm_args.extend(LEGACY_SIDECARS);
            self.runner.host_best_effort("docker", &rm_args).await;
        }
        let internal = format!("{pname}_dev-internal");
        let egress = format!("{pname}_dev-egress");
        self.runner
            .host_best_effort("docker", &["network", "rm", &internal, &egress])
            .await;
    }

    /// Phase: bring overlays up in declaration order, allocating a fresh
    /// subnet per overlay and retrying on IPAM conflicts.
    async fn bring_up(&self, layout: &LayoutFile) -> Result<()> {
        // A user-forced subnet pins every overlay, matching the env contract.
        let user_subnet = std::env::var("DEVKIT_INTERNAL_SUBNET")
            .ok()
            .filter(|v| !v.trim().is_empty());
        let user_dns = std::env::var("DEVKIT_DNS_IP")
            .ok()
            .filter(|v| !v.trim().is_empty());

        let allocator = NetworkAllocator::new(self.runner);
        let mut reserved: Vec<Subnet> = Vec::new();

        for ov in &layout.overlays {
            let ov_project = ov.project.trim();
            if ov_project.is_empty() {
                continue;
            }
            let files = compose::files(self.paths, ov_project, &ov.profiles)?;
            let (cfg, overlay_dir) =
                overlay_store::read_overlay(&self.paths.overlay_paths, ov_project)?;
            overlay_store::apply_overlay_env(&cfg, overlay_dir.as_deref(), &self.paths.root)?;
            for (key, value) in &ov.env {
                std::env::set_var(key, value);
            }

            let service = if ov.service.trim().is_empty() {
                DEFAULT_SERVICE
            } else {
                ov.service.trim()
            };
            let count = ov.count.max(1);
            let pname = if ov.compose_project.trim().is_empty() {
                compose::default_compose_project(ov_project)
            } else {
                ov.compose_project.trim().to_string()
            };

            let scale = format!("{service}={count}");
            let mut up_args = vec!["up", "-d", "--remove-orphans", "--scale", scale.as_str()];
            if ov.build {
                up_args.push("--build");
            }

            let preferred = ov
                .network
                .as_ref()
                .map(|n| n.subnet.trim().to_string())
                .filter(|s| !s.is_empty());
            let forced_dns = ov
                .network
                .as_ref()
                .map(|n| n.dns_ip.trim().to_string())
                .filter(|s| !s.is_empty());

            let mut attempt = 0;
            loop {
                attempt += 1;
                let (subnet, dns_ip) = if let Some(forced) = &user_subnet {
                    let dns = user_dns.clone().unwrap_or_else(|| {
                        forced
                            .parse::<Subnet>()
                            .map(|s| s.dns_host().to_string())
                            .unwrap_or_default()
                    });
                    (forced.clone(), dns)
                } else {
                    let allocation = allocator
                        .pick_free(preferred.as_deref(), &reserved)
                        .await?;
                    let dns = forced_dns.clone().unwrap_or(allocation.dns_ip);
                    (allocation.subnet, dns)
                };

                std::env::set_var("DEVKIT_INTERNAL_SUBNET", &subnet);
                std::env::set_var("DEVKIT_DNS_IP", &dns_ip);
                if std::env::var("DEVKIT_DEBUG").as_deref() == Ok("1") {
                    eprintln!("[devkit] {pname}: internal subnet={subnet} dns_ip={dns_ip}");
                }

                let (ok, output) = self
                    .runner
                    .compose_with_project_tee(&pname, &files, &up_args)
                    .await?;
                if ok {
                    if let Ok(s) = subnet.parse::<Subnet>() {
                        reserved.push(s);
                    }
                    break;
                }
                let conflict = output.contains("address already in use")
                    || output.to_lowercase().contains("pool overlaps");
                if !conflict || user_subnet.is_some() || attempt >= MAX_SUBNET_ATTEMPTS {
                    bail!("compose up failed for {pname}");
                }
                // The chosen subnet collided with something discovery missed;
                // reserve it, reset the project, try the next candidate.
                if let Ok(s) = subnet.parse::<Subnet>() {
                    reserved.push(s);
                }
                self.teardown_project(&pname).await;
            }
        }
        // The per-overlay exports are scoped to this run; the last overlay's
        // choice stays visible to later phases, matching the env contract.
        Ok(())
    }

    /// Phase: seed every agent container (anchor HOME, SSH, git).
    async fn seed_containers(&self, layout: &LayoutFile) -> Result<()> {
        let seeder = AgentSeeder::new(self.runner);
        for ov in &layout.overlays {
            let ov_project = ov.project.trim();
            if ov_project.is_empty() {
                continue;
            }
            let files = compose::files(self.paths, ov_project, &ov.profiles)?;
            let (cfg, _) = overlay_store::read_overlay(&self.paths.overlay_paths, ov_project)?;
            let service = if !ov.service.trim().is_empty() {
                ov.service.trim().to_string()
            } else if !cfg.service.trim().is_empty() {
                cfg.service.trim().to_string()
            } else {
                DEFAULT_SERVICE.to_string()
            };
            let count = ov.count.max(1);
            let anchor = anchor_home(ov_project);
            let base = anchor_base(ov_project);
            for i in 1..=count {
                let idx = i.to_string();
                seeder
                    .run_anchor_plan(
                        &files,
                        &service,
                        &idx,
                        &AnchorConfig {
                            anchor: anchor.to_string(),
                            base: base.to_string(),
                            seed_codex: true,
                        },
                    )
                    .await?;
                seeder.seed_ssh_material(&files, &service, &idx, anchor).await?;
            }
        }
        Ok(())
    }

    /// Phase: ensure the tmux session and one window per layout entry.
    async fn materialize_tmux(
        &self,
        layout: &LayoutFile,
        project_map: &HashMap<String, String>,
        identity: &GitIdentity,
        attach: bool,
    ) -> Result<()> {
        if tmux::skip_tmux() {
            return Ok(());
        }
        let manager = TmuxManager::new(self.runner);
        let session = if layout.session.trim().is_empty() {
            tmux::default_session_name(&self.project)
        } else {
            layout.session.trim().to_string()
        };

        let tracker = SeedTracker::new();
        let session_exists = manager.session_exists(&session).await;
        if !session_exists && layout.windows.is_empty() {
            bail!("no windows to create in session");
        }

        let mut present = if session_exists {
            manager.window_names(&session).await
        } else {
            Default::default()
        };

        let mut created_session = session_exists;
        for w in &layout.windows {
            let idx = w.index.to_string();
            let win_project = if w.project.trim().is_empty() {
                self.project.as_str()
            } else {
                w.project.trim()
            };
            let files = compose::files(self.paths, win_project, &self.profile)?;
            let dest = clean_window_path(win_project, &w.path);
            let service = if w.service.trim().is_empty() {
                DEFAULT_SERVICE.to_string()
            } else {
                w.service.trim().to_string()
            };
            let name = if w.name.trim().is_empty() {
                format!("agent-{idx}")
            } else {
                w.name.trim().to_string()
            };
            if present.contains(&name) {
                continue;
            }
            let compose_project = project_map
                .get(win_project)
                .cloned()
                .unwrap_or_else(|| compose::default_compose_project(win_project));
            let seed_key = format!("{compose_project}/{service}/{idx}");
            let cmd = build_command(&CommandOpts {
                files,
                project: win_project.to_string(),
                index: idx,
                dest,
                service,
                compose_project,
                container_name: String::new(),
                git_identity: Some(identity.clone()),
                seed_codex: tracker.should_seed(&seed_key),
            })?;
            if created_session {
                manager.add_window(&session, &name, &cmd).await?;
            } else {
                manager.create_session(&session, &name, &cmd).await?;
                created_session = true;
            }
            present.insert(name);
        }

        if attach {
            manager.attach_session(&session).await?;
        }
        Ok(())
    }
}

/// Read and parse a layout YAML file.
pub fn read_layout(path: &Path) -> Result<LayoutFile> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("reading layout {}", path.display()))?;
    serde_yaml::from_str(&data).with_context(|| format!("parsing layout {}", path.display()))
}
