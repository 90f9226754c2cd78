//! Per-container seeding: anchor HOME, SSH material, git configuration.
//!
//! Containers are addressed by (service, 1-based index) within a compose
//! file set; scripts run via `docker exec` against resolved names rather
//! than compose `--index`, which is brittle across compose versions.

use std::path::PathBuf;

use anyhow::{bail, Result};

use crate::domain::paths::DEFAULT_SERVICE;
use crate::infra::containers::{pick_by_index, ContainerResolver};
use crate::infra::runner::Runner;
use crate::seed::scripts::{build_anchor_scripts, AnchorConfig};
use crate::seed::ssh::{
    build_configure_scripts, build_github_config, build_write_steps, rsa_write_step,
};

pub struct AgentSeeder<'a> {
    runner: &'a Runner,
}

impl<'a> AgentSeeder<'a> {
    #[must_use]
    pub fn new(runner: &'a Runner) -> Self {
        Self { runner }
    }

    async fn target_container(
        &self,
        files: &[String],
        service: &str,
        idx: &str,
    ) -> Result<Option<String>> {
        let resolver = ContainerResolver::new(self.runner);
        let mut names = resolver.list_compose(files, service).await;
        if names.is_empty() {
            names = resolver.list_service_any(service).await;
        }
        let name = pick_by_index(&names, idx.trim().parse().unwrap_or(1));
        if name.is_empty() {
            if self.runner.dry_run() {
                // No containers exist under dry-run; echo a compose exec so
                // the plan stays visible.
                return Ok(None);
            }
            bail!("{service} not running");
        }
        Ok(Some(name.to_string()))
    }

    /// Run a bash script inside the Nth container of a service.
    pub async fn exec_script(
        &self,
        files: &[String],
        service: &str,
        idx: &str,
        script: &str,
    ) -> Result<()> {
        let service = effective(service);
        match self.target_container(files, service, idx).await? {
            Some(name) => {
                self.runner
                    .host("docker", &["exec", "-t", &name, "bash", "-lc", script])
                    .await
            }
            None => {
                self.runner
                    .compose(
                        files,
                        &["exec", "--index", idx, service, "bash", "-lc", script],
                    )
                    .await
            }
        }
    }

    /// Run a bash script with stdin content inside the Nth container.
    pub async fn exec_script_input(
        &self,
        files: &[String],
        service: &str,
        idx: &str,
        input: &[u8],
        script: &str,
    ) -> Result<()> {
        let service = effective(service);
        match self.target_container(files, service, idx).await? {
            Some(name) => {
                self.runner
                    .exec_with_input(
                        "docker",
                        &["exec", "-i", &name, "bash", "-lc", script],
                        input,
                    )
                    .await
            }
            None => {
                self.runner
                    .compose(
                        files,
                        &["exec", "--index", idx, service, "bash", "-lc", script],
                    )
                    .await
            }
        }
    }

    /// Run an interactive `bash -lc` inside the Nth container. No deadline.
    pub async fn exec_interactive(
        &self,
        files: &[String],
        service: &str,
        idx: &str,
        bash_cmd: &str,
    ) -> Result<()> {
        let service = effective(service);
        match self.target_container(files, service, idx).await? {
            Some(name) => {
                self.runner
                    .host_interactive("docker", &["exec", "-it", &name, "bash", "-lc", bash_cmd])
                    .await
            }
            None => {
                self.runner
                    .compose_interactive(
                        files,
                        &["exec", "--index", idx, service, "bash", "-lc", bash_cmd],
                    )
                    .await
            }
        }
    }

    /// Run the anchor plan (anchor symlink + optional Codex seed) in a
    /// container.
    pub async fn run_anchor_plan(
        &self,
        files: &[String],
        service: &str,
        idx: &str,
        cfg: &AnchorConfig,
    ) -> Result<()> {
        for script in build_anchor_scripts(cfg) {
            self.exec_script(files, service, idx, &script).await?;
        }
        Ok(())
    }

    /// Stream the host's SSH material into a container under `anchor` and
    /// set the global `core.sshCommand`. Missing host keys are skipped.
    pub async fn seed_ssh_material(
        &self,
        files: &[String],
        service: &str,
        idx: &str,
        anchor: &str,
    ) -> Result<()> {
        let keys = HostSshMaterial::read();
        let config = build_github_config(anchor, keys.has_ed25519(), keys.has_rsa());
        for step in build_write_steps(anchor, &keys.ed25519, &keys.ed25519_pub, &keys.known_hosts, &config)
        {
            self.exec_script_input(files, service, idx, &step.content, &step.script)
                .await?;
        }
        if keys.has_rsa() {
            let step = rsa_write_step(anchor, &keys.rsa);
            self.exec_script_input(files, service, idx, &step.content, &step.script)
                .await?;
        }
        let script = format!(
            "home='{anchor}'; HOME=\"$home\" git config --global core.sshCommand 'ssh -F ~/.ssh/config'"
        );
        self.exec_script(files, service, idx, &script).await
    }

    /// Full git configure pass for one agent: ssh config wait, global
    /// sshCommand, HOME alignment, repo-local scrub, validation pull.
    pub async fn configure_git(
        &self,
        files: &[String],
        service: &str,
        idx: &str,
        home: &str,
        repo_path: &str,
    ) -> Result<()> {
        for script in build_configure_scripts(home, repo_path) {
            self.exec_script(files, service, idx, &script).await?;
        }
        Ok(())
    }
}

fn effective(service: &str) -> &str {
    if service.trim().is_empty() {
        DEFAULT_SERVICE
    } else {
        service.trim()
    }
}

/// Host SSH files read once per seeding pass. All reads are best-effort:
/// absent files become empty buffers and their write steps are skipped.
pub struct HostSshMaterial {
    pub ed25519: Vec<u8>,
    pub ed25519_pub: Vec<u8>,
    pub rsa: Vec<u8>,
    pub known_hosts: Vec<u8>,
}

impl HostSshMaterial {
    #[must_use]
    pub fn read() -> Self {
        let ssh_dir = home_ssh_dir();
        Self {
            ed25519: read_or_empty(&ssh_dir.join("id_ed25519")),
            ed25519_pub: read_or_empty(&ssh_dir.join("id_ed25519.pub")),
            rsa: read_or_empty(&ssh_dir.join("id_rsa")),
            known_hosts: read_or_empty(&ssh_dir.join("known_hosts")),
        }
    }

    #[must_use]
    pub fn has_ed25519(&self) -> bool {
        !self.ed25519.is_empty()
    }

    #[must_use]
    pub fn has_rsa(&self) -> bool {
        !self.rsa.is_empty()
    }
}

fn home_ssh_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_default().join(".ssh")
}

fn read_or_empty(path: &std::path::Path) -> Vec<u8> {
    std::fs::read(path).unwrap_or_default()
}
