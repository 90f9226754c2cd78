//! CLI argument parsing with clap derive, and dispatch into command
//! handlers.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use crate::commands::{self, CmdContext};
use crate::infra::compose::{self, KitPaths};
use crate::infra::network::NetworkAllocator;
use crate::infra::runner::Runner;
use crate::seed::agent::SeedTracker;
use crate::seed::pool::PoolConfig;

/// Multi-agent development environment orchestrator
#[derive(Parser)]
#[command(
    name = "devkit",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Overlay project name (required for most commands)
    #[arg(short = 'p', long = "project", global = true, default_value = "")]
    pub project: String,

    /// Comma-separated compose profiles: hardened,dns,envoy,pool
    #[arg(long, global = true, default_value = "")]
    pub profile: String,

    /// Explicit compose project name override
    #[arg(long = "compose-project", global = true, default_value = "")]
    pub compose_project: String,

    /// Print the would-be commands without spawning anything
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Skip tmux session/window management
    #[arg(long, global = true)]
    pub no_tmux: bool,

    /// Force tmux usage even when DEVKIT_NO_TMUX is set
    #[arg(long, global = true)]
    pub tmux: bool,

    /// Skip per-agent credential seeding
    #[arg(long, global = true)]
    pub no_seed: bool,

    /// Re-run credential seeding even when already seeded
    #[arg(long, global = true)]
    pub reseed: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Bring the overlay's services up
    Up,
    /// Tear the overlay's services down
    Down,
    /// Restart the overlay's services
    Restart,
    /// Show container status
    Status,
    /// Show service logs
    Logs(TrailingArgs),
    /// Scale the agent service to N replicas
    Scale(ScaleArgs),
    /// Run a command inside the Nth agent container
    Exec(ExecArgs),
    /// Attach to the Nth agent container
    Attach(IndexArg),
    /// Allow a domain through the egress proxy and DNS
    Allow(AllowArgs),
    /// Run the overlay's warm hook
    Warm,
    /// Run the overlay's maintain hook
    Maintain,
    /// Check proxy/DNS wiring from inside an agent
    CheckNet,
    /// Check Codex connectivity from inside an agent
    #[command(hide = true)]
    CheckCodex,
    /// Select the egress proxy flavor
    Proxy(ProxyArgs),
    /// Open N agent shells in a tmux session
    TmuxShells(CountArg),
    /// Bring up N agents and open tmux windows
    Open(CountArg),
    /// Tear down, bring up N agents fresh, reseed, open tmux
    FreshOpen(CountArg),
    /// Run a command in agent N at a subpath
    ExecCd(ExecCdArgs),
    /// Open an interactive shell in agent N at a subpath
    AttachCd(AttachCdArgs),
    /// Ensure tmux windows agent-1..N exist
    TmuxSync(TmuxSyncArgs),
    /// Add one tmux window for agent N at a subpath
    TmuxAddCd(TmuxAddCdArgs),
    /// Apply only the windows of a layout file to tmux
    TmuxApplyLayout(TmuxApplyLayoutArgs),
    /// Bring up overlays and materialize tmux windows from a layout file
    LayoutApply(LayoutApplyArgs),
    /// Statically validate a layout file
    LayoutValidate(LayoutFileArg),
    /// Generate a layout file from running containers
    LayoutGenerate(LayoutGenerateArgs),
    /// Install SSH keys and git config into an agent
    SshSetup(SshSetupArgs),
    /// Test SSH connectivity to GitHub from an agent
    SshTest(OptionalIndexArg),
    /// Switch a repo's origin remote to SSH
    RepoConfigSsh(RepoArgs),
    /// Switch a repo's origin remote to HTTPS
    RepoConfigHttps(RepoArgs),
    /// Push the current branch over SSH
    RepoPushSsh(RepoArgs),
    /// Push the current branch over HTTPS
    RepoPushHttps(RepoArgs),
    /// Print worktree initialization guidance
    WorktreesInit(WorktreesSetupArgs),
    /// Create per-agent branches and worktrees on the host
    WorktreesSetup(WorktreesSetupArgs),
    /// Create a branch in an agent's worktree
    WorktreesBranch(WorktreesBranchArgs),
    /// Show worktree status across agents
    WorktreesStatus(WorktreesStatusArgs),
    /// Pull or push worktrees across agents
    WorktreesSync(WorktreesSyncArgs),
    /// Bring up N agents and open tmux windows per worktree
    WorktreesTmux(WorktreesTmuxArgs),
    /// Alias of fresh-open
    Reset(CountArg),
    /// Worktrees + scale + tmux in one idempotent pass
    Bootstrap(BootstrapArgs),
    /// Verify SSH, Codex, and worktrees for the overlay
    Verify,
    /// Run verify for every known overlay
    VerifyAll,
    /// Host environment checks
    Preflight,
    /// Manage ingress hostname mappings in hosts files
    Hosts(HostsArgs),
    /// Diagnose the container runtime endpoint
    DoctorRuntime,
}

// ── Argument structs ─────────────────────────────────────────────────────────

#[derive(Args)]
pub struct TrailingArgs {
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

#[derive(Args)]
pub struct ScaleArgs {
    /// Number of agent replicas
    pub count: String,
    /// Ensure tmux windows agent-1..N after scaling
    #[arg(long = "tmux-sync")]
    pub tmux_sync: bool,
    #[arg(long)]
    pub session: Option<String>,
    #[arg(long = "name-prefix", default_value = "agent-")]
    pub name_prefix: String,
    #[arg(long)]
    pub cd: Option<String>,
    #[arg(long, default_value = "dev-agent")]
    pub service: String,
}

#[derive(Args)]
pub struct ExecArgs {
    /// 1-based agent index
    pub index: String,
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    pub cmd: Vec<String>,
}

#[derive(Args)]
pub struct IndexArg {
    /// 1-based agent index
    #[arg(default_value = "1")]
    pub index: String,
}

#[derive(Args)]
pub struct OptionalIndexArg {
    #[arg(default_value = "1")]
    pub index: String,
}

#[derive(Args)]
pub struct AllowArgs {
    /// Domain to allow through proxy and DNS
    pub domain: String,
}

#[derive(Args)]
pub struct ProxyArgs {
    /// tinyproxy or envoy
    #[arg(default_value = "tinyproxy")]
    pub which: String,
}

#[derive(Args)]
pub struct CountArg {
    pub count: Option<String>,
}

#[derive(Args)]
pub struct ExecCdArgs {
    pub index: String,
    pub subpath: String,
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub cmd: Vec<String>,
}

#[derive(Args)]
pub struct AttachCdArgs {
    pub index: String,
    pub subpath: String,
}

#[derive(Args)]
pub struct TmuxSyncArgs {
    #[arg(long)]
    pub session: Option<String>,
    #[arg(long)]
    pub count: Option<String>,
    #[arg(long = "name-prefix", default_value = "agent-")]
    pub name_prefix: String,
    #[arg(long)]
    pub cd: Option<String>,
    #[arg(long, default_value = "dev-agent")]
    pub service: String,
}

#[derive(Args)]
pub struct TmuxAddCdArgs {
    pub index: String,
    pub subpath: String,
    #[arg(long)]
    pub session: Option<String>,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long, default_value = "dev-agent")]
    pub service: String,
}

#[derive(Args)]
pub struct TmuxApplyLayoutArgs {
    #[arg(long)]
    pub file: String,
    #[arg(long)]
    pub session: Option<String>,
    #[arg(long)]
    pub attach: bool,
}

#[derive(Args)]
pub struct LayoutApplyArgs {
    #[arg(long)]
    pub file: String,
    #[arg(long)]
    pub attach: bool,
}

#[derive(Args)]
pub struct LayoutFileArg {
    #[arg(long)]
    pub file: String,
}

#[derive(Args)]
pub struct LayoutGenerateArgs {
    #[arg(long, default_value = "dev-agent")]
    pub service: String,
    #[arg(long)]
    pub session: Option<String>,
    #[arg(long)]
    pub output: Option<String>,
}

#[derive(Args)]
pub struct SshSetupArgs {
    #[arg(long)]
    pub key: Option<String>,
    #[arg(long, default_value = "1")]
    pub index: String,
}

#[derive(Args)]
pub struct RepoArgs {
    /// Repo path relative to the workspace base
    pub repo: String,
    #[arg(long, default_value = "1")]
    pub index: String,
}

#[derive(Args)]
pub struct WorktreesSetupArgs {
    pub repo: String,
    pub count: String,
    /// Branch prefix (agent -> agent1, agent2, ...)
    #[arg(long = "base", default_value = "agent")]
    pub branch_prefix: String,
    /// Base branch to track from origin
    #[arg(long = "branch", default_value = "main")]
    pub base_branch: String,
}

#[derive(Args)]
pub struct WorktreesBranchArgs {
    pub repo: String,
    pub index: String,
    pub branch: String,
}

#[derive(Args)]
pub struct WorktreesStatusArgs {
    pub repo: String,
    #[arg(long)]
    pub all: bool,
    #[arg(long)]
    pub index: Option<String>,
}

#[derive(Args)]
pub struct WorktreesSyncArgs {
    pub repo: String,
    #[arg(long, conflicts_with = "push")]
    pub pull: bool,
    #[arg(long)]
    pub push: bool,
    #[arg(long)]
    pub all: bool,
    #[arg(long)]
    pub index: Option<String>,
}

#[derive(Args)]
pub struct WorktreesTmuxArgs {
    pub repo: String,
    pub count: String,
}

#[derive(Args)]
pub struct BootstrapArgs {
    pub repo: Option<String>,
    pub count: Option<String>,
}

#[derive(Args)]
pub struct HostsArgs {
    /// print, apply, or check
    #[arg(default_value = "print")]
    pub mode: String,
    /// host, agents, or all
    #[arg(long, default_value = "all")]
    pub target: String,
    #[arg(long, default_value = "1")]
    pub index: usize,
    #[arg(long = "all-agents")]
    pub all_agents: bool,
    #[arg(long = "require-ingress")]
    pub require_ingress: bool,
    #[arg(long)]
    pub service: Option<String>,
}

// ── Dispatch ─────────────────────────────────────────────────────────────────

impl Cli {
    /// Execute the parsed command.
    pub async fn run(self) -> Result<()> {
        if self.no_tmux {
            std::env::set_var("DEVKIT_NO_TMUX", "1");
        } else if self.tmux {
            std::env::remove_var("DEVKIT_NO_TMUX");
        }
        if !self.compose_project.trim().is_empty() {
            std::env::set_var("COMPOSE_PROJECT_NAME", self.compose_project.trim());
        }

        let exe = std::env::current_exe().unwrap_or_default();
        let paths = KitPaths::detect(&exe);
        let runner = Runner::new(self.dry_run);
        let files = compose::files(&paths, &self.project, &self.profile)?;

        // Pick the internal subnet up front so compose substitution sees it.
        // The layout engine allocates per overlay and does this itself.
        if !matches!(&self.command, Command::LayoutApply(_)) {
            let allocation = NetworkAllocator::new(&runner).pick(None, &[]).await?;
            std::env::set_var("DEVKIT_INTERNAL_SUBNET", &allocation.subnet);
            std::env::set_var("DEVKIT_DNS_IP", &allocation.dns_ip);
            if std::env::var("DEVKIT_DEBUG").as_deref() == Ok("1") {
                eprintln!(
                    "[devkit] internal subnet={} dns_ip={}",
                    allocation.subnet, allocation.dns_ip
                );
            }
        }

        let ctx = CmdContext {
            runner,
            paths,
            project: self.project,
            profile: self.profile,
            files,
            no_seed: self.no_seed,
            reseed: self.reseed,
            pool: PoolConfig::from_env(),
            exe,
            tracker: SeedTracker::new(),
        };

        match self.command {
            Command::Up => commands::compose::up(&ctx).await,
            Command::Down => commands::compose::down(&ctx).await,
            Command::Restart => commands::compose::restart(&ctx).await,
            Command::Status => commands::compose::status(&ctx).await,
            Command::Logs(args) => commands::compose::logs(&ctx, &args.args).await,
            Command::Scale(args) => commands::compose::scale(&ctx, &args).await,
            Command::Exec(args) => commands::exec::exec(&ctx, &args).await,
            Command::Attach(args) => commands::exec::attach(&ctx, &args.index).await,
            Command::Allow(args) => commands::allow::allow(&ctx, &args.domain),
            Command::Warm => commands::hooks::run_hook(&ctx, true).await,
            Command::Maintain => commands::hooks::run_hook(&ctx, false).await,
            Command::CheckNet => commands::network::check_net(&ctx).await,
            Command::CheckCodex => commands::network::check_codex(&ctx).await,
            Command::Proxy(args) => commands::network::proxy(&ctx, &args.which),
            Command::TmuxShells(args) => commands::tmux::tmux_shells(&ctx, args.count.as_deref()).await,
            Command::Open(args) => commands::tmux::open(&ctx, args.count.as_deref()).await,
            Command::FreshOpen(args) | Command::Reset(args) => {
                commands::tmux::fresh_open(&ctx, args.count.as_deref()).await
            }
            Command::ExecCd(args) => commands::exec::exec_cd(&ctx, &args).await,
            Command::AttachCd(args) => commands::exec::attach_cd(&ctx, &args).await,
            Command::TmuxSync(args) => commands::tmux::tmux_sync(&ctx, &args).await,
            Command::TmuxAddCd(args) => commands::tmux::tmux_add_cd(&ctx, &args).await,
            Command::TmuxApplyLayout(args) => commands::tmux::tmux_apply_layout(&ctx, &args).await,
            Command::LayoutApply(args) => commands::layout::layout_apply(&ctx, &args).await,
            Command::LayoutValidate(args) => commands::layout::layout_validate(&ctx, &args.file),
            Command::LayoutGenerate(args) => commands::layout::layout_generate(&ctx, &args).await,
            Command::SshSetup(args) => commands::ssh::ssh_setup(&ctx, &args).await,
            Command::SshTest(args) => commands::ssh::ssh_test(&ctx, &args.index).await,
            Command::RepoConfigSsh(args) => commands::ssh::repo_config_ssh(&ctx, &args).await,
            Command::RepoConfigHttps(args) => commands::ssh::repo_config_https(&ctx, &args).await,
            Command::RepoPushSsh(args) => commands::ssh::repo_push_ssh(&ctx, &args).await,
            Command::RepoPushHttps(args) => commands::ssh::repo_push_https(&ctx, &args).await,
            Command::WorktreesInit(args) => commands::worktrees::init(&ctx, &args),
            Command::WorktreesSetup(args) => commands::worktrees::setup(&ctx, &args).await,
            Command::WorktreesBranch(args) => commands::worktrees::branch(&ctx, &args).await,
            Command::WorktreesStatus(args) => commands::worktrees::status(&ctx, &args).await,
            Command::WorktreesSync(args) => commands::worktrees::sync(&ctx, &args).await,
            Command::WorktreesTmux(args) => commands::worktrees::tmux(&ctx, &args).await,
            Command::Bootstrap(args) => commands::bootstrap::bootstrap(&ctx, &args).await,
            Command::Verify => commands::verify::verify(&ctx).await,
            Command::VerifyAll => commands::verify::verify_all(&ctx).await,
            Command::Preflight => commands::preflight::preflight(&ctx).await,
            Command::Hosts(args) => commands::hosts::hosts(&ctx, &args).await,
            Command::DoctorRuntime => commands::doctor::doctor_runtime(&ctx).await,
        }
    }
}
