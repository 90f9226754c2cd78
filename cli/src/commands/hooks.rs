//! Overlay warm/maintain hooks, executed inside the agent container.

use anyhow::Result;

use crate::commands::CmdContext;
use crate::infra::overlay_store;

pub async fn run_hook(ctx: &CmdContext, warm: bool) -> Result<()> {
    let project = ctx.require_project()?;
    let (cfg, _) = overlay_store::read_overlay(&ctx.paths.overlay_paths, project)?;
    let (script, label) = if warm {
        (cfg.hooks.warm, "warm")
    } else {
        (cfg.hooks.maintain, "maintain")
    };
    if script.trim().is_empty() {
        println!("No {label} hook defined");
        return Ok(());
    }
    ctx.runner
        .compose(&ctx.files, &["exec", "dev-agent", "bash", "-lc", &script])
        .await
}
