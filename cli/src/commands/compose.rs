//! Compose lifecycle commands: up, down, restart, status, logs, scale.

use anyhow::Result;

use crate::cli::ScaleArgs;
use crate::commands::{parse_count, CmdContext};

pub async fn up(ctx: &CmdContext) -> Result<()> {
    ctx.require_project()?;
    ctx.runner.compose(&ctx.files, &["up", "-d"]).await
}

pub async fn down(ctx: &CmdContext) -> Result<()> {
    ctx.require_project()?;
    ctx.runner.compose(&ctx.files, &["down"]).await
}

pub async fn restart(ctx: &CmdContext) -> Result<()> {
    ctx.require_project()?;
    ctx.runner.compose(&ctx.files, &["restart"]).await
}

pub async fn status(ctx: &CmdContext) -> Result<()> {
    ctx.require_project()?;
    ctx.runner.compose(&ctx.files, &["ps"]).await
}

pub async fn logs(ctx: &CmdContext, extra: &[String]) -> Result<()> {
    ctx.require_project()?;
    let mut args = vec!["logs"];
    args.extend(extra.iter().map(String::as_str));
    ctx.runner.compose(&ctx.files, &args).await
}

pub async fn scale(ctx: &CmdContext, args: &ScaleArgs) -> Result<()> {
    ctx.require_project()?;
    let count = parse_count(&args.count)?;
    let scale = format!("{}={count}", args.service);
    ctx.runner
        .compose(&ctx.files, &["up", "-d", "--scale", &scale])
        .await?;
    if args.tmux_sync && !crate::infra::tmux::skip_tmux() {
        crate::commands::tmux::sync_windows(
            ctx,
            args.session.as_deref().unwrap_or(""),
            &args.name_prefix,
            args.cd.as_deref().unwrap_or(""),
            count,
            &args.service,
        )
        .await?;
    }
    Ok(())
}
