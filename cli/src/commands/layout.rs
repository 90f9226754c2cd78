//! Layout commands: apply, validate, generate.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use anyhow::Result;

use crate::application::layout_engine::{read_layout, LayoutEngine};
use crate::cli::{LayoutApplyArgs, LayoutGenerateArgs};
use crate::commands::CmdContext;
use crate::domain::error::UsageError;
use crate::domain::layout;

pub async fn layout_apply(ctx: &CmdContext, args: &LayoutApplyArgs) -> Result<()> {
    let project = ctx.require_project()?;
    let engine = LayoutEngine::new(
        &ctx.runner,
        &ctx.paths,
        project.to_string(),
        ctx.profile.clone(),
        ctx.no_seed,
    );
    engine.apply(Path::new(&args.file), args.attach).await
}

pub fn layout_validate(ctx: &CmdContext, file: &str) -> Result<()> {
    let layout = read_layout(Path::new(file))?;
    let (warnings, errors) = layout::validate(&layout, ctx.project.trim());
    for w in &warnings {
        println!("warning: {w}");
    }
    for e in &errors {
        println!("error: {e}");
    }
    if !errors.is_empty() {
        return Err(UsageError::Message(format!("layout has {} error(s)", errors.len())).into());
    }
    println!("layout OK ({} warnings)", warnings.len());
    Ok(())
}

/// Inspect running containers and emit a layout that reproduces them:
/// overlays inferred from compose project labels, one window per replica.
pub async fn layout_generate(ctx: &CmdContext, args: &LayoutGenerateArgs) -> Result<()> {
    ctx.require_project()?;
    let session = args
        .session
        .clone()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "devkit:mixed".to_string());

    let out = ctx
        .runner
        .capture_ok(
            "docker",
            &[
                "ps",
                "--format",
                "{{.Label \"com.docker.compose.project\"}}\t{{.Label \"com.docker.compose.service\"}}",
            ],
        )
        .await;
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for line in out.lines() {
        let Some((proj, svc)) = line.trim().split_once('\t') else {
            continue;
        };
        if svc.trim() == args.service && !proj.trim().is_empty() {
            *counts.entry(proj.trim().to_string()).or_insert(0) += 1;
        }
    }

    let mut yml = String::new();
    let _ = writeln!(yml, "session: {session}\n");
    yml.push_str("overlays:\n");
    for (compose_project, count) in &counts {
        let overlay = compose_project
            .strip_prefix("devkit-")
            .unwrap_or(compose_project);
        let _ = writeln!(
            yml,
            "  - project: {overlay}\n    service: {}\n    count: {count}\n    profiles: dns\n    compose_project: {compose_project}",
            args.service
        );
    }
    yml.push_str("\nwindows:\n");
    for (compose_project, count) in &counts {
        let overlay = compose_project
            .strip_prefix("devkit-")
            .unwrap_or(compose_project);
        for i in 1..=*count {
            let _ = writeln!(
                yml,
                "  - index: {i}\n    project: {overlay}\n    service: {}\n    path: /workspace\n    name: {overlay}-{i}",
                args.service
            );
        }
    }

    match &args.output {
        Some(path) if !path.trim().is_empty() => {
            std::fs::write(path, &yml)?;
            eprintln!("wrote {path}");
        }
        _ => print!("{yml}"),
    }
    Ok(())
}
