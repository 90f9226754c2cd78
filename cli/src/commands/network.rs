//! Proxy selection and in-container network diagnostics.

use anyhow::Result;

use crate::commands::CmdContext;
use crate::domain::error::UsageError;

pub fn proxy(ctx: &CmdContext, which: &str) -> Result<()> {
    ctx.require_project()?;
    match which.trim() {
        "" | "tinyproxy" => {
            println!(
                "Switching agent env to tinyproxy... (ensure overlay uses HTTP(S)_PROXY=http://tinyproxy:8888)"
            );
        }
        "envoy" => {
            println!("Enable envoy profile: add --profile envoy to up/restart commands");
        }
        other => {
            return Err(UsageError::Message(format!("unknown proxy: {other}")).into());
        }
    }
    Ok(())
}

pub async fn check_net(ctx: &CmdContext) -> Result<()> {
    ctx.require_project()?;
    let script = "set -x; env | grep -E 'HTTP(S)?_PROXY|NO_PROXY'; \
                  curl -Is https://github.com | head -n1; \
                  (curl -Is https://example.com | head -n1 || true)";
    ctx.runner
        .compose(&ctx.files, &["exec", "dev-agent", "bash", "-lc", script])
        .await
}

pub async fn check_codex(ctx: &CmdContext) -> Result<()> {
    ctx.require_project()?;
    println!("== Env vars ==");
    ctx.runner
        .compose(
            &ctx.files,
            &[
                "exec",
                "dev-agent",
                "bash",
                "-lc",
                "env | grep -E '^HTTPS?_PROXY=|^NO_PROXY=' || true",
            ],
        )
        .await?;
    println!("== Curl checks (through proxy) ==");
    for (label, url) in [
        ("chatgpt.com          ", "https://chatgpt.com"),
        ("chatgpt.com/backend..", "https://chatgpt.com/backend-api/codex/responses"),
    ] {
        let script = format!(
            "set -e; echo -n '{label}: '; curl -sSvo /dev/null -w '%{{http_code}}\\n' {url} || true"
        );
        ctx.runner
            .compose(&ctx.files, &["exec", "dev-agent", "bash", "-lc", &script])
            .await?;
    }
    ctx.runner
        .compose(
            &ctx.files,
            &[
                "exec",
                "dev-agent",
                "bash",
                "-lc",
                "mkdir -p /workspace/.devhome; HOME=/workspace/.devhome \
                 CODEX_HOME=/workspace/.devhome/.codex timeout 15s codex exec 'Reply with: ok' || true",
            ],
        )
        .await
}
