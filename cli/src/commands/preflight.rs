//! Host environment checks before any containers are started.

use anyhow::{bail, Result};

use crate::commands::CmdContext;
use crate::seed::pool::{self, CredMode};

pub async fn preflight(ctx: &CmdContext) -> Result<()> {
    let mut ok = true;

    match ctx.runner.capture("docker", &["version"]).await {
        Ok(out) if out.status.success() => println!("[preflight] docker: OK"),
        _ => {
            eprintln!("[preflight] docker not available or daemon unreachable");
            ok = false;
        }
    }

    match ctx.runner.capture("tmux", &["-V"]).await {
        Ok(out) if out.status.success() => println!("[preflight] tmux: OK"),
        _ => eprintln!("[preflight] tmux not found (only needed for tmux windows)"),
    }

    if let Some(home) = dirs::home_dir() {
        let codex_dir = home.join(".codex");
        if codex_dir.is_dir() {
            if codex_dir.join("auth.json").is_file() {
                println!("[preflight] ~/.codex: OK (auth.json present)");
            } else {
                eprintln!("[preflight] ~/.codex present but auth.json missing");
                ok = false;
            }
        } else {
            eprintln!("[preflight] ~/.codex not found; codex may prompt for login in containers");
        }

        let mut key = home.join(".ssh").join("id_ed25519");
        if !key.is_file() {
            key = home.join(".ssh").join("id_rsa");
        }
        if key.is_file() {
            if key.with_extension("pub").is_file() {
                println!(
                    "[preflight] SSH key: OK ( {} )",
                    key.file_name().unwrap_or_default().to_string_lossy()
                );
            } else {
                eprintln!(
                    "[preflight] SSH private key found but public key missing: {}.pub",
                    key.display()
                );
            }
        } else {
            eprintln!("[preflight] No SSH private key found (~/.ssh/id_ed25519 or id_rsa)");
        }
    } else {
        eprintln!("[preflight] cannot resolve HOME to check ~/.codex and SSH keys");
    }

    if !ok {
        bail!("preflight checks failed");
    }

    if ctx.pool.mode == CredMode::Pool {
        let dir = &ctx.pool.dir;
        if !dir.is_dir() {
            bail!("[preflight] pool dir not found or not a directory: {}", dir.display());
        }
        let slots = pool::discover(dir)?;
        if slots.is_empty() {
            bail!("[preflight] pool dir has no slots (subdirectories): {}", dir.display());
        }
        println!(
            "[preflight] pool: OK ({} slots in {}). Reminder: include --profile pool to mount.",
            slots.len(),
            dir.display()
        );
    }
    Ok(())
}
