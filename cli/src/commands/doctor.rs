//! Runtime endpoint diagnosis: where DOCKER_HOST points and whether the
//! daemon (or a broker fronting it) answers.

use anyhow::{bail, Result};

use crate::commands::CmdContext;

pub async fn doctor_runtime(ctx: &CmdContext) -> Result<()> {
    let mut ok = true;

    match std::env::var("DOCKER_HOST") {
        Ok(host) if !host.trim().is_empty() => {
            println!("[doctor] DOCKER_HOST={host}");
            if let Some(path) = host
                .trim()
                .strip_prefix("unix://")
                .or_else(|| host.trim().strip_prefix("unix:"))
            {
                if std::path::Path::new(path).exists() {
                    println!("[doctor] runtime socket present: {path}");
                } else {
                    eprintln!("[doctor] runtime socket missing: {path}");
                    ok = false;
                }
            }
        }
        _ => println!("[doctor] DOCKER_HOST unset (default daemon socket)"),
    }

    match ctx.runner.capture("docker", &["version", "--format", "{{.Server.Version}}"]).await {
        Ok(out) if out.status.success() => {
            let version = String::from_utf8_lossy(&out.stdout);
            println!("[doctor] docker daemon: OK (server {})", version.trim());
        }
        _ => {
            eprintln!("[doctor] docker daemon unreachable");
            ok = false;
        }
    }

    match ctx.runner.capture("docker", &["compose", "version", "--short"]).await {
        Ok(out) if out.status.success() => {
            let version = String::from_utf8_lossy(&out.stdout);
            println!("[doctor] compose plugin: OK ({})", version.trim());
        }
        _ => {
            eprintln!("[doctor] compose plugin missing");
            ok = false;
        }
    }

    match ctx.runner.capture("docker", &["info", "--format", "{{.OperatingSystem}}"]).await {
        Ok(out) if out.status.success() => {
            let os = String::from_utf8_lossy(&out.stdout);
            println!("[doctor] daemon info: OK ({})", os.trim());
        }
        _ => eprintln!("[doctor] docker info failed (restricted endpoint or broker policy?)"),
    }

    if !ok {
        bail!("doctor-runtime found problems");
    }
    println!("[doctor] runtime looks healthy");
    Ok(())
}
