//! Network allocation: discovers in-use CIDRs from the host routing table
//! and docker's network inventory, then picks a free /24 plus DNS host via
//! the pure logic in `domain::network`.

use anyhow::Result;
use serde_json::Value;

use crate::domain::network::{pick_free_subnet, Subnet};
use crate::infra::runner::Runner;

/// A chosen internal subnet and DNS host address for one overlay network.
#[derive(Debug, Clone)]
pub struct Allocation {
    pub subnet: String,
    pub dns_ip: String,
    /// True when env overrides forced the choice.
    pub forced: bool,
}

pub struct NetworkAllocator<'a> {
    runner: &'a Runner,
}

impl<'a> NetworkAllocator<'a> {
    #[must_use]
    pub fn new(runner: &'a Runner) -> Self {
        Self { runner }
    }

    /// Pick a free subnet, honoring `DEVKIT_INTERNAL_SUBNET` /
    /// `DEVKIT_DNS_IP` overrides unconditionally.
    ///
    /// # Errors
    ///
    /// Fails with exhaustion when every candidate overlaps something.
    pub async fn pick(
        &self,
        preferred: Option<&str>,
        reserved: &[Subnet],
    ) -> Result<Allocation> {
        if let Ok(forced) = std::env::var("DEVKIT_INTERNAL_SUBNET") {
            let forced = forced.trim().to_string();
            if !forced.is_empty() {
                let dns = match std::env::var("DEVKIT_DNS_IP") {
                    Ok(d) if !d.trim().is_empty() => d.trim().to_string(),
                    _ => forced
                        .parse::<Subnet>()
                        .map(|s| s.dns_host().to_string())
                        .unwrap_or_default(),
                };
                return Ok(Allocation {
                    subnet: forced,
                    dns_ip: dns,
                    forced: true,
                });
            }
        }

        self.pick_free(preferred, reserved).await
    }

    /// Pick a free subnet from discovery alone, ignoring env overrides.
    /// Used by the layout engine, which resolves overrides itself and
    /// re-exports the chosen subnet per overlay.
    pub async fn pick_free(
        &self,
        preferred: Option<&str>,
        reserved: &[Subnet],
    ) -> Result<Allocation> {
        let preferred = preferred.and_then(|p| p.trim().parse::<Subnet>().ok());
        let used = self.used_cidrs().await;
        let picked = pick_free_subnet(preferred, &used, reserved)?;
        Ok(Allocation {
            subnet: picked.to_string(),
            dns_ip: picked.dns_host().to_string(),
            forced: false,
        })
    }

    /// CIDRs currently claimed by host routes or docker networks. Failures
    /// here degrade to an empty list — allocation then trusts the compose
    /// conflict retry to catch collisions.
    pub async fn used_cidrs(&self) -> Vec<String> {
        let mut cidrs = self.route_cidrs().await;
        cidrs.extend(self.docker_network_cidrs().await);
        cidrs
    }

    async fn route_cidrs(&self) -> Vec<String> {
        // `ip -j route` first; older hosts fall back to plain text output.
        let out = self.runner.capture_ok("ip", &["-j", "route"]).await;
        if !out.is_empty() {
            if let Ok(entries) = serde_json::from_str::<Vec<Value>>(&out) {
                let parsed: Vec<String> = entries
                    .iter()
                    .filter_map(|e| e.get("dst").and_then(Value::as_str))
                    .filter(|dst| *dst != "default" && dst.contains('/'))
                    .map(str::to_string)
                    .collect();
                if !parsed.is_empty() {
                    return parsed;
                }
            }
        }
        let out = self.runner.capture_ok("ip", &["route"]).await;
        out.lines()
            .filter_map(|line| line.split_whitespace().next())
            .filter(|first| *first != "default" && first.contains('/'))
            .map(str::to_string)
            .collect()
    }

    async fn docker_network_cidrs(&self) -> Vec<String> {
        let ids = self
            .runner
            .capture_ok("docker", &["network", "ls", "--format", "{{.ID}}"])
            .await;
        let mut cidrs = Vec::new();
        for id in ids.split_whitespace() {
            let subnets = self
                .runner
                .capture_ok(
                    "docker",
                    &[
                        "network",
                        "inspect",
                        id,
                        "--format",
                        "{{range .IPAM.Config}}{{.Subnet}}\n{{end}}",
                    ],
                )
                .await;
            for line in subnets.lines() {
                let line = line.trim();
                if !line.is_empty() {
                    cidrs.push(line.to_string());
                }
            }
        }
        cidrs
    }
}
