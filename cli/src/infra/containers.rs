//! Container discovery: maps (compose project, service, index) to concrete
//! container names via docker labels, with a bounded readiness poll.

use std::time::Duration;

use crate::domain::paths::DEFAULT_SERVICE;
use crate::infra::runner::Runner;

/// How long [`ContainerResolver::resolve`] waits for a container to appear.
pub const RESOLVE_DEADLINE: Duration = Duration::from_secs(60);

const POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct ContainerResolver<'a> {
    runner: &'a Runner,
}

impl<'a> ContainerResolver<'a> {
    #[must_use]
    pub fn new(runner: &'a Runner) -> Self {
        Self { runner }
    }

    /// Running container names for a compose project + service, sorted.
    /// Empty project falls back to the service-label-only listing.
    pub async fn list_project_service(&self, project: &str, service: &str) -> Vec<String> {
        let project = project.trim();
        if project.is_empty() {
            return self.list_service_any(service).await;
        }
        let project_filter = format!("label=com.docker.compose.project={project}");
        let mut args = vec!["ps", "--filter", project_filter.as_str()];
        let service_filter;
        if !service.trim().is_empty() {
            service_filter = format!("label=com.docker.compose.service={}", service.trim());
            args.push("--filter");
            args.push(service_filter.as_str());
        }
        args.push("--format");
        args.push("{{.Names}}");
        parse_names(&self.runner.capture_ok("docker", &args).await)
    }

    /// Running container names for a service across all compose projects.
    pub async fn list_service_any(&self, service: &str) -> Vec<String> {
        let svc = if service.trim().is_empty() {
            DEFAULT_SERVICE
        } else {
            service.trim()
        };
        let filter = format!("label=com.docker.compose.service={svc}");
        let out = self
            .runner
            .capture_ok(
                "docker",
                &["ps", "--filter", filter.as_str(), "--format", "{{.Names}}"],
            )
            .await;
        parse_names(&out)
    }

    /// Running container names for a service within an explicit compose file
    /// set (`docker compose ... ps`).
    pub async fn list_compose(&self, file_args: &[String], service: &str) -> Vec<String> {
        let svc = if service.trim().is_empty() {
            DEFAULT_SERVICE
        } else {
            service.trim()
        };
        let mut args: Vec<&str> = vec!["compose"];
        args.extend(file_args.iter().map(String::as_str));
        args.extend(["ps", "--format", "{{.Name}}", svc]);
        parse_names(&self.runner.capture_ok("docker", &args).await)
    }

    /// Resolve the 1-based `index`-th container for a project/service,
    /// polling every 500 ms for up to 60 s while the listing is empty.
    /// Returns an empty string on deadline (or immediately under dry-run,
    /// where no containers will ever appear).
    pub async fn resolve(&self, project: &str, service: &str, index: usize) -> String {
        if self.runner.dry_run() {
            return String::new();
        }
        let deadline = tokio::time::Instant::now() + RESOLVE_DEADLINE;
        loop {
            let names = self.list_project_service(project, service).await;
            if !names.is_empty() {
                return pick_by_index(&names, index).to_string();
            }
            if tokio::time::Instant::now() >= deadline {
                return String::new();
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

/// Nth (1-based) name, clamping over-index to the last entry.
#[must_use]
pub fn pick_by_index(names: &[String], index: usize) -> &str {
    if names.is_empty() {
        return "";
    }
    let n = index.max(1).min(names.len());
    &names[n - 1]
}

fn parse_names(out: &str) -> Vec<String> {
    let mut names: Vec<String> = out
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();
    names.sort();
    names
}
