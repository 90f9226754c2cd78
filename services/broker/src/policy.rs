//! Admission policy: allowed image references, pull permission, and the
//! container-create restrictions.
//!
//! Everything here is pure — decisions are a function of (request, policy)
//! only, so the whole table is unit-testable without a docker daemon.

use std::collections::HashMap;

use serde::Deserialize;

/// An allowed image reference: a name with an optional pinned tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub name: String,
    pub tag: Option<String>,
}

impl ImageRef {
    /// Parse `name[:tag]`. A colon inside the last path segment is the tag
    /// separator; registry ports (`host:5000/img`) are left in the name.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        match s.rsplit_once(':') {
            Some((name, tag)) if !tag.contains('/') && !name.is_empty() => Self {
                name: name.to_string(),
                tag: Some(tag.to_string()),
            },
            _ => Self {
                name: s.to_string(),
                tag: None,
            },
        }
    }
}

/// Strip the registry aliases that all refer to the same Hub image.
fn strip_alias(name: &str) -> &str {
    for prefix in ["docker.io/library/", "docker.io/", "library/"] {
        if let Some(rest) = name.strip_prefix(prefix) {
            return rest;
        }
    }
    name
}

/// The broker's allowlist.
#[derive(Debug, Clone, Default)]
pub struct AllowPolicy {
    images: Vec<ImageRef>,
    allow_pulls: bool,
}

impl AllowPolicy {
    #[must_use]
    pub fn new(images: Vec<ImageRef>, allow_pulls: bool) -> Self {
        Self {
            images,
            allow_pulls,
        }
    }

    /// Build from the env forms: a comma list plus the legacy single-image
    /// pair. An empty config falls back to `postgres`.
    #[must_use]
    pub fn from_parts(
        images_csv: Option<&str>,
        legacy_image: Option<&str>,
        legacy_tag: Option<&str>,
        allow_pulls: bool,
    ) -> Self {
        let mut images = Vec::new();
        if let Some(csv) = images_csv {
            for part in csv.split(',') {
                let part = part.trim();
                if !part.is_empty() {
                    images.push(ImageRef::parse(part));
                }
            }
        }
        if images.is_empty() {
            let name = legacy_image.unwrap_or("postgres").trim();
            let name = if name.is_empty() { "postgres" } else { name };
            images.push(ImageRef {
                name: name.to_string(),
                tag: legacy_tag
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string),
            });
        }
        Self {
            images,
            allow_pulls,
        }
    }

    /// Match a candidate reference against the allowlist, accepting the
    /// `library/`/`docker.io/` alias prefixes. A policy entry with a tag
    /// requires exactly that tag; an entry without one accepts any.
    #[must_use]
    pub fn match_reference(&self, candidate: &str) -> Option<&ImageRef> {
        let parsed = ImageRef::parse(candidate);
        let name = strip_alias(&parsed.name);
        self.images.iter().find(|allowed| {
            if strip_alias(&allowed.name) != name {
                return false;
            }
            match &allowed.tag {
                Some(tag) => parsed.tag.as_deref() == Some(tag.as_str()),
                None => true,
            }
        })
    }

    /// Whether `POST /images/create` is admitted for this fromImage/tag.
    #[must_use]
    pub fn pull_allowed(&self, from_image: &str, tag: &str) -> bool {
        if !self.allow_pulls {
            return false;
        }
        let name = strip_alias(from_image.trim());
        self.images.iter().any(|allowed| {
            if strip_alias(&allowed.name) != name {
                return false;
            }
            match &allowed.tag {
                Some(t) => tag == t,
                None => true,
            }
        })
    }
}

/// Container ports an image family may publish. The wire policy only names
/// images, so the port sets key on the family basename.
#[must_use]
pub fn allowed_ports(image_name: &str) -> &'static [&'static str] {
    let family = strip_alias(image_name)
        .rsplit('/')
        .next()
        .unwrap_or(image_name);
    match family {
        "postgres" => &["5432/tcp"],
        "minio" => &["9000/tcp", "9001/tcp"],
        "redis" | "valkey" => &["6379/tcp"],
        "mysql" | "mariadb" => &["3306/tcp"],
        _ => &[],
    }
}

// ── Container-create payload ─────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ContainerCreateRequest {
    #[serde(default, rename = "Image")]
    pub image: String,
    #[serde(default, rename = "HostConfig")]
    pub host_config: HostConfigSection,
}

#[derive(Debug, Default, Deserialize)]
pub struct HostConfigSection {
    #[serde(default, rename = "Binds")]
    pub binds: Vec<String>,
    #[serde(default, rename = "CapAdd")]
    pub cap_add: Vec<String>,
    #[serde(default, rename = "Privileged")]
    pub privileged: bool,
    #[serde(default, rename = "NetworkMode")]
    pub network_mode: String,
    #[serde(default, rename = "PublishAllPorts")]
    pub publish_all_ports: bool,
    #[serde(default, rename = "PortBindings")]
    pub port_bindings: HashMap<String, Vec<PortBinding>>,
    #[serde(default, rename = "ExtraHosts")]
    pub extra_hosts: Vec<String>,
    #[serde(default, rename = "IpcMode")]
    pub ipc_mode: String,
    #[serde(default, rename = "PidMode")]
    pub pid_mode: String,
    #[serde(default, rename = "SecurityOpt")]
    pub security_opt: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PortBinding {
    #[serde(default, rename = "HostIp")]
    pub host_ip: String,
    #[serde(default, rename = "HostPort")]
    pub host_port: String,
}

/// Why a container-create request was refused.
#[derive(Debug, PartialEq, Eq)]
pub enum CreateDenial {
    ImageNotAllowed,
    Privileged,
    NetworkMode,
    HostMutation,
    PortBinding,
    IsolationOpt,
    Unparseable,
}

/// Validate a `POST /containers/create` body against the policy.
pub fn authorize_create(policy: &AllowPolicy, body: &[u8]) -> Result<(), CreateDenial> {
    let payload: ContainerCreateRequest =
        serde_json::from_slice(body).map_err(|_| CreateDenial::Unparseable)?;

    let Some(allowed) = policy.match_reference(&payload.image) else {
        return Err(CreateDenial::ImageNotAllowed);
    };

    let hc = &payload.host_config;
    if hc.privileged {
        return Err(CreateDenial::Privileged);
    }
    if !matches!(hc.network_mode.as_str(), "" | "bridge" | "default") {
        return Err(CreateDenial::NetworkMode);
    }
    if !hc.binds.is_empty() || !hc.cap_add.is_empty() || hc.publish_all_ports {
        return Err(CreateDenial::HostMutation);
    }
    validate_port_bindings(&allowed.name, &hc.port_bindings)?;
    if !hc.extra_hosts.is_empty()
        || !hc.ipc_mode.is_empty()
        || !hc.pid_mode.is_empty()
        || !hc.security_opt.is_empty()
    {
        return Err(CreateDenial::IsolationOpt);
    }
    Ok(())
}

/// Port bindings must stay inside the image's allowed port set; the host
/// side may only be runtime-chosen or a stable identity mapping.
fn validate_port_bindings(
    image_name: &str,
    bindings: &HashMap<String, Vec<PortBinding>>,
) -> Result<(), CreateDenial> {
    if bindings.is_empty() {
        return Ok(());
    }
    let allowed = allowed_ports(image_name);
    for (key, values) in bindings {
        if !allowed.contains(&key.as_str()) {
            return Err(CreateDenial::PortBinding);
        }
        let container_port = key.split('/').next().unwrap_or("");
        for binding in values {
            if !matches!(binding.host_ip.as_str(), "" | "0.0.0.0" | "::") {
                return Err(CreateDenial::PortBinding);
            }
            if !binding.host_port.is_empty() && binding.host_port != container_port {
                return Err(CreateDenial::PortBinding);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(images: &str) -> AllowPolicy {
        AllowPolicy::from_parts(Some(images), None, None, false)
    }

    #[test]
    fn image_aliases_all_match() {
        let p = policy("postgres");
        for candidate in [
            "postgres",
            "library/postgres",
            "docker.io/postgres",
            "docker.io/library/postgres",
        ] {
            assert!(p.match_reference(candidate).is_some(), "{candidate}");
        }
        assert!(p.match_reference("redis").is_none());
    }

    #[test]
    fn pinned_tag_rejects_other_tags() {
        let p = policy("postgres:15");
        assert!(p.match_reference("postgres:15").is_some());
        assert!(p.match_reference("postgres:14").is_none());
        assert!(p.match_reference("postgres").is_none());
    }

    #[test]
    fn legacy_single_image_form() {
        let p = AllowPolicy::from_parts(None, Some("postgres"), Some("16"), true);
        assert!(p.match_reference("postgres:16").is_some());
        assert!(p.match_reference("postgres:15").is_none());
        assert!(p.pull_allowed("postgres", "16"));
        assert!(!p.pull_allowed("postgres", "15"));
    }

    #[test]
    fn create_allows_whitelisted_image() {
        let p = policy("postgres:latest");
        let body = br#"{"Image":"postgres:latest","HostConfig":{}}"#;
        assert_eq!(authorize_create(&p, body), Ok(()));
    }

    #[test]
    fn create_denies_foreign_image() {
        let p = policy("postgres:latest");
        let body = br#"{"Image":"redis:latest","HostConfig":{}}"#;
        assert_eq!(authorize_create(&p, body), Err(CreateDenial::ImageNotAllowed));
    }

    #[test]
    fn create_denies_privileged() {
        let p = policy("postgres");
        let body = br#"{"Image":"postgres","HostConfig":{"Privileged":true}}"#;
        assert_eq!(authorize_create(&p, body), Err(CreateDenial::Privileged));
    }

    #[test]
    fn create_denies_binds_and_custom_network() {
        let p = policy("postgres");
        let binds = br#"{"Image":"postgres","HostConfig":{"Binds":["/:/host"]}}"#;
        assert_eq!(authorize_create(&p, binds), Err(CreateDenial::HostMutation));
        let net = br#"{"Image":"postgres","HostConfig":{"NetworkMode":"host"}}"#;
        assert_eq!(authorize_create(&p, net), Err(CreateDenial::NetworkMode));
    }

    #[test]
    fn create_denies_unparseable_body() {
        let p = policy("postgres");
        assert_eq!(
            authorize_create(&p, b"not json"),
            Err(CreateDenial::Unparseable)
        );
    }

    #[test]
    fn minio_port_bindings() {
        let p = policy("minio/minio:latest");
        let ok = br#"{"Image":"minio/minio:latest","HostConfig":{"PortBindings":{"9000/tcp":[{"HostPort":""}],"9001/tcp":[{"HostPort":""}]}}}"#;
        assert_eq!(authorize_create(&p, ok), Ok(()));
        let bad = br#"{"Image":"minio/minio:latest","HostConfig":{"PortBindings":{"9000/tcp":[{"HostPort":"1234"}]}}}"#;
        assert_eq!(authorize_create(&p, bad), Err(CreateDenial::PortBinding));
    }

    #[test]
    fn postgres_identity_mapping_allowed() {
        let p = policy("postgres");
        let ok = br#"{"Image":"postgres","HostConfig":{"PortBindings":{"5432/tcp":[{"HostIp":"0.0.0.0","HostPort":"5432"}]}}}"#;
        assert_eq!(authorize_create(&p, ok), Ok(()));
        let bad_ip = br#"{"Image":"postgres","HostConfig":{"PortBindings":{"5432/tcp":[{"HostIp":"10.0.0.1","HostPort":""}]}}}"#;
        assert_eq!(authorize_create(&p, bad_ip), Err(CreateDenial::PortBinding));
        let bad_port = br#"{"Image":"postgres","HostConfig":{"PortBindings":{"6379/tcp":[{"HostPort":""}]}}}"#;
        assert_eq!(authorize_create(&p, bad_port), Err(CreateDenial::PortBinding));
    }
}
