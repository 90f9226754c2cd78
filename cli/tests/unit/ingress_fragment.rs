//! Generated ingress compose fragments.

#![allow(clippy::expect_used)]

use std::path::Path;

use devkit_cli::domain::overlay::{IngressCert, IngressConfig, IngressRoute};
use devkit_cli::infra::ingress::build_fragment;

fn route(host: &str, service: &str, port: u16) -> IngressRoute {
    IngressRoute {
        host: host.to_string(),
        service: service.to_string(),
        port,
        ..Default::default()
    }
}

#[test]
fn generated_fragment_mounts_caddyfile_and_publishes_ingress_port() {
    let cfg = IngressConfig {
        routes: vec![route("app.test", "dev-agent@1", 3000)],
        ..Default::default()
    };
    let fragment = build_fragment("frag-basic", &cfg, None, Path::new("/kit"))
        .expect("fragment")
        .expect("path");
    let compose = std::fs::read_to_string(&fragment).expect("compose fragment");
    assert!(compose.contains("image: caddy:"));
    assert!(compose.contains(":/ingress/Caddyfile:ro"));
    assert!(compose.contains("${DEVKIT_INGRESS_PORT:-8443}:443"));
    assert!(compose.contains("dev-internal"));
    assert!(compose.contains("dev-egress"));

    let caddyfile = fragment.parent().expect("dir").join("Caddyfile.generated");
    let body = std::fs::read_to_string(caddyfile).expect("caddyfile");
    assert!(body.contains("app.test {"));
    assert!(body.contains("tls internal"));
    assert!(body.contains("reverse_proxy devkit-frag-basic-dev-agent-1:3000"));
}

#[test]
fn project_placeholder_expands_to_compose_project() {
    let cfg = IngressConfig {
        routes: vec![route("app.test", "{project}-frontend-1", 8080)],
        ..Default::default()
    };
    let fragment = build_fragment("frag-ph", &cfg, None, Path::new("/kit"))
        .expect("fragment")
        .expect("path");
    let body = std::fs::read_to_string(fragment.parent().expect("dir").join("Caddyfile.generated"))
        .expect("caddyfile");
    assert!(body.contains("reverse_proxy devkit-frag-ph-frontend-1:8080"));
}

#[test]
fn route_certs_become_read_only_mounts() {
    let overlay = tempfile::tempdir().expect("tempdir");
    std::fs::write(overlay.path().join("app.crt"), b"cert").expect("write");
    std::fs::write(overlay.path().join("app.key"), b"key").expect("write");
    let cfg = IngressConfig {
        routes: vec![IngressRoute {
            host: "app.test".to_string(),
            service: "api".to_string(),
            port: 443,
            cert: "app.crt".to_string(),
            key: "app.key".to_string(),
        }],
        ..Default::default()
    };
    let fragment = build_fragment("frag-certs", &cfg, Some(overlay.path()), Path::new("/kit"))
        .expect("fragment")
        .expect("path");
    let compose = std::fs::read_to_string(&fragment).expect("compose");
    assert!(compose.contains("/ingress/certs/app.crt:ro"));
    assert!(compose.contains("/ingress/certs/app.key:ro"));
    let body = std::fs::read_to_string(fragment.parent().expect("dir").join("Caddyfile.generated"))
        .expect("caddyfile");
    assert!(body.contains("tls /ingress/certs/app.crt /ingress/certs/app.key"));
}

#[test]
fn overlay_certs_are_the_fallback_pair() {
    let overlay = tempfile::tempdir().expect("tempdir");
    std::fs::write(overlay.path().join("wild.crt"), b"cert").expect("write");
    std::fs::write(overlay.path().join("wild.key"), b"key").expect("write");
    let cfg = IngressConfig {
        routes: vec![route("app.test", "api", 443)],
        certs: vec![
            IngressCert {
                path: "wild.crt".to_string(),
            },
            IngressCert {
                path: "wild.key".to_string(),
            },
        ],
        ..Default::default()
    };
    let fragment = build_fragment("frag-fallback", &cfg, Some(overlay.path()), Path::new("/kit"))
        .expect("fragment")
        .expect("path");
    let body = std::fs::read_to_string(fragment.parent().expect("dir").join("Caddyfile.generated"))
        .expect("caddyfile");
    assert!(body.contains("tls /ingress/certs/wild.crt /ingress/certs/wild.key"));
}

#[test]
fn config_or_routes_is_required() {
    let err = build_fragment("frag-empty", &IngressConfig::default(), None, Path::new("/kit"))
        .expect_err("no config and no routes");
    assert!(err.to_string().contains("config path or routes required"));
}

#[test]
fn unsupported_kind_is_rejected() {
    let cfg = IngressConfig {
        kind: "nginx".to_string(),
        routes: vec![route("app.test", "api", 80)],
        ..Default::default()
    };
    let err = build_fragment("frag-kind", &cfg, None, Path::new("/kit"))
        .expect_err("unsupported kind");
    assert!(err.to_string().contains("unsupported kind"));
}

#[test]
fn invalid_route_is_rejected() {
    let cfg = IngressConfig {
        routes: vec![route("app.test", "api", 0)],
        ..Default::default()
    };
    let err = build_fragment("frag-route", &cfg, None, Path::new("/kit"))
        .expect_err("port 0 is invalid");
    assert!(err.to_string().contains("invalid route"));
}
