//! Request handling: path normalization, the authorization table, prune
//! short-circuits, forwarding, and post-create side effects.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::Request;
use percent_encoding::percent_decode_str;
use serde::Deserialize;

use crate::policy::{authorize_create, AllowPolicy};
use crate::proxy::UpstreamClient;
use crate::registry::ContainerRegistry;

/// Shared broker state: policy is read-only after startup, the registry is
/// the only mutable piece.
pub struct BrokerState {
    pub policy: AllowPolicy,
    pub registry: ContainerRegistry,
    pub client: UpstreamClient,
    pub attach_networks: Vec<String>,
}

/// Strip an optional versioned prefix (`/v1.41/...` → `/...`).
#[must_use]
pub fn strip_version_prefix(path: &str) -> String {
    let Some(rest) = path.strip_prefix("/v") else {
        return path.to_string();
    };
    let Some((version, tail)) = rest.split_once('/') else {
        return path.to_string();
    };
    let mut parts = version.splitn(2, '.');
    let major_ok = parts
        .next()
        .is_some_and(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()));
    let minor_ok = parts
        .next()
        .is_some_and(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()));
    if major_ok && minor_ok {
        format!("/{tail}")
    } else {
        path.to_string()
    }
}

/// Decode a query string into a key → value map.
#[must_use]
pub fn parse_query(raw: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for pair in raw.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = percent_decode_str(key).decode_utf8_lossy().into_owned();
        let value = percent_decode_str(&value.replace('+', " "))
            .decode_utf8_lossy()
            .into_owned();
        out.insert(key, value);
    }
    out
}

fn resource_id_from_path(clean_path: &str) -> &str {
    clean_path.split('/').nth(2).unwrap_or("")
}

// ── Authorization ────────────────────────────────────────────────────────────

#[derive(Debug, PartialEq, Eq)]
pub enum Denial {
    Forbidden,
    UnknownContainer,
}

/// The admission table. Pure in (request, policy, registry); rewriting the
/// path with a `/vX.Y/` prefix does not change the decision because callers
/// pass the normalized path.
pub fn authorize(
    method: &Method,
    clean_path: &str,
    query: &HashMap<String, String>,
    body: &[u8],
    policy: &AllowPolicy,
    registry: &ContainerRegistry,
) -> Result<(), Denial> {
    match clean_path {
        "/_ping" | "/version" | "/info" => return Ok(()),
        _ => {}
    }

    if clean_path == "/images/json" && method == Method::GET {
        return Ok(());
    }
    if clean_path == "/images/create" && method == Method::POST {
        let from_image = query.get("fromImage").map(String::as_str).unwrap_or("");
        let tag = query.get("tag").map(String::as_str).unwrap_or("");
        if policy.pull_allowed(from_image, tag) {
            tracing::debug!(image = from_image, tag, "allowing image pull");
            return Ok(());
        }
        return Err(Denial::Forbidden);
    }
    if clean_path.starts_with("/images/") && clean_path.ends_with("/json") && method == Method::GET
    {
        return authorize_image_inspect(clean_path, policy);
    }
    if clean_path == "/containers/json" && method == Method::GET {
        return Ok(());
    }
    if clean_path == "/containers/create" && method == Method::POST {
        return authorize_create(policy, body).map_err(|denial| {
            tracing::warn!(?denial, "blocked container create");
            Denial::Forbidden
        });
    }
    if clean_path.starts_with("/containers/") {
        let identifier = resource_id_from_path(clean_path);
        if identifier.is_empty() {
            return Err(Denial::Forbidden);
        }
        if registry.matches(identifier).is_none() {
            return Err(Denial::UnknownContainer);
        }
        tracing::debug!(id = identifier, "allowing container action");
        return Ok(());
    }
    if clean_path.starts_with("/networks/") && method == Method::GET {
        let identifier = resource_id_from_path(clean_path);
        return match identifier {
            "bridge" | "host" | "none" => Ok(()),
            _ => Err(Denial::Forbidden),
        };
    }
    Err(Denial::Forbidden)
}

fn authorize_image_inspect(clean_path: &str, policy: &AllowPolicy) -> Result<(), Denial> {
    let identifier = clean_path
        .strip_prefix("/images/")
        .and_then(|p| p.strip_suffix("/json"))
        .map(|p| p.trim_matches('/'))
        .unwrap_or("");
    if identifier.is_empty() {
        return Err(Denial::Forbidden);
    }
    let identifier = percent_decode_str(identifier).decode_utf8_lossy();
    if identifier.starts_with("sha256:") {
        return Ok(());
    }
    if policy.match_reference(&identifier).is_some() {
        return Ok(());
    }
    Err(Denial::Forbidden)
}

// ── Prune short-circuits ─────────────────────────────────────────────────────

/// The documented empty-success body for each prune endpoint. These never
/// reach the runtime.
#[must_use]
pub fn prune_response_body(clean_path: &str) -> Option<&'static str> {
    match clean_path {
        "/containers/prune" => Some(r#"{"ContainersDeleted":[],"SpaceReclaimed":0}"#),
        "/networks/prune" => Some(r#"{"NetworksDeleted":[]}"#),
        "/volumes/prune" => Some(r#"{"VolumesDeleted":[],"SpaceReclaimed":0}"#),
        "/images/prune" => Some(r#"{"ImagesDeleted":[],"SpaceReclaimed":0}"#),
        _ => None,
    }
}

// ── Handler ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ContainerCreateResponse {
    #[serde(default, rename = "Id")]
    id: String,
}

fn text_response(status: StatusCode, body: &'static str) -> Response {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from(body))
        .unwrap_or_default()
}

fn json_response(body: &'static str) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap_or_default()
}

/// Headers that must not be copied verbatim: the proxy re-frames bodies and
/// owns the connection.
fn is_hop_header(name: &header::HeaderName) -> bool {
    *name == header::HOST
        || *name == header::CONTENT_LENGTH
        || *name == header::TRANSFER_ENCODING
        || *name == header::CONNECTION
        || *name == header::UPGRADE
}

pub async fn handle(State(state): State<Arc<BrokerState>>, req: Request<Body>) -> Response {
    let (parts, body) = req.into_parts();
    let path = parts.uri.path().to_string();
    let raw_query = parts.uri.query().unwrap_or("").to_string();
    let clean_path = strip_version_prefix(&path);
    tracing::debug!(method = %parts.method, path = %path, "incoming request");

    if parts.method == Method::POST {
        if let Some(canned) = prune_response_body(&clean_path) {
            tracing::debug!(path = %path, "responding to prune noop");
            return json_response(canned);
        }
    }

    let body_bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(b) => b,
        Err(e) => {
            tracing::error!(error = %e, "failed to read request body");
            return text_response(StatusCode::INTERNAL_SERVER_ERROR, "broker error");
        }
    };
    let query = parse_query(&raw_query);

    if let Err(denial) = authorize(
        &parts.method,
        &clean_path,
        &query,
        &body_bytes,
        &state.policy,
        &state.registry,
    ) {
        tracing::warn!(method = %parts.method, path = %path, ?denial, "blocked request");
        return text_response(StatusCode::FORBIDDEN, "forbidden");
    }

    let upstream_resp = match forward(&state, &parts.method, &path, &raw_query, &parts.headers, body_bytes).await
    {
        Ok(resp) => resp,
        Err(e) => {
            tracing::error!(error = %e, "forward error");
            return text_response(StatusCode::BAD_GATEWAY, "upstream error");
        }
    };

    let status = upstream_resp.status();
    let is_create = clean_path == "/containers/create" && parts.method == Method::POST;
    let is_delete = clean_path.starts_with("/containers/") && parts.method == Method::DELETE;

    if is_create && status.is_success() {
        // The create response must be observed to record the container id;
        // this is the only endpoint whose body is buffered.
        return finish_create(&state, upstream_resp, query.get("name").cloned()).await;
    }
    if is_delete && status.is_success() {
        let identifier = resource_id_from_path(&clean_path);
        if !identifier.is_empty() {
            state.registry.remove(identifier);
        }
    }

    stream_response(upstream_resp)
}

async fn forward(
    state: &BrokerState,
    method: &Method,
    path: &str,
    raw_query: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> anyhow::Result<hyper::Response<hyper::body::Incoming>> {
    let uri = if raw_query.is_empty() {
        path.to_string()
    } else {
        format!("{path}?{raw_query}")
    };
    let mut builder = Request::builder()
        .method(method.clone())
        .uri(uri)
        .header(header::HOST, "docker");
    if let Some(out_headers) = builder.headers_mut() {
        for (name, value) in headers {
            if !is_hop_header(name) {
                out_headers.append(name.clone(), value.clone());
            }
        }
        if body.is_empty() {
            out_headers.remove(header::CONTENT_TYPE);
        }
    }
    let req = builder.body(Full::new(body))?;
    tracing::debug!(path, "forwarding request");
    state.client.send(req).await
}

/// Buffer the create response, register the new container, join auxiliary
/// networks, and re-emit the body unchanged.
async fn finish_create(
    state: &BrokerState,
    resp: hyper::Response<hyper::body::Incoming>,
    requested_name: Option<String>,
) -> Response {
    let (parts, body) = resp.into_parts();
    let body_bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            tracing::error!(error = %e, "failed to read create response");
            return text_response(StatusCode::INTERNAL_SERVER_ERROR, "broker error");
        }
    };

    match serde_json::from_slice::<ContainerCreateResponse>(&body_bytes) {
        Ok(payload) if !payload.id.is_empty() => {
            state
                .registry
                .add(&payload.id, requested_name.as_deref().unwrap_or(""));
            attach_networks(state, &payload.id).await;
        }
        Ok(_) => {}
        Err(e) => tracing::error!(error = %e, "post process error"),
    }

    let mut builder = Response::builder().status(parts.status);
    if let Some(out_headers) = builder.headers_mut() {
        for (name, value) in &parts.headers {
            if !is_hop_header(name) {
                out_headers.append(name.clone(), value.clone());
            }
        }
    }
    builder
        .body(Body::from(body_bytes))
        .unwrap_or_else(|_| text_response(StatusCode::INTERNAL_SERVER_ERROR, "broker error"))
}

/// Join each configured auxiliary network. Best-effort: failures are logged
/// and never fail the create.
async fn attach_networks(state: &BrokerState, container_id: &str) {
    for network in &state.attach_networks {
        let network = network.trim();
        if network.is_empty() {
            continue;
        }
        if let Err(e) = connect_network(state, container_id, network).await {
            tracing::warn!(container = container_id, network, error = %e, "failed to attach network");
        }
    }
}

async fn connect_network(state: &BrokerState, container_id: &str, network: &str) -> anyhow::Result<()> {
    let payload = serde_json::json!({ "Container": container_id });
    let req = Request::builder()
        .method(Method::POST)
        .uri(format!("/networks/{network}/connect"))
        .header(header::HOST, "docker")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(payload.to_string())))?;
    let resp = state.client.send(req).await?;
    let status = resp.status();
    if status.as_u16() >= 300 && status != StatusCode::NOT_MODIFIED {
        let body = resp.into_body().collect().await.map(|c| c.to_bytes()).unwrap_or_default();
        anyhow::bail!(
            "network connect status {}: {}",
            status.as_u16(),
            String::from_utf8_lossy(&body).trim()
        );
    }
    Ok(())
}

/// Forward status, headers, and body without buffering. Chunked log streams
/// flush frame by frame because the upstream body is polled directly.
fn stream_response(resp: hyper::Response<hyper::body::Incoming>) -> Response {
    let (parts, body) = resp.into_parts();
    let mut builder = Response::builder().status(parts.status);
    if let Some(out_headers) = builder.headers_mut() {
        for (name, value) in &parts.headers {
            if !is_hop_header(name) {
                out_headers.append(name.clone(), value.clone());
            }
        }
    }
    builder
        .body(Body::new(body))
        .unwrap_or_else(|_| text_response(StatusCode::INTERNAL_SERVER_ERROR, "broker error"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::AllowPolicy;

    fn fixture() -> (AllowPolicy, ContainerRegistry) {
        (
            AllowPolicy::from_parts(Some("postgres:latest"), None, None, true),
            ContainerRegistry::new(),
        )
    }

    fn check(
        method: Method,
        path: &str,
        query: &str,
        body: &[u8],
        policy: &AllowPolicy,
        registry: &ContainerRegistry,
    ) -> Result<(), Denial> {
        authorize(
            &method,
            &strip_version_prefix(path),
            &parse_query(query),
            body,
            policy,
            registry,
        )
    }

    #[test]
    fn version_prefix_is_stripped() {
        assert_eq!(strip_version_prefix("/v1.41/containers/json"), "/containers/json");
        assert_eq!(strip_version_prefix("/v1.41/_ping"), "/_ping");
        assert_eq!(strip_version_prefix("/containers/json"), "/containers/json");
        assert_eq!(strip_version_prefix("/vX.4/containers/json"), "/vX.4/containers/json");
    }

    #[test]
    fn version_prefix_does_not_change_decisions() {
        let (policy, registry) = fixture();
        let plain = check(Method::GET, "/containers/json", "", b"", &policy, &registry);
        let versioned = check(Method::GET, "/v1.41/containers/json", "", b"", &policy, &registry);
        assert_eq!(plain, versioned);
    }

    #[test]
    fn ping_version_info_always_allowed() {
        let (policy, registry) = fixture();
        for path in ["/_ping", "/version", "/info"] {
            assert_eq!(check(Method::GET, path, "", b"", &policy, &registry), Ok(()));
        }
    }

    #[test]
    fn listing_endpoints_allowed() {
        let (policy, registry) = fixture();
        assert_eq!(check(Method::GET, "/images/json", "", b"", &policy, &registry), Ok(()));
        assert_eq!(check(Method::GET, "/containers/json", "", b"", &policy, &registry), Ok(()));
    }

    #[test]
    fn pull_requires_flag_and_match() {
        let (policy, registry) = fixture();
        assert_eq!(
            check(
                Method::POST,
                "/images/create",
                "fromImage=postgres&tag=latest",
                b"",
                &policy,
                &registry
            ),
            Ok(())
        );
        assert_eq!(
            check(
                Method::POST,
                "/images/create",
                "fromImage=redis&tag=latest",
                b"",
                &policy,
                &registry
            ),
            Err(Denial::Forbidden)
        );
        let no_pulls = AllowPolicy::from_parts(Some("postgres:latest"), None, None, false);
        assert_eq!(
            check(
                Method::POST,
                "/images/create",
                "fromImage=postgres&tag=latest",
                b"",
                &no_pulls,
                &registry
            ),
            Err(Denial::Forbidden)
        );
    }

    #[test]
    fn image_inspect_accepts_digests_and_aliases() {
        let (policy, registry) = fixture();
        assert_eq!(
            check(Method::GET, "/images/sha256:abc123/json", "", b"", &policy, &registry),
            Ok(())
        );
        assert_eq!(
            check(
                Method::GET,
                "/images/docker.io%2Flibrary%2Fpostgres:latest/json",
                "",
                b"",
                &policy,
                &registry
            ),
            Ok(())
        );
        assert_eq!(
            check(Method::GET, "/images/redis/json", "", b"", &policy, &registry),
            Err(Denial::Forbidden)
        );
    }

    #[test]
    fn container_actions_require_tracking() {
        let (policy, registry) = fixture();
        assert_eq!(
            check(Method::POST, "/containers/abc/start", "", b"", &policy, &registry),
            Err(Denial::UnknownContainer)
        );
        registry.add("abc123", "pg");
        assert_eq!(
            check(Method::POST, "/containers/abc/start", "", b"", &policy, &registry),
            Ok(())
        );
        assert_eq!(
            check(Method::POST, "/containers/pg/stop", "", b"", &policy, &registry),
            Ok(())
        );
    }

    #[test]
    fn network_inspect_is_builtin_only() {
        let (policy, registry) = fixture();
        for name in ["bridge", "host", "none"] {
            let path = format!("/networks/{name}");
            assert_eq!(check(Method::GET, &path, "", b"", &policy, &registry), Ok(()));
        }
        assert_eq!(
            check(Method::GET, "/networks/custom", "", b"", &policy, &registry),
            Err(Denial::Forbidden)
        );
    }

    #[test]
    fn everything_else_denied() {
        let (policy, registry) = fixture();
        assert_eq!(
            check(Method::POST, "/volumes/create", "", b"", &policy, &registry),
            Err(Denial::Forbidden)
        );
        assert_eq!(
            check(Method::POST, "/build", "", b"", &policy, &registry),
            Err(Denial::Forbidden)
        );
        assert_eq!(
            check(Method::POST, "/networks/create", "", b"", &policy, &registry),
            Err(Denial::Forbidden)
        );
    }

    #[test]
    fn create_authorization_uses_body() {
        let (policy, registry) = fixture();
        let ok_body = br#"{"Image":"postgres:latest","HostConfig":{}}"#;
        assert_eq!(
            check(Method::POST, "/v1.41/containers/create", "name=pg", ok_body, &policy, &registry),
            Ok(())
        );
        let bad_body = br#"{"Image":"redis:latest","HostConfig":{}}"#;
        assert_eq!(
            check(Method::POST, "/containers/create", "", bad_body, &policy, &registry),
            Err(Denial::Forbidden)
        );
        // Fail closed on garbage.
        assert_eq!(
            check(Method::POST, "/containers/create", "", b"{", &policy, &registry),
            Err(Denial::Forbidden)
        );
    }

    #[test]
    fn prune_bodies_are_canned() {
        assert_eq!(
            prune_response_body("/containers/prune"),
            Some(r#"{"ContainersDeleted":[],"SpaceReclaimed":0}"#)
        );
        assert!(prune_response_body("/networks/prune").is_some());
        assert!(prune_response_body("/volumes/prune").is_some());
        assert!(prune_response_body("/images/prune").is_some());
        assert!(prune_response_body("/containers/create").is_none());
    }

    #[test]
    fn query_parsing_decodes_escapes() {
        let q = parse_query("fromImage=docker.io%2Fpostgres&tag=latest");
        assert_eq!(q.get("fromImage").map(String::as_str), Some("docker.io/postgres"));
        assert_eq!(q.get("tag").map(String::as_str), Some("latest"));
    }
}

#[cfg(test)]
mod handler_tests {
    use super::*;
    use crate::policy::AllowPolicy;
    use crate::proxy::{UpstreamAddr, UpstreamClient};
    use hyper_util::rt::TokioIo;
    use std::path::PathBuf;

    /// Mock runtime socket: answers `/containers/create` with a fixed id and
    /// everything else with an empty JSON object.
    async fn spawn_mock_upstream() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        let sock = dir.path().join("docker.sock");
        let listener = tokio::net::UnixListener::bind(&sock).expect("bind mock socket");
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let service = hyper::service::service_fn(
                        |req: hyper::Request<hyper::body::Incoming>| async move {
                            let body = if req.uri().path() == "/containers/create" {
                                r#"{"Id":"abc123def456","Warnings":[]}"#
                            } else {
                                "{}"
                            };
                            Ok::<_, std::convert::Infallible>(hyper::Response::new(Full::new(
                                Bytes::from(body),
                            )))
                        },
                    );
                    let _ = hyper::server::conn::http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });
        (dir, sock)
    }

    fn broker_state(sock: PathBuf, attach_networks: Vec<String>) -> Arc<BrokerState> {
        Arc::new(BrokerState {
            policy: AllowPolicy::from_parts(Some("postgres:latest"), None, None, false),
            registry: ContainerRegistry::new(),
            client: UpstreamClient::new(UpstreamAddr::Unix(sock)),
            attach_networks,
        })
    }

    fn request(method: Method, uri: &str, body: &'static str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::from(body))
            .expect("request builds")
    }

    async fn body_string(resp: Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("body");
        String::from_utf8_lossy(&bytes).into_owned()
    }

    #[tokio::test]
    async fn whitelisted_create_is_forwarded_and_tracked() {
        let (_dir, sock) = spawn_mock_upstream().await;
        let state = broker_state(sock, vec!["dev-egress".to_string()]);

        let resp = handle(
            State(state.clone()),
            request(
                Method::POST,
                "/v1.41/containers/create?name=pg",
                r#"{"Image":"postgres:latest","HostConfig":{}}"#,
            ),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_string(resp).await.contains("abc123def456"));

        // Tracked under id, name, and id prefix.
        assert!(state.registry.matches("abc123def456").is_some());
        assert!(state.registry.matches("pg").is_some());
        assert!(state.registry.matches("abc123").is_some());

        // A follow-up lifecycle action on the tracked container is admitted.
        let resp = handle(
            State(state.clone()),
            request(Method::POST, "/v1.41/containers/abc123def456/start", ""),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        // Deleting it drops the registry entry.
        let resp = handle(
            State(state.clone()),
            request(Method::DELETE, "/containers/abc123def456", ""),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(state.registry.matches("abc123def456").is_none());
    }

    #[tokio::test]
    async fn foreign_image_create_is_denied_without_forwarding() {
        let (_dir, sock) = spawn_mock_upstream().await;
        let state = broker_state(sock, Vec::new());

        let resp = handle(
            State(state.clone()),
            request(
                Method::POST,
                "/containers/create",
                r#"{"Image":"redis:latest","HostConfig":{}}"#,
            ),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_string(resp).await, "forbidden");
        assert!(state.registry.matches("abc123def456").is_none());
    }

    #[tokio::test]
    async fn prune_short_circuits_without_an_upstream() {
        // No upstream socket at all: the prune must still answer.
        let state = broker_state(PathBuf::from("/nonexistent/docker.sock"), Vec::new());
        let resp = handle(
            State(state),
            request(Method::POST, "/v1.41/containers/prune", ""),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            body_string(resp).await,
            r#"{"ContainersDeleted":[],"SpaceReclaimed":0}"#
        );
    }

    #[tokio::test]
    async fn upstream_dial_failure_is_bad_gateway() {
        let state = broker_state(PathBuf::from("/nonexistent/docker.sock"), Vec::new());
        let resp = handle(State(state), request(Method::GET, "/_ping", "")).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(body_string(resp).await, "upstream error");
    }
}
