// src/proxy/forward.rs
//
// Per-backend pooled outbound transport and header rewriting (spec §4.4,
// §5 "Resource policy": "Upstream connection reuse via a per-backend
// pooled transport with bounded idle connections"). Grounded on
// `src/server/listener.rs`'s TCP-bind idiom, generalized to outbound
// `hyper::Client` construction, and on the inherited `hyper-tls` dependency
// for https:// backends.
use super::error::ProxyError;
use dashmap::DashMap;
use hyper::client::HttpConnector;
use hyper::header::{HeaderName, HeaderValue};
use hyper::{Body, HeaderMap, Request, Response};
use hyper_tls::HttpsConnector;
use std::net::IpAddr;
use std::time::Duration;
use url::Url;

type Client = hyper::Client<HttpsConnector<HttpConnector>>;

/// Headers that are connection-scoped and must never be forwarded
/// (spec §4.4 "Header rewriting").
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Caps idle connections per backend (spec §5's "bounded idle
/// connections").
const MAX_IDLE_PER_BACKEND: usize = 32;

pub struct Forwarder {
    clients: DashMap<String, Client>,
}

impl Forwarder {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
        }
    }

    fn client_for(&self, backend_id: &str) -> Client {
        self.clients
            .entry(backend_id.to_string())
            .or_insert_with(|| {
                let https = HttpsConnector::new();
                hyper::Client::builder()
                    .pool_max_idle_per_host(MAX_IDLE_PER_BACKEND)
                    .build(https)
            })
            .clone()
    }

    pub fn retire(&self, backend_id: &str) {
        self.clients.remove(backend_id);
    }

    /// Sends one forwarding attempt to `target` and returns the raw
    /// upstream response, or a typed [`ProxyError`]. Does not retry — the
    /// caller (the proxy engine) owns the fresh-backend retry loop
    /// (spec §4.4).
    pub async fn send(
        &self,
        backend_id: &str,
        target: &Url,
        client_addr: IpAddr,
        per_attempt_timeout: Duration,
        req: Request<Body>,
    ) -> Result<Response<Body>, ProxyError> {
        let client = self.client_for(backend_id);
        let rewritten = rewrite_request(req, target, client_addr)?;

        match tokio::time::timeout(per_attempt_timeout, client.request(rewritten)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(ProxyError::UpstreamUnreachable(e.to_string())),
            Err(_) => Err(ProxyError::UpstreamTimeout),
        }
    }
}

impl Default for Forwarder {
    fn default() -> Self {
        Self::new()
    }
}

/// Rebuilds `req` to target `backend_url`, preserving method/path/query/
/// body, stripping hop-by-hop headers, and appending/augmenting the
/// forwarding headers (spec §4.4 "Header rewriting").
fn rewrite_request(
    req: Request<Body>,
    backend_url: &Url,
    client_addr: IpAddr,
) -> Result<Request<Body>, ProxyError> {
    let (mut parts, body) = req.into_parts();

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let mut target = backend_url.clone();
    target.set_path("");
    let base = target.as_str().trim_end_matches('/');
    let full_url = format!("{base}{path_and_query}");

    parts.uri = full_url
        .parse()
        .map_err(|e| ProxyError::Internal(format!("failed to build upstream uri: {e}")))?;

    strip_hop_by_hop(&mut parts.headers);
    append_forwarding_headers(&mut parts.headers, client_addr, backend_url);

    Ok(Request::from_parts(parts, body))
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}

fn append_forwarding_headers(headers: &mut HeaderMap, client_addr: IpAddr, backend_url: &Url) {
    let client_addr_str = client_addr.to_string();

    let xff_name = HeaderName::from_static("x-forwarded-for");
    let combined = match headers.get(&xff_name).and_then(|v| v.to_str().ok()) {
        Some(existing) => format!("{existing}, {client_addr_str}"),
        None => client_addr_str,
    };
    if let Ok(value) = HeaderValue::from_str(&combined) {
        headers.insert(xff_name, value);
    }

    let xfh_name = HeaderName::from_static("x-forwarded-host");
    if !headers.contains_key(&xfh_name) {
        if let Some(host) = backend_url.host_str() {
            if let Ok(value) = HeaderValue::from_str(host) {
                headers.insert(xfh_name, value);
            }
        }
    }

    let xfp_name = HeaderName::from_static("x-forwarded-proto");
    if !headers.contains_key(&xfp_name) {
        if let Ok(value) = HeaderValue::from_str(backend_url.scheme()) {
            headers.insert(xfp_name, value);
        }
    }
}
