//! HTTP and WebSocket forwarding.

use axum::body::Body;
use axum::http::header::{CONNECTION, CONTENT_LENGTH, HOST, TRANSFER_ENCODING, UPGRADE};
use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::{HeaderMap, HeaderValue, Request, Response, StatusCode, Uri};
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;

use crate::ingress::Rule;
use crate::observability::metrics;
use crate::proxy::{OriginClient, Proxy, ProxyError, Target};

/// Largest body buffered when chunked encoding is disabled for an origin.
const MAX_BUFFERED_BODY: usize = 16 * 1024 * 1024;

const REQUEST_ID: &str = "x-request-id";

impl Proxy {
    /// Route one HTTP request through this engine.
    ///
    /// Upgrade requests are spliced to the origin once it answers
    /// `101 Switching Protocols`; the spliced connection does not depend on
    /// this engine afterwards.
    pub async fn proxy_http(&self, request: Request<Body>) -> Result<Response<Body>, ProxyError> {
        let host = request_host(&request).to_string();
        let path = request.uri().path().to_string();

        let Some((index, rule)) = self.config.ingress.find_matching_rule(&host, &path) else {
            return Err(ProxyError::NoRuleMatched { host, path });
        };
        metrics::record_proxy_request(rule.service.kind());

        tracing::debug!(
            host = %host,
            path = %path,
            rule = index + 1,
            service = %rule.service,
            "Routing request"
        );

        match &self.targets[index] {
            Target::Status(code) => Ok(status_response(*code)),
            Target::Origin {
                scheme,
                authority,
                client,
            } => {
                self.forward(request, rule, scheme.clone(), authority.clone(), client)
                    .await
            }
            Target::Responder { authority, client } => {
                self.forward(request, rule, Scheme::HTTP, authority.clone(), client)
                    .await
            }
        }
    }

    async fn forward(
        &self,
        mut request: Request<Body>,
        rule: &Rule,
        scheme: Scheme,
        authority: Authority,
        client: &OriginClient,
    ) -> Result<Response<Body>, ProxyError> {
        let client_upgrade = is_upgrade(request.headers()).then(|| hyper::upgrade::on(&mut request));

        let (mut parts, body) = request.into_parts();
        parts.uri = rewrite_uri(&parts.uri, scheme, authority)?;
        self.decorate_headers(&mut parts.headers, rule);

        let body = if rule.config.disable_chunked_encoding
            && client_upgrade.is_none()
            && !parts.headers.contains_key(CONTENT_LENGTH)
        {
            let bytes = axum::body::to_bytes(body, MAX_BUFFERED_BODY)
                .await
                .map_err(ProxyError::Body)?;
            parts.headers.remove(TRANSFER_ENCODING);
            parts.headers.insert(CONTENT_LENGTH, HeaderValue::from(bytes.len()));
            Body::from(bytes)
        } else {
            body
        };

        let mut response = client.request(Request::from_parts(parts, body)).await?;

        if response.status() == StatusCode::SWITCHING_PROTOCOLS {
            if let Some(client_upgrade) = client_upgrade {
                let origin_upgrade = hyper::upgrade::on(&mut response);
                tokio::spawn(splice(client_upgrade, origin_upgrade));
            }
        }

        let (parts, body) = response.into_parts();
        Ok(Response::from_parts(parts, Body::new(body)))
    }

    fn decorate_headers(&self, headers: &mut HeaderMap, rule: &Rule) {
        if let Some(host) = &rule.config.http_host_header {
            match HeaderValue::from_str(host) {
                Ok(value) => {
                    headers.insert(HOST, value);
                }
                Err(e) => tracing::warn!(host = %host, error = %e, "Ignoring invalid httpHostHeader"),
            }
        }

        for (name, value) in self.tag_headers.iter() {
            headers.insert(name.clone(), value.clone());
        }

        if !headers.contains_key(REQUEST_ID) {
            if let Ok(id) = HeaderValue::from_str(&uuid::Uuid::new_v4().to_string()) {
                headers.insert(REQUEST_ID, id);
            }
        }
    }
}

/// Host the request was addressed to, from the URI or the `Host` header.
fn request_host(request: &Request<Body>) -> &str {
    request
        .uri()
        .host()
        .or_else(|| request.headers().get(HOST).and_then(|v| v.to_str().ok()))
        .unwrap_or("")
}

fn is_upgrade(headers: &HeaderMap) -> bool {
    headers.contains_key(UPGRADE)
        && headers
            .get_all(CONNECTION)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
}

fn rewrite_uri(uri: &Uri, scheme: Scheme, authority: Authority) -> Result<Uri, ProxyError> {
    let mut parts = uri.clone().into_parts();
    parts.scheme = Some(scheme);
    parts.authority = Some(authority);
    if parts.path_and_query.is_none() {
        parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }
    Ok(Uri::from_parts(parts)?)
}

fn status_response(code: StatusCode) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = code;
    response
}

/// Copy bytes both ways between the upgraded client and origin connections.
async fn splice(client: OnUpgrade, origin: OnUpgrade) {
    let (client, origin) = match tokio::try_join!(client, origin) {
        Ok(pair) => pair,
        Err(e) => {
            tracing::warn!(error = %e, "Upgrade failed");
            return;
        }
    };

    let mut client = TokioIo::new(client);
    let mut origin = TokioIo::new(origin);
    match tokio::io::copy_bidirectional(&mut client, &mut origin).await {
        Ok((up, down)) => tracing::debug!(bytes_up = up, bytes_down = down, "Upgraded connection closed"),
        Err(e) => tracing::debug!(error = %e, "Upgraded connection ended with error"),
    }
}
