use anyhow::Context;
use poem::{Body, Response};
use tracing::*;
use url::Url;

/// The reverse-proxy fallback (C8's second branch, §4.8): forwards a
/// non-tunnel request to `target` verbatim, rewriting only the destination
/// scheme, authority, and `Host` header. Path and query are never touched.
///
/// `target` is a plain value read out of `ServerConfig` on each call rather
/// than a captured closure over a parsed URL (see DESIGN.md's note on the
/// source's director closure).
pub async fn proxy_request(req: &poem::Request, body: Body, target: &Url) -> poem::Result<Response> {
    let authority = target_authority(target).map_err(poem::error::BadGateway)?;

    let mut uri_parts = req.uri().clone().into_parts();
    uri_parts.scheme = Some(
        target
            .scheme()
            .parse()
            .map_err(|_| poem::Error::from_string("invalid proxy_target scheme", poem::http::StatusCode::BAD_GATEWAY))?,
    );
    uri_parts.authority = Some(authority.clone());
    let uri = http::Uri::from_parts(uri_parts)
        .map_err(|e| poem::Error::from_string(e.to_string(), poem::http::StatusCode::BAD_GATEWAY))?;

    debug!(%uri, "reverse-proxy fallback");

    let client = reqwest::Client::new();
    let mut upstream_req = client.request(req.method().clone(), uri.to_string());
    for name in req.headers().keys() {
        if name == http::header::HOST {
            continue;
        }
        for value in req.headers().get_all(name) {
            upstream_req = upstream_req.header(name.clone(), value.clone());
        }
    }
    upstream_req = upstream_req
        .header(http::header::HOST, authority.to_string())
        .body(reqwest::Body::wrap_stream(body.into_bytes_stream()));

    let upstream_resp = upstream_req.send().await.map_err(|error| {
        debug!(%error, "reverse-proxy upstream request failed");
        poem::error::BadGateway(error)
    })?;

    let status = upstream_resp.status();
    let headers = upstream_resp.headers().clone();
    let body = Body::from_bytes_stream(upstream_resp.bytes_stream());

    let mut response = Response::builder().status(status).body(body);
    *response.headers_mut() = headers;
    Ok(response)
}

fn target_authority(target: &Url) -> anyhow::Result<http::uri::Authority> {
    let host = target.host_str().context("proxy_target has no host")?;
    let authority = match target.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    authority.parse().context("proxy_target has an invalid authority")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authority_includes_explicit_port() {
        let target: Url = "http://upstream:8080".parse().unwrap();
        assert_eq!(target_authority(&target).unwrap().as_str(), "upstream:8080");
    }

    #[test]
    fn authority_omits_default_port() {
        let target: Url = "https://upstream".parse().unwrap();
        assert_eq!(target_authority(&target).unwrap().as_str(), "upstream");
    }
}
