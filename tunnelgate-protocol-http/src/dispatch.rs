use std::net::SocketAddr;

use poem::web::websocket::WebSocket;
use poem::web::Data;
use poem::{handler, http::StatusCode, Body, IntoResponse, Request, Response};
use tracing::*;
use tunnelgate_common::PROTOCOL_VERSION;
use tunnelgate_core::Services;

use crate::proxy::proxy_request;
use crate::ws_transport::WsTransport;

/// The HTTP-to-tunnel dispatcher (C8). Every inbound request on the single
/// listener is classified into exactly one of: tunnel upgrade, reverse-proxy
/// fallback, or a plain 404. Stateless — safe to serve many requests
/// concurrently (§4.8).
#[handler]
pub async fn dispatch(
    req: &Request,
    ws: Option<WebSocket>,
    body: Body,
    services: Data<&Services>,
) -> poem::Result<Response> {
    if is_tunnel_upgrade(req) {
        return Ok(accept_tunnel(ws, req, services.0.clone()).await);
    }

    if let Some(target) = services.config.proxy_target.clone() {
        return proxy_request(req, body, &target).await;
    }

    Ok(Response::builder().status(StatusCode::NOT_FOUND).body("Not found"))
}

/// `Upgrade: websocket` (case-insensitive) and a matching
/// `Sec-WebSocket-Protocol` token. `Origin` is deliberately not checked —
/// the tunnel authenticates at the SSH layer, not the HTTP one.
fn is_tunnel_upgrade(req: &Request) -> bool {
    let wants_upgrade = req
        .headers()
        .get(http::header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);
    let offers_protocol = req
        .headers()
        .get(http::header::SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').map(str::trim).any(|p| p == PROTOCOL_VERSION))
        .unwrap_or(false);
    wants_upgrade && offers_protocol
}

async fn accept_tunnel(ws: Option<WebSocket>, req: &Request, services: Services) -> Response {
    let Some(ws) = ws else {
        return Response::builder()
            .status(StatusCode::BAD_REQUEST)
            .body("expected a WebSocket upgrade");
    };
    let peer_addr = req
        .remote_addr()
        .as_socket_addr()
        .copied()
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 0)));

    ws.protocols([PROTOCOL_VERSION])
        .on_upgrade(move |socket| async move {
            let stream = WsTransport::new(socket);
            debug!(%peer_addr, "tunnel session accepted");
            tunnelgate_protocol_ssh::run_tunnel_session(services, stream, peer_addr).await;
        })
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use poem::Request as PoemRequest;

    fn request_with_headers(headers: &[(&str, &str)]) -> PoemRequest {
        let mut builder = PoemRequest::builder().uri_str("http://host/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.finish()
    }

    #[test]
    fn plain_request_is_not_a_tunnel_upgrade() {
        let req = request_with_headers(&[]);
        assert!(!is_tunnel_upgrade(&req));
    }

    #[test]
    fn upgrade_without_matching_protocol_is_rejected() {
        let req = request_with_headers(&[
            ("upgrade", "websocket"),
            ("sec-websocket-protocol", "some-other-protocol"),
        ]);
        assert!(!is_tunnel_upgrade(&req));
    }

    #[test]
    fn upgrade_with_matching_protocol_is_accepted() {
        let req = request_with_headers(&[
            ("Upgrade", "WebSocket"),
            ("Sec-WebSocket-Protocol", PROTOCOL_VERSION),
        ]);
        assert!(is_tunnel_upgrade(&req));
    }
}
