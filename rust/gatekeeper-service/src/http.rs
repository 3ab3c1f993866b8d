//! HTTP binding of the coordinator.
//!
//! One route: `POST <path>` with a form-urlencoded request document as the
//! body. The response body is the encoded response document.

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use gatekeeper_policy::ClientInformation;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::{Coordinator, ErrorCode, Reply};

/// Content type of request and response documents.
pub const CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Header a fronting proxy sets to the authenticated principal.
pub const PRINCIPAL_HEADER: &str = "x-gatekeeper-principal";

/// Header carrying the caller's session handle.
pub const SESSION_HEADER: &str = "x-gatekeeper-session";

/// Largest request document accepted.
pub const MAX_REQUEST_BYTES: usize = 1024 * 1024;

/// Build the router serving `coordinator` at `path`.
///
/// Serve it with `into_make_service_with_connect_info::<SocketAddr>()` so
/// policy components see the caller's address.
pub fn router(coordinator: Arc<Coordinator>, path: &str) -> Router {
    Router::new()
        .route(path, post(exchange))
        .layer(CatchPanicLayer::custom(internal_error))
        .layer(TraceLayer::new_for_http())
        .with_state(coordinator)
}

async fn exchange(State(coordinator): State<Arc<Coordinator>>, request: Request) -> Response {
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(address)| *address);
    let client = client_information(request.headers(), remote);

    let text = match to_bytes(request.into_body(), MAX_REQUEST_BYTES)
        .await
        .map_err(|error| error.to_string())
        .and_then(|bytes| String::from_utf8(bytes.to_vec()).map_err(|error| error.to_string()))
    {
        Ok(text) => text,
        Err(error) => {
            tracing::warn!(%error, "Could not read request body");
            return respond(Reply::error(ErrorCode::MalformedMessage));
        }
    };

    respond(coordinator.handle(&text, &client).await)
}

/// Derive caller facts from the request.
pub fn client_information(headers: &HeaderMap, remote: Option<SocketAddr>) -> ClientInformation {
    let value_of = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
    };

    let mut client = ClientInformation::new();
    if let Some(address) = remote {
        client = client.with_remote_address(address);
    }
    if let Some(user_agent) = value_of(header::USER_AGENT.as_str()) {
        client = client.with_user_agent(user_agent);
    }
    if let Some(principal) = value_of(PRINCIPAL_HEADER) {
        client = client.with_principal(principal);
    }
    if let Some(session) = value_of(SESSION_HEADER) {
        client = client.with_session(session);
    }
    client
}

fn respond(reply: Reply) -> Response {
    let status = StatusCode::from_u16(reply.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, [(header::CONTENT_TYPE, CONTENT_TYPE)], reply.into_body()).into_response()
}

fn internal_error(panic: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(detail, "Exchange panicked");
    respond(Reply::error(ErrorCode::InternalError))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn it_reads_client_facts_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static("uploader/2.0"));
        headers.insert(PRINCIPAL_HEADER, HeaderValue::from_static("alice"));
        headers.insert(SESSION_HEADER, HeaderValue::from_static(""));
        let remote: SocketAddr = "10.0.0.7:5123".parse().unwrap();

        let client = client_information(&headers, Some(remote));
        assert_eq!(client.remote_address(), Some(remote));
        assert_eq!(client.user_agent(), Some("uploader/2.0"));
        assert_eq!(client.principal(), Some("alice"));
        assert_eq!(client.session(), None);
    }
}
