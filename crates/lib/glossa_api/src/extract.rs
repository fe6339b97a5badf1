//! Request extractors.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequest, FromRequestParts};
use axum::http::HeaderMap;
use axum::http::header::USER_AGENT;
use axum::http::request::Parts;
use glossa_core::models::auth::ClientInfo;

use crate::error::AppError;

/// JSON body extractor whose rejections are 400 [`AppError::Validation`]
/// responses with the usual `{error, message}` body.
#[derive(Debug, Clone, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// IP address and user agent of the caller.
///
/// The IP comes from the first `X-Forwarded-For` hop, then `X-Real-IP`,
/// then the socket peer when the server was started with connect info.
#[derive(Debug, Clone, Default)]
pub struct ClientMeta(pub ClientInfo);

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn client_ip(parts: &Parts) -> Option<String> {
    if let Some(forwarded) = header_str(&parts.headers, "x-forwarded-for")
        && let Some(first) = forwarded.split(',').map(str::trim).find(|s| !s.is_empty())
    {
        return Some(first.to_string());
    }
    if let Some(real_ip) = header_str(&parts.headers, "x-real-ip") {
        return Some(real_ip.to_string());
    }
    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

impl<S> FromRequestParts<S> for ClientMeta
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(ClientMeta(ClientInfo::new(client_ip(parts), user_agent)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> ClientInfo {
        let (mut parts, _) = request.into_parts();
        let ClientMeta(info) = ClientMeta::from_request_parts(&mut parts, &()).await.unwrap();
        info
    }

    #[tokio::test]
    async fn forwarded_for_takes_first_hop() {
        let info = extract(
            Request::builder()
                .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
                .header("x-real-ip", "10.0.0.2")
                .header(USER_AGENT, "curl/8")
                .body(())
                .unwrap(),
        )
        .await;
        assert_eq!(info.ip_address.as_deref(), Some("203.0.113.9"));
        assert_eq!(info.user_agent.as_deref(), Some("curl/8"));
    }

    #[tokio::test]
    async fn falls_back_to_socket_peer() {
        let mut request = Request::builder().body(()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([198, 51, 100, 4], 4000))));
        let info = extract(request).await;
        assert_eq!(info.ip_address.as_deref(), Some("198.51.100.4"));
        assert_eq!(info.ip_or_unknown(), "198.51.100.4");
    }
}
