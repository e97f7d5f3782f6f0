//! Raw HTTP transport seam.
//!
//! The dispatcher only needs "send this request, give me status + body", so
//! the transport is a trait; production uses reqwest, tests script
//! responses in memory.

use crate::error::{AuthError, AuthResult};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use url::Url;

/// An outgoing API request. Cloned for the single resend after a renewal.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl ApiRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: Url) -> Self {
        Self::new(Method::POST, url)
    }

    /// Set a JSON body and the matching content type.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> AuthResult<Self> {
        self.body = Some(serde_json::to_vec(body)?);
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(self)
    }

    /// Copy of this request carrying `Authorization: Bearer <token>`.
    /// Replaces any authorization header already present.
    pub fn with_bearer(&self, token: &str) -> AuthResult<Self> {
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| AuthError::InvalidRequest("access token is not a valid header value".into()))?;
        let mut request = self.clone();
        request.headers.insert(AUTHORIZATION, value);
        Ok(request)
    }

    /// Token from the authorization header, if it is a bearer credential.
    pub fn bearer_token(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)?
            .to_str()
            .ok()?
            .strip_prefix("Bearer ")
    }
}

/// A fully buffered API response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode the body as JSON. An empty body decodes as `null`, so `()` and
    /// `Option<T>` work for 204 responses.
    pub fn json<T: DeserializeOwned>(&self) -> AuthResult<T> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(serde_json::from_slice(b"null")?);
        }
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Human-readable error detail for a non-success response.
    pub fn error_message(&self) -> String {
        error_message(self.status, &self.body)
    }
}

/// Prefer a JSON `message` (or `error`) field, then the raw body, then the
/// status reason phrase.
pub(crate) fn error_message(status: StatusCode, body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        for field in ["message", "error"] {
            if let Some(message) = value.get(field).and_then(|v| v.as_str()) {
                return message.to_string();
            }
        }
    }

    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if !text.is_empty() {
        return text.to_string();
    }

    status
        .canonical_reason()
        .unwrap_or("Unknown error")
        .to_string()
}

/// Join a relative API path onto a base URL, keeping the base's path prefix
/// (`http://host/api` + `auth/login` -> `http://host/api/auth/login`).
pub fn join_url(base: &Url, path: &str) -> AuthResult<Url> {
    let joined = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Ok(Url::parse(&joined)?)
}

/// Sends one request and buffers the response.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> AuthResult<ApiResponse>;
}

/// reqwest-backed transport.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> AuthResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> AuthResult<ApiResponse> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::harness::spawn_stub_server;

    #[test]
    fn test_join_url_keeps_base_path() {
        let base = Url::parse("http://localhost:3000/api").unwrap();
        assert_eq!(
            join_url(&base, "auth/login").unwrap().as_str(),
            "http://localhost:3000/api/auth/login"
        );

        let trailing = Url::parse("http://localhost:3000/api/").unwrap();
        assert_eq!(
            join_url(&trailing, "/users/me").unwrap().as_str(),
            "http://localhost:3000/api/users/me"
        );
    }

    #[test]
    fn test_with_bearer_replaces_existing_header() {
        let request = ApiRequest::get(Url::parse("http://localhost/x").unwrap());
        assert_eq!(request.bearer_token(), None);

        let first = request.with_bearer("A1").unwrap();
        let second = first.with_bearer("A2").unwrap();
        assert_eq!(first.bearer_token(), Some("A1"));
        assert_eq!(second.bearer_token(), Some("A2"));
        assert_eq!(second.headers.get_all(AUTHORIZATION).iter().count(), 1);
    }

    #[test]
    fn test_with_bearer_rejects_invalid_token() {
        let request = ApiRequest::get(Url::parse("http://localhost/x").unwrap());
        assert!(matches!(
            request.with_bearer("bad\ntoken"),
            Err(AuthError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_error_message_prefers_json_message() {
        assert_eq!(
            error_message(StatusCode::BAD_REQUEST, br#"{"message":"email taken"}"#),
            "email taken"
        );
        assert_eq!(
            error_message(StatusCode::BAD_REQUEST, br#"{"error":"invalid_grant"}"#),
            "invalid_grant"
        );
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, b"upstream down"), "upstream down");
        assert_eq!(error_message(StatusCode::NOT_FOUND, b""), "Not Found");
    }

    #[test]
    fn test_empty_body_decodes_as_null() {
        let response = ApiResponse::new(StatusCode::NO_CONTENT, Vec::new());
        response.json::<()>().unwrap();
        let value: Option<serde_json::Value> = response.json().unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_reqwest_transport_round_trip() {
        let server = spawn_stub_server(vec![(201, r#"{"id":7}"#.to_string())]).await;
        let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();

        let request = ApiRequest::post(join_url(&server.base_url, "items").unwrap())
            .json(&serde_json::json!({ "name": "widget" }))
            .unwrap()
            .with_bearer("A1")
            .unwrap();
        let response = transport.send(request).await.unwrap();

        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(response.json::<serde_json::Value>().unwrap()["id"], 7);

        let captured = server.requests();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].method, "POST");
        assert_eq!(captured[0].path, "/items");
        assert_eq!(captured[0].header("authorization"), Some("Bearer A1"));
        assert_eq!(captured[0].body, r#"{"name":"widget"}"#);
    }

    #[tokio::test]
    async fn test_reqwest_transport_reports_unreachable_host() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let transport = ReqwestTransport::new(Duration::from_secs(2)).unwrap();
        let url = Url::parse(&format!("http://127.0.0.1:{}/x", port)).unwrap();
        let result = transport.send(ApiRequest::get(url)).await;
        assert!(matches!(result, Err(AuthError::Network(_))));
    }
}
