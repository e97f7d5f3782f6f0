//! Auth backend endpoints: login, refresh and logout.

use crate::error::{AuthError, AuthResult};
use crate::transport::{error_message, join_url};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Successful login response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginGrant {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    #[serde(default)]
    pub user: serde_json::Value,
}

/// Successful refresh response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshGrant {
    pub access_token: String,
    pub expires_in: i64,
}

#[derive(Serialize)]
struct LoginBody<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshBody<'a> {
    refresh_token: &'a str,
}

/// The three auth endpoints the pipeline talks to.
///
/// These calls never carry an access token and never go through the
/// request dispatcher, so a failing refresh cannot recurse into another
/// refresh.
#[async_trait]
pub trait AuthGateway: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> AuthResult<LoginGrant>;

    async fn refresh(&self, refresh_token: &str) -> AuthResult<RefreshGrant>;

    async fn logout(&self, refresh_token: &str) -> AuthResult<()>;
}

/// HTTP implementation posting JSON to `{base}/auth/*`.
pub struct HttpAuthGateway {
    client: Client,
    base_url: Url,
}

impl HttpAuthGateway {
    pub fn new(base_url: Url, timeout: Duration) -> AuthResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    pub fn with_client(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> AuthResult<reqwest::Response> {
        let url = join_url(&self.base_url, path)?;
        debug!(url = %url, "Calling auth endpoint");
        Ok(self.client.post(url).json(body).send().await?)
    }
}

async fn failure(response: reqwest::Response) -> (StatusCode, String) {
    let status = response.status();
    let body = response.bytes().await.unwrap_or_default();
    (status, error_message(status, &body))
}

#[async_trait]
impl AuthGateway for HttpAuthGateway {
    async fn login(&self, email: &str, password: &str) -> AuthResult<LoginGrant> {
        let response = self
            .post("auth/login", &LoginBody { email, password })
            .await?;

        if !response.status().is_success() {
            let (status, message) = failure(response).await;
            warn!(status = status.as_u16(), "Login rejected");
            return Err(match status {
                StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    AuthError::InvalidCredentials(message)
                }
                _ => AuthError::Api {
                    status: status.as_u16(),
                    message,
                },
            });
        }

        let grant: LoginGrant = response.json().await?;
        info!(expires_in = grant.expires_in, "Login succeeded");
        Ok(grant)
    }

    async fn refresh(&self, refresh_token: &str) -> AuthResult<RefreshGrant> {
        let response = self
            .post("auth/refresh", &RefreshBody { refresh_token })
            .await?;

        if !response.status().is_success() {
            let (status, message) = failure(response).await;
            return Err(AuthError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }

    async fn logout(&self, refresh_token: &str) -> AuthResult<()> {
        let response = self
            .post("auth/logout", &RefreshBody { refresh_token })
            .await?;

        if !response.status().is_success() {
            let (status, message) = failure(response).await;
            return Err(AuthError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }
}
