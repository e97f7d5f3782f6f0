//! JSON convenience client over the request dispatcher.

use crate::dispatcher::{DispatchOptions, RequestDispatcher};
use crate::error::{AuthError, AuthResult};
use crate::transport::{join_url, ApiRequest, ApiResponse};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use url::Url;

/// Typed JSON calls against the API base URL. Every call goes through the
/// dispatcher, so tokens are attached and renewed transparently.
#[derive(Clone)]
pub struct ApiClient {
    dispatcher: Arc<RequestDispatcher>,
    base_url: Url,
}

impl ApiClient {
    pub fn new(dispatcher: Arc<RequestDispatcher>, base_url: Url) -> Self {
        Self {
            dispatcher,
            base_url,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> AuthResult<T> {
        self.call(Method::GET, path, None::<&()>).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> AuthResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.call(Method::POST, path, Some(body)).await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> AuthResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.call(Method::PUT, path, Some(body)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> AuthResult<T> {
        self.call(Method::DELETE, path, None::<&()>).await
    }

    /// Send an arbitrary request and hand back the raw response, whatever
    /// its status.
    pub async fn send_raw(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        options: DispatchOptions,
    ) -> AuthResult<ApiResponse> {
        let request = self.build(method, path, body)?;
        self.dispatcher.dispatch(request, options).await
    }

    async fn call<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> AuthResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.build(method, path, body)?;
        let response = self
            .dispatcher
            .dispatch(request, DispatchOptions::default())
            .await?;

        if !response.is_success() {
            return Err(AuthError::Api {
                status: response.status.as_u16(),
                message: response.error_message(),
            });
        }

        response.json()
    }

    fn build<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> AuthResult<ApiRequest> {
        let request = ApiRequest::new(method, join_url(&self.base_url, path)?);
        match body {
            Some(body) => request.json(body),
            None => Ok(request),
        }
    }
}
