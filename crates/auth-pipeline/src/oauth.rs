//! Loopback callback server for browser-based login.
//!
//! The CLI opens `{api}/auth/cli?callback=http://localhost:<port>/callback`
//! in a browser; the backend finishes the login and redirects to the
//! callback with the token pair in the query string.

use crate::error::{AuthError, AuthResult};
use crate::gateway::LoginGrant;
use crate::transport::join_url;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, error, info};
use url::Url;

/// Default OAuth callback port.
pub const DEFAULT_OAUTH_PORT: u16 = 9876;

/// Default time to wait for the browser to come back.
pub const DEFAULT_OAUTH_TIMEOUT: Duration = Duration::from_secs(120);

/// Default access token lifetime when the callback omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// OAuth callback result.
#[derive(Debug, Clone, PartialEq)]
pub struct OAuthResult {
    pub success: bool,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    /// User payload, passed through to the credential record.
    pub subject: serde_json::Value,
    pub error: Option<String>,
}

impl OAuthResult {
    pub fn success(
        access_token: String,
        refresh_token: String,
        expires_in: i64,
        subject: serde_json::Value,
    ) -> Self {
        Self {
            success: true,
            access_token: Some(access_token),
            refresh_token: Some(refresh_token),
            expires_in: Some(expires_in),
            subject,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            access_token: None,
            refresh_token: None,
            expires_in: None,
            subject: serde_json::Value::Null,
            error: Some(error.into()),
        }
    }

    /// Convert into the same shape a password login returns.
    pub fn into_grant(self) -> AuthResult<LoginGrant> {
        if !self.success {
            return Err(AuthError::OAuth(
                self.error.unwrap_or_else(|| "authentication failed".to_string()),
            ));
        }

        match (self.access_token, self.refresh_token) {
            (Some(access_token), Some(refresh_token)) => Ok(LoginGrant {
                access_token,
                refresh_token,
                expires_in: self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS),
                user: self.subject,
            }),
            _ => Err(AuthError::OAuth("callback carried no token pair".to_string())),
        }
    }

    fn from_query(params: &HashMap<String, String>) -> Self {
        if let Some(error) = params.get("error") {
            return Self::failure(error.clone());
        }

        let (Some(access_token), Some(refresh_token)) =
            (params.get("access_token"), params.get("refresh_token"))
        else {
            return Self::failure("Missing required parameters");
        };

        let expires_in = params
            .get("expires_in")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_EXPIRES_IN_SECS);

        Self::success(
            access_token.clone(),
            refresh_token.clone(),
            expires_in,
            subject_from_query(params),
        )
    }
}

/// `user` as a JSON document if present, otherwise built from
/// `user_id`/`email`.
fn subject_from_query(params: &HashMap<String, String>) -> serde_json::Value {
    if let Some(user) = params
        .get("user")
        .and_then(|raw| serde_json::from_str::<serde_json::Value>(raw).ok())
    {
        return user;
    }

    let mut subject = serde_json::Map::new();
    if let Some(id) = params.get("user_id") {
        subject.insert("id".to_string(), serde_json::Value::String(id.clone()));
    }
    if let Some(email) = params.get("email") {
        subject.insert("email".to_string(), serde_json::Value::String(email.clone()));
    }

    if subject.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::Value::Object(subject)
    }
}

/// OAuth callback server configuration.
pub struct OAuthCallbackServer {
    port: u16,
    timeout: Duration,
}

impl OAuthCallbackServer {
    /// Port 0 binds an ephemeral port.
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self { port, timeout }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_OAUTH_PORT, DEFAULT_OAUTH_TIMEOUT)
    }

    pub async fn bind(&self) -> AuthResult<CallbackListener> {
        let addr = format!("127.0.0.1:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| AuthError::OAuth(format!("Failed to bind to {}: {}", addr, e)))?;
        let port = listener.local_addr()?.port();

        info!(port, "OAuth callback server listening");
        Ok(CallbackListener {
            listener,
            port,
            timeout: self.timeout,
        })
    }
}

/// A bound callback server waiting for the browser redirect.
pub struct CallbackListener {
    listener: TcpListener,
    port: u16,
    timeout: Duration,
}

impl CallbackListener {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn callback_url(&self) -> String {
        format!("http://localhost:{}/callback", self.port)
    }

    /// Browser URL that starts the login and redirects back here.
    pub fn auth_url(&self, api_base_url: &Url) -> AuthResult<Url> {
        let mut url = join_url(api_base_url, "auth/cli")?;
        url.query_pairs_mut()
            .append_pair("callback", &self.callback_url());
        Ok(url)
    }

    /// Serve until one callback arrives or the timeout elapses.
    pub async fn wait(self) -> AuthResult<OAuthResult> {
        let (tx, rx) = oneshot::channel::<OAuthResult>();
        let tx = Arc::new(tokio::sync::Mutex::new(Some(tx)));
        let listener = self.listener;

        let server_handle = tokio::spawn({
            let tx = tx.clone();
            async move {
                loop {
                    match listener.accept().await {
                        Ok((mut socket, _)) => {
                            let tx = tx.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(&mut socket, tx).await {
                                    error!(error = %e, "Error handling OAuth callback connection");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "OAuth callback accept error");
                            break;
                        }
                    }
                }
            }
        });

        let result = tokio::time::timeout(self.timeout, rx).await;
        server_handle.abort();

        match result {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Err(AuthError::OAuth("callback channel closed".to_string())),
            Err(_) => Err(AuthError::Timeout),
        }
    }
}

async fn handle_connection(
    socket: &mut tokio::net::TcpStream,
    tx: Arc<tokio::sync::Mutex<Option<oneshot::Sender<OAuthResult>>>>,
) -> AuthResult<()> {
    let (reader, mut writer) = socket.split();
    let mut reader = BufReader::new(reader);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;

    debug!(request = %request_line.trim(), "Received OAuth callback request");

    // GET /callback?... HTTP/1.1
    let Some(target) = request_line.strip_prefix("GET ") else {
        send_response(&mut writer, 405, "Method Not Allowed", "Method Not Allowed").await?;
        return Ok(());
    };
    let target = target.split(' ').next().unwrap_or_default();

    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    if path != "/callback" {
        send_response(&mut writer, 404, "Not Found", "Not Found").await?;
        return Ok(());
    }

    let params: HashMap<String, String> = url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();
    let result = OAuthResult::from_query(&params);

    let page = match &result.error {
        Some(err) => error_page(err),
        None => success_page(),
    };
    send_response(&mut writer, 200, "OK", &page).await?;

    if let Some(tx) = tx.lock().await.take() {
        let _ = tx.send(result);
    }

    Ok(())
}

async fn send_response(
    writer: &mut tokio::net::tcp::WriteHalf<'_>,
    status_code: u16,
    status_text: &str,
    body: &str,
) -> AuthResult<()> {
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_code,
        status_text,
        body.len(),
        body
    );
    writer.write_all(response.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

fn success_page() -> String {
    r#"<!DOCTYPE html>
<html>
<head><title>Portal - Signed In</title></head>
<body style="font-family: system-ui; text-align: center; padding: 50px;">
<h1>Signed in</h1>
<p>You can close this window and return to the terminal.</p>
<script>setTimeout(() => window.close(), 2000);</script>
</body>
</html>"#
        .to_string()
}

fn error_page(error: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Portal - Sign In Failed</title></head>
<body style="font-family: system-ui; text-align: center; padding: 50px;">
<h1>Sign in failed</h1>
<p>Error: {}</p>
<p>You can close this window and try again.</p>
</body>
</html>"#,
        escape_html(error)
    )
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
