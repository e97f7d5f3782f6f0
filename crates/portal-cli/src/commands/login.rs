//! `portal login` and `portal oauth`.

use crate::runtime::Runtime;
use auth_pipeline::OAuthCallbackServer;
use auth_pipeline::DEFAULT_OAUTH_TIMEOUT;
use credential_storage::CredentialRecord;

pub async fn run(
    runtime: &Runtime,
    email: &str,
    password: &str,
    remember_me: bool,
) -> anyhow::Result<()> {
    let record = runtime.session.login(email, password, remember_me).await?;
    report(&record, remember_me);
    Ok(())
}

pub async fn run_oauth(runtime: &Runtime, remember_me: bool) -> anyhow::Result<()> {
    let listener = OAuthCallbackServer::new(runtime.config.oauth_callback_port, DEFAULT_OAUTH_TIMEOUT)
        .bind()
        .await?;

    println!("Open this URL in your browser to sign in:");
    println!("  {}", listener.auth_url(&runtime.api_base_url)?);

    let result = listener.wait().await?;
    let record = runtime.session.complete_oauth(result, remember_me)?;
    report(&record, remember_me);
    Ok(())
}

fn report(record: &CredentialRecord, remember_me: bool) {
    let who = record
        .subject
        .get("email")
        .and_then(|v| v.as_str())
        .unwrap_or("user");
    println!("Logged in as {} (token valid until {})", who, record.expires_at.to_rfc3339());

    if !remember_me {
        println!("Session not remembered; pass --remember-me to keep it after this command exits.");
    }
}
