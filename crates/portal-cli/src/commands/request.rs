//! `portal request`: send one API call through the authenticated pipeline.

use crate::runtime::Runtime;
use anyhow::Context;
use auth_pipeline::{DispatchOptions, Method};

pub async fn run(
    runtime: &Runtime,
    method: &str,
    path: &str,
    body: Option<&str>,
    skip_auth: bool,
) -> anyhow::Result<()> {
    let method = parse_method(method)?;
    let body = body
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()
        .context("request body is not valid JSON")?;

    let options = if skip_auth {
        DispatchOptions::unauthenticated()
    } else {
        DispatchOptions::default()
    };

    let response = runtime
        .session
        .api_client(runtime.api_base_url.clone())
        .send_raw(method, path, body.as_ref(), options)
        .await?;

    println!("{}", response.status);
    let text = response.text();
    if !text.is_empty() {
        println!("{}", text);
    }
    Ok(())
}

fn parse_method(method: &str) -> anyhow::Result<Method> {
    Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("invalid HTTP method: {}", method))
}
