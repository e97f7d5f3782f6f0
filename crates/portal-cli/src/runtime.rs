//! Wiring from configuration to a ready session manager.

use anyhow::Context;
use auth_pipeline::{
    AuthGateway, HttpAuthGateway, HttpTransport, ReqwestTransport, SessionManager,
    SessionSettings,
};
use credential_storage::create_credential_store;
use portal_config_and_utils::{Config, Paths};
use std::sync::Arc;
use tracing::warn;
use url::Url;

pub struct Runtime {
    pub config: Config,
    pub api_base_url: Url,
    pub session: SessionManager,
}

impl Runtime {
    pub fn build(config: Config, paths: Paths) -> anyhow::Result<Self> {
        let api_base_url = config.api_base_url()?;
        let store = Arc::new(create_credential_store(paths.credentials_file()));

        let gateway: Arc<dyn AuthGateway> = Arc::new(
            HttpAuthGateway::new(api_base_url.clone(), config.request_timeout())
                .context("building auth client")?,
        );
        let transport: Arc<dyn HttpTransport> = Arc::new(
            ReqwestTransport::new(config.request_timeout()).context("building API client")?,
        );

        let session = SessionManager::new(
            store,
            gateway,
            transport,
            SessionSettings {
                renew_threshold: config.renew_threshold(),
                logout_timeout: config.logout_timeout(),
            },
        );

        session.set_state_callback(Box::new(|payload| {
            if payload.session_ended {
                warn!(
                    reason = payload.reason.as_deref().unwrap_or("unknown"),
                    "Session ended, log in again"
                );
            }
        }));
        session.restore_session();

        Ok(Self {
            config,
            api_base_url,
            session,
        })
    }
}
