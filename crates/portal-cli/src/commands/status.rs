//! `portal status`.

use crate::runtime::Runtime;
use auth_pipeline::AuthStatus;

pub fn run(runtime: &Runtime) -> anyhow::Result<()> {
    println!("{}", describe(&runtime.session.status()));
    Ok(())
}

fn describe(status: &AuthStatus) -> String {
    match status {
        AuthStatus::LoggedIn {
            subject,
            expires_at,
            scope,
        } => {
            let who = subject
                .get("email")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown user");
            format!(
                "Logged in as {} ({} session, token valid until {})",
                who,
                scope.as_str(),
                expires_at.to_rfc3339()
            )
        }
        AuthStatus::Expired { scope } => format!(
            "Access token expired ({} session); the next request will try to renew it",
            scope.as_str()
        ),
        AuthStatus::NotLoggedIn => "Not logged in".to_string(),
    }
}
