//! `portal logout`.

use crate::runtime::Runtime;

pub async fn run(runtime: &Runtime) -> anyhow::Result<()> {
    runtime.session.logout().await;
    println!("Logged out");
    Ok(())
}
