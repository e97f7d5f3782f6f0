//! Subcommand implementations.

pub mod login;
pub mod logout;
pub mod request;
pub mod status;
