//! Pipeline tests over the mock gateway and transport.
//!
//! - `harness.rs`             - Mocks, the wired-up harness and a stub HTTP server
//! - `single_flight.rs`       - Concurrent 401s share one refresh call
//! - `failure_propagation.rs` - A failed renewal reaches every waiter and clears both scopes
//! - `proactive.rs`           - Renewal ahead of expiry, and its non-fatal failure
//! - `retry_limit.rs`         - One renewal and one resend per request, at most
//! - `session_flows.rs`       - Login, OAuth completion, logout, restore and status

mod proactive;
