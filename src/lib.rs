//! Gatekeeper - authentication session and token lifecycle service
//!
//! Verifies credentials, issues short-lived JWT access tokens paired with
//! opaque rotating refresh sessions, and throttles callers per client.

pub mod core;
