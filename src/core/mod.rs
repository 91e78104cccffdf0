//! Session and token lifecycle engine

pub mod auth;
pub mod config;
pub mod db;
pub mod ratelimit;
pub mod telemetry;
