//! Client identity derivation
//!
//! Rate-limit buckets are keyed by client identity. Behind a reverse proxy
//! the connection address is the proxy's, so by default the first hop of
//! `X-Forwarded-For` wins, then `X-Real-IP`, then the connection address.
//! Deployments not behind a trusted proxy switch to
//! [`ProxyTrust::ConnectionOnly`], since those headers are client-controlled.

use std::fmt;
use std::net::SocketAddr;

use axum::http::HeaderMap;

const FORWARDED_FOR: &str = "x-forwarded-for";
const REAL_IP: &str = "x-real-ip";
const UNKNOWN_CLIENT: &str = "unknown";

/// Whether proxy headers are trusted for client identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProxyTrust {
    #[default]
    TrustHeaders,
    ConnectionOnly,
}

impl ProxyTrust {
    pub fn from_flag(trust_proxy_headers: bool) -> Self {
        if trust_proxy_headers {
            ProxyTrust::TrustHeaders
        } else {
            ProxyTrust::ConnectionOnly
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Derive the identity of a request's sender
    pub fn from_request(headers: &HeaderMap, remote: Option<SocketAddr>, trust: ProxyTrust) -> Self {
        if trust == ProxyTrust::TrustHeaders
            && let Some(ip) = forwarded_client_ip(headers)
        {
            return Self(ip);
        }

        match remote {
            Some(addr) => Self(addr.ip().to_string()),
            None => Self(UNKNOWN_CLIENT.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn forwarded_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get(FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(ip) = forwarded {
        return Some(ip.to_string());
    }

    headers
        .get(REAL_IP)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
