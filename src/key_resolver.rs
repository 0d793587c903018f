//! Identity keys for rate limiting.

use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request};
use std::net::SocketAddr;

/// Authenticated identity attached to a request by an upstream auth layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal(pub String);

impl Principal {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

/// Derives the key a request is counted under.
///
/// `user:<principal>` when an authenticated principal is present, otherwise
/// `ip:<remote address>`. Requests without any usable address all share the
/// `ip:unknown` bucket.
#[derive(Debug, Clone, Default)]
pub struct KeyResolver {
    trust_forwarded_headers: bool,
}

impl KeyResolver {
    pub fn new(trust_forwarded_headers: bool) -> Self {
        Self {
            trust_forwarded_headers,
        }
    }

    pub fn resolve<B>(&self, request: &Request<B>) -> String {
        if let Some(principal) = request.extensions().get::<Principal>() {
            if !principal.name().is_empty() {
                return format!("user:{}", principal.name());
            }
        }

        match self.client_address(request) {
            Some(address) => format!("ip:{}", address),
            None => "ip:unknown".to_string(),
        }
    }

    /// Remote address of the client, as seen by this process
    pub fn client_address<B>(&self, request: &Request<B>) -> Option<String> {
        if self.trust_forwarded_headers {
            if let Some(ip) = forwarded_ip(request.headers()) {
                return Some(ip);
            }
        }

        if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
            return Some(addr.ip().to_string());
        }

        request
            .extensions()
            .get::<SocketAddr>()
            .map(|addr| addr.ip().to_string())
    }
}

fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    let from_forwarded_for = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    let from_real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
    };

    from_forwarded_for.or_else(from_real_ip).map(str::to_string)
}
