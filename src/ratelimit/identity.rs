//! Client identity derivation.

use std::fmt;
use std::net::IpAddr;

use axum::http::HeaderMap;
use sha2::{Digest, Sha256};

/// Who a request is attributed to for rate limiting.
///
/// Credentials are never stored or logged in clear; only their SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClientIdentity {
    /// Hex SHA-256 of the presented credential.
    Credential(String),
    /// Client network address, or `unknown`.
    Address(String),
}

impl ClientIdentity {
    /// Derive the identity from request headers.
    ///
    /// The first non-empty header in `credential_headers` wins, with a
    /// `Bearer ` prefix stripped before hashing. Without a credential the
    /// first `X-Forwarded-For` hop is used, then the peer address.
    pub fn from_headers(headers: &HeaderMap, peer: Option<IpAddr>, credential_headers: &[String]) -> Self {
        let credential = credential_headers.iter().find_map(|name| {
            let raw = headers.get(name.as_str())?.to_str().ok()?.trim();
            let token = raw.strip_prefix("Bearer ").unwrap_or(raw).trim();
            (!token.is_empty()).then_some(token)
        });
        if let Some(token) = credential {
            return Self::from_credential(token);
        }

        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|hop| !hop.is_empty());
        match (forwarded, peer) {
            (Some(hop), _) => ClientIdentity::Address(hop.to_string()),
            (None, Some(ip)) => ClientIdentity::Address(ip.to_string()),
            (None, None) => ClientIdentity::Address("unknown".to_string()),
        }
    }

    pub fn from_credential(token: &str) -> Self {
        ClientIdentity::Credential(format!("{:x}", Sha256::digest(token.as_bytes())))
    }

    /// Low-cardinality label for metrics.
    pub fn auth_type(&self) -> &'static str {
        match self {
            ClientIdentity::Credential(_) => "api_key",
            ClientIdentity::Address(_) => "ip",
        }
    }
}

/// The key fragment used in bucket keys.
impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientIdentity::Credential(digest) => f.write_str(digest),
            ClientIdentity::Address(addr) => write!(f, "ip:{addr}"),
        }
    }
}
