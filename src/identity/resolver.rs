//! Derives the rate limit identity of a request from its origin.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::IdentityConfig;

/// The string that attributes a request to one rate limit bucket.
///
/// Always non-empty. Clients sharing an egress address (NAT, proxies that are
/// not trusted) share an identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    /// Build an identity, refusing blank strings.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else if trimmed.len() == value.len() {
            Some(Self(value))
        } else {
            Some(Self(trimmed.to_string()))
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

/// Origin metadata of one incoming request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Address of the connected peer
    pub peer_addr: Option<SocketAddr>,
    /// Raw `X-Forwarded-For` header value
    pub forwarded_for: Option<String>,
    /// Raw `X-Real-IP` header value
    pub real_ip: Option<String>,
}

impl RequestContext {
    /// A context with only the peer address known.
    pub fn from_peer(peer_addr: SocketAddr) -> Self {
        Self {
            peer_addr: Some(peer_addr),
            ..Self::default()
        }
    }

    pub fn with_forwarded_for(mut self, value: impl Into<String>) -> Self {
        self.forwarded_for = Some(value.into());
        self
    }

    pub fn with_real_ip(mut self, value: impl Into<String>) -> Self {
        self.real_ip = Some(value.into());
        self
    }
}

type Observer = Arc<dyn Fn(&ClientIdentity) + Send + Sync>;

/// Resolves a [`ClientIdentity`] for each request.
///
/// The peer IP address is the identity. Forwarding headers are consulted
/// first only when configured as trusted. Requests without any usable address
/// all map to the fallback identity.
#[derive(Clone)]
pub struct IdentityResolver {
    trust_forwarded_headers: bool,
    fallback: ClientIdentity,
    observer: Option<Observer>,
}

impl IdentityResolver {
    /// Create a resolver from its configuration section.
    ///
    /// A blank fallback is replaced by `"unknown"`.
    pub fn new(config: &IdentityConfig) -> Self {
        let fallback = ClientIdentity::new(config.fallback.as_str())
            .unwrap_or_else(|| ClientIdentity("unknown".to_string()));
        Self {
            trust_forwarded_headers: config.trust_forwarded_headers,
            fallback,
            observer: None,
        }
    }

    /// Register a callback that receives every resolved identity.
    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&ClientIdentity) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// The identity used when no client address is available.
    pub fn fallback(&self) -> &ClientIdentity {
        &self.fallback
    }

    /// Derive the identity of a request.
    pub fn resolve(&self, ctx: &RequestContext) -> ClientIdentity {
        let identity = self
            .forwarded_identity(ctx)
            .or_else(|| ctx.peer_addr.map(|addr| ClientIdentity(addr.ip().to_string())))
            .unwrap_or_else(|| {
                warn!(
                    fallback = %self.fallback,
                    "No client address available, using fallback identity"
                );
                self.fallback.clone()
            });

        debug!(identity = %identity, "Resolved client identity");
        if let Some(observer) = &self.observer {
            observer(&identity);
        }
        identity
    }

    fn forwarded_identity(&self, ctx: &RequestContext) -> Option<ClientIdentity> {
        if !self.trust_forwarded_headers {
            return None;
        }

        // The left-most X-Forwarded-For entry is the original client.
        ctx.forwarded_for
            .as_deref()
            .and_then(|value| value.split(',').next())
            .and_then(ClientIdentity::new)
            .or_else(|| ctx.real_ip.as_deref().and_then(ClientIdentity::new))
    }
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::new(&IdentityConfig::default())
    }
}

impl fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityResolver")
            .field("trust_forwarded_headers", &self.trust_forwarded_headers)
            .field("fallback", &self.fallback)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}
