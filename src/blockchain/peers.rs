use dashmap::DashSet;
use log::{debug, info};
use thiserror::Error;
use url::Url;

/// Errors that can occur when dealing with peers
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("Invalid peer address {0:?}: {1}")]
    InvalidAddress(String, String),

    #[error("Peer {peer} unreachable: {reason}")]
    Unreachable { peer: String, reason: String },

    #[error("Peer {peer} answered with status {status}")]
    BadStatus { peer: String, status: u16 },
}

/// Normalizes a peer URL to its `host:port` form
///
/// Addresses without a scheme (`192.168.0.5:5000`) are read as `http://`.
/// The port defaults to the scheme's well-known port when omitted.
pub fn normalize_address(address: &str) -> Result<String, PeerError> {
    let trimmed = address.trim();
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };

    let invalid = |reason: &str| PeerError::InvalidAddress(address.to_string(), reason.to_string());

    let url = Url::parse(&with_scheme).map_err(|e| invalid(&e.to_string()))?;
    let host = url.host_str().filter(|host| !host.is_empty()).ok_or_else(|| invalid("missing host"))?;
    let port = url.port_or_known_default().ok_or_else(|| invalid("missing port"))?;

    Ok(format!("{}:{}", host, port))
}

/// The set of known peer nodes
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: DashSet<String>,
}

impl PeerRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        PeerRegistry::default()
    }

    /// Registers a peer, returning its normalized address
    ///
    /// Registering an address that is already known is a no-op.
    pub fn register(&self, address: &str) -> Result<String, PeerError> {
        let normalized = normalize_address(address)?;
        self.insert(&normalized);
        Ok(normalized)
    }

    /// Registers a batch of peers
    ///
    /// Nothing is registered unless every address is valid.
    pub fn register_all<S: AsRef<str>>(&self, addresses: &[S]) -> Result<Vec<String>, PeerError> {
        let normalized = addresses
            .iter()
            .map(|address| normalize_address(address.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        for address in &normalized {
            self.insert(address);
        }

        Ok(normalized)
    }

    fn insert(&self, normalized: &str) {
        if self.peers.insert(normalized.to_string()) {
            info!("Registered peer {}", normalized);
        } else {
            debug!("Peer {} already registered", normalized);
        }
    }

    /// Lists the known peers, in no particular order
    pub fn list(&self) -> Vec<String> {
        self.peers.iter().map(|peer| peer.key().clone()).collect()
    }
}
