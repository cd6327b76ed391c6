use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::block::Block;
use super::chain::{Ledger, LedgerError};
use super::peers::PeerError;

/// Path on every node that serves its full chain
pub const CHAIN_PATH: &str = "/api/v1/chain";

/// A node's full chain as exchanged between peers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ChainResponse {
    /// The blocks in the chain, genesis first
    pub chain: Vec<Block>,

    /// The length of the chain
    pub length: usize,
}

impl ChainResponse {
    pub fn new(chain: Vec<Block>) -> Self {
        ChainResponse {
            length: chain.len(),
            chain,
        }
    }
}

/// Source of peer chains
#[async_trait]
pub trait ChainFetcher: Send + Sync {
    /// Fetches the chain reported by `peer` (a normalized `host:port`)
    async fn fetch_chain(&self, peer: &str) -> Result<ChainResponse, PeerError>;
}

#[async_trait]
impl ChainFetcher for Box<dyn ChainFetcher> {
    async fn fetch_chain(&self, peer: &str) -> Result<ChainResponse, PeerError> {
        (**self).fetch_chain(peer).await
    }
}

/// Fetches peer chains over HTTP
#[derive(Debug, Clone)]
pub struct HttpChainFetcher {
    client: reqwest::Client,
}

impl HttpChainFetcher {
    /// Creates a fetcher whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(HttpChainFetcher { client })
    }
}

#[async_trait]
impl ChainFetcher for HttpChainFetcher {
    async fn fetch_chain(&self, peer: &str) -> Result<ChainResponse, PeerError> {
        let url = format!("http://{}{}", peer, CHAIN_PATH);
        let unreachable = |err: reqwest::Error| PeerError::Unreachable {
            peer: peer.to_string(),
            reason: err.to_string(),
        };

        let response = self.client.get(&url).send().await.map_err(unreachable)?;

        if !response.status().is_success() {
            return Err(PeerError::BadStatus {
                peer: peer.to_string(),
                status: response.status().as_u16(),
            });
        }

        response.json::<ChainResponse>().await.map_err(unreachable)
    }
}

/// Longest-valid-chain consensus
///
/// A peer's chain wins only if it is strictly longer than every other
/// candidate and the local chain, and it passes full validation.
#[derive(Debug)]
pub struct Resolver<F> {
    fetcher: F,
}

impl<F: ChainFetcher> Resolver<F> {
    pub fn new(fetcher: F) -> Self {
        Resolver { fetcher }
    }

    /// Resolves conflicts between the local chain and the chains of `peers`
    ///
    /// All peers are queried concurrently and the decision is taken only
    /// once every response is in. Unreachable peers and invalid chains are
    /// skipped.
    ///
    /// # Returns
    ///
    /// true if the local chain was replaced, false otherwise
    pub async fn resolve(&self, ledger: &Ledger, peers: &[String]) -> bool {
        if peers.is_empty() {
            debug!("No peers registered, nothing to resolve");
            return false;
        }

        let responses = join_all(peers.iter().map(|peer| async move {
            (peer, self.fetcher.fetch_chain(peer).await)
        }))
        .await;

        let mut max_length = ledger.len();
        let mut best_candidate: Option<(&String, Vec<Block>)> = None;
        let mut unreachable = 0;
        let mut rejected = 0;

        for (peer, result) in responses {
            let response = match result {
                Ok(response) => response,
                Err(err) => {
                    warn!("Skipping peer {}: {}", peer, err);
                    unreachable += 1;
                    continue;
                }
            };

            if response.length <= max_length {
                debug!(
                    "Peer {} chain of length {} is not longer than {}",
                    peer, response.length, max_length
                );
                continue;
            }

            if let Err(err) = check_candidate(ledger, &response) {
                warn!("Discarding chain from peer {}: {}", peer, err);
                rejected += 1;
                continue;
            }

            max_length = response.length;
            best_candidate = Some((peer, response.chain));
        }

        info!(
            "Queried {} peers ({} unreachable, {} rejected)",
            peers.len(),
            unreachable,
            rejected
        );

        let (peer, chain) = match best_candidate {
            Some(candidate) => candidate,
            None => return false,
        };

        if ledger.replace_chain(chain) {
            info!("Replaced local chain with chain of length {} from peer {}", max_length, peer);
            true
        } else {
            info!("Local chain grew during resolution, keeping it");
            false
        }
    }
}

/// Validates a peer's payload before it may replace the local chain
fn check_candidate(ledger: &Ledger, response: &ChainResponse) -> Result<(), LedgerError> {
    if response.length != response.chain.len() {
        return Err(LedgerError::InvalidChain(format!(
            "reported length {} but sent {} blocks",
            response.length,
            response.chain.len()
        )));
    }

    ledger.check_chain(&response.chain)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::blockchain::chain::DEFAULT_MINING_REWARD;
    use crate::blockchain::pow::ProofOfWork;

    const DIFFICULTY: usize = 1;

    /// Serves canned chains; peers without an entry are unreachable
    #[derive(Default)]
    struct StaticFetcher {
        chains: HashMap<String, ChainResponse>,
        calls: AtomicUsize,
    }

    impl StaticFetcher {
        fn with(mut self, peer: &str, response: ChainResponse) -> Self {
            self.chains.insert(peer.to_string(), response);
            self
        }
    }

    #[async_trait]
    impl ChainFetcher for StaticFetcher {
        async fn fetch_chain(&self, peer: &str) -> Result<ChainResponse, PeerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.chains.get(peer).cloned().ok_or_else(|| PeerError::Unreachable {
                peer: peer.to_string(),
                reason: "connection refused".to_string(),
            })
        }
    }

    fn ledger_with_length(length: usize) -> Ledger {
        let ledger = Ledger::new(ProofOfWork::new(DIFFICULTY), DEFAULT_MINING_REWARD);
        let token = CancellationToken::new();
        while ledger.len() < length {
            ledger.new_transaction("A", "B", ledger.len() as f64);
            ledger.mine("node", &token).unwrap();
        }
        ledger
    }

    fn peers(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[tokio::test]
    async fn test_decoded_chain_with_full_precision_amounts_validates() {
        let remote = Ledger::new(ProofOfWork::new(DIFFICULTY), DEFAULT_MINING_REWARD);
        let token = CancellationToken::new();
        remote.new_transaction("A", "B", 394301.33835633675);
        remote.mine("node", &token).unwrap();
        remote.new_transaction("B", "C", 0.1 + 0.2);
        remote.mine("node", &token).unwrap();
        assert!(remote.is_valid());

        let wire = serde_json::to_string(&ChainResponse::new(remote.get_chain())).unwrap();
        let decoded: ChainResponse = serde_json::from_str(&wire).unwrap();

        assert_eq!(decoded.chain, remote.get_chain());
        assert!(remote.validate_chain(&decoded.chain));

        let local = ledger_with_length(1);
        let resolver = Resolver::new(StaticFetcher::default().with("l2:5000", decoded));
        assert!(resolver.resolve(&local, &peers(&["l2:5000"])).await);
        assert_eq!(local.get_chain(), remote.get_chain());
    }

    #[tokio::test]
    async fn test_longer_valid_chain_replaces_local() {
        let local = ledger_with_length(3);
        let remote = ledger_with_length(5);
        let resolver = Resolver::new(StaticFetcher::default().with("l2:5000", ChainResponse::new(remote.get_chain())));

        assert!(resolver.resolve(&local, &peers(&["l2:5000"])).await);
        assert_eq!(local.get_chain(), remote.get_chain());
    }

    #[tokio::test]
    async fn test_shorter_chain_does_not_replace() {
        let l1 = ledger_with_length(3);
        let l2 = ledger_with_length(5);
        let before = l2.get_chain();
        let resolver = Resolver::new(StaticFetcher::default().with("l1:5000", ChainResponse::new(l1.get_chain())));

        assert!(!resolver.resolve(&l2, &peers(&["l1:5000"])).await);
        assert_eq!(l2.get_chain(), before);
    }

    #[tokio::test]
    async fn test_equal_length_chains_never_replace() {
        let local = ledger_with_length(4);
        let before = local.get_chain();
        let resolver = Resolver::new(
            StaticFetcher::default()
                .with("a:1", ChainResponse::new(ledger_with_length(4).get_chain()))
                .with("b:1", ChainResponse::new(ledger_with_length(4).get_chain()))
                .with("c:1", ChainResponse::new(ledger_with_length(2).get_chain())),
        );

        assert!(!resolver.resolve(&local, &peers(&["a:1", "b:1", "c:1"])).await);
        assert_eq!(local.get_chain(), before);
    }

    #[tokio::test]
    async fn test_invalid_longer_chain_is_discarded() {
        let local = ledger_with_length(2);
        let mut tampered = ledger_with_length(6).get_chain();
        tampered[2].previous_hash = "forged".to_string();
        let valid = ledger_with_length(4).get_chain();

        let resolver = Resolver::new(
            StaticFetcher::default()
                .with("bad:1", ChainResponse::new(tampered))
                .with("good:1", ChainResponse::new(valid.clone())),
        );

        assert!(resolver.resolve(&local, &peers(&["bad:1", "good:1"])).await);
        assert_eq!(local.get_chain(), valid);
    }

    #[tokio::test]
    async fn test_longest_of_all_candidates_wins() {
        let local = ledger_with_length(2);
        let longest = ledger_with_length(6).get_chain();

        let resolver = Resolver::new(
            StaticFetcher::default()
                .with("a:1", ChainResponse::new(ledger_with_length(4).get_chain()))
                .with("b:1", ChainResponse::new(longest.clone()))
                .with("c:1", ChainResponse::new(ledger_with_length(5).get_chain())),
        );

        assert!(resolver.resolve(&local, &peers(&["a:1", "b:1", "c:1"])).await);
        assert_eq!(local.get_chain(), longest);
    }

    #[tokio::test]
    async fn test_unreachable_peers_are_skipped() {
        let local = ledger_with_length(2);
        let remote = ledger_with_length(3).get_chain();
        let fetcher = StaticFetcher::default().with("up:1", ChainResponse::new(remote.clone()));
        let resolver = Resolver::new(fetcher);

        assert!(resolver.resolve(&local, &peers(&["down:1", "up:1", "down:2"])).await);
        assert_eq!(local.get_chain(), remote);
        assert_eq!(resolver.fetcher.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_misreported_length_is_discarded() {
        let local = ledger_with_length(2);
        let before = local.get_chain();
        let mut response = ChainResponse::new(ledger_with_length(2).get_chain());
        response.length = 10;

        let resolver = Resolver::new(StaticFetcher::default().with("liar:1", response));

        assert!(!resolver.resolve(&local, &peers(&["liar:1"])).await);
        assert_eq!(local.get_chain(), before);
    }

    #[tokio::test]
    async fn test_no_peers() {
        let local = ledger_with_length(1);
        let resolver = Resolver::new(StaticFetcher::default());

        assert!(!resolver.resolve(&local, &[]).await);
        assert_eq!(resolver.fetcher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(local.len(), 1);
    }

    #[tokio::test]
    async fn test_http_fetcher_unreachable_peer() {
        let fetcher = HttpChainFetcher::new(Duration::from_secs(2)).unwrap();

        let result = fetcher.fetch_chain("127.0.0.1:1").await;

        assert!(matches!(result, Err(PeerError::Unreachable { .. })));
    }
}
