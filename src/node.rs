use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::blockchain::{
    Block, ChainFetcher, ChainResponse, HttpChainFetcher, Ledger, LedgerError, PeerError, PeerRegistry,
    ProofOfWork, Resolver,
};
use crate::config::NodeConfig;

/// Errors surfaced by node operations
#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Mining timed out after {0:?}")]
    MiningTimedOut(Duration),

    #[error("Node is shutting down")]
    ShuttingDown,

    #[error("Mining task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A ledger node: the ledger plus everything needed to mine and to agree
/// with its peers
pub struct Node {
    /// Identifier credited with mining rewards
    node_id: String,

    ledger: Arc<Ledger>,

    peers: PeerRegistry,

    resolver: Resolver<Box<dyn ChainFetcher>>,

    mining_timeout: Option<Duration>,

    /// Cancelled once on shutdown; interrupts mining and background sync
    shutdown: CancellationToken,
}

impl Node {
    /// Creates a node fetching peer chains with `fetcher`
    pub fn new(config: &NodeConfig, fetcher: impl ChainFetcher + 'static) -> Self {
        let fetcher: Box<dyn ChainFetcher> = Box::new(fetcher);
        let node = Node {
            node_id: config.node_id.clone(),
            ledger: Arc::new(Ledger::new(ProofOfWork::new(config.difficulty), config.mining_reward)),
            peers: PeerRegistry::new(),
            resolver: Resolver::new(fetcher),
            mining_timeout: config.mining_timeout,
            shutdown: CancellationToken::new(),
        };

        for peer in &config.peers {
            if let Err(err) = node.peers.register(peer) {
                warn!("Ignoring configured peer: {}", err);
            }
        }

        node
    }

    /// Creates a node talking to its peers over HTTP
    pub fn from_config(config: &NodeConfig) -> Result<Self, reqwest::Error> {
        let fetcher = HttpChainFetcher::new(config.peer_timeout)?;
        Ok(Node::new(config, fetcher))
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Adds a transaction to the pending pool, returning the index of the
    /// block that will hold it
    pub fn submit_transaction(&self, sender: &str, recipient: &str, amount: f64) -> u64 {
        self.ledger.new_transaction(sender, recipient, amount)
    }

    /// Mines a block on a blocking worker, crediting the reward to this node
    pub async fn mine(&self) -> Result<Block, NodeError> {
        let token = self.shutdown.child_token();

        let timer = self.mining_timeout.map(|timeout| {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                token.cancel();
            })
        });

        let ledger = Arc::clone(&self.ledger);
        let node_id = self.node_id.clone();
        let search_token = token.clone();
        let result = tokio::task::spawn_blocking(move || ledger.mine(&node_id, &search_token)).await;

        if let Some(timer) = timer {
            timer.abort();
        }

        match result? {
            Ok(block) => Ok(block),
            Err(LedgerError::MiningCancelled(_)) => match self.mining_timeout {
                Some(timeout) if !self.shutdown.is_cancelled() => Err(NodeError::MiningTimedOut(timeout)),
                _ => Err(NodeError::ShuttingDown),
            },
            Err(err) => Err(err.into()),
        }
    }

    /// The full chain in the shape peers expect
    pub fn full_chain(&self) -> ChainResponse {
        ChainResponse::new(self.ledger.get_chain())
    }

    /// Registers every address or none of them
    pub fn register_peers(&self, addresses: &[String]) -> Result<Vec<String>, PeerError> {
        self.peers.register_all(addresses)
    }

    /// Known peers, in no particular order
    pub fn peers(&self) -> Vec<String> {
        self.peers.list()
    }

    /// Runs one consensus round against every known peer
    ///
    /// # Returns
    ///
    /// true if the local chain was replaced
    pub async fn resolve_conflicts(&self) -> bool {
        let peers = self.peers.list();
        self.resolver.resolve(&self.ledger, &peers).await
    }

    /// Runs a consensus round every `every` until shutdown
    pub fn spawn_sync(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let node = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = node.shutdown.cancelled() => {
                        info!("Background sync stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        if node.resolve_conflicts().await {
                            info!("Background sync adopted a longer chain");
                        }
                    }
                }
            }
        })
    }

    /// Interrupts in-flight mining and stops background work
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
