// Blockchain module
//
// This module contains the core ledger implementation including:
// - Block and transaction structures
// - Canonical block hashing
// - Proof of work algorithm
// - The ledger (chain + pending pool) and chain validation
// - Longest-chain consensus and the peer registry

pub mod block;
pub mod chain;
pub mod consensus;
pub mod hashing;
pub mod peers;
pub mod pow;
pub mod transaction;

// Re-export main components for easier access
pub use block::Block;
pub use chain::{Ledger, LedgerError};
pub use consensus::{ChainFetcher, ChainResponse, HttpChainFetcher, Resolver};
pub use peers::{PeerError, PeerRegistry};
pub use pow::ProofOfWork;
pub use transaction::Transaction;
