use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::transaction::Transaction;

/// Previous-hash placeholder carried by the genesis block
pub const GENESIS_PREVIOUS_HASH: &str = "1";

/// Proof carried by the genesis block
pub const GENESIS_PROOF: u64 = 100;

/// Represents a block in the blockchain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Block {
    /// 1-based position of the block in the chain
    pub index: u64,

    /// Creation time in seconds since the Unix epoch
    #[schema(example = 1700000000.123456)]
    pub timestamp: f64,

    /// Transactions sealed into this block, in submission order
    pub transactions: Vec<Transaction>,

    /// Proof of work
    pub proof: u64,

    /// Hash of the previous block, or the genesis placeholder
    pub previous_hash: String,
}

impl Block {
    /// Creates a new block stamped with the current time
    ///
    /// # Arguments
    ///
    /// * `index` - The index of the block in the chain
    /// * `transactions` - The transactions to include in the block
    /// * `proof` - The proof of work
    /// * `previous_hash` - The hash of the previous block
    pub fn new(index: u64, transactions: Vec<Transaction>, proof: u64, previous_hash: String) -> Self {
        Block {
            index,
            timestamp: current_timestamp(),
            transactions,
            proof,
            previous_hash,
        }
    }
}

/// Seconds since the Unix epoch with microsecond precision
fn current_timestamp() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
