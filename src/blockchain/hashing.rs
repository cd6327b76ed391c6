use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use super::block::Block;
use super::transaction::Transaction;

/// SHA-256 of `data` as a lowercase hexadecimal string
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Calculates the hash of a block
///
/// The block is rendered as compact JSON with every object's keys in
/// lexicographic order, so the same logical block hashes identically on
/// every node.
pub fn hash(block: &Block) -> String {
    sha256_hex(canonical_json(block).as_bytes())
}

/// Canonical JSON rendering of a block, keys inserted in sorted order
pub fn canonical_json(block: &Block) -> String {
    let transactions: Vec<Value> = block.transactions.iter().map(canonical_transaction).collect();

    json!({
        "index": block.index,
        "previous_hash": block.previous_hash,
        "proof": block.proof,
        "timestamp": block.timestamp,
        "transactions": transactions,
    })
    .to_string()
}

fn canonical_transaction(transaction: &Transaction) -> Value {
    json!({
        "amount": transaction.amount,
        "recipient": transaction.recipient,
        "sender": transaction.sender,
    })
}
