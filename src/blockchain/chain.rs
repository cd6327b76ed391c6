use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use log::{info, warn};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::block::{Block, GENESIS_PREVIOUS_HASH, GENESIS_PROOF};
use super::hashing::hash;
use super::pow::{PowError, ProofOfWork};
use super::transaction::Transaction;

/// Default mining reward
pub const DEFAULT_MINING_REWARD: f64 = 1.0;

/// Errors that can occur during ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Chain is empty")]
    EmptyChain,

    #[error("Invalid chain: {0}")]
    InvalidChain(String),

    #[error("Mining interrupted: {0}")]
    MiningCancelled(#[from] PowError),
}

#[derive(Debug)]
struct LedgerState {
    /// The chain of blocks, genesis first
    chain: Vec<Block>,

    /// Transactions waiting to be sealed into the next block
    pending: Vec<Transaction>,
}

/// The chain together with its pending-transaction pool
///
/// All state sits behind a single lock, so sealing a block (read the tip,
/// append, clear the pool) is atomic with respect to every other operation.
#[derive(Debug)]
pub struct Ledger {
    state: Mutex<LedgerState>,

    /// Proof-of-work engine used for mining and validation
    pow: ProofOfWork,

    /// Amount credited to the miner of each block
    mining_reward: f64,
}

impl Ledger {
    /// Creates a new ledger holding only the genesis block
    pub fn new(pow: ProofOfWork, mining_reward: f64) -> Self {
        let genesis_block = Block::new(1, Vec::new(), GENESIS_PROOF, GENESIS_PREVIOUS_HASH.to_string());

        Ledger {
            state: Mutex::new(LedgerState {
                chain: vec![genesis_block],
                pending: Vec::new(),
            }),
            pow,
            mining_reward,
        }
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The proof-of-work engine this ledger validates against
    pub fn proof_of_work(&self) -> ProofOfWork {
        self.pow
    }

    /// Adds a new transaction to the pending pool
    ///
    /// # Returns
    ///
    /// The index of the block that will hold this transaction
    pub fn new_transaction(&self, sender: &str, recipient: &str, amount: f64) -> u64 {
        let mut state = self.state();
        state.pending.push(Transaction::new(sender, recipient, amount));

        state.chain.len() as u64 + 1
    }

    /// Seals the pending pool into a new block and appends it to the chain
    ///
    /// # Arguments
    ///
    /// * `proof` - The proof found for the new block
    /// * `previous_hash` - Hash of the previous block; computed from the
    ///   current last block when `None`
    pub fn seal_block(&self, proof: u64, previous_hash: Option<String>) -> Result<Block, LedgerError> {
        let mut state = self.state();
        Self::seal_locked(&mut state, proof, previous_hash)
    }

    fn seal_locked(
        state: &mut LedgerState,
        proof: u64,
        previous_hash: Option<String>,
    ) -> Result<Block, LedgerError> {
        let previous_hash = match previous_hash {
            Some(previous_hash) => previous_hash,
            None => hash(state.chain.last().ok_or(LedgerError::EmptyChain)?),
        };

        let block = Block::new(
            state.chain.len() as u64 + 1,
            std::mem::take(&mut state.pending),
            proof,
            previous_hash,
        );
        state.chain.push(block.clone());

        Ok(block)
    }

    /// Gets the last block in the chain
    pub fn last_block(&self) -> Result<Block, LedgerError> {
        self.state().chain.last().cloned().ok_or(LedgerError::EmptyChain)
    }

    /// Gets a copy of the entire chain
    pub fn get_chain(&self) -> Vec<Block> {
        self.state().chain.clone()
    }

    /// Number of blocks in the chain
    pub fn len(&self) -> usize {
        self.state().chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().chain.is_empty()
    }

    /// Gets all pending transactions
    pub fn get_pending_transactions(&self) -> Vec<Transaction> {
        self.state().pending.clone()
    }

    /// Mines a new block crediting the reward to `miner`
    ///
    /// The proof search runs without holding the lock. If the tip changed
    /// meanwhile (another block was mined or the chain was replaced) the
    /// search restarts from the new tip.
    pub fn mine(&self, miner: &str, cancel: &CancellationToken) -> Result<Block, LedgerError> {
        loop {
            let last_block = self.last_block()?;
            let started = Instant::now();
            let proof = self.pow.find_proof(last_block.proof, cancel)?;
            let previous_hash = hash(&last_block);

            let mut state = self.state();
            if state.chain.last() != Some(&last_block) {
                warn!("Chain tip moved while mining on block {}, restarting", last_block.index);
                continue;
            }

            state.pending.push(Transaction::new_reward(miner, self.mining_reward));
            let block = Self::seal_locked(&mut state, proof, Some(previous_hash))?;

            info!(
                "Mined block {} with proof {} in {:?} ({} transactions)",
                block.index,
                block.proof,
                started.elapsed(),
                block.transactions.len()
            );

            return Ok(block);
        }
    }

    /// Checks a chain, reporting the first violation found
    ///
    /// Every block after the first must carry the hash of its predecessor
    /// and a proof that is valid for its predecessor's proof.
    pub fn check_chain(&self, chain: &[Block]) -> Result<(), LedgerError> {
        if chain.is_empty() {
            return Err(LedgerError::InvalidChain("chain is empty".to_string()));
        }

        for pair in chain.windows(2) {
            let (previous, block) = (&pair[0], &pair[1]);

            if block.previous_hash != hash(previous) {
                return Err(LedgerError::InvalidChain(format!(
                    "block {} does not link to block {}",
                    block.index, previous.index
                )));
            }

            if !self.pow.valid_proof(previous.proof, block.proof) {
                return Err(LedgerError::InvalidChain(format!(
                    "block {} has an invalid proof {}",
                    block.index, block.proof
                )));
            }
        }

        Ok(())
    }

    /// Validates a chain
    ///
    /// # Returns
    ///
    /// true if the chain is valid, false otherwise
    pub fn validate_chain(&self, chain: &[Block]) -> bool {
        self.check_chain(chain).is_ok()
    }

    /// Validates the local chain
    pub fn is_valid(&self) -> bool {
        let chain = self.get_chain();
        self.validate_chain(&chain)
    }

    /// Replaces the chain with `candidate` if it is strictly longer
    ///
    /// The caller is responsible for validating `candidate`. The pending pool
    /// is left untouched.
    pub fn replace_chain(&self, candidate: Vec<Block>) -> bool {
        let mut state = self.state();

        if candidate.len() <= state.chain.len() {
            return false;
        }

        state.chain = candidate;
        true
    }
}
