use log::debug;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::hashing::sha256_hex;

/// Reference difficulty (leading hex zeros)
pub const DEFAULT_DIFFICULTY: usize = 4;

/// How many candidates are tested between cancellation checks
const CANCEL_CHECK_INTERVAL: u64 = 1024;

/// Errors that can occur while searching for a proof
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PowError {
    #[error("Proof search cancelled after {attempts} attempts")]
    Cancelled { attempts: u64 },
}

/// Proof-of-work engine
///
/// A proof `p` is valid for the previous proof `p'` when the SHA-256 hex
/// digest of the decimal text `"{p'}{p}"` starts with `difficulty` zeros.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofOfWork {
    difficulty: usize,
}

impl Default for ProofOfWork {
    fn default() -> Self {
        ProofOfWork::new(DEFAULT_DIFFICULTY)
    }
}

impl ProofOfWork {
    /// Creates an engine requiring `difficulty` leading zero hex characters
    pub fn new(difficulty: usize) -> Self {
        ProofOfWork { difficulty }
    }

    /// Number of leading zero hex characters required
    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    /// Checks whether `proof` is a valid successor of `last_proof`
    pub fn valid_proof(&self, last_proof: u64, proof: u64) -> bool {
        let guess = format!("{}{}", last_proof, proof);
        let digest = sha256_hex(guess.as_bytes());

        // A digest has 64 hex characters; anything beyond that can never match.
        digest.len() >= self.difficulty && digest.bytes().take(self.difficulty).all(|b| b == b'0')
    }

    /// Finds the smallest non-negative proof valid for `last_proof`
    ///
    /// The search is unbounded; it stops early only when `cancel` fires.
    pub fn find_proof(&self, last_proof: u64, cancel: &CancellationToken) -> Result<u64, PowError> {
        let mut proof: u64 = 0;

        loop {
            if proof % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                debug!("Proof search for {} cancelled at candidate {}", last_proof, proof);
                return Err(PowError::Cancelled { attempts: proof });
            }

            if self.valid_proof(last_proof, proof) {
                return Ok(proof);
            }

            proof += 1;
        }
    }
}
