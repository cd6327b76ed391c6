use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Sender address used for mining rewards
pub const REWARD_SENDER: &str = "0";

/// Represents a transfer of value between two parties
///
/// No field is validated: any sender, recipient and amount is accepted and
/// recorded as given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Transaction {
    /// Sender's address
    pub sender: String,

    /// Recipient's address
    pub recipient: String,

    /// Amount being transferred
    pub amount: f64,
}

impl Transaction {
    /// Creates a new transaction
    pub fn new(sender: impl Into<String>, recipient: impl Into<String>, amount: f64) -> Self {
        Transaction {
            sender: sender.into(),
            recipient: recipient.into(),
            amount,
        }
    }

    /// Creates a mining reward transaction credited to `recipient`
    pub fn new_reward(recipient: impl Into<String>, amount: f64) -> Self {
        Transaction::new(REWARD_SENDER, recipient, amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_transaction() {
        let transaction = Transaction::new("alice", "bob", 10.5);

        assert_eq!(transaction.sender, "alice");
        assert_eq!(transaction.recipient, "bob");
        assert_eq!(transaction.amount, 10.5);
    }

    #[test]
    fn test_reward_transaction() {
        let transaction = Transaction::new_reward("miner", 1.0);

        assert_eq!(transaction.sender, REWARD_SENDER);
        assert_eq!(transaction.recipient, "miner");
        assert_eq!(transaction.amount, 1.0);
    }

    #[test]
    fn test_accepts_unvalidated_input() {
        let transaction = Transaction::new("", "", -3.0);

        assert_eq!(transaction.sender, "");
        assert_eq!(transaction.amount, -3.0);
    }
}
