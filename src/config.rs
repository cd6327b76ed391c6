use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::blockchain::chain::DEFAULT_MINING_REWARD;
use crate::blockchain::pow::DEFAULT_DIFFICULTY;

/// Errors that can occur while reading the configuration
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Node configuration
#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfig {
    /// Address the HTTP server binds to
    pub host: String,

    /// Port the HTTP server listens on
    pub port: u16,

    /// Leading zero hex characters required by the proof of work
    pub difficulty: usize,

    /// Amount credited to this node for each mined block
    pub mining_reward: f64,

    /// Upper bound on a single proof search; unbounded when `None`
    pub mining_timeout: Option<Duration>,

    /// Timeout for fetching a peer's chain
    pub peer_timeout: Duration,

    /// Interval of background consensus rounds; on-demand only when `None`
    pub sync_interval: Option<Duration>,

    /// Identifier credited with mining rewards
    pub node_id: String,

    /// Peers registered at startup
    pub peers: Vec<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            host: "127.0.0.1".to_string(),
            port: 5000,
            difficulty: DEFAULT_DIFFICULTY,
            mining_reward: DEFAULT_MINING_REWARD,
            mining_timeout: None,
            peer_timeout: Duration::from_secs(5),
            sync_interval: None,
            node_id: generate_node_id(),
            peers: Vec::new(),
        }
    }
}

/// Random node identifier (UUID v4 without dashes)
pub fn generate_node_id() -> String {
    Uuid::new_v4().simple().to_string()
}

impl NodeConfig {
    /// Reads the configuration from the environment, loading `.env` first
    /// when present
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup
    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let defaults = NodeConfig::default();

        let peer_timeout = match parse::<u64, _>(&lookup, "PEER_TIMEOUT_SECS")? {
            Some(0) => {
                return Err(ConfigError::InvalidValue {
                    key: "PEER_TIMEOUT_SECS",
                    value: "0".to_string(),
                    reason: "must be at least one second".to_string(),
                })
            }
            Some(secs) => Duration::from_secs(secs),
            None => defaults.peer_timeout,
        };

        let mining_reward = match parse::<f64, _>(&lookup, "MINING_REWARD")? {
            Some(reward) if !reward.is_finite() => {
                return Err(ConfigError::InvalidValue {
                    key: "MINING_REWARD",
                    value: reward.to_string(),
                    reason: "must be a finite number".to_string(),
                })
            }
            Some(reward) => reward,
            None => defaults.mining_reward,
        };

        Ok(NodeConfig {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse(&lookup, "PORT")?.unwrap_or(defaults.port),
            difficulty: parse(&lookup, "DIFFICULTY")?.unwrap_or(defaults.difficulty),
            mining_reward,
            mining_timeout: optional_seconds(&lookup, "MINING_TIMEOUT_SECS")?,
            peer_timeout,
            sync_interval: optional_seconds(&lookup, "SYNC_INTERVAL_SECS")?,
            node_id: lookup("NODE_ID")
                .filter(|id| !id.trim().is_empty())
                .unwrap_or(defaults.node_id),
            peers: lookup("PEERS")
                .map(|peers| {
                    peers
                        .split(',')
                        .map(str::trim)
                        .filter(|peer| !peer.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
        })
    }
}

fn parse<T, L>(lookup: &L, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    L: Fn(&str) -> Option<String>,
{
    let value = match lookup(key) {
        Some(value) => value,
        None => return Ok(None),
    };

    let parsed = value.trim().parse::<T>();
    match parsed {
        Ok(parsed) => Ok(Some(parsed)),
        Err(e) => Err(ConfigError::InvalidValue {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}

/// Seconds where zero or absence both mean "disabled"
fn optional_seconds<L>(lookup: &L, key: &'static str) -> Result<Option<Duration>, ConfigError>
where
    L: Fn(&str) -> Option<String>,
{
    Ok(parse::<u64, _>(lookup, key)?
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs))
}
