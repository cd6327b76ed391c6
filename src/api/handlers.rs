use actix_web::{web, HttpResponse, Responder};
use log::warn;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::blockchain::consensus::ChainResponse;
use crate::blockchain::{Block, Transaction};
use crate::node::{Node, NodeError};

/// Shared node state
pub type NodeData = web::Data<Node>;

/// Request for the transaction endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransactionRequest {
    /// The sender's address
    pub sender: String,

    /// The recipient's address
    pub recipient: String,

    /// The amount to transfer
    pub amount: f64,
}

/// Response for the transaction endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransactionResponse {
    /// The message
    pub message: String,

    /// The index of the block that will include this transaction
    pub index: u64,
}

/// Response for the mine endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MineResponse {
    /// The message
    pub message: String,

    /// Index of the new block
    pub index: u64,

    /// Transactions sealed into the new block
    pub transactions: Vec<Transaction>,

    /// Proof of the new block
    pub proof: u64,

    /// Hash of the block it extends
    pub previous_hash: String,
}

/// Request for the node registration endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct RegisterNodesRequest {
    /// Peer URLs, e.g. `http://192.168.0.5:5000`
    pub nodes: Vec<String>,
}

/// Response for the node registration endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct RegisterNodesResponse {
    /// The message
    pub message: String,

    /// Every known peer after registration
    pub total_nodes: Vec<String>,
}

/// Response for the consensus endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ResolveResponse {
    /// The message
    pub message: String,

    /// Whether the local chain was replaced
    pub replaced: bool,

    /// The chain after resolution
    pub chain: Vec<Block>,
}

/// Get the full blockchain
///
/// Returns the chain and its length; this is also what peers fetch
#[utoipa::path(
    get,
    path = "/api/v1/chain",
    responses(
        (status = 200, description = "Blockchain retrieved successfully", body = ChainResponse)
    )
)]
pub async fn get_chain(node: NodeData) -> impl Responder {
    HttpResponse::Ok().json(node.full_chain())
}

/// Get all pending transactions
///
/// Returns all transactions waiting to be included in a block
#[utoipa::path(
    get,
    path = "/api/v1/transactions/pending",
    responses(
        (status = 200, description = "Pending transactions retrieved successfully", body = Vec<Transaction>)
    )
)]
pub async fn get_pending_transactions(node: NodeData) -> impl Responder {
    HttpResponse::Ok().json(node.ledger().get_pending_transactions())
}

/// Create a new transaction
///
/// Adds a new transaction to the pending pool
#[utoipa::path(
    post,
    path = "/api/v1/transactions/new",
    request_body = TransactionRequest,
    responses(
        (status = 201, description = "Transaction created successfully", body = TransactionResponse),
        (status = 400, description = "Missing or malformed fields")
    )
)]
pub async fn new_transaction(
    node: NodeData,
    transaction_req: web::Json<TransactionRequest>,
) -> impl Responder {
    let index = node.submit_transaction(
        &transaction_req.sender,
        &transaction_req.recipient,
        transaction_req.amount,
    );

    HttpResponse::Created().json(TransactionResponse {
        message: format!("Transaction will be added to Block {}", index),
        index,
    })
}

/// Mine a new block
///
/// Runs the proof of work and seals the pending transactions plus a reward
/// for this node into a new block
#[utoipa::path(
    post,
    path = "/api/v1/mine",
    responses(
        (status = 200, description = "Block mined successfully", body = MineResponse),
        (status = 503, description = "Mining timed out or the node is shutting down"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn mine_block(node: NodeData) -> impl Responder {
    match node.mine().await {
        Ok(block) => HttpResponse::Ok().json(MineResponse {
            message: "New Block Forged".to_string(),
            index: block.index,
            transactions: block.transactions,
            proof: block.proof,
            previous_hash: block.previous_hash,
        }),
        Err(err @ (NodeError::MiningTimedOut(_) | NodeError::ShuttingDown)) => {
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "error": format!("Failed to mine block: {}", err)
            }))
        }
        Err(err) => HttpResponse::InternalServerError().json(serde_json::json!({
            "error": format!("Failed to mine block: {}", err)
        })),
    }
}

/// Check if the blockchain is valid
///
/// Validates the local chain
#[utoipa::path(
    get,
    path = "/api/v1/validate",
    responses(
        (status = 200, description = "Blockchain validation status", body = bool)
    )
)]
pub async fn validate_chain(node: NodeData) -> impl Responder {
    HttpResponse::Ok().json(node.ledger().is_valid())
}

/// Register peer nodes
///
/// Every address is checked before any is registered
#[utoipa::path(
    post,
    path = "/api/v1/nodes/register",
    request_body = RegisterNodesRequest,
    responses(
        (status = 201, description = "Nodes registered successfully", body = RegisterNodesResponse),
        (status = 400, description = "Empty or invalid node list")
    )
)]
pub async fn register_nodes(
    node: NodeData,
    register_req: web::Json<RegisterNodesRequest>,
) -> impl Responder {
    if register_req.nodes.is_empty() {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "Please supply a valid list of nodes"
        }));
    }

    if let Err(err) = node.register_peers(&register_req.nodes) {
        warn!("Rejected node registration: {}", err);
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": err.to_string()
        }));
    }

    HttpResponse::Created().json(RegisterNodesResponse {
        message: "New nodes have been added".to_string(),
        total_nodes: node.peers(),
    })
}

/// List peer nodes
#[utoipa::path(
    get,
    path = "/api/v1/nodes",
    responses(
        (status = 200, description = "Known peers", body = Vec<String>)
    )
)]
pub async fn get_nodes(node: NodeData) -> impl Responder {
    HttpResponse::Ok().json(node.peers())
}

/// Resolve conflicts
///
/// Adopts the longest valid chain among the registered peers
#[utoipa::path(
    get,
    path = "/api/v1/nodes/resolve",
    responses(
        (status = 200, description = "Consensus round completed", body = ResolveResponse)
    )
)]
pub async fn resolve_conflicts(node: NodeData) -> impl Responder {
    let replaced = node.resolve_conflicts().await;

    let message = if replaced {
        "Our chain was replaced"
    } else {
        "Our chain is authoritative"
    };

    HttpResponse::Ok().json(ResolveResponse {
        message: message.to_string(),
        replaced,
        chain: node.ledger().get_chain(),
    })
}
