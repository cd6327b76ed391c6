use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use log::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod api;
mod blockchain;
mod config;
mod node;

use config::NodeConfig;
use node::Node;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::get_chain,
        api::handlers::get_pending_transactions,
        api::handlers::new_transaction,
        api::handlers::mine_block,
        api::handlers::validate_chain,
        api::handlers::register_nodes,
        api::handlers::get_nodes,
        api::handlers::resolve_conflicts
    ),
    components(
        schemas(
            blockchain::Block,
            blockchain::Transaction,
            blockchain::ChainResponse,
            api::handlers::TransactionRequest,
            api::handlers::TransactionResponse,
            api::handlers::MineResponse,
            api::handlers::RegisterNodesRequest,
            api::handlers::RegisterNodesResponse,
            api::handlers::ResolveResponse
        )
    ),
    tags(
        (name = "ledger", description = "Proof-of-work ledger node API")
    ),
    info(
        title = "Ledger Node API",
        version = "0.1.0",
        description = "A minimal proof-of-work ledger with longest-chain consensus",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = NodeConfig::from_env().context("invalid configuration")?;
    let node = Arc::new(Node::from_config(&config).context("failed to create peer HTTP client")?);

    info!(
        "Node {} starting with difficulty {} and {} known peers",
        node.node_id(),
        node.ledger().proof_of_work().difficulty(),
        node.peers().len()
    );

    let sync = config.sync_interval.map(|every| {
        info!("Background consensus every {:?}", every);
        node.spawn_sync(every)
    });

    let data = web::Data::from(Arc::clone(&node));

    info!("Starting HTTP server at http://{}:{}", config.host, config.port);

    let server = HttpServer::new(move || {
        // Configure CORS
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        // Configure OpenAPI documentation
        let openapi = ApiDoc::openapi();

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(data.clone())
            // API routes
            .configure(api::configure_routes)
            // Swagger UI
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone())
            )
    })
    .disable_signals()
    .bind((config.host.as_str(), config.port))?
    .run();

    // Mining must be interrupted before the server drains in-flight requests.
    let server_handle = server.handle();
    let shutdown_node = Arc::clone(&node);
    actix_web::rt::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for shutdown signal: {}", err);
            return;
        }
        info!("Shutdown requested");
        shutdown_node.shutdown();
        server_handle.stop(true).await;
    });

    server.await?;

    node.shutdown();
    if let Some(sync) = sync {
        if let Err(err) = sync.await {
            warn!("Background sync task failed: {}", err);
        }
    }

    info!("Node {} stopped", node.node_id());
    Ok(())
}
