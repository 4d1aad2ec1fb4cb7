use anyhow::{Context, Result};
use axum::Router;
use degov_agent::{
    config::{AgentConfig, JobOptions, Secrets},
    extensions::{
        ai::OpenRouterClient,
        chain::{AlloyGovernor, ChainMetaCache},
        clients::{ClientAuthority, ClientSet},
        db_extension::{SeaOrmStore, initialize_db},
        indexer::GraphqlIndexer,
        twitter::XApi,
    },
    tasks::{
        AgentContext, DaoContext, Job, fulfillment::Fulfillment, proposal_discovery::ProposalDiscovery, run_periodic,
        status_tracking::StatusTracking, tweet_sync::TweetSync, vote_relay::VoteRelay,
    },
};
use dotenv::dotenv;
use futures::future::select_all;
use std::sync::Arc;
use tracing::{error, info};
use utils::tracing::{setup_tracing, shutdown_tracing};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    setup_tracing();
    info!("Application starting up");

    let config = AgentConfig::load()?;
    let secrets = Secrets::from_env(&config.profiles())?;
    let options = JobOptions::from_env();

    let db = initialize_db(&secrets.database_url)
        .await
        .context("Failed to initialize database")?;

    let mut clients = ClientSet::new();
    for (profile, credentials) in &secrets.x_profiles {
        let api = XApi::new(&secrets.x_api_base_url, credentials.clone())
            .with_context(|| format!("Failed to create X client for profile {profile}"))?;
        clients = clients.with_social(profile.clone(), Arc::new(api));
    }

    let ctx = AgentContext {
        store: Arc::new(SeaOrmStore::new(db)),
        indexer: Arc::new(GraphqlIndexer::new()),
        ai: Arc::new(OpenRouterClient::new(
            &secrets.openrouter_base_url,
            &secrets.openrouter_api_key,
            &secrets.openrouter_model,
        )),
        clients: Arc::new(ClientAuthority::new(clients)),
        options,
    };

    let chain_meta = Arc::new(ChainMetaCache::new());
    let mut jobs: Vec<Arc<dyn Job>> = vec![Arc::new(TweetSync::new(ctx.clone()))];
    for dao in &config.daos {
        let governor = AlloyGovernor::new(&dao.rpc_url, &secrets.private_key)
            .with_context(|| format!("Failed to create governor client for {}", dao.code))?;
        let dao_ctx = DaoContext {
            dao: dao.clone(),
            chain: Arc::new(governor),
        };

        jobs.push(Arc::new(ProposalDiscovery::new(ctx.clone(), dao_ctx.clone(), chain_meta.clone())));
        jobs.push(Arc::new(StatusTracking::new(ctx.clone(), dao_ctx.clone())));
        jobs.push(Arc::new(VoteRelay::new(ctx.clone(), dao_ctx.clone())));
        jobs.push(Arc::new(Fulfillment::new(ctx.clone(), dao_ctx)));
    }

    let mut names = Vec::with_capacity(jobs.len() + 1);
    let mut handles = Vec::with_capacity(jobs.len() + 1);
    for job in jobs {
        names.push(job.name());
        handles.push(tokio::spawn(async move {
            if let Err(e) = run_periodic(job).await {
                error!(error = ?e, "Periodic job stopped");
            }
        }));
    }

    // Start health check server
    let app = Router::new().route("/health", axum::routing::get(|| async { "OK" }));
    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000")
        .await
        .context("Failed to bind health check server")?;
    let addr = listener.local_addr()?;
    names.push("health".to_string());
    handles.push(tokio::spawn(async move {
        info!(address = %addr, "Starting health check server");
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "Health check server error");
        }
    }));

    info!(tasks = handles.len(), daos = config.daos.len(), "All tasks started, application running indefinitely");

    tokio::select! {
        (result, index, _) = select_all(handles) => {
            let task = names.get(index).map(String::as_str).unwrap_or("unknown");
            error!(task = task, result = ?result, "Task completed unexpectedly");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully");
        }
    }

    info!("Application shutting down");
    shutdown_tracing().await;
    Ok(())
}
