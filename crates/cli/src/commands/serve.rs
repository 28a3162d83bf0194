use std::sync::Arc;

use anyhow::Result;
use threadline_core::env_flag;
use threadline_http::{AppState, create_router};
use threadline_llm::{HubClient, LlmClient, ToolRegistry, default_system_prompt, stock_registry};
use threadline_service::{ReconcilerConfig, SessionReconciler};

use crate::{build_storage, get_api_key, get_base_url};

pub(crate) async fn run(port: u16, host: String) -> Result<()> {
    let storage = Arc::new(build_storage().await?);
    let llm = LlmClient::new(get_api_key()?, get_base_url())?;

    let registry = if let Ok(hub_url) = std::env::var("THREADLINE_HUB_URL") {
        let secret = std::env::var("THREADLINE_HUB_SECRET").map_err(|_| {
            anyhow::anyhow!("THREADLINE_HUB_SECRET must be set when THREADLINE_HUB_URL is set")
        })?;
        let hub = Arc::new(HubClient::new(&hub_url, &secret)?);
        tracing::info!("Hub tools enabled: {}", hub_url);
        Arc::new(stock_registry(hub))
    } else {
        tracing::info!("THREADLINE_HUB_URL not set, tool calls disabled");
        Arc::new(ToolRegistry::new())
    };

    let system_prompt = match std::env::var("THREADLINE_SYSTEM_PROMPT") {
        Ok(prompt) => prompt,
        Err(_) => default_system_prompt(&registry),
    };
    let trust_client = env_flag("THREADLINE_TRUST_CLIENT_HISTORY", false);
    if trust_client {
        tracing::warn!("client message history is trusted wholesale, server merge disabled");
    }

    let reconciler = Arc::new(SessionReconciler::new(
        Arc::clone(&storage),
        llm,
        Arc::clone(&registry),
        ReconcilerConfig { system_prompt, trust_client },
    ));

    let state = Arc::new(AppState { reconciler, storage });
    let router = create_router(state);
    let addr = format!("{host}:{port}");
    tracing::info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
