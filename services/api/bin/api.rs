//! Main Entrypoint for the Jarvis API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing the language model, speech, search and GitHub clients.
//! 3. Constructing the Axum router and applying middleware.
//! 4. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use jarvis_api::{
    config::Config, router::create_router, state::AppState, ws::orchestrator::TurnServices,
};
use jarvis_core::{
    conversation::DEFAULT_SYSTEM_PROMPT,
    github::GitHubClient,
    llm_client::OpenAICompatibleClient,
    reasoning::{ReasoningLoop, ReasoningSettings},
    search::{SearchResolver, SearchSettings},
    session::SessionStore,
    tool_router::ToolRouter,
    voice::OpenAIVoice,
};
use std::{fs, net::SocketAddr, path::Path, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

/// Loads `system_prompt.md` from the prompts directory, falling back to the built-in prompt.
fn load_system_prompt(prompts_path: Option<&Path>) -> anyhow::Result<String> {
    let Some(dir) = prompts_path else {
        return Ok(DEFAULT_SYSTEM_PROMPT.to_string());
    };
    let path = dir.join("system_prompt.md");
    if !path.is_file() {
        warn!(path = %path.display(), "No system prompt override found; using built-in prompt");
        return Ok(DEFAULT_SYSTEM_PROMPT.to_string());
    }
    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    info!(path = %path.display(), "Loaded system prompt override");
    Ok(content)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize Shared Services ---
    let system_prompt = load_system_prompt(config.prompts_path.as_deref())?;

    let mut openai_config = OpenAIConfig::new().with_api_key(&config.openai_api_key);
    if let Some(base) = &config.openai_api_base {
        openai_config = openai_config.with_api_base(base);
    }

    let http = SearchResolver::http_client().context("Failed to build search HTTP client")?;
    let search = Arc::new(SearchResolver::standard(
        http,
        SearchSettings {
            tavily_api_key: config.tavily_api_key.clone(),
            searxng_url: config.searxng_url.clone(),
        },
    ));
    info!(tiers = ?search.tier_names(), "Search chain ready");

    let github = Arc::new(
        GitHubClient::new(config.github_token.clone()).context("Failed to build GitHub client")?,
    );
    if !github.has_token() {
        warn!("GITHUB_TOKEN not set; pull request creation will fail");
    }
    let tools = Arc::new(
        ToolRouter::new(search, config.search_max_results)
            .with_repository(github.clone())
            .with_code_search(github),
    );

    let llm_client = Arc::new(OpenAICompatibleClient::new(
        openai_config.clone(),
        config.chat_model.clone(),
    ));
    let reasoning = Arc::new(ReasoningLoop::new(
        llm_client,
        tools,
        ReasoningSettings {
            max_iterations: config.max_tool_iterations,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        },
    ));

    let voice = Arc::new(OpenAIVoice::new(
        openai_config,
        config.transcription_model.clone(),
        &config.tts_model,
        &config.tts_voice,
    ));

    let app_state = Arc::new(AppState {
        sessions: Arc::new(SessionStore::new(system_prompt)),
        services: Arc::new(TurnServices {
            transcriber: voice.clone(),
            synthesizer: voice,
            reasoning,
            language: config.transcription_language.clone(),
            vocabulary: config.transcription_prompt.clone(),
        }),
    });

    // --- 4. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 5. Start Server ---
    info!(
        model = %config.chat_model,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
