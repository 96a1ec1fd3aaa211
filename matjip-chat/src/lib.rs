//! Matjip Chat - real-time chat backend with two-phase restaurant
//! recommendations.
//!
//! ## Architecture
//!
//! ```text
//! client ──ws──▶ ingestion ──▶ store + room broadcast
//!                      │
//!                      └─(Talk)─▶ analysis task ──▶ gateway (Claude)
//!                                      │ positive verdict
//!                                      ▼
//!                              correlation store ──▶ prompt to user
//!                                      ▲
//! client ──fulfillment──▶ take-once ───┘──▶ restaurant lookup ──▶ card
//! ```
//!
//! Phase 1 never blocks the ingestion path; phase 2 redeems each prompt
//! token at most once. Unredeemed tokens expire on a background sweep.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod chat;
pub mod correlation;
pub mod dispatch;
pub mod gateway;
pub mod message;
pub mod routes;
pub mod session;
pub mod store;
pub mod suggest;
pub mod ws;

// Re-export commonly used types
pub use chat::ChatService;
pub use correlation::{CorrelationRecord, CorrelationStore, TakeError, RECORD_TTL, SWEEP_INTERVAL};
pub use dispatch::Dispatcher;
pub use gateway::{AnalysisGateway, ClaudeGateway, GatewayError, Verdict};
pub use message::{
    CardData, ChatMessage, ClientFrame, ErrorNotice, InboundChatMessage, MessageType, Payload,
    RecommendationPrompt, RestaurantCard, Suggestion,
};
pub use routes::{build_router, AppState};
pub use session::SessionRegistry;
pub use store::{
    ChatUserStore, InMemoryChatUserStore, InMemoryMessageStore, InMemoryRestaurantDirectory,
    MessageStore, NewChatMessage, Restaurant, RestaurantDirectory,
};
pub use suggest::SuggestionService;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};

use matjip_common::config::Config;

/// Wire the full service graph from configuration.
pub fn build_app(config: &Config) -> (axum::Router, Arc<AppState>, Arc<CorrelationStore>) {
    let registry = Arc::new(SessionRegistry::new());
    let dispatcher = Arc::new(Dispatcher::new(
        config.recommendation.delivery,
        registry.clone(),
    ));

    let messages: Arc<dyn MessageStore> = Arc::new(InMemoryMessageStore::new());
    let users: Arc<dyn ChatUserStore> = Arc::new(InMemoryChatUserStore::new());
    let restaurants: Arc<dyn RestaurantDirectory> =
        Arc::new(InMemoryRestaurantDirectory::with_demo_seed());
    let gateway: Arc<dyn AnalysisGateway> = Arc::new(ClaudeGateway::new(&config.anthropic));

    let cache = Arc::new(CorrelationStore::new());
    let suggestions = Arc::new(SuggestionService::new(
        gateway,
        cache.clone(),
        dispatcher.clone(),
        messages.clone(),
        restaurants,
    ));
    let chat = Arc::new(ChatService::new(
        messages,
        users,
        dispatcher.clone(),
        suggestions.clone(),
    ));

    let state = Arc::new(AppState {
        registry,
        dispatcher,
        chat,
        suggestions,
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let router = build_router(state.clone()).layer(cors);
    (router, state, cache)
}

/// Start the HTTP/WebSocket server with the background expiry sweep.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    let addr = SocketAddr::from((
        config.network.bind.parse::<std::net::IpAddr>()?,
        config.network.port,
    ));

    let (router, state, cache) = build_app(config);

    // Periodic sweep of expired correlation records.
    let sweep_cache = cache.clone();
    let sweep_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            sweep_cache.sweep_expired(Instant::now());
        }
    });

    tracing::info!(%addr, delivery = ?state.dispatcher.mode(), "Starting Matjip Chat");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    sweep_handle.abort();
    Ok(())
}
