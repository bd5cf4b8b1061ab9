// HTTP/JSON API surface

pub mod auth;
pub mod error;
pub mod live;
pub mod room;
pub mod webhook;
pub mod whip;
pub mod ws;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use povstream_core::{
    repository::{MessageRepository, PovRepository, RoomRepository, UserRepository},
    service::{
        ChatHub, HttpIngressClient, IngressService, JoinGate, SessionTokenIssuer, WhipClient,
    },
    Config,
};

pub use error::{AppError, AppResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub rooms: RoomRepository,
    pub povs: PovRepository,
    pub messages: MessageRepository,
    pub users: UserRepository,
    pub join_gate: JoinGate,
    pub ingress: IngressService,
    pub tokens: SessionTokenIssuer,
    pub whip: WhipClient,
    pub chat_hub: ChatHub,
    /// WebSocket URL clients connect to with a minted token.
    pub ws_url: String,
    pub webhook_secret: String,
}

impl AppState {
    pub fn new(pool: sqlx::PgPool, config: &Config) -> Self {
        let rooms = RoomRepository::new(pool.clone());
        let povs = PovRepository::new(pool.clone());
        let whip = WhipClient::new();

        let ingress_client = Arc::new(HttpIngressClient::new(
            config.provider.api_url.clone(),
            config.provider.api_key.clone(),
            config.provider.api_secret.clone(),
        ));

        Self {
            join_gate: JoinGate::new(rooms.clone()),
            ingress: IngressService::new(povs.clone(), ingress_client, whip.clone()),
            tokens: SessionTokenIssuer::new(
                config.provider.api_key.clone(),
                &config.provider.api_secret,
                config.provider.token_ttl_seconds,
            ),
            rooms,
            povs,
            messages: MessageRepository::new(pool.clone()),
            users: UserRepository::new(pool),
            whip,
            chat_hub: ChatHub::new(),
            ws_url: config.provider.ws_url.clone(),
            webhook_secret: config.provider.webhook_secret.clone(),
        }
    }
}

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/rooms", post(room::create_room).get(room::list_my_rooms))
        // GET resolves the public slug; DELETE takes the room id.
        .route(
            "/api/rooms/{room}",
            get(room::get_room_by_slug).delete(room::delete_room),
        )
        .route("/api/rooms/{room_id}/exists", get(room::room_exists))
        .route("/api/rooms/{room_id}/go-live", post(live::go_live))
        .route("/api/rooms/{room_id}/token", post(live::mint_token))
        .route(
            "/api/whip/{pov_id}",
            post(whip::publish).delete(whip::unpublish),
        )
        .route("/api/webhooks/identity", post(webhook::handle_webhook))
        .route("/api/ws", get(ws::chat_socket))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_router_builds() {
        let pool = sqlx::PgPool::connect_lazy("postgresql://localhost/povstream")
            .expect("lazy pool");
        let state = AppState::new(pool, &Config::default());
        let _router = create_router(state);
    }
}
