use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, Method},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use futures::{stream, StreamExt};
use rngesus_shared::{CampaignId, CampaignSummary, Character, CharacterId, CharacterSummary, ChatMessage};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::game::{ApiStream, GameService};
use crate::rate_limit::{rate_limit_middleware, RateLimiter};

const NDJSON: &str = "application/x-ndjson";

#[derive(Clone)]
pub struct AppState {
    pub game: Arc<GameService>,
    pub rate_limiter: RateLimiter,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    // Only routes that start a generation session pay into the rate limit.
    let limited = middleware::from_fn_with_state(state.rate_limiter.clone(), rate_limit_middleware);

    Router::new()
        .route("/health", get(health_check))
        .route(
            "/api/campaigns",
            get(list_campaigns).merge(post(create_campaign).route_layer(limited.clone())),
        )
        .route("/api/campaigns/{id}", get(get_campaign).delete(delete_campaign))
        .route(
            "/api/campaigns/{id}/regenerate",
            post(regenerate_campaign).route_layer(limited.clone()),
        )
        .route(
            "/api/campaigns/{id}/characters",
            get(list_characters).merge(post(roll_character).route_layer(limited.clone())),
        )
        .route(
            "/api/campaigns/{id}/chat",
            get(chat_history).merge(post(post_chat).route_layer(limited.clone())),
        )
        .route(
            "/api/campaigns/{id}/chat/next",
            post(next_chat).route_layer(limited.clone()),
        )
        .route("/api/characters/{id}", get(get_character).delete(delete_character))
        .route(
            "/api/characters/{id}/regenerate",
            post(regenerate_character).route_layer(limited),
        )
        .route("/api/characters/{id}/activate", post(activate_character))
        .route("/api/characters/{id}/deactivate", post(deactivate_character))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Streaming
// ---------------------------------------------------------------------------

/// Answer with one JSON document per line.
///
/// The first record is awaited before the status line goes out, so a session
/// that fails straight away still gets a proper error status. A failure after
/// that aborts the body and the client sees a truncated stream.
async fn ndjson<T>(mut records: ApiStream<T>) -> Result<Response, ServerError>
where
    T: Serialize + Send + 'static,
{
    let first = match records.next().await {
        Some(Ok(record)) => Some(record),
        Some(Err(e)) => return Err(e),
        None => None,
    };

    let lines = stream::iter(first.map(Ok)).chain(records).map(|item| {
        let record = item.map_err(|e| {
            warn!(error = %e, "Aborting stream after partial output");
            e
        })?;
        encode_line(&record)
    });

    Ok(([(header::CONTENT_TYPE, NDJSON)], Body::from_stream(lines)).into_response())
}

fn encode_line<T: Serialize>(record: &T) -> Result<Bytes, ServerError> {
    let mut line = serde_json::to_vec(record).map_err(|e| ServerError::Internal(e.to_string()))?;
    line.push(b'\n');
    Ok(Bytes::from(line))
}

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    model: String,
}

#[derive(Deserialize)]
struct NewCampaignRequest {
    description: String,
}

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
}

#[derive(Serialize)]
struct CampaignListResponse {
    campaigns: Vec<CampaignSummary>,
}

#[derive(Serialize)]
struct CharacterListResponse {
    characters: Vec<CharacterSummary>,
}

#[derive(Serialize)]
struct ChatHistoryResponse {
    messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
struct DeleteResponse {
    status: &'static str,
}

impl DeleteResponse {
    fn from_found(found: bool) -> Json<Self> {
        Json(Self {
            status: if found { "deleted" } else { "no_match" },
        })
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        model: state.config.openai_model.clone(),
    })
}

async fn list_campaigns(State(state): State<AppState>) -> Result<Json<CampaignListResponse>, ServerError> {
    let campaigns = state.game.list_campaigns().await?;
    Ok(Json(CampaignListResponse { campaigns }))
}

async fn create_campaign(
    State(state): State<AppState>,
    Json(body): Json<NewCampaignRequest>,
) -> Result<Response, ServerError> {
    let prompt = body.description.trim();
    if prompt.is_empty() {
        return Err(ServerError::BadRequest("description must not be empty".into()));
    }
    ndjson(state.game.new_campaign(prompt.to_string())).await
}

async fn get_campaign(
    State(state): State<AppState>,
    Path(id): Path<CampaignId>,
) -> Result<Response, ServerError> {
    Ok(Json(state.game.get_campaign(id).await?).into_response())
}

async fn regenerate_campaign(
    State(state): State<AppState>,
    Path(id): Path<CampaignId>,
) -> Result<Response, ServerError> {
    ndjson(state.game.regenerate_campaign(id).await?).await
}

async fn delete_campaign(
    State(state): State<AppState>,
    Path(id): Path<CampaignId>,
) -> Result<Json<DeleteResponse>, ServerError> {
    Ok(DeleteResponse::from_found(state.game.delete_campaign(id).await?))
}

async fn list_characters(
    State(state): State<AppState>,
    Path(id): Path<CampaignId>,
) -> Result<Json<CharacterListResponse>, ServerError> {
    let characters = state.game.list_characters(id).await?;
    Ok(Json(CharacterListResponse { characters }))
}

async fn roll_character(
    State(state): State<AppState>,
    Path(id): Path<CampaignId>,
) -> Result<Response, ServerError> {
    ndjson(state.game.roll_character(id).await?).await
}

async fn get_character(
    State(state): State<AppState>,
    Path(id): Path<CharacterId>,
) -> Result<Json<Character>, ServerError> {
    Ok(Json(state.game.get_character(id).await?))
}

async fn regenerate_character(
    State(state): State<AppState>,
    Path(id): Path<CharacterId>,
) -> Result<Response, ServerError> {
    ndjson(state.game.regenerate_character(id).await?).await
}

async fn delete_character(
    State(state): State<AppState>,
    Path(id): Path<CharacterId>,
) -> Result<Json<DeleteResponse>, ServerError> {
    Ok(DeleteResponse::from_found(state.game.delete_character(id).await?))
}

async fn activate_character(
    State(state): State<AppState>,
    Path(id): Path<CharacterId>,
) -> Result<Json<Character>, ServerError> {
    Ok(Json(state.game.set_character_active(id, true).await?))
}

async fn deactivate_character(
    State(state): State<AppState>,
    Path(id): Path<CharacterId>,
) -> Result<Json<Character>, ServerError> {
    Ok(Json(state.game.set_character_active(id, false).await?))
}

async fn chat_history(
    State(state): State<AppState>,
    Path(id): Path<CampaignId>,
) -> Result<Json<ChatHistoryResponse>, ServerError> {
    let messages = state.game.chat_history(id).await?;
    Ok(Json(ChatHistoryResponse { messages }))
}

async fn post_chat(
    State(state): State<AppState>,
    Path(id): Path<CampaignId>,
    Json(body): Json<ChatRequest>,
) -> Result<Response, ServerError> {
    if body.message.trim().is_empty() {
        return Err(ServerError::BadRequest("message must not be empty".into()));
    }
    ndjson(state.game.chat_turn(id, Some(body.message)).await?).await
}

async fn next_chat(
    State(state): State<AppState>,
    Path(id): Path<CampaignId>,
) -> Result<Response, ServerError> {
    ndjson(state.game.chat_turn(id, None).await?).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};
    use rngesus_shared::Campaign;
    use tower::ServiceExt;

    use crate::test_support::{failing_service, scripted_service, snapshot};

    fn app_with(service: GameService, limiter: RateLimiter) -> Router {
        build_router(AppState {
            game: Arc::new(service),
            rate_limiter: limiter,
            config: Arc::new(ServerConfig::default()),
        })
    }

    fn app(service: GameService) -> Router {
        app_with(service, RateLimiter::new(100.0, 100.0))
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", "198.51.100.4")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn campaign_snapshots() -> Vec<rngesus_engine::PartialOutput> {
        vec![
            snapshot(&[("title", "Ghost Express")]),
            snapshot(&[
                ("title", "Ghost Express"),
                ("character_classes", "Conductor, Medium"),
                ("character_types", "Ghost, Passenger"),
                ("attributes", "Dread, Nerve"),
                ("summary", "Ghosts ride the night train."),
            ]),
        ]
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let response = app(scripted_service(Vec::new()))
            .oneshot(get("/health"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("\"ok\""));
    }

    #[tokio::test]
    async fn create_campaign_streams_ndjson() {
        let app = app(scripted_service(campaign_snapshots()));

        let response = app
            .clone()
            .oneshot(post_json("/api/campaigns", serde_json::json!({ "description": "a haunted train" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], NDJSON);

        let text = body_text(response).await;
        assert!(text.ends_with('\n'));
        let records: Vec<Campaign> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        let last = records.last().unwrap();
        assert_eq!(last.title, "Ghost Express");
        assert_eq!(last.prompt, "a haunted train");
        let id = last.id.unwrap();

        let response = app
            .oneshot(get(&format!("/api/campaigns/{id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let stored: Campaign = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(stored.summary, "Ghosts ride the night train.");
    }

    #[tokio::test]
    async fn blank_description_is_rejected() {
        let response = app(scripted_service(Vec::new()))
            .oneshot(post_json("/api/campaigns", serde_json::json!({ "description": "  " })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_records_are_404() {
        let app = app(scripted_service(Vec::new()));
        for uri in ["/api/campaigns/41", "/api/characters/41", "/api/campaigns/41/chat"] {
            let response = app.clone().oneshot(get(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
            assert!(body_text(response).await.contains("\"error\""));
        }

        let response = app
            .oneshot(post_json("/api/campaigns/41/characters", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn rolling_from_an_incomplete_campaign_conflicts() {
        let app = app(scripted_service(vec![snapshot(&[("title", "Ghost Express")])]));
        let response = app
            .clone()
            .oneshot(post_json("/api/campaigns", serde_json::json!({ "description": "x" })))
            .await
            .unwrap();
        body_text(response).await;

        let response = app
            .oneshot(post_json("/api/campaigns/1/characters", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn failure_before_first_record_is_502() {
        let response = app(failing_service())
            .oneshot(post_json("/api/campaigns", serde_json::json!({ "description": "x" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn roll_activate_and_chat() {
        // Every session replays this one snapshot and reads its own fields.
        let app = app(scripted_service(vec![snapshot(&[
            ("title", "Ghost Express"),
            ("character_classes", "Conductor, Medium"),
            ("character_types", "Ghost, Passenger"),
            ("attributes", "Dread, Nerve"),
            ("name", "Edith Vale"),
            ("attribute_scores", "Dread: 14, Nerve: 9"),
            ("next", "The train whistles."),
        ])]));

        let response = app
            .clone()
            .oneshot(post_json("/api/campaigns", serde_json::json!({ "description": "a haunted train" })))
            .await
            .unwrap();
        body_text(response).await;

        let response = app
            .clone()
            .oneshot(post_json("/api/campaigns/1/characters", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let text = body_text(response).await;
        let rolled: Character = serde_json::from_str(text.lines().last().unwrap()).unwrap();
        assert_eq!(rolled.name.as_deref(), Some("Edith Vale"));
        assert_eq!(rolled.attributes["Dread"], 14);
        let character_id = rolled.id.unwrap();

        let response = app
            .clone()
            .oneshot(post_json(&format!("/api/characters/{character_id}/activate"), serde_json::json!({})))
            .await
            .unwrap();
        let active: Character = serde_json::from_str(&body_text(response).await).unwrap();
        assert!(active.activated_at.is_some());

        let response = app
            .clone()
            .oneshot(post_json("/api/campaigns/1/chat", serde_json::json!({ "message": "I board." })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let text = body_text(response).await;
        let ids: Vec<_> = text
            .lines()
            .map(|line| serde_json::from_str::<ChatMessage>(line).unwrap().id)
            .collect();
        assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));

        let response = app
            .clone()
            .oneshot(get("/api/campaigns/1/chat"))
            .await
            .unwrap();
        let history: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        let messages = history["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[1]["message"], "The train whistles.");

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/campaigns/1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(body_text(response).await.contains("\"deleted\""));

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/campaigns/1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(body_text(response).await.contains("\"no_match\""));
    }

    #[tokio::test]
    async fn generation_routes_are_rate_limited() {
        let app = app_with(
            scripted_service(vec![snapshot(&[("title", "Ghost Express")])]),
            RateLimiter::new(0.001, 1.0),
        );

        let first = app
            .clone()
            .oneshot(post_json("/api/campaigns", serde_json::json!({ "description": "x" })))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        body_text(first).await;

        let second = app
            .clone()
            .oneshot(post_json("/api/campaigns", serde_json::json!({ "description": "y" })))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(second.headers().contains_key(header::RETRY_AFTER));

        // Reads are not limited.
        let listing = app.oneshot(get("/api/campaigns")).await.unwrap();
        assert_eq!(listing.status(), StatusCode::OK);
    }
}
