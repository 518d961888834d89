use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::api::state::AppState;
use crate::api::ApiError;
use crate::bot::CommandContext;
use crate::models::{ChannelId, GuildId, UserId};

/// A chat message relayed from the gateway.
#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub author_id: UserId,
    pub author_name: String,
    pub content: String,
}

pub async fn handle_command(
    State(state): State<AppState>,
    Json(request): Json<CommandRequest>,
) -> Result<Response, ApiError> {
    if request.content.trim().is_empty() {
        return Err(ApiError::BadRequest("content must not be empty".to_string()));
    }

    let ctx = CommandContext {
        guild_id: request.guild_id,
        channel_id: request.channel_id,
        author_id: request.author_id,
        author_name: request.author_name,
    };

    Ok(match state.bot.handle_message(&ctx, &request.content).await {
        Some(reply) => Json(reply).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}
