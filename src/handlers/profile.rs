use crate::handlers::common::success_response;
use crate::{auth::AuthUser, errors::ApiError, AppState};
use axum::{
    extract::{Extension, Json, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde_json::{Map, Value};
use std::sync::Arc;

pub fn profile_routes() -> Router<Arc<AppState>> {
    Router::new().route("/", get(get_profile).put(update_profile))
}

async fn get_profile(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = state.services.accounts.get_profile(user.user_id).await?;
    Ok(success_response(profile))
}

// The body stays untyped so attempts to touch protected fields can be refused by name.
async fn update_profile(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(patch): Json<Map<String, Value>>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = state
        .services
        .accounts
        .update_profile(user.user_id, &patch)
        .await?;
    Ok(success_response(profile))
}
