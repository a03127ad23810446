use crate::auth::AuthUser;
use crate::error::Result;
use crate::models::UserCommunity;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

pub async fn get_my_communities(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<UserCommunity>>> {
    let communities = state.community_service.user_communities(auth.user_id).await?;
    Ok(Json(communities))
}

pub async fn get_user_communities(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<UserCommunity>>> {
    let communities = state.community_service.user_communities(user_id).await?;
    Ok(Json(communities))
}
