use crate::auth::AuthUser;
use crate::error::Result;
use crate::models::{
    Community, CommunityDetails, CommunityMember, CommunityQuery, CommunitySummary,
    CreateCommunity, JoinCommunity, UpdateBanner, UpdateDescription, UpdateName, UpdateRole,
    UpdateRules,
};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

pub async fn create_community(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(input): Json<CreateCommunity>,
) -> Result<(StatusCode, Json<CommunityDetails>)> {
    let community = state
        .community_service
        .create_community(auth.user_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(community)))
}

pub async fn list_communities(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(query): Query<CommunityQuery>,
) -> Result<Json<Vec<CommunitySummary>>> {
    let communities = state.community_service.list_communities(query).await?;
    Ok(Json(communities))
}

pub async fn get_community(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<CommunityDetails>> {
    let community = state.community_service.get_community(id).await?;
    Ok(Json(community))
}

pub async fn get_community_by_code(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(code): Path<String>,
) -> Result<Json<CommunityDetails>> {
    let community = state.community_service.get_community_by_code(&code).await?;
    Ok(Json(community))
}

pub async fn update_name(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateName>,
) -> Result<Json<Community>> {
    let community = state
        .community_service
        .update_name(auth.user_id, id, input.name)
        .await?;
    Ok(Json(community))
}

pub async fn update_description(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateDescription>,
) -> Result<Json<Community>> {
    let community = state
        .community_service
        .update_description(auth.user_id, id, input.description)
        .await?;
    Ok(Json(community))
}

pub async fn update_rules(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateRules>,
) -> Result<Json<Community>> {
    let community = state
        .community_service
        .update_rules(auth.user_id, id, input.rules)
        .await?;
    Ok(Json(community))
}

pub async fn update_banner(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateBanner>,
) -> Result<Json<Community>> {
    let community = state
        .community_service
        .update_banner(auth.user_id, id, input.banner_url)
        .await?;
    Ok(Json(community))
}

pub async fn delete_community(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    state
        .community_service
        .delete_community(auth.user_id, id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn join_community(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(input): Json<JoinCommunity>,
) -> Result<(StatusCode, Json<CommunityMember>)> {
    let member = state
        .community_service
        .add_member(auth.user_id, input.join_code.trim())
        .await?;
    Ok((StatusCode::CREATED, Json(member)))
}

pub async fn exit_community(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    state
        .community_service
        .exit_community(auth.user_id, id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_members(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<CommunityMember>>> {
    let members = state.community_service.get_members(id).await?;
    Ok(Json(members))
}

pub async fn remove_member(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode> {
    state
        .community_service
        .remove_member(auth.user_id, id, user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_member_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<UpdateRole>,
) -> Result<Json<CommunityMember>> {
    let member = state
        .community_service
        .update_role(auth.user_id, id, user_id, input.role)
        .await?;
    Ok(Json(member))
}

pub async fn make_admin(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode> {
    state
        .community_service
        .make_admin(auth.user_id, id, user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
