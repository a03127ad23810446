mod communities;
mod users;

use crate::state::AppState;
use axum::{
    routing::{delete, get, patch, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(|| async { "OK" }))
        // Community routes
        .route(
            "/api/communities",
            post(communities::create_community).get(communities::list_communities),
        )
        .route("/api/communities/join", post(communities::join_community))
        .route(
            "/api/communities/code/{code}",
            get(communities::get_community_by_code),
        )
        .route(
            "/api/communities/{id}",
            get(communities::get_community).delete(communities::delete_community),
        )
        .route("/api/communities/{id}/name", patch(communities::update_name))
        .route(
            "/api/communities/{id}/description",
            patch(communities::update_description),
        )
        .route("/api/communities/{id}/rules", patch(communities::update_rules))
        .route("/api/communities/{id}/banner", patch(communities::update_banner))
        .route("/api/communities/{id}/exit", post(communities::exit_community))
        // Membership routes
        .route("/api/communities/{id}/members", get(communities::list_members))
        .route(
            "/api/communities/{id}/members/{user_id}",
            delete(communities::remove_member),
        )
        .route(
            "/api/communities/{id}/members/{user_id}/role",
            patch(communities::update_member_role),
        )
        .route(
            "/api/communities/{id}/members/{user_id}/admin",
            post(communities::make_admin),
        )
        // User routes
        .route("/api/users/me/communities", get(users::get_my_communities))
        .route(
            "/api/users/{user_id}/communities",
            get(users::get_user_communities),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
