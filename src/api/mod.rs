pub mod analytics;
pub mod auth;
pub mod error;
pub mod interactions;
pub mod movies;
pub mod notifications;
pub mod pagination;
pub mod recommendations;
pub mod types;

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::server::AppState;

pub fn build_api_router(state: AppState) -> Router<AppState> {
    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route(
            "/me",
            get(auth::me).put(auth::update_me).delete(auth::delete_me),
        );

    let movie_routes = Router::new()
        .route("/", get(movies::list_movies))
        .route("/popular", get(movies::popular_movies))
        .route("/top-rated", get(movies::top_rated_movies))
        .route("/recent", get(movies::recent_movies))
        .route("/:id", get(movies::get_movie))
        .route("/:id/similar", get(movies::similar_movies))
        .route("/:id/interactions", get(interactions::movie_summary))
        .route("/:id/metrics", get(analytics::movie_metrics));

    let genre_routes = Router::new()
        .route("/", get(movies::list_genres))
        .route("/:slug/movies", get(movies::genre_movies));

    let interaction_routes = Router::new()
        .route(
            "/",
            get(interactions::list_interactions).post(interactions::record_interaction),
        )
        .route("/:id/feedback", patch(interactions::update_feedback));

    let recommendation_routes = Router::new()
        .route("/", get(recommendations::list_recommendations))
        .route("/:id/click", post(recommendations::click_recommendation))
        .route("/generate", post(recommendations::generate))
        .route("/performance", get(recommendations::performance));

    let notification_routes = Router::new()
        .route(
            "/preferences",
            get(notifications::get_preferences).put(notifications::update_preferences),
        )
        .route("/logs", get(notifications::list_logs))
        .route("/logs/:id/status", post(notifications::status_callback));

    let analytics_routes = Router::new()
        .route("/log", post(analytics::log_activity))
        .route("/activity", get(analytics::activity_feed))
        .route("/trending", get(analytics::trending));

    Router::new()
        .nest("/auth", auth_routes)
        .nest("/movies", movie_routes)
        .nest("/genres", genre_routes)
        .nest("/interactions", interaction_routes)
        .nest("/recommendations", recommendation_routes)
        .nest("/notifications", notification_routes)
        .nest("/analytics", analytics_routes)
        .layer(axum::middleware::from_fn_with_state(
            state,
            auth::auth_middleware,
        ))
}
