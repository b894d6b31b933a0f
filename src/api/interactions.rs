use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;

use crate::db::{
    ActivityLog, ActivityRepo, FeedbackKind, Interaction, InteractionKind, InteractionRepo,
    InteractionSummary, MovieRepo, ACTION_MOVIE_LIKE, ACTION_MOVIE_RATING, ACTION_MOVIE_VIEW,
};
use crate::server::AppState;

use super::auth::AuthSession;
use super::error::{ApiError, ApiResult};

#[derive(Debug, Deserialize)]
pub struct RecordInteractionRequest {
    pub movie_id: i64,
    #[serde(rename = "type")]
    pub kind: InteractionKind,
    pub rating: Option<f64>,
    pub source: Option<String>,
}

/// Record or refresh an interaction. A repeated (movie, type) pair from the
/// same user updates the earlier row rather than adding a second one.
pub async fn record_interaction(
    State(state): State<AppState>,
    session: AuthSession,
    Json(req): Json<RecordInteractionRequest>,
) -> ApiResult<(StatusCode, Json<Interaction>)> {
    match (req.kind, req.rating) {
        (InteractionKind::Rating, None) => {
            return Err(ApiError::BadRequest(
                "rating interactions require a rating".to_string(),
            ))
        }
        (InteractionKind::Rating, Some(r)) if !(1.0..=5.0).contains(&r) => {
            return Err(ApiError::BadRequest(format!(
                "rating {} out of range 1-5",
                r
            )))
        }
        (kind, Some(_)) if kind != InteractionKind::Rating => {
            return Err(ApiError::BadRequest(
                "rating only applies to rating interactions".to_string(),
            ))
        }
        _ => {}
    }

    // 404 before touching the interactions table
    state.db.get_movie(req.movie_id).await?;

    let stored = state
        .db
        .upsert_interaction(&Interaction {
            id: 0,
            user_id: session.user.id.clone(),
            movie_id: req.movie_id,
            kind: req.kind,
            rating: req.rating,
            feedback: None,
            feedback_comment: None,
            source: req.source.clone(),
            created_at: Utc::now(),
        })
        .await?;

    if req.kind == InteractionKind::Like {
        state.db.increment_like_count(req.movie_id).await?;
    }

    state
        .db
        .insert_activity(&ActivityLog {
            id: 0,
            user_id: Some(session.user.id),
            session_id: None,
            action: action_for(req.kind).to_string(),
            movie_id: Some(req.movie_id),
            ip_address: None,
            user_agent: None,
            referer: None,
            source: req.source,
            metadata: None,
            created_at: Utc::now(),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(stored)))
}

fn action_for(kind: InteractionKind) -> &'static str {
    match kind {
        InteractionKind::View => ACTION_MOVIE_VIEW,
        InteractionKind::Like => ACTION_MOVIE_LIKE,
        InteractionKind::Rating => ACTION_MOVIE_RATING,
        InteractionKind::Dislike => "movie_dislike",
        InteractionKind::Click => "movie_click",
        InteractionKind::Favorite => "movie_favorite",
        InteractionKind::Watchlist => "movie_watchlist",
    }
}

#[derive(Debug, Deserialize)]
pub struct ListInteractionsParams {
    #[serde(rename = "type")]
    pub kind: Option<InteractionKind>,
}

pub async fn list_interactions(
    State(state): State<AppState>,
    session: AuthSession,
    Query(params): Query<ListInteractionsParams>,
) -> ApiResult<Json<Vec<Interaction>>> {
    let rows = state
        .db
        .list_user_interactions(&session.user.id, params.kind)
        .await?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub feedback: FeedbackKind,
    pub comment: Option<String>,
}

pub async fn update_feedback(
    State(state): State<AppState>,
    session: AuthSession,
    Path(id): Path<i64>,
    Json(req): Json<FeedbackRequest>,
) -> ApiResult<Json<Interaction>> {
    let interaction = state.db.get_interaction(id).await?;
    if interaction.user_id != session.user.id {
        return Err(ApiError::Forbidden);
    }

    state
        .db
        .update_feedback(id, req.feedback, req.comment.as_deref())
        .await?;
    Ok(Json(state.db.get_interaction(id).await?))
}

pub async fn movie_summary(
    State(state): State<AppState>,
    Path(movie_id): Path<i64>,
) -> ApiResult<Json<InteractionSummary>> {
    state.db.get_movie(movie_id).await?;
    Ok(Json(state.db.movie_interaction_summary(movie_id).await?))
}
