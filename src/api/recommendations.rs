use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{
    ActivityLog, ActivityRepo, AlgorithmStats, Interaction, InteractionKind, InteractionRepo,
    MovieRepo, Recommendation, RecommendationRepo, ACTION_RECOMMENDATION_CLICK,
};
use crate::jobs::recommender;
use crate::server::AppState;

use super::auth::AuthSession;
use super::error::{ApiError, ApiResult};
use super::types::MovieSummary;

const PERFORMANCE_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Deserialize)]
pub struct ListRecommendationsParams {
    pub algorithm: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RecommendationDto {
    pub id: i64,
    pub movie: MovieSummary,
    pub algorithm: String,
    pub score: f64,
    pub generated_at: chrono::DateTime<Utc>,
    pub clicked: bool,
}

/// The caller's current recommendations, best score first, with the movie
/// card inlined.
pub async fn list_recommendations(
    State(state): State<AppState>,
    session: AuthSession,
    Query(params): Query<ListRecommendationsParams>,
) -> ApiResult<Json<Vec<RecommendationDto>>> {
    let limit = params.limit.unwrap_or(20).clamp(1, 100);
    let recs = state
        .db
        .list_recommendations(&session.user.id, params.algorithm.as_deref(), limit)
        .await?;

    let mut out = Vec::with_capacity(recs.len());
    for rec in recs {
        let movie = state.db.get_movie(rec.movie_id).await?;
        out.push(RecommendationDto {
            id: rec.id,
            movie: MovieSummary::from(&movie),
            algorithm: rec.algorithm,
            score: rec.score,
            generated_at: rec.generated_at,
            clicked: rec.clicked,
        });
    }
    Ok(Json(out))
}

/// Record a click-through. Repeating the call is harmless; the first click
/// timestamp sticks.
pub async fn click_recommendation(
    State(state): State<AppState>,
    session: AuthSession,
    Path(id): Path<i64>,
) -> ApiResult<Json<Recommendation>> {
    let rec = state.db.get_recommendation(id).await?;
    if rec.user_id != session.user.id {
        return Err(ApiError::Forbidden);
    }
    let rec = state.db.mark_clicked(id, Utc::now()).await?;

    // the click also counts as an interaction and an activity event
    state
        .db
        .upsert_interaction(&Interaction {
            id: 0,
            user_id: session.user.id.clone(),
            movie_id: rec.movie_id,
            kind: InteractionKind::Click,
            rating: None,
            feedback: None,
            feedback_comment: None,
            source: Some("recommendation".to_string()),
            created_at: Utc::now(),
        })
        .await?;
    state
        .db
        .insert_activity(&ActivityLog {
            id: 0,
            user_id: Some(session.user.id),
            session_id: None,
            action: ACTION_RECOMMENDATION_CLICK.to_string(),
            movie_id: Some(rec.movie_id),
            ip_address: None,
            user_agent: None,
            referer: None,
            source: Some(rec.algorithm.clone()),
            metadata: None,
            created_at: Utc::now(),
        })
        .await?;

    Ok(Json(rec))
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub generated: usize,
}

/// Regenerate the caller's recommendations right now instead of waiting for
/// the background refresh.
pub async fn generate(
    State(state): State<AppState>,
    session: AuthSession,
) -> ApiResult<Json<GenerateResponse>> {
    let generated =
        recommender::refresh_for_user(&state.db, &session.user, &state.config.jobs).await?;
    Ok(Json(GenerateResponse { generated }))
}

#[derive(Debug, Serialize)]
pub struct AlgorithmPerformance {
    pub algorithm: String,
    pub total: i64,
    pub clicked: i64,
    pub click_through_rate: f64,
    pub avg_score: f64,
}

impl From<AlgorithmStats> for AlgorithmPerformance {
    fn from(s: AlgorithmStats) -> Self {
        let ctr = if s.total > 0 {
            s.clicked as f64 / s.total as f64
        } else {
            0.0
        };
        Self {
            algorithm: s.algorithm,
            total: s.total,
            clicked: s.clicked,
            click_through_rate: ctr,
            avg_score: s.avg_score,
        }
    }
}

/// Per-algorithm click-through over the last 30 days.
pub async fn performance(
    State(state): State<AppState>,
    _session: AuthSession,
) -> ApiResult<Json<Vec<AlgorithmPerformance>>> {
    let since = Utc::now() - Duration::days(PERFORMANCE_WINDOW_DAYS);
    let stats = state.db.algorithm_stats(since).await?;
    Ok(Json(stats.into_iter().map(Into::into).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ctr_handles_empty_window() {
        let perf = AlgorithmPerformance::from(AlgorithmStats {
            algorithm: "popularity".to_string(),
            total: 0,
            clicked: 0,
            avg_score: 0.0,
        });
        assert_eq!(perf.click_through_rate, 0.0);

        let perf = AlgorithmPerformance::from(AlgorithmStats {
            algorithm: "genre_affinity".to_string(),
            total: 8,
            clicked: 2,
            avg_score: 0.6,
        });
        assert!((perf.click_through_rate - 0.25).abs() < f64::EPSILON);
    }
}
