use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::db::{ActivityLog, ActivityRepo, MetricsRepo, MovieRepo, PopularityMetric};
use crate::server::AppState;

use super::auth::AuthSession;
use super::error::ApiResult;
use super::types::MovieSummary;

#[derive(Debug, Deserialize)]
pub struct LogActivityRequest {
    pub action: String,
    pub movie_id: Option<i64>,
    pub session_id: Option<String>,
    pub source: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// Append one activity row. Works without a token; when one is presented
/// the row is attributed to the caller.
pub async fn log_activity(
    State(state): State<AppState>,
    session: Option<AuthSession>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<LogActivityRequest>,
) -> ApiResult<StatusCode> {
    if let Some(movie_id) = req.movie_id {
        state.db.get_movie(movie_id).await?;
    }

    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let referer = headers
        .get(axum::http::header::REFERER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    state
        .db
        .insert_activity(&ActivityLog {
            id: 0,
            user_id: session.map(|s| s.user.id),
            session_id: req.session_id,
            action: req.action,
            movie_id: req.movie_id,
            ip_address: Some(addr.ip().to_string()),
            user_agent,
            referer,
            source: req.source,
            metadata: req.metadata.map(|m| m.to_string()),
            created_at: Utc::now(),
        })
        .await?;

    Ok(StatusCode::CREATED)
}

#[derive(Debug, Deserialize)]
pub struct ActivityFeedParams {
    pub limit: Option<i64>,
}

pub async fn activity_feed(
    State(state): State<AppState>,
    session: AuthSession,
    Query(params): Query<ActivityFeedParams>,
) -> ApiResult<Json<Vec<ActivityLog>>> {
    let limit = params.limit.unwrap_or(50).clamp(1, 200);
    Ok(Json(
        state.db.list_user_activity(&session.user.id, limit).await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct TrendingParams {
    pub days: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct TrendingEntry {
    pub movie: MovieSummary,
    pub engagement: f64,
}

/// Movies ranked by rolled-up engagement over the last `days` days.
pub async fn trending(
    State(state): State<AppState>,
    Query(params): Query<TrendingParams>,
) -> ApiResult<Json<Vec<TrendingEntry>>> {
    let days = params.days.unwrap_or(7).clamp(1, 90);
    let limit = params.limit.unwrap_or(10).clamp(1, 50);
    let since = Utc::now().date_naive() - Duration::days(days);

    let ranked = state.db.trending(since, limit).await?;
    let mut out = Vec::with_capacity(ranked.len());
    for (movie_id, engagement) in ranked {
        let movie = state.db.get_movie(movie_id).await?;
        out.push(TrendingEntry {
            movie: MovieSummary::from(&movie),
            engagement,
        });
    }
    Ok(Json(out))
}

#[derive(Debug, Deserialize)]
pub struct MetricsParams {
    pub limit: Option<i64>,
}

/// Daily popularity rows for one movie, newest first.
pub async fn movie_metrics(
    State(state): State<AppState>,
    _session: AuthSession,
    Path(movie_id): Path<i64>,
    Query(params): Query<MetricsParams>,
) -> ApiResult<Json<Vec<PopularityMetric>>> {
    state.db.get_movie(movie_id).await?;
    let limit = params.limit.unwrap_or(30).clamp(1, 365);
    Ok(Json(state.db.movie_metrics(movie_id, limit).await?))
}
