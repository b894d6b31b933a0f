use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;

use crate::db::{NotificationLog, NotificationPreferences, NotificationRepo, NotificationStatus};
use crate::server::AppState;

use super::auth::AuthSession;
use super::error::{ApiError, ApiResult};

/// Preferences are created with defaults the first time they are read.
pub async fn get_preferences(
    State(state): State<AppState>,
    session: AuthSession,
) -> ApiResult<Json<NotificationPreferences>> {
    Ok(Json(state.db.get_preferences(&session.user.id).await?))
}

#[derive(Debug, Deserialize)]
pub struct UpdatePreferencesRequest {
    pub weekly_digest: Option<bool>,
    pub recommendation_alerts: Option<bool>,
    pub trending_alerts: Option<bool>,
    pub push_recommendations: Option<bool>,
    pub digest_day: Option<i64>,
    pub digest_time: Option<String>,
    pub timezone: Option<String>,
}

pub async fn update_preferences(
    State(state): State<AppState>,
    session: AuthSession,
    Json(req): Json<UpdatePreferencesRequest>,
) -> ApiResult<Json<NotificationPreferences>> {
    let mut prefs = state.db.get_preferences(&session.user.id).await?;

    if let Some(v) = req.weekly_digest {
        prefs.weekly_digest = v;
    }
    if let Some(v) = req.recommendation_alerts {
        prefs.recommendation_alerts = v;
    }
    if let Some(v) = req.trending_alerts {
        prefs.trending_alerts = v;
    }
    if let Some(v) = req.push_recommendations {
        prefs.push_recommendations = v;
    }
    if let Some(v) = req.digest_day {
        if !(0..=6).contains(&v) {
            return Err(ApiError::BadRequest(
                "digest_day must be 0 (Monday) through 6 (Sunday)".to_string(),
            ));
        }
        prefs.digest_day = v;
    }
    if let Some(v) = req.digest_time {
        if chrono::NaiveTime::parse_from_str(&v, "%H:%M").is_err() {
            return Err(ApiError::BadRequest(
                "digest_time must be HH:MM".to_string(),
            ));
        }
        prefs.digest_time = v;
    }
    if let Some(v) = req.timezone {
        prefs.timezone = v;
    }

    prefs.updated_at = Utc::now();
    state.db.upsert_preferences(&prefs).await?;
    Ok(Json(prefs))
}

#[derive(Debug, Deserialize)]
pub struct ListLogsParams {
    pub limit: Option<i64>,
}

pub async fn list_logs(
    State(state): State<AppState>,
    session: AuthSession,
    Query(params): Query<ListLogsParams>,
) -> ApiResult<Json<Vec<NotificationLog>>> {
    let limit = params.limit.unwrap_or(50).clamp(1, 200);
    Ok(Json(
        state.db.list_user_logs(&session.user.id, limit).await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct StatusCallbackRequest {
    pub status: NotificationStatus,
    pub external_id: Option<String>,
    pub error_message: Option<String>,
}

/// Delivery-provider callback. The state machine only moves forward; a
/// stale or out-of-order callback gets a 409 and changes nothing.
pub async fn status_callback(
    State(state): State<AppState>,
    session: AuthSession,
    Path(id): Path<i64>,
    Json(req): Json<StatusCallbackRequest>,
) -> ApiResult<Json<NotificationLog>> {
    let log = state.db.get_log(id).await?;
    if log.user_id != session.user.id {
        return Err(ApiError::Forbidden);
    }
    if req.status == NotificationStatus::Pending {
        return Err(ApiError::BadRequest(
            "pending is not a callback status".to_string(),
        ));
    }

    let log = state
        .db
        .advance_log_status(
            id,
            req.status,
            req.external_id.as_deref(),
            req.error_message.as_deref(),
            Utc::now(),
        )
        .await?;
    Ok(Json(log))
}
