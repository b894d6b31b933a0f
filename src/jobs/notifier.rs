use chrono::{Duration, Utc};
use tracing::{info, warn};

use crate::db::{
    DbResult, MovieRepo, NotificationChannel, NotificationLog, NotificationRepo,
    NotificationStatus, RecommendationRepo, SqliteRepository, User, UserRepo,
};
use crate::notify::EmailClient;

/// Fresh recommendations younger than this go into an alert.
const ALERT_WINDOW_HOURS: i64 = 24;
/// At most one alert per user per window.
const MAX_MOVIES_PER_ALERT: i64 = 5;

/// Send recommendation alert emails to users who opted in. Every attempt is
/// written to the notification log first, then advanced to sent or failed.
pub async fn deliver_recommendation_alerts(
    db: &SqliteRepository,
    email: &EmailClient,
) -> DbResult<()> {
    let mut sent = 0usize;
    for user in db.list_active_users().await? {
        if let Some(delivered) = alert_user(db, email, &user).await? {
            if delivered {
                sent += 1;
            }
        }
    }
    if sent > 0 {
        info!(sent, "Recommendation alerts delivered");
    }
    Ok(())
}

/// Returns None when the user was skipped, Some(delivered) otherwise.
async fn alert_user(
    db: &SqliteRepository,
    email: &EmailClient,
    user: &User,
) -> DbResult<Option<bool>> {
    let prefs = db.get_preferences(&user.id).await?;
    if !prefs.recommendation_alerts {
        return Ok(None);
    }

    let now = Utc::now();
    let window_start = now - Duration::hours(ALERT_WINDOW_HOURS);

    // one alert per window
    let recent = db.list_user_logs(&user.id, 1).await?;
    if recent
        .first()
        .map(|log| log.created_at > window_start)
        .unwrap_or(false)
    {
        return Ok(None);
    }

    let recs = db
        .fresh_unclicked(&user.id, window_start, MAX_MOVIES_PER_ALERT)
        .await?;
    if recs.is_empty() {
        return Ok(None);
    }

    let mut titles = Vec::with_capacity(recs.len());
    for rec in &recs {
        titles.push(db.get_movie(rec.movie_id).await?.title);
    }

    let subject = format!("{} new picks for you", titles.len());
    let body = format!(
        "Hi {},\n\nWe found movies you might like:\n\n{}\n",
        user.display_name(),
        titles
            .iter()
            .map(|t| format!("  - {}", t))
            .collect::<Vec<_>>()
            .join("\n")
    );

    let log_id = db
        .insert_log(&NotificationLog {
            id: 0,
            user_id: user.id.clone(),
            channel: NotificationChannel::Email,
            subject,
            body,
            recipient: user.email.clone(),
            status: NotificationStatus::Pending,
            external_id: None,
            error_message: None,
            sent_at: None,
            delivered_at: None,
            opened_at: None,
            clicked_at: None,
            failed_at: None,
            created_at: now,
        })
        .await?;
    let log = db.get_log(log_id).await?;

    match email.send(&log.recipient, &log.subject, &log.body).await {
        Ok(external_id) => {
            db.advance_log_status(
                log_id,
                NotificationStatus::Sent,
                Some(&external_id),
                None,
                Utc::now(),
            )
            .await?;
            Ok(Some(true))
        }
        Err(e) => {
            warn!(user = %user.username, "Alert delivery failed: {}", e);
            db.advance_log_status(
                log_id,
                NotificationStatus::Failed,
                None,
                Some(&e.to_string()),
                Utc::now(),
            )
            .await?;
            Ok(Some(false))
        }
    }
}
