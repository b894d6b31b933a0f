use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    pub country: String,
    pub preferred_language: String,
    pub date_of_birth: Option<NaiveDate>,
    pub is_premium: bool,
    pub is_active: bool,
    pub favorite_genres: String,
    pub diversity: f64,
    pub novelty: f64,
    pub device_token: Option<String>,
    pub device_type: Option<String>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Favorite genre ids, stored as a JSON array in a text column.
    pub fn favorite_genre_ids(&self) -> Vec<i64> {
        serde_json::from_str(&self.favorite_genres).unwrap_or_default()
    }

    pub fn set_favorite_genre_ids(&mut self, ids: &[i64]) {
        self.favorite_genres = serde_json::to_string(ids).unwrap_or_else(|_| "[]".to_string());
    }

    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AccessToken {
    pub token: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Genre {
    pub id: i64,
    pub tmdb_id: i64,
    pub name: String,
    pub slug: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Movie {
    pub id: i64,
    pub tmdb_id: i64,
    pub imdb_id: Option<String>,
    pub title: String,
    pub original_title: String,
    pub overview: String,
    pub tagline: String,
    pub release_date: Option<NaiveDate>,
    pub runtime: Option<i64>,
    pub director: Option<String>,
    pub main_cast: String,
    pub tmdb_rating: Option<f64>,
    pub tmdb_vote_count: i64,
    pub imdb_rating: Option<f64>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub popularity: f64,
    pub view_count: i64,
    pub like_count: i64,
    pub adult: bool,
    pub original_language: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Movie {
    pub fn main_cast_names(&self) -> Vec<String> {
        serde_json::from_str(&self.main_cast).unwrap_or_default()
    }

    pub fn year(&self) -> Option<i32> {
        use chrono::Datelike;
        self.release_date.map(|d| d.year())
    }

    pub fn poster_url(&self) -> Option<String> {
        self.poster_path
            .as_ref()
            .map(|p| format!("https://image.tmdb.org/t/p/w500{}", p))
    }
}

/// A recorded user action on a movie. One row per (user, movie, kind).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum InteractionKind {
    View,
    Like,
    Dislike,
    Click,
    Rating,
    Favorite,
    Watchlist,
}

impl InteractionKind {
    /// Relative weight used by the genre-affinity scorer.
    pub fn engagement_weight(&self) -> f64 {
        match self {
            InteractionKind::View => 1.0,
            InteractionKind::Like => 3.0,
            InteractionKind::Dislike => -2.0,
            InteractionKind::Click => 1.5,
            InteractionKind::Rating => 2.0,
            InteractionKind::Favorite => 5.0,
            InteractionKind::Watchlist => 4.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum FeedbackKind {
    Positive,
    Negative,
    Neutral,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Interaction {
    pub id: i64,
    pub user_id: String,
    pub movie_id: i64,
    pub kind: InteractionKind,
    pub rating: Option<f64>,
    pub feedback: Option<FeedbackKind>,
    pub feedback_comment: Option<String>,
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Recommendation {
    pub id: i64,
    pub user_id: String,
    pub movie_id: i64,
    pub algorithm: String,
    pub score: f64,
    pub generated_at: DateTime<Utc>,
    pub clicked: bool,
    pub clicked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationPreferences {
    pub user_id: String,
    pub weekly_digest: bool,
    pub recommendation_alerts: bool,
    pub trending_alerts: bool,
    pub push_recommendations: bool,
    pub digest_day: i64,
    pub digest_time: String,
    pub timezone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum NotificationChannel {
    Email,
    Push,
}

/// Delivery state of an outbound notification. Transitions are one-way:
/// pending -> sent -> delivered -> opened -> clicked, with failed reachable
/// only from pending or sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Delivered,
    Opened,
    Clicked,
    Failed,
}

impl NotificationStatus {
    fn rank(&self) -> u8 {
        match self {
            NotificationStatus::Pending => 0,
            NotificationStatus::Sent => 1,
            NotificationStatus::Delivered => 2,
            NotificationStatus::Failed => 2,
            NotificationStatus::Opened => 3,
            NotificationStatus::Clicked => 4,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, NotificationStatus::Clicked | NotificationStatus::Failed)
    }

    /// Whether the status may move from `self` to `next`.
    pub fn can_advance_to(&self, next: NotificationStatus) -> bool {
        if self.is_terminal() || *self == next {
            return false;
        }
        if next == NotificationStatus::Failed {
            return matches!(self, NotificationStatus::Pending | NotificationStatus::Sent);
        }
        next.rank() > self.rank()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationLog {
    pub id: i64,
    pub user_id: String,
    pub channel: NotificationChannel,
    pub subject: String,
    pub body: String,
    pub recipient: String,
    pub status: NotificationStatus,
    pub external_id: Option<String>,
    pub error_message: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub opened_at: Option<DateTime<Utc>>,
    pub clicked_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Well-known activity action names, shared by the API and the rollup job.
pub const ACTION_MOVIE_VIEW: &str = "movie_view";
pub const ACTION_MOVIE_LIKE: &str = "movie_like";
pub const ACTION_MOVIE_RATING: &str = "movie_rating";
pub const ACTION_RECOMMENDATION_CLICK: &str = "recommendation_click";

/// Append-only activity row. The user reference is nullable so history
/// survives, anonymized, when an account is deleted.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ActivityLog {
    pub id: i64,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub action: String,
    pub movie_id: Option<i64>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub source: Option<String>,
    pub metadata: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ActivityLog {
    pub fn metadata_json(&self) -> serde_json::Value {
        self.metadata
            .as_deref()
            .and_then(|m| serde_json::from_str(m).ok())
            .unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PopularityMetric {
    pub id: i64,
    pub movie_id: i64,
    pub date: NaiveDate,
    pub view_count: i64,
    pub like_count: i64,
    pub rating_count: i64,
    pub average_rating: f64,
    pub recommendation_clicks: i64,
    pub click_through_rate: f64,
}

impl PopularityMetric {
    /// Composite score used for trending displays.
    pub fn engagement_score(&self) -> f64 {
        self.view_count as f64
            + self.like_count as f64 * 2.0
            + self.rating_count as f64 * 3.0
            + self.recommendation_clicks as f64 * 1.5
            + self.click_through_rate * 100.0
            + self.average_rating * 10.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Experiment {
    pub id: i64,
    pub name: String,
    pub algorithm_a: String,
    pub algorithm_b: String,
    pub traffic_split: f64,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub is_active: bool,
}

impl Experiment {
    pub fn is_running(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.starts_at <= now && now <= self.ends_at
    }
}

/// Per-algorithm aggregate used for A/B comparison.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AlgorithmStats {
    pub algorithm: String,
    pub total: i64,
    pub clicked: i64,
    pub avg_score: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    #[error("Invalid value: {0}")]
    Invalid(String),
}

pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_status_moves_forward_only() {
        use NotificationStatus::*;
        assert!(Pending.can_advance_to(Sent));
        assert!(Sent.can_advance_to(Delivered));
        assert!(Delivered.can_advance_to(Opened));
        assert!(Opened.can_advance_to(Clicked));
        // skipping a step forward is fine
        assert!(Delivered.can_advance_to(Clicked));

        assert!(!Sent.can_advance_to(Pending));
        assert!(!Delivered.can_advance_to(Sent));
        assert!(!Clicked.can_advance_to(Opened));
    }

    #[test]
    fn failed_only_from_pending_or_sent() {
        use NotificationStatus::*;
        assert!(Pending.can_advance_to(Failed));
        assert!(Sent.can_advance_to(Failed));
        assert!(!Delivered.can_advance_to(Failed));
        assert!(!Opened.can_advance_to(Failed));
        assert!(!Failed.can_advance_to(Sent));
    }

    #[test]
    fn favorite_genres_round_trip() {
        let mut user = test_user();
        user.set_favorite_genre_ids(&[28, 35, 18]);
        assert_eq!(user.favorite_genre_ids(), vec![28, 35, 18]);

        user.favorite_genres = "not json".to_string();
        assert!(user.favorite_genre_ids().is_empty());
    }

    #[test]
    fn display_name_falls_back_to_username() {
        let mut user = test_user();
        assert_eq!(user.display_name(), "moviefan");
        user.first_name = "Ada".to_string();
        assert_eq!(user.display_name(), "Ada");
        user.last_name = "Lovelace".to_string();
        assert_eq!(user.display_name(), "Ada Lovelace");
    }

    fn test_user() -> User {
        User {
            id: "u1".to_string(),
            username: "moviefan".to_string(),
            email: "fan@example.com".to_string(),
            password_hash: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            bio: String::new(),
            country: String::new(),
            preferred_language: "en".to_string(),
            date_of_birth: None,
            is_premium: false,
            is_active: true,
            favorite_genres: "[]".to_string(),
            diversity: 0.5,
            novelty: 0.5,
            device_token: None,
            device_type: None,
            last_login: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
