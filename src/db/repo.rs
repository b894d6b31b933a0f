use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use super::model::*;

/// Filters and ordering for movie catalog listings.
#[derive(Debug, Default, Clone)]
pub struct MovieFilter {
    pub genre_slug: Option<String>,
    pub min_rating: Option<f64>,
    pub release_year: Option<i32>,
    pub released_after: Option<chrono::NaiveDate>,
    pub search: Option<String>,
    pub include_adult: bool,
    pub order: MovieOrder,
    pub offset: i64,
    pub limit: i64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum MovieOrder {
    #[default]
    Popularity,
    Rating,
    ReleaseDate,
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn get_user(&self, username: &str) -> DbResult<User>;
    async fn get_user_by_id(&self, id: &str) -> DbResult<User>;
    async fn get_user_by_email(&self, email: &str) -> DbResult<User>;
    async fn create_user(&self, user: &User) -> DbResult<()>;
    async fn update_user(&self, user: &User) -> DbResult<()>;
    async fn delete_user(&self, id: &str) -> DbResult<()>;
    async fn list_active_users(&self) -> DbResult<Vec<User>>;
}

#[async_trait]
pub trait AccessTokenRepo: Send + Sync {
    async fn get_token(&self, token: &str) -> DbResult<AccessToken>;
    async fn insert_token(&self, token: &AccessToken) -> DbResult<()>;
    async fn delete_token(&self, token: &str) -> DbResult<()>;
    async fn touch_token(&self, token: &str, when: DateTime<Utc>) -> DbResult<()>;
}

#[async_trait]
pub trait GenreRepo: Send + Sync {
    async fn list_genres(&self) -> DbResult<Vec<Genre>>;
    async fn get_genre_by_slug(&self, slug: &str) -> DbResult<Genre>;
    async fn upsert_genre(&self, tmdb_id: i64, name: &str, slug: &str) -> DbResult<i64>;
}

#[async_trait]
pub trait MovieRepo: Send + Sync {
    async fn get_movie(&self, id: i64) -> DbResult<Movie>;
    async fn get_movie_by_tmdb_id(&self, tmdb_id: i64) -> DbResult<Movie>;
    async fn list_movies(&self, filter: &MovieFilter) -> DbResult<(Vec<Movie>, i64)>;
    async fn upsert_movie(&self, movie: &Movie) -> DbResult<i64>;
    async fn set_movie_genres(&self, movie_id: i64, genre_ids: &[i64]) -> DbResult<()>;
    async fn movie_genre_ids(&self, movie_id: i64) -> DbResult<Vec<i64>>;
    async fn similar_movies(&self, movie_id: i64, limit: i64) -> DbResult<Vec<Movie>>;
    async fn increment_view_count(&self, movie_id: i64) -> DbResult<()>;
    async fn increment_like_count(&self, movie_id: i64) -> DbResult<()>;
}

/// Summary of all interactions recorded against one movie.
#[derive(Debug, Clone, serde::Serialize)]
pub struct InteractionSummary {
    pub movie_id: i64,
    pub counts: Vec<(InteractionKind, i64)>,
    pub average_rating: Option<f64>,
}

#[async_trait]
pub trait InteractionRepo: Send + Sync {
    /// Record one fact per (user, movie, kind). A duplicate triple updates
    /// the existing row in place.
    async fn upsert_interaction(&self, interaction: &Interaction) -> DbResult<Interaction>;
    async fn get_interaction(&self, id: i64) -> DbResult<Interaction>;
    async fn list_user_interactions(
        &self,
        user_id: &str,
        kind: Option<InteractionKind>,
    ) -> DbResult<Vec<Interaction>>;
    async fn update_feedback(
        &self,
        id: i64,
        feedback: FeedbackKind,
        comment: Option<&str>,
    ) -> DbResult<()>;
    async fn movie_interaction_summary(&self, movie_id: i64) -> DbResult<InteractionSummary>;
    async fn interacted_movie_ids(&self, user_id: &str) -> DbResult<Vec<i64>>;
}

#[async_trait]
pub trait RecommendationRepo: Send + Sync {
    /// Store a scored row; the (user, movie, algorithm) triple is unique and
    /// a conflict refreshes score and generated_at.
    async fn upsert_recommendation(&self, rec: &Recommendation) -> DbResult<()>;
    async fn get_recommendation(&self, id: i64) -> DbResult<Recommendation>;
    async fn list_recommendations(
        &self,
        user_id: &str,
        algorithm: Option<&str>,
        limit: i64,
    ) -> DbResult<Vec<Recommendation>>;
    /// Fresh, unclicked rows used for notification digests.
    async fn fresh_unclicked(&self, user_id: &str, since: DateTime<Utc>, limit: i64)
        -> DbResult<Vec<Recommendation>>;
    /// Mark clicked once; returns the row as stored after the call.
    async fn mark_clicked(&self, id: i64, when: DateTime<Utc>) -> DbResult<Recommendation>;
    async fn algorithm_stats(&self, since: DateTime<Utc>) -> DbResult<Vec<AlgorithmStats>>;
    async fn delete_stale(&self, older_than: DateTime<Utc>) -> DbResult<u64>;
}

#[async_trait]
pub trait NotificationRepo: Send + Sync {
    async fn get_preferences(&self, user_id: &str) -> DbResult<NotificationPreferences>;
    async fn upsert_preferences(&self, prefs: &NotificationPreferences) -> DbResult<()>;
    async fn insert_log(&self, log: &NotificationLog) -> DbResult<i64>;
    async fn get_log(&self, id: i64) -> DbResult<NotificationLog>;
    async fn list_user_logs(&self, user_id: &str, limit: i64) -> DbResult<Vec<NotificationLog>>;
    /// Advance the delivery state machine. Backward or otherwise invalid
    /// transitions return `DbError::Invalid`.
    async fn advance_log_status(
        &self,
        id: i64,
        next: NotificationStatus,
        external_id: Option<&str>,
        error_message: Option<&str>,
        when: DateTime<Utc>,
    ) -> DbResult<NotificationLog>;
}

#[async_trait]
pub trait ActivityRepo: Send + Sync {
    async fn insert_activity(&self, log: &ActivityLog) -> DbResult<i64>;
    async fn list_user_activity(&self, user_id: &str, limit: i64) -> DbResult<Vec<ActivityLog>>;
    /// Movie ids that saw any activity on the given day.
    async fn active_movie_ids_on(&self, date: NaiveDate) -> DbResult<Vec<i64>>;
    /// Raw rows for one (movie, day), used by the rollup job.
    async fn movie_activity_on(&self, movie_id: i64, date: NaiveDate) -> DbResult<Vec<ActivityLog>>;
}

#[async_trait]
pub trait MetricsRepo: Send + Sync {
    async fn upsert_metric(&self, metric: &PopularityMetric) -> DbResult<()>;
    async fn movie_metrics(&self, movie_id: i64, limit: i64) -> DbResult<Vec<PopularityMetric>>;
    /// Trending movie ids by summed engagement over the window.
    async fn trending(&self, since: NaiveDate, limit: i64) -> DbResult<Vec<(i64, f64)>>;
}

#[async_trait]
pub trait ExperimentRepo: Send + Sync {
    async fn active_experiment(&self, now: DateTime<Utc>) -> DbResult<Option<Experiment>>;
    async fn insert_experiment(&self, exp: &Experiment) -> DbResult<i64>;
}

pub trait Repository:
    UserRepo
    + AccessTokenRepo
    + GenreRepo
    + MovieRepo
    + InteractionRepo
    + RecommendationRepo
    + NotificationRepo
    + ActivityRepo
    + MetricsRepo
    + ExperimentRepo
    + Send
    + Sync
{
}
