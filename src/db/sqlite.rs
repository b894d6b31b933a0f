use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

use super::model::*;
use super::repo::*;

pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    pub async fn new(db_path: &str) -> DbResult<Self> {
        let options = SqliteConnectOptions::from_str(db_path)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let repo = Self { pool };
        repo.init_schema().await?;

        info!("Database initialized at {}", db_path);

        Ok(repo)
    }

    async fn init_schema(&self) -> DbResult<()> {
        sqlx::raw_sql(include_str!("schema.sql"))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn not_found(e: sqlx::Error, what: impl FnOnce() -> String) -> DbError {
    match e {
        sqlx::Error::RowNotFound => DbError::NotFound(what()),
        _ => DbError::Sqlx(e),
    }
}

fn map_unique(e: sqlx::Error, what: impl FnOnce() -> String) -> DbError {
    if let Some(db_err) = e.as_database_error() {
        if db_err.is_unique_violation() {
            return DbError::AlreadyExists(what());
        }
    }
    DbError::Sqlx(e)
}

#[async_trait]
impl UserRepo for SqliteRepository {
    async fn get_user(&self, username: &str) -> DbResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found(e, || format!("User not found: {}", username)))
    }

    async fn get_user_by_id(&self, id: &str) -> DbResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found(e, || format!("User not found: {}", id)))
    }

    async fn get_user_by_email(&self, email: &str) -> DbResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found(e, || format!("User not found: {}", email)))
    }

    async fn create_user(&self, user: &User) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, first_name, last_name,
                bio, country, preferred_language, date_of_birth, is_premium, is_active,
                favorite_genres, diversity, novelty, device_token, device_type,
                last_login, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.bio)
        .bind(&user.country)
        .bind(&user.preferred_language)
        .bind(user.date_of_birth)
        .bind(user.is_premium)
        .bind(user.is_active)
        .bind(&user.favorite_genres)
        .bind(user.diversity)
        .bind(user.novelty)
        .bind(&user.device_token)
        .bind(&user.device_type)
        .bind(user.last_login)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, || format!("User already exists: {}", user.username)))?;
        Ok(())
    }

    async fn update_user(&self, user: &User) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE users SET email = ?, first_name = ?, last_name = ?, bio = ?,
                country = ?, preferred_language = ?, date_of_birth = ?, is_premium = ?,
                is_active = ?, favorite_genres = ?, diversity = ?, novelty = ?,
                device_token = ?, device_type = ?, last_login = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.bio)
        .bind(&user.country)
        .bind(&user.preferred_language)
        .bind(user.date_of_birth)
        .bind(user.is_premium)
        .bind(user.is_active)
        .bind(&user.favorite_genres)
        .bind(user.diversity)
        .bind(user.novelty)
        .bind(&user.device_token)
        .bind(&user.device_type)
        .bind(user.last_login)
        .bind(user.updated_at)
        .bind(&user.id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("User not found: {}", user.id)));
        }
        Ok(())
    }

    async fn delete_user(&self, id: &str) -> DbResult<()> {
        // Foreign keys handle the rest: dependent rows cascade, activity
        // logs keep their rows with user_id nulled.
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("User not found: {}", id)));
        }
        Ok(())
    }

    async fn list_active_users(&self) -> DbResult<Vec<User>> {
        Ok(
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE is_active = 1")
                .fetch_all(&self.pool)
                .await?,
        )
    }
}

#[async_trait]
impl AccessTokenRepo for SqliteRepository {
    async fn get_token(&self, token: &str) -> DbResult<AccessToken> {
        sqlx::query_as::<_, AccessToken>("SELECT * FROM access_tokens WHERE token = ?")
            .bind(token)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found(e, || "Token not found".to_string()))
    }

    async fn insert_token(&self, token: &AccessToken) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO access_tokens (token, user_id, created_at, last_used) VALUES (?, ?, ?, ?)",
        )
        .bind(&token.token)
        .bind(&token.user_id)
        .bind(token.created_at)
        .bind(token.last_used)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_token(&self, token: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM access_tokens WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn touch_token(&self, token: &str, when: DateTime<Utc>) -> DbResult<()> {
        sqlx::query("UPDATE access_tokens SET last_used = ? WHERE token = ?")
            .bind(when)
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl GenreRepo for SqliteRepository {
    async fn list_genres(&self) -> DbResult<Vec<Genre>> {
        Ok(
            sqlx::query_as::<_, Genre>("SELECT * FROM genres ORDER BY name")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn get_genre_by_slug(&self, slug: &str) -> DbResult<Genre> {
        sqlx::query_as::<_, Genre>("SELECT * FROM genres WHERE slug = ?")
            .bind(slug)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found(e, || format!("Genre not found: {}", slug)))
    }

    async fn upsert_genre(&self, tmdb_id: i64, name: &str, slug: &str) -> DbResult<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO genres (tmdb_id, name, slug, created_at) VALUES (?, ?, ?, ?)
             ON CONFLICT (tmdb_id) DO UPDATE SET name = excluded.name, slug = excluded.slug
             RETURNING id",
        )
        .bind(tmdb_id)
        .bind(name)
        .bind(slug)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }
}

#[async_trait]
impl MovieRepo for SqliteRepository {
    async fn get_movie(&self, id: i64) -> DbResult<Movie> {
        sqlx::query_as::<_, Movie>("SELECT * FROM movies WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found(e, || format!("Movie not found: {}", id)))
    }

    async fn get_movie_by_tmdb_id(&self, tmdb_id: i64) -> DbResult<Movie> {
        sqlx::query_as::<_, Movie>("SELECT * FROM movies WHERE tmdb_id = ?")
            .bind(tmdb_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found(e, || format!("Movie not found: tmdb {}", tmdb_id)))
    }

    async fn list_movies(&self, filter: &MovieFilter) -> DbResult<(Vec<Movie>, i64)> {
        let mut qb = sqlx::QueryBuilder::new("SELECT m.* FROM movies m");
        let mut cb = sqlx::QueryBuilder::new("SELECT COUNT(*) FROM movies m");
        for builder in [&mut qb, &mut cb] {
            if let Some(ref slug) = filter.genre_slug {
                builder.push(
                    " JOIN movie_genres mg ON mg.movie_id = m.id \
                      JOIN genres g ON g.id = mg.genre_id AND g.slug = ",
                );
                builder.push_bind(slug.clone());
            }
            builder.push(" WHERE 1 = 1");
            if !filter.include_adult {
                builder.push(" AND m.adult = 0");
            }
            if let Some(min_rating) = filter.min_rating {
                builder.push(" AND m.tmdb_rating >= ");
                builder.push_bind(min_rating);
            }
            if let Some(year) = filter.release_year {
                builder.push(" AND m.release_date >= ");
                builder.push_bind(format!("{:04}-01-01", year));
                builder.push(" AND m.release_date <= ");
                builder.push_bind(format!("{:04}-12-31", year));
            }
            if let Some(after) = filter.released_after {
                builder.push(" AND m.release_date >= ");
                builder.push_bind(after);
            }
            if let Some(ref search) = filter.search {
                let pattern = format!("%{}%", search);
                builder.push(" AND (m.title LIKE ");
                builder.push_bind(pattern.clone());
                builder.push(" OR m.overview LIKE ");
                builder.push_bind(pattern.clone());
                builder.push(" OR m.director LIKE ");
                builder.push_bind(pattern);
                builder.push(")");
            }
        }
        qb.push(match filter.order {
            MovieOrder::Popularity => " ORDER BY m.popularity DESC, m.release_date DESC",
            MovieOrder::Rating => " ORDER BY m.tmdb_rating DESC",
            MovieOrder::ReleaseDate => " ORDER BY m.release_date DESC",
        });
        qb.push(" LIMIT ");
        qb.push_bind(filter.limit);
        qb.push(" OFFSET ");
        qb.push_bind(filter.offset);

        let movies = qb.build_query_as::<Movie>().fetch_all(&self.pool).await?;
        let total: i64 = cb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok((movies, total))
    }

    async fn upsert_movie(&self, movie: &Movie) -> DbResult<i64> {
        // Counters (view_count, like_count) are owned by the API side and
        // deliberately left alone when a sync refreshes metadata.
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO movies (tmdb_id, imdb_id, title, original_title, overview, tagline,
                release_date, runtime, director, main_cast, tmdb_rating, tmdb_vote_count,
                imdb_rating, poster_path, backdrop_path, popularity, adult, original_language,
                created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (tmdb_id) DO UPDATE SET
                imdb_id = excluded.imdb_id,
                title = excluded.title,
                original_title = excluded.original_title,
                overview = excluded.overview,
                tagline = excluded.tagline,
                release_date = excluded.release_date,
                runtime = excluded.runtime,
                director = excluded.director,
                main_cast = excluded.main_cast,
                tmdb_rating = excluded.tmdb_rating,
                tmdb_vote_count = excluded.tmdb_vote_count,
                imdb_rating = excluded.imdb_rating,
                poster_path = excluded.poster_path,
                backdrop_path = excluded.backdrop_path,
                popularity = excluded.popularity,
                adult = excluded.adult,
                original_language = excluded.original_language,
                updated_at = excluded.updated_at
             RETURNING id",
        )
        .bind(movie.tmdb_id)
        .bind(&movie.imdb_id)
        .bind(&movie.title)
        .bind(&movie.original_title)
        .bind(&movie.overview)
        .bind(&movie.tagline)
        .bind(movie.release_date)
        .bind(movie.runtime)
        .bind(&movie.director)
        .bind(&movie.main_cast)
        .bind(movie.tmdb_rating)
        .bind(movie.tmdb_vote_count)
        .bind(movie.imdb_rating)
        .bind(&movie.poster_path)
        .bind(&movie.backdrop_path)
        .bind(movie.popularity)
        .bind(movie.adult)
        .bind(&movie.original_language)
        .bind(movie.created_at)
        .bind(movie.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn set_movie_genres(&self, movie_id: i64, genre_ids: &[i64]) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM movie_genres WHERE movie_id = ?")
            .bind(movie_id)
            .execute(&mut *tx)
            .await?;
        for genre_id in genre_ids {
            sqlx::query(
                "INSERT OR IGNORE INTO movie_genres (movie_id, genre_id) VALUES (?, ?)",
            )
            .bind(movie_id)
            .bind(genre_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn movie_genre_ids(&self, movie_id: i64) -> DbResult<Vec<i64>> {
        Ok(
            sqlx::query_scalar("SELECT genre_id FROM movie_genres WHERE movie_id = ?")
                .bind(movie_id)
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn similar_movies(&self, movie_id: i64, limit: i64) -> DbResult<Vec<Movie>> {
        Ok(sqlx::query_as::<_, Movie>(
            "SELECT m.* FROM movies m
             JOIN movie_genres mg ON mg.movie_id = m.id
             WHERE mg.genre_id IN (SELECT genre_id FROM movie_genres WHERE movie_id = ?)
               AND m.id != ?
             GROUP BY m.id
             ORDER BY COUNT(mg.genre_id) DESC, m.popularity DESC
             LIMIT ?",
        )
        .bind(movie_id)
        .bind(movie_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn increment_view_count(&self, movie_id: i64) -> DbResult<()> {
        sqlx::query("UPDATE movies SET view_count = view_count + 1 WHERE id = ?")
            .bind(movie_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn increment_like_count(&self, movie_id: i64) -> DbResult<()> {
        sqlx::query("UPDATE movies SET like_count = like_count + 1 WHERE id = ?")
            .bind(movie_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl InteractionRepo for SqliteRepository {
    async fn upsert_interaction(&self, interaction: &Interaction) -> DbResult<Interaction> {
        if let Some(rating) = interaction.rating {
            if interaction.kind != InteractionKind::Rating {
                return Err(DbError::Invalid(
                    "rating only applies to rating interactions".to_string(),
                ));
            }
            if !(1.0..=5.0).contains(&rating) {
                return Err(DbError::Invalid(format!(
                    "rating {} out of range 1-5",
                    rating
                )));
            }
        } else if interaction.kind == InteractionKind::Rating {
            return Err(DbError::Invalid(
                "rating interactions require a rating value".to_string(),
            ));
        }

        Ok(sqlx::query_as::<_, Interaction>(
            "INSERT INTO interactions (user_id, movie_id, kind, rating, feedback,
                feedback_comment, source, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (user_id, movie_id, kind) DO UPDATE SET
                rating = excluded.rating,
                feedback = COALESCE(excluded.feedback, feedback),
                feedback_comment = COALESCE(excluded.feedback_comment, feedback_comment),
                source = excluded.source,
                created_at = excluded.created_at
             RETURNING *",
        )
        .bind(&interaction.user_id)
        .bind(interaction.movie_id)
        .bind(interaction.kind)
        .bind(interaction.rating)
        .bind(interaction.feedback)
        .bind(&interaction.feedback_comment)
        .bind(&interaction.source)
        .bind(interaction.created_at)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn get_interaction(&self, id: i64) -> DbResult<Interaction> {
        sqlx::query_as::<_, Interaction>("SELECT * FROM interactions WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found(e, || format!("Interaction not found: {}", id)))
    }

    async fn list_user_interactions(
        &self,
        user_id: &str,
        kind: Option<InteractionKind>,
    ) -> DbResult<Vec<Interaction>> {
        let rows = match kind {
            Some(kind) => {
                sqlx::query_as::<_, Interaction>(
                    "SELECT * FROM interactions WHERE user_id = ? AND kind = ?
                     ORDER BY created_at DESC",
                )
                .bind(user_id)
                .bind(kind)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Interaction>(
                    "SELECT * FROM interactions WHERE user_id = ? ORDER BY created_at DESC",
                )
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows)
    }

    async fn update_feedback(
        &self,
        id: i64,
        feedback: FeedbackKind,
        comment: Option<&str>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE interactions SET feedback = ?, feedback_comment = ? WHERE id = ?",
        )
        .bind(feedback)
        .bind(comment)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("Interaction not found: {}", id)));
        }
        Ok(())
    }

    async fn movie_interaction_summary(&self, movie_id: i64) -> DbResult<InteractionSummary> {
        let counts = sqlx::query_as::<_, (InteractionKind, i64)>(
            "SELECT kind, COUNT(*) FROM interactions WHERE movie_id = ? GROUP BY kind",
        )
        .bind(movie_id)
        .fetch_all(&self.pool)
        .await?;

        let average_rating: Option<f64> = sqlx::query_scalar(
            "SELECT AVG(rating) FROM interactions
             WHERE movie_id = ? AND kind = 'rating' AND rating IS NOT NULL",
        )
        .bind(movie_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(InteractionSummary {
            movie_id,
            counts,
            average_rating,
        })
    }

    async fn interacted_movie_ids(&self, user_id: &str) -> DbResult<Vec<i64>> {
        Ok(sqlx::query_scalar(
            "SELECT DISTINCT movie_id FROM interactions WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }
}

#[async_trait]
impl RecommendationRepo for SqliteRepository {
    async fn upsert_recommendation(&self, rec: &Recommendation) -> DbResult<()> {
        if !(0.0..=1.0).contains(&rec.score) {
            return Err(DbError::Invalid(format!(
                "score {} out of range 0-1",
                rec.score
            )));
        }
        sqlx::query(
            "INSERT INTO recommendations (user_id, movie_id, algorithm, score, generated_at,
                clicked, clicked_at)
             VALUES (?, ?, ?, ?, ?, 0, NULL)
             ON CONFLICT (user_id, movie_id, algorithm) DO UPDATE SET
                score = excluded.score,
                generated_at = excluded.generated_at",
        )
        .bind(&rec.user_id)
        .bind(rec.movie_id)
        .bind(&rec.algorithm)
        .bind(rec.score)
        .bind(rec.generated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_recommendation(&self, id: i64) -> DbResult<Recommendation> {
        sqlx::query_as::<_, Recommendation>("SELECT * FROM recommendations WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found(e, || format!("Recommendation not found: {}", id)))
    }

    async fn list_recommendations(
        &self,
        user_id: &str,
        algorithm: Option<&str>,
        limit: i64,
    ) -> DbResult<Vec<Recommendation>> {
        let rows = match algorithm {
            Some(algorithm) => {
                sqlx::query_as::<_, Recommendation>(
                    "SELECT * FROM recommendations WHERE user_id = ? AND algorithm = ?
                     ORDER BY score DESC, generated_at DESC LIMIT ?",
                )
                .bind(user_id)
                .bind(algorithm)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Recommendation>(
                    "SELECT * FROM recommendations WHERE user_id = ?
                     ORDER BY score DESC, generated_at DESC LIMIT ?",
                )
                .bind(user_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows)
    }

    async fn fresh_unclicked(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        limit: i64,
    ) -> DbResult<Vec<Recommendation>> {
        Ok(sqlx::query_as::<_, Recommendation>(
            "SELECT * FROM recommendations
             WHERE user_id = ? AND clicked = 0 AND generated_at >= ?
             ORDER BY score DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn mark_clicked(&self, id: i64, when: DateTime<Utc>) -> DbResult<Recommendation> {
        // clicked_at keeps its first value if the click is repeated.
        let result = sqlx::query(
            "UPDATE recommendations
             SET clicked = 1, clicked_at = COALESCE(clicked_at, ?)
             WHERE id = ?",
        )
        .bind(when)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("Recommendation not found: {}", id)));
        }
        self.get_recommendation(id).await
    }

    async fn algorithm_stats(&self, since: DateTime<Utc>) -> DbResult<Vec<AlgorithmStats>> {
        Ok(sqlx::query_as::<_, AlgorithmStats>(
            "SELECT algorithm,
                    COUNT(*) AS total,
                    COALESCE(SUM(clicked), 0) AS clicked,
                    COALESCE(AVG(score), 0.0) AS avg_score
             FROM recommendations
             WHERE generated_at >= ?
             GROUP BY algorithm
             ORDER BY algorithm",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn delete_stale(&self, older_than: DateTime<Utc>) -> DbResult<u64> {
        let result =
            sqlx::query("DELETE FROM recommendations WHERE generated_at < ? AND clicked = 0")
                .bind(older_than)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl NotificationRepo for SqliteRepository {
    async fn get_preferences(&self, user_id: &str) -> DbResult<NotificationPreferences> {
        let existing = sqlx::query_as::<_, NotificationPreferences>(
            "SELECT * FROM notification_preferences WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(prefs) = existing {
            return Ok(prefs);
        }

        // First read creates the row with defaults.
        let now = Utc::now();
        sqlx::query(
            "INSERT OR IGNORE INTO notification_preferences (user_id, created_at, updated_at)
             VALUES (?, ?, ?)",
        )
        .bind(user_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        sqlx::query_as::<_, NotificationPreferences>(
            "SELECT * FROM notification_preferences WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found(e, || format!("Preferences not found: {}", user_id)))
    }

    async fn upsert_preferences(&self, prefs: &NotificationPreferences) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO notification_preferences (user_id, weekly_digest, recommendation_alerts,
                trending_alerts, push_recommendations, digest_day, digest_time, timezone,
                created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (user_id) DO UPDATE SET
                weekly_digest = excluded.weekly_digest,
                recommendation_alerts = excluded.recommendation_alerts,
                trending_alerts = excluded.trending_alerts,
                push_recommendations = excluded.push_recommendations,
                digest_day = excluded.digest_day,
                digest_time = excluded.digest_time,
                timezone = excluded.timezone,
                updated_at = excluded.updated_at",
        )
        .bind(&prefs.user_id)
        .bind(prefs.weekly_digest)
        .bind(prefs.recommendation_alerts)
        .bind(prefs.trending_alerts)
        .bind(prefs.push_recommendations)
        .bind(prefs.digest_day)
        .bind(&prefs.digest_time)
        .bind(&prefs.timezone)
        .bind(prefs.created_at)
        .bind(prefs.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_log(&self, log: &NotificationLog) -> DbResult<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO notification_logs (user_id, channel, subject, body, recipient,
                status, external_id, error_message, sent_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(&log.user_id)
        .bind(log.channel)
        .bind(log.subject.as_str())
        .bind(log.body.as_str())
        .bind(&log.recipient)
        .bind(log.status)
        .bind(&log.external_id)
        .bind(&log.error_message)
        .bind(log.sent_at)
        .bind(log.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn get_log(&self, id: i64) -> DbResult<NotificationLog> {
        sqlx::query_as::<_, NotificationLog>("SELECT * FROM notification_logs WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found(e, || format!("Notification log not found: {}", id)))
    }

    async fn list_user_logs(&self, user_id: &str, limit: i64) -> DbResult<Vec<NotificationLog>> {
        Ok(sqlx::query_as::<_, NotificationLog>(
            "SELECT * FROM notification_logs WHERE user_id = ?
             ORDER BY created_at DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn advance_log_status(
        &self,
        id: i64,
        next: NotificationStatus,
        external_id: Option<&str>,
        error_message: Option<&str>,
        when: DateTime<Utc>,
    ) -> DbResult<NotificationLog> {
        let log = self.get_log(id).await?;
        if !log.status.can_advance_to(next) {
            return Err(DbError::Invalid(format!(
                "notification {} cannot move from {:?} to {:?}",
                id, log.status, next
            )));
        }

        let stamp_column = match next {
            NotificationStatus::Sent => "sent_at",
            NotificationStatus::Delivered => "delivered_at",
            NotificationStatus::Opened => "opened_at",
            NotificationStatus::Clicked => "clicked_at",
            NotificationStatus::Failed => "failed_at",
            NotificationStatus::Pending => unreachable!("pending is never a transition target"),
        };
        let sql = format!(
            "UPDATE notification_logs
             SET status = ?, {} = ?,
                 external_id = COALESCE(?, external_id),
                 error_message = COALESCE(?, error_message)
             WHERE id = ?",
            stamp_column
        );
        sqlx::query(&sql)
            .bind(next)
            .bind(when)
            .bind(external_id)
            .bind(error_message)
            .bind(id)
            .execute(&self.pool)
            .await?;
        self.get_log(id).await
    }
}

#[async_trait]
impl ActivityRepo for SqliteRepository {
    async fn insert_activity(&self, log: &ActivityLog) -> DbResult<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO activity_logs (user_id, session_id, action, movie_id, ip_address,
                user_agent, referer, source, metadata, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(&log.user_id)
        .bind(&log.session_id)
        .bind(&log.action)
        .bind(log.movie_id)
        .bind(&log.ip_address)
        .bind(&log.user_agent)
        .bind(&log.referer)
        .bind(&log.source)
        .bind(&log.metadata)
        .bind(log.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn list_user_activity(&self, user_id: &str, limit: i64) -> DbResult<Vec<ActivityLog>> {
        Ok(sqlx::query_as::<_, ActivityLog>(
            "SELECT * FROM activity_logs WHERE user_id = ?
             ORDER BY created_at DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn active_movie_ids_on(&self, date: NaiveDate) -> DbResult<Vec<i64>> {
        Ok(sqlx::query_scalar(
            "SELECT DISTINCT movie_id FROM activity_logs
             WHERE movie_id IS NOT NULL AND date(created_at) = ?",
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn movie_activity_on(
        &self,
        movie_id: i64,
        date: NaiveDate,
    ) -> DbResult<Vec<ActivityLog>> {
        Ok(sqlx::query_as::<_, ActivityLog>(
            "SELECT * FROM activity_logs WHERE movie_id = ? AND date(created_at) = ?",
        )
        .bind(movie_id)
        .bind(date)
        .fetch_all(&self.pool)
        .await?)
    }
}

#[async_trait]
impl MetricsRepo for SqliteRepository {
    async fn upsert_metric(&self, metric: &PopularityMetric) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO popularity_metrics (movie_id, date, view_count, like_count,
                rating_count, average_rating, recommendation_clicks, click_through_rate)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (movie_id, date) DO UPDATE SET
                view_count = excluded.view_count,
                like_count = excluded.like_count,
                rating_count = excluded.rating_count,
                average_rating = excluded.average_rating,
                recommendation_clicks = excluded.recommendation_clicks,
                click_through_rate = excluded.click_through_rate",
        )
        .bind(metric.movie_id)
        .bind(metric.date)
        .bind(metric.view_count)
        .bind(metric.like_count)
        .bind(metric.rating_count)
        .bind(metric.average_rating)
        .bind(metric.recommendation_clicks)
        .bind(metric.click_through_rate)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn movie_metrics(&self, movie_id: i64, limit: i64) -> DbResult<Vec<PopularityMetric>> {
        Ok(sqlx::query_as::<_, PopularityMetric>(
            "SELECT * FROM popularity_metrics WHERE movie_id = ?
             ORDER BY date DESC LIMIT ?",
        )
        .bind(movie_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn trending(&self, since: NaiveDate, limit: i64) -> DbResult<Vec<(i64, f64)>> {
        Ok(sqlx::query_as::<_, (i64, f64)>(
            "SELECT movie_id,
                    SUM(view_count
                        + like_count * 2.0
                        + rating_count * 3.0
                        + recommendation_clicks * 1.5
                        + click_through_rate * 100.0
                        + average_rating * 10.0) AS engagement
             FROM popularity_metrics
             WHERE date >= ?
             GROUP BY movie_id
             ORDER BY engagement DESC
             LIMIT ?",
        )
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }
}

#[async_trait]
impl ExperimentRepo for SqliteRepository {
    async fn active_experiment(&self, now: DateTime<Utc>) -> DbResult<Option<Experiment>> {
        Ok(sqlx::query_as::<_, Experiment>(
            "SELECT * FROM experiments
             WHERE is_active = 1 AND starts_at <= ? AND ends_at >= ?
             ORDER BY starts_at DESC LIMIT 1",
        )
        .bind(now)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn insert_experiment(&self, exp: &Experiment) -> DbResult<i64> {
        if exp.ends_at <= exp.starts_at {
            return Err(DbError::Invalid("experiment ends before it starts".to_string()));
        }
        if exp.algorithm_a == exp.algorithm_b {
            return Err(DbError::Invalid("experiment arms must differ".to_string()));
        }
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO experiments (name, algorithm_a, algorithm_b, traffic_split,
                starts_at, ends_at, is_active)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(&exp.name)
        .bind(&exp.algorithm_a)
        .bind(&exp.algorithm_b)
        .bind(exp.traffic_split)
        .bind(exp.starts_at)
        .bind(exp.ends_at)
        .bind(exp.is_active)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique(e, || format!("Experiment already exists: {}", exp.name)))?;
        Ok(id)
    }
}

impl Repository for SqliteRepository {}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_repo(name: &str) -> SqliteRepository {
        let url = format!("file:{}?mode=memory&cache=shared", name);
        SqliteRepository::new(&url).await.expect("create test db")
    }

    fn make_user(id: &str) -> User {
        User {
            id: id.to_string(),
            username: format!("user-{}", id),
            email: format!("{}@example.com", id),
            password_hash: "x".to_string(),
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

    fn make_movie(tmdb_id: i64, title: &str) -> Movie {
        Movie {
            id: 0,
            tmdb_id,
            imdb_id: None,
            title: title.to_string(),
            original_title: title.to_string(),
            overview: String::new(),
            tagline: String::new(),
            release_date: None,
            runtime: None,
            director: None,
            main_cast: "[]".to_string(),
            tmdb_rating: Some(7.5),
            tmdb_vote_count: 100,
            imdb_rating: None,
            poster_path: None,
            backdrop_path: None,
            popularity: 1.0,
            view_count: 0,
            like_count: 0,
            adult: false,
            original_language: "en".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn make_interaction(user_id: &str, movie_id: i64, kind: InteractionKind) -> Interaction {
        Interaction {
            id: 0,
            user_id: user_id.to_string(),
            movie_id,
            kind,
            rating: None,
            feedback: None,
            feedback_comment: None,
            source: Some("web".to_string()),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_interaction_updates_in_place() {
        let repo = test_repo("dup_interaction").await;
        repo.create_user(&make_user("u1")).await.unwrap();
        let movie_id = repo.upsert_movie(&make_movie(5, "Heat")).await.unwrap();

        let first = repo
            .upsert_interaction(&make_interaction("u1", movie_id, InteractionKind::Favorite))
            .await
            .unwrap();
        let second = repo
            .upsert_interaction(&make_interaction("u1", movie_id, InteractionKind::Favorite))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        let all = repo.list_user_interactions("u1", None).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn reupsert_keeps_existing_feedback() {
        let repo = test_repo("keep_feedback").await;
        repo.create_user(&make_user("u1")).await.unwrap();
        let movie_id = repo.upsert_movie(&make_movie(12, "Solaris")).await.unwrap();

        let stored = repo
            .upsert_interaction(&make_interaction("u1", movie_id, InteractionKind::Watchlist))
            .await
            .unwrap();
        repo.update_feedback(stored.id, FeedbackKind::Positive, Some("great pick"))
            .await
            .unwrap();

        // recording the same interaction again must not erase the feedback
        let again = repo
            .upsert_interaction(&make_interaction("u1", movie_id, InteractionKind::Watchlist))
            .await
            .unwrap();
        assert_eq!(again.id, stored.id);
        assert_eq!(again.feedback, Some(FeedbackKind::Positive));
        assert_eq!(again.feedback_comment.as_deref(), Some("great pick"));
    }

    #[tokio::test]
    async fn rating_range_is_enforced() {
        let repo = test_repo("rating_range").await;
        repo.create_user(&make_user("u1")).await.unwrap();
        let movie_id = repo.upsert_movie(&make_movie(6, "Alien")).await.unwrap();

        let mut interaction = make_interaction("u1", movie_id, InteractionKind::Rating);
        interaction.rating = Some(6.0);
        assert!(matches!(
            repo.upsert_interaction(&interaction).await,
            Err(DbError::Invalid(_))
        ));

        interaction.rating = Some(4.5);
        assert!(repo.upsert_interaction(&interaction).await.is_ok());

        // rating is meaningless on a non-rating interaction
        let mut favorite = make_interaction("u1", movie_id, InteractionKind::Favorite);
        favorite.rating = Some(3.0);
        assert!(matches!(
            repo.upsert_interaction(&favorite).await,
            Err(DbError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn recommendation_score_range_and_uniqueness() {
        let repo = test_repo("rec_score").await;
        repo.create_user(&make_user("u1")).await.unwrap();
        let movie_id = repo.upsert_movie(&make_movie(7, "Dune")).await.unwrap();

        let mut rec = Recommendation {
            id: 0,
            user_id: "u1".to_string(),
            movie_id,
            algorithm: "genre_affinity".to_string(),
            score: 1.5,
            generated_at: Utc::now(),
            clicked: false,
            clicked_at: None,
        };
        assert!(matches!(
            repo.upsert_recommendation(&rec).await,
            Err(DbError::Invalid(_))
        ));

        rec.score = 0.9;
        repo.upsert_recommendation(&rec).await.unwrap();
        // same pair under a second algorithm coexists
        rec.algorithm = "popularity".to_string();
        rec.score = 0.4;
        repo.upsert_recommendation(&rec).await.unwrap();
        // same triple refreshes in place
        rec.score = 0.6;
        repo.upsert_recommendation(&rec).await.unwrap();

        let recs = repo.list_recommendations("u1", None, 10).await.unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].algorithm, "genre_affinity");
        assert!(recs[0].score >= recs[1].score);
    }

    #[tokio::test]
    async fn click_is_recorded_once() {
        let repo = test_repo("rec_click").await;
        repo.create_user(&make_user("u1")).await.unwrap();
        let movie_id = repo.upsert_movie(&make_movie(8, "Ran")).await.unwrap();
        repo.upsert_recommendation(&Recommendation {
            id: 0,
            user_id: "u1".to_string(),
            movie_id,
            algorithm: "genre_affinity".to_string(),
            score: 0.8,
            generated_at: Utc::now(),
            clicked: false,
            clicked_at: None,
        })
        .await
        .unwrap();
        let rec = &repo.list_recommendations("u1", None, 1).await.unwrap()[0];

        let first = repo.mark_clicked(rec.id, Utc::now()).await.unwrap();
        assert!(first.clicked);
        let later = Utc::now() + chrono::Duration::hours(1);
        let second = repo.mark_clicked(rec.id, later).await.unwrap();
        assert_eq!(first.clicked_at, second.clicked_at);
    }

    #[tokio::test]
    async fn notification_status_never_moves_backward() {
        let repo = test_repo("notif_status").await;
        repo.create_user(&make_user("u1")).await.unwrap();
        let id = repo
            .insert_log(&NotificationLog {
                id: 0,
                user_id: "u1".to_string(),
                channel: NotificationChannel::Email,
                subject: "Picks for you".to_string(),
                body: "...".to_string(),
                recipient: "u1@example.com".to_string(),
                status: NotificationStatus::Pending,
                external_id: None,
                error_message: None,
                sent_at: None,
                delivered_at: None,
                opened_at: None,
                clicked_at: None,
                failed_at: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let now = Utc::now();
        let log = repo
            .advance_log_status(id, NotificationStatus::Sent, Some("ext-1"), None, now)
            .await
            .unwrap();
        assert_eq!(log.status, NotificationStatus::Sent);
        assert!(log.sent_at.is_some());

        let log = repo
            .advance_log_status(id, NotificationStatus::Delivered, None, None, now)
            .await
            .unwrap();
        assert_eq!(log.status, NotificationStatus::Delivered);
        assert_eq!(log.external_id.as_deref(), Some("ext-1"));

        // backward and failed-after-delivery are both rejected
        assert!(matches!(
            repo.advance_log_status(id, NotificationStatus::Sent, None, None, now)
                .await,
            Err(DbError::Invalid(_))
        ));
        assert!(matches!(
            repo.advance_log_status(id, NotificationStatus::Failed, None, None, now)
                .await,
            Err(DbError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn deleting_a_user_cascades_but_anonymizes_activity() {
        let repo = test_repo("user_cascade").await;
        repo.create_user(&make_user("u1")).await.unwrap();
        let movie_id = repo.upsert_movie(&make_movie(9, "Seven")).await.unwrap();

        repo.upsert_interaction(&make_interaction("u1", movie_id, InteractionKind::Like))
            .await
            .unwrap();
        repo.upsert_recommendation(&Recommendation {
            id: 0,
            user_id: "u1".to_string(),
            movie_id,
            algorithm: "genre_affinity".to_string(),
            score: 0.7,
            generated_at: Utc::now(),
            clicked: false,
            clicked_at: None,
        })
        .await
        .unwrap();
        let activity_id = repo
            .insert_activity(&ActivityLog {
                id: 0,
                user_id: Some("u1".to_string()),
                session_id: Some("s1".to_string()),
                action: "movie_view".to_string(),
                movie_id: Some(movie_id),
                ip_address: None,
                user_agent: None,
                referer: None,
                source: Some("web".to_string()),
                metadata: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        repo.delete_user("u1").await.unwrap();

        assert!(repo
            .list_user_interactions("u1", None)
            .await
            .unwrap()
            .is_empty());
        assert!(repo
            .list_recommendations("u1", None, 10)
            .await
            .unwrap()
            .is_empty());

        // the activity row survives with the user reference nulled
        let rows = repo
            .movie_activity_on(movie_id, Utc::now().date_naive())
            .await
            .unwrap();
        let row = rows.iter().find(|r| r.id == activity_id).unwrap();
        assert!(row.user_id.is_none());
        assert_eq!(row.session_id.as_deref(), Some("s1"));
    }

    #[tokio::test]
    async fn preferences_created_with_defaults_on_first_read() {
        let repo = test_repo("prefs_default").await;
        repo.create_user(&make_user("u1")).await.unwrap();

        let prefs = repo.get_preferences("u1").await.unwrap();
        assert!(!prefs.recommendation_alerts);
        assert_eq!(prefs.timezone, "UTC");

        let mut updated = prefs.clone();
        updated.recommendation_alerts = true;
        updated.updated_at = Utc::now();
        repo.upsert_preferences(&updated).await.unwrap();
        assert!(repo.get_preferences("u1").await.unwrap().recommendation_alerts);
    }

    #[tokio::test]
    async fn active_experiment_respects_window_and_arms() {
        let repo = test_repo("experiments").await;
        let now = Utc::now();

        let mut exp = Experiment {
            id: 0,
            name: "ranker-rollout".to_string(),
            algorithm_a: "genre_affinity".to_string(),
            algorithm_b: "genre_affinity".to_string(),
            traffic_split: 0.5,
            starts_at: now - chrono::Duration::days(1),
            ends_at: now + chrono::Duration::days(6),
            is_active: true,
        };
        // identical arms make no experiment
        assert!(matches!(
            repo.insert_experiment(&exp).await,
            Err(DbError::Invalid(_))
        ));

        exp.algorithm_b = "popularity".to_string();
        repo.insert_experiment(&exp).await.unwrap();

        let active = repo.active_experiment(now).await.unwrap().unwrap();
        assert_eq!(active.name, "ranker-rollout");
        assert!(active.is_running(now));

        // outside the window nothing is active
        let later = now + chrono::Duration::days(30);
        assert!(repo.active_experiment(later).await.unwrap().is_none());

        // duplicate name is rejected
        assert!(matches!(
            repo.insert_experiment(&exp).await,
            Err(DbError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn movie_filter_by_genre_and_search() {
        let repo = test_repo("movie_filter").await;
        let action = repo.upsert_genre(28, "Action", "action").await.unwrap();
        let drama = repo.upsert_genre(18, "Drama", "drama").await.unwrap();

        let heat = repo.upsert_movie(&make_movie(10, "Heat")).await.unwrap();
        let ran = repo.upsert_movie(&make_movie(11, "Ran")).await.unwrap();
        repo.set_movie_genres(heat, &[action, drama]).await.unwrap();
        repo.set_movie_genres(ran, &[drama]).await.unwrap();

        let filter = MovieFilter {
            genre_slug: Some("action".to_string()),
            limit: 10,
            ..Default::default()
        };
        let (movies, total) = repo.list_movies(&filter).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(movies[0].title, "Heat");

        let filter = MovieFilter {
            search: Some("ran".to_string()),
            limit: 10,
            ..Default::default()
        };
        let (movies, _) = repo.list_movies(&filter).await.unwrap();
        assert_eq!(movies.len(), 1);
        assert_eq!(movies[0].title, "Ran");
    }
}
