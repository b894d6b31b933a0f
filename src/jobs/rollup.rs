use chrono::NaiveDate;
use tracing::info;

use crate::db::{
    ActivityRepo, DbResult, InteractionRepo, MetricsRepo, PopularityMetric, SqliteRepository,
    ACTION_MOVIE_LIKE, ACTION_MOVIE_RATING, ACTION_MOVIE_VIEW, ACTION_RECOMMENDATION_CLICK,
};

/// Collapse one day of activity rows into per-movie popularity metrics.
/// Re-running for the same day overwrites that day's rows.
pub async fn rollup_day(db: &SqliteRepository, date: NaiveDate) -> DbResult<()> {
    let movie_ids = db.active_movie_ids_on(date).await?;

    for movie_id in &movie_ids {
        let rows = db.movie_activity_on(*movie_id, date).await?;

        let mut views = 0i64;
        let mut likes = 0i64;
        let mut ratings = 0i64;
        let mut rec_clicks = 0i64;
        for row in &rows {
            match row.action.as_str() {
                ACTION_MOVIE_VIEW => views += 1,
                ACTION_MOVIE_LIKE => likes += 1,
                ACTION_MOVIE_RATING => ratings += 1,
                ACTION_RECOMMENDATION_CLICK => rec_clicks += 1,
                _ => {}
            }
        }

        let average_rating = db
            .movie_interaction_summary(*movie_id)
            .await?
            .average_rating
            .unwrap_or(0.0);
        let click_through_rate = if views > 0 {
            rec_clicks as f64 / views as f64
        } else {
            0.0
        };

        db.upsert_metric(&PopularityMetric {
            id: 0,
            movie_id: *movie_id,
            date,
            view_count: views,
            like_count: likes,
            rating_count: ratings,
            average_rating,
            recommendation_clicks: rec_clicks,
            click_through_rate,
        })
        .await?;
    }

    info!(date = %date, movies = movie_ids.len(), "Popularity rollup finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ActivityLog, Movie, MovieRepo, SqliteRepository};
    use chrono::Utc;

    async fn test_repo(name: &str) -> SqliteRepository {
        let url = format!("file:{}?mode=memory&cache=shared", name);
        SqliteRepository::new(&url).await.expect("create test db")
    }

    fn activity(movie_id: i64, action: &str) -> ActivityLog {
        ActivityLog {
            id: 0,
            user_id: None,
            session_id: Some("s".to_string()),
            action: action.to_string(),
            movie_id: Some(movie_id),
            ip_address: None,
            user_agent: None,
            referer: None,
            source: None,
            metadata: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn rollup_counts_actions_and_is_idempotent() {
        let db = test_repo("rollup_counts").await;
        let now = Utc::now();
        let movie_id = db
            .upsert_movie(&Movie {
                id: 0,
                tmdb_id: 1,
                imdb_id: None,
                title: "Stalker".to_string(),
                original_title: String::new(),
                overview: String::new(),
                tagline: String::new(),
                release_date: None,
                runtime: None,
                director: None,
                main_cast: "[]".to_string(),
                tmdb_rating: None,
                tmdb_vote_count: 0,
                imdb_rating: None,
                poster_path: None,
                backdrop_path: None,
                popularity: 1.0,
                view_count: 0,
                like_count: 0,
                adult: false,
                original_language: String::new(),
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();

        for _ in 0..4 {
            db.insert_activity(&activity(movie_id, ACTION_MOVIE_VIEW))
                .await
                .unwrap();
        }
        db.insert_activity(&activity(movie_id, ACTION_MOVIE_LIKE))
            .await
            .unwrap();
        db.insert_activity(&activity(movie_id, ACTION_RECOMMENDATION_CLICK))
            .await
            .unwrap();
        db.insert_activity(&activity(movie_id, "search"))
            .await
            .unwrap();

        let today = now.date_naive();
        rollup_day(&db, today).await.unwrap();
        // second run replaces, not duplicates
        rollup_day(&db, today).await.unwrap();

        let metrics = db.movie_metrics(movie_id, 10).await.unwrap();
        assert_eq!(metrics.len(), 1);
        let m = &metrics[0];
        assert_eq!(m.view_count, 4);
        assert_eq!(m.like_count, 1);
        assert_eq!(m.recommendation_clicks, 1);
        assert!((m.click_through_rate - 0.25).abs() < 1e-9);
    }
}
