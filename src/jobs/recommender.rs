use std::collections::{HashMap, HashSet};

use chrono::{Duration, Utc};
use tracing::{debug, info};

use crate::config::JobsConfig;
use crate::db::{
    DbResult, InteractionRepo, Movie, MovieFilter, MovieOrder, MovieRepo, Recommendation,
    RecommendationRepo, SqliteRepository, User, UserRepo,
};
use crate::db::ExperimentRepo;
use crate::util::{assign_bucket, Bucket};

pub const ALGO_GENRE_AFFINITY: &str = "genre_affinity";
pub const ALGO_POPULARITY: &str = "popularity";

/// How many candidate movies each refresh considers per user.
const CANDIDATE_POOL: i64 = 200;

/// Regenerate recommendations for every active user, then prune stale
/// unclicked rows.
pub async fn refresh_all(db: &SqliteRepository, jobs: &JobsConfig) -> DbResult<()> {
    let users = db.list_active_users().await?;
    let experiment = db.active_experiment(Utc::now()).await?;

    let candidates = candidate_pool(db).await?;
    if candidates.is_empty() {
        debug!("No movies in catalog, skipping recommendation refresh");
        return Ok(());
    }

    let mut refreshed = 0usize;
    for user in &users {
        let algorithm = pick_algorithm(user, experiment.as_ref());
        refresh_user(db, user, &candidates, &algorithm, jobs.recommendations_per_user).await?;
        refreshed += 1;
    }

    let cutoff = Utc::now() - Duration::days(jobs.stale_recommendation_days);
    let pruned = db.delete_stale(cutoff).await?;

    info!(users = refreshed, pruned, "Recommendation refresh finished");
    Ok(())
}

/// On-demand refresh for one user, as triggered from the API. Returns the
/// number of rows written.
pub async fn refresh_for_user(
    db: &SqliteRepository,
    user: &User,
    jobs: &JobsConfig,
) -> DbResult<usize> {
    let experiment = db.active_experiment(Utc::now()).await?;
    let candidates = candidate_pool(db).await?;
    if candidates.is_empty() {
        return Ok(0);
    }
    let algorithm = pick_algorithm(user, experiment.as_ref());
    refresh_user(db, user, &candidates, &algorithm, jobs.recommendations_per_user).await
}

fn pick_algorithm(user: &User, experiment: Option<&crate::db::Experiment>) -> String {
    match experiment {
        Some(exp) => match assign_bucket(&user.id, &exp.name, exp.traffic_split) {
            Bucket::A => exp.algorithm_a.clone(),
            Bucket::B => exp.algorithm_b.clone(),
        },
        None => ALGO_GENRE_AFFINITY.to_string(),
    }
}

async fn candidate_pool(db: &SqliteRepository) -> DbResult<Vec<Movie>> {
    let filter = MovieFilter {
        order: MovieOrder::Popularity,
        limit: CANDIDATE_POOL,
        ..Default::default()
    };
    let (movies, _) = db.list_movies(&filter).await?;
    Ok(movies)
}

async fn refresh_user(
    db: &SqliteRepository,
    user: &User,
    candidates: &[Movie],
    algorithm: &str,
    count: usize,
) -> DbResult<usize> {
    let seen: HashSet<i64> = db.interacted_movie_ids(&user.id).await?.into_iter().collect();

    let mut scored: Vec<(i64, f64)> = match algorithm {
        ALGO_POPULARITY => score_by_popularity(candidates, &seen),
        // genre affinity is the default; unknown experiment arms score the
        // same way under their own name
        _ => {
            let profile = genre_profile(db, user).await?;
            if profile.is_empty() {
                score_by_popularity(candidates, &seen)
            } else {
                let mut scored = Vec::new();
                for movie in candidates {
                    if seen.contains(&movie.id) {
                        continue;
                    }
                    let genres = db.movie_genre_ids(movie.id).await?;
                    scored.push((movie.id, affinity_score(&profile, &genres)));
                }
                scored
            }
        }
    };

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(count);

    let now = Utc::now();
    let written = scored.len();
    for (movie_id, score) in scored {
        db.upsert_recommendation(&Recommendation {
            id: 0,
            user_id: user.id.clone(),
            movie_id,
            algorithm: algorithm.to_string(),
            score,
            generated_at: now,
            clicked: false,
            clicked_at: None,
        })
        .await?;
    }
    Ok(written)
}

/// Per-genre engagement weights from a user's interaction history, plus
/// their declared favorite genres at a fixed weight.
async fn genre_profile(db: &SqliteRepository, user: &User) -> DbResult<HashMap<i64, f64>> {
    let mut profile: HashMap<i64, f64> = HashMap::new();

    for genre_id in user.favorite_genre_ids() {
        *profile.entry(genre_id).or_insert(0.0) += 2.0;
    }

    for interaction in db.list_user_interactions(&user.id, None).await? {
        let weight = interaction.kind.engagement_weight();
        for genre_id in db.movie_genre_ids(interaction.movie_id).await? {
            *profile.entry(genre_id).or_insert(0.0) += weight;
        }
    }

    // a profile of only dislikes carries no positive signal
    profile.retain(|_, w| *w > 0.0);
    Ok(profile)
}

/// Fraction of the user's positive genre weight covered by the movie's
/// genres. Always lands in [0, 1].
pub fn affinity_score(profile: &HashMap<i64, f64>, movie_genres: &[i64]) -> f64 {
    let total: f64 = profile.values().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let matched: f64 = movie_genres
        .iter()
        .filter_map(|g| profile.get(g))
        .sum();
    (matched / total).clamp(0.0, 1.0)
}

/// Popularity normalized against the strongest candidate.
pub fn score_by_popularity(candidates: &[Movie], seen: &HashSet<i64>) -> Vec<(i64, f64)> {
    let max = candidates
        .iter()
        .map(|m| m.popularity)
        .fold(0.0_f64, f64::max);
    if max <= 0.0 {
        return Vec::new();
    }
    candidates
        .iter()
        .filter(|m| !seen.contains(&m.id))
        .map(|m| (m.id, (m.popularity / max).clamp(0.0, 1.0)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn affinity_is_bounded_and_proportional() {
        let mut profile = HashMap::new();
        profile.insert(1, 6.0);
        profile.insert(2, 3.0);
        profile.insert(3, 1.0);

        assert_eq!(affinity_score(&profile, &[]), 0.0);
        assert!((affinity_score(&profile, &[1]) - 0.6).abs() < 1e-9);
        assert!((affinity_score(&profile, &[2, 3]) - 0.4).abs() < 1e-9);
        assert_eq!(affinity_score(&profile, &[1, 2, 3]), 1.0);
        // unknown genres contribute nothing
        assert!((affinity_score(&profile, &[1, 99]) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn empty_profile_scores_zero() {
        let profile = HashMap::new();
        assert_eq!(affinity_score(&profile, &[1, 2]), 0.0);
    }

    #[test]
    fn popularity_scores_normalize_and_skip_seen() {
        let mut a = test_movie(1);
        a.popularity = 50.0;
        let mut b = test_movie(2);
        b.popularity = 100.0;
        let mut c = test_movie(3);
        c.popularity = 25.0;

        let seen: HashSet<i64> = [2].into_iter().collect();
        let scored = score_by_popularity(&[a, b, c], &seen);
        assert_eq!(scored.len(), 2);
        assert!((scored[0].1 - 0.5).abs() < 1e-9);
        assert!((scored[1].1 - 0.25).abs() < 1e-9);
    }

    fn test_movie(id: i64) -> Movie {
        Movie {
            id,
            tmdb_id: id,
            imdb_id: None,
            title: format!("Movie {}", id),
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
            popularity: 0.0,
            view_count: 0,
            like_count: 0,
            adult: false,
            original_language: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
