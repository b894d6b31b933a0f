use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::{Genre, Movie, User};

/// Public view of a user account. Never carries the password hash.
#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub bio: String,
    pub country: String,
    pub preferred_language: String,
    pub is_premium: bool,
    pub favorite_genres: Vec<i64>,
    pub diversity: f64,
    pub novelty: f64,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            display_name: user.display_name(),
            bio: user.bio.clone(),
            country: user.country.clone(),
            preferred_language: user.preferred_language.clone(),
            is_premium: user.is_premium,
            favorite_genres: user.favorite_genre_ids(),
            diversity: user.diversity,
            novelty: user.novelty,
            last_login: user.last_login,
            created_at: user.created_at,
        }
    }
}

/// Compact movie card for listings.
#[derive(Debug, Serialize)]
pub struct MovieSummary {
    pub id: i64,
    pub tmdb_id: i64,
    pub title: String,
    pub year: Option<i32>,
    pub tmdb_rating: Option<f64>,
    pub poster_url: Option<String>,
    pub popularity: f64,
}

impl From<&Movie> for MovieSummary {
    fn from(movie: &Movie) -> Self {
        Self {
            id: movie.id,
            tmdb_id: movie.tmdb_id,
            title: movie.title.clone(),
            year: movie.year(),
            tmdb_rating: movie.tmdb_rating,
            poster_url: movie.poster_url(),
            popularity: movie.popularity,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MovieDetail {
    pub id: i64,
    pub tmdb_id: i64,
    pub imdb_id: Option<String>,
    pub title: String,
    pub original_title: String,
    pub overview: String,
    pub tagline: String,
    pub release_date: Option<chrono::NaiveDate>,
    pub runtime: Option<i64>,
    pub director: Option<String>,
    pub main_cast: Vec<String>,
    pub tmdb_rating: Option<f64>,
    pub tmdb_vote_count: i64,
    pub imdb_rating: Option<f64>,
    pub poster_url: Option<String>,
    pub backdrop_path: Option<String>,
    pub popularity: f64,
    pub view_count: i64,
    pub like_count: i64,
    pub original_language: String,
    pub genres: Vec<GenreDto>,
}

impl MovieDetail {
    pub fn from_movie(movie: &Movie, genres: Vec<GenreDto>) -> Self {
        Self {
            id: movie.id,
            tmdb_id: movie.tmdb_id,
            imdb_id: movie.imdb_id.clone(),
            title: movie.title.clone(),
            original_title: movie.original_title.clone(),
            overview: movie.overview.clone(),
            tagline: movie.tagline.clone(),
            release_date: movie.release_date,
            runtime: movie.runtime,
            director: movie.director.clone(),
            main_cast: movie.main_cast_names(),
            tmdb_rating: movie.tmdb_rating,
            tmdb_vote_count: movie.tmdb_vote_count,
            imdb_rating: movie.imdb_rating,
            poster_url: movie.poster_url(),
            backdrop_path: movie.backdrop_path.clone(),
            popularity: movie.popularity,
            view_count: movie.view_count,
            like_count: movie.like_count,
            original_language: movie.original_language.clone(),
            genres,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GenreDto {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

impl From<&Genre> for GenreDto {
    fn from(genre: &Genre) -> Self {
        Self {
            id: genre.id,
            name: genre.name.clone(),
            slug: genre.slug.clone(),
        }
    }
}
