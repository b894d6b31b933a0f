use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::db::{Genre, GenreRepo, MovieFilter, MovieOrder, MovieRepo};
use crate::server::AppState;

use super::error::{ApiError, ApiResult};
use super::pagination::{PageParams, Paginated};
use super::types::{GenreDto, MovieDetail, MovieSummary};

/// Movies with a TMDb rating at or above this show up in the top-rated list.
const TOP_RATED_FLOOR: f64 = 7.0;
const RECENT_WINDOW_DAYS: i64 = 2 * 365;

#[derive(Debug, Deserialize)]
pub struct MovieListParams {
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub min_rating: Option<f64>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub ordering: Option<String>,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub page_size: Option<i64>,
}

impl MovieListParams {
    fn page_params(&self) -> PageParams {
        PageParams {
            page: self.page,
            page_size: self.page_size,
        }
    }

    fn to_filter(&self) -> ApiResult<MovieFilter> {
        let order = match self.ordering.as_deref() {
            None | Some("popularity") => MovieOrder::Popularity,
            Some("rating") => MovieOrder::Rating,
            Some("release_date") => MovieOrder::ReleaseDate,
            Some(other) => {
                return Err(ApiError::BadRequest(format!(
                    "Unknown ordering: {}",
                    other
                )))
            }
        };
        Ok(MovieFilter {
            genre_slug: self.genre.clone(),
            min_rating: self.min_rating,
            release_year: self.year,
            search: self.search.clone(),
            order,
            offset: self.page_params().offset(),
            limit: self.page_params().page_size(),
            ..Default::default()
        })
    }
}

pub async fn list_movies(
    State(state): State<AppState>,
    Query(params): Query<MovieListParams>,
) -> ApiResult<Json<Paginated<MovieSummary>>> {
    let filter = params.to_filter()?;
    let (movies, total) = state.db.list_movies(&filter).await?;
    let results = movies.iter().map(MovieSummary::from).collect();
    Ok(Json(Paginated::new(results, total, &params.page_params())))
}

pub async fn popular_movies(
    State(state): State<AppState>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<Paginated<MovieSummary>>> {
    let filter = MovieFilter {
        order: MovieOrder::Popularity,
        offset: page.offset(),
        limit: page.page_size(),
        ..Default::default()
    };
    let (movies, total) = state.db.list_movies(&filter).await?;
    let results = movies.iter().map(MovieSummary::from).collect();
    Ok(Json(Paginated::new(results, total, &page)))
}

pub async fn top_rated_movies(
    State(state): State<AppState>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<Paginated<MovieSummary>>> {
    let filter = MovieFilter {
        min_rating: Some(TOP_RATED_FLOOR),
        order: MovieOrder::Rating,
        offset: page.offset(),
        limit: page.page_size(),
        ..Default::default()
    };
    let (movies, total) = state.db.list_movies(&filter).await?;
    let results = movies.iter().map(MovieSummary::from).collect();
    Ok(Json(Paginated::new(results, total, &page)))
}

pub async fn recent_movies(
    State(state): State<AppState>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<Paginated<MovieSummary>>> {
    let cutoff = chrono::Utc::now().date_naive() - chrono::Duration::days(RECENT_WINDOW_DAYS);
    let filter = MovieFilter {
        released_after: Some(cutoff),
        order: MovieOrder::ReleaseDate,
        offset: page.offset(),
        limit: page.page_size(),
        ..Default::default()
    };
    let (movies, total) = state.db.list_movies(&filter).await?;
    let results = movies.iter().map(MovieSummary::from).collect();
    Ok(Json(Paginated::new(results, total, &page)))
}

pub async fn get_movie(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<MovieDetail>> {
    let movie = state.db.get_movie(id).await?;
    state.db.increment_view_count(id).await?;
    let genres = movie_genres(&state, id).await?;
    Ok(Json(MovieDetail::from_movie(
        &movie,
        genres.iter().map(GenreDto::from).collect(),
    )))
}

pub async fn similar_movies(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<Vec<MovieSummary>>> {
    // 404 for unknown ids rather than an empty list
    state.db.get_movie(id).await?;
    let movies = state.db.similar_movies(id, page.page_size()).await?;
    Ok(Json(movies.iter().map(MovieSummary::from).collect()))
}

pub async fn list_genres(State(state): State<AppState>) -> ApiResult<Json<Vec<GenreDto>>> {
    let genres = state.db.list_genres().await?;
    Ok(Json(genres.iter().map(GenreDto::from).collect()))
}

pub async fn genre_movies(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<Paginated<MovieSummary>>> {
    // resolve first so a bad slug is a 404, not an empty page
    let genre = state.db.get_genre_by_slug(&slug).await?;
    let filter = MovieFilter {
        genre_slug: Some(genre.slug),
        order: MovieOrder::Popularity,
        offset: page.offset(),
        limit: page.page_size(),
        ..Default::default()
    };
    let (movies, total) = state.db.list_movies(&filter).await?;
    let results = movies.iter().map(MovieSummary::from).collect();
    Ok(Json(Paginated::new(results, total, &page)))
}

async fn movie_genres(state: &AppState, movie_id: i64) -> ApiResult<Vec<Genre>> {
    let ids = state.db.movie_genre_ids(movie_id).await?;
    let all = state.db.list_genres().await?;
    Ok(all.into_iter().filter(|g| ids.contains(&g.id)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_params_build_a_filter() {
        let params = MovieListParams {
            genre: Some("action".to_string()),
            min_rating: Some(6.5),
            year: Some(1999),
            search: Some("matrix".to_string()),
            ordering: Some("rating".to_string()),
            page: Some(2),
            page_size: Some(10),
        };
        let filter = params.to_filter().unwrap();
        assert_eq!(filter.genre_slug.as_deref(), Some("action"));
        assert_eq!(filter.min_rating, Some(6.5));
        assert_eq!(filter.release_year, Some(1999));
        assert_eq!(filter.released_after, None);
        assert!(!filter.include_adult);
        assert_eq!(filter.order, MovieOrder::Rating);
        assert_eq!(filter.offset, 10);
        assert_eq!(filter.limit, 10);
    }

    #[test]
    fn unknown_ordering_is_rejected() {
        let params = MovieListParams {
            genre: None,
            min_rating: None,
            year: None,
            search: None,
            ordering: Some("shoe_size".to_string()),
            page: None,
            page_size: None,
        };
        assert!(matches!(params.to_filter(), Err(ApiError::BadRequest(_))));
    }
}
