use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::{GenreRepo, Movie, MovieRepo, SqliteRepository};
use crate::util::slugify;

use super::omdb::OmdbClient;
use super::tmdb::{MovieDetails, TmdbClient};
use super::MetadataError;

/// Pages of each TMDb list pulled per sync run. 20 movies per page.
const LIST_PAGES: i64 = 3;

/// Mirrors the TMDb catalog (genres, popular and top-rated lists, per-movie
/// details and credits) into the local database, with IMDb ratings from OMDb
/// where an id and key are available.
pub struct CatalogSync {
    db: Arc<SqliteRepository>,
    tmdb: TmdbClient,
    omdb: Option<OmdbClient>,
}

impl CatalogSync {
    pub fn new(config: &Config, db: Arc<SqliteRepository>) -> Result<Self, MetadataError> {
        let tmdb = TmdbClient::new(&config.tmdb)?;
        let omdb = match OmdbClient::new(&config.omdb) {
            Ok(client) => Some(client),
            Err(MetadataError::MissingKey(_)) => None,
            Err(e) => return Err(e),
        };
        Ok(Self { db, tmdb, omdb })
    }

    pub async fn run_once(&self) -> Result<(), MetadataError> {
        let genre_map = self.sync_genres().await?;

        let mut tmdb_ids = Vec::new();
        for page in 1..=LIST_PAGES {
            tmdb_ids.extend(self.tmdb.popular(page).await?.results.iter().map(|m| m.id));
            tmdb_ids.extend(
                self.tmdb
                    .top_rated(page)
                    .await?
                    .results
                    .iter()
                    .map(|m| m.id),
            );
        }
        tmdb_ids.sort_unstable();
        tmdb_ids.dedup();

        let mut synced = 0usize;
        for tmdb_id in &tmdb_ids {
            match self.sync_movie(*tmdb_id, &genre_map).await {
                Ok(()) => synced += 1,
                // one bad title must not stop the run
                Err(e) => warn!(tmdb_id, "Failed to sync movie: {}", e),
            }
        }

        info!(total = tmdb_ids.len(), synced, "Catalog sync finished");
        Ok(())
    }

    /// Returns a TMDb genre id to local row id mapping.
    async fn sync_genres(&self) -> Result<HashMap<i64, i64>, MetadataError> {
        let mut map = HashMap::new();
        for genre in self.tmdb.movie_genres().await? {
            let slug = slugify(&genre.name);
            let id = self.db.upsert_genre(genre.id, &genre.name, &slug).await?;
            map.insert(genre.id, id);
        }
        Ok(map)
    }

    async fn sync_movie(
        &self,
        tmdb_id: i64,
        genre_map: &HashMap<i64, i64>,
    ) -> Result<(), MetadataError> {
        let details = self.tmdb.movie_details(tmdb_id).await?;

        let imdb_rating = match (&self.omdb, details.imdb_id.as_deref()) {
            (Some(omdb), Some(imdb_id)) => match omdb.imdb_rating(imdb_id).await {
                Ok(rating) => rating,
                Err(e) => {
                    warn!(imdb_id, "OMDb lookup failed: {}", e);
                    None
                }
            },
            _ => None,
        };

        let movie = self.build_movie(&details, imdb_rating);
        let movie_id = self.db.upsert_movie(&movie).await?;

        let mut genre_ids = Vec::new();
        for genre in &details.genres {
            match genre_map.get(&genre.id) {
                Some(id) => genre_ids.push(*id),
                // a genre TMDb added since the last full genre sync
                None => {
                    let slug = slugify(&genre.name);
                    genre_ids.push(self.db.upsert_genre(genre.id, &genre.name, &slug).await?);
                }
            }
        }
        self.db.set_movie_genres(movie_id, &genre_ids).await?;

        Ok(())
    }

    fn build_movie(&self, details: &MovieDetails, imdb_rating: Option<f64>) -> Movie {
        let now = Utc::now();
        Movie {
            id: 0,
            tmdb_id: details.id,
            imdb_id: details.imdb_id.clone(),
            title: details.title.clone(),
            original_title: details
                .original_title
                .clone()
                .unwrap_or_else(|| details.title.clone()),
            overview: details.overview.clone().unwrap_or_default(),
            tagline: details.tagline.clone().unwrap_or_default(),
            release_date: details.release_date_parsed(),
            runtime: details.runtime.filter(|r| (1..=1000).contains(r)),
            director: details.director(),
            main_cast: serde_json::to_string(&details.top_cast())
                .unwrap_or_else(|_| "[]".to_string()),
            tmdb_rating: details.vote_average,
            tmdb_vote_count: details.vote_count,
            imdb_rating,
            poster_path: details.poster_path.clone(),
            backdrop_path: details.backdrop_path.clone(),
            popularity: details.popularity,
            view_count: 0,
            like_count: 0,
            adult: details.adult,
            original_language: details.original_language.clone().unwrap_or_default(),
            created_at: now,
            updated_at: now,
        }
    }
}
