use std::time::Duration;

use serde::Deserialize;

use crate::config::TmdbConfig;

use super::MetadataError;

/// Thin TMDb v3 API client. All calls are GET with the key as a query
/// parameter.
pub struct TmdbClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    language: String,
}

#[derive(Debug, Deserialize)]
pub struct GenreListResponse {
    pub genres: Vec<TmdbGenre>,
}

#[derive(Debug, Deserialize)]
pub struct TmdbGenre {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct MoviePage {
    pub page: i64,
    pub total_pages: i64,
    pub results: Vec<MovieListEntry>,
}

#[derive(Debug, Deserialize)]
pub struct MovieListEntry {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct MovieDetails {
    pub id: i64,
    pub imdb_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub original_title: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub tagline: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    pub runtime: Option<i64>,
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub vote_count: i64,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub popularity: f64,
    #[serde(default)]
    pub adult: bool,
    #[serde(default)]
    pub original_language: Option<String>,
    #[serde(default)]
    pub genres: Vec<TmdbGenre>,
    pub credits: Option<Credits>,
}

#[derive(Debug, Deserialize)]
pub struct Credits {
    #[serde(default)]
    pub cast: Vec<CastMember>,
    #[serde(default)]
    pub crew: Vec<CrewMember>,
}

#[derive(Debug, Deserialize)]
pub struct CastMember {
    pub name: String,
    #[serde(default)]
    pub order: i64,
}

#[derive(Debug, Deserialize)]
pub struct CrewMember {
    pub name: String,
    #[serde(default)]
    pub job: String,
}

impl MovieDetails {
    /// Release date as parsed from TMDb's `YYYY-MM-DD` strings; empty
    /// strings (unreleased titles) come back as None.
    pub fn release_date_parsed(&self) -> Option<chrono::NaiveDate> {
        self.release_date
            .as_deref()
            .and_then(|d| chrono::NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
    }

    pub fn director(&self) -> Option<String> {
        self.credits.as_ref().and_then(|c| {
            c.crew
                .iter()
                .find(|m| m.job == "Director")
                .map(|m| m.name.clone())
        })
    }

    /// Top-billed cast, at most five names.
    pub fn top_cast(&self) -> Vec<String> {
        let Some(credits) = &self.credits else {
            return Vec::new();
        };
        let mut cast: Vec<&CastMember> = credits.cast.iter().collect();
        cast.sort_by_key(|m| m.order);
        cast.into_iter().take(5).map(|m| m.name.clone()).collect()
    }
}

impl TmdbClient {
    pub fn new(config: &TmdbConfig) -> Result<Self, MetadataError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or(MetadataError::MissingKey("tmdb"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key,
            language: config.language.clone(),
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        extra: &[(&str, &str)],
    ) -> Result<T, MetadataError> {
        let url = format!("{}{}", self.base_url, path);
        let mut query = vec![
            ("api_key", self.api_key.as_str()),
            ("language", self.language.as_str()),
        ];
        query.extend_from_slice(extra);

        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    pub async fn movie_genres(&self) -> Result<Vec<TmdbGenre>, MetadataError> {
        let list: GenreListResponse = self.get("/genre/movie/list", &[]).await?;
        Ok(list.genres)
    }

    pub async fn popular(&self, page: i64) -> Result<MoviePage, MetadataError> {
        let page = page.to_string();
        self.get("/movie/popular", &[("page", page.as_str())]).await
    }

    pub async fn top_rated(&self, page: i64) -> Result<MoviePage, MetadataError> {
        let page = page.to_string();
        self.get("/movie/top_rated", &[("page", page.as_str())])
            .await
    }

    pub async fn movie_details(&self, tmdb_id: i64) -> Result<MovieDetails, MetadataError> {
        self.get(
            &format!("/movie/{}", tmdb_id),
            &[("append_to_response", "credits")],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn details_extract_director_and_cast() {
        let details: MovieDetails = serde_json::from_str(
            r#"{
                "id": 603,
                "imdb_id": "tt0133093",
                "title": "The Matrix",
                "release_date": "1999-03-30",
                "runtime": 136,
                "vote_average": 8.2,
                "vote_count": 24000,
                "popularity": 80.5,
                "credits": {
                    "cast": [
                        {"name": "Carrie-Anne Moss", "order": 1},
                        {"name": "Keanu Reeves", "order": 0}
                    ],
                    "crew": [
                        {"name": "Lana Wachowski", "job": "Director"},
                        {"name": "Bill Pope", "job": "Director of Photography"}
                    ]
                }
            }"#,
        )
        .unwrap();

        assert_eq!(details.director().as_deref(), Some("Lana Wachowski"));
        assert_eq!(details.top_cast(), vec!["Keanu Reeves", "Carrie-Anne Moss"]);
        assert_eq!(
            details.release_date_parsed(),
            chrono::NaiveDate::from_ymd_opt(1999, 3, 30)
        );
    }

    #[test]
    fn empty_release_date_is_none() {
        let details: MovieDetails = serde_json::from_str(
            r#"{"id": 1, "title": "Untitled", "release_date": ""}"#,
        )
        .unwrap();
        assert!(details.release_date_parsed().is_none());
        assert!(details.director().is_none());
        assert!(details.top_cast().is_empty());
    }
}
