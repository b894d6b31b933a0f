use std::time::Duration;

use serde::Deserialize;

use crate::config::OmdbConfig;

use super::MetadataError;

/// OMDb client, used only to backfill IMDb ratings by IMDb id.
pub struct OmdbClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
pub struct OmdbMovie {
    #[serde(rename = "Response")]
    pub response: String,
    #[serde(rename = "imdbRating", default)]
    pub imdb_rating: Option<String>,
}

impl OmdbMovie {
    /// OMDb answers "N/A" for unrated titles and "False" for unknown ids.
    pub fn rating(&self) -> Option<f64> {
        if self.response != "True" {
            return None;
        }
        self.imdb_rating
            .as_deref()
            .and_then(|r| r.parse::<f64>().ok())
    }
}

impl OmdbClient {
    pub fn new(config: &OmdbConfig) -> Result<Self, MetadataError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or(MetadataError::MissingKey("omdb"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key,
        })
    }

    pub async fn imdb_rating(&self, imdb_id: &str) -> Result<Option<f64>, MetadataError> {
        let movie: OmdbMovie = self
            .client
            .get(&self.base_url)
            .query(&[("apikey", self.api_key.as_str()), ("i", imdb_id)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(movie.rating())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_parses_or_skips() {
        let movie: OmdbMovie =
            serde_json::from_str(r#"{"Response": "True", "imdbRating": "8.7"}"#).unwrap();
        assert_eq!(movie.rating(), Some(8.7));

        let movie: OmdbMovie =
            serde_json::from_str(r#"{"Response": "True", "imdbRating": "N/A"}"#).unwrap();
        assert_eq!(movie.rating(), None);

        let movie: OmdbMovie = serde_json::from_str(r#"{"Response": "False"}"#).unwrap();
        assert_eq!(movie.rating(), None);
    }
}
