pub mod omdb;
pub mod sync;
pub mod tmdb;

pub use sync::CatalogSync;

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Database error: {0}")]
    Db(#[from] crate::db::DbError),
    #[error("No API key configured for {0}")]
    MissingKey(&'static str),
}
