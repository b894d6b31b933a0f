use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub dbdir: Option<String>,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default = "default_logfile")]
    pub logfile: String,
    #[serde(default)]
    pub tmdb: TmdbConfig,
    #[serde(default)]
    pub omdb: OmdbConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(skip)]
    pub debug_logs: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenConfig {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default = "default_port")]
    pub port: String,
    #[serde(default)]
    pub tlscert: Option<String>,
    #[serde(default)]
    pub tlskey: Option<String>,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            address: None,
            port: default_port(),
            tlscert: None,
            tlskey: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub sqlite: Option<SqliteConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SqliteConfig {
    pub filename: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TmdbConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_tmdb_url")]
    pub base_url: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub include_adult: bool,
}

impl Default for TmdbConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_tmdb_url(),
            language: default_language(),
            include_adult: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OmdbConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_omdb_url")]
    pub base_url: String,
}

impl Default for OmdbConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_omdb_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub provider_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_from_address")]
    pub from_address: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            provider_url: None,
            api_key: None,
            from_address: default_from_address(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobsConfig {
    /// Catalog sync interval in seconds. 0 disables the job.
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,
    /// Recommendation refresh interval in seconds. 0 disables the job.
    #[serde(default = "default_recommend_interval")]
    pub recommend_interval_secs: u64,
    /// Popularity rollup interval in seconds. 0 disables the job.
    #[serde(default = "default_rollup_interval")]
    pub rollup_interval_secs: u64,
    /// Notification delivery interval in seconds. 0 disables the job.
    #[serde(default = "default_notify_interval")]
    pub notify_interval_secs: u64,
    /// Unclicked recommendations older than this are pruned.
    #[serde(default = "default_stale_days")]
    pub stale_recommendation_days: i64,
    #[serde(default = "default_recommendations_per_user")]
    pub recommendations_per_user: usize,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            sync_interval_secs: default_sync_interval(),
            recommend_interval_secs: default_recommend_interval(),
            rollup_interval_secs: default_rollup_interval(),
            notify_interval_secs: default_notify_interval(),
            stale_recommendation_days: default_stale_days(),
            recommendations_per_user: default_recommendations_per_user(),
        }
    }
}

fn default_port() -> String {
    "8920".to_string()
}

fn default_logfile() -> String {
    "stdout".to_string()
}

fn default_tmdb_url() -> String {
    "https://api.themoviedb.org/3".to_string()
}

fn default_omdb_url() -> String {
    "http://www.omdbapi.com".to_string()
}

fn default_language() -> String {
    "en-US".to_string()
}

fn default_from_address() -> String {
    "noreply@cinerec.local".to_string()
}

fn default_sync_interval() -> u64 {
    6 * 3600
}

fn default_recommend_interval() -> u64 {
    3600
}

fn default_rollup_interval() -> u64 {
    3600
}

fn default_notify_interval() -> u64 {
    900
}

fn default_stale_days() -> i64 {
    30
}

fn default_recommendations_per_user() -> usize {
    20
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.to_string(), e))?;

        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_string(), e))?;

        Ok(config)
    }

    pub fn get_database_path(&self) -> Option<String> {
        if let Some(ref sqlite) = self.database.sqlite {
            return Some(sqlite.filename.clone());
        }

        if let Some(ref dbdir) = self.dbdir {
            let path = PathBuf::from(dbdir).join("cinerec.db");
            return Some(path.to_string_lossy().to_string());
        }

        None
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(String, std::io::Error),
    #[error("Failed to parse config file {0}: {1}")]
    ParseError(String, serde_yaml::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_parses_with_defaults() {
        let config: Config = serde_yaml::from_str(
            "database:\n  sqlite:\n    filename: /tmp/test.db\n",
        )
        .unwrap();
        assert_eq!(config.listen.port, "8920");
        assert_eq!(config.tmdb.base_url, "https://api.themoviedb.org/3");
        assert_eq!(config.jobs.recommendations_per_user, 20);
        assert_eq!(config.get_database_path().unwrap(), "/tmp/test.db");
    }

    #[test]
    fn dbdir_fallback() {
        let config: Config = serde_yaml::from_str("dbdir: /var/lib/cinerec\n").unwrap();
        assert_eq!(
            config.get_database_path().unwrap(),
            "/var/lib/cinerec/cinerec.db"
        );
    }
}
