pub mod notifier;
pub mod recommender;
pub mod rollup;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::SqliteRepository;
use crate::metadata::{CatalogSync, MetadataError};
use crate::notify::{EmailClient, NotifyError};

/// Spawn the periodic background jobs. A job whose interval is 0, or whose
/// external service is not configured, is skipped.
pub fn start_background_jobs(config: Arc<Config>, db: Arc<SqliteRepository>) {
    spawn_catalog_sync(config.clone(), db.clone());
    spawn_recommender(config.clone(), db.clone());
    spawn_rollup(config.clone(), db.clone());
    spawn_notifier(config, db);
}

fn spawn_catalog_sync(config: Arc<Config>, db: Arc<SqliteRepository>) {
    let secs = config.jobs.sync_interval_secs;
    if secs == 0 {
        info!("Catalog sync disabled");
        return;
    }
    let sync = match CatalogSync::new(&config, db) {
        Ok(sync) => sync,
        Err(MetadataError::MissingKey(service)) => {
            info!("No {} API key, catalog sync disabled", service);
            return;
        }
        Err(e) => {
            warn!("Cannot start catalog sync: {}", e);
            return;
        }
    };

    tokio::spawn(async move {
        let mut timer = tokio::time::interval(Duration::from_secs(secs));
        loop {
            timer.tick().await;
            if let Err(e) = sync.run_once().await {
                warn!("Catalog sync failed: {}", e);
            }
        }
    });
}

fn spawn_recommender(config: Arc<Config>, db: Arc<SqliteRepository>) {
    let secs = config.jobs.recommend_interval_secs;
    if secs == 0 {
        info!("Recommendation refresh disabled");
        return;
    }
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(Duration::from_secs(secs));
        loop {
            timer.tick().await;
            if let Err(e) = recommender::refresh_all(&db, &config.jobs).await {
                warn!("Recommendation refresh failed: {}", e);
            }
        }
    });
}

fn spawn_rollup(config: Arc<Config>, db: Arc<SqliteRepository>) {
    let secs = config.jobs.rollup_interval_secs;
    if secs == 0 {
        info!("Popularity rollup disabled");
        return;
    }
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(Duration::from_secs(secs));
        loop {
            timer.tick().await;
            // today so far, plus yesterday to close out the previous day
            let today = Utc::now().date_naive();
            for date in [today - chrono::Duration::days(1), today] {
                if let Err(e) = rollup::rollup_day(&db, date).await {
                    warn!(date = %date, "Popularity rollup failed: {}", e);
                }
            }
        }
    });
}

fn spawn_notifier(config: Arc<Config>, db: Arc<SqliteRepository>) {
    let secs = config.jobs.notify_interval_secs;
    if secs == 0 {
        info!("Notification delivery disabled");
        return;
    }
    let email = match EmailClient::new(&config.email) {
        Ok(client) => client,
        Err(NotifyError::NotConfigured) => {
            info!("No email provider configured, notification delivery disabled");
            return;
        }
        Err(e) => {
            warn!("Cannot start notification delivery: {}", e);
            return;
        }
    };

    tokio::spawn(async move {
        let mut timer = tokio::time::interval(Duration::from_secs(secs));
        loop {
            timer.tick().await;
            if let Err(e) = notifier::deliver_recommendation_alerts(&db, &email).await {
                warn!("Notification delivery failed: {}", e);
            }
        }
    });
}
