//! Sequential import queue over multiple agency feeds.
//!
//! Imports run one at a time. Each agency commits or rolls back on its own,
//! so a failure in one feed never blocks or poisons the others.

use crate::error::ImportError;
use crate::import::importer::{FeedImporter, ImportStats};
use crate::import::reader::FeedDirectory;
use tokio::sync::Mutex;

/// One agency's feed, queued for import.
#[derive(Debug, Clone)]
pub struct AgencyFeed {
    pub agency_key: String,
    pub directory: FeedDirectory,
}

/// The per-agency result of a queue run.
#[derive(Debug)]
pub struct AgencyOutcome {
    pub agency_key: String,
    pub result: Result<ImportStats, ImportError>,
}

pub struct ImportQueue {
    importer: FeedImporter,
    // serializes imports so two generations of the same agency can never
    // race each other
    lock: Mutex<()>,
}

impl ImportQueue {
    pub fn new(importer: FeedImporter) -> Self {
        Self {
            importer,
            lock: Mutex::new(()),
        }
    }

    /// Import a single agency, waiting for any in-flight import to finish.
    pub async fn import_agency(
        &self,
        agency_key: &str,
        directory: &FeedDirectory,
    ) -> Result<ImportStats, ImportError> {
        let _guard = self.lock.lock().await;
        self.importer.import_agency(agency_key, directory).await
    }

    /// Import every queued feed in order, continuing past failures.
    pub async fn import_all(&self, feeds: Vec<AgencyFeed>) -> Vec<AgencyOutcome> {
        let mut outcomes = Vec::with_capacity(feeds.len());

        for feed in feeds {
            let result = self.import_agency(&feed.agency_key, &feed.directory).await;
            if let Err(err) = &result {
                log::error!("{}: import failed: {}", feed.agency_key, err);
            }
            outcomes.push(AgencyOutcome {
                agency_key: feed.agency_key,
                result,
            });
        }

        outcomes
    }
}
