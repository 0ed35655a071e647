use mongodb::Database;

use crate::metrics::RESULTS_ARCHIVED_TOTAL;
use crate::models::SessionSummary;
use crate::utils::retry::{retry_async_with_config, RetryConfig};

pub const RESULTS_COLLECTION: &str = "assessment_results";

/// Archives summaries of finished sessions. Without MongoDB this is a no-op.
#[derive(Clone, Default)]
pub struct ResultsService {
    mongo: Option<Database>,
}

impl ResultsService {
    pub fn new(mongo: Option<Database>) -> Self {
        Self { mongo }
    }

    pub fn is_enabled(&self) -> bool {
        self.mongo.is_some()
    }

    /// Writes the summary in the background; the learner never waits on it.
    pub fn archive(&self, summary: SessionSummary) {
        let Some(mongo) = self.mongo.clone() else {
            RESULTS_ARCHIVED_TOTAL.with_label_values(&["skipped"]).inc();
            return;
        };

        tokio::spawn(async move {
            let collection: mongodb::Collection<SessionSummary> =
                mongo.collection(RESULTS_COLLECTION);

            let res: Result<_, mongodb::error::Error> =
                retry_async_with_config(RetryConfig::aggressive(), || async {
                    collection.insert_one(&summary).await.map(|_| ())
                })
                .await;

            match res {
                Ok(()) => {
                    RESULTS_ARCHIVED_TOTAL.with_label_values(&["success"]).inc();
                    tracing::info!("Session result archived: session={}", summary.session_id);
                }
                Err(e) => {
                    RESULTS_ARCHIVED_TOTAL.with_label_values(&["error"]).inc();
                    tracing::error!(
                        "Failed to archive result for session {}: {:#?}",
                        summary.session_id,
                        e
                    );
                }
            }
        });
    }
}
