//! Create-or-update writes keyed by natural key

use anyhow::Result;
use pitlane_common::types::UpsertOutcome;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::models::rows::Candidate;
use crate::store::Store;

/// Writes [`Candidate`] rows through a [`Store`]
#[derive(Clone)]
pub struct UpsertWriter {
    store: Arc<dyn Store>,
}

impl UpsertWriter {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Insert when the natural key is absent, otherwise rewrite the row.
    ///
    /// An unchanged payload still reports `Updated`. Store errors are
    /// returned for the caller to count against the item.
    pub async fn upsert(&self, candidate: &Candidate) -> Result<UpsertOutcome> {
        Ok(self.upsert_returning_id(candidate).await?.0)
    }

    /// Write a candidate whose foreign keys may not have resolved.
    ///
    /// `None` means a referenced entity is missing: nothing is written and
    /// the item is reported as `Skipped` under `label`.
    pub async fn upsert_resolved(
        &self,
        candidate: Option<Candidate>,
        label: &str,
    ) -> Result<(UpsertOutcome, Option<i64>)> {
        match candidate {
            Some(candidate) => self.upsert_returning_id(&candidate).await,
            None => {
                warn!(item = %label, "Referenced entity not resolved, skipping");
                Ok((UpsertOutcome::Skipped, None))
            },
        }
    }

    /// Like [`upsert`](Self::upsert), also returning the row id for callers
    /// that attach children to it
    pub async fn upsert_returning_id(&self, candidate: &Candidate) -> Result<(UpsertOutcome, Option<i64>)> {
        let Some(key) = candidate.natural_key() else {
            warn!(kind = candidate.kind(), "Candidate has no natural key, skipping");
            return Ok((UpsertOutcome::Skipped, None));
        };

        match self.store.find_id(&key).await? {
            Some(id) => {
                self.store.update(id, candidate).await?;
                debug!(kind = candidate.kind(), id, "Updated");
                Ok((UpsertOutcome::Updated, Some(id)))
            },
            None => {
                let id = self.store.insert(candidate).await?;
                debug!(kind = candidate.kind(), id, "Created");
                Ok((UpsertOutcome::Created, Some(id)))
            },
        }
    }
}
