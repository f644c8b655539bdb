//! Change detection: decide whether an incoming comment is new, unchanged
//! or edited, and mint identities accordingly.
//!
//! Comparison policy: texts are compared case-sensitively after removing
//! trailing whitespace only. Any other difference, including inner
//! whitespace and line-ending changes, is an edit.

use crate::error::{Result, SyncError};
use crate::identity::VersionId;
use crate::language::Language;
use crate::metrics::SyncMetrics;
use crate::store::{CommentVersion, VersionStore};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What the detector concluded for one comment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// First sight of the landmark; a version was minted
    Created,
    /// Text matches the claimed version; nothing written
    Unchanged,
    /// Text diverged; a new sibling version was minted
    Edited,
}

/// Identity and text a landmark points to after a push.
///
/// This is also the value type of the Local Identity Map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityEntry {
    pub landmark_id: VersionId,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub entry: IdentityEntry,
    pub outcome: Outcome,
}

/// Result of a batch detection. Failures are kept per claimed identity so
/// that one bad entry does not hide the versions already minted for others.
#[derive(Debug, Default)]
pub struct BatchDetection {
    /// landmark -> entry, for every claim that succeeded
    pub updated: BTreeMap<String, IdentityEntry>,
    /// claimed identity -> error
    pub failed: BTreeMap<String, SyncError>,
}

impl BatchDetection {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Comparable form of a comment text
pub fn normalize(text: &str) -> &str {
    text.trim_end()
}

pub struct ChangeDetector {
    store: Arc<dyn VersionStore>,
    metrics: Arc<SyncMetrics>,
}

impl ChangeDetector {
    pub fn new(store: Arc<dyn VersionStore>, metrics: Arc<SyncMetrics>) -> Self {
        Self { store, metrics }
    }

    /// Detect one comment against its claimed identity.
    ///
    /// An unknown (non-`NEW`) identity is an error: it means the caller's
    /// identity map is out of step with the store.
    pub async fn detect(&self, claimed: &VersionId, text: &str, language: &Language) -> Result<Detection> {
        let text = normalize(text);

        if claimed.is_new() {
            let entry = self.create(claimed.landmark(), text, language).await?;
            info!("Created {} ({})", entry.landmark_id, language);
            return Ok(Detection {
                entry,
                outcome: Outcome::Created,
            });
        }

        let existing = self
            .store
            .get_version(claimed)
            .await?
            .ok_or_else(|| SyncError::IdentityNotFound {
                id: claimed.to_string(),
            })?;

        // A version without text in this language cannot match: that is an edit
        // made in a language the comment has never been rendered in.
        if let Some(stored) = existing.text_in(language) {
            if normalize(stored) == text {
                debug!("{} unchanged", claimed);
                self.metrics.record_unchanged();
                return Ok(Detection {
                    entry: IdentityEntry {
                        landmark_id: claimed.clone(),
                        comment: stored.to_string(),
                    },
                    outcome: Outcome::Unchanged,
                });
            }
        }

        let entry = self.create(claimed.landmark(), text, language).await?;
        info!("{} edited, now {}", claimed, entry.landmark_id);
        Ok(Detection {
            entry,
            outcome: Outcome::Edited,
        })
    }

    /// Detect a whole batch of `landmark@token -> text` claims.
    ///
    /// Claims are processed concurrently. Malformed identities and duplicate
    /// landmarks are reported as failures of their own claims.
    pub async fn detect_batch(&self, claims: &BTreeMap<String, String>, language: &Language) -> BatchDetection {
        let mut batch = BatchDetection::default();
        let mut seen = HashSet::new();
        let mut parsed = Vec::with_capacity(claims.len());

        for (raw, text) in claims {
            match raw.parse::<VersionId>() {
                Ok(id) if !seen.insert(id.landmark().to_string()) => {
                    batch.failed.insert(
                        raw.clone(),
                        SyncError::DuplicateLandmark {
                            landmark: id.landmark().to_string(),
                        },
                    );
                }
                Ok(id) => parsed.push((raw, id, text)),
                Err(e) => {
                    batch.failed.insert(raw.clone(), e);
                }
            }
        }

        let results = join_all(parsed.into_iter().map(|(raw, id, text)| async move {
            let result = self.detect(&id, text, language).await;
            (raw, id, result)
        }))
        .await;

        for (raw, id, result) in results {
            match result {
                Ok(detection) => {
                    batch.updated.insert(id.landmark().to_string(), detection.entry);
                }
                Err(e) => {
                    warn!("Detection failed for {}: {}", raw, e);
                    batch.failed.insert(raw.clone(), e);
                }
            }
        }

        batch
    }

    async fn create(&self, landmark: &str, text: &str, language: &Language) -> Result<IdentityEntry> {
        let id = VersionId::mint(landmark);
        let version = CommentVersion::new(id.clone(), language.clone(), text);
        self.store.create_version(&version).await?;
        self.metrics.record_version_created();

        Ok(IdentityEntry {
            landmark_id: id,
            comment: text.to_string(),
        })
    }
}
