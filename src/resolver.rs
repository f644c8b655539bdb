//! Get-or-translate with per-language memoization.
//!
//! A Translation Entry is written at most once per (version, language).
//! Within one process the miss path runs under a single-flight lock keyed by
//! the pair, so concurrent requests for the same pair call the provider once.
//! Across processes the store's insert-if-absent keeps the first entry; the
//! provider may then have been called more than once, but no entry is ever
//! overwritten.

use crate::error::{Result, SyncError};
use crate::flight::SingleFlight;
use crate::identity::VersionId;
use crate::language::Language;
use crate::metrics::SyncMetrics;
use crate::provider::{ProviderError, TranslationProvider};
use crate::store::{CommentVersion, VersionStore};
use futures::future::try_join_all;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct TranslationResolver {
    store: Arc<dyn VersionStore>,
    provider: Arc<dyn TranslationProvider>,
    metrics: Arc<SyncMetrics>,
    flight: SingleFlight,
}

impl TranslationResolver {
    pub fn new(
        store: Arc<dyn VersionStore>,
        provider: Arc<dyn TranslationProvider>,
        metrics: Arc<SyncMetrics>,
    ) -> Self {
        Self {
            store,
            provider,
            metrics,
            flight: SingleFlight::new(),
        }
    }

    /// Text of `id` in `language`, translating and caching it on first request.
    ///
    /// Provider failures are not retried and leave no Translation Entry
    /// behind, so a retry is safe.
    pub async fn resolve(&self, id: &VersionId, language: &Language) -> Result<String> {
        let version = self.load(id).await?;
        if let Some(text) = version.text_in(language) {
            debug!("Cache hit for {} ({})", id, language);
            self.metrics.record_cache_hit();
            return Ok(text.to_string());
        }

        let _guard = self.flight.acquire(&flight_key(id, language)).await;

        // Another task may have filled the entry while we waited
        let version = self.load(id).await?;
        if let Some(text) = version.text_in(language) {
            debug!("Cache filled while waiting for {} ({})", id, language);
            self.metrics.record_cache_hit();
            return Ok(text.to_string());
        }

        self.metrics.record_cache_miss();
        self.metrics.record_provider_call();
        info!(
            "Translating {} from {} to {}",
            id, version.original_language, language
        );

        let translated = match self.provider.translate(version.canonical_text(), language).await {
            Ok(translated) => translated,
            Err(e) => {
                self.metrics.record_provider_failure();
                warn!("Translation of {} to {} failed: {}", id, language, e);
                return Err(provider_error(id, language, e));
            }
        };

        if translated.moderation_status != 0 {
            warn!(
                "Moderation flagged {} ({}): status {}, {}",
                id, language, translated.moderation_status, translated.moderation_rationale
            );
        }

        self.store
            .put_translation(id, language, &translated.translation)
            .await
    }

    /// Resolve many identities at once.
    ///
    /// All-or-nothing: the first failure aborts the batch and no partial map
    /// is returned. Duplicate ids are resolved once.
    pub async fn resolve_all(&self, ids: &[VersionId], language: &Language) -> Result<BTreeMap<VersionId, String>> {
        let distinct: BTreeSet<&VersionId> = ids.iter().collect();

        let resolved = try_join_all(distinct.into_iter().map(|id| async move {
            let text = self.resolve(id, language).await?;
            Ok::<_, SyncError>((id.clone(), text))
        }))
        .await?;

        Ok(resolved.into_iter().collect())
    }

    async fn load(&self, id: &VersionId) -> Result<CommentVersion> {
        if id.is_new() {
            return Err(SyncError::InvalidIdentity(id.to_string()));
        }
        self.store
            .get_version(id)
            .await?
            .ok_or_else(|| SyncError::IdentityNotFound { id: id.to_string() })
    }
}

fn flight_key(id: &VersionId, language: &Language) -> String {
    format!("{}/{}", id, language)
}

fn provider_error(id: &VersionId, language: &Language, error: ProviderError) -> SyncError {
    match error {
        ProviderError::Malformed(reason) => SyncError::ProviderMalformed {
            id: id.to_string(),
            language: language.to_string(),
            reason,
        },
        ProviderError::Unavailable(reason) => SyncError::ProviderUnavailable {
            id: id.to_string(),
            language: language.to_string(),
            reason,
        },
    }
}
