//! Comment version persistence.
//!
//! The store is pure data access. It never decides whether a comment
//! changed; it only creates versions and records translations, and both
//! operations refuse to overwrite what is already there.

use crate::error::{Result, SyncError};
use crate::identity::VersionId;
use crate::language::Language;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

/// An immutable canonical-text snapshot under a landmark, plus its
/// per-language renderings.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentVersion {
    pub id: VersionId,
    pub original_language: Language,
    /// Language -> text. Always contains `original_language`.
    pub translations: BTreeMap<Language, String>,
    pub created_at: DateTime<Utc>,
}

impl CommentVersion {
    /// Build a fresh version holding only its canonical text
    pub fn new(id: VersionId, language: Language, text: impl Into<String>) -> Self {
        let mut translations = BTreeMap::new();
        translations.insert(language.clone(), text.into());
        Self {
            id,
            original_language: language,
            translations,
            created_at: Utc::now(),
        }
    }

    /// Text in the canonical language
    pub fn canonical_text(&self) -> &str {
        self.translations
            .get(&self.original_language)
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Cached rendering for `language`, if any
    pub fn text_in(&self, language: &Language) -> Option<&str> {
        self.translations.get(language).map(String::as_str)
    }
}

#[async_trait]
pub trait VersionStore: Send + Sync {
    /// Persist a new version. Fails with `VersionExists` if the identity is
    /// already taken; an existing version is never replaced.
    async fn create_version(&self, version: &CommentVersion) -> Result<()>;

    /// Load a version with all of its translations
    async fn get_version(&self, id: &VersionId) -> Result<Option<CommentVersion>>;

    /// Record a translation unless one already exists for the pair.
    ///
    /// Returns the text that is stored after the call: `text` when this call
    /// wrote it, the earlier entry otherwise.
    async fn put_translation(&self, id: &VersionId, language: &Language, text: &str) -> Result<String>;

    /// Cheap connectivity check
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// HashMap-backed store for tests and local runs
#[derive(Clone, Default)]
pub struct MemoryStore {
    versions: Arc<RwLock<HashMap<VersionId, CommentVersion>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored versions
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All versions stored under a landmark
    pub fn versions_of(&self, landmark: &str) -> Vec<CommentVersion> {
        let mut versions: Vec<_> = self
            .read()
            .values()
            .filter(|v| v.id.landmark() == landmark)
            .cloned()
            .collect();
        versions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        versions
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<VersionId, CommentVersion>> {
        // A panic while holding the lock cannot leave a half-written entry
        self.versions.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<VersionId, CommentVersion>> {
        self.versions.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl VersionStore for MemoryStore {
    async fn create_version(&self, version: &CommentVersion) -> Result<()> {
        let mut versions = self.write();
        if versions.contains_key(&version.id) {
            return Err(SyncError::VersionExists {
                id: version.id.to_string(),
            });
        }
        versions.insert(version.id.clone(), version.clone());
        Ok(())
    }

    async fn get_version(&self, id: &VersionId) -> Result<Option<CommentVersion>> {
        Ok(self.read().get(id).cloned())
    }

    async fn put_translation(&self, id: &VersionId, language: &Language, text: &str) -> Result<String> {
        let mut versions = self.write();
        let version = versions
            .get_mut(id)
            .ok_or_else(|| SyncError::IdentityNotFound { id: id.to_string() })?;

        let stored = version
            .translations
            .entry(language.clone())
            .or_insert_with(|| text.to_string());
        Ok(stored.clone())
    }
}
