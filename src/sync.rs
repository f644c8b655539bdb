//! End-to-end flows over one source file.
//!
//! * pull: render every marked comment in a reader's language.
//! * push: record edited comments as new versions and strip the bodies back
//!   to placeholders, since the text now lives in the store.
//!
//! Both flows work on the file text plus its Local Identity Map and never
//! leave a half-rewritten file behind.

use crate::detector::{ChangeDetector, IdentityEntry};
use crate::error::{Result, SyncError};
use crate::identity::VersionId;
use crate::language::Language;
use crate::marker;
use crate::metadata::{self, IdentityMap, SidecarLayout};
use crate::resolver::TranslationResolver;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug)]
pub struct PullOutcome {
    pub text: String,
    /// Number of marker lines rewritten
    pub rewritten: usize,
}

#[derive(Debug)]
pub struct PushOutcome {
    pub text: String,
    pub map: IdentityMap,
    /// landmark -> new or unchanged identity for every pushed comment
    pub updated: BTreeMap<String, IdentityEntry>,
    /// claimed identity -> error; those lines keep their text
    pub failed: BTreeMap<String, SyncError>,
}

impl PushOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Marker lines of a source text, in order: (line index, landmark, body).
/// Placeholders have no body.
fn scan(lines: &[&str]) -> Vec<(usize, String, Option<String>)> {
    lines
        .iter()
        .enumerate()
        .filter_map(|(idx, line)| {
            marker::decode(line).map(|m| {
                let body = (!m.is_placeholder()).then(|| m.text.to_string());
                (idx, m.landmark.to_string(), body)
            })
        })
        .collect()
}

/// Render all marked comments of `source` in `language`.
///
/// Every landmark must have an identity in `map`, and every identity must
/// resolve; otherwise nothing is rewritten and the error is returned.
pub async fn pull(
    source: &str,
    map: &IdentityMap,
    language: &Language,
    resolver: &TranslationResolver,
) -> Result<PullOutcome> {
    let lines: Vec<&str> = source.split_inclusive('\n').collect();
    let markers = scan(&lines);

    let mut targets: Vec<(usize, String, VersionId)> = Vec::with_capacity(markers.len());
    for (idx, landmark, _) in markers {
        let entry = map
            .get(&landmark)
            .ok_or_else(|| SyncError::UnknownLandmark {
                landmark: landmark.clone(),
            })?;
        targets.push((idx, landmark, entry.landmark_id.clone()));
    }

    let ids: Vec<VersionId> = targets.iter().map(|(_, _, id)| id.clone()).collect();
    let resolved = resolver.resolve_all(&ids, language).await?;

    let mut out: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
    let mut rewritten = 0;
    for (idx, landmark, id) in &targets {
        // resolve_all returns every id it was given
        let Some(text) = resolved.get(id) else { continue };
        if let Some(line) = marker::encode(lines[*idx], landmark, text) {
            out[*idx] = line;
            rewritten += 1;
        }
    }

    Ok(PullOutcome {
        text: out.concat(),
        rewritten,
    })
}

/// Push the marked comments of `source`, written in `language`.
///
/// Markers without a body are skipped. A landmark marked on two lines aborts
/// the push before anything is written. Per-comment failures are isolated:
/// the other comments are still recorded and stripped, the failed ones keep
/// their text so nothing is lost.
pub async fn push(
    source: &str,
    map: &IdentityMap,
    language: &Language,
    detector: &ChangeDetector,
) -> Result<PushOutcome> {
    let lines: Vec<&str> = source.split_inclusive('\n').collect();
    let markers = scan(&lines);

    let mut seen = HashSet::new();
    let mut claims = BTreeMap::new();
    for (_, landmark, text) in &markers {
        if !seen.insert(landmark.clone()) {
            return Err(SyncError::DuplicateLandmark {
                landmark: landmark.clone(),
            });
        }
        let Some(text) = text else {
            continue;
        };

        let claimed = match map.get(landmark) {
            Some(entry) => entry.landmark_id.to_string(),
            None => VersionId::new_for(landmark)?.to_string(),
        };
        claims.insert(claimed, text.clone());
    }

    let batch = detector.detect_batch(&claims, language).await;

    // Keep entries for every landmark still in the file; drop the rest
    let mut new_map: IdentityMap = map
        .iter()
        .filter(|(landmark, _)| seen.contains(*landmark))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    for (landmark, entry) in &batch.updated {
        new_map.insert(landmark.clone(), entry.clone());
    }

    let mut out: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
    for (idx, landmark, _) in &markers {
        if batch.updated.contains_key(landmark) {
            if let Some(line) = marker::placeholder(lines[*idx], landmark) {
                out[*idx] = line;
            }
        }
    }

    Ok(PushOutcome {
        text: out.concat(),
        map: new_map,
        updated: batch.updated,
        failed: batch.failed,
    })
}

/// Pull one file in place using its sidecar
pub async fn pull_file(
    source_path: &Path,
    layout: &SidecarLayout,
    language: &Language,
    resolver: &TranslationResolver,
) -> Result<PullOutcome> {
    let source = std::fs::read_to_string(source_path)?;
    let map = metadata::load(&layout.sidecar_for(source_path)?);

    let outcome = pull(&source, &map, language, resolver).await?;
    if outcome.text != source {
        metadata::write_atomic(source_path, outcome.text.as_bytes())?;
    }
    info!(
        "Pulled {} ({} comments in {})",
        source_path.display(),
        outcome.rewritten,
        language
    );
    Ok(outcome)
}

/// Push one file in place and rewrite its sidecar
pub async fn push_file(
    source_path: &Path,
    layout: &SidecarLayout,
    language: &Language,
    detector: &ChangeDetector,
) -> Result<PushOutcome> {
    let source = std::fs::read_to_string(source_path)?;
    let sidecar = layout.sidecar_for(source_path)?;
    let map = metadata::load(&sidecar);

    let outcome = push(&source, &map, language, detector).await?;

    // Sidecar first: a stripped file without recorded identities loses text
    metadata::save(&sidecar, &outcome.map)?;
    if outcome.text != source {
        metadata::write_atomic(source_path, outcome.text.as_bytes())?;
    }

    for (claimed, err) in &outcome.failed {
        warn!("{}: could not push {}: {}", source_path.display(), claimed, err);
    }
    info!(
        "Pushed {} ({} recorded, {} failed)",
        source_path.display(),
        outcome.updated.len(),
        outcome.failed.len()
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::SyncMetrics;
    use crate::provider::{ProviderError, ProviderTranslation, TranslationProvider};
    use crate::store::{MemoryStore, VersionStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    struct UppercaseProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TranslationProvider for UppercaseProvider {
        async fn translate(
            &self,
            text: &str,
            _target_language: &Language,
        ) -> std::result::Result<ProviderTranslation, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ProviderTranslation {
                translation: text.to_uppercase(),
                moderation_status: 0,
                moderation_rationale: String::new(),
            })
        }
    }

    struct Harness {
        store: MemoryStore,
        detector: ChangeDetector,
        resolver: TranslationResolver,
        provider: Arc<UppercaseProvider>,
    }

    fn harness() -> Harness {
        let store = MemoryStore::new();
        let metrics = Arc::new(SyncMetrics::new());
        let provider = Arc::new(UppercaseProvider {
            calls: AtomicUsize::new(0),
        });
        let shared: Arc<dyn VersionStore> = Arc::new(store.clone());
        Harness {
            detector: ChangeDetector::new(Arc::clone(&shared), Arc::clone(&metrics)),
            resolver: TranslationResolver::new(
                shared,
                Arc::clone(&provider) as Arc<dyn TranslationProvider>,
                metrics,
            ),
            store,
            provider,
        }
    }

    fn english() -> Language {
        Language::parse("english").unwrap()
    }

    fn shout() -> Language {
        Language::parse("shouting").unwrap()
    }

    const SOURCE: &str = "def greet():\n    # %^greet^% say hello\n    return 'hi'  # %^ret^% the greeting\n";

    #[tokio::test]
    async fn test_push_new_file_mints_and_strips() {
        let h = harness();

        let outcome = push(SOURCE, &IdentityMap::new(), &english(), &h.detector)
            .await
            .expect("push");

        assert!(outcome.is_complete());
        assert_eq!(
            outcome.text,
            "def greet():\n    # %^greet^%\n    return 'hi'  # %^ret^%\n"
        );
        assert_eq!(outcome.map.len(), 2);
        assert_eq!(outcome.map["greet"].comment, "say hello");
        assert_eq!(outcome.map["ret"].comment, "the greeting");
        assert_eq!(h.store.len(), 2);
    }

    #[tokio::test]
    async fn test_push_unchanged_keeps_identities() {
        let h = harness();
        let first = push(SOURCE, &IdentityMap::new(), &english(), &h.detector).await.unwrap();

        let second = push(SOURCE, &first.map, &english(), &h.detector).await.unwrap();

        assert_eq!(second.map, first.map);
        assert_eq!(h.store.len(), 2);
    }

    #[tokio::test]
    async fn test_push_placeholders_are_skipped() {
        let h = harness();
        let first = push(SOURCE, &IdentityMap::new(), &english(), &h.detector).await.unwrap();

        let again = push(&first.text, &first.map, &english(), &h.detector).await.unwrap();

        assert_eq!(again.text, first.text);
        assert_eq!(again.map, first.map);
        assert!(again.updated.is_empty());
        assert_eq!(h.store.len(), 2);
    }

    #[tokio::test]
    async fn test_push_edit_forks_one_landmark() {
        let h = harness();
        let first = push(SOURCE, &IdentityMap::new(), &english(), &h.detector).await.unwrap();

        let edited_source = SOURCE.replace("say hello", "say hello politely");
        let second = push(&edited_source, &first.map, &english(), &h.detector).await.unwrap();

        assert_ne!(second.map["greet"].landmark_id, first.map["greet"].landmark_id);
        assert_eq!(second.map["greet"].comment, "say hello politely");
        assert_eq!(second.map["ret"], first.map["ret"]);
        assert_eq!(h.store.len(), 3);
    }

    #[tokio::test]
    async fn test_push_duplicate_landmark_aborts() {
        let h = harness();
        let source = "# %^a^% one\n# %^a^% two\n";

        let err = push(source, &IdentityMap::new(), &english(), &h.detector)
            .await
            .expect_err("duplicate");
        assert!(matches!(err, SyncError::DuplicateLandmark { .. }));
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_push_stale_identity_keeps_line() {
        let h = harness();
        let mut map = IdentityMap::new();
        map.insert(
            "greet".to_string(),
            IdentityEntry {
                landmark_id: "greet@stale".parse().unwrap(),
                comment: "old".to_string(),
            },
        );

        let outcome = push(SOURCE, &map, &english(), &h.detector).await.unwrap();

        assert!(!outcome.is_complete());
        assert!(outcome.failed.contains_key("greet@stale"));
        assert!(outcome.text.contains("# %^greet^% say hello\n"));
        assert!(outcome.text.contains("# %^ret^%\n"));
        assert_eq!(outcome.map["greet"].landmark_id.to_string(), "greet@stale");
        assert!(outcome.map.contains_key("ret"));
    }

    #[tokio::test]
    async fn test_push_prunes_removed_landmarks() {
        let h = harness();
        let first = push(SOURCE, &IdentityMap::new(), &english(), &h.detector).await.unwrap();

        let only_greet = "# %^greet^% say hello\n";
        let second = push(only_greet, &first.map, &english(), &h.detector).await.unwrap();

        assert_eq!(second.map.len(), 1);
        assert!(second.map.contains_key("greet"));
    }

    #[tokio::test]
    async fn test_pull_renders_translations() {
        let h = harness();
        let pushed = push(SOURCE, &IdentityMap::new(), &english(), &h.detector).await.unwrap();

        let pulled = pull(&pushed.text, &pushed.map, &shout(), &h.resolver)
            .await
            .expect("pull");

        assert_eq!(pulled.rewritten, 2);
        assert_eq!(
            pulled.text,
            "def greet():\n    # %^greet^% SAY HELLO\n    return 'hi'  # %^ret^% THE GREETING\n"
        );
    }

    #[tokio::test]
    async fn test_pull_in_canonical_language_restores_text() {
        let h = harness();
        let pushed = push(SOURCE, &IdentityMap::new(), &english(), &h.detector).await.unwrap();

        let pulled = pull(&pushed.text, &pushed.map, &english(), &h.resolver).await.unwrap();

        assert_eq!(pulled.text, SOURCE);
        assert_eq!(h.provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_pull_unknown_landmark_aborts() {
        let h = harness();
        let pushed = push(SOURCE, &IdentityMap::new(), &english(), &h.detector).await.unwrap();
        let mut map = pushed.map.clone();
        map.remove("ret");

        let err = pull(&pushed.text, &map, &shout(), &h.resolver)
            .await
            .expect_err("unknown landmark");
        assert!(matches!(err, SyncError::UnknownLandmark { ref landmark } if landmark == "ret"));
        assert_eq!(h.provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_pull_unresolvable_identity_aborts() {
        let h = harness();
        let pushed = push(SOURCE, &IdentityMap::new(), &english(), &h.detector).await.unwrap();
        let mut map = pushed.map.clone();
        map.insert(
            "ret".to_string(),
            IdentityEntry {
                landmark_id: "ret@missing".parse().unwrap(),
                comment: String::new(),
            },
        );

        let err = pull(&pushed.text, &map, &shout(), &h.resolver).await.expect_err("missing");
        assert!(matches!(err, SyncError::IdentityNotFound { .. }));
    }

    #[tokio::test]
    async fn test_pull_then_push_same_language_is_stable() {
        let h = harness();
        let pushed = push(SOURCE, &IdentityMap::new(), &english(), &h.detector).await.unwrap();
        let pulled = pull(&pushed.text, &pushed.map, &shout(), &h.resolver).await.unwrap();

        let repushed = push(&pulled.text, &pushed.map, &shout(), &h.detector).await.unwrap();

        assert_eq!(repushed.map["greet"].landmark_id, pushed.map["greet"].landmark_id);
        assert_eq!(repushed.map["ret"].landmark_id, pushed.map["ret"].landmark_id);
        assert_eq!(h.store.len(), 2);
    }

    #[tokio::test]
    async fn test_file_roundtrip() {
        let h = harness();
        let temp_dir = TempDir::new().expect("temp dir");
        let source_path = temp_dir.path().join("main.py");
        std::fs::write(&source_path, SOURCE).unwrap();
        let layout = SidecarLayout::new(temp_dir.path(), Path::new("comment_files")).unwrap();

        push_file(&source_path, &layout, &english(), &h.detector)
            .await
            .expect("push file");
        let stripped = std::fs::read_to_string(&source_path).unwrap();
        assert!(stripped.contains("# %^greet^%\n"));

        let sidecar = layout.sidecar_for(&source_path).unwrap();
        assert_eq!(metadata::load(&sidecar).len(), 2);

        pull_file(&source_path, &layout, &english(), &h.resolver)
            .await
            .expect("pull file");
        assert_eq!(std::fs::read_to_string(&source_path).unwrap(), SOURCE);
    }

    #[tokio::test]
    async fn test_look_alike_paths_keep_separate_maps() {
        let h = harness();
        let temp_dir = TempDir::new().expect("temp dir");
        std::fs::create_dir_all(temp_dir.path().join("a")).unwrap();
        let nested = temp_dir.path().join("a/b.py");
        let dotted = temp_dir.path().join("a.b.py");
        std::fs::write(&nested, "x = 1  # %^x^% the x value\n").unwrap();
        std::fs::write(&dotted, "y = 2  # %^y^% the y value\n").unwrap();
        let layout = SidecarLayout::new(temp_dir.path(), Path::new("comment_files")).unwrap();

        push_file(&nested, &layout, &english(), &h.detector).await.unwrap();
        push_file(&dotted, &layout, &english(), &h.detector).await.unwrap();

        let nested_map = metadata::load(&layout.sidecar_for(&nested).unwrap());
        assert_eq!(nested_map.keys().collect::<Vec<_>>(), vec!["x"]);

        pull_file(&nested, &layout, &english(), &h.resolver)
            .await
            .expect("x still has an identity");
        assert_eq!(
            std::fs::read_to_string(&nested).unwrap(),
            "x = 1  # %^x^% the x value\n"
        );
    }
}
