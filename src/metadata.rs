//! Local Identity Map files.
//!
//! Each source file has a JSON sidecar mapping landmark -> `{landmark_id,
//! comment}`. Sidecars mirror the source tree under the comment directory,
//! so `<root>/a/b.py` keeps its map in `<dir>/a/b.py.comments.json`. A
//! missing or unreadable sidecar is treated as an empty map: every landmark
//! in the file then counts as new on the next push.

use crate::detector::IdentityEntry;
use crate::error::{Result, SyncError};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::warn;

/// landmark -> current identity and last-seen text
pub type IdentityMap = BTreeMap<String, IdentityEntry>;

const SIDECAR_SUFFIX: &str = ".comments.json";

/// Where the sidecars of one project live
#[derive(Debug, Clone)]
pub struct SidecarLayout {
    root: PathBuf,
    dir: PathBuf,
}

impl SidecarLayout {
    /// `comment_dir` is taken relative to `root` unless it is absolute
    pub fn new(root: &Path, comment_dir: &Path) -> Result<Self> {
        let root = root.canonicalize()?;
        let dir = root.join(comment_dir);
        Ok(Self { root, dir })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Sidecar of an existing source file.
    ///
    /// Any spelling of the same file (relative, absolute, through `..`)
    /// maps to the same sidecar; distinct files never share one.
    pub fn sidecar_for(&self, source_path: &Path) -> Result<PathBuf> {
        let absolute = source_path.canonicalize()?;
        let relative = absolute
            .strip_prefix(&self.root)
            .map_err(|_| SyncError::SourceOutsideRoot {
                path: source_path.display().to_string(),
                root: self.root.display().to_string(),
            })?;

        let mut name: OsString = relative.as_os_str().to_os_string();
        name.push(SIDECAR_SUFFIX);
        Ok(self.dir.join(name))
    }
}

/// Parse a sidecar strictly
pub fn parse(path: &Path, raw: &str) -> Result<IdentityMap> {
    let map: IdentityMap = serde_json::from_str(raw).map_err(|e| SyncError::MetadataCorrupt {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    // Keys must agree with the identities they point to
    for (landmark, entry) in &map {
        if entry.landmark_id.landmark() != landmark || entry.landmark_id.is_new() {
            return Err(SyncError::MetadataCorrupt {
                path: path.display().to_string(),
                reason: format!(
                    "landmark {:?} points to {}",
                    landmark, entry.landmark_id
                ),
            });
        }
    }

    Ok(map)
}

/// Read a sidecar, falling back to an empty map when it is absent or corrupt
pub fn load(path: &Path) -> IdentityMap {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return IdentityMap::new(),
        Err(e) => {
            warn!(
                "{}",
                SyncError::MetadataCorrupt {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                }
            );
            return IdentityMap::new();
        }
    };

    if raw.trim().is_empty() {
        return IdentityMap::new();
    }

    parse(path, &raw).unwrap_or_else(|e| {
        warn!("{}; starting from an empty map", e);
        IdentityMap::new()
    })
}

/// Write a sidecar atomically
pub fn save(path: &Path, map: &IdentityMap) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let json = serde_json::to_string_pretty(map)?;
    write_atomic(path, json.as_bytes())
}

/// Replace `path` with `contents` via a temp file in the same directory and
/// a rename, so readers see either the old or the new file. An existing
/// file's permissions carry over.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = temp_path(path);
    std::fs::write(&tmp, contents)?;

    let finish = || -> Result<()> {
        if let Ok(existing) = std::fs::metadata(path) {
            std::fs::set_permissions(&tmp, existing.permissions())?;
        }
        std::fs::rename(&tmp, path)?;
        Ok(())
    };

    finish().inspect_err(|_| {
        let _ = std::fs::remove_file(&tmp);
    })
}

/// `dir/name` -> `dir/.name.tmp`
fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(path.file_name().unwrap_or_default());
    name.push(".tmp");
    path.with_file_name(name)
}
