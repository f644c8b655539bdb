//! Language keys for canonical text and translations.
//!
//! Languages are free-form names handed to the translation provider
//! (e.g. "english", "chinese"). They are normalized once at the boundary so
//! that "French" and "french " address the same Translation Entry.

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const MAX_LANGUAGE_LEN: usize = 64;

/// A validated, normalized language key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Language(String);

impl Language {
    /// Normalize (trim, lowercase) and validate a language name.
    ///
    /// Accepts letters, digits, `-`, `_` and inner spaces; rejects empty input.
    pub fn parse(raw: &str) -> Result<Language> {
        let normalized = raw.trim().to_lowercase();

        if normalized.is_empty() || normalized.len() > MAX_LANGUAGE_LEN {
            return Err(SyncError::InvalidLanguage(raw.to_string()));
        }
        let valid = normalized
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == ' ');
        if !valid {
            return Err(SyncError::InvalidLanguage(raw.to_string()));
        }

        Ok(Language(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Language {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        Language::parse(s)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Language {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Language::parse(&raw).map_err(serde::de::Error::custom)
    }
}
