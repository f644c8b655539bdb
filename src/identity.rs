//! Comment version identities: `landmark@token`.
//!
//! A landmark names a comment slot and never changes. The token tells the
//! versions of one landmark apart. `NEW` is an input-only sentinel asking the
//! detector to mint a fresh token; it is never stored.

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sentinel token used by callers that have never seen a landmark before
pub const NEW_TOKEN: &str = "NEW";

/// Separator between landmark and token
pub const SEPARATOR: char = '@';

/// Check the landmark character class: `A-Z a-z 0-9 _ -`, non-empty
pub fn is_valid_landmark(landmark: &str) -> bool {
    !landmark.is_empty()
        && landmark
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Token {
    /// The `NEW` sentinel
    New,
    /// A minted, stored token
    Minted(String),
}

impl Token {
    /// Mint a fresh, globally unique token
    pub fn mint() -> Self {
        Token::Minted(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Token::New)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Token::New => NEW_TOKEN,
            Token::Minted(token) => token,
        }
    }
}

/// Identity of a Comment Version (or, with the `NEW` token, a request for one)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VersionId {
    landmark: String,
    token: Token,
}

impl VersionId {
    /// Identity asking for a brand new version under `landmark`
    pub fn new_for(landmark: &str) -> Result<Self> {
        if !is_valid_landmark(landmark) {
            return Err(SyncError::InvalidIdentity(landmark.to_string()));
        }
        Ok(Self {
            landmark: landmark.to_string(),
            token: Token::New,
        })
    }

    /// A freshly minted identity under the same landmark
    pub fn mint(landmark: &str) -> Self {
        Self {
            landmark: landmark.to_string(),
            token: Token::mint(),
        }
    }

    pub fn landmark(&self) -> &str {
        &self.landmark
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn is_new(&self) -> bool {
        self.token.is_new()
    }
}

impl FromStr for VersionId {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || SyncError::InvalidIdentity(s.to_string());

        let (landmark, token) = s.split_once(SEPARATOR).ok_or_else(invalid)?;
        if !is_valid_landmark(landmark) || token.is_empty() || token.contains(SEPARATOR) {
            return Err(invalid());
        }
        if token.chars().any(char::is_whitespace) {
            return Err(invalid());
        }

        let token = if token == NEW_TOKEN {
            Token::New
        } else {
            Token::Minted(token.to_string())
        };

        Ok(Self {
            landmark: landmark.to_string(),
            token,
        })
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.landmark, SEPARATOR, self.token.as_str())
    }
}

impl Serialize for VersionId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
