// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The sapporo developers

//! Run identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a workflow run.
///
/// A UUIDv4 in lowercase hyphenated form. The first two hex characters
/// double as the on-disk shard directory; that split is an internal
/// detail and never appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    /// Generate a fresh random run ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an ID from its wire form.
    ///
    /// Accepts only the lowercase hyphenated UUID form so that path
    /// lookups and shard computation are stable.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        let uuid = Uuid::from_str(s).map_err(|_| IdError::Malformed(s.to_string()))?;
        // Uuid::from_str accepts uppercase and braced forms; reject anything
        // that does not round-trip to the canonical representation.
        if uuid.to_string() != s {
            return Err(IdError::Malformed(s.to_string()));
        }
        Ok(Self(uuid))
    }

    /// The two-character shard prefix used for the directory split.
    pub fn shard(&self) -> String {
        self.to_string()[..2].to_string()
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RunId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Errors from parsing run identifiers.
#[derive(Debug, thiserror::Error)]
pub enum IdError {
    #[error("malformed run_id: {0:?}")]
    Malformed(String),
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
