// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project identifier: a URL-safe encoding of a project path.
//!
//! The encoding is base64url (no padding) of the path's UTF-8 bytes. It is
//! injective and reversible; consumers treat the identifier as an opaque
//! key, but `decode_path` always recovers the exact path it was built from.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProjectPathError {
    #[error("project path is not valid UTF-8: {0}")]
    NonUtf8Path(PathBuf),

    #[error("invalid project id encoding: {0}")]
    BadEncoding(String),
}

/// Opaque key derived from a project's filesystem path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    /// Encode a project path. Fails only for non-UTF-8 paths.
    pub fn from_path(path: &Path) -> Result<Self, ProjectPathError> {
        let utf8 = path
            .to_str()
            .ok_or_else(|| ProjectPathError::NonUtf8Path(path.to_path_buf()))?;
        Ok(Self(URL_SAFE_NO_PAD.encode(utf8.as_bytes())))
    }

    /// Accept an already-encoded identifier (e.g. from a client request).
    pub fn from_encoded(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Recover the path this identifier encodes.
    pub fn decode_path(&self) -> Result<PathBuf, ProjectPathError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(self.0.as_bytes())
            .map_err(|_| ProjectPathError::BadEncoding(self.0.clone()))?;
        let utf8 =
            String::from_utf8(bytes).map_err(|_| ProjectPathError::BadEncoding(self.0.clone()))?;
        Ok(PathBuf::from(utf8))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Borrow<str> for ProjectId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[path = "project_tests.rs"]
mod tests;
