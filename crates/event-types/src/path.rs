//! Stream paths.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An opaque, non-empty stream identifier (e.g. `/pi/session-42`).
///
/// Used verbatim as a map key and URL segment; the `/` separators are
/// meaningful to clients but opaque to storage.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StreamPath(String);

#[derive(Debug, thiserror::Error)]
#[error("stream path must not be empty")]
pub struct EmptyPath;

impl StreamPath {
    pub fn new(s: impl Into<String>) -> Result<Self, EmptyPath> {
        let s = s.into();
        if s.is_empty() {
            return Err(EmptyPath);
        }
        Ok(StreamPath(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filesystem-safe encoding for the file storage backend: `/` is
    /// opaque to storage, so it is substituted with `_`.
    pub fn to_filename_stem(&self) -> String {
        self.0.replace('/', "_")
    }
}

impl fmt::Display for StreamPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for StreamPath {
    type Error = EmptyPath;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        StreamPath::new(value)
    }
}

impl From<StreamPath> for String {
    fn from(value: StreamPath) -> Self {
        value.0
    }
}

impl std::str::FromStr for StreamPath {
    type Err = EmptyPath;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StreamPath::new(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty() {
        assert!(StreamPath::new("").is_err());
    }

    #[test]
    fn filename_stem_substitutes_slashes() {
        let p = StreamPath::new("/pi/session-42").unwrap();
        assert_eq!(p.to_filename_stem(), "_pi_session-42");
    }
}
