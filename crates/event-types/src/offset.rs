//! Per-path append offsets.
//!
//! An offset is a 16-digit zero-padded decimal string. Lexicographic
//! order equals numeric order, which lets storage backends and wire
//! formats compare offsets as plain strings.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Sentinel meaning "before any event on this path".
pub const NONE_OFFSET: &str = "-1";

const WIDTH: usize = 16;

/// A dense, monotonic, per-path event offset.
///
/// Offsets are assigned by an `EventStream` at append time and are
/// never reused or skipped: the set of offsets on a path with `N`
/// events is exactly `{0, 1, ..., N-1}` formatted as 16-digit decimals,
/// plus the sentinel [`Offset::none`] for "before any event".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Offset(OffsetRepr);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum OffsetRepr {
    None,
    At(u64),
}

#[derive(Debug, thiserror::Error)]
#[error("invalid offset: {0}")]
pub struct InvalidOffset(String);

impl Offset {
    /// The sentinel offset preceding any event.
    pub const fn none() -> Self {
        Offset(OffsetRepr::None)
    }

    /// The first offset assigned on a fresh path.
    pub const fn zero() -> Self {
        Offset(OffsetRepr::At(0))
    }

    /// The offset one greater than this one.
    ///
    /// `none().next()` is `zero()`; any other offset increments by one.
    pub fn next(self) -> Self {
        match self.0 {
            OffsetRepr::None => Offset::zero(),
            OffsetRepr::At(n) => Offset(OffsetRepr::At(n + 1)),
        }
    }

    /// The raw numeric value, or `None` for the sentinel.
    pub fn value(self) -> Option<u64> {
        match self.0 {
            OffsetRepr::None => None,
            OffsetRepr::At(n) => Some(n),
        }
    }

    pub fn is_none(self) -> bool {
        matches!(self.0, OffsetRepr::None)
    }

    pub fn from_u64(n: u64) -> Self {
        Offset(OffsetRepr::At(n))
    }

    pub fn parse(s: &str) -> Result<Self, InvalidOffset> {
        s.parse()
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            OffsetRepr::None => write!(f, "{NONE_OFFSET}"),
            OffsetRepr::At(n) => write!(f, "{n:0width$}", width = WIDTH),
        }
    }
}

impl std::str::FromStr for Offset {
    type Err = InvalidOffset;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == NONE_OFFSET {
            return Ok(Offset::none());
        }
        if s.len() != WIDTH || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InvalidOffset(s.to_string()));
        }
        s.parse::<u64>()
            .map(Offset::from_u64)
            .map_err(|_| InvalidOffset(s.to_string()))
    }
}

impl TryFrom<String> for Offset {
    type Error = InvalidOffset;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Offset> for String {
    fn from(value: Offset) -> Self {
        value.to_string()
    }
}
