//! UUID values and their generation scheme.

use crate::error::ParseError;
use std::fmt;
use std::str::FromStr;

/// How a UUID was generated, derived from its version bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UuidKind {
    /// Any version other than 4 or 7 (including nil).
    Unspecified,
    /// Version 4, random.
    Random,
    /// Version 7, time-ordered.
    TimeOrdered,
}

/// A 128-bit UUID.
///
/// The [`UuidKind`] is never stored separately; it is read from the version
/// nibble so that two equal UUIDs always report the same kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uuid(uuid::Uuid);

impl Uuid {
    /// Generates a random (v4) UUID.
    pub fn new_v4() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Generates a time-ordered (v7) UUID.
    pub fn new_v7() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    pub fn nil() -> Self {
        Self(uuid::Uuid::nil())
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(uuid::Uuid::from_bytes(bytes))
    }

    pub fn kind(&self) -> UuidKind {
        match self.0.get_version_num() {
            4 => UuidKind::Random,
            7 => UuidKind::TimeOrdered,
            _ => UuidKind::Unspecified,
        }
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl From<uuid::Uuid> for Uuid {
    fn from(inner: uuid::Uuid) -> Self {
        Self(inner)
    }
}

impl From<Uuid> for uuid::Uuid {
    fn from(value: Uuid) -> Self {
        value.0
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for Uuid {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| ParseError::InvalidUuid(s.to_string()))
    }
}
