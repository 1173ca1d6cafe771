//! Content hash acceptance.
//!
//! The check is purely syntactic: a hash of the right length is worth sending
//! to the store, nothing more. Whether it resolves is only known after `cat`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{WeatherError, WeatherResult};

/// Length of a CIDv0 (`Qm...`) content identifier.
pub const HASH_LENGTH: usize = 46;

/// Return true if `hash` has the length of a content identifier.
pub fn is_valid(hash: &str) -> bool {
    hash.chars().count() == HASH_LENGTH
}

/// A content identifier that passed [`is_valid`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    pub fn parse(hash: &str) -> WeatherResult<Self> {
        if is_valid(hash) {
            Ok(Self(hash.to_string()))
        } else {
            Err(WeatherError::InvalidHash(hash.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ContentHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ContentHash {
    type Error = WeatherError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if is_valid(&value) {
            Ok(Self(value))
        } else {
            Err(WeatherError::InvalidHash(value))
        }
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}
