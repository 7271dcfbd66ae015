use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt::Display;

/// The key identifying a shortened URL.
///
/// Codes are produced by a trusted generator, so no validation happens on
/// construction. Uniqueness is a property of the generator, not of this type.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShortCode(String);

impl ShortCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Returns the short code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Builds the absolute short link, joining base and code with exactly one `/`.
    pub fn to_url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.0)
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Display for ShortCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ShortCode {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ShortCode {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for ShortCode {
    fn borrow(&self) -> &str {
        &self.0
    }
}
