//! Short code generation.
//!
//! Codes are an MD5 digest of the URL salted with the current time in
//! nanoseconds, base64url-encoded and truncated to the requested length.
//! Salting with the clock means the same URL yields a fresh code on every
//! call, which is what a retry after a conflict needs.

pub mod error;

pub use error::GeneratorError;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use jiff::Timestamp;
use tinylink_core::ShortCode;

type Result<T> = std::result::Result<T, GeneratorError>;

/// Longest usable code: base64 of a 128-bit digest is 24 characters.
pub const MAX_CODE_LENGTH: usize = 24;

/// Trait for generating short codes.
///
/// Implementations are pure generators that don't interact with storage.
pub trait Generator: Send + Sync + 'static {
    /// Produces a short code for `url`.
    fn generate(&self, url: &str) -> Result<ShortCode>;
}

/// Generates a code of exactly `length` characters for `url`.
pub fn generate(url: &str, length: usize) -> Result<ShortCode> {
    check_length(length)?;
    if url.is_empty() {
        return Err(GeneratorError::EmptyInput);
    }

    let nanos = Timestamp::now().as_nanosecond();
    Ok(digest_code(url, nanos, length))
}

fn check_length(length: usize) -> Result<()> {
    if length == 0 || length > MAX_CODE_LENGTH {
        return Err(GeneratorError::InvalidLength {
            length,
            max: MAX_CODE_LENGTH,
        });
    }
    Ok(())
}

fn digest_code(url: &str, nanos: i128, length: usize) -> ShortCode {
    let digest = md5::compute(format!("{url}{nanos}"));
    let encoded = URL_SAFE.encode(digest.0);
    ShortCode::new(&encoded[..length])
}

/// [`Generator`] producing hash codes of a fixed length.
#[derive(Debug, Clone, Copy)]
pub struct HashGenerator {
    length: usize,
}

impl HashGenerator {
    /// Creates a generator, rejecting lengths outside `1..=24`.
    pub fn new(length: usize) -> Result<Self> {
        check_length(length)?;
        Ok(Self { length })
    }

    pub fn length(&self) -> usize {
        self.length
    }
}

impl Generator for HashGenerator {
    fn generate(&self, url: &str) -> Result<ShortCode> {
        generate(url, self.length)
    }
}
