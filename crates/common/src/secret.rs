//! Redaction helpers for sensitive values

use std::fmt;
use zeroize::Zeroize;

/// Number of leading characters of a token shown in log previews.
const PREVIEW_CHARS: usize = 6;

/// Sensitive value - redacted in Debug/Display/logs, zeroized on drop
pub struct Secret<T: Zeroize>(T);

impl<T: Zeroize> Secret<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Expose the inner value (use sparingly)
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl Secret<String> {
    /// Compare against a presented credential without exposing the stored one.
    ///
    /// Runs over the full length of both inputs so the comparison time does
    /// not depend on the position of the first mismatch.
    pub fn matches(&self, candidate: &str) -> bool {
        let stored = self.0.as_bytes();
        let given = candidate.as_bytes();
        let mut diff = stored.len() ^ given.len();
        for i in 0..stored.len().max(given.len()) {
            let a = stored.get(i).copied().unwrap_or(0);
            let b = given.get(i).copied().unwrap_or(0);
            diff |= usize::from(a ^ b);
        }
        diff == 0
    }
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> Drop for Secret<T> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl<T: Zeroize + Clone> Clone for Secret<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

/// Short, log-safe handle for a provider token: the first few characters
/// followed by an ellipsis. Tokens shorter than the preview are fully masked.
pub fn token_preview(token: &str) -> String {
    if token.chars().count() <= PREVIEW_CHARS {
        return "***".to_string();
    }
    let head: String = token.chars().take(PREVIEW_CHARS).collect();
    format!("{head}...")
}
