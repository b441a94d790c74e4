//! Provider Credentials
//!
//! The provider API key is read once at startup from the process environment
//! and handed to the provider explicitly. A missing key is a fatal
//! configuration error, raised before any request is made.

use tracing::{info, warn};

use crate::core::{CoreError, CoreResult};

/// Primary environment variable holding the provider API key
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Fallback environment variable
pub const API_KEY_FALLBACK_ENV: &str = "API_KEY";

/// Longest key accepted
const MAX_KEY_LEN: usize = 1024;

/// Provider API key
///
/// `Debug` and `Display` never print the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a key value, rejecting empty or oversized input
    pub fn new(value: impl Into<String>) -> CoreResult<Self> {
        let value = value.into().trim().to_string();

        if value.is_empty() {
            return Err(CoreError::ConfigError("API key is empty".to_string()));
        }
        if value.len() > MAX_KEY_LEN {
            return Err(CoreError::ConfigError(format!(
                "API key is too long (max {} characters)",
                MAX_KEY_LEN
            )));
        }
        if !value.starts_with("AIza") {
            warn!("API key does not match expected format (AIza*), proceeding anyway");
        }

        Ok(Self(value))
    }

    /// Read the key from `GEMINI_API_KEY`, falling back to `API_KEY`
    pub fn from_env() -> CoreResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve the key through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> CoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        for name in [API_KEY_ENV, API_KEY_FALLBACK_ENV] {
            let Some(value) = lookup(name) else {
                continue;
            };
            if value.trim().is_empty() {
                continue;
            }

            let key = Self::new(value)?;
            info!("Loaded API key from {} ({})", name, key.redacted());
            return Ok(key);
        }

        Err(CoreError::ConfigError(format!(
            "No API key found. Set {} (or {}) before starting.",
            API_KEY_ENV, API_KEY_FALLBACK_ENV
        )))
    }

    /// Raw key value for request headers
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Redacted preview for logging
    pub fn redacted(&self) -> String {
        redact(&self.0)
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ApiKey").field(&self.redacted()).finish()
    }
}

impl std::fmt::Display for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.redacted())
    }
}

/// Mask a secret, keeping four characters on each end of long values
pub fn redact(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() < 12 {
        "*".repeat(chars.len())
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    }
}
