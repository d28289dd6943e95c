//! Maps failed API responses onto rotation decisions.
//!
//! Only [`FailureKind::RateLimited`] causes a key rotation; everything else
//! is passed back to the caller untouched.

/// How a failed attempt should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// HTTP 429 or a quota/rate-limit message. Rotate to another key.
    RateLimited,
    /// The key itself was rejected. Do not rotate; this is a configuration problem.
    InvalidCredential,
    /// Anything else.
    Other,
}

/// Message substrings recognised by [`FailureMarkers::classify`].
///
/// Matching is case-insensitive.
#[derive(Debug, Clone)]
pub struct FailureMarkers {
    pub rate_limit: Vec<String>,
    pub invalid_credential: Vec<String>,
}

impl Default for FailureMarkers {
    fn default() -> Self {
        Self {
            rate_limit: [
                "RESOURCE_EXHAUSTED",
                "quota",
                "rate limit",
                "rate-limit",
                "too many requests",
            ]
            .map(String::from)
            .to_vec(),
            invalid_credential: ["API key not valid", "API_KEY_INVALID", "PERMISSION_DENIED"]
                .map(String::from)
                .to_vec(),
        }
    }
}

impl FailureMarkers {
    /// Add an extra rate-limit marker.
    pub fn with_rate_limit_marker(mut self, marker: impl Into<String>) -> Self {
        self.rate_limit.push(marker.into());
        self
    }

    /// Add an extra invalid-key marker.
    pub fn with_invalid_credential_marker(mut self, marker: impl Into<String>) -> Self {
        self.invalid_credential.push(marker.into());
        self
    }

    /// Classify a failure from its HTTP status (if any) and error message.
    ///
    /// Rate-limit evidence wins over everything else, so a 403 carrying a
    /// quota message still rotates.
    pub fn classify(&self, status: Option<u16>, message: &str) -> FailureKind {
        let lowered = message.to_lowercase();
        let contains_any = |markers: &[String]| {
            markers
                .iter()
                .any(|m| !m.is_empty() && lowered.contains(&m.to_lowercase()))
        };

        if status == Some(429) || contains_any(&self.rate_limit) {
            FailureKind::RateLimited
        } else if matches!(status, Some(401 | 403)) || contains_any(&self.invalid_credential) {
            FailureKind::InvalidCredential
        } else {
            FailureKind::Other
        }
    }
}
