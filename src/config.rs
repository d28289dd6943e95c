//! Configuration loaded from the environment.
//!
//! Call `dotenvy::dotenv()` before [`AppConfig::from_env`] to pick up a
//! local `.env` file.

use std::time::Duration;

use crate::error::{AskError, Result};

/// Default Gemini API host.
pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com";

/// Default Gemini model.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash-lite";

/// Default search proxy. Also serves the AI chat endpoint.
pub const DEFAULT_SEARCH_URL: &str = "https://backend.carlo587-jcl.workers.dev";

/// Default query suggestion service.
pub const DEFAULT_SUGGEST_URL: &str = "https://auto-suggest-queries.p.rapidapi.com";

/// Host header sent to the suggestion service unless overridden.
pub const DEFAULT_SUGGEST_HOST: &str = "auto-suggest-queries.p.rapidapi.com";

/// Base variable name for API keys; `_1` through `_9` suffixes are also read.
const KEY_VAR: &str = "GEMINI_API_KEY";

/// Highest numbered key suffix.
const MAX_KEY_SUFFIX: usize = 9;

/// Upper bound accepted for `rpm_limit`.
pub const MAX_RPM_LIMIT: u32 = 1_000_000;

/// Upper bound accepted for `window` and `cooldown`.
pub const MAX_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// Limits applied to each API key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationConfig {
    /// Requests allowed per key within one window.
    pub rpm_limit: u32,
    /// Length of the request counting window.
    pub window: Duration,
    /// Penalty applied after a rate-limited response.
    pub cooldown: Duration,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            rpm_limit: 30,
            window: Duration::from_secs(60),
            cooldown: Duration::from_secs(60),
        }
    }
}

impl RotationConfig {
    /// Checks that `rpm_limit` and `window` are non-zero and that no value
    /// exceeds [`MAX_RPM_LIMIT`] or [`MAX_PERIOD`].
    pub fn validate(&self) -> Result<()> {
        if self.rpm_limit == 0 {
            return Err(AskError::Config(
                "rpm_limit must be greater than 0".into(),
            ));
        }
        if self.rpm_limit > MAX_RPM_LIMIT {
            return Err(AskError::Config(format!(
                "rpm_limit must be at most {MAX_RPM_LIMIT}"
            )));
        }
        if self.window.is_zero() {
            return Err(AskError::Config("window must be greater than 0".into()));
        }
        if self.window > MAX_PERIOD {
            return Err(AskError::Config(format!(
                "window must be at most {}s",
                MAX_PERIOD.as_secs()
            )));
        }
        if self.cooldown > MAX_PERIOD {
            return Err(AskError::Config(format!(
                "cooldown must be at most {}s",
                MAX_PERIOD.as_secs()
            )));
        }
        Ok(())
    }

    /// Request count at which a key is reported as near its limit (80%).
    pub fn near_limit_threshold(&self) -> u32 {
        // ceil(0.8 * limit) without floats; never above the limit itself
        let threshold = (u64::from(self.rpm_limit) * 4).div_ceil(5);
        u32::try_from(threshold).unwrap_or(self.rpm_limit)
    }
}

/// Everything the binary needs to talk to the outside world.
#[derive(Clone)]
pub struct AppConfig {
    pub api_keys: Vec<String>,
    pub search_url: String,
    /// Base URL of the `/ai-chat` backend; defaults to `search_url`.
    pub chat_url: String,
    pub gemini_url: String,
    pub gemini_model: String,
    pub rotation: RotationConfig,
    pub suggest_url: String,
    pub suggest_host: String,
    /// RapidAPI key; suggestions are unavailable without one.
    pub suggest_key: Option<String>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_keys", &format_args!("<{} redacted>", self.api_keys.len()))
            .field("search_url", &self.search_url)
            .field("chat_url", &self.chat_url)
            .field("gemini_url", &self.gemini_url)
            .field("gemini_model", &self.gemini_model)
            .field("rotation", &self.rotation)
            .field("suggest_url", &self.suggest_url)
            .field("suggest_host", &self.suggest_host)
            .field("suggest_key", &self.suggest_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl AppConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = RotationConfig::default();
        let rotation = RotationConfig {
            rpm_limit: parse_var(&lookup, "ASKWEB_RPM_LIMIT")?.unwrap_or(defaults.rpm_limit),
            window: parse_var(&lookup, "ASKWEB_WINDOW_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.window),
            cooldown: parse_var(&lookup, "ASKWEB_COOLDOWN_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.cooldown),
        };
        rotation.validate()?;

        let search_url = non_empty(&lookup, "ASKWEB_SEARCH_URL")
            .unwrap_or_else(|| DEFAULT_SEARCH_URL.to_string());

        Ok(Self {
            api_keys: collect_api_keys(&lookup),
            chat_url: non_empty(&lookup, "ASKWEB_CHAT_URL").unwrap_or_else(|| search_url.clone()),
            search_url,
            gemini_url: non_empty(&lookup, "ASKWEB_GEMINI_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_URL.to_string()),
            gemini_model: non_empty(&lookup, "ASKWEB_GEMINI_MODEL")
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            rotation,
            suggest_url: non_empty(&lookup, "ASKWEB_SUGGEST_URL")
                .unwrap_or_else(|| DEFAULT_SUGGEST_URL.to_string()),
            suggest_host: non_empty(&lookup, "RAPIDAPI_HOST")
                .unwrap_or_else(|| DEFAULT_SUGGEST_HOST.to_string()),
            suggest_key: non_empty(&lookup, "RAPIDAPI_KEY"),
        })
    }
}

/// Collect `GEMINI_API_KEY`, `GEMINI_API_KEY_1` .. `GEMINI_API_KEY_9` in order.
fn collect_api_keys<F>(lookup: &F) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    std::iter::once(KEY_VAR.to_string())
        .chain((1..=MAX_KEY_SUFFIX).map(|i| format!("{KEY_VAR}_{i}")))
        .filter_map(|name| non_empty(lookup, &name))
        .collect()
}

fn non_empty<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<F, T>(lookup: &F, name: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match non_empty(lookup, name) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| AskError::Config(format!("{name} is not a valid number: {raw}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn default_rotation_values() {
        let config = RotationConfig::default();
        assert_eq!(config.rpm_limit, 30);
        assert_eq!(config.window, Duration::from_secs(60));
        assert_eq!(config.cooldown, Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_rpm_limit_rejected() {
        let config = RotationConfig {
            rpm_limit: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("rpm_limit"));
    }

    #[test]
    fn zero_window_rejected() {
        let config = RotationConfig {
            window: Duration::ZERO,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("window"));
    }

    #[test]
    fn zero_cooldown_allowed() {
        let config = RotationConfig {
            cooldown: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn oversized_values_rejected() {
        let config = RotationConfig {
            rpm_limit: MAX_RPM_LIMIT + 1,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("rpm_limit"));

        let config = RotationConfig {
            window: MAX_PERIOD + Duration::from_secs(1),
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("window"));

        let config = RotationConfig {
            cooldown: MAX_PERIOD + Duration::from_secs(1),
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("cooldown"));

        let config = RotationConfig {
            rpm_limit: MAX_RPM_LIMIT,
            window: MAX_PERIOD,
            cooldown: MAX_PERIOD,
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn huge_env_values_rejected() {
        let err = AppConfig::from_lookup(lookup_from(&[(
            "ASKWEB_COOLDOWN_SECS",
            "18446744073709551615",
        )]))
        .unwrap_err();
        assert!(err.to_string().contains("cooldown"));

        let err = AppConfig::from_lookup(lookup_from(&[("ASKWEB_RPM_LIMIT", "2000000000")]))
            .unwrap_err();
        assert!(err.to_string().contains("rpm_limit"));
    }

    #[test]
    fn threshold_does_not_overflow() {
        let config = RotationConfig {
            rpm_limit: u32::MAX,
            ..Default::default()
        };
        assert_eq!(config.near_limit_threshold(), 3_435_973_836);
    }

    #[test]
    fn near_limit_threshold_rounds_up() {
        let mut config = RotationConfig::default();
        assert_eq!(config.near_limit_threshold(), 24);
        config.rpm_limit = 2;
        assert_eq!(config.near_limit_threshold(), 2);
        config.rpm_limit = 1;
        assert_eq!(config.near_limit_threshold(), 1);
    }

    #[test]
    fn keys_collected_in_order_skipping_blanks() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("GEMINI_API_KEY_3", "third"),
            ("GEMINI_API_KEY", " base "),
            ("GEMINI_API_KEY_1", "   "),
            ("GEMINI_API_KEY_2", "second"),
        ]))
        .unwrap();
        assert_eq!(config.api_keys, vec!["base", "second", "third"]);
    }

    #[test]
    fn defaults_when_env_empty() {
        let config = AppConfig::from_lookup(lookup_from(&[])).unwrap();
        assert!(config.api_keys.is_empty());
        assert_eq!(config.search_url, DEFAULT_SEARCH_URL);
        assert_eq!(config.chat_url, DEFAULT_SEARCH_URL);
        assert_eq!(config.suggest_url, DEFAULT_SUGGEST_URL);
        assert_eq!(config.suggest_host, DEFAULT_SUGGEST_HOST);
        assert_eq!(config.suggest_key, None);
        assert_eq!(config.gemini_url, DEFAULT_GEMINI_URL);
        assert_eq!(config.gemini_model, DEFAULT_GEMINI_MODEL);
        assert_eq!(config.rotation, RotationConfig::default());
    }

    #[test]
    fn rotation_overrides_parsed() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("ASKWEB_RPM_LIMIT", "5"),
            ("ASKWEB_WINDOW_SECS", "10"),
            ("ASKWEB_COOLDOWN_SECS", "0"),
        ]))
        .unwrap();
        assert_eq!(config.rotation.rpm_limit, 5);
        assert_eq!(config.rotation.window, Duration::from_secs(10));
        assert_eq!(config.rotation.cooldown, Duration::ZERO);
    }

    #[test]
    fn bad_number_rejected() {
        let err = AppConfig::from_lookup(lookup_from(&[("ASKWEB_RPM_LIMIT", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("ASKWEB_RPM_LIMIT"));
    }

    #[test]
    fn chat_url_follows_search_url_unless_set() {
        let config =
            AppConfig::from_lookup(lookup_from(&[("ASKWEB_SEARCH_URL", "http://proxy.local")]))
                .unwrap();
        assert_eq!(config.chat_url, "http://proxy.local");

        let config = AppConfig::from_lookup(lookup_from(&[
            ("ASKWEB_SEARCH_URL", "http://proxy.local"),
            ("ASKWEB_CHAT_URL", "http://chat.local"),
        ]))
        .unwrap();
        assert_eq!(config.search_url, "http://proxy.local");
        assert_eq!(config.chat_url, "http://chat.local");
    }

    #[test]
    fn debug_redacts_keys() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("GEMINI_API_KEY", "secret-value"),
            ("RAPIDAPI_KEY", "rapid-secret"),
        ]))
        .unwrap();
        assert_eq!(config.suggest_key.as_deref(), Some("rapid-secret"));
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret-value"));
        assert!(!debug.contains("rapid-secret"));
        assert!(debug.contains("1 redacted"));
    }
}
