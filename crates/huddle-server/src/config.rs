//! Server configuration loaded from environment variables.
//!
//! Every setting has a default so the server starts with zero configuration
//! for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

use huddle_shared::constants::{DEFAULT_SESSION_TTL_DAYS, MAX_SESSION_TTL_DAYS};

use crate::engine::ModerationPolicy;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP API.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:2020`
    pub http_addr: SocketAddr,

    /// SQLite file. `None` uses the platform data directory.
    /// Env: `DATABASE_PATH`
    pub database_path: Option<PathBuf>,

    /// Directory for uploaded images.
    /// Env: `MEDIA_STORAGE_PATH`
    /// Default: `./media`
    pub media_storage_path: PathBuf,

    /// Prefix used when building image URLs.
    /// Env: `PUBLIC_BASE_URL`
    /// Default: `http://localhost:2020`
    pub public_base_url: String,

    /// Env: `MAX_IMAGE_SIZE` (bytes)
    /// Default: 10 MiB
    pub max_image_size: usize,

    /// Ed25519 seed for session tokens (hex-encoded, 64 chars).
    /// Env: `SESSION_SIGNING_KEY`
    /// Default: none, a random key is generated at startup.
    pub session_signing_key: Option<[u8; 32]>,

    /// Env: `SESSION_TTL_DAYS`
    /// Default: 365, accepted range `1..=36500`.
    pub session_ttl_days: i64,

    /// Bearer token for /admin/* endpoints.
    /// Env: `ADMIN_TOKEN`
    /// Default: empty (operator API disabled).
    pub admin_token: Option<String>,

    /// Env: `ENFORCE_ADMIN_SUBSET_OF_MEMBERS`, `REQUIRE_ADMIN_FOR_ROLE_CHANGES`,
    /// `DISCOVERY_COUNT_EXCLUDES_OWN` (true/false)
    pub policy: ModerationPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 2020).into(),
            database_path: None,
            media_storage_path: PathBuf::from("./media"),
            public_base_url: "http://localhost:2020".to_string(),
            max_image_size: 10 * 1024 * 1024,
            session_signing_key: None,
            session_ttl_days: DEFAULT_SESSION_TTL_DAYS,
            admin_token: None,
            policy: ModerationPolicy::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup, falling back to
    /// defaults for missing or unparsable values.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.http_addr = parsed,
                Err(_) => tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default"),
            }
        }

        if let Some(path) = lookup("DATABASE_PATH").filter(|p| !p.is_empty()) {
            config.database_path = Some(PathBuf::from(path));
        }

        if let Some(path) = lookup("MEDIA_STORAGE_PATH").filter(|p| !p.is_empty()) {
            config.media_storage_path = PathBuf::from(path);
        }

        if let Some(url) = lookup("PUBLIC_BASE_URL").filter(|u| !u.is_empty()) {
            config.public_base_url = url.trim_end_matches('/').to_string();
        }

        if let Some(val) = lookup("MAX_IMAGE_SIZE") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.max_image_size = n,
                _ => tracing::warn!(value = %val, "Invalid MAX_IMAGE_SIZE, using default"),
            }
        }

        if let Some(hex_key) = lookup("SESSION_SIGNING_KEY") {
            match parse_hex_key(&hex_key) {
                Ok(key) => config.session_signing_key = Some(key),
                Err(e) => tracing::warn!(error = %e, "Invalid SESSION_SIGNING_KEY, ignoring"),
            }
        }

        if let Some(val) = lookup("SESSION_TTL_DAYS") {
            match val.parse::<i64>() {
                Ok(days) if (1..=MAX_SESSION_TTL_DAYS).contains(&days) => {
                    config.session_ttl_days = days
                }
                _ => tracing::warn!(value = %val, "Invalid SESSION_TTL_DAYS, using default"),
            }
        }

        if let Some(token) = lookup("ADMIN_TOKEN").filter(|t| !t.is_empty()) {
            config.admin_token = Some(token);
        }

        let flag = |key: &str| lookup(key).map(|v| v == "true" || v == "1").unwrap_or(false);
        config.policy = ModerationPolicy {
            enforce_admin_subset_of_members: flag("ENFORCE_ADMIN_SUBSET_OF_MEMBERS"),
            require_admin_for_role_changes: flag("REQUIRE_ADMIN_FOR_ROLE_CHANGES"),
            discovery_count_excludes_own: flag("DISCOVERY_COUNT_EXCLUDES_OWN"),
        };

        config
    }
}

fn parse_hex_key(value: &str) -> Result<[u8; 32], String> {
    let bytes = hex::decode(value.trim()).map_err(|e| e.to_string())?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| format!("expected 32 bytes, got {}", b.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> ServerConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = config_from(&[]);
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 2020).into());
        assert_eq!(config.session_ttl_days, 365);
        assert!(config.admin_token.is_none());
        assert_eq!(config.policy, ModerationPolicy::default());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("HTTP_ADDR", "127.0.0.1:9000"),
            ("PUBLIC_BASE_URL", "https://cdn.example.org/"),
            ("ADMIN_TOKEN", "s3cret"),
            ("REQUIRE_ADMIN_FOR_ROLE_CHANGES", "true"),
            ("SESSION_SIGNING_KEY", &"ab".repeat(32)),
        ]);
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 9000).into());
        assert_eq!(config.public_base_url, "https://cdn.example.org");
        assert_eq!(config.admin_token.as_deref(), Some("s3cret"));
        assert!(config.policy.require_admin_for_role_changes);
        assert!(!config.policy.enforce_admin_subset_of_members);
        assert_eq!(config.session_signing_key, Some([0xab; 32]));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[
            ("HTTP_ADDR", "nope"),
            ("MAX_IMAGE_SIZE", "-1"),
            ("SESSION_SIGNING_KEY", "abcd"),
        ]);
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 2020).into());
        assert_eq!(config.max_image_size, 10 * 1024 * 1024);
        assert!(config.session_signing_key.is_none());
    }

    #[test]
    fn test_session_ttl_bounds() {
        assert_eq!(config_from(&[("SESSION_TTL_DAYS", "30")]).session_ttl_days, 30);
        assert_eq!(
            config_from(&[("SESSION_TTL_DAYS", "36500")]).session_ttl_days,
            MAX_SESSION_TTL_DAYS
        );
        for oversized in ["36501", "100000000", "9223372036854775807", "0", "-5"] {
            let config = config_from(&[("SESSION_TTL_DAYS", oversized)]);
            assert_eq!(config.session_ttl_days, DEFAULT_SESSION_TTL_DAYS, "{oversized}");
        }
    }
}
