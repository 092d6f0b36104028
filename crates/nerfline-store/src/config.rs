//! Store configuration, loaded from environment variables.

use std::path::PathBuf;

use nerfline_types::UpstreamPolicy;

/// Runtime configuration for the pipeline store.
///
/// Every field has a default so the store works without any environment
/// variables set.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// sqlx SQLite URL (default: `"sqlite://nerfline.db"`).
    /// `"sqlite::memory:"` gives a private in-memory database.
    pub database_url: String,

    /// Pool size. In-memory databases always use a single connection.
    pub max_connections: u32,

    /// Root directory for [`crate::FsBlobStore`].
    pub blob_root: PathBuf,

    /// Process-wide default for the `policy` argument of
    /// `create_nerf_model` / `create_nerf_object`. The store never reads it;
    /// callers pass it through.
    pub upstream_policy: UpstreamPolicy,

    /// `tracing` filter string, e.g. `"info"` or `"nerfline_store=debug,sqlx=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build [`Config`] from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            database_url: env_or(&lookup, "NERFLINE_DATABASE_URL", "sqlite://nerfline.db"),
            max_connections: parse_env(&lookup, "NERFLINE_MAX_CONNECTIONS", 5),
            blob_root: PathBuf::from(env_or(&lookup, "NERFLINE_BLOB_ROOT", "media")),
            upstream_policy: lookup("NERFLINE_UPSTREAM_POLICY")
                .and_then(|v| UpstreamPolicy::parse(&v).ok())
                .unwrap_or_default(),
            log_level: env_or(&lookup, "NERFLINE_LOG", "info"),
            log_json: lookup("NERFLINE_LOG_JSON")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }

    pub fn is_in_memory(&self) -> bool {
        is_memory_url(&self.database_url)
    }
}

pub(crate) fn is_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str, default: &str) -> String {
    lookup(key).unwrap_or_else(|| default.to_owned())
}

fn parse_env<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
