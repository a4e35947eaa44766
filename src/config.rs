use std::env;
use std::time::Duration;

/// Upper bound for `DEFAULT_RANGE_DAYS` (about a century).
const MAX_RANGE_DAYS: u32 = 36_500;

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: String,
    /// Base URL of the text-to-SQL backend, e.g. "http://127.0.0.1:5000".
    pub backend_url: String,
    /// Comma-separated list of allowed CORS origins, or "*" for any.
    pub cors_origin: String,
    /// Upper bound for a single `/api/query` round trip.
    pub query_timeout: Duration,
    /// Upper bound for provider, config and date-range calls.
    pub backend_timeout: Duration,
    /// Sessions idle for longer than this are evicted. 0 = keep forever.
    pub session_idle_minutes: u32,
    pub session_sweep_interval: Duration,
    /// Length of the default date range, ending today.
    pub default_range_days: u32,
    /// Whether the session cookie carries the `Secure` attribute.
    pub cookie_secure: bool,
}

fn parse_bool_env(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"),
        Err(_) => default,
    }
}

fn parse_num_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let backend_url = env::var("BACKEND_URL")
            .map_err(|_| anyhow::anyhow!("BACKEND_URL is required"))?;

        Ok(Self {
            listen_addr: env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into()),
            backend_url: backend_url.trim_end_matches('/').to_string(),
            cors_origin: env::var("CORS_ORIGIN").unwrap_or_else(|_| "*".into()),
            query_timeout: Duration::from_secs(parse_num_env("QUERY_TIMEOUT_SECS", 120)),
            backend_timeout: Duration::from_secs(parse_num_env("BACKEND_TIMEOUT_SECS", 30)),
            session_idle_minutes: parse_num_env("SESSION_IDLE_MINUTES", 60),
            session_sweep_interval: Duration::from_secs(
                parse_num_env::<u64>("SESSION_SWEEP_SECS", 300).max(1),
            ),
            default_range_days: parse_num_env::<u32>("DEFAULT_RANGE_DAYS", 30).min(MAX_RANGE_DAYS),
            cookie_secure: parse_bool_env("COOKIE_SECURE", false),
        })
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Self {
        Self {
            listen_addr: "127.0.0.1:0".into(),
            backend_url: "http://backend.test".into(),
            cors_origin: "*".into(),
            query_timeout: Duration::from_secs(5),
            backend_timeout: Duration::from_secs(5),
            session_idle_minutes: 60,
            session_sweep_interval: Duration::from_secs(300),
            default_range_days: 30,
            cookie_secure: false,
        }
    }
}
