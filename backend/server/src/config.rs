use std::{env, fmt::Display, fs::read_to_string, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use ledger::RetryPolicy;
use tracing::{info, warn};

const DEFAULT_SESSION_SECRET: &str = "change-me-session-secret";
const DEFAULT_ADMIN_EMAIL: &str = "admin@college.edu";
const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub database_path: PathBuf,
    pub data_dir: PathBuf,
    pub pool_size: u32,
    pub retry: RetryPolicy,
    pub mirror_interval: Duration,
    pub cache_ttl: Duration,
    pub session_ttl: Duration,
    pub session_secret: String,
    pub admin_email: String,
    pub admin_password: String,
    pub seed_on_start: bool,
    pub login_max_failures: usize,
    pub login_lockout: Duration,
    /// Allowed browser origins; empty echoes the caller's origin.
    pub cors_origins: Vec<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Ok(Self {
            port: try_load("RUST_PORT", "5000")?,
            database_path: try_load("DATABASE_PATH", "complaints.db")?,
            data_dir: try_load("DATA_DIR", "data")?,
            pool_size: try_load("DB_POOL_SIZE", "8")?,
            retry: RetryPolicy {
                max_attempts: try_load("DB_MAX_RETRIES", "3")?,
                base_delay: Duration::from_millis(try_load("DB_RETRY_DELAY_MS", "200")?),
            },
            mirror_interval: Duration::from_secs(try_load("MIRROR_INTERVAL_SECS", "5")?),
            cache_ttl: Duration::from_secs(try_load("CACHE_TTL_SECS", "300")?),
            session_ttl: Duration::from_secs(try_load("SESSION_TTL_SECS", "3600")?),
            session_secret: read_secret("SESSION_SECRET", DEFAULT_SESSION_SECRET),
            admin_email: try_load("ADMIN_EMAIL", DEFAULT_ADMIN_EMAIL)?,
            admin_password: read_secret("ADMIN_PASSWORD", DEFAULT_ADMIN_PASSWORD),
            seed_on_start: try_load("SEED_ON_START", "false")?,
            login_max_failures: try_load("LOGIN_MAX_FAILURES", "5")?,
            login_lockout: Duration::from_secs(try_load("LOGIN_LOCKOUT_SECS", "900")?),
            cors_origins: origins(&try_load::<String>("CORS_ORIGINS", "")?),
        })
    }

    /// Settings for running against a scratch directory.
    pub fn for_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();

        Self {
            port: 0,
            database_path: dir.join("complaints.db"),
            data_dir: dir.join("data"),
            pool_size: 4,
            retry: RetryPolicy::default(),
            mirror_interval: Duration::from_secs(5),
            cache_ttl: Duration::from_secs(300),
            session_ttl: Duration::from_secs(3600),
            session_secret: DEFAULT_SESSION_SECRET.to_string(),
            admin_email: DEFAULT_ADMIN_EMAIL.to_string(),
            admin_password: DEFAULT_ADMIN_PASSWORD.to_string(),
            seed_on_start: false,
            login_max_failures: 5,
            login_lockout: Duration::from_secs(900),
            cors_origins: Vec::new(),
        }
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    let raw = var(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.parse()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("Invalid {key} value {raw:?}"))
}

fn origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

/// `/run/secrets/<name>` first, then the environment, then `default`.
fn read_secret(secret_name: &str, default: &str) -> String {
    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .ok()
        .or_else(|| var(secret_name))
        .unwrap_or_else(|| {
            warn!("{secret_name} not found in secrets or environment, using insecure default");
            default.to_string()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_parse() {
        let port: u16 = try_load("COMPLAINTS_TEST_UNSET_PORT", "5000").unwrap();
        assert_eq!(port, 5000);

        let seed: bool = try_load("COMPLAINTS_TEST_UNSET_SEED", "false").unwrap();
        assert!(!seed);
    }

    #[test]
    fn test_bad_default_is_an_error() {
        let err = try_load::<u16>("COMPLAINTS_TEST_UNSET_PORT", "not-a-port").unwrap_err();
        assert!(err.to_string().contains("COMPLAINTS_TEST_UNSET_PORT"));
    }

    #[test]
    fn test_origins_list() {
        assert!(origins("").is_empty());
        assert_eq!(
            origins("http://localhost:3000, https://desk.college.edu,"),
            vec!["http://localhost:3000", "https://desk.college.edu"]
        );
    }

    #[test]
    fn test_missing_secret_falls_back() {
        assert_eq!(read_secret("COMPLAINTS_TEST_UNSET_SECRET", "fallback"), "fallback");
    }
}
