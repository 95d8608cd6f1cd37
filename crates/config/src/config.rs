use core::str::FromStr;

use anyhow::Context;

/// Default number of pooled database connections.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Default number of training jobs executing at once.
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 4;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Size of the database connection pool
    pub max_connections: u32,

    /// Upper bound on concurrently executing training jobs
    pub max_concurrent_jobs: usize,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// Required environment variables:
    /// - `DATABASE_URL`: `PostgreSQL` connection string
    ///
    /// Optional environment variables:
    /// - `PACKAGEML_MAX_CONNECTIONS`: connection pool size (default: 5)
    /// - `PACKAGEML_MAX_CONCURRENT_JOBS`: worker limit for training jobs (default: 4)
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or a
    /// numeric variable does not parse.
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file
        dotenvy::dotenv().ok();

        let database_url =
            std::env::var("DATABASE_URL").context("DATABASE_URL environment variable not set")?;

        let max_connections = env_or("PACKAGEML_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?;
        let max_concurrent_jobs =
            env_or("PACKAGEML_MAX_CONCURRENT_JOBS", DEFAULT_MAX_CONCURRENT_JOBS)?;

        if max_concurrent_jobs == 0 {
            anyhow::bail!("PACKAGEML_MAX_CONCURRENT_JOBS must be at least 1");
        }

        Ok(Self {
            database_url,
            max_connections,
            max_concurrent_jobs,
        })
    }
}

/// Reads and parses an optional variable, falling back to `default` when unset.
fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} is not a valid value: {raw}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_or_uses_default_when_unset() {
        let value: usize = env_or("PACKAGEML_TEST_SURELY_UNSET_VARIABLE", 7).expect("default");
        assert_eq!(value, 7);
    }
}
