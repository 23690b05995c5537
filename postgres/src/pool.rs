use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use thiserror::Error;

/// Errors while building a connection pool.
#[derive(Error, Debug)]
pub enum PoolError {
    /// The settings are inconsistent
    #[error("Invalid pool settings: {0}")]
    InvalidSettings(String),

    /// The database could not be reached
    #[error("Failed to connect to database: {0}")]
    Connect(#[from] sqlx::Error),
}

/// Connection pool limits and timeouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    /// Upper bound of open connections
    pub max_connections: u32,
    /// Connections kept open while idle
    pub min_connections: u32,
    /// How long to wait for a connection
    pub connect_timeout: Duration,
    /// Idle time after which a connection is closed
    pub idle_timeout: Duration,
    /// Maximum lifetime of a connection
    pub max_lifetime: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
        }
    }
}

impl PoolSettings {
    /// Check that the limits are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidSettings`] when idle connections exceed the
    /// maximum, the maximum is zero, or the idle timeout outlives the
    /// connection lifetime.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_connections == 0 {
            return Err(PoolError::InvalidSettings("max_connections must be positive".into()));
        }
        if self.min_connections > self.max_connections {
            return Err(PoolError::InvalidSettings(format!(
                "min_connections ({}) cannot exceed max_connections ({})",
                self.min_connections, self.max_connections
            )));
        }
        if self.idle_timeout > self.max_lifetime {
            return Err(PoolError::InvalidSettings(format!(
                "idle_timeout ({:?}) cannot exceed max_lifetime ({:?})",
                self.idle_timeout, self.max_lifetime
            )));
        }
        Ok(())
    }
}

/// Validate `settings` and open a pool to `url`.
///
/// # Errors
///
/// Returns [`PoolError::InvalidSettings`] for inconsistent settings and
/// [`PoolError::Connect`] when the database is unreachable.
pub async fn connect(url: &str, settings: &PoolSettings) -> Result<PgPool, PoolError> {
    settings.validate()?;

    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(settings.connect_timeout)
        .idle_timeout(settings.idle_timeout)
        .max_lifetime(settings.max_lifetime)
        .connect(url)
        .await?;

    tracing::info!(
        max_connections = settings.max_connections,
        min_connections = settings.min_connections,
        "Connected to PostgreSQL"
    );
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        assert!(PoolSettings::default().validate().is_ok());
    }

    #[test]
    fn idle_connections_cannot_exceed_open() {
        let settings = PoolSettings {
            min_connections: 20,
            max_connections: 10,
            ..PoolSettings::default()
        };
        assert!(matches!(settings.validate(), Err(PoolError::InvalidSettings(_))));
    }

    #[test]
    fn idle_timeout_cannot_outlive_connection() {
        let settings = PoolSettings {
            idle_timeout: Duration::from_secs(3600),
            max_lifetime: Duration::from_secs(60),
            ..PoolSettings::default()
        };
        assert!(settings.validate().is_err());
    }
}
