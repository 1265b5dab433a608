use crate::config::AppConfig;
use crate::errors::ServiceError;
use metrics::{counter, gauge};
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Configuration for database connection
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Database connection URL
    pub url: String,
    /// Maximum number of connections
    pub max_connections: u32,
    /// Minimum number of connections
    pub min_connections: u32,
    /// Connection timeout duration
    pub connect_timeout: Duration,
    /// Idle timeout duration
    pub idle_timeout: Duration,
    /// Acquire connection timeout
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

/// Establishes a connection pool to the database with custom configuration
///
/// # Errors
/// Returns a `ServiceError::DatabaseError` if the connection cannot be established
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, ServiceError> {
    debug!("Configuring database connection with: {:?}", config);

    let mut opt = ConnectOptions::new(config.url.clone());

    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(true);

    gauge!("larder_db.max_connections", config.max_connections as f64);

    info!(
        "Connecting to database with max_connections={}",
        config.max_connections
    );

    let db_pool = Database::connect(opt)
        .await
        .map_err(ServiceError::DatabaseError)?;

    info!("Database connection pool established successfully");

    Ok(db_pool)
}

impl From<&AppConfig> for DbConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database_url.clone(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections,
            connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
            idle_timeout: Duration::from_secs(cfg.db_idle_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
        }
    }
}

/// Establish DB pool using AppConfig tuning
pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, ServiceError> {
    let db_cfg: DbConfig = cfg.into();
    establish_connection_with_config(&db_cfg).await
}

/// Runs the embedded migrations
pub async fn run_migrations(pool: &DbPool) -> Result<(), ServiceError> {
    info!("Running database migrations");
    let start = std::time::Instant::now();

    let result = crate::migrator::Migrator::up(pool, None)
        .await
        .map_err(ServiceError::DatabaseError);

    let elapsed = start.elapsed();
    match &result {
        Ok(_) => info!(
            "Database migrations completed successfully in {:?}",
            elapsed
        ),
        Err(e) => error!("Database migrations failed after {:?}: {}", elapsed, e),
    }

    result
}

/// Checks if the database connection is active
pub async fn check_connection(pool: &DbPool) -> Result<(), ServiceError> {
    debug!("Checking database connection");
    let start = std::time::Instant::now();

    let result = pool.ping().await.map_err(ServiceError::DatabaseError);

    let elapsed = start.elapsed();
    match &result {
        Ok(_) => {
            debug!("Database connection check successful in {:?}", elapsed);
            gauge!("larder_db.connection_latency", elapsed.as_millis() as f64);
        }
        Err(e) => {
            error!(
                "Database connection check failed after {:?}: {}",
                elapsed, e
            );
            counter!("larder_db.connection_failures", 1);
        }
    }

    result
}

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Pause before the next attempt
    pub delay: Duration,
}

impl RetryConfig {
    /// One retry after a short pause.
    pub fn once() -> Self {
        Self {
            max_attempts: 2,
            delay: Duration::from_millis(50),
        }
    }
}

/// Retry policy for determining if an error is retryable
pub trait RetryPolicy<E> {
    fn is_retryable(&self, error: &E) -> bool;
}

/// Retries lost connections, pool timeouts, lock contention and serialization failures.
/// Domain errors are never retried.
pub struct TransientDbPolicy;

impl RetryPolicy<ServiceError> for TransientDbPolicy {
    fn is_retryable(&self, error: &ServiceError) -> bool {
        match error {
            ServiceError::DatabaseError(db_err) => is_transient(db_err),
            _ => false,
        }
    }
}

/// Classifies a database error as transient.
pub fn is_transient(error: &DbErr) -> bool {
    match error {
        DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => true,
        DbErr::Exec(_) | DbErr::Query(_) => {
            let message = error.to_string().to_ascii_lowercase();
            // SQLITE_BUSY / SQLITE_LOCKED, Postgres serialization_failure and deadlock_detected
            message.contains("database is locked")
                || message.contains("database table is locked")
                || message.contains("40001")
                || message.contains("40p01")
                || message.contains("could not serialize access")
                || message.contains("deadlock detected")
        }
        _ => false,
    }
}

/// Execute an async operation, retrying according to `policy`
pub async fn with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    policy: impl RetryPolicy<E>,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempts = 0;

    loop {
        attempts += 1;

        match operation().await {
            Ok(result) => {
                if attempts > 1 {
                    debug!(
                        operation = operation_name,
                        "Operation succeeded after {} attempts", attempts
                    );
                }
                return Ok(result);
            }
            Err(error) => {
                if attempts >= config.max_attempts || !policy.is_retryable(&error) {
                    return Err(error);
                }

                warn!(
                    operation = operation_name,
                    "Attempt {} failed: {}. Retrying in {:?}...", attempts, error, config.delay
                );
                counter!("larder_db.retries", 1, "operation" => operation_name.to_string());

                sleep(config.delay).await;
            }
        }
    }
}

/// Runs `operation`, retrying at most once when it fails with a transient database error.
pub async fn retry_transient<F, Fut, T>(operation_name: &str, operation: F) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    with_retry(
        &RetryConfig::once(),
        TransientDbPolicy,
        operation_name,
        operation,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::RuntimeErr;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn locked() -> ServiceError {
        ServiceError::DatabaseError(DbErr::Exec(RuntimeErr::Internal(
            "error returned from database: (code: 5) database is locked".to_string(),
        )))
    }

    #[test]
    fn classifies_transient_errors() {
        assert!(is_transient(&DbErr::Conn(RuntimeErr::Internal(
            "connection reset".into()
        ))));
        assert!(TransientDbPolicy.is_retryable(&locked()));
        assert!(!is_transient(&DbErr::RecordNotFound("x".into())));
        assert!(!TransientDbPolicy.is_retryable(&ServiceError::InsufficientInventory {
            available: 1,
            requested: 2
        }));
    }

    #[tokio::test]
    async fn transient_failure_is_retried_exactly_once() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), ServiceError> = retry_transient("test.always_locked", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(locked())
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retry_succeeds_on_second_attempt() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = retry_transient("test.flaky", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(locked())
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn domain_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), ServiceError> = retry_transient("test.domain", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ServiceError::InvalidQuantity("zero".into()))
        })
        .await;

        assert!(matches!(result, Err(ServiceError::InvalidQuantity(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
