use lottery_core::transaction::{
    SavepointOperation, TransactionError, TransactionHandle, TransactionSource,
};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};

/// Opens transactions on a shared pool.
#[derive(Debug, Clone)]
pub struct PgTransactionSource {
    pool: PgPool,
}

impl PgTransactionSource {
    /// Wrap a pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl TransactionSource for PgTransactionSource {
    type Handle = PgTransaction;

    async fn begin(&self) -> Result<PgTransaction, TransactionError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| TransactionError::Begin(e.to_string()))?;
        Ok(PgTransaction { tx })
    }
}

/// An open `PostgreSQL` transaction. Dropping it without commit rolls back.
#[derive(Debug)]
pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

impl PgTransaction {
    /// Connection to run queries inside this transaction.
    pub fn connection(&mut self) -> &mut PgConnection {
        &mut self.tx
    }

    async fn savepoint(&mut self, sql: &str, name: &str, operation: SavepointOperation) -> Result<(), TransactionError> {
        let name = checked_name(name, operation)?;
        let statement = format!("{sql} {name}");
        sqlx::query(&statement)
            .execute(&mut *self.tx)
            .await
            .map(|_| ())
            .map_err(|e| TransactionError::Savepoint {
                name: name.to_string(),
                operation,
                reason: e.to_string(),
            })
    }
}

/// Savepoint names are interpolated into SQL, so only plain identifiers pass.
fn checked_name(name: &str, operation: SavepointOperation) -> Result<&str, TransactionError> {
    let valid = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(name)
    } else {
        Err(TransactionError::Savepoint {
            name: name.to_string(),
            operation,
            reason: "invalid savepoint identifier".to_string(),
        })
    }
}

impl TransactionHandle for PgTransaction {
    async fn create_savepoint(&mut self, name: &str) -> Result<(), TransactionError> {
        self.savepoint("SAVEPOINT", name, SavepointOperation::Create).await
    }

    async fn release_savepoint(&mut self, name: &str) -> Result<(), TransactionError> {
        self.savepoint("RELEASE SAVEPOINT", name, SavepointOperation::Release).await
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> Result<(), TransactionError> {
        self.savepoint("ROLLBACK TO SAVEPOINT", name, SavepointOperation::RollbackTo)
            .await
    }

    async fn commit(self) -> Result<(), TransactionError> {
        self.tx
            .commit()
            .await
            .map_err(|e| TransactionError::Commit(e.to_string()))
    }

    async fn rollback(self) -> Result<(), TransactionError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| TransactionError::Rollback(e.to_string()))
    }
}
