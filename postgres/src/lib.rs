//! `PostgreSQL` support for lottery services.
//!
//! - [`PoolSettings`] / [`connect`]: validated connection pool construction
//! - [`PgTransactionSource`] / [`PgTransaction`]: the `lottery-core`
//!   transaction traits over a `sqlx` pool, with savepoints issued as SQL
//!
//! # Example
//!
//! ```ignore
//! use lottery_postgres::{PgTransactionSource, PoolSettings, connect};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = connect("postgres://localhost/lottery", &PoolSettings::default()).await?;
//!     let source = PgTransactionSource::new(pool);
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod pool;
mod transaction;

pub use pool::{PoolError, PoolSettings, connect};
pub use transaction::{PgTransaction, PgTransactionSource};
