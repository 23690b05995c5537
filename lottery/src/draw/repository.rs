use super::model::{Draw, DrawResult, DrawStatus, NewDraw};
use crate::error::RepositoryError;
use crate::types::{DrawId, LotteryConfig};
use chrono::{DateTime, Utc};
use lottery_core::transaction::{TransactionError, TransactionSource};
use lottery_postgres::{PgTransaction, PgTransactionSource};
use sqlx::PgPool;
use std::future::Future;

/// Storage of draws.
///
/// Every method runs inside the transaction it is handed. The transition
/// queries are set-based: they select and update in one statement and return
/// the updated rows ordered by id.
pub trait DrawRepository: TransactionSource + 'static {
    /// Insert a PLANNED draw.
    fn create_draw(
        &self,
        tx: &mut Self::Handle,
        draw: &NewDraw,
    ) -> impl Future<Output = Result<Draw, RepositoryError>> + Send;

    /// Load one draw.
    fn get_draw(
        &self,
        tx: &mut Self::Handle,
        id: DrawId,
    ) -> impl Future<Output = Result<Option<Draw>, RepositoryError>> + Send;

    /// Draws in `status`, ordered by id.
    fn draws_by_status(
        &self,
        tx: &mut Self::Handle,
        status: DrawStatus,
    ) -> impl Future<Output = Result<Vec<Draw>, RepositoryError>> + Send;

    /// Move every PLANNED draw with `start_time <= now` to ACTIVE.
    fn activate_draws(
        &self,
        tx: &mut Self::Handle,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<Draw>, RepositoryError>> + Send;

    /// Move every ACTIVE draw with `end_time <= now` to COMPLETED.
    fn complete_draws(
        &self,
        tx: &mut Self::Handle,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<Draw>, RepositoryError>> + Send;

    /// Move a PLANNED or ACTIVE draw to CANCELLED. `None` when the draw is
    /// missing or already terminal.
    fn cancel_draw(
        &self,
        tx: &mut Self::Handle,
        id: DrawId,
    ) -> impl Future<Output = Result<Option<Draw>, RepositoryError>> + Send;

    /// Winning numbers of a draw, if they have been recorded.
    fn get_draw_result(
        &self,
        tx: &mut Self::Handle,
        draw: DrawId,
    ) -> impl Future<Output = Result<Option<DrawResult>, RepositoryError>> + Send;
}

#[derive(sqlx::FromRow)]
struct DrawRow {
    id: i64,
    lottery_type: String,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    status: String,
}

impl TryFrom<DrawRow> for Draw {
    type Error = RepositoryError;

    fn try_from(row: DrawRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: DrawId::new(row.id),
            lottery_type: row.lottery_type.parse::<LotteryConfig>().map_err(RepositoryError::decode)?,
            start_time: row.start_time,
            end_time: row.end_time,
            status: row.status.parse().map_err(RepositoryError::decode)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct DrawResultRow {
    id: i64,
    draw_id: i64,
    winning_combination: Vec<String>,
    result_time: DateTime<Utc>,
}

impl From<DrawResultRow> for DrawResult {
    fn from(row: DrawResultRow) -> Self {
        Self {
            id: row.id,
            draw_id: DrawId::new(row.draw_id),
            winning_combination: row.winning_combination,
            result_time: row.result_time,
        }
    }
}

fn into_draws(rows: Vec<DrawRow>) -> Result<Vec<Draw>, RepositoryError> {
    rows.into_iter().map(Draw::try_from).collect()
}

const DRAW_COLUMNS: &str = "id, lottery_type, start_time, end_time, status";

/// `PostgreSQL` draw repository over `draw.draws`.
#[derive(Debug, Clone)]
pub struct PgDrawRepository {
    source: PgTransactionSource,
}

impl PgDrawRepository {
    /// Create a repository on `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self {
            source: PgTransactionSource::new(pool),
        }
    }

    async fn transition(
        tx: &mut PgTransaction,
        from: DrawStatus,
        to: DrawStatus,
        time_column: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Draw>, RepositoryError> {
        // RETURNING carries no ORDER BY, so order through a CTE.
        let sql = format!(
            "WITH moved AS (
                 UPDATE draw.draws SET status = $1
                 WHERE status = $2 AND {time_column} <= $3
                 RETURNING {DRAW_COLUMNS}
             )
             SELECT {DRAW_COLUMNS} FROM moved ORDER BY id"
        );
        let rows = sqlx::query_as::<_, DrawRow>(&sql)
            .bind(to.as_str())
            .bind(from.as_str())
            .bind(now)
            .fetch_all(tx.connection())
            .await?;
        into_draws(rows)
    }
}

impl TransactionSource for PgDrawRepository {
    type Handle = PgTransaction;

    async fn begin(&self) -> Result<PgTransaction, TransactionError> {
        self.source.begin().await
    }
}

impl DrawRepository for PgDrawRepository {
    async fn create_draw(&self, tx: &mut PgTransaction, draw: &NewDraw) -> Result<Draw, RepositoryError> {
        let row = sqlx::query_as::<_, DrawRow>(&format!(
            "INSERT INTO draw.draws (lottery_type, start_time, end_time, status)
             VALUES ($1, $2, $3, $4)
             RETURNING {DRAW_COLUMNS}"
        ))
        .bind(draw.lottery_type.to_string())
        .bind(draw.start_time)
        .bind(draw.end_time)
        .bind(DrawStatus::Planned.as_str())
        .fetch_one(tx.connection())
        .await?;
        row.try_into()
    }

    async fn get_draw(&self, tx: &mut PgTransaction, id: DrawId) -> Result<Option<Draw>, RepositoryError> {
        sqlx::query_as::<_, DrawRow>(&format!("SELECT {DRAW_COLUMNS} FROM draw.draws WHERE id = $1"))
            .bind(id.get())
            .fetch_optional(tx.connection())
            .await?
            .map(Draw::try_from)
            .transpose()
    }

    async fn draws_by_status(&self, tx: &mut PgTransaction, status: DrawStatus) -> Result<Vec<Draw>, RepositoryError> {
        let rows = sqlx::query_as::<_, DrawRow>(&format!(
            "SELECT {DRAW_COLUMNS} FROM draw.draws WHERE status = $1 ORDER BY id"
        ))
        .bind(status.as_str())
        .fetch_all(tx.connection())
        .await?;
        into_draws(rows)
    }

    async fn activate_draws(&self, tx: &mut PgTransaction, now: DateTime<Utc>) -> Result<Vec<Draw>, RepositoryError> {
        Self::transition(tx, DrawStatus::Planned, DrawStatus::Active, "start_time", now).await
    }

    async fn complete_draws(&self, tx: &mut PgTransaction, now: DateTime<Utc>) -> Result<Vec<Draw>, RepositoryError> {
        Self::transition(tx, DrawStatus::Active, DrawStatus::Completed, "end_time", now).await
    }

    async fn cancel_draw(&self, tx: &mut PgTransaction, id: DrawId) -> Result<Option<Draw>, RepositoryError> {
        sqlx::query_as::<_, DrawRow>(&format!(
            "UPDATE draw.draws SET status = $1
             WHERE id = $2 AND status IN ($3, $4)
             RETURNING {DRAW_COLUMNS}"
        ))
        .bind(DrawStatus::Cancelled.as_str())
        .bind(id.get())
        .bind(DrawStatus::Planned.as_str())
        .bind(DrawStatus::Active.as_str())
        .fetch_optional(tx.connection())
        .await?
        .map(Draw::try_from)
        .transpose()
    }

    async fn get_draw_result(&self, tx: &mut PgTransaction, draw: DrawId) -> Result<Option<DrawResult>, RepositoryError> {
        let row = sqlx::query_as::<_, DrawResultRow>(
            "SELECT id, draw_id, winning_combination, result_time FROM draw.draw_results WHERE draw_id = $1",
        )
        .bind(draw.get())
        .fetch_optional(tx.connection())
        .await?;
        Ok(row.map(DrawResult::from))
    }
}
