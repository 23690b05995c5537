use super::model::{DrawInfo, NewTicket, Ticket, TicketStatus, TicketWithDraw};
use crate::draw::{Draw, DrawStatus};
use crate::error::RepositoryError;
use crate::types::{DrawId, TicketId, UserId};
use chrono::{DateTime, Utc};
use lottery_core::transaction::{TransactionError, TransactionSource};
use lottery_postgres::{PgTransaction, PgTransactionSource};
use sqlx::PgPool;
use std::future::Future;

/// Storage of tickets, with read access to the draws they belong to.
pub trait TicketRepository: TransactionSource + 'static {
    /// Status and configuration of a draw.
    fn draw_info(
        &self,
        tx: &mut Self::Handle,
        draw: DrawId,
    ) -> impl Future<Output = Result<Option<DrawInfo>, RepositoryError>> + Send;

    /// Insert a PENDING ticket.
    fn insert_ticket(
        &self,
        tx: &mut Self::Handle,
        ticket: &NewTicket,
    ) -> impl Future<Output = Result<Ticket, RepositoryError>> + Send;

    /// Load one ticket.
    fn get_ticket(
        &self,
        tx: &mut Self::Handle,
        id: TicketId,
    ) -> impl Future<Output = Result<Option<Ticket>, RepositoryError>> + Send;

    /// Tickets owned by `user` with their draws, newest first.
    fn tickets_by_user(
        &self,
        tx: &mut Self::Handle,
        user: UserId,
    ) -> impl Future<Output = Result<Vec<TicketWithDraw>, RepositoryError>> + Send;

    /// Attach `user` to the ticket if it has no owner yet. `None` when the
    /// ticket is missing or already booked.
    fn book_ticket(
        &self,
        tx: &mut Self::Handle,
        id: TicketId,
        user: UserId,
    ) -> impl Future<Output = Result<Option<Ticket>, RepositoryError>> + Send;

    /// Detach the owner and reset the status to PENDING. `false` when the
    /// ticket does not exist.
    fn clear_booking(
        &self,
        tx: &mut Self::Handle,
        id: TicketId,
    ) -> impl Future<Output = Result<bool, RepositoryError>> + Send;

    /// Unbooked tickets of ACTIVE draws, ordered by id.
    fn available_tickets(
        &self,
        tx: &mut Self::Handle,
    ) -> impl Future<Output = Result<Vec<Ticket>, RepositoryError>> + Send;

    /// Set the status of every ticket in `ids`, returning the updated tickets.
    fn set_statuses(
        &self,
        tx: &mut Self::Handle,
        ids: &[TicketId],
        status: TicketStatus,
    ) -> impl Future<Output = Result<Vec<Ticket>, RepositoryError>> + Send;
}

#[derive(sqlx::FromRow)]
struct TicketRow {
    ticket_id: i64,
    user_id: Option<i64>,
    draw_id: i64,
    numbers: Vec<String>,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = RepositoryError;

    fn try_from(row: TicketRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: TicketId::new(row.ticket_id),
            user_id: row.user_id.map(UserId::new),
            draw_id: DrawId::new(row.draw_id),
            numbers: row.numbers,
            status: row.status.parse().map_err(RepositoryError::decode)?,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TicketWithDrawRow {
    #[sqlx(flatten)]
    ticket: TicketRow,
    d_id: i64,
    d_lottery_type: String,
    d_start_time: DateTime<Utc>,
    d_end_time: DateTime<Utc>,
    d_status: String,
}

impl TryFrom<TicketWithDrawRow> for TicketWithDraw {
    type Error = RepositoryError;

    fn try_from(row: TicketWithDrawRow) -> Result<Self, Self::Error> {
        Ok(Self {
            ticket: row.ticket.try_into()?,
            draw: Draw {
                id: DrawId::new(row.d_id),
                lottery_type: row.d_lottery_type.parse().map_err(RepositoryError::decode)?,
                start_time: row.d_start_time,
                end_time: row.d_end_time,
                status: row.d_status.parse().map_err(RepositoryError::decode)?,
            },
        })
    }
}

fn into_tickets(rows: Vec<TicketRow>) -> Result<Vec<Ticket>, RepositoryError> {
    rows.into_iter().map(Ticket::try_from).collect()
}

const TICKET_COLUMNS: &str = "ticket_id, user_id, draw_id, numbers, status, created_at";

/// `PostgreSQL` ticket repository over `ticket.tickets`, reading `draw.draws`.
#[derive(Debug, Clone)]
pub struct PgTicketRepository {
    source: PgTransactionSource,
}

impl PgTicketRepository {
    /// Create a repository on `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self {
            source: PgTransactionSource::new(pool),
        }
    }
}

impl TransactionSource for PgTicketRepository {
    type Handle = PgTransaction;

    async fn begin(&self) -> Result<PgTransaction, TransactionError> {
        self.source.begin().await
    }
}

impl TicketRepository for PgTicketRepository {
    async fn draw_info(&self, tx: &mut PgTransaction, draw: DrawId) -> Result<Option<DrawInfo>, RepositoryError> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT status, lottery_type FROM draw.draws WHERE id = $1")
                .bind(draw.get())
                .fetch_optional(tx.connection())
                .await?;

        row.map(|(status, lottery_type)| {
            Ok::<_, RepositoryError>(DrawInfo {
                status: status.parse::<DrawStatus>().map_err(RepositoryError::decode)?,
                lottery_type: lottery_type.parse().map_err(RepositoryError::decode)?,
            })
        })
        .transpose()
    }

    async fn insert_ticket(&self, tx: &mut PgTransaction, ticket: &NewTicket) -> Result<Ticket, RepositoryError> {
        let row = sqlx::query_as::<_, TicketRow>(&format!(
            "INSERT INTO ticket.tickets (user_id, draw_id, numbers, status, created_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {TICKET_COLUMNS}"
        ))
        .bind(ticket.user_id.map(UserId::get))
        .bind(ticket.draw_id.get())
        .bind(&ticket.numbers)
        .bind(TicketStatus::Pending.as_str())
        .bind(ticket.created_at)
        .fetch_one(tx.connection())
        .await?;
        row.try_into()
    }

    async fn get_ticket(&self, tx: &mut PgTransaction, id: TicketId) -> Result<Option<Ticket>, RepositoryError> {
        sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {TICKET_COLUMNS} FROM ticket.tickets WHERE ticket_id = $1"
        ))
        .bind(id.get())
        .fetch_optional(tx.connection())
        .await?
        .map(Ticket::try_from)
        .transpose()
    }

    async fn tickets_by_user(
        &self,
        tx: &mut PgTransaction,
        user: UserId,
    ) -> Result<Vec<TicketWithDraw>, RepositoryError> {
        let rows = sqlx::query_as::<_, TicketWithDrawRow>(
            "SELECT t.ticket_id, t.user_id, t.draw_id, t.numbers, t.status, t.created_at,
                    d.id AS d_id, d.lottery_type AS d_lottery_type, d.start_time AS d_start_time,
                    d.end_time AS d_end_time, d.status AS d_status
             FROM ticket.tickets t
             JOIN draw.draws d ON d.id = t.draw_id
             WHERE t.user_id = $1
             ORDER BY t.created_at DESC, t.ticket_id DESC",
        )
        .bind(user.get())
        .fetch_all(tx.connection())
        .await?;
        rows.into_iter().map(TicketWithDraw::try_from).collect()
    }

    async fn book_ticket(
        &self,
        tx: &mut PgTransaction,
        id: TicketId,
        user: UserId,
    ) -> Result<Option<Ticket>, RepositoryError> {
        sqlx::query_as::<_, TicketRow>(&format!(
            "UPDATE ticket.tickets SET user_id = $1
             WHERE ticket_id = $2 AND user_id IS NULL
             RETURNING {TICKET_COLUMNS}"
        ))
        .bind(user.get())
        .bind(id.get())
        .fetch_optional(tx.connection())
        .await?
        .map(Ticket::try_from)
        .transpose()
    }

    async fn clear_booking(&self, tx: &mut PgTransaction, id: TicketId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE ticket.tickets SET user_id = NULL, status = $1 WHERE ticket_id = $2")
            .bind(TicketStatus::Pending.as_str())
            .bind(id.get())
            .execute(tx.connection())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn available_tickets(&self, tx: &mut PgTransaction) -> Result<Vec<Ticket>, RepositoryError> {
        let rows = sqlx::query_as::<_, TicketRow>(
            "SELECT t.ticket_id, t.user_id, t.draw_id, t.numbers, t.status, t.created_at
             FROM ticket.tickets t
             JOIN draw.draws d ON d.id = t.draw_id
             WHERE t.user_id IS NULL AND d.status = $1
             ORDER BY t.ticket_id",
        )
        .bind(DrawStatus::Active.as_str())
        .fetch_all(tx.connection())
        .await?;
        into_tickets(rows)
    }

    async fn set_statuses(
        &self,
        tx: &mut PgTransaction,
        ids: &[TicketId],
        status: TicketStatus,
    ) -> Result<Vec<Ticket>, RepositoryError> {
        let ids: Vec<i64> = ids.iter().map(|id| id.get()).collect();
        let rows = sqlx::query_as::<_, TicketRow>(&format!(
            "WITH updated AS (
                 UPDATE ticket.tickets SET status = $1
                 WHERE ticket_id = ANY($2)
                 RETURNING {TICKET_COLUMNS}
             )
             SELECT {TICKET_COLUMNS} FROM updated ORDER BY ticket_id"
        ))
        .bind(status.as_str())
        .bind(&ids)
        .fetch_all(tx.connection())
        .await?;
        into_tickets(rows)
    }
}
