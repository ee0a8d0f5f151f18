use crate::error::{MakeQuerySnafu, RosterError, RosterResult};
use snafu::ResultExt;
use sqlx::{FromRow, PgConnection, Pool, Postgres};
use std::fmt::{Display, Formatter};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Requests only ever move out of `Pending`, and only once.
    pub const fn can_become(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Approved | Self::Rejected)
        )
    }
}

impl Display for RequestStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for RequestStatus {
    type Error = RosterError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(RosterError::InvalidRequestStatus { found: value }),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct AssignmentRequest {
    pub id: Uuid,
    pub student_id: Uuid,
    pub student_name: String,
    pub requested_count: i32,
    pub event_tag: String,
    #[sqlx(try_from = "String")]
    pub status: RequestStatus,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, FromRow)]
pub struct UnassignmentRequest {
    pub id: Uuid,
    pub assignment_id: Option<Uuid>,
    pub beneficiary_id: String,
    pub student_id: Uuid,
    pub student_name: String,
    pub reason: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: RequestStatus,
    pub created_at: OffsetDateTime,
}

const ASSIGNMENT_REQUEST_QUERY: &str = "SELECT r.id, r.student_id, s.name AS student_name, r.requested_count, r.event_tag, r.status, r.created_at FROM public.assignment_requests r JOIN public.students s ON s.id = r.student_id";
const UNASSIGNMENT_REQUEST_QUERY: &str = "SELECT r.id, r.assignment_id, r.beneficiary_id, r.student_id, s.name AS student_name, r.reason, r.status, r.created_at FROM public.unassignment_requests r JOIN public.students s ON s.id = r.student_id";

impl AssignmentRequest {
    pub async fn get_by_id(id: Uuid, conn: &mut PgConnection) -> RosterResult<Option<Self>> {
        sqlx::query_as(&format!("{ASSIGNMENT_REQUEST_QUERY} WHERE r.id = $1"))
            .bind(id)
            .fetch_optional(conn)
            .await
            .context(MakeQuerySnafu)
    }

    pub async fn get_pending(pool: &Pool<Postgres>) -> RosterResult<Vec<Self>> {
        sqlx::query_as(&format!(
            "{ASSIGNMENT_REQUEST_QUERY} WHERE r.status = 'pending' ORDER BY r.created_at"
        ))
        .fetch_all(pool)
        .await
        .context(MakeQuerySnafu)
    }

    pub async fn get_for_student(student_id: Uuid, pool: &Pool<Postgres>) -> RosterResult<Vec<Self>> {
        sqlx::query_as(&format!(
            "{ASSIGNMENT_REQUEST_QUERY} WHERE r.student_id = $1 ORDER BY r.created_at DESC"
        ))
        .bind(student_id)
        .fetch_all(pool)
        .await
        .context(MakeQuerySnafu)
    }

    /// A quick check for a friendlier error; the partial unique index is what actually
    /// keeps a student to one pending request.
    pub async fn pending_exists_for(student_id: Uuid, conn: &mut PgConnection) -> RosterResult<bool> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM public.assignment_requests WHERE student_id = $1 AND status = 'pending')")
            .bind(student_id)
            .fetch_one(conn)
            .await
            .context(MakeQuerySnafu)
    }

    pub async fn insert(
        student_id: Uuid,
        requested_count: i32,
        event_tag: &str,
        conn: &mut PgConnection,
    ) -> RosterResult<Uuid> {
        sqlx::query_scalar("INSERT INTO public.assignment_requests (student_id, requested_count, event_tag) VALUES ($1, $2, $3) RETURNING id")
            .bind(student_id)
            .bind(requested_count)
            .bind(event_tag)
            .fetch_one(conn)
            .await
            .context(MakeQuerySnafu)
    }

    pub async fn resolve(id: Uuid, status: RequestStatus, conn: &mut PgConnection) -> RosterResult<bool> {
        resolve_in("assignment_requests", id, status, conn).await
    }

    /// Puts an approved request back to pending, for when approving it handed out nothing.
    pub async fn reopen(id: Uuid, conn: &mut PgConnection) -> RosterResult<bool> {
        let updated = sqlx::query("UPDATE public.assignment_requests SET status = 'pending', resolved_at = NULL WHERE id = $1 AND status = 'approved'")
            .bind(id)
            .execute(conn)
            .await
            .context(MakeQuerySnafu)?
            .rows_affected();
        Ok(updated > 0)
    }
}

impl UnassignmentRequest {
    pub async fn get_by_id(id: Uuid, conn: &mut PgConnection) -> RosterResult<Option<Self>> {
        sqlx::query_as(&format!("{UNASSIGNMENT_REQUEST_QUERY} WHERE r.id = $1"))
            .bind(id)
            .fetch_optional(conn)
            .await
            .context(MakeQuerySnafu)
    }

    pub async fn get_pending(pool: &Pool<Postgres>) -> RosterResult<Vec<Self>> {
        sqlx::query_as(&format!(
            "{UNASSIGNMENT_REQUEST_QUERY} WHERE r.status = 'pending' ORDER BY r.created_at"
        ))
        .fetch_all(pool)
        .await
        .context(MakeQuerySnafu)
    }

    pub async fn get_for_student(student_id: Uuid, pool: &Pool<Postgres>) -> RosterResult<Vec<Self>> {
        sqlx::query_as(&format!(
            "{UNASSIGNMENT_REQUEST_QUERY} WHERE r.student_id = $1 ORDER BY r.created_at DESC"
        ))
        .bind(student_id)
        .fetch_all(pool)
        .await
        .context(MakeQuerySnafu)
    }

    pub async fn pending_exists_for(assignment_id: Uuid, conn: &mut PgConnection) -> RosterResult<bool> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM public.unassignment_requests WHERE assignment_id = $1 AND status = 'pending')")
            .bind(assignment_id)
            .fetch_one(conn)
            .await
            .context(MakeQuerySnafu)
    }

    pub async fn insert(
        assignment_id: Uuid,
        beneficiary_id: &str,
        student_id: Uuid,
        reason: Option<String>,
        conn: &mut PgConnection,
    ) -> RosterResult<Uuid> {
        sqlx::query_scalar("INSERT INTO public.unassignment_requests (assignment_id, beneficiary_id, student_id, reason) VALUES ($1, $2, $3, $4) RETURNING id")
            .bind(assignment_id)
            .bind(beneficiary_id)
            .bind(student_id)
            .bind(reason)
            .fetch_one(conn)
            .await
            .context(MakeQuerySnafu)
    }

    pub async fn resolve(id: Uuid, status: RequestStatus, conn: &mut PgConnection) -> RosterResult<bool> {
        resolve_in("unassignment_requests", id, status, conn).await
    }
}

/// Moves a pending request to `status`. Returns `false` if it was no longer pending.
async fn resolve_in(
    table: &'static str,
    id: Uuid,
    status: RequestStatus,
    conn: &mut PgConnection,
) -> RosterResult<bool> {
    let updated = sqlx::query(&format!(
        "UPDATE public.{table} SET status = $2, resolved_at = now() WHERE id = $1 AND status = 'pending'"
    ))
    .bind(id)
    .bind(status.as_str())
    .execute(conn)
    .await
    .context(MakeQuerySnafu)?
    .rows_affected();

    Ok(updated > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_pending_requests_resolve() {
        use RequestStatus::{Approved, Pending, Rejected};

        assert!(Pending.can_become(Approved));
        assert!(Pending.can_become(Rejected));
        assert!(!Pending.can_become(Pending));
        assert!(!Approved.can_become(Rejected));
        assert!(!Rejected.can_become(Approved));
    }

    #[test]
    fn unknown_statuses_are_rejected() {
        assert_eq!(
            RequestStatus::try_from("approved".to_string()).unwrap(),
            RequestStatus::Approved
        );
        assert!(matches!(
            RequestStatus::try_from("maybe".to_string()),
            Err(RosterError::InvalidRequestStatus { .. })
        ));
    }

    #[test]
    fn the_schema_allows_one_pending_request_each() {
        let schema = include_str!("../../migrations/20250601000000_init.sql");
        assert!(schema.contains(
            "ON public.assignment_requests (student_id) WHERE status = 'pending'"
        ));
        assert!(schema.contains(
            "ON public.unassignment_requests (assignment_id) WHERE status = 'pending'"
        ));
    }
}
