use crate::{
    data::INSERT_BATCH_SIZE,
    distribution::{NewAssignment, PAGE_SIZE, paginate},
    error::{MakeQuerySnafu, PartialAssignmentSnafu, RosterError, RosterResult},
};
use snafu::ResultExt;
use sqlx::{FromRow, PgConnection, Pool, Postgres, QueryBuilder};
use std::fmt::{Display, Formatter};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AssignmentStatus {
    Pending,
    Completed,
}

impl AssignmentStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
        }
    }
}

impl Display for AssignmentStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for AssignmentStatus {
    type Error = RosterError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            _ => Err(RosterError::InvalidAssignmentStatus { found: value }),
        }
    }
}

/// The completion state of an assignment.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Completion {
    pub status: AssignmentStatus,
    pub completed_at: Option<OffsetDateTime>,
}

impl Completion {
    pub const PENDING: Self = Self {
        status: AssignmentStatus::Pending,
        completed_at: None,
    };

    #[must_use]
    pub const fn toggled(self, now: OffsetDateTime) -> Self {
        match self.status {
            AssignmentStatus::Pending => Self {
                status: AssignmentStatus::Completed,
                completed_at: Some(now),
            },
            AssignmentStatus::Completed => Self::PENDING,
        }
    }
}

/// An assignment joined with the names needed to show it.
#[derive(Debug, Clone, FromRow)]
pub struct AssignmentDetails {
    pub id: Uuid,
    pub beneficiary_id: String,
    pub student_id: Uuid,
    #[sqlx(try_from = "String")]
    pub status: AssignmentStatus,
    pub completed_at: Option<OffsetDateTime>,
    pub event_tag: String,
    pub beneficiary_name: String,
    pub beneficiary_phone: Option<String>,
    pub beneficiary_address: Option<String>,
    pub student_name: String,
}

impl AssignmentDetails {
    pub const fn completion(&self) -> Completion {
        Completion {
            status: self.status,
            completed_at: self.completed_at,
        }
    }
}

const DETAILS_QUERY: &str = "SELECT a.id, a.beneficiary_id, a.student_id, a.status, a.completed_at, a.event_tag, b.name AS beneficiary_name, b.phone AS beneficiary_phone, b.address AS beneficiary_address, s.name AS student_name FROM public.assignments a JOIN public.beneficiaries b ON b.external_id = a.beneficiary_id JOIN public.students s ON s.id = a.student_id";

pub struct Assignments;

const REMOVE_PENDING_BY_ID: &str =
    "DELETE FROM public.assignments WHERE id = $1 AND status = 'pending'";
const REMOVE_PENDING_FOR_STUDENT: &str =
    "DELETE FROM public.assignments WHERE student_id = $1 AND status = 'pending'";
const REMOVE_PENDING_FOR_TAG: &str =
    "DELETE FROM public.assignments WHERE event_tag = $1 AND status = 'pending'";

impl Assignments {
    pub async fn get_by_id(id: Uuid, conn: &mut PgConnection) -> RosterResult<Option<AssignmentDetails>> {
        sqlx::query_as(&format!("{DETAILS_QUERY} WHERE a.id = $1"))
            .bind(id)
            .fetch_optional(conn)
            .await
            .context(MakeQuerySnafu)
    }

    pub async fn get_all(pool: &Pool<Postgres>) -> RosterResult<Vec<AssignmentDetails>> {
        sqlx::query_as(&format!(
            "{DETAILS_QUERY} ORDER BY a.event_tag, s.name, a.beneficiary_id"
        ))
        .fetch_all(pool)
        .await
        .context(MakeQuerySnafu)
    }

    pub async fn get_for_student(
        student_id: Uuid,
        pool: &Pool<Postgres>,
    ) -> RosterResult<Vec<AssignmentDetails>> {
        sqlx::query_as(&format!(
            "{DETAILS_QUERY} WHERE a.student_id = $1 ORDER BY a.status DESC, a.event_tag, b.name"
        ))
        .bind(student_id)
        .fetch_all(pool)
        .await
        .context(MakeQuerySnafu)
    }

    /// Every beneficiary ID that already has an assignment, fetched page by page.
    pub async fn get_assigned_beneficiary_ids(pool: &Pool<Postgres>) -> RosterResult<Vec<String>> {
        paginate(PAGE_SIZE, |offset, limit| async move {
            sqlx::query_scalar(
                "SELECT beneficiary_id FROM public.assignments ORDER BY created_at, beneficiary_id LIMIT $1 OFFSET $2",
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
            .context(MakeQuerySnafu)
        })
        .await
    }

    /// Toggles an assignment owned by `student_id`. Returns `None` if no such assignment
    /// belongs to that student.
    pub async fn toggle_status(
        id: Uuid,
        student_id: Uuid,
        now: OffsetDateTime,
        conn: &mut PgConnection,
    ) -> RosterResult<Option<Completion>> {
        let Some(current) = Self::get_by_id(id, &mut *conn).await? else {
            return Ok(None);
        };
        if current.student_id != student_id {
            return Ok(None);
        }

        let next = current.completion().toggled(now);
        sqlx::query("UPDATE public.assignments SET status = $2, completed_at = $3 WHERE id = $1")
            .bind(id)
            .bind(next.status.as_str())
            .bind(next.completed_at)
            .execute(conn)
            .await
            .context(MakeQuerySnafu)?;

        Ok(Some(next))
    }

    /// Inserts in fixed-size batches without a surrounding transaction: a failing batch
    /// aborts the rest and leaves the earlier ones in place.
    pub async fn insert_batches(
        assignments: &[NewAssignment],
        pool: &Pool<Postgres>,
    ) -> RosterResult<usize> {
        let total = assignments.len();
        let mut committed = 0;

        for chunk in assignments.chunks(INSERT_BATCH_SIZE) {
            let mut builder = QueryBuilder::<Postgres>::new(
                "INSERT INTO public.assignments (beneficiary_id, student_id, event_tag) ",
            );
            builder.push_values(chunk, |mut row, assignment| {
                row.push_bind(assignment.beneficiary_id.clone())
                    .push_bind(assignment.student_id)
                    .push_bind(assignment.event_tag.clone());
            });

            builder
                .build()
                .execute(pool)
                .await
                .context(PartialAssignmentSnafu { committed, total })?;
            committed += chunk.len();
        }

        Ok(committed)
    }

    pub async fn remove(id: Uuid, conn: &mut PgConnection) -> RosterResult<u64> {
        Ok(sqlx::query("DELETE FROM public.assignments WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await
            .context(MakeQuerySnafu)?
            .rows_affected())
    }

    /// Removes `id` only while it is still pending. Returns the number of rows removed.
    pub async fn remove_pending(id: Uuid, conn: &mut PgConnection) -> RosterResult<u64> {
        Ok(sqlx::query(REMOVE_PENDING_BY_ID)
            .bind(id)
            .execute(conn)
            .await
            .context(MakeQuerySnafu)?
            .rows_affected())
    }

    /// Completed visits stay, only pending ones are handed back.
    pub async fn remove_pending_for_student(
        student_id: Uuid,
        conn: &mut PgConnection,
    ) -> RosterResult<u64> {
        Ok(sqlx::query(REMOVE_PENDING_FOR_STUDENT)
            .bind(student_id)
            .execute(conn)
            .await
            .context(MakeQuerySnafu)?
            .rows_affected())
    }

    /// Completed visits stay, only pending ones are handed back.
    pub async fn remove_pending_for_tag(
        event_tag: &str,
        conn: &mut PgConnection,
    ) -> RosterResult<u64> {
        Ok(sqlx::query(REMOVE_PENDING_FOR_TAG)
            .bind(event_tag)
            .execute(conn)
            .await
            .context(MakeQuerySnafu)?
            .rows_affected())
    }

    pub async fn get_event_tags(pool: &Pool<Postgres>) -> RosterResult<Vec<String>> {
        sqlx::query_scalar("SELECT DISTINCT event_tag FROM public.assignments ORDER BY event_tag")
            .fetch_all(pool)
            .await
            .context(MakeQuerySnafu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    #[test]
    fn toggling_twice_from_pending_is_identity() {
        let now = OffsetDateTime::now_utc();
        let start = Completion::PENDING;

        let once = start.toggled(now);
        assert_eq!(once.status, AssignmentStatus::Completed);
        assert_eq!(once.completed_at, Some(now));

        let twice = once.toggled(now + Duration::minutes(5));
        assert_eq!(twice, start);
    }

    #[test]
    fn reopening_clears_the_timestamp() {
        let now = OffsetDateTime::now_utc();
        let done = Completion {
            status: AssignmentStatus::Completed,
            completed_at: Some(now - Duration::days(1)),
        };
        assert_eq!(done.toggled(now), Completion::PENDING);
    }

    #[test]
    fn bulk_removals_leave_completed_visits() {
        for sql in [
            REMOVE_PENDING_BY_ID,
            REMOVE_PENDING_FOR_STUDENT,
            REMOVE_PENDING_FOR_TAG,
        ] {
            assert!(sql.starts_with("DELETE FROM public.assignments WHERE"));
            assert!(sql.ends_with(&format!("AND status = '{}'", AssignmentStatus::Pending)));
        }
    }

    #[test]
    fn statuses_parse_from_their_column_values() {
        for status in [AssignmentStatus::Pending, AssignmentStatus::Completed] {
            assert_eq!(
                AssignmentStatus::try_from(status.as_str().to_string()).unwrap(),
                status
            );
        }
        assert!(AssignmentStatus::try_from("done".to_string()).is_err());
    }
}
