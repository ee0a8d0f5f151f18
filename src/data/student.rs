use crate::{
    data::{DataType, INSERT_BATCH_SIZE},
    error::{MakeQuerySnafu, PartialImportSnafu, RosterResult},
};
use email_address::EmailAddress;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use sqlx::{FromRow, PgConnection, Pool, Postgres, QueryBuilder};
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct Student {
    pub id: Uuid,
    pub registration_number: String,
    pub external_id: String,
    pub name: String,
    pub branch: Option<String>,
    pub email: Option<String>,
    pub active: bool,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddStudent {
    pub registration_number: String,
    pub external_id: String,
    pub name: String,
    pub branch: Option<String>,
    pub email: Option<EmailAddress>,
}

const STUDENT_COLUMNS: &str =
    "id, registration_number, external_id, name, branch, email, active, available";

impl DataType for Student {
    type Id = Uuid;
    type FormForAdding = AddStudent;

    async fn get_from_db_by_id(id: Self::Id, conn: &mut PgConnection) -> RosterResult<Option<Self>> {
        sqlx::query_as(&format!(
            "SELECT {STUDENT_COLUMNS} FROM public.students WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(conn)
        .await
        .context(MakeQuerySnafu)
    }

    async fn get_all(pool: &Pool<Postgres>) -> RosterResult<Vec<Self>> {
        sqlx::query_as(&format!(
            "SELECT {STUDENT_COLUMNS} FROM public.students ORDER BY name, registration_number"
        ))
        .fetch_all(pool)
        .await
        .context(MakeQuerySnafu)
    }

    async fn insert_into_database(
        to_be_added: Self::FormForAdding,
        conn: &mut PgConnection,
    ) -> RosterResult<Self::Id> {
        let AddStudent {
            registration_number,
            external_id,
            name,
            branch,
            email,
        } = to_be_added;

        sqlx::query_scalar("INSERT INTO public.students (registration_number, external_id, name, branch, email) VALUES ($1, $2, $3, $4, $5) RETURNING id")
            .bind(registration_number)
            .bind(external_id)
            .bind(name)
            .bind(branch)
            .bind(email.map(|e| e.to_string()))
            .fetch_one(conn)
            .await
            .context(MakeQuerySnafu)
    }

    async fn remove_from_database(id: Self::Id, conn: &mut PgConnection) -> RosterResult<()> {
        sqlx::query("DELETE FROM public.students WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await
            .context(MakeQuerySnafu)?;
        Ok(())
    }
}

impl Student {
    /// Looks a student up by either their registration number or their external ID.
    pub async fn get_by_identifier(
        identifier: &str,
        conn: &mut PgConnection,
    ) -> RosterResult<Option<Self>> {
        sqlx::query_as(&format!(
            "SELECT {STUDENT_COLUMNS} FROM public.students WHERE registration_number = $1 OR external_id = $1 LIMIT 1"
        ))
        .bind(identifier)
        .fetch_optional(conn)
        .await
        .context(MakeQuerySnafu)
    }

    /// Every active student, in roster order. Availability only affects the manual form's preselection.
    pub async fn get_active_ids(pool: &Pool<Postgres>) -> RosterResult<Vec<Uuid>> {
        Ok(active_ids(&Self::get_all(pool).await?))
    }

    /// Keeps the order of `ids`, dropping repeats and any that aren't active.
    pub async fn filter_active_ids(ids: &[Uuid], pool: &Pool<Postgres>) -> RosterResult<Vec<Uuid>> {
        let active: HashSet<Uuid> =
            sqlx::query_scalar("SELECT id FROM public.students WHERE active AND id = ANY($1)")
                .bind(ids)
                .fetch_all(pool)
                .await
                .context(MakeQuerySnafu)?
                .into_iter()
                .collect();

        Ok(keep_once(ids, &active))
    }

    /// `(registration_number, external_id)` for every student.
    pub async fn get_all_identifiers(pool: &Pool<Postgres>) -> RosterResult<Vec<(String, String)>> {
        sqlx::query_as("SELECT registration_number, external_id FROM public.students")
            .fetch_all(pool)
            .await
            .context(MakeQuerySnafu)
    }

    /// Returns `false` if there was no such student.
    pub async fn set_active(id: Uuid, active: bool, conn: &mut PgConnection) -> RosterResult<bool> {
        let updated = sqlx::query("UPDATE public.students SET active = $2 WHERE id = $1")
            .bind(id)
            .bind(active)
            .execute(conn)
            .await
            .context(MakeQuerySnafu)?
            .rows_affected();
        Ok(updated > 0)
    }

    pub async fn set_available(
        id: Uuid,
        available: bool,
        conn: &mut PgConnection,
    ) -> RosterResult<bool> {
        let updated = sqlx::query("UPDATE public.students SET available = $2 WHERE id = $1")
            .bind(id)
            .bind(available)
            .execute(conn)
            .await
            .context(MakeQuerySnafu)?
            .rows_affected();
        Ok(updated > 0)
    }

    /// Inserts in fixed-size batches. The first failing batch aborts the rest;
    /// earlier batches stay committed.
    pub async fn insert_batches(students: Vec<AddStudent>, pool: &Pool<Postgres>) -> RosterResult<usize> {
        let total = students.len();
        let mut committed = 0;

        for chunk in students.chunks(INSERT_BATCH_SIZE) {
            let mut builder = QueryBuilder::<Postgres>::new(
                "INSERT INTO public.students (registration_number, external_id, name, branch, email) ",
            );
            builder.push_values(chunk, |mut row, student| {
                row.push_bind(student.registration_number.clone())
                    .push_bind(student.external_id.clone())
                    .push_bind(student.name.clone())
                    .push_bind(student.branch.clone())
                    .push_bind(student.email.as_ref().map(ToString::to_string));
            });

            builder
                .build()
                .execute(pool)
                .await
                .context(PartialImportSnafu {
                    what: "students",
                    committed,
                    total,
                })?;
            committed += chunk.len();
        }

        Ok(committed)
    }
}

pub fn active_ids(students: &[Student]) -> Vec<Uuid> {
    students.iter().filter(|s| s.active).map(|s| s.id).collect()
}

/// The first occurrence of each ID in `ids` that is also in `allowed`.
pub fn keep_once(ids: &[Uuid], allowed: &HashSet<Uuid>) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.iter()
        .copied()
        .filter(|id| allowed.contains(id) && seen.insert(*id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(active: bool, available: bool) -> Student {
        Student {
            id: Uuid::new_v4(),
            registration_number: String::new(),
            external_id: String::new(),
            name: String::new(),
            branch: None,
            email: None,
            active,
            available,
        }
    }

    #[test]
    fn unavailable_students_still_get_distributed_to() {
        let away = student(true, false);
        let here = student(true, true);
        let inactive = student(false, true);

        assert_eq!(
            active_ids(&[away.clone(), inactive, here.clone()]),
            vec![away.id, here.id]
        );
    }

    #[test]
    fn repeated_selections_count_once() {
        let [a, b, c] = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        let allowed = HashSet::from([a, b]);

        assert_eq!(keep_once(&[b, a, b, c, a], &allowed), vec![b, a]);
        assert!(keep_once(&[c, c], &allowed).is_empty());
    }
}
