use crate::{
    data::{DataType, INSERT_BATCH_SIZE},
    distribution::{PAGE_SIZE, paginate},
    error::{MakeQuerySnafu, PartialImportSnafu, RosterResult},
};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use sqlx::{FromRow, PgConnection, Pool, Postgres, QueryBuilder};
use std::collections::HashSet;

#[derive(Debug, Clone, FromRow)]
pub struct Beneficiary {
    pub external_id: String,
    pub name: String,
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub group_tag: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddBeneficiary {
    pub external_id: String,
    pub name: String,
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub group_tag: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// The only fields that change after import.
pub struct ContactDetails {
    pub phone: Option<String>,
    pub address: Option<String>,
}

impl DataType for Beneficiary {
    type Id = String;
    type FormForAdding = AddBeneficiary;

    async fn get_from_db_by_id(id: Self::Id, conn: &mut PgConnection) -> RosterResult<Option<Self>> {
        sqlx::query_as(
            "SELECT external_id, name, age, gender, group_tag, phone, address FROM public.beneficiaries WHERE external_id = $1",
        )
        .bind(id)
        .fetch_optional(conn)
        .await
        .context(MakeQuerySnafu)
    }

    async fn get_all(pool: &Pool<Postgres>) -> RosterResult<Vec<Self>> {
        sqlx::query_as(
            "SELECT external_id, name, age, gender, group_tag, phone, address FROM public.beneficiaries ORDER BY external_id",
        )
        .fetch_all(pool)
        .await
        .context(MakeQuerySnafu)
    }

    async fn insert_into_database(
        to_be_added: Self::FormForAdding,
        conn: &mut PgConnection,
    ) -> RosterResult<Self::Id> {
        let AddBeneficiary {
            external_id,
            name,
            age,
            gender,
            group_tag,
            phone,
            address,
        } = to_be_added;

        sqlx::query_scalar("INSERT INTO public.beneficiaries (external_id, name, age, gender, group_tag, phone, address) VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING external_id")
            .bind(external_id)
            .bind(name)
            .bind(age)
            .bind(gender)
            .bind(group_tag)
            .bind(phone)
            .bind(address)
            .fetch_one(conn)
            .await
            .context(MakeQuerySnafu)
    }

    async fn remove_from_database(id: Self::Id, conn: &mut PgConnection) -> RosterResult<()> {
        Self::remove_many(&[id], conn).await.map(|_| ())
    }
}

const REMOVE_FOR_TAG: &str = "DELETE FROM public.beneficiaries WHERE external_id IN (SELECT beneficiary_id FROM public.assignments WHERE event_tag = $1)";

impl Beneficiary {
    /// Every beneficiary ID, fetched page by page in a stable order.
    pub async fn get_all_ids(pool: &Pool<Postgres>) -> RosterResult<Vec<String>> {
        paginate(PAGE_SIZE, |offset, limit| async move {
            sqlx::query_scalar(
                "SELECT external_id FROM public.beneficiaries ORDER BY created_at, external_id LIMIT $1 OFFSET $2",
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
            .context(MakeQuerySnafu)
        })
        .await
    }

    pub async fn get_existing_ids(pool: &Pool<Postgres>) -> RosterResult<HashSet<String>> {
        Ok(Self::get_all_ids(pool).await?.into_iter().collect())
    }

    pub async fn update_contact(
        id: &str,
        ContactDetails { phone, address }: ContactDetails,
        conn: &mut PgConnection,
    ) -> RosterResult<bool> {
        let updated = sqlx::query(
            "UPDATE public.beneficiaries SET phone = $2, address = $3 WHERE external_id = $1",
        )
        .bind(id)
        .bind(phone)
        .bind(address)
        .execute(conn)
        .await
        .context(MakeQuerySnafu)?
        .rows_affected();

        Ok(updated > 0)
    }

    /// Bulk delete; any assignments go with them.
    pub async fn remove_many(ids: &[String], conn: &mut PgConnection) -> RosterResult<u64> {
        Ok(
            sqlx::query("DELETE FROM public.beneficiaries WHERE external_id = ANY($1)")
                .bind(ids)
                .execute(conn)
                .await
                .context(MakeQuerySnafu)?
                .rows_affected(),
        )
    }

    /// Deletes every beneficiary assigned under `event_tag`, completed or not.
    /// Unassigned beneficiaries carry no tag, so they are never touched.
    pub async fn remove_for_tag(event_tag: &str, conn: &mut PgConnection) -> RosterResult<u64> {
        Ok(sqlx::query(REMOVE_FOR_TAG)
            .bind(event_tag)
            .execute(conn)
            .await
            .context(MakeQuerySnafu)?
            .rows_affected())
    }

    /// Inserts in fixed-size batches. The first failing batch aborts the rest;
    /// earlier batches stay committed.
    pub async fn insert_batches(
        beneficiaries: Vec<AddBeneficiary>,
        pool: &Pool<Postgres>,
    ) -> RosterResult<usize> {
        let total = beneficiaries.len();
        let mut committed = 0;

        for chunk in beneficiaries.chunks(INSERT_BATCH_SIZE) {
            let mut builder = QueryBuilder::<Postgres>::new(
                "INSERT INTO public.beneficiaries (external_id, name, age, gender, group_tag, phone, address) ",
            );
            builder.push_values(chunk, |mut row, beneficiary| {
                row.push_bind(beneficiary.external_id.clone())
                    .push_bind(beneficiary.name.clone())
                    .push_bind(beneficiary.age)
                    .push_bind(beneficiary.gender.clone())
                    .push_bind(beneficiary.group_tag.clone())
                    .push_bind(beneficiary.phone.clone())
                    .push_bind(beneficiary.address.clone());
            });

            builder
                .build()
                .execute(pool)
                .await
                .context(PartialImportSnafu {
                    what: "beneficiaries",
                    committed,
                    total,
                })?;
            committed += chunk.len();
        }

        Ok(committed)
    }
}
