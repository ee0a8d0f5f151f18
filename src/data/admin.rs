use crate::{
    data::DataType,
    error::{BcryptSnafu, JoinBlockingSnafu, MakeQuerySnafu, RosterResult},
};
use bcrypt::DEFAULT_COST;
use secrecy::{ExposeSecret, SecretString};
use snafu::ResultExt;
use sqlx::{FromRow, PgConnection, Pool, Postgres};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct AdminUser {
    pub id: Uuid,
    pub username: String,
    pub bcrypt_hashed_password: SecretString,
}

#[derive(FromRow)]
struct AdminRow {
    id: Uuid,
    username: String,
    bcrypt_hashed_password: String,
}

impl From<AdminRow> for AdminUser {
    fn from(row: AdminRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            bcrypt_hashed_password: SecretString::from(row.bcrypt_hashed_password),
        }
    }
}

pub struct AddAdmin {
    pub username: String,
    pub password: SecretString,
}

impl DataType for AdminUser {
    type Id = Uuid;
    type FormForAdding = AddAdmin;

    async fn get_from_db_by_id(id: Self::Id, conn: &mut PgConnection) -> RosterResult<Option<Self>> {
        Ok(sqlx::query_as::<_, AdminRow>("SELECT * FROM public.admin_users WHERE id = $1")
            .bind(id)
            .fetch_optional(conn)
            .await
            .context(MakeQuerySnafu)?
            .map(Self::from))
    }

    async fn get_all(pool: &Pool<Postgres>) -> RosterResult<Vec<Self>> {
        Ok(
            sqlx::query_as::<_, AdminRow>("SELECT * FROM public.admin_users ORDER BY username")
                .fetch_all(pool)
                .await
                .context(MakeQuerySnafu)?
                .into_iter()
                .map(Self::from)
                .collect(),
        )
    }

    async fn insert_into_database(
        to_be_added: Self::FormForAdding,
        conn: &mut PgConnection,
    ) -> RosterResult<Self::Id> {
        let AddAdmin { username, password } = to_be_added;

        let hashed = tokio::task::spawn_blocking(move || {
            bcrypt::hash(password.expose_secret().as_bytes(), DEFAULT_COST)
        })
        .await
        .context(JoinBlockingSnafu)?
        .context(BcryptSnafu)?;

        sqlx::query_scalar(
            "INSERT INTO public.admin_users (username, bcrypt_hashed_password) VALUES ($1, $2) RETURNING id",
        )
        .bind(username)
        .bind(hashed)
        .fetch_one(conn)
        .await
        .context(MakeQuerySnafu)
    }

    async fn remove_from_database(id: Self::Id, conn: &mut PgConnection) -> RosterResult<()> {
        sqlx::query("DELETE FROM public.admin_users WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await
            .context(MakeQuerySnafu)?;
        Ok(())
    }
}

impl AdminUser {
    pub async fn get_by_username(
        username: &str,
        conn: &mut PgConnection,
    ) -> RosterResult<Option<Self>> {
        Ok(
            sqlx::query_as::<_, AdminRow>("SELECT * FROM public.admin_users WHERE username = $1")
                .bind(username)
                .fetch_optional(conn)
                .await
                .context(MakeQuerySnafu)?
                .map(Self::from),
        )
    }

    pub async fn any_exist(conn: &mut PgConnection) -> RosterResult<bool> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM public.admin_users)")
            .fetch_one(conn)
            .await
            .context(MakeQuerySnafu)
    }

    pub async fn count(conn: &mut PgConnection) -> RosterResult<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM public.admin_users")
            .fetch_one(conn)
            .await
            .context(MakeQuerySnafu)?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}
