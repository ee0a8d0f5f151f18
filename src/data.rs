use crate::error::RosterResult;
use serde::Deserialize;
use sqlx::{PgConnection, Pool, Postgres};
use uuid::Uuid;

pub mod admin;
pub mod assignment;
pub mod beneficiary;
pub mod requests;
pub mod setting;
pub mod student;

/// Rows are written in chunks of this size, both for imports and for distribution.
pub const INSERT_BATCH_SIZE: usize = 100;

#[derive(Deserialize)]
pub struct IdForm {
    pub id: Uuid,
}

#[derive(Deserialize)]
pub struct ExternalIdForm {
    pub id: String,
}

pub trait DataType: Sized {
    type Id;
    type FormForAdding;

    async fn get_from_db_by_id(id: Self::Id, conn: &mut PgConnection)
    -> RosterResult<Option<Self>>;
    async fn get_all(pool: &Pool<Postgres>) -> RosterResult<Vec<Self>>;
    async fn insert_into_database(
        to_be_added: Self::FormForAdding,
        conn: &mut PgConnection,
    ) -> RosterResult<Self::Id>;
    async fn remove_from_database(id: Self::Id, conn: &mut PgConnection) -> RosterResult<()>;
}

/// Empty form inputs become `None`.
pub fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == s.len() {
        Some(s)
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_inputs_are_none() {
        assert_eq!(non_empty(String::new()), None);
        assert_eq!(non_empty("   ".into()), None);
        assert_eq!(non_empty(" Ward 4 ".into()), Some("Ward 4".into()));
        assert_eq!(non_empty("Ward 4".into()), Some("Ward 4".into()));
    }
}
