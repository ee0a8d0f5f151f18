use crate::{
    auth::{RosterUser, RosterUserId},
    data::{DataType, admin::AdminUser, student::Student},
    error::{BcryptSnafu, JoinBlockingSnafu, RosterError},
    state::RosterState,
};
use async_trait::async_trait;
use axum_login::{AuthnBackend, UserId};
use secrecy::{ExposeSecret, SecretString};
use snafu::ResultExt;

#[derive(Clone)]
pub struct RosterAuthBackend {
    state: RosterState,
}

impl RosterAuthBackend {
    pub const fn new(state: RosterState) -> Self {
        Self { state }
    }
}

pub enum RosterAuthCredentials {
    AdminPassword {
        username: String,
        password: SecretString,
    },
    /// Either the registration number or the external ID of the student.
    StudentIdentifier { identifier: String },
}

#[async_trait]
impl AuthnBackend for RosterAuthBackend {
    type User = RosterUser;
    type Credentials = RosterAuthCredentials;
    type Error = RosterError;

    async fn authenticate(
        &self,
        creds: Self::Credentials,
    ) -> Result<Option<Self::User>, Self::Error> {
        let mut conn = self.state.get_connection().await?;

        match creds {
            RosterAuthCredentials::AdminPassword { username, password } => {
                let Some(admin) = AdminUser::get_by_username(&username, &mut conn).await? else {
                    return Ok(None);
                };

                let hash = admin.bcrypt_hashed_password.clone();
                let password_verification_result = tokio::task::spawn_blocking(move || {
                    bcrypt::verify(password.expose_secret(), hash.expose_secret())
                })
                .await
                .context(JoinBlockingSnafu)?
                .context(BcryptSnafu)?;

                Ok(password_verification_result.then_some(RosterUser::Admin(admin)))
            }
            RosterAuthCredentials::StudentIdentifier { identifier } => {
                let identifier = identifier.trim();
                if identifier.is_empty() {
                    return Ok(None);
                }

                let student = Student::get_by_identifier(identifier, &mut conn).await?;
                Ok(student
                    .filter(|student| student.active)
                    .map(RosterUser::Student))
            }
        }
    }

    async fn get_user(&self, user_id: &UserId<Self>) -> Result<Option<Self::User>, Self::Error> {
        let mut conn = self.state.get_connection().await?;

        Ok(match *user_id {
            RosterUserId::Admin(id) => AdminUser::get_from_db_by_id(id, &mut conn)
                .await?
                .map(RosterUser::Admin),
            //deactivating a student ends their sessions on the next request
            RosterUserId::Student(id) => Student::get_from_db_by_id(id, &mut conn)
                .await?
                .filter(|student| student.active)
                .map(RosterUser::Student),
        })
    }
}
