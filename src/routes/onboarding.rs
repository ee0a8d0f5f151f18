use crate::{
    auth::{RosterSession, RosterUser, pin_login_expiry},
    data::{
        DataType,
        admin::{AddAdmin, AdminUser},
    },
    error::{CommitTransactionSnafu, RosterResult, UnableToFindUserInfoSnafu},
    maud_conveniences::{errors_list, form_submit_button, simple_form_element, title},
    state::RosterState,
};
use axum::{
    Form,
    body::Body,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use axum_login::tower_sessions::Session;
use bitflags::bitflags;
use maud::html;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use snafu::{OptionExt, ResultExt};
use time::OffsetDateTime;

bitflags! {
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct NewAdminDetailsError: u8 {
        const EMPTY_USERNAME =    0b0000_0001;
        const EMPTY_PASSWORD =    0b0000_0010;
        const MISMATCH_PASSWORD = 0b0000_0100;
    }
}

impl NewAdminDetailsError {
    pub fn check(username: &str, password: &SecretString, confirm_password: &SecretString) -> Self {
        let mut errors = Self::empty();
        if username.trim().is_empty() {
            errors |= Self::EMPTY_USERNAME;
        }
        if password.expose_secret().trim().is_empty() {
            errors |= Self::EMPTY_PASSWORD;
        }
        if password.expose_secret() != confirm_password.expose_secret() {
            errors |= Self::MISMATCH_PASSWORD;
        }
        errors
    }

    pub fn as_nice_list(&self) -> impl Iterator<Item = &'static str> {
        self.iter().filter_map(|x| match x {
            Self::EMPTY_USERNAME => Some("Provided username was empty"),
            Self::EMPTY_PASSWORD => Some("Provided password was empty"),
            Self::MISMATCH_PASSWORD => Some("Passwords didn't match"),
            _ => None,
        })
    }
}

#[derive(Deserialize)]
pub struct NewAdminCreationQuery {
    errors: Option<u8>,
}

pub async fn get_onboarding(
    State(state): State<RosterState>,
    session: RosterSession,
    Query(NewAdminCreationQuery { errors }): Query<NewAdminCreationQuery>,
) -> RosterResult<Response<Body>> {
    //only ever for the very first admin
    if AdminUser::any_exist(&mut *state.get_connection().await?).await? {
        return Ok(Redirect::to("/").into_response());
    }

    let errors = errors.map_or_else(
        NewAdminDetailsError::empty,
        NewAdminDetailsError::from_bits_truncate,
    );

    Ok(state.render(session, html! {
        div class="bg-gray-800 p-8 rounded-lg shadow-xl w-full max-w-md" {
            (title("Create the first Admin Account"))

            @if !errors.is_empty() {
                (errors_list(None, errors.as_nice_list()))
            }

            form method="post" {
                (simple_form_element("username", "Username", true, None, None))
                (simple_form_element("password", "Password", true, Some("password"), None))
                (simple_form_element("confirm_password", "Confirm Password", true, Some("password"), None))
                (form_submit_button(Some("Create Admin User")))
            }
        }
    }).into_response())
}

#[derive(Deserialize)]
pub struct CreateAdminAccountForm {
    username: String,
    password: SecretString,
    confirm_password: SecretString,
}

pub async fn post_onboarding(
    State(state): State<RosterState>,
    mut auth_session: RosterSession,
    session: Session,
    Form(CreateAdminAccountForm {
        username,
        password,
        confirm_password,
    }): Form<CreateAdminAccountForm>,
) -> RosterResult<Redirect> {
    let mut conn = state.get_transaction().await?;

    if AdminUser::any_exist(&mut conn).await? {
        return Ok(Redirect::to("/"));
    }

    let errors = NewAdminDetailsError::check(&username, &password, &confirm_password);
    if !errors.is_empty() {
        return Ok(Redirect::to(&format!(
            "/onboarding?errors={}",
            errors.bits()
        )));
    }

    let id = AdminUser::insert_into_database(
        AddAdmin {
            username: username.trim().to_string(),
            password,
        },
        &mut conn,
    )
    .await?;
    let admin = AdminUser::get_from_db_by_id(id, &mut conn)
        .await?
        .context(UnableToFindUserInfoSnafu)?;
    conn.commit().await.context(CommitTransactionSnafu)?;

    info!(username = %admin.username, "Created first admin");
    auth_session.login(&RosterUser::Admin(admin)).await?;
    pin_login_expiry(&session, OffsetDateTime::now_utc())?;

    Ok(Redirect::to("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn good_details_have_no_errors() {
        let pw = SecretString::from("correct horse");
        assert!(NewAdminDetailsError::check("imam", &pw, &pw.clone()).is_empty());
    }

    #[test]
    fn every_problem_is_reported() {
        let errors = NewAdminDetailsError::check(
            "  ",
            &SecretString::from(""),
            &SecretString::from("x"),
        );
        assert_eq!(errors, NewAdminDetailsError::all());
        assert_eq!(errors.as_nice_list().count(), 3);
    }
}
