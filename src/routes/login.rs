use crate::{
    auth::{RosterSession, backend::RosterAuthCredentials, pin_login_expiry},
    data::admin::AdminUser,
    error::RosterResult,
    maud_conveniences::{form_submit_button, simple_form_element, subtitle, title},
    state::RosterState,
};
use axum::{
    Form,
    body::Body,
    extract::{Query, State},
    http::Response,
    response::{IntoResponse, Redirect},
};
use axum_login::tower_sessions::Session;
use maud::html;
use secrecy::SecretString;
use serde::Deserialize;
use time::OffsetDateTime;

#[derive(Deserialize)]
pub struct LoginOptions {
    pub to: Option<String>,
    pub login_failed: Option<bool>,
}

pub async fn get_login(
    State(state): State<RosterState>,
    session: RosterSession,
    Query(LoginOptions { to, login_failed }): Query<LoginOptions>,
) -> RosterResult<Response<Body>> {
    if !AdminUser::any_exist(&mut *state.get_connection().await?).await? {
        return Ok(Redirect::to("/onboarding").into_response());
    }

    if session.user.is_some() {
        return Ok(Redirect::to("/").into_response());
    }

    let login_failed = login_failed.unwrap_or(false);

    Ok(state.render(session, html! {
        div class="flex flex-row gap-x-8" {
            div class="bg-gray-800 shadow-md rounded px-8 pt-6 pb-8 mb-4 w-full max-w-sm" {
                (title("Login"))
                @if login_failed {
                    div role="alert" class="bg-red-100 border border-red-400 text-red-700 px-4 py-4 rounded relative mb-4" {
                        strong class="font-bold" {"Alert!"}
                        br;
                        // avoid giving extra details for security reasons :)
                        span class="block sm:inline" {"Details not found, incorrect, or the account is inactive"}
                    }
                }

                (subtitle("Students"))
                form method="post" action="/login/student" {
                    @if let Some(to) = to.as_ref() {
                        input type="hidden" name="next" value=(to) {}
                    }
                    (simple_form_element("identifier", "Registration Number or ID", true, None, None))
                    (form_submit_button(Some("Login")))
                }
            }

            div class="bg-gray-800 shadow-md rounded px-8 pt-6 pb-8 mb-4 w-full max-w-sm" {
                (subtitle("Administrators"))
                form method="post" action="/login/admin" {
                    @if let Some(to) = to {
                        input type="hidden" name="next" value=(to) {}
                    }
                    (simple_form_element("username", "Username", true, None, None))
                    (simple_form_element("password", "Password", true, Some("password"), None))
                    (form_submit_button(Some("Login")))
                }
            }
        }
    }).into_response())
}

#[derive(Deserialize)]
pub struct AdminLoginForm {
    username: String,
    password: SecretString,
    next: Option<String>,
}

#[derive(Deserialize)]
pub struct StudentLoginForm {
    identifier: String,
    next: Option<String>,
}

pub async fn post_admin_login(
    auth_session: RosterSession,
    session: Session,
    Form(AdminLoginForm {
        username,
        password,
        next,
    }): Form<AdminLoginForm>,
) -> RosterResult<Redirect> {
    log_in(
        auth_session,
        &session,
        RosterAuthCredentials::AdminPassword { username, password },
        next,
    )
    .await
}

pub async fn post_student_login(
    auth_session: RosterSession,
    session: Session,
    Form(StudentLoginForm { identifier, next }): Form<StudentLoginForm>,
) -> RosterResult<Redirect> {
    log_in(
        auth_session,
        &session,
        RosterAuthCredentials::StudentIdentifier { identifier },
        next,
    )
    .await
}

async fn log_in(
    mut auth_session: RosterSession,
    session: &Session,
    creds: RosterAuthCredentials,
    next: Option<String>,
) -> RosterResult<Redirect> {
    let Some(user) = auth_session.authenticate(creds).await? else {
        let mut redirect = "/login?login_failed=true".to_string();
        if let Some(next) = next {
            redirect += format!("&to={next}").as_str();
        }
        return Ok(Redirect::to(redirect.as_ref()));
    };

    auth_session.login(&user).await?;
    pin_login_expiry(session, OffsetDateTime::now_utc())?;

    info!(user = user.display_name(), "Logged in");
    Ok(Redirect::to(next.as_deref().filter(|n| n.starts_with('/')).unwrap_or("/")))
}

pub async fn post_logout(mut session: RosterSession) -> RosterResult<impl IntoResponse> {
    if let Some(user) = session.logout().await? {
        info!(user = user.display_name(), "Logged out");
    }
    Ok(Redirect::to("/login"))
}
