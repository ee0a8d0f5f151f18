use crate::{
    auth::{AuthUtilities, PermissionsTarget, RosterSession, RosterUser},
    data::{
        DataType, IdForm,
        admin::{AddAdmin, AdminUser},
        setting::{Setting, SettingKey},
    },
    error::{CommitTransactionSnafu, RosterResult},
    maud_conveniences::{
        errors_list, form_element, form_submit_button, notice, simple_form_element, subtitle,
        table, title,
    },
    routes::{onboarding::NewAdminDetailsError, sse::ChangeEvent},
    state::RosterState,
};
use axum::{
    Form,
    body::Body,
    extract::{Query, State},
    http::Response,
    response::{IntoResponse, Redirect},
};
use maud::{Markup, html};
use secrecy::SecretString;
use serde::Deserialize;
use snafu::ResultExt;
use uuid::Uuid;

pub async fn get_settings(
    State(state): State<RosterState>,
    session: RosterSession,
) -> RosterResult<Response<Body>> {
    if !session.can(PermissionsTarget::EDIT_SETTINGS) {
        return Ok(Redirect::to("/login?to=/settings").into_response());
    }

    let mut conn = state.get_connection().await?;
    let current_tag = Setting::get(SettingKey::CurrentEventTag, &mut conn).await?;
    let requests_enabled = Setting::student_requests_enabled(&mut conn).await?;
    let templates = Setting::message_templates(&mut conn).await?;
    drop(conn);

    Ok(state.render(session, html! {
        div hx-ext="sse" sse-connect="/sse_feed" class="mx-auto p-8 max-w-4xl w-full flex flex-row gap-x-8" {
            div class="bg-gray-800 p-8 rounded shadow-md w-96" {
                (title("Settings"))
                div id="settings_result" {}
                form hx-post="/settings" hx-target="#settings_result" {
                    (simple_form_element(SettingKey::CurrentEventTag.key(), SettingKey::CurrentEventTag.label(), false, None, Some(&current_tag)))
                    (form_element(SettingKey::StudentRequestsEnabled.key(), SettingKey::StudentRequestsEnabled.label(), html! {
                        label class="text-gray-300" {
                            input type="checkbox" id="student_requests_enabled" name="student_requests_enabled" value="true" checked[requests_enabled] class="mr-2";
                            "Let students ask for more or fewer visits"
                        }
                    }))
                    @for (key, value) in &templates {
                        (template_field(*key, value))
                    }
                    (form_submit_button(Some("Save")))
                }
            }

            div class="flex flex-col grow space-y-8" {
                div id="admins" hx-get="/internal/admins" hx-trigger="load, sse:crud_settings" {}

                div class="bg-gray-800 p-8 rounded shadow-md" {
                    (subtitle("Add Administrator"))
                    div id="new_admin_result" {}
                    form hx-put="/internal/admins" hx-target="#new_admin_result" {
                        (simple_form_element("username", "Username", true, None, None))
                        (simple_form_element("password", "Password", true, Some("password"), None))
                        (simple_form_element("confirm_password", "Confirm Password", true, Some("password"), None))
                        (form_submit_button(Some("Add Administrator")))
                    }
                }
            }
        }
    }).into_response())
}

fn template_field(key: SettingKey, value: &str) -> Markup {
    let rows = if key == SettingKey::EmailMessageSubject { 1 } else { 6 };
    form_element(key.key(), key.label(), html! {
        textarea id=(key.key()) name=(key.key()) rows=(rows)
            class="shadow appearance-none border rounded w-full py-2 px-3 leading-tight focus:outline-none focus:shadow-outline bg-gray-700 border-gray-600" {(value)}
    })
}

#[derive(Deserialize)]
pub struct SettingsForm {
    current_event_tag: String,
    //unticked checkboxes aren't sent at all
    student_requests_enabled: Option<String>,
    whatsapp_message_template: String,
    email_message_subject: String,
    email_message_body: String,
}

pub async fn post_settings(
    State(state): State<RosterState>,
    session: RosterSession,
    Form(SettingsForm {
        current_event_tag,
        student_requests_enabled,
        whatsapp_message_template,
        email_message_subject,
        email_message_body,
    }): Form<SettingsForm>,
) -> RosterResult<Markup> {
    session.ensure_can(PermissionsTarget::EDIT_SETTINGS)?;

    let requests_enabled = student_requests_enabled.is_some();

    let mut tx = state.get_transaction().await?;
    Setting::set(SettingKey::CurrentEventTag, current_event_tag.trim(), &mut tx).await?;
    Setting::set(
        SettingKey::StudentRequestsEnabled,
        if requests_enabled { "true" } else { "false" },
        &mut tx,
    )
    .await?;
    for (key, value) in [
        (SettingKey::WhatsappMessageTemplate, whatsapp_message_template),
        (SettingKey::EmailMessageSubject, email_message_subject),
        (SettingKey::EmailMessageBody, email_message_body),
    ] {
        Setting::set(key, value.trim(), &mut tx).await?;
    }
    tx.commit().await.context(CommitTransactionSnafu)?;
    state.send_change_event(ChangeEvent::Settings);

    info!(
        current_event_tag = current_event_tag.trim(),
        requests_enabled, "Updated settings"
    );
    Ok(notice("Settings saved"))
}

fn current_admin_id(session: &RosterSession) -> Option<Uuid> {
    match session.user.as_ref() {
        Some(RosterUser::Admin(admin)) => Some(admin.id),
        _ => None,
    }
}

pub async fn internal_get_admins(
    State(state): State<RosterState>,
    session: RosterSession,
) -> RosterResult<Markup> {
    session.ensure_can(PermissionsTarget::EDIT_SETTINGS)?;
    let me = current_admin_id(&session);

    let admins = AdminUser::get_all(&state).await?;
    let admin_count = admins.len();

    let rows = admins
        .into_iter()
        .map(|admin| {
            let removable = may_remove(admin.id, me, admin_count);
            [
                html! {(admin.username)},
                html! {
                    @if removable {
                        button hx-delete={"/internal/admins?id=" (admin.id.to_string())} hx-swap="none" hx-confirm="Remove this administrator?" class="bg-red-700 hover:bg-red-800 px-2 py-1 rounded text-sm" {"Remove"}
                    }
                },
            ]
        })
        .collect();

    Ok(table(title("Administrators"), ["Username", ""], rows))
}

#[derive(Deserialize)]
pub struct NewAdminForm {
    username: String,
    password: SecretString,
    confirm_password: SecretString,
}

pub async fn internal_put_admin(
    State(state): State<RosterState>,
    session: RosterSession,
    Form(NewAdminForm {
        username,
        password,
        confirm_password,
    }): Form<NewAdminForm>,
) -> RosterResult<Markup> {
    session.ensure_can(PermissionsTarget::EDIT_SETTINGS)?;

    let errors = NewAdminDetailsError::check(&username, &password, &confirm_password);
    if !errors.is_empty() {
        return Ok(errors_list(None, errors.as_nice_list()));
    }

    let username = username.trim().to_string();
    AdminUser::insert_into_database(
        AddAdmin {
            username: username.clone(),
            password,
        },
        &mut *state.get_connection().await?,
    )
    .await?;
    state.send_change_event(ChangeEvent::Settings);

    info!(%username, "Added admin");
    Ok(notice("Administrator added"))
}

/// Admins can't remove themselves, and the last admin always stays.
fn may_remove(target: Uuid, me: Option<Uuid>, admin_count: usize) -> bool {
    admin_count > 1 && me != Some(target)
}

pub async fn internal_delete_admin(
    State(state): State<RosterState>,
    session: RosterSession,
    Query(IdForm { id }): Query<IdForm>,
) -> RosterResult<Markup> {
    session.ensure_can(PermissionsTarget::EDIT_SETTINGS)?;

    let mut tx = state.get_transaction().await?;
    let admin_count = AdminUser::count(&mut tx).await?;

    if !may_remove(id, current_admin_id(&session), admin_count) {
        return Ok(notice("That administrator can't be removed"));
    }

    AdminUser::remove_from_database(id, &mut tx).await?;
    tx.commit().await.context(CommitTransactionSnafu)?;
    state.send_change_event(ChangeEvent::Settings);

    info!(%id, "Removed admin");
    Ok(notice("Administrator removed"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_admin_and_self_are_protected() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();

        assert!(may_remove(other, Some(me), 2));
        assert!(!may_remove(me, Some(me), 5));
        assert!(!may_remove(other, Some(me), 1));
    }

    #[test]
    fn template_fields_post_under_their_setting_key() {
        let markup = template_field(SettingKey::WhatsappMessageTemplate, "Salaam <b>").into_string();
        assert!(markup.contains(r#"name="whatsapp_message_template""#));
        assert!(markup.contains("Salaam &lt;b&gt;"));
        assert!(markup.contains(r#"rows="6""#));
    }
}
