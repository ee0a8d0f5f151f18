use crate::{
    auth::{AuthUtilities, PermissionsTarget, RosterSession},
    data::{
        IdForm, non_empty,
        assignment::{AssignmentStatus, Assignments},
        requests::{AssignmentRequest, RequestStatus, UnassignmentRequest},
        setting::{Setting, SettingKey},
    },
    error::{
        CommitTransactionSnafu, DuplicateRequestSnafu, MissingAssignmentSnafu, MissingEventTagSnafu, RequestsDisabledSnafu,
        RosterResult,
    },
    maud_conveniences::{form_submit_button, notice, simple_form_element, subtitle, title},
    routes::sse::ChangeEvent,
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
use serde::Deserialize;
use snafu::{OptionExt, ResultExt, ensure};
use time::OffsetDateTime;
use uuid::Uuid;

pub async fn get_my_visits(State(state): State<RosterState>, session: RosterSession) -> Response<Body> {
    if session.logged_in_student().is_err() {
        return Redirect::to("/login?to=/my_visits").into_response();
    }

    state.render(session, html! {
        div hx-ext="sse" sse-connect="/sse_feed" class="mx-auto p-8 max-w-4xl w-full flex flex-col space-y-8" {
            div id="my_assignments" hx-get="/internal/my_visits" hx-trigger="load, sse:crud_assignments, sse:crud_beneficiaries, sse:crud_settings" {}
            div id="request_result" {}
            div id="my_requests" hx-get="/internal/my_visits/requests" hx-trigger="load, sse:crud_requests, sse:crud_settings" {}
        }
    }).into_response()
}

pub async fn internal_get_my_visits(
    State(state): State<RosterState>,
    session: RosterSession,
) -> RosterResult<Markup> {
    session.ensure_can(PermissionsTarget::VIEW_OWN_ASSIGNMENTS)?;
    let student = session.logged_in_student()?;

    let assignments = Assignments::get_for_student(student.id, &state).await?;
    let templates = Setting::message_templates(&mut *state.get_connection().await?).await?;
    let done = assignments
        .iter()
        .filter(|a| a.status == AssignmentStatus::Completed)
        .count();

    Ok(html! {
        (title(html!{"My Visits (" (done) "/" (assignments.len()) " done)"}))
        @if assignments.is_empty() {
            p class="italic text-gray-400" {"Nothing has been assigned to you yet."}
        } @else {
            (message_templates_panel(&templates))
        }
        div class="grid grid-cols-1 md:grid-cols-2 gap-4" {
            @for assignment in assignments {
                @let id = assignment.id.to_string();
                @let completed = assignment.status == AssignmentStatus::Completed;
                div class={"p-4 rounded shadow-md " (if completed {"bg-green-900"} else {"bg-gray-800"})} {
                    h3 class="text-lg font-semibold" {(assignment.beneficiary_name)}
                    p class="text-sm text-gray-400" {(assignment.event_tag)}
                    @if let Some(phone) = &assignment.beneficiary_phone {
                        p {"📞 " a href={"tel:" (phone)} class="underline" {(phone)}}
                    }
                    @if let Some(address) = &assignment.beneficiary_address {
                        p {"🏠 " (address)}
                    }
                    @if let Some(at) = assignment.completed_at {
                        p class="text-sm text-green-300" {"Completed " (at.date().to_string())}
                    }
                    div class="flex space-x-2 mt-2" {
                        button hx-post={"/my_visits/toggle?id=" (id)} hx-swap="none" class="bg-blue-600 hover:bg-blue-800 px-2 py-1 rounded text-sm" {
                            @if completed {"Mark as Pending"} @else {"Mark as Done"}
                        }
                        button hx-get={"/internal/my_visits/unassign_form?id=" (id)} hx-target="#request_result" class="bg-gray-600 hover:bg-gray-700 px-2 py-1 rounded text-sm" {"Ask to Unassign"}
                    }
                }
            }
        }
    })
}

/// What to send a beneficiary after visiting on their behalf.
fn message_templates_panel(templates: &[(SettingKey, String)]) -> Markup {
    html! {
        details class="bg-gray-800 p-4 rounded shadow-md mb-4" {
            summary class="cursor-pointer font-semibold" {"Messages to send"}
            @for (key, text) in templates {
                h3 class="text-sm text-gray-400 mt-2" {(key.label())}
                pre class="whitespace-pre-wrap bg-gray-700 p-2 rounded text-sm select-all" {(text)}
            }
        }
    }
}

pub async fn post_toggle_status(
    State(state): State<RosterState>,
    session: RosterSession,
    Query(IdForm { id }): Query<IdForm>,
) -> RosterResult<()> {
    session.ensure_can(PermissionsTarget::UPDATE_OWN_ASSIGNMENTS)?;
    let student = session.logged_in_student()?;

    let next = Assignments::toggle_status(
        id,
        student.id,
        OffsetDateTime::now_utc(),
        &mut *state.get_connection().await?,
    )
    .await?
    .context(MissingAssignmentSnafu { id })?;
    state.send_change_event(ChangeEvent::Assignments);

    info!(%id, status = %next.status, "Toggled assignment");
    Ok(())
}

fn request_status_badge(status: RequestStatus) -> Markup {
    let colour = match status {
        RequestStatus::Pending => "text-yellow-400",
        RequestStatus::Approved => "text-green-400",
        RequestStatus::Rejected => "text-red-400",
    };
    html! { span class=(colour) {(status.as_str())} }
}

pub async fn internal_get_my_requests(
    State(state): State<RosterState>,
    session: RosterSession,
) -> RosterResult<Markup> {
    session.ensure_can(PermissionsTarget::MAKE_REQUESTS)?;
    let student = session.logged_in_student()?;

    let mut conn = state.get_connection().await?;
    let enabled = Setting::student_requests_enabled(&mut conn).await?;
    let current_tag = Setting::get(SettingKey::CurrentEventTag, &mut conn).await?;
    drop(conn);

    let assignment_requests = AssignmentRequest::get_for_student(student.id, &state).await?;
    let unassignment_requests = UnassignmentRequest::get_for_student(student.id, &state).await?;

    Ok(html! {
        div class="bg-gray-800 p-8 rounded shadow-md" {
            (subtitle("Requests"))
            @if enabled {
                form hx-post="/my_visits/request_more" hx-target="#request_result" class="max-w-sm" {
                    (simple_form_element("requested_count", "How many more?", true, Some("number"), Some("1")))
                    (simple_form_element("event_tag", "Event Tag", true, None, Some(&current_tag)))
                    (form_submit_button(Some("Request More Visits")))
                }
            } @else {
                p class="italic text-gray-400" {"Requests are closed right now."}
            }

            ul class="mt-4 space-y-1" {
                @for request in assignment_requests {
                    li {
                        "More visits: " (request.requested_count) " for " (request.event_tag) " - "
                        (request_status_badge(request.status))
                    }
                }
                @for request in unassignment_requests {
                    li {
                        "Unassign " (request.beneficiary_id)
                        @if let Some(reason) = request.reason {
                            " (" (reason) ")"
                        }
                        " - " (request_status_badge(request.status))
                    }
                }
            }
        }
    })
}

#[derive(Deserialize)]
pub struct RequestMoreForm {
    requested_count: i32,
    event_tag: String,
}

pub async fn post_request_more(
    State(state): State<RosterState>,
    session: RosterSession,
    Form(RequestMoreForm {
        requested_count,
        event_tag,
    }): Form<RequestMoreForm>,
) -> RosterResult<Markup> {
    session.ensure_can(PermissionsTarget::MAKE_REQUESTS)?;
    let student = session.logged_in_student()?;

    let event_tag = event_tag.trim();
    ensure!(!event_tag.is_empty(), MissingEventTagSnafu);
    if requested_count < 1 {
        return Ok(notice("Ask for at least one visit"));
    }

    let mut tx = state.get_transaction().await?;
    ensure!(
        Setting::student_requests_enabled(&mut tx).await?,
        RequestsDisabledSnafu
    );
    ensure!(
        !AssignmentRequest::pending_exists_for(student.id, &mut tx).await?,
        DuplicateRequestSnafu
    );
    let id = AssignmentRequest::insert(student.id, requested_count, event_tag, &mut tx).await?;
    tx.commit().await.context(CommitTransactionSnafu)?;
    state.send_change_event(ChangeEvent::Requests);

    info!(%id, requested_count, "Student asked for more visits");
    Ok(notice("Request sent"))
}

pub async fn internal_get_unassign_form(
    State(state): State<RosterState>,
    session: RosterSession,
    Query(IdForm { id }): Query<IdForm>,
) -> RosterResult<Markup> {
    session.ensure_can(PermissionsTarget::MAKE_REQUESTS)?;
    let student = session.logged_in_student()?;

    let assignment = Assignments::get_by_id(id, &mut *state.get_connection().await?)
        .await?
        .filter(|a| a.student_id == student.id)
        .context(MissingAssignmentSnafu { id })?;

    Ok(html! {
        div class="bg-gray-800 p-8 rounded shadow-md max-w-sm" {
            (subtitle(html!{"Stop visiting " (assignment.beneficiary_name) "?"}))
            form hx-post="/my_visits/request_unassign" hx-target="#request_result" {
                input type="hidden" name="assignment_id" value=(id.to_string());
                (simple_form_element("reason", "Reason (optional)", false, None, None))
                (form_submit_button(Some("Send Request")))
            }
        }
    })
}

#[derive(Deserialize)]
pub struct RequestUnassignForm {
    assignment_id: Uuid,
    reason: String,
}

pub async fn post_request_unassign(
    State(state): State<RosterState>,
    session: RosterSession,
    Form(RequestUnassignForm {
        assignment_id,
        reason,
    }): Form<RequestUnassignForm>,
) -> RosterResult<Markup> {
    session.ensure_can(PermissionsTarget::MAKE_REQUESTS)?;
    let student = session.logged_in_student()?;

    let mut tx = state.get_transaction().await?;
    ensure!(
        Setting::student_requests_enabled(&mut tx).await?,
        RequestsDisabledSnafu
    );
    let assignment = Assignments::get_by_id(assignment_id, &mut tx)
        .await?
        .filter(|a| a.student_id == student.id)
        .context(MissingAssignmentSnafu { id: assignment_id })?;
    ensure!(
        !UnassignmentRequest::pending_exists_for(assignment_id, &mut tx).await?,
        DuplicateRequestSnafu
    );

    let id = UnassignmentRequest::insert(
        assignment_id,
        &assignment.beneficiary_id,
        student.id,
        non_empty(reason),
        &mut tx,
    )
    .await?;
    tx.commit().await.context(CommitTransactionSnafu)?;
    state.send_change_event(ChangeEvent::Requests);

    info!(%id, %assignment_id, "Student asked to be unassigned");
    Ok(notice("Request sent"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn badges_name_the_status() {
        for status in [RequestStatus::Pending, RequestStatus::Approved, RequestStatus::Rejected] {
            assert!(request_status_badge(status).into_string().contains(status.as_str()));
        }
    }

    #[test]
    fn message_panel_shows_each_template() {
        let templates = SettingKey::MESSAGE_TEMPLATES
            .map(|key| (key, key.default_value().to_string()));
        let markup = message_templates_panel(&templates).into_string();

        for (key, _) in &templates {
            assert!(markup.contains(key.label()));
        }
        assert!(markup.contains("Visit made on your behalf"));
    }
}
