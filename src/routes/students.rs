use crate::{
    auth::{AuthUtilities, PermissionsTarget, RosterSession},
    data::{
        DataType, IdForm, non_empty,
        assignment::Assignments,
        student::{AddStudent, Student},
    },
    error::{EmailSnafu, MissingStudentSnafu, RosterResult},
    maud_conveniences::{form_submit_button, notice, simple_form_element, table, title},
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
use email_address::EmailAddress;
use maud::{Markup, html};
use serde::Deserialize;
use snafu::ResultExt;
use std::str::FromStr;

pub async fn get_students(State(state): State<RosterState>, session: RosterSession) -> Response<Body> {
    if !session.can(PermissionsTarget::CRUD_STUDENTS) {
        return Redirect::to("/login?to=/students").into_response();
    }

    state.render(session, html! {
        div hx-ext="sse" sse-connect="/sse_feed" class="mx-auto p-8 max-w-6xl w-full flex flex-col space-y-8" {
            div id="all_students" hx-get="/internal/students" hx-trigger="load, sse:crud_students, sse:crud_assignments" {}

            div class="bg-gray-800 p-8 rounded shadow-md max-w-md" {
                (title("Add Student"))
                div id="new_student_result" {}
                form hx-put="/students" hx-target="#new_student_result" {
                    (simple_form_element("registration_number", "Registration Number", true, None, None))
                    (simple_form_element("external_id", "ID", true, None, None))
                    (simple_form_element("name", "Name", true, None, None))
                    (simple_form_element("branch", "Branch (optional)", false, None, None))
                    (simple_form_element("email", "Email (optional)", false, Some("email"), None))
                    (form_submit_button(Some("Add Student")))
                }
            }
        }
    }).into_response()
}

pub async fn internal_get_students(
    State(state): State<RosterState>,
    session: RosterSession,
) -> RosterResult<Markup> {
    session.ensure_can(PermissionsTarget::CRUD_STUDENTS)?;

    let students = Student::get_all(&state).await?;
    let toggle = |id: &str, field: &'static str, current: bool| {
        html! {
            button hx-post={"/internal/students/" (field) "?id=" (id) "&value=" (!current)} hx-swap="none"
                class={"px-2 py-1 rounded text-sm " (if current {"bg-green-700 hover:bg-green-800"} else {"bg-gray-600 hover:bg-gray-700"})} {
                @if current {"Yes"} @else {"No"}
            }
        }
    };

    let rows = students
        .into_iter()
        .map(|student| {
            let id = student.id.to_string();
            [
                html! {(student.name)},
                html! {(student.registration_number)},
                html! {(student.external_id)},
                html! {(student.branch.unwrap_or_default())},
                html! {(student.email.unwrap_or_default())},
                toggle(&id, "set_active", student.active),
                toggle(&id, "set_available", student.available),
                html! {
                    div class="flex space-x-2" {
                        button hx-delete={"/students/assignments?id=" (id)} hx-swap="none" hx-confirm="Remove this student's pending assignments? Completed ones are kept." class="bg-yellow-700 hover:bg-yellow-800 px-2 py-1 rounded text-sm" {"Unassign Pending"}
                        button hx-delete={"/students?id=" (id)} hx-swap="none" hx-confirm="Delete this student and their assignments?" class="bg-red-700 hover:bg-red-800 px-2 py-1 rounded text-sm" {"Delete"}
                    }
                },
            ]
        })
        .collect();

    Ok(table(
        title("Students"),
        [
            "Name",
            "Registration Number",
            "ID",
            "Branch",
            "Email",
            "Active",
            "Available",
            "",
        ],
        rows,
    ))
}

#[derive(Deserialize)]
pub struct NewStudentForm {
    registration_number: String,
    external_id: String,
    name: String,
    branch: String,
    email: String,
}

pub async fn put_new_student(
    State(state): State<RosterState>,
    session: RosterSession,
    Form(NewStudentForm {
        registration_number,
        external_id,
        name,
        branch,
        email,
    }): Form<NewStudentForm>,
) -> RosterResult<Markup> {
    session.ensure_can(PermissionsTarget::CRUD_STUDENTS)?;

    let email = match non_empty(email) {
        Some(email) => Some(EmailAddress::from_str(&email).context(EmailSnafu)?),
        None => None,
    };

    let id = Student::insert_into_database(
        AddStudent {
            registration_number: registration_number.trim().to_string(),
            external_id: external_id.trim().to_string(),
            name: name.trim().to_string(),
            branch: non_empty(branch),
            email,
        },
        &mut *state.get_connection().await?,
    )
    .await?;
    state.send_change_event(ChangeEvent::Students);

    info!(%id, "Added student");
    Ok(notice("Student added"))
}

#[derive(Deserialize)]
pub struct StudentFlagQuery {
    id: uuid::Uuid,
    value: bool,
}

pub async fn internal_post_set_active(
    State(state): State<RosterState>,
    session: RosterSession,
    Query(StudentFlagQuery { id, value }): Query<StudentFlagQuery>,
) -> RosterResult<()> {
    session.ensure_can(PermissionsTarget::CRUD_STUDENTS)?;

    let found = Student::set_active(id, value, &mut *state.get_connection().await?).await?;
    snafu::ensure!(found, MissingStudentSnafu { id });
    state.send_change_event(ChangeEvent::Students);
    Ok(())
}

pub async fn internal_post_set_available(
    State(state): State<RosterState>,
    session: RosterSession,
    Query(StudentFlagQuery { id, value }): Query<StudentFlagQuery>,
) -> RosterResult<()> {
    session.ensure_can(PermissionsTarget::CRUD_STUDENTS)?;

    let found = Student::set_available(id, value, &mut *state.get_connection().await?).await?;
    snafu::ensure!(found, MissingStudentSnafu { id });
    state.send_change_event(ChangeEvent::Students);
    Ok(())
}

pub async fn delete_student(
    State(state): State<RosterState>,
    session: RosterSession,
    Query(IdForm { id }): Query<IdForm>,
) -> RosterResult<()> {
    session.ensure_can(PermissionsTarget::CRUD_STUDENTS)?;

    Student::remove_from_database(id, &mut *state.get_connection().await?).await?;
    state.send_change_event(ChangeEvent::Students);
    state.send_change_event(ChangeEvent::Assignments);
    Ok(())
}

pub async fn delete_student_assignments(
    State(state): State<RosterState>,
    session: RosterSession,
    Query(IdForm { id }): Query<IdForm>,
) -> RosterResult<()> {
    session.ensure_can(PermissionsTarget::RUN_DISTRIBUTION)?;

    let removed = Assignments::remove_pending_for_student(id, &mut *state.get_connection().await?).await?;
    state.send_change_event(ChangeEvent::Assignments);

    info!(%id, removed, "Unassigned pending visits from student");
    Ok(())
}
