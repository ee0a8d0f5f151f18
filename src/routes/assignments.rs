use crate::{
    auth::{AuthUtilities, PermissionsTarget, RosterSession},
    data::{
        DataType, IdForm,
        assignment::{AssignmentStatus, Assignments},
        setting::{Setting, SettingKey},
        student::Student,
    },
    distribution::{DistributionOutcome, auto_assign, manual_assign},
    error::{MissingEventTagSnafu, RosterResult},
    maud_conveniences::{form_element, form_submit_button, notice, simple_form_element, subtitle, table, title},
    routes::{beneficiaries::values_for, sse::ChangeEvent},
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
use snafu::ensure;
use uuid::Uuid;

pub async fn get_assignments(
    State(state): State<RosterState>,
    session: RosterSession,
) -> RosterResult<Response<Body>> {
    if !session.can(PermissionsTarget::RUN_DISTRIBUTION) {
        return Ok(Redirect::to("/login?to=/assignments").into_response());
    }

    let current_tag = Setting::get(SettingKey::CurrentEventTag, &mut *state.get_connection().await?).await?;
    let students = Student::get_all(&state).await?;
    let tags = Assignments::get_event_tags(&state).await?;

    Ok(state.render(session, html! {
        div hx-ext="sse" sse-connect="/sse_feed" class="mx-auto p-8 max-w-6xl w-full flex flex-col space-y-8" {
            div id="distribution_result" {}

            div class="flex flex-row gap-x-8" {
                div class="bg-gray-800 p-8 rounded shadow-md w-96" {
                    (subtitle("Automatic"))
                    p class="text-sm text-gray-400 mb-4" {"Spreads every unassigned beneficiary across all active students."}
                    form hx-post="/assignments/auto" hx-target="#distribution_result" {
                        (simple_form_element("event_tag", "Event Tag", true, None, Some(&current_tag)))
                        (simple_form_element("cap", "Maximum to assign (optional)", false, Some("number"), None))
                        (form_submit_button(Some("Distribute")))
                    }
                }

                div class="bg-gray-800 p-8 rounded shadow-md w-96" {
                    (subtitle("Manual"))
                    form hx-post="/assignments/manual" hx-target="#distribution_result" {
                        (simple_form_element("event_tag", "Event Tag", true, None, Some(&current_tag)))
                        (simple_form_element("cap", "Maximum to assign (optional)", false, Some("number"), None))
                        (form_element("students", "Students", html! {
                            div class="max-h-64 overflow-y-auto bg-gray-700 rounded p-2" {
                                @for student in students.iter().filter(|s| s.active) {
                                    label class="block" {
                                        input type="checkbox" name="students" value=(student.id.to_string()) checked[student.available] class="mr-2";
                                        (student.name) " (" (student.registration_number) ")"
                                        @if !student.available {
                                            span class="text-yellow-400 text-sm" {" unavailable"}
                                        }
                                    }
                                }
                            }
                        }))
                        (form_submit_button(Some("Assign to Selected")))
                    }
                }

                div class="bg-gray-800 p-8 rounded shadow-md w-96" {
                    (subtitle("Unassign by Tag"))
                    p class="text-sm text-gray-400 mb-4" {"Only pending visits are removed, completed ones are kept."}
                    form hx-post="/assignments/unassign_tag" hx-target="#distribution_result" hx-confirm="Remove every pending assignment with this tag? Completed ones are kept." {
                        (form_element("event_tag", "Event Tag", html! {
                            select id="event_tag" name="event_tag" required class="shadow appearance-none border rounded w-full py-2 px-3 leading-tight focus:outline-none focus:shadow-outline bg-gray-700 border-gray-600" {
                                @for tag in tags {
                                    option value=(tag) {(tag)}
                                }
                            }
                        }))
                        (form_submit_button(Some("Unassign")))
                    }
                }
            }

            div id="all_assignments" hx-get="/internal/assignments" hx-trigger="load, sse:crud_assignments" {}
        }
    }).into_response())
}

pub async fn internal_get_assignments(
    State(state): State<RosterState>,
    session: RosterSession,
) -> RosterResult<Markup> {
    session.ensure_can(PermissionsTarget::RUN_DISTRIBUTION)?;

    let rows = Assignments::get_all(&state)
        .await?
        .into_iter()
        .map(|assignment| {
            let completed_at = assignment
                .completed_at
                .map(|at| at.date().to_string())
                .unwrap_or_default();
            [
                html! {(assignment.event_tag)},
                html! {(assignment.student_name)},
                html! {(assignment.beneficiary_name) " (" (assignment.beneficiary_id) ")"},
                html! {
                    @if assignment.status == AssignmentStatus::Completed {
                        span class="text-green-400" {"Completed"}
                    } @else {
                        span class="text-yellow-400" {"Pending"}
                    }
                },
                html! {(completed_at)},
                html! {
                    button hx-delete={"/assignments?id=" (assignment.id.to_string())} hx-swap="none" class="bg-red-700 hover:bg-red-800 px-2 py-1 rounded text-sm" {"Unassign"}
                },
            ]
        })
        .collect();

    Ok(table(
        title("Assignments"),
        ["Tag", "Student", "Beneficiary", "Status", "Completed", ""],
        rows,
    ))
}

/// Blank means no cap; anything that isn't a non-negative integer is ignored too.
fn parse_cap(cap: Option<&str>) -> Option<usize> {
    cap.map(str::trim)
        .filter(|c| !c.is_empty())
        .and_then(|c| c.parse().ok())
}

fn outcome_notice(outcome: DistributionOutcome) -> Markup {
    notice(html! {
        "Assigned " (outcome.assigned) " beneficiaries across " (outcome.students) " students. "
        (outcome.left_unassigned) " remain unassigned."
    })
}

#[derive(Deserialize)]
pub struct AutoAssignForm {
    event_tag: String,
    cap: Option<String>,
}

pub async fn post_auto_assign(
    State(state): State<RosterState>,
    session: RosterSession,
    Form(AutoAssignForm { event_tag, cap }): Form<AutoAssignForm>,
) -> RosterResult<Markup> {
    session.ensure_can(PermissionsTarget::RUN_DISTRIBUTION)?;

    let outcome = auto_assign(&event_tag, parse_cap(cap.as_deref()), &state).await;
    //partial batches may have landed even on failure
    state.send_change_event(ChangeEvent::Assignments);

    Ok(outcome_notice(outcome?))
}

pub async fn post_manual_assign(
    State(state): State<RosterState>,
    session: RosterSession,
    Form(pairs): Form<Vec<(String, String)>>,
) -> RosterResult<Markup> {
    session.ensure_can(PermissionsTarget::RUN_DISTRIBUTION)?;

    let student_ids: Vec<Uuid> = values_for(&pairs, "students")
        .filter_map(|id| Uuid::parse_str(id).ok())
        .collect();
    let event_tag = values_for(&pairs, "event_tag").next().unwrap_or_default();
    let cap = parse_cap(values_for(&pairs, "cap").next());

    let outcome = manual_assign(&student_ids, event_tag, cap, &state).await;
    state.send_change_event(ChangeEvent::Assignments);

    Ok(outcome_notice(outcome?))
}

pub async fn delete_assignment(
    State(state): State<RosterState>,
    session: RosterSession,
    Query(IdForm { id }): Query<IdForm>,
) -> RosterResult<()> {
    session.ensure_can(PermissionsTarget::RUN_DISTRIBUTION)?;

    Assignments::remove(id, &mut *state.get_connection().await?).await?;
    state.send_change_event(ChangeEvent::Assignments);
    Ok(())
}

#[derive(Deserialize)]
pub struct UnassignTagForm {
    event_tag: String,
}

pub async fn post_unassign_tag(
    State(state): State<RosterState>,
    session: RosterSession,
    Form(UnassignTagForm { event_tag }): Form<UnassignTagForm>,
) -> RosterResult<Markup> {
    session.ensure_can(PermissionsTarget::RUN_DISTRIBUTION)?;

    let event_tag = event_tag.trim();
    ensure!(!event_tag.is_empty(), MissingEventTagSnafu);

    let removed = Assignments::remove_pending_for_tag(event_tag, &mut *state.get_connection().await?).await?;
    state.send_change_event(ChangeEvent::Assignments);

    info!(removed, event_tag, "Unassigned by tag");
    Ok(notice(html! {"Removed " (removed) " pending assignments tagged " (event_tag)}))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_are_optional() {
        assert_eq!(parse_cap(None), None);
        assert_eq!(parse_cap(Some("")), None);
        assert_eq!(parse_cap(Some(" 25 ")), Some(25));
        assert_eq!(parse_cap(Some("-3")), None);
        assert_eq!(parse_cap(Some("lots")), None);
    }

    #[test]
    fn outcomes_report_what_is_left() {
        let markup = outcome_notice(DistributionOutcome {
            assigned: 12,
            students: 4,
            left_unassigned: 3,
        })
        .into_string();
        assert!(markup.contains("Assigned 12 beneficiaries across 4 students."));
        assert!(markup.contains("3 remain unassigned."));
    }
}
