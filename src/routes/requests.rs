use crate::{
    auth::{AuthUtilities, PermissionsTarget, RosterSession},
    data::{
        assignment::Assignments,
        requests::{AssignmentRequest, RequestStatus, UnassignmentRequest},
    },
    distribution::manual_assign,
    error::{
        CommitTransactionSnafu, MissingRequestSnafu, RequestAlreadyResolvedSnafu, RosterError,
        RosterResult,
    },
    maud_conveniences::{notice, table, title},
    routes::sse::ChangeEvent,
    state::RosterState,
};
use axum::{
    Form,
    body::Body,
    extract::State,
    http::Response,
    response::{IntoResponse, Redirect},
};
use maud::{Markup, html};
use serde::Deserialize;
use snafu::{OptionExt, ResultExt, ensure};
use uuid::Uuid;

pub async fn get_requests(State(state): State<RosterState>, session: RosterSession) -> Response<Body> {
    if !session.can(PermissionsTarget::RESOLVE_REQUESTS) {
        return Redirect::to("/login?to=/requests").into_response();
    }

    state.render(session, html! {
        div hx-ext="sse" sse-connect="/sse_feed" class="mx-auto p-8 max-w-6xl w-full flex flex-col space-y-8" {
            div id="request_result" {}
            div id="pending_requests" hx-get="/internal/requests" hx-trigger="load, sse:crud_requests" {}
        }
    }).into_response()
}

fn resolve_buttons(kind: &'static str, id: Uuid) -> Markup {
    let id = id.to_string();
    html! {
        div class="flex space-x-2" {
            button hx-post={"/requests/" (kind) "/resolve"} hx-vals={"{\"id\": \"" (id) "\", \"decision\": \"approved\"}"} hx-target="#request_result" class="bg-green-700 hover:bg-green-800 px-2 py-1 rounded text-sm" {"Approve"}
            button hx-post={"/requests/" (kind) "/resolve"} hx-vals={"{\"id\": \"" (id) "\", \"decision\": \"rejected\"}"} hx-target="#request_result" class="bg-red-700 hover:bg-red-800 px-2 py-1 rounded text-sm" {"Reject"}
        }
    }
}

pub async fn internal_get_requests(
    State(state): State<RosterState>,
    session: RosterSession,
) -> RosterResult<Markup> {
    session.ensure_can(PermissionsTarget::RESOLVE_REQUESTS)?;

    let more = AssignmentRequest::get_pending(&state)
        .await?
        .into_iter()
        .map(|request| {
            [
                html! {(request.student_name)},
                html! {(request.requested_count)},
                html! {(request.event_tag)},
                html! {(request.created_at.date().to_string())},
                resolve_buttons("assignment", request.id),
            ]
        })
        .collect();

    let fewer = UnassignmentRequest::get_pending(&state)
        .await?
        .into_iter()
        .map(|request| {
            [
                html! {(request.student_name)},
                html! {(request.beneficiary_id)},
                html! {(request.reason.unwrap_or_default())},
                html! {(request.created_at.date().to_string())},
                resolve_buttons("unassignment", request.id),
            ]
        })
        .collect();

    Ok(html! {
        (table(
            title("Requests for More Visits"),
            ["Student", "Count", "Tag", "Sent", ""],
            more,
        ))
        br;
        (table(
            title("Requests to Unassign"),
            ["Student", "Beneficiary", "Reason", "Sent", ""],
            fewer,
        ))
    })
}

#[derive(Deserialize)]
pub struct ResolveForm {
    id: Uuid,
    decision: Decision,
}

#[derive(Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approved,
    Rejected,
}

impl From<Decision> for RequestStatus {
    fn from(value: Decision) -> Self {
        match value {
            Decision::Approved => Self::Approved,
            Decision::Rejected => Self::Rejected,
        }
    }
}

/// Whether a failed approval can be undone: anything but a distribution that got
/// some of its batches in.
fn nothing_was_assigned(error: &RosterError) -> bool {
    !matches!(error, RosterError::PartialAssignment { committed, .. } if *committed > 0)
}

pub async fn post_resolve_assignment_request(
    State(state): State<RosterState>,
    session: RosterSession,
    Form(ResolveForm { id, decision }): Form<ResolveForm>,
) -> RosterResult<Markup> {
    session.ensure_can(PermissionsTarget::RESOLVE_REQUESTS)?;

    let mut conn = state.get_connection().await?;
    let request = AssignmentRequest::get_by_id(id, &mut conn)
        .await?
        .context(MissingRequestSnafu { id })?;
    let next = RequestStatus::from(decision);
    ensure!(request.status.can_become(next), RequestAlreadyResolvedSnafu { id });

    //claim it first so a second approval can't hand out the same visits again
    let claimed = AssignmentRequest::resolve(id, next, &mut conn).await?;
    ensure!(claimed, RequestAlreadyResolvedSnafu { id });
    state.send_change_event(ChangeEvent::Requests);

    if next == RequestStatus::Rejected {
        info!(%id, status = %next, "Resolved assignment request");
        return Ok(notice(format!(
            "Rejected the request from {}",
            request.student_name
        )));
    }

    let cap = usize::try_from(request.requested_count).unwrap_or_default();
    let outcome = manual_assign(&[request.student_id], &request.event_tag, Some(cap), &state).await;
    state.send_change_event(ChangeEvent::Assignments);

    match outcome {
        Ok(outcome) => {
            info!(%id, status = %next, assigned = outcome.assigned, "Resolved assignment request");
            Ok(notice(format!(
                "Approved: {} assigned {} new visits",
                request.student_name, outcome.assigned
            )))
        }
        Err(e) => {
            if nothing_was_assigned(&e) {
                match AssignmentRequest::reopen(id, &mut conn).await {
                    Ok(_) => state.send_change_event(ChangeEvent::Requests),
                    Err(reopen_error) => {
                        warn!(%id, ?reopen_error, "Unable to reopen assignment request");
                    }
                }
            }
            Err(e)
        }
    }
}

pub async fn post_resolve_unassignment_request(
    State(state): State<RosterState>,
    session: RosterSession,
    Form(ResolveForm { id, decision }): Form<ResolveForm>,
) -> RosterResult<Markup> {
    session.ensure_can(PermissionsTarget::RESOLVE_REQUESTS)?;

    let mut tx = state.get_transaction().await?;
    let request = UnassignmentRequest::get_by_id(id, &mut tx)
        .await?
        .context(MissingRequestSnafu { id })?;
    let next = RequestStatus::from(decision);
    ensure!(request.status.can_become(next), RequestAlreadyResolvedSnafu { id });

    let resolved = UnassignmentRequest::resolve(id, next, &mut tx).await?;
    ensure!(resolved, RequestAlreadyResolvedSnafu { id });

    let removed = match (next, request.assignment_id) {
        (RequestStatus::Approved, Some(assignment_id)) => {
            Assignments::remove_pending(assignment_id, &mut tx).await?
        }
        _ => 0,
    };
    tx.commit().await.context(CommitTransactionSnafu)?;

    state.send_change_event(ChangeEvent::Requests);
    if removed > 0 {
        state.send_change_event(ChangeEvent::Assignments);
    }

    info!(%id, status = %next, removed, "Resolved unassignment request");
    Ok(notice(match next {
        RequestStatus::Approved if removed == 0 => format!(
            "Approved, but {} had already been visited or unassigned so nothing was removed",
            request.beneficiary_id
        ),
        RequestStatus::Approved => format!(
            "Approved: {} no longer visits {}",
            request.student_name, request.beneficiary_id
        ),
        _ => format!("Rejected the request from {}", request.student_name),
    }))
}

/// Used by the dashboard badge.
pub async fn pending_count(state: &RosterState) -> RosterResult<usize> {
    Ok(AssignmentRequest::get_pending(state).await?.len()
        + UnassignmentRequest::get_pending(state).await?.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde::de::value::{Error, MapDeserializer};

    fn decision_from(value: &str) -> Decision {
        #[derive(Deserialize)]
        struct ButtonValues {
            decision: Decision,
        }

        ButtonValues::deserialize(MapDeserializer::<_, Error>::new(
            [("decision", value)].into_iter(),
        ))
        .unwrap()
        .decision
    }

    #[test]
    fn decisions_come_from_the_button_values() {
        assert_eq!(decision_from("approved"), Decision::Approved);
        assert_eq!(decision_from("rejected"), Decision::Rejected);
    }

    #[test]
    fn every_decision_is_a_valid_transition_from_pending() {
        for decision in [Decision::Approved, Decision::Rejected] {
            assert!(RequestStatus::Pending.can_become(decision.into()));
        }
    }

    #[test]
    fn failed_approvals_reopen_unless_visits_went_out() {
        assert!(nothing_was_assigned(&RosterError::NoEligibleStudents));
        assert!(nothing_was_assigned(&RosterError::PartialAssignment {
            source: sqlx::Error::PoolTimedOut,
            committed: 0,
            total: 5,
        }));
        assert!(!nothing_was_assigned(&RosterError::PartialAssignment {
            source: sqlx::Error::PoolTimedOut,
            committed: 100,
            total: 150,
        }));
    }
}
