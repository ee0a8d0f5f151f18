use crate::{
    auth::{RosterSession, RosterUser},
    data::{DataType, assignment::Assignments, beneficiary::Beneficiary, student::Student},
    error::RosterResult,
    progress::aggregate,
    routes::{progress::progress_bar, requests::pending_count},
    state::RosterState,
};
use axum::{
    body::Body,
    extract::State,
    http::Response,
    response::{IntoResponse, Redirect},
};
use maud::{Markup, html};

fn stat(label: &'static str, value: usize, href: &'static str) -> Markup {
    html! {
        a href=(href) class="bg-gray-800 hover:bg-gray-700 p-6 rounded shadow-md flex flex-col items-center w-48" {
            span class="text-3xl font-bold" {(value)}
            span class="text-gray-400" {(label)}
        }
    }
}

pub async fn get_index_route(
    State(state): State<RosterState>,
    session: RosterSession,
) -> RosterResult<Response<Body>> {
    match session.user.as_ref() {
        None => return Ok(Redirect::to("/login").into_response()),
        Some(RosterUser::Student(_)) => return Ok(Redirect::to("/my_visits").into_response()),
        Some(RosterUser::Admin(_)) => {}
    }

    let students = Student::get_all(&state).await?;
    let active = students.iter().filter(|s| s.active).count();
    let beneficiaries = Beneficiary::get_all_ids(&state).await?.len();
    let progress = aggregate(&Assignments::get_all(&state).await?, &students);
    let unassigned = beneficiaries.saturating_sub(progress.overall.total);
    let pending_requests = pending_count(&state).await?;

    Ok(state.render(session, html! {
        div class="mx-auto p-8 max-w-5xl w-full flex flex-col space-y-8" {
            h1 class="text-2xl font-semibold text-center" {"Visit Roster"}

            div class="flex flex-row flex-wrap gap-4 justify-center" {
                (stat("Active Students", active, "/students"))
                (stat("Beneficiaries", beneficiaries, "/beneficiaries"))
                (stat("Unassigned", unassigned, "/assignments"))
                (stat("Pending Requests", pending_requests, "/requests"))
            }

            a href="/progress" class="bg-gray-800 hover:bg-gray-700 p-6 rounded shadow-md block" {
                p class="mb-2" {(progress.overall.completed) " of " (progress.overall.total) " visits done"}
                (progress_bar(&progress.overall))
            }
        }
    }).into_response())
}
