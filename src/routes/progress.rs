use crate::{
    auth::{AuthUtilities, PermissionsTarget, RosterSession},
    data::{DataType, assignment::Assignments, student::Student},
    error::RosterResult,
    maud_conveniences::{subtitle, table, title},
    progress::{Progress, Tally, aggregate},
    state::RosterState,
};
use axum::{
    body::Body,
    extract::State,
    http::Response,
    response::{IntoResponse, Redirect},
};
use maud::{Markup, html};

pub async fn get_progress(State(state): State<RosterState>, session: RosterSession) -> Response<Body> {
    if !session.can(PermissionsTarget::VIEW_PROGRESS) {
        return Redirect::to("/login?to=/progress").into_response();
    }

    state.render(session, html! {
        div hx-ext="sse" sse-connect="/sse_feed" class="mx-auto p-8 max-w-6xl w-full" {
            div id="progress" hx-get="/internal/progress" hx-trigger="load, sse:crud_assignments, sse:crud_students" {}
        }
    }).into_response()
}

pub fn progress_bar(tally: &Tally) -> Markup {
    let percentage = tally.percentage();
    html! {
        div class="flex items-center space-x-2" {
            div class="w-32 bg-gray-700 rounded h-2" {
                div class="bg-green-500 h-2 rounded" style={"width: " (percentage) "%"} {}
            }
            span class="text-sm" {(percentage) "%"}
        }
    }
}

fn tally_cells(label: String, tally: &Tally) -> [Markup; 5] {
    [
        html! {(label)},
        html! {(tally.total)},
        html! {(tally.completed)},
        html! {(tally.pending())},
        progress_bar(tally),
    ]
}

pub fn render_progress(progress: &Progress) -> Markup {
    let by_tag = progress
        .by_tag
        .iter()
        .map(|(tag, tally)| tally_cells(tag.clone(), tally))
        .collect();
    let by_student = progress
        .by_student
        .iter()
        .map(|student| tally_cells(student.student_name.clone(), &student.tally))
        .collect();

    html! {
        (title("Progress"))
        div class="bg-gray-800 p-4 rounded shadow-md mb-8" {
            p class="text-lg" {
                (progress.overall.completed) " of " (progress.overall.total) " visits done"
            }
            (progress_bar(&progress.overall))
        }
        (table(subtitle("By Event"), ["Tag", "Total", "Done", "Pending", ""], by_tag))
        br;
        (table(subtitle("By Student"), ["Student", "Total", "Done", "Pending", ""], by_student))
    }
}

pub async fn internal_get_progress(
    State(state): State<RosterState>,
    session: RosterSession,
) -> RosterResult<Markup> {
    session.ensure_can(PermissionsTarget::VIEW_PROGRESS)?;

    let assignments = Assignments::get_all(&state).await?;
    let students = Student::get_all(&state).await?;
    Ok(render_progress(&aggregate(&assignments, &students)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_progress_still_renders() {
        let markup = render_progress(&Progress::default()).into_string();
        assert!(markup.contains("0 of 0 visits done"));
        assert!(markup.contains("width: 0%"));
    }

    #[test]
    fn bars_show_the_rounded_percentage() {
        let markup = progress_bar(&Tally {
            total: 3,
            completed: 1,
        })
        .into_string();
        assert!(markup.contains("33.3%"));
    }
}
