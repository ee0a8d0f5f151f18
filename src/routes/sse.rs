use crate::state::RosterState;
use axum::{
    extract::State,
    response::{
        Sse,
        sse::{Event, KeepAlive},
    },
};
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Students,
    Beneficiaries,
    Assignments,
    Requests,
    Settings,
}

impl ChangeEvent {
    /// Name used for the SSE `event:` field, which htmx listens for as `sse:<name>`.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Students => "crud_students",
            Self::Beneficiaries => "crud_beneficiaries",
            Self::Assignments => "crud_assignments",
            Self::Requests => "crud_requests",
            Self::Settings => "crud_settings",
        }
    }
}

pub async fn sse_feed(
    State(state): State<RosterState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.subscribe_to_change_feed();

    //lagged receivers just skip what they missed, the next event reloads everything anyway
    let stream = BroadcastStream::new(rx).filter_map(|msg| async move {
        msg.ok()
            .map(|change| Ok(Event::default().event(change.name()).data("")))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_are_distinct() {
        let all = [
            ChangeEvent::Students,
            ChangeEvent::Beneficiaries,
            ChangeEvent::Assignments,
            ChangeEvent::Requests,
            ChangeEvent::Settings,
        ];
        let names: std::collections::HashSet<_> = all.iter().map(|e| e.name()).collect();
        assert_eq!(names.len(), all.len());
    }
}
