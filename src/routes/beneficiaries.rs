use crate::{
    auth::{AuthUtilities, PermissionsTarget, RosterSession},
    data::{
        DataType, ExternalIdForm, non_empty,
        assignment::Assignments,
        beneficiary::{Beneficiary, ContactDetails},
    },
    error::{MissingBeneficiarySnafu, MissingEventTagSnafu, RosterResult},
    maud_conveniences::{
        form_element, form_submit_button, notice, simple_form_element, subtitle, title,
    },
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
use snafu::{OptionExt, ensure};

pub async fn get_beneficiaries(
    State(state): State<RosterState>,
    session: RosterSession,
) -> RosterResult<Response<Body>> {
    if !session.can(PermissionsTarget::CRUD_BENEFICIARIES) {
        return Ok(Redirect::to("/login?to=/beneficiaries").into_response());
    }

    let tags = Assignments::get_event_tags(&state).await?;

    Ok(state.render(session, html! {
        div hx-ext="sse" sse-connect="/sse_feed" class="mx-auto p-8 max-w-6xl w-full flex flex-row space-x-8" {
            div id="all_beneficiaries" class="grow" hx-get="/internal/beneficiaries" hx-trigger="load, sse:crud_beneficiaries" {}
            div class="w-96 flex flex-col space-y-8" {
                div id="in_focus" {}
                (delete_by_tag_form(&tags))
            }
        }
    }).into_response())
}

fn delete_by_tag_form(tags: &[String]) -> Markup {
    html! {
        div class="bg-gray-800 p-8 rounded shadow-md" {
            (subtitle("Delete by Event"))
            p class="text-sm text-gray-400 mb-4" {"Permanently deletes every beneficiary assigned under the tag, along with their assignments."}
            form hx-post="/beneficiaries/delete_by_tag" hx-target="#in_focus" hx-confirm="Permanently delete every beneficiary for this event? This cannot be undone." {
                (form_element("event_tag", "Event Tag", html! {
                    select id="event_tag" name="event_tag" required class="shadow appearance-none border rounded w-full py-2 px-3 leading-tight focus:outline-none focus:shadow-outline bg-gray-700 border-gray-600" {
                        @for tag in tags {
                            option value=(tag) {(tag)}
                        }
                    }
                }))
                (form_submit_button(Some("Delete Beneficiaries")))
            }
        }
    }
}

pub async fn internal_get_beneficiaries(
    State(state): State<RosterState>,
    session: RosterSession,
) -> RosterResult<Markup> {
    session.ensure_can(PermissionsTarget::CRUD_BENEFICIARIES)?;

    let beneficiaries = Beneficiary::get_all(&state).await?;
    let count = beneficiaries.len();

    Ok(html! {
        (title(html!{"Beneficiaries (" (count) ")"}))
        form hx-post="/beneficiaries/bulk_delete" hx-target="#in_focus" hx-confirm="Delete the selected beneficiaries and any assignments they have?" {
            div class="overflow-x-auto" {
                table class="min-w-full bg-gray-800 rounded shadow-md" {
                    thead class="bg-gray-700" {
                        tr {
                            @for heading in ["", "ID", "Name", "Age", "Gender", "Group", "Phone", "Address", ""] {
                                th class="py-2 px-4 text-left font-semibold text-gray-300" {(heading)}
                            }
                        }
                    }
                    tbody {
                        @for beneficiary in beneficiaries {
                            tr class="border-b border-gray-600 text-gray-200" {
                                td class="py-2 px-4" {
                                    input type="checkbox" name="ids" value=(beneficiary.external_id);
                                }
                                td class="py-2 px-4" {(beneficiary.external_id)}
                                td class="py-2 px-4" {(beneficiary.name)}
                                td class="py-2 px-4" {
                                    @if let Some(age) = beneficiary.age {(age)}
                                }
                                td class="py-2 px-4" {(beneficiary.gender.unwrap_or_default())}
                                td class="py-2 px-4" {(beneficiary.group_tag.unwrap_or_default())}
                                td class="py-2 px-4" {(beneficiary.phone.unwrap_or_default())}
                                td class="py-2 px-4" {(beneficiary.address.unwrap_or_default())}
                                td class="py-2 px-4" {
                                    button type="button" name="id" value=(beneficiary.external_id) hx-get="/internal/beneficiaries/edit_contact" hx-target="#in_focus" class="bg-blue-600 hover:bg-blue-800 px-2 py-1 rounded text-sm" {"Edit Contact"}
                                }
                            }
                        }
                    }
                }
            }
            div class="mt-4" {
                button type="submit" class="bg-red-700 hover:bg-red-800 font-bold py-2 px-4 rounded" {"Delete Selected"}
            }
        }
    })
}

pub async fn internal_get_edit_contact(
    State(state): State<RosterState>,
    session: RosterSession,
    Query(ExternalIdForm { id }): Query<ExternalIdForm>,
) -> RosterResult<Markup> {
    session.ensure_can(PermissionsTarget::CRUD_BENEFICIARIES)?;

    let beneficiary = Beneficiary::get_from_db_by_id(id.clone(), &mut *state.get_connection().await?)
        .await?
        .context(MissingBeneficiarySnafu { id })?;

    Ok(html! {
        div class="bg-gray-800 p-8 rounded shadow-md" {
            (subtitle(html!{"Contact for " (beneficiary.name)}))
            form hx-post="/internal/beneficiaries/edit_contact" hx-target="#in_focus" {
                input type="hidden" name="id" value=(beneficiary.external_id);
                (simple_form_element("phone", "Phone", false, Some("tel"), beneficiary.phone.as_deref()))
                (simple_form_element("address", "Address", false, None, beneficiary.address.as_deref()))
                (form_submit_button(Some("Save")))
            }
        }
    })
}

#[derive(Deserialize)]
pub struct EditContactForm {
    id: String,
    phone: String,
    address: String,
}

pub async fn internal_post_edit_contact(
    State(state): State<RosterState>,
    session: RosterSession,
    Form(EditContactForm { id, phone, address }): Form<EditContactForm>,
) -> RosterResult<Markup> {
    session.ensure_can(PermissionsTarget::CRUD_BENEFICIARIES)?;

    let updated = Beneficiary::update_contact(
        &id,
        ContactDetails {
            phone: non_empty(phone),
            address: non_empty(address),
        },
        &mut *state.get_connection().await?,
    )
    .await?;
    snafu::ensure!(updated, MissingBeneficiarySnafu { id });

    state.send_change_event(ChangeEvent::Beneficiaries);
    Ok(notice("Contact details saved"))
}

/// Checkbox forms send the same key once per ticked box.
pub fn values_for<'a>(pairs: &'a [(String, String)], key: &'a str) -> impl Iterator<Item = &'a str> {
    pairs
        .iter()
        .filter(move |(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

pub async fn post_bulk_delete(
    State(state): State<RosterState>,
    session: RosterSession,
    Form(pairs): Form<Vec<(String, String)>>,
) -> RosterResult<Markup> {
    session.ensure_can(PermissionsTarget::CRUD_BENEFICIARIES)?;

    let ids: Vec<String> = values_for(&pairs, "ids").map(ToString::to_string).collect();
    if ids.is_empty() {
        return Ok(notice("No beneficiaries were selected"));
    }

    let removed = Beneficiary::remove_many(&ids, &mut *state.get_connection().await?).await?;
    state.send_change_event(ChangeEvent::Beneficiaries);
    state.send_change_event(ChangeEvent::Assignments);

    info!(removed, "Bulk deleted beneficiaries");
    Ok(notice(html! {"Deleted " (removed) " beneficiaries"}))
}

#[derive(Deserialize)]
pub struct DeleteByTagForm {
    event_tag: String,
}

pub async fn post_delete_by_tag(
    State(state): State<RosterState>,
    session: RosterSession,
    Form(DeleteByTagForm { event_tag }): Form<DeleteByTagForm>,
) -> RosterResult<Markup> {
    session.ensure_can(PermissionsTarget::CRUD_BENEFICIARIES)?;

    let event_tag = event_tag.trim();
    ensure!(!event_tag.is_empty(), MissingEventTagSnafu);

    let removed = Beneficiary::remove_for_tag(event_tag, &mut *state.get_connection().await?).await?;
    state.send_change_event(ChangeEvent::Beneficiaries);
    state.send_change_event(ChangeEvent::Assignments);

    warn!(removed, event_tag, "Deleted beneficiaries by event");
    Ok(notice(html! {"Deleted " (removed) " beneficiaries for " (event_tag)}))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_checkbox_keys_are_collected() {
        let pairs = vec![
            ("ids".to_string(), "B-1".to_string()),
            ("other".to_string(), "x".to_string()),
            ("ids".to_string(), "B-7".to_string()),
        ];
        assert_eq!(values_for(&pairs, "ids").collect::<Vec<_>>(), ["B-1", "B-7"]);
        assert_eq!(values_for(&pairs, "missing").count(), 0);
    }

    #[test]
    fn tag_deletion_offers_every_tag_and_asks_first() {
        let markup = delete_by_tag_form(&["Urs 1447".to_string(), "Ramadan".to_string()]).into_string();
        assert!(markup.contains(r#"<option value="Urs 1447">Urs 1447</option>"#));
        assert!(markup.contains(r#"<option value="Ramadan">Ramadan</option>"#));
        assert!(markup.contains("hx-confirm"));
        assert!(markup.contains("/beneficiaries/delete_by_tag"));
    }
}
