use crate::{
    auth::{AuthUtilities, PermissionsTarget, RosterSession},
    data::{
        beneficiary::{AddBeneficiary, Beneficiary},
        student::{AddStudent, Student},
    },
    error::{MultipartSnafu, RosterError, RosterResult},
    import::{
        CsvBeneficiary, CsvStudent, ImportPlan, Importable, decode_draft, encode_draft, plan,
        read_csv, student_keys,
    },
    maud_conveniences::{errors_list, form_submit_button, notice, table, title},
    routes::sse::ChangeEvent,
    state::RosterState,
};
use axum::{
    Form,
    body::Body,
    extract::{Multipart, State},
    http::Response,
    response::{IntoResponse, Redirect},
};
use maud::{Markup, html};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use sqlx::{Pool, Postgres};
use std::collections::HashSet;

pub async fn get_import_page(State(state): State<RosterState>, session: RosterSession) -> Response<Body> {
    if !session.can(PermissionsTarget::IMPORT_CSVS) {
        return Redirect::to("/login?to=/import").into_response();
    }

    state.render(session, html! {
        div class="mx-auto flex flex-row justify-center p-2 m-2 rounded gap-x-8" {
            div class="rounded shadow-xl flex flex-col p-4 m-2 bg-gray-800 max-w-lg" {
                div id="import_beneficiaries_form" {
                    (table(
                        title("Beneficiaries"),
                        ["Column", "Example", "Required"],
                        vec![
                            ["external_id", "B-0042", "✅"],
                            ["name", "Fatima Haddad", "✅"],
                            ["age", "71", "❌"],
                            ["gender", "F", "❌"],
                            ["group_tag", "North", "❌"],
                            ["phone", "0501234567", "❌"],
                            ["address", "12 Cedar Street", "❌"],
                        ]
                    ))
                    br;
                    (upload_form("/import/beneficiaries", "#import_beneficiaries_form", "beneficiaries_csv", "Upload Beneficiaries CSV"))
                }
            }

            div class="rounded shadow-xl flex flex-col p-4 m-2 bg-gray-800 max-w-lg" {
                div id="import_students_form" {
                    (table(
                        title("Students"),
                        ["Column", "Example", "Required"],
                        vec![
                            ["registration_number", "2024-118", "✅"],
                            ["external_id", "S-118", "✅"],
                            ["name", "Amal Rahman", "✅"],
                            ["branch", "Science", "❌"],
                            ["email", "amal@example.org", "❌"],
                        ]
                    ))
                    p class="italic" {"Students already present by either identifier are skipped."}
                    br;
                    (upload_form("/import/students", "#import_students_form", "students_csv", "Upload Students CSV"))
                }
            }
        }
    }).into_response()
}

fn upload_form(
    action: &'static str,
    target: &'static str,
    field: &'static str,
    label: &'static str,
) -> Markup {
    html! {
        form hx-put=(action) hx-swap="innerHTML" hx-target=(target) hx-encoding="multipart/form-data" {
            label for=(field) class="block text-sm font-medium text-gray-400 mb-2" {(label)}
            input type="file" name=(field) id=(field) accept=".csv" required
                class="block w-full text-sm text-gray-300 file:mr-4 file:py-2 file:px-4 file:rounded file:border-0 file:text-sm file:font-semibold file:bg-violet-50 file:text-violet-700 hover:file:bg-violet-100 mb-4";
            (form_submit_button(Some("Check File")))
        }
    }
}

/// Concatenates every uploaded file, then splits them back into parsed rows and syntax errors.
async fn read_upload<T: serde::de::DeserializeOwned>(
    mut multipart: Multipart,
) -> RosterResult<(Vec<T>, Vec<String>)> {
    let mut rows = vec![];
    let mut syntax_errors = vec![];

    while let Some(field) = multipart.next_field().await.context(MultipartSnafu)? {
        let bytes = field.bytes().await.context(MultipartSnafu)?;
        let (mut these_rows, these_errors) = read_csv(bytes.as_ref());
        rows.append(&mut these_rows);
        syntax_errors.extend(these_errors);
    }

    Ok((rows, syntax_errors))
}

fn preview<T: Serialize>(
    plan: &ImportPlan<T>,
    what: &'static str,
    confirm_action: &'static str,
    target: &'static str,
) -> RosterResult<Markup> {
    let draft = encode_draft(&plan.fresh)?;

    Ok(html! {
        (table(
            title("Import Preview"),
            ["", "Rows"],
            [
                ("Ready to import", plan.fresh.len()),
                ("Missing required fields", plan.invalid),
                ("Repeated within the file", plan.in_batch_duplicates),
                ("Already present", plan.already_present),
            ]
            .into_iter()
            .map(|(label, count)| [label.to_string(), count.to_string()])
            .collect()
        ))
        br;
        @if plan.fresh.is_empty() {
            (notice(html!{"No new " (what) " to import"}))
        } @else {
            form hx-put=(confirm_action) hx-swap="innerHTML" hx-target=(target) {
                input type="hidden" name="draft" value=(draft);
                (form_submit_button(Some("Confirm Import")))
            }
        }
    })
}

fn syntax_errors_list(syntax_errors: Vec<String>) -> Markup {
    errors_list(
        Some("The following syntax errors were found in your CSV:"),
        syntax_errors.into_iter(),
    )
}

async fn existing_student_keys(pool: &Pool<Postgres>) -> RosterResult<HashSet<String>> {
    Ok(Student::get_all_identifiers(pool)
        .await?
        .into_iter()
        .flat_map(|(registration_number, external_id)| {
            student_keys(&registration_number, &external_id)
        })
        .collect())
}

pub async fn put_import_beneficiaries(
    State(state): State<RosterState>,
    session: RosterSession,
    multipart: Multipart,
) -> RosterResult<Markup> {
    session.ensure_can(PermissionsTarget::IMPORT_CSVS)?;

    let (rows, syntax_errors) = read_upload::<CsvBeneficiary>(multipart).await?;
    if !syntax_errors.is_empty() {
        return Ok(syntax_errors_list(syntax_errors));
    }

    let existing = Beneficiary::get_existing_ids(&state).await?;
    let plan = plan(rows.into_iter().map(CsvBeneficiary::into_candidate), &existing);

    preview(
        &plan,
        "beneficiaries",
        "/import/beneficiaries/confirm",
        "#import_beneficiaries_form",
    )
}

pub async fn put_import_students(
    State(state): State<RosterState>,
    session: RosterSession,
    multipart: Multipart,
) -> RosterResult<Markup> {
    session.ensure_can(PermissionsTarget::IMPORT_CSVS)?;

    let (rows, syntax_errors) = read_upload::<CsvStudent>(multipart).await?;
    if !syntax_errors.is_empty() {
        return Ok(syntax_errors_list(syntax_errors));
    }

    let existing = existing_student_keys(&state).await?;
    let plan = plan(rows.into_iter().map(CsvStudent::into_candidate), &existing);

    preview(&plan, "students", "/import/students/confirm", "#import_students_form")
}

#[derive(Deserialize)]
pub struct ConfirmImportForm {
    draft: String,
}

/// The draft is checked again from scratch: rows missing required fields are dropped,
/// as are rows that reached the database since the preview.
fn still_fresh<T: Importable>(draft: Vec<T>, existing: &HashSet<String>) -> Vec<T> {
    plan(draft.into_iter().map(Importable::checked), existing).fresh
}

fn import_outcome(result: RosterResult<usize>, what: &'static str) -> RosterResult<Markup> {
    match result {
        Ok(committed) => {
            info!(committed, what, "Imported rows");
            Ok(notice(html! {"Imported " (committed) " " (what)}))
        }
        Err(e @ RosterError::PartialImport { .. }) => {
            warn!(?e, "Import stopped part-way through");
            Ok(errors_list(Some("The import stopped early"), std::iter::once(e.to_string())))
        }
        Err(e) => Err(e),
    }
}

pub async fn put_confirm_beneficiaries(
    State(state): State<RosterState>,
    session: RosterSession,
    Form(ConfirmImportForm { draft }): Form<ConfirmImportForm>,
) -> RosterResult<Markup> {
    session.ensure_can(PermissionsTarget::IMPORT_CSVS)?;

    let draft: Vec<AddBeneficiary> = decode_draft(&draft)?;
    let fresh = still_fresh(draft, &Beneficiary::get_existing_ids(&state).await?);

    let result = Beneficiary::insert_batches(fresh, &state).await;
    state.send_change_event(ChangeEvent::Beneficiaries);

    import_outcome(result, "beneficiaries")
}

pub async fn put_confirm_students(
    State(state): State<RosterState>,
    session: RosterSession,
    Form(ConfirmImportForm { draft }): Form<ConfirmImportForm>,
) -> RosterResult<Markup> {
    session.ensure_can(PermissionsTarget::IMPORT_CSVS)?;

    let draft: Vec<AddStudent> = decode_draft(&draft)?;
    let fresh = still_fresh(draft, &existing_student_keys(&state).await?);

    let result = Student::insert_batches(fresh, &state).await;
    state.send_change_event(ChangeEvent::Students);

    import_outcome(result, "students")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn beneficiary(id: &str) -> AddBeneficiary {
        AddBeneficiary {
            external_id: id.into(),
            name: format!("Name of {id}"),
            age: None,
            gender: None,
            group_tag: None,
            phone: None,
            address: None,
        }
    }

    #[test]
    fn confirmation_skips_rows_imported_in_the_meantime() {
        let existing: HashSet<String> = ["B-2".to_string()].into_iter().collect();
        let fresh = still_fresh(vec![beneficiary("B-1"), beneficiary("B-2")], &existing);
        assert_eq!(fresh, vec![beneficiary("B-1")]);
    }

    #[test]
    fn edited_drafts_lose_rows_missing_required_fields() {
        let mut blank_name = beneficiary("B-3");
        blank_name.name = "  ".into();
        let blank_id = beneficiary("");

        let sent = encode_draft(&[beneficiary("B-1"), blank_name, blank_id]).unwrap();
        let draft: Vec<AddBeneficiary> = decode_draft(&sent).unwrap();
        assert_eq!(still_fresh(draft, &HashSet::new()), vec![beneficiary("B-1")]);

        let nameless = AddStudent {
            registration_number: "R-1".into(),
            external_id: "S-1".into(),
            name: String::new(),
            branch: None,
            email: None,
        };
        assert!(still_fresh(vec![nameless], &HashSet::new()).is_empty());
    }

    #[test]
    fn partial_imports_are_shown_not_raised() {
        let outcome = import_outcome(
            Err(RosterError::PartialImport {
                source: sqlx::Error::RowNotFound,
                what: "students",
                committed: 200,
                total: 250,
            }),
            "students",
        )
        .unwrap()
        .into_string();
        assert!(outcome.contains("after 200 of 250"));

        assert!(import_outcome(Err(RosterError::NoEligibleStudents), "students").is_err());
    }

    #[test]
    fn empty_plans_offer_no_confirmation() {
        let plan: ImportPlan<AddBeneficiary> = ImportPlan {
            fresh: vec![],
            invalid: 2,
            in_batch_duplicates: 0,
            already_present: 5,
        };
        let markup = preview(&plan, "beneficiaries", "/confirm", "#t").unwrap().into_string();
        assert!(markup.contains("No new beneficiaries"));
        assert!(!markup.contains("Confirm Import"));
    }
}
