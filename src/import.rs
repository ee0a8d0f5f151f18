//! Turns uploaded CSV rows into records that are safe to insert: rows missing
//! required fields are dropped, repeats within the upload keep the first copy,
//! and anything already in the database is skipped.

use crate::{
    data::{beneficiary::AddBeneficiary, non_empty, student::AddStudent},
    error::{B64Snafu, CsvSnafu, RmpSerdeDecodeSnafu, RmpSerdeEncodeSnafu, RosterResult},
};
use base64::{Engine, prelude::BASE64_URL_SAFE};
use email_address::EmailAddress;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use snafu::ResultExt;
use std::{collections::HashSet, str::FromStr};

/// Something with one or more identifiers that must be unique.
pub trait Importable: Sized {
    fn dedup_keys(&self) -> Vec<String>;

    fn has_required_fields(&self) -> bool;

    /// For rows that come back from the client, which may have been edited on the way.
    fn checked(self) -> Option<Self> {
        self.has_required_fields().then_some(self)
    }
}

fn filled(field: &str) -> bool {
    !field.trim().is_empty()
}

impl Importable for AddBeneficiary {
    fn dedup_keys(&self) -> Vec<String> {
        vec![self.external_id.clone()]
    }

    fn has_required_fields(&self) -> bool {
        filled(&self.external_id) && filled(&self.name)
    }
}

impl Importable for AddStudent {
    fn dedup_keys(&self) -> Vec<String> {
        student_keys(&self.registration_number, &self.external_id).to_vec()
    }

    fn has_required_fields(&self) -> bool {
        filled(&self.registration_number) && filled(&self.external_id) && filled(&self.name)
    }
}

/// Keys for both of a student's unique columns, namespaced so the two can't collide.
pub fn student_keys(registration_number: &str, external_id: &str) -> [String; 2] {
    [
        format!("reg:{registration_number}"),
        format!("ext:{external_id}"),
    ]
}

#[derive(Debug, PartialEq, Eq)]
pub struct ImportPlan<T> {
    pub fresh: Vec<T>,
    pub invalid: usize,
    pub in_batch_duplicates: usize,
    pub already_present: usize,
}

/// `None` candidates are rows that failed their required-field checks.
pub fn plan<T: Importable>(
    candidates: impl IntoIterator<Item = Option<T>>,
    existing: &HashSet<String>,
) -> ImportPlan<T> {
    let mut plan = ImportPlan {
        fresh: vec![],
        invalid: 0,
        in_batch_duplicates: 0,
        already_present: 0,
    };
    let mut seen = HashSet::new();

    for candidate in candidates {
        let Some(candidate) = candidate else {
            plan.invalid += 1;
            continue;
        };

        let keys = candidate.dedup_keys();
        if keys.iter().any(|key| seen.contains(key)) {
            plan.in_batch_duplicates += 1;
            continue;
        }
        seen.extend(keys.iter().cloned());

        if keys.iter().any(|key| existing.contains(key)) {
            plan.already_present += 1;
            continue;
        }

        plan.fresh.push(candidate);
    }

    plan
}

#[derive(Debug, Deserialize)]
pub struct CsvBeneficiary {
    external_id: Option<String>,
    name: Option<String>,
    age: Option<String>,
    gender: Option<String>,
    group_tag: Option<String>,
    phone: Option<String>,
    address: Option<String>,
}

impl CsvBeneficiary {
    pub fn into_candidate(self) -> Option<AddBeneficiary> {
        let external_id = self.external_id.and_then(non_empty)?;
        let name = self.name.and_then(non_empty)?;
        let age = match self.age.and_then(non_empty) {
            Some(age) => Some(age.parse().ok()?),
            None => None,
        };

        Some(AddBeneficiary {
            external_id,
            name,
            age,
            gender: self.gender.and_then(non_empty),
            group_tag: self.group_tag.and_then(non_empty),
            phone: self.phone.and_then(non_empty),
            address: self.address.and_then(non_empty),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CsvStudent {
    registration_number: Option<String>,
    external_id: Option<String>,
    name: Option<String>,
    branch: Option<String>,
    email: Option<String>,
}

impl CsvStudent {
    pub fn into_candidate(self) -> Option<AddStudent> {
        let registration_number = self.registration_number.and_then(non_empty)?;
        let external_id = self.external_id.and_then(non_empty)?;
        let name = self.name.and_then(non_empty)?;
        let email = match self.email.and_then(non_empty) {
            Some(email) => Some(EmailAddress::from_str(&email).ok()?),
            None => None,
        };

        Some(AddStudent {
            registration_number,
            external_id,
            name,
            branch: self.branch.and_then(non_empty),
            email,
        })
    }
}

/// Reads every record, keeping syntax errors separate from the parsed rows.
pub fn read_csv<T: DeserializeOwned>(bytes: &[u8]) -> (Vec<T>, Vec<String>) {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(bytes);

    let mut rows = vec![];
    let mut syntax_errors = vec![];
    for record in rdr.deserialize::<T>() {
        match record.context(CsvSnafu) {
            Ok(row) => rows.push(row),
            Err(e) => syntax_errors.push(snafu::Report::from_error(e).to_string()),
        }
    }

    (rows, syntax_errors)
}

/// Carries the checked rows from the preview step to the confirmation step.
pub fn encode_draft<T: Serialize>(rows: &[T]) -> RosterResult<String> {
    Ok(BASE64_URL_SAFE.encode(rmp_serde::to_vec(rows).context(RmpSerdeEncodeSnafu)?))
}

pub fn decode_draft<T: DeserializeOwned>(encoded: &str) -> RosterResult<Vec<T>> {
    rmp_serde::from_slice(&BASE64_URL_SAFE.decode(encoded).context(B64Snafu)?)
        .context(RmpSerdeDecodeSnafu)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BENEFICIARIES: &str = "external_id,name,age,gender,group_tag,phone,address
B-1,Fatima,71,F,North,0501,Street 1
B-2,Yusuf,,M,,,
B-1,Fatima again,71,F,North,,
,Nameless,40,M,,,
B-3,,50,F,,,
B-4,Bad Age,old,M,,,
";

    fn beneficiary_candidates(csv: &str) -> Vec<Option<AddBeneficiary>> {
        let (rows, errors) = read_csv::<CsvBeneficiary>(csv.as_bytes());
        assert!(errors.is_empty(), "{errors:?}");
        rows.into_iter().map(CsvBeneficiary::into_candidate).collect()
    }

    #[test]
    fn filters_invalid_and_repeated_rows() {
        let plan = plan(beneficiary_candidates(BENEFICIARIES), &HashSet::new());

        assert_eq!(plan.invalid, 3);
        assert_eq!(plan.in_batch_duplicates, 1);
        assert_eq!(plan.already_present, 0);
        let ids: Vec<_> = plan.fresh.iter().map(|b| b.external_id.as_str()).collect();
        assert_eq!(ids, ["B-1", "B-2"]);
        assert_eq!(plan.fresh[0].name, "Fatima");
        assert_eq!(plan.fresh[0].age, Some(71));
        assert_eq!(plan.fresh[1].group_tag, None);
    }

    #[test]
    fn importing_twice_adds_nothing_the_second_time() {
        let first = plan(beneficiary_candidates(BENEFICIARIES), &HashSet::new());
        let existing: HashSet<String> = first
            .fresh
            .iter()
            .flat_map(Importable::dedup_keys)
            .collect();

        let second = plan(beneficiary_candidates(BENEFICIARIES), &existing);
        assert!(second.fresh.is_empty());
        assert_eq!(second.already_present, 2);
    }

    #[test]
    fn students_dedup_on_either_identifier() {
        let csv = "registration_number,external_id,name,branch,email
R1,E1,Amal,Science,amal@example.org
R2,E1,Bilal,,
R1,E3,Carim,,
R4,E4,Dana,,not-an-email
R5,E5,Eid,,
";
        let (rows, errors) = read_csv::<CsvStudent>(csv.as_bytes());
        assert!(errors.is_empty());

        let existing: HashSet<String> = student_keys("R9", "E5").into_iter().collect();
        let plan = plan(rows.into_iter().map(CsvStudent::into_candidate), &existing);

        assert_eq!(plan.invalid, 1);
        assert_eq!(plan.in_batch_duplicates, 2);
        assert_eq!(plan.already_present, 1);
        assert_eq!(plan.fresh.len(), 1);
        assert_eq!(plan.fresh[0].registration_number, "R1");
        assert_eq!(
            plan.fresh[0].email.as_ref().map(EmailAddress::as_str),
            Some("amal@example.org")
        );
    }

    #[test]
    fn malformed_records_are_reported() {
        let csv = b"external_id,name\nB-1,Fatima\n\xff\xfe,Broken\n";
        let (rows, errors) = read_csv::<CsvBeneficiary>(csv);
        assert_eq!(rows.len(), 1);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn drafts_survive_the_hidden_form_field() {
        let rows = plan(beneficiary_candidates(BENEFICIARIES), &HashSet::new()).fresh;
        let encoded = encode_draft(&rows).unwrap();
        let decoded: Vec<AddBeneficiary> = decode_draft(&encoded).unwrap();
        assert_eq!(decoded, rows);

        assert!(decode_draft::<AddBeneficiary>("not base64!").is_err());
    }
}
