//! Hands unassigned beneficiaries out to students, round-robin.
//!
//! The set of already-assigned beneficiaries is a snapshot: two administrators
//! distributing at the same time can both see the same beneficiary as free. The
//! unique constraint on `assignments.beneficiary_id` rejects the second insert
//! and that batch's error is surfaced as-is.

use crate::{
    data::{assignment::Assignments, beneficiary::Beneficiary, student::Student},
    error::{MissingEventTagSnafu, NoEligibleStudentsSnafu, RosterResult},
};
use snafu::ensure;
use sqlx::{Pool, Postgres};
use std::{collections::HashSet, future::Future, hash::Hash};
use uuid::Uuid;

/// Rows per page when reading whole tables.
pub const PAGE_SIZE: i64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAssignment {
    pub beneficiary_id: String,
    pub student_id: Uuid,
    pub event_tag: String,
}

/// Calls `fetch_page(offset, limit)` until it returns an empty page.
pub async fn paginate<T, F, Fut>(page_size: i64, mut fetch_page: F) -> RosterResult<Vec<T>>
where
    F: FnMut(i64, i64) -> Fut,
    Fut: Future<Output = RosterResult<Vec<T>>>,
{
    let mut all = Vec::new();
    let mut offset = 0;

    loop {
        let page = fetch_page(offset, page_size).await?;
        if page.is_empty() {
            break;
        }

        offset += i64::try_from(page.len()).unwrap_or(page_size);
        all.extend(page);
    }

    Ok(all)
}

/// Everything in `all` that isn't in `assigned`, keeping the order of `all`.
pub fn unassigned<T: Eq + Hash + Clone>(all: &[T], assigned: &[T]) -> Vec<T> {
    let assigned: HashSet<&T> = assigned.iter().collect();
    all.iter()
        .filter(|id| !assigned.contains(id))
        .cloned()
        .collect()
}

/// `beneficiary[i]` goes to `students[i % students.len()]`, after truncating to `cap`.
pub fn distribute(
    mut unassigned: Vec<String>,
    students: &[Uuid],
    cap: Option<usize>,
    event_tag: &str,
) -> Vec<NewAssignment> {
    if students.is_empty() {
        return vec![];
    }
    if let Some(cap) = cap {
        unassigned.truncate(cap);
    }

    unassigned
        .into_iter()
        .enumerate()
        .map(|(i, beneficiary_id)| NewAssignment {
            beneficiary_id,
            student_id: students[i % students.len()],
            event_tag: event_tag.to_string(),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistributionOutcome {
    pub assigned: usize,
    pub students: usize,
    pub left_unassigned: usize,
}

async fn distribute_to(
    students: &[Uuid],
    event_tag: &str,
    cap: Option<usize>,
    pool: &Pool<Postgres>,
) -> RosterResult<DistributionOutcome> {
    let event_tag = event_tag.trim();
    ensure!(!event_tag.is_empty(), MissingEventTagSnafu);
    ensure!(!students.is_empty(), NoEligibleStudentsSnafu);

    let all = Beneficiary::get_all_ids(pool).await?;
    let assigned = Assignments::get_assigned_beneficiary_ids(pool).await?;
    let free = unassigned(&all, &assigned);
    let free_count = free.len();

    let assignments = distribute(free, students, cap, event_tag);
    let inserted = Assignments::insert_batches(&assignments, pool).await?;

    info!(
        inserted,
        students = students.len(),
        event_tag,
        "Distributed beneficiaries"
    );

    Ok(DistributionOutcome {
        assigned: inserted,
        students: students.len(),
        left_unassigned: free_count - inserted,
    })
}

/// Distributes over every active student.
pub async fn auto_assign(
    event_tag: &str,
    cap: Option<usize>,
    pool: &Pool<Postgres>,
) -> RosterResult<DistributionOutcome> {
    let students = Student::get_active_ids(pool).await?;
    distribute_to(&students, event_tag, cap, pool).await
}

/// Distributes over an administrator-chosen set of students; inactive ones are skipped.
pub async fn manual_assign(
    student_ids: &[Uuid],
    event_tag: &str,
    cap: Option<usize>,
    pool: &Pool<Postgres>,
) -> RosterResult<DistributionOutcome> {
    let students = Student::filter_active_ids(student_ids, pool).await?;
    distribute_to(&students, event_tag, cap, pool).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("B-{i:04}")).collect()
    }

    fn students(n: usize) -> Vec<Uuid> {
        (0..n).map(|_| Uuid::new_v4()).collect()
    }

    #[test]
    fn every_beneficiary_is_assigned_exactly_once() {
        let beneficiaries = ids(17);
        let students = students(4);

        let out = distribute(beneficiaries.clone(), &students, None, "Ramadan");

        assert_eq!(out.len(), beneficiaries.len());
        let seen: HashSet<_> = out.iter().map(|a| a.beneficiary_id.clone()).collect();
        assert_eq!(seen.len(), beneficiaries.len());
        assert!(out.iter().all(|a| students.contains(&a.student_id)));
        assert!(out.iter().all(|a| a.event_tag == "Ramadan"));
    }

    #[test]
    fn round_robin_splits_nearly_evenly() {
        let students = students(3);
        let out = distribute(ids(10), &students, None, "tag");

        let mut per_student: HashMap<Uuid, usize> = HashMap::new();
        for a in &out {
            *per_student.entry(a.student_id).or_default() += 1;
        }
        assert_eq!(per_student[&students[0]], 4);
        assert_eq!(per_student[&students[1]], 3);
        assert_eq!(per_student[&students[2]], 3);

        assert_eq!(out[0].student_id, students[0]);
        assert_eq!(out[3].student_id, students[0]);
        assert_eq!(out[4].student_id, students[1]);
    }

    #[test]
    fn cap_limits_the_assignment_count() {
        let students = students(2);
        assert_eq!(distribute(ids(10), &students, Some(3), "t").len(), 3);
        assert_eq!(distribute(ids(2), &students, Some(30), "t").len(), 2);
        assert!(distribute(ids(5), &students, Some(0), "t").is_empty());
    }

    #[test]
    fn no_students_means_no_assignments() {
        assert!(distribute(ids(5), &[], None, "t").is_empty());
    }

    #[test]
    fn already_assigned_are_skipped_in_order() {
        let all = ids(6);
        let assigned = vec![all[1].clone(), all[4].clone(), "B-9999".to_string()];

        assert_eq!(
            unassigned(&all, &assigned),
            vec![all[0].clone(), all[2].clone(), all[3].clone(), all[5].clone()]
        );
    }

    #[test]
    fn distributing_twice_assigns_nothing_new() {
        let all = ids(8);
        let students = students(3);

        let first = distribute(unassigned(&all, &[]), &students, None, "t");
        let assigned: Vec<String> = first.into_iter().map(|a| a.beneficiary_id).collect();
        let second = distribute(unassigned(&all, &assigned), &students, None, "t");

        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn paginate_reads_until_an_empty_page() {
        let rows: Vec<u32> = (0..2_345).collect();
        let mut calls = 0;

        let fetched = paginate(1000, |offset, limit| {
            calls += 1;
            let page: Vec<u32> = rows
                .iter()
                .copied()
                .skip(usize::try_from(offset).unwrap())
                .take(usize::try_from(limit).unwrap())
                .collect();
            async move { Ok(page) }
        })
        .await
        .unwrap();

        assert_eq!(fetched, rows);
        assert_eq!(calls, 4);
    }

    #[tokio::test]
    async fn paginate_stops_on_errors() {
        let result: RosterResult<Vec<u32>> = paginate(10, |_, _| async {
            Err(crate::error::RosterError::NoEligibleStudents)
        })
        .await;

        assert!(result.is_err());
    }
}
