use crate::data::{
    assignment::{AssignmentDetails, AssignmentStatus},
    student::Student,
};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tally {
    pub total: usize,
    pub completed: usize,
}

impl Tally {
    pub const fn pending(&self) -> usize {
        self.total - self.completed
    }

    /// Rounded to one decimal place; an empty tally is 0%.
    #[allow(clippy::cast_precision_loss)]
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.completed as f64 * 1000.0 / self.total as f64).round() / 10.0
    }

    fn add(&mut self, status: AssignmentStatus) {
        self.total += 1;
        if status == AssignmentStatus::Completed {
            self.completed += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StudentTally {
    pub student_id: Uuid,
    pub student_name: String,
    pub tally: Tally,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Progress {
    pub overall: Tally,
    pub by_tag: BTreeMap<String, Tally>,
    pub by_student: Vec<StudentTally>,
}

/// Every active student gets a row, even with nothing assigned, so idle volunteers show up.
pub fn aggregate(assignments: &[AssignmentDetails], students: &[Student]) -> Progress {
    let mut progress = Progress::default();
    let mut by_student: BTreeMap<(String, Uuid), Tally> = students
        .iter()
        .filter(|s| s.active)
        .map(|s| ((s.name.clone(), s.id), Tally::default()))
        .collect();

    for assignment in assignments {
        progress.overall.add(assignment.status);
        progress
            .by_tag
            .entry(assignment.event_tag.clone())
            .or_default()
            .add(assignment.status);
        by_student
            .entry((assignment.student_name.clone(), assignment.student_id))
            .or_default()
            .add(assignment.status);
    }

    progress.by_student = by_student
        .into_iter()
        .map(|((student_name, student_id), tally)| StudentTally {
            student_id,
            student_name,
            tally,
        })
        .collect();

    progress
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn assignment(tag: &str, student: (Uuid, &str), done: bool) -> AssignmentDetails {
        AssignmentDetails {
            id: Uuid::new_v4(),
            beneficiary_id: format!("B-{}", Uuid::new_v4()),
            student_id: student.0,
            status: if done {
                AssignmentStatus::Completed
            } else {
                AssignmentStatus::Pending
            },
            completed_at: done.then(OffsetDateTime::now_utc),
            event_tag: tag.to_string(),
            beneficiary_name: "Someone".into(),
            beneficiary_phone: None,
            beneficiary_address: None,
            student_name: student.1.to_string(),
        }
    }

    #[test]
    fn groups_by_tag_and_student() {
        let amal = (Uuid::new_v4(), "Amal");
        let bilal = (Uuid::new_v4(), "Bilal");
        let rows = vec![
            assignment("Ramadan", amal, true),
            assignment("Ramadan", amal, false),
            assignment("Ramadan", bilal, true),
            assignment("Eid", bilal, false),
        ];

        let progress = aggregate(&rows, &[]);

        assert_eq!(progress.overall, Tally { total: 4, completed: 2 });
        assert_eq!(progress.by_tag["Ramadan"], Tally { total: 3, completed: 2 });
        assert_eq!(progress.by_tag["Eid"].pending(), 1);
        assert_eq!(progress.by_student.len(), 2);
        assert_eq!(progress.by_student[0].student_name, "Amal");
        assert_eq!(progress.by_student[1].tally.completed, 1);
    }

    fn student(name: &str, active: bool) -> Student {
        Student {
            id: Uuid::new_v4(),
            registration_number: format!("R-{name}"),
            external_id: format!("S-{name}"),
            name: name.to_string(),
            branch: None,
            email: None,
            active,
            available: true,
        }
    }

    #[test]
    fn idle_active_students_still_appear() {
        let amal = student("Amal", true);
        let idle = student("Zainab", true);
        let gone = student("Yusuf", false);
        let rows = vec![assignment("Eid", (amal.id, "Amal"), true)];

        let progress = aggregate(&rows, &[amal, idle.clone(), gone]);

        assert_eq!(progress.by_student.len(), 2);
        assert_eq!(progress.by_student[0].tally, Tally { total: 1, completed: 1 });
        assert_eq!(progress.by_student[1].student_id, idle.id);
        assert_eq!(progress.by_student[1].tally, Tally::default());
        assert_eq!(progress.overall.total, 1);
    }

    #[test]
    fn percentages_round_to_one_decimal() {
        assert!((Tally { total: 3, completed: 2 }.percentage() - 66.7).abs() < f64::EPSILON);
        assert!((Tally { total: 4, completed: 4 }.percentage() - 100.0).abs() < f64::EPSILON);
        assert!(Tally::default().percentage().abs() < f64::EPSILON);
    }
}
