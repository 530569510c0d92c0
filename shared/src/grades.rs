//! Subject totals, grade points and the credit-weighted GPA averages.
//!
//! A subject total is the best two of three internal assessments plus the
//! final exam, so the highest achievable total is 40 + 40 + 100 = 180.

use std::collections::BTreeMap;

use crate::types::{Marks, Performance, SemesterPerformance, Subject};

pub const MAX_TOTAL: f64 = 180.0;

/// Grade point bands, highest first. The first band whose floor the
/// percentage reaches wins; anything below the last floor scores 0.
const GRADE_BANDS: [(f64, u8); 6] = [
    (90.0, 10),
    (80.0, 9),
    (70.0, 8),
    (60.0, 7),
    (50.0, 6),
    (40.0, 5),
];

/// Drop the lowest internal, sum the other two and add the final exam.
pub fn subject_total(internals: [f64; 3], final_exam: f64) -> f64 {
    let mut sorted = internals;
    sorted.sort_by(|a, b| b.total_cmp(a));
    sorted[0] + sorted[1] + final_exam
}

pub fn percentage(total: f64) -> f64 {
    total / MAX_TOTAL * 100.0
}

pub fn grade_point(percentage: f64) -> u8 {
    GRADE_BANDS
        .iter()
        .find(|(floor, _)| percentage >= *floor)
        .map(|(_, point)| *point)
        .unwrap_or(0)
}

/// Two decimal places, halves to even.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

/// Running credit-weighted sum of grade points.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct GpaAccumulator {
    pub weighted_sum: f64,
    pub credits: u32,
}

impl GpaAccumulator {
    pub fn add(&mut self, grade_point: u8, credits: u32) {
        self.weighted_sum += f64::from(grade_point) * f64::from(credits);
        self.credits += credits;
    }

    pub fn merge(&mut self, other: GpaAccumulator) {
        self.weighted_sum += other.weighted_sum;
        self.credits += other.credits;
    }

    /// Unrounded average; 0 when nothing was accumulated.
    pub fn gpa(&self) -> f64 {
        if self.credits == 0 {
            0.0
        } else {
            self.weighted_sum / f64::from(self.credits)
        }
    }
}

/// Build the per-semester SGPA report and the CGPA for one student's marks.
///
/// `subject_for` resolves a subject id to the live subject record. Marks whose
/// subject no longer resolves are skipped; their semester still appears in the
/// report, with zero credits and an SGPA of 0 if nothing else remains in it.
pub fn performance<'a, F>(marks: &[Marks], mut subject_for: F) -> Performance
where
    F: FnMut(&str) -> Option<&'a Subject>,
{
    let mut by_semester: BTreeMap<u32, GpaAccumulator> = BTreeMap::new();

    for mark in marks {
        let acc = by_semester.entry(mark.semester).or_default();
        if let Some(subject) = subject_for(&mark.subject_id) {
            acc.add(grade_point(percentage(mark.total)), subject.credits.get());
        }
    }

    let mut overall = GpaAccumulator::default();
    let semesters = by_semester
        .into_iter()
        .map(|(semester, acc)| {
            overall.merge(acc);
            SemesterPerformance {
                semester,
                sgpa: round2(acc.gpa()),
                credits: acc.credits,
            }
        })
        .collect();

    Performance {
        semesters,
        cgpa: round2(overall.gpa()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;
    use std::num::NonZeroU32;

    fn subject(id: &str, credits: u32) -> Subject {
        Subject {
            id: id.to_string(),
            name: format!("Subject {}", id),
            code: id.to_uppercase(),
            semester: 1,
            credits: NonZeroU32::new(credits).expect("non-zero credits"),
        }
    }

    fn marks(subject_id: &str, semester: u32, total: f64) -> Marks {
        Marks {
            id: format!("m-{}-{}", subject_id, semester),
            student_id: "s1".to_string(),
            subject_id: subject_id.to_string(),
            internal1: 0.0,
            internal2: 0.0,
            internal3: 0.0,
            final_exam: 0.0,
            total,
            semester,
        }
    }

    #[rstest]
    #[case([35.0, 28.0, 40.0])]
    #[case([28.0, 35.0, 40.0])]
    #[case([40.0, 28.0, 35.0])]
    #[case([40.0, 35.0, 28.0])]
    fn total_drops_lowest_internal_in_any_order(#[case] internals: [f64; 3]) {
        assert_eq!(subject_total(internals, 50.0), 125.0);
    }

    #[test]
    fn total_with_tied_internals() {
        assert_eq!(subject_total([30.0, 30.0, 30.0], 70.0), 130.0);
        assert_eq!(subject_total([0.0, 0.0, 0.0], 0.0), 0.0);
    }

    #[rstest]
    #[case(100.0, 10)]
    #[case(90.0, 10)]
    #[case(89.99, 9)]
    #[case(80.0, 9)]
    #[case(70.0, 8)]
    #[case(60.0, 7)]
    #[case(50.0, 6)]
    #[case(40.0, 5)]
    #[case(39.999, 0)]
    #[case(0.0, 0)]
    fn grade_point_bands(#[case] pct: f64, #[case] expected: u8) {
        assert_eq!(grade_point(pct), expected);
    }

    #[test]
    fn worked_example_lands_in_seventy_band() {
        let total = subject_total([35.0, 28.0, 40.0], 50.0);
        let pct = percentage(total);
        assert!((pct - 69.444).abs() < 0.01);
        assert_eq!(grade_point(pct), 7);
    }

    #[test]
    fn no_marks_gives_empty_report() {
        let report = performance(&[], |_| None);
        assert!(report.semesters.is_empty());
        assert_eq!(report.cgpa, 0.0);
    }

    #[test]
    fn semester_with_only_deleted_subjects_has_zero_sgpa() {
        let report = performance(&[marks("gone", 2, 170.0)], |_| None);
        assert_eq!(
            report.semesters,
            vec![SemesterPerformance {
                semester: 2,
                sgpa: 0.0,
                credits: 0
            }]
        );
        assert_eq!(report.cgpa, 0.0);
    }

    #[test]
    fn cgpa_is_credit_weighted_not_mean_of_sgpas() {
        let subjects: HashMap<String, Subject> = [subject("a", 4), subject("b", 1)]
            .into_iter()
            .map(|s| (s.id.clone(), s))
            .collect();
        // a: 162/180 = 90% -> 10, four credits in semester 1
        // b: 72/180 = 40% -> 5, one credit in semester 2
        let all = vec![marks("b", 2, 72.0), marks("a", 1, 162.0)];

        let report = performance(&all, |id| subjects.get(id));

        assert_eq!(report.semesters.len(), 2);
        assert_eq!(report.semesters[0].semester, 1);
        assert_eq!(report.semesters[0].sgpa, 10.0);
        assert_eq!(report.semesters[0].credits, 4);
        assert_eq!(report.semesters[1].semester, 2);
        assert_eq!(report.semesters[1].sgpa, 5.0);
        // (10*4 + 5*1) / 5 = 9.0, whereas the mean of SGPAs would be 7.5
        assert_eq!(report.cgpa, 9.0);
    }

    #[test]
    fn sgpa_rounds_to_two_places() {
        let subjects: HashMap<String, Subject> = [subject("a", 3), subject("b", 4), subject("c", 4)]
            .into_iter()
            .map(|s| (s.id.clone(), s))
            .collect();
        // grade points 10, 9, 9 over credits 3, 4, 4 -> 102 / 11 = 9.2727...
        let all = vec![
            marks("a", 1, 170.0),
            marks("b", 1, 150.0),
            marks("c", 1, 145.0),
        ];

        let report = performance(&all, |id| subjects.get(id));
        assert_eq!(report.semesters[0].sgpa, 9.27);
        assert_eq!(report.cgpa, 9.27);
    }

    #[rstest]
    #[case(8.125, 8.12)]
    #[case(8.375, 8.38)]
    #[case(9.272727, 9.27)]
    #[case(7.0, 7.0)]
    fn two_place_rounding_sends_halves_to_even(#[case] value: f64, #[case] expected: f64) {
        assert_eq!(round2(value), expected);
    }

    #[test]
    fn exact_half_sgpa_rounds_down_to_even() {
        let subjects: HashMap<String, Subject> = [subject("a", 1), subject("b", 7)]
            .into_iter()
            .map(|s| (s.id.clone(), s))
            .collect();
        // grade points 9 and 8 over credits 1 and 7 -> 65 / 8 = 8.125
        let all = vec![marks("a", 1, 150.0), marks("b", 1, 130.0)];

        let report = performance(&all, |id| subjects.get(id));
        assert_eq!(report.semesters[0].sgpa, 8.12);
        assert_eq!(report.cgpa, 8.12);
    }
}
