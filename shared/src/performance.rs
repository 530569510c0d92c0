//! Read-side reports that join marks with live subject records.
//!
//! Credits always come from the subject as it is now; a marks record whose
//! subject has been deleted drops out of every report here.

use std::collections::{BTreeMap, HashMap};

use crate::error::ServiceError;
use crate::grades::{self, grade_point, percentage, round2};
use crate::marks::{list_marks, student_marks};
use crate::store::RecordStore;
use crate::subjects::get_subject;
use crate::types::{DetailedMarks, Marks, Performance, Subject};

/// Fetch each distinct subject referenced by `marks` once.
async fn referenced_subjects(
    store: &dyn RecordStore,
    marks: &[Marks],
) -> Result<HashMap<String, Subject>, ServiceError> {
    let mut subjects = HashMap::new();
    for mark in marks {
        if subjects.contains_key(&mark.subject_id) {
            continue;
        }
        if let Some(subject) = get_subject(store, &mark.subject_id).await? {
            subjects.insert(mark.subject_id.clone(), subject);
        }
    }
    Ok(subjects)
}

/// SGPA per semester in ascending order, plus the CGPA.
pub async fn student_performance(
    store: &dyn RecordStore,
    student_id: &str,
) -> Result<Performance, ServiceError> {
    let marks = student_marks(store, student_id).await?;
    let subjects = referenced_subjects(store, &marks).await?;
    Ok(grades::performance(&marks, |id| subjects.get(id)))
}

pub async fn detailed_marks(
    store: &dyn RecordStore,
    student_id: &str,
) -> Result<Vec<DetailedMarks>, ServiceError> {
    let marks = student_marks(store, student_id).await?;
    let subjects = referenced_subjects(store, &marks).await?;

    Ok(marks
        .into_iter()
        .filter_map(|mark| {
            let subject = subjects.get(&mark.subject_id)?;
            let pct = percentage(mark.total);
            Some(DetailedMarks {
                subject_name: subject.name.clone(),
                subject_code: subject.code.clone(),
                credits: subject.credits,
                percentage: round2(pct),
                grade_point: grade_point(pct),
                marks: mark,
            })
        })
        .collect())
}

/// Mean total per subject across every marks record of the semester.
pub async fn class_averages(
    store: &dyn RecordStore,
    semester: u32,
) -> Result<BTreeMap<String, f64>, ServiceError> {
    let marks = list_marks(store, None, Some(semester)).await?;

    let mut sums: BTreeMap<String, (f64, u32)> = BTreeMap::new();
    for mark in marks {
        let entry = sums.entry(mark.subject_id).or_insert((0.0, 0));
        entry.0 += mark.total;
        entry.1 += 1;
    }

    Ok(sums
        .into_iter()
        .map(|(subject_id, (sum, count))| (subject_id, sum / f64::from(count)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marks::create_marks;
    use crate::subjects::{create_subject, delete_subject};
    use crate::types::{CreateMarksRequest, SubjectRequest};
    use std::num::NonZeroU32;

    async fn subject(store: &dyn RecordStore, code: &str, semester: u32, credits: u32) -> Subject {
        create_subject(
            store,
            SubjectRequest {
                name: format!("Course {}", code),
                code: code.to_string(),
                semester,
                credits: NonZeroU32::new(credits).expect("credits"),
            },
        )
        .await
        .expect("create subject")
    }

    async fn record(
        store: &dyn RecordStore,
        student_id: &str,
        subject: &Subject,
        internals: [f64; 3],
        final_exam: f64,
    ) -> Marks {
        create_marks(
            store,
            CreateMarksRequest {
                student_id: student_id.to_string(),
                subject_id: subject.id.clone(),
                internal1: internals[0],
                internal2: internals[1],
                internal3: internals[2],
                final_exam,
                semester: subject.semester,
            },
        )
        .await
        .expect("create marks")
    }

    #[tokio::test]
    async fn student_without_marks_has_empty_report() {
        let store = crate::memory::MemoryStore::new();
        let report = student_performance(&store, "nobody").await.expect("report");
        assert!(report.semesters.is_empty());
        assert_eq!(report.cgpa, 0.0);
    }

    #[tokio::test]
    async fn performance_spans_semesters() {
        let store = crate::memory::MemoryStore::new();
        let ml = subject(&store, "AIML101", 1, 4).await;
        let py = subject(&store, "AIML102", 1, 3).await;
        let dl = subject(&store, "AIML201", 2, 4).await;

        record(&store, "s1", &ml, [40.0, 40.0, 10.0], 100.0).await; // 180 -> 10
        record(&store, "s1", &py, [35.0, 28.0, 40.0], 50.0).await; // 125 -> 7
        record(&store, "s1", &dl, [30.0, 30.0, 30.0], 40.0).await; // 100 -> 6
        record(&store, "s2", &dl, [0.0, 0.0, 0.0], 0.0).await;

        let report = student_performance(&store, "s1").await.expect("report");

        assert_eq!(report.semesters.len(), 2);
        assert_eq!(report.semesters[0].semester, 1);
        assert_eq!(report.semesters[0].credits, 7);
        // (10*4 + 7*3) / 7 = 8.714...
        assert_eq!(report.semesters[0].sgpa, 8.71);
        assert_eq!(report.semesters[1].semester, 2);
        assert_eq!(report.semesters[1].sgpa, 6.0);
        // (40 + 21 + 24) / 11 = 7.727...
        assert_eq!(report.cgpa, 7.73);
    }

    #[tokio::test]
    async fn deleted_subject_disappears_from_reports() {
        let store = crate::memory::MemoryStore::new();
        let ml = subject(&store, "AIML101", 1, 4).await;
        let py = subject(&store, "AIML102", 1, 4).await;
        record(&store, "s1", &ml, [40.0, 40.0, 40.0], 100.0).await;
        record(&store, "s1", &py, [20.0, 20.0, 20.0], 40.0).await;

        delete_subject(&store, &ml.id).await.expect("delete");

        let detailed = detailed_marks(&store, "s1").await.expect("detailed");
        assert_eq!(detailed.len(), 1);
        assert_eq!(detailed[0].subject_code, "AIML102");

        let report = student_performance(&store, "s1").await.expect("report");
        assert_eq!(report.semesters[0].credits, 4);
    }

    #[tokio::test]
    async fn detailed_marks_carry_subject_and_grade() {
        let store = crate::memory::MemoryStore::new();
        let py = subject(&store, "AIML102", 1, 3).await;
        let marks = record(&store, "s1", &py, [35.0, 28.0, 40.0], 50.0).await;

        let detailed = detailed_marks(&store, "s1").await.expect("detailed");
        assert_eq!(detailed.len(), 1);
        let row = &detailed[0];
        assert_eq!(row.marks, marks);
        assert_eq!(row.subject_name, "Course AIML102");
        assert_eq!(row.credits.get(), 3);
        assert_eq!(row.percentage, 69.44);
        assert_eq!(row.grade_point, 7);

        let json = serde_json::to_value(row).expect("json");
        assert_eq!(json["total"], 125.0);
        assert_eq!(json["subject_code"], "AIML102");
    }

    #[tokio::test]
    async fn class_averages_group_by_subject() {
        let store = crate::memory::MemoryStore::new();
        let ml = subject(&store, "AIML101", 1, 4).await;
        let dl = subject(&store, "AIML201", 2, 4).await;
        record(&store, "s1", &ml, [40.0, 40.0, 0.0], 100.0).await; // 180
        record(&store, "s2", &ml, [20.0, 20.0, 0.0], 60.0).await; // 100
        record(&store, "s1", &dl, [10.0, 10.0, 0.0], 10.0).await;

        let averages = class_averages(&store, 1).await.expect("averages");
        assert_eq!(averages.len(), 1);
        assert_eq!(averages.get(&ml.id), Some(&140.0));

        assert!(class_averages(&store, 5).await.expect("averages").is_empty());
    }
}
