use serde_json::Value;

use crate::error::ServiceError;
use crate::grades::subject_total;
use crate::store::{
    from_document, from_documents, to_document, Collection, Filter, RecordStore, StoreError,
    MAX_PAGE_SIZE,
};
use crate::types::{CreateMarksRequest, Marks, UpdateMarksRequest};

/// Record marks for a (student, subject) pair. The total is always computed
/// here; a second record for the same pair is a conflict.
pub async fn create_marks(
    store: &dyn RecordStore,
    req: CreateMarksRequest,
) -> Result<Marks, ServiceError> {
    let marks = Marks {
        id: uuid::Uuid::new_v4().to_string(),
        total: subject_total([req.internal1, req.internal2, req.internal3], req.final_exam),
        student_id: req.student_id,
        subject_id: req.subject_id,
        internal1: req.internal1,
        internal2: req.internal2,
        internal3: req.internal3,
        final_exam: req.final_exam,
        semester: req.semester,
    };

    match store.insert(Collection::Marks, to_document(&marks)?).await {
        Ok(()) => Ok(marks),
        Err(StoreError::Duplicate { .. }) => {
            tracing::warn!(
                "Marks already exist for student {} and subject {}",
                marks.student_id,
                marks.subject_id
            );
            Err(ServiceError::Conflict(
                "Marks already exist for this student and subject".to_string(),
            ))
        }
        Err(e) => Err(e.into()),
    }
}

/// Both filters are optional; a semester of 0 means no filter.
pub async fn list_marks(
    store: &dyn RecordStore,
    student_id: Option<&str>,
    semester: Option<u32>,
) -> Result<Vec<Marks>, ServiceError> {
    let filter = Filter::all()
        .and_opt("student_id", student_id.filter(|s| !s.is_empty()))
        .and_opt("semester", semester.filter(|s| *s != 0));
    let docs = store.find(Collection::Marks, &filter, MAX_PAGE_SIZE).await?;
    Ok(from_documents(Collection::Marks, docs)?)
}

pub async fn student_marks(
    store: &dyn RecordStore,
    student_id: &str,
) -> Result<Vec<Marks>, ServiceError> {
    list_marks(store, Some(student_id), None).await
}

/// Replace the four scores and recompute the total. Identity, references and
/// semester are left as they were.
pub async fn update_marks(
    store: &dyn RecordStore,
    marks_id: &str,
    req: UpdateMarksRequest,
) -> Result<Marks, ServiceError> {
    let total = subject_total([req.internal1, req.internal2, req.internal3], req.final_exam);
    let mut fields = to_document(&req)?;
    fields.insert("total".to_string(), Value::from(total));

    let updated = store
        .update(Collection::Marks, marks_id, fields)
        .await?
        .ok_or(ServiceError::NotFound("Marks"))?;
    Ok(from_document(Collection::Marks, updated)?)
}

pub async fn delete_marks(store: &dyn RecordStore, marks_id: &str) -> Result<(), ServiceError> {
    if store.delete(Collection::Marks, marks_id).await? {
        Ok(())
    } else {
        Err(ServiceError::NotFound("Marks"))
    }
}
