use crate::error::ServiceError;
use crate::store::{
    from_document, from_documents, to_document, Collection, Filter, RecordStore, MAX_PAGE_SIZE,
};
use crate::types::{Subject, SubjectRequest};

pub async fn create_subject(
    store: &dyn RecordStore,
    req: SubjectRequest,
) -> Result<Subject, ServiceError> {
    let subject = Subject {
        id: uuid::Uuid::new_v4().to_string(),
        name: req.name,
        code: req.code,
        semester: req.semester,
        credits: req.credits,
    };
    store
        .insert(Collection::Subjects, to_document(&subject)?)
        .await?;
    Ok(subject)
}

/// A semester of 0 means no filter.
pub async fn list_subjects(
    store: &dyn RecordStore,
    semester: Option<u32>,
) -> Result<Vec<Subject>, ServiceError> {
    let filter = Filter::all().and_opt("semester", semester.filter(|s| *s != 0));
    let docs = store
        .find(Collection::Subjects, &filter, MAX_PAGE_SIZE)
        .await?;
    Ok(from_documents(Collection::Subjects, docs)?)
}

pub async fn get_subject(
    store: &dyn RecordStore,
    subject_id: &str,
) -> Result<Option<Subject>, ServiceError> {
    match store.get(Collection::Subjects, subject_id).await? {
        Some(doc) => Ok(Some(from_document(Collection::Subjects, doc)?)),
        None => Ok(None),
    }
}

/// Replace every field but the id.
pub async fn update_subject(
    store: &dyn RecordStore,
    subject_id: &str,
    req: SubjectRequest,
) -> Result<Subject, ServiceError> {
    let updated = store
        .update(Collection::Subjects, subject_id, to_document(&req)?)
        .await?
        .ok_or(ServiceError::NotFound("Subject"))?;
    Ok(from_document(Collection::Subjects, updated)?)
}

/// Delete the subject, then every marks record that references it.
/// Marks go first, so a failed cascade leaves the subject in place and the
/// delete can be retried.
pub async fn delete_subject(store: &dyn RecordStore, subject_id: &str) -> Result<(), ServiceError> {
    if get_subject(store, subject_id).await?.is_none() {
        return Err(ServiceError::NotFound("Subject"));
    }

    let removed = store
        .delete_many(Collection::Marks, &Filter::eq("subject_id", subject_id))
        .await?;
    if !store.delete(Collection::Subjects, subject_id).await? {
        return Err(ServiceError::NotFound("Subject"));
    }
    tracing::info!(
        "Deleted subject {} and {} dependent marks records",
        subject_id,
        removed
    );
    Ok(())
}
