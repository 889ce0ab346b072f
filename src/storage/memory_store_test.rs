use super::*;
use crate::test_utils::job_info;
use crate::test_utils::writer;
use crate::test_utils::writer_group;
use crate::Error;
use crate::StorageError;
use crate::SystemError;

fn job(id: &str) -> crate::JobInfoModel {
    job_info(id, writer_group(id, vec![writer("w1", "opc.tcp://plc:4840", &["ns=2;s=A"])]))
}

#[tokio::test]
async fn test_put_should_create_then_advance_version() {
    let store = InMemoryJobStore::new();
    assert!(store.get("job-1").await.unwrap().is_none());

    let created = job("job-1");
    let v1 = store.put("job-1", &created, None).await.unwrap();
    assert_eq!(v1, 1);

    let current = store.get("job-1").await.unwrap().unwrap();
    assert_eq!(current.version, 1);
    assert_eq!(current.job, created);

    let mut changed = current.job.clone();
    changed.name = Some("renamed".to_string());
    let v2 = store.put("job-1", &changed, Some(1)).await.unwrap();
    assert_eq!(v2, 2);
    assert_eq!(store.get("job-1").await.unwrap().unwrap().job.name.as_deref(), Some("renamed"));
}

/// # Case 1: stale version
/// # Case 2: create over an existing document
/// # Case 3: update of a missing document
#[tokio::test]
async fn test_put_should_reject_version_mismatch() {
    let store = InMemoryJobStore::new();
    store.put("job-1", &job("job-1"), None).await.unwrap();
    store.put("job-1", &job("job-1"), Some(1)).await.unwrap();

    let err = store.put("job-1", &job("job-1"), Some(1)).await.unwrap_err();
    assert!(err.is_version_conflict());
    assert!(matches!(
        err,
        Error::System(SystemError::Storage(StorageError::VersionConflict {
            expected: Some(1),
            actual: Some(2),
            ..
        }))
    ));

    assert!(store.put("job-1", &job("job-1"), None).await.unwrap_err().is_version_conflict());
    assert!(store.put("job-2", &job("job-2"), Some(3)).await.unwrap_err().is_version_conflict());
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_delete_should_honour_expected_version() {
    let store = InMemoryJobStore::new();
    store.put("job-1", &job("job-1"), None).await.unwrap();

    assert!(store.delete("job-1", Some(7)).await.unwrap_err().is_version_conflict());
    store.delete("job-1", Some(1)).await.unwrap();
    assert!(store.is_empty());

    let err = store.delete("job-1", None).await.unwrap_err();
    assert!(matches!(
        err,
        Error::System(SystemError::Storage(StorageError::NotFound(ref id))) if id == "job-1"
    ));
}

#[tokio::test]
async fn test_list_should_return_jobs_sorted_by_id() {
    let store = InMemoryJobStore::new();
    for id in ["job-c", "job-a", "job-b"] {
        store.put(id, &job(id), None).await.unwrap();
    }
    store.put("job-b", &job("job-b"), Some(1)).await.unwrap();

    let listed = store.list().await.unwrap();
    let ids: Vec<(&str, u64)> = listed.iter().map(|v| (v.job.id.as_str(), v.version)).collect();
    assert_eq!(ids, vec![("job-a", 1), ("job-b", 2), ("job-c", 1)]);
}

#[tokio::test]
async fn test_stored_document_should_carry_the_job_type_tag() {
    let store = InMemoryJobStore::new();
    store.put("job-1", &job("job-1"), None).await.unwrap();
    let document = store.document("job-1").unwrap();
    assert!(document.contains(crate::WRITER_GROUP_JOB_TYPE));
}
