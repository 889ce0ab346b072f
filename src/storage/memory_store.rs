use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;
use tracing::trace;

use super::JobDocumentStore;
use super::VersionedJob;
use crate::JobInfoModel;
use crate::Result;
use crate::StorageError;

#[derive(Debug, Clone)]
struct StoredDocument {
    document: String,
    version: u64,
}

/// Process local job store keeping serialized documents, the same shape a
/// remote document database would hand back.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    documents: DashMap<String, StoredDocument>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Raw document as persisted
    pub fn document(
        &self,
        job_id: &str,
    ) -> Option<String> {
        self.documents.get(job_id).map(|d| d.document.clone())
    }
}

fn conflict(
    job_id: &str,
    expected: Option<u64>,
    actual: Option<u64>,
) -> crate::Error {
    StorageError::VersionConflict {
        job_id: job_id.to_string(),
        expected,
        actual,
    }
    .into()
}

#[async_trait]
impl JobDocumentStore for InMemoryJobStore {
    async fn get(
        &self,
        job_id: &str,
    ) -> Result<Option<VersionedJob>> {
        let Some(stored) = self.documents.get(job_id).map(|d| d.clone()) else {
            return Ok(None);
        };
        Ok(Some(VersionedJob {
            job: JobInfoModel::from_document(job_id, &stored.document)?,
            version: stored.version,
        }))
    }

    async fn put(
        &self,
        job_id: &str,
        job: &JobInfoModel,
        expected_version: Option<u64>,
    ) -> Result<u64> {
        let document = job.to_document()?;
        match self.documents.entry(job_id.to_string()) {
            Entry::Occupied(mut entry) => {
                let actual = entry.get().version;
                if expected_version != Some(actual) {
                    trace!("put {} rejected: expected {:?}, actual {}", job_id, expected_version, actual);
                    return Err(conflict(job_id, expected_version, Some(actual)));
                }
                let version = actual + 1;
                entry.insert(StoredDocument { document, version });
                debug!("job {} stored at version {}", job_id, version);
                Ok(version)
            }
            Entry::Vacant(entry) => {
                if expected_version.is_some() {
                    return Err(conflict(job_id, expected_version, None));
                }
                entry.insert(StoredDocument { document, version: 1 });
                debug!("job {} created", job_id);
                Ok(1)
            }
        }
    }

    async fn delete(
        &self,
        job_id: &str,
        expected_version: Option<u64>,
    ) -> Result<()> {
        match self.documents.entry(job_id.to_string()) {
            Entry::Occupied(entry) => {
                let actual = entry.get().version;
                if expected_version.is_some_and(|expected| expected != actual) {
                    return Err(conflict(job_id, expected_version, Some(actual)));
                }
                entry.remove();
                debug!("job {} deleted", job_id);
                Ok(())
            }
            Entry::Vacant(_) => Err(StorageError::NotFound(job_id.to_string()).into()),
        }
    }

    async fn list(&self) -> Result<Vec<VersionedJob>> {
        let mut snapshot: Vec<(String, StoredDocument)> = self
            .documents
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        snapshot.sort_by(|a, b| a.0.cmp(&b.0));

        snapshot
            .into_iter()
            .map(|(job_id, stored)| {
                Ok(VersionedJob {
                    job: JobInfoModel::from_document(&job_id, &stored.document)?,
                    version: stored.version,
                })
            })
            .collect()
    }
}
