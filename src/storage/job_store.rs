use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::JobInfoModel;
use crate::Result;

/// A job document together with the version it was read at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedJob {
    pub job: JobInfoModel,
    pub version: u64,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait JobDocumentStore: Send + Sync + 'static {
    async fn get(
        &self,
        job_id: &str,
    ) -> Result<Option<VersionedJob>>;

    /// Conditional write. `expected_version = None` only succeeds when the
    /// document does not exist yet. Returns the new version.
    ///
    /// Fails with `StorageError::VersionConflict` when the stored version
    /// differs from `expected_version`.
    async fn put(
        &self,
        job_id: &str,
        job: &JobInfoModel,
        expected_version: Option<u64>,
    ) -> Result<u64>;

    /// Remove a document; `expected_version = None` removes unconditionally
    async fn delete(
        &self,
        job_id: &str,
        expected_version: Option<u64>,
    ) -> Result<()>;

    async fn list(&self) -> Result<Vec<VersionedJob>>;
}
