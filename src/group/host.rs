use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use super::WriterGroup;
use super::WriterGroupBuilder;
use crate::JobDocumentStore;
use crate::JobInfoModel;
use crate::Result;
use crate::VersionedJob;
use crate::WriterGroupJobModel;

/// What `apply` did with a job document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobApplied {
    Started,
    Updated,
    Rebuilt,
    Stopped,
    Unchanged,
    /// Older than a snapshot already applied for the job
    Stale,
}

/// Runs one writer group per active job and follows job updates.
///
/// Only writer changes are applied to a running group; any other change
/// (engine tuning, encoding, messaging mode) stops the group and starts a
/// fresh one built from the new snapshot.
///
/// Versioned snapshots may arrive out of store order; a snapshot is only
/// applied when its version is newer than the last one seen for the job.
pub struct WriterGroupHost {
    builder: WriterGroupBuilder,
    groups: DashMap<String, Arc<WriterGroup>>,
    versions: DashMap<String, u64>,
    // one apply at a time
    lifecycle: tokio::sync::Mutex<()>,
}

impl WriterGroupHost {
    pub fn new(builder: WriterGroupBuilder) -> Self {
        Self {
            builder,
            groups: DashMap::new(),
            versions: DashMap::new(),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    pub fn group(
        &self,
        job_id: &str,
    ) -> Option<Arc<WriterGroup>> {
        self.groups.get(job_id).map(|g| g.clone())
    }

    pub fn group_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.groups.iter().map(|g| g.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Start groups for every active job already in the store
    pub async fn load(
        &self,
        store: &dyn JobDocumentStore,
    ) -> Result<usize> {
        let mut started = 0;
        for current in store.list().await? {
            if self.apply_versioned(current).await? == JobApplied::Started {
                started += 1;
            }
        }
        info!("{} writer groups started from the job store", started);
        Ok(started)
    }

    /// Last applied store version of a job
    pub fn applied_version(
        &self,
        job_id: &str,
    ) -> Option<u64> {
        self.versions.get(job_id).map(|v| *v)
    }

    /// Apply a snapshot read from the job store unless a newer one of the
    /// same job was applied already
    #[instrument(skip_all, fields(job = %versioned.job.id, version = versioned.version))]
    pub async fn apply_versioned(
        &self,
        versioned: VersionedJob,
    ) -> Result<JobApplied> {
        let _guard = self.lifecycle.lock().await;
        let VersionedJob { job, version } = versioned;
        if let Some(applied) = self.applied_version(&job.id) {
            if version <= applied {
                debug!("[{}] ignoring version {}, already at {}", job.id, version, applied);
                return Ok(JobApplied::Stale);
            }
        }
        // newest document wins even when it cannot be run
        self.versions.insert(job.id.clone(), version);
        self.apply_locked(job).await
    }

    /// Apply a snapshot regardless of its version
    #[instrument(skip_all, fields(job = %job.id))]
    pub async fn apply(
        &self,
        job: JobInfoModel,
    ) -> Result<JobApplied> {
        let _guard = self.lifecycle.lock().await;
        self.apply_locked(job).await
    }

    async fn apply_locked(
        &self,
        job: JobInfoModel,
    ) -> Result<JobApplied> {
        let next = job.writer_group_job();
        let runnable = job.is_active() && !next.writer_group.data_set_writers.is_empty();
        let current = self.group(&job.id);

        match (current, runnable) {
            (None, false) => Ok(JobApplied::Unchanged),
            (Some(group), false) => {
                self.groups.remove(&job.id);
                group.stop().await;
                info!("[{}] job is {:?}, group stopped", job.id, job.status());
                Ok(JobApplied::Stopped)
            }
            (None, true) => {
                self.start_group(&job.id, next).await?;
                Ok(JobApplied::Started)
            }
            (Some(group), true) => {
                let running = group.job();
                if running == *next {
                    return Ok(JobApplied::Unchanged);
                }
                if same_except_writers(&running, next) {
                    match group.update(next).await {
                        Ok(()) => return Ok(JobApplied::Updated),
                        Err(e) => warn!("[{}] in place update failed, rebuilding: {:?}", job.id, e),
                    }
                }
                self.groups.remove(&job.id);
                group.stop().await;
                self.start_group(&job.id, next).await?;
                Ok(JobApplied::Rebuilt)
            }
        }
    }

    /// Follow job updates until cancelled or the channel closes, then stop
    /// every group
    pub async fn run(
        &self,
        mut jobs: mpsc::UnboundedReceiver<VersionedJob>,
        ct: CancellationToken,
    ) -> Result<()> {
        loop {
            tokio::select! {
                biased;
                _ = ct.cancelled() => break,
                job = jobs.recv() => match job {
                    Some(job) => {
                        let id = job.job.id.clone();
                        match self.apply_versioned(job).await {
                            Ok(applied) => debug!("[{}] job applied: {:?}", id, applied),
                            Err(e) => error!("[{}] failed to apply job: {:?}", id, e),
                        }
                    }
                    None => break,
                },
            }
        }
        self.stop_all().await;
        Ok(())
    }

    pub async fn stop_all(&self) {
        let _guard = self.lifecycle.lock().await;
        let ids: Vec<String> = self.groups.iter().map(|g| g.key().clone()).collect();
        let groups: Vec<Arc<WriterGroup>> = ids
            .iter()
            .filter_map(|id| self.groups.remove(id).map(|(_, group)| group))
            .collect();
        // groups flush and close independently
        join_all(groups.iter().map(|group| group.stop())).await;
        info!("{} writer groups stopped", groups.len());
    }

    async fn start_group(
        &self,
        job_id: &str,
        job: &WriterGroupJobModel,
    ) -> Result<()> {
        let group = Arc::new(self.builder.build(job)?);
        group.start().await?;
        self.groups.insert(job_id.to_string(), group);
        Ok(())
    }
}

fn same_except_writers(
    running: &WriterGroupJobModel,
    next: &WriterGroupJobModel,
) -> bool {
    let mut running = running.clone();
    let mut next = next.clone();
    running.writer_group.data_set_writers.clear();
    next.writer_group.data_set_writers.clear();
    running == next
}
