use std::time::Duration;

use tokio::time::sleep;
use tokio::time::timeout;
use tracing::debug;
use tracing::warn;

use super::JobDocumentStore;
use super::VersionedJob;
use crate::utils::ExponentialBackoff;
use crate::BackoffPolicy;
use crate::JobInfoModel;
use crate::NetworkError;
use crate::Result;
use crate::StorageError;

/// What a mutation decided to do with the fetched document
#[derive(Debug)]
pub enum JobMutation<R> {
    /// Nothing to write; `R` is handed back to the caller as is
    Unchanged(R),
    /// Conditionally write the new document
    Put(JobInfoModel, R),
}

#[derive(Debug)]
pub struct JobUpdate<R> {
    pub value: R,
    /// Document as written, `None` when the mutation left it unchanged
    pub stored: Option<VersionedJob>,
}

enum UpdateStep<R> {
    Fetch,
    Mutate(Option<VersionedJob>),
    Store {
        job: JobInfoModel,
        expected_version: Option<u64>,
        value: R,
    },
    Done(JobUpdate<R>),
}

/// Optimistic fetch-mutate-store cycle on one job document.
///
/// `mutate` receives the current document (or `None`) and must be free of
/// side effects: it runs again from scratch after every version conflict.
/// Conflicts are retried with backoff up to `policy.max_retries` cycles;
/// any other error ends the update immediately.
pub async fn update_job_with_retry<F, R>(
    store: &dyn JobDocumentStore,
    job_id: &str,
    policy: BackoffPolicy,
    mut mutate: F,
) -> Result<JobUpdate<R>>
where
    F: FnMut(Option<JobInfoModel>) -> Result<JobMutation<R>>,
{
    let op_timeout = Duration::from_millis(policy.timeout_ms);
    let mut backoff = ExponentialBackoff::new(&policy);
    let mut attempts = 0;
    let mut step = UpdateStep::Fetch;

    loop {
        step = match step {
            UpdateStep::Fetch => {
                attempts += 1;
                let current = timeout(op_timeout, store.get(job_id))
                    .await
                    .map_err(|_| NetworkError::Timeout(op_timeout))??;
                UpdateStep::Mutate(current)
            }
            UpdateStep::Mutate(current) => {
                let expected_version = current.as_ref().map(|c| c.version);
                match mutate(current.map(|c| c.job))? {
                    JobMutation::Unchanged(value) => UpdateStep::Done(JobUpdate { value, stored: None }),
                    JobMutation::Put(job, value) => UpdateStep::Store {
                        job,
                        expected_version,
                        value,
                    },
                }
            }
            UpdateStep::Store {
                job,
                expected_version,
                value,
            } => {
                let stored = timeout(op_timeout, store.put(job_id, &job, expected_version))
                    .await
                    .map_err(|_| NetworkError::Timeout(op_timeout))?;
                match stored {
                    Ok(version) => UpdateStep::Done(JobUpdate {
                        value,
                        stored: Some(VersionedJob { job, version }),
                    }),
                    Err(e) if e.is_version_conflict() => {
                        if !policy.is_unlimited() && attempts >= policy.max_retries {
                            warn!("job {} update gave up after {} conflicts", job_id, attempts);
                            return Err(StorageError::ConflictRetriesExhausted {
                                job_id: job_id.to_string(),
                                attempts,
                            }
                            .into());
                        }
                        let delay = backoff.next_delay();
                        debug!("job {} changed concurrently ({}), refetching in {:?}", job_id, e, delay);
                        sleep(delay).await;
                        UpdateStep::Fetch
                    }
                    Err(e) => return Err(e),
                }
            }
            UpdateStep::Done(update) => return Ok(update),
        };
    }
}
