use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;

use crate::config::RegistryConfig;
use crate::db::{self, InsertOutcome};
use crate::error::{JobError, Result};
use crate::types::JobRecord;

/// Default number of jobs returned by [`JobRegistry::recent_jobs`].
pub const DEFAULT_RECENT_LIMIT: u32 = 20;
/// Default age, in days, after which finished jobs are pruned.
pub const DEFAULT_PRUNE_DAYS: u32 = 7;

/// Tracks generation runs and caps how many may run at once.
///
/// # Example
///
/// ```
/// use job_registry::{JobRegistry, RegistryConfig};
///
/// let registry = JobRegistry::open(RegistryConfig::default()).unwrap();
/// let id = registry.create_job("text", Some("my post")).unwrap();
/// registry.complete_job(&id, Some("text_20250101")).unwrap();
/// assert!(registry.running_jobs().unwrap().is_empty());
/// ```
pub struct JobRegistry {
    db: Mutex<Connection>,
    config: RegistryConfig,
}

impl JobRegistry {
    /// Open (or create) the registry database.
    ///
    /// Jobs left running by an earlier process are not touched here; see
    /// [`cleanup_stale_jobs`](Self::cleanup_stale_jobs).
    pub fn open(config: RegistryConfig) -> Result<Self> {
        let conn = db::open_database(config.db_path.as_deref())?;
        Ok(Self {
            db: Mutex::new(conn),
            config,
        })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|e| JobError::Other(e.to_string()))
    }

    /// Register a new running job and return its id.
    ///
    /// Fails with [`JobError::Capacity`] when the concurrent-run cap is
    /// already reached.
    pub fn create_job(&self, input_mode: &str, text: Option<&str>) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let max = self.config.max_concurrent_jobs;
        let mut conn = self.lock()?;

        match db::insert_job_if_capacity(&mut conn, &id, input_mode, text, max)? {
            InsertOutcome::Inserted => {
                tracing::info!(job_id = %id, input_mode, "Job registered");
                Ok(id)
            }
            InsertOutcome::AtCapacity { running } => {
                tracing::warn!(running, max, "Job rejected, too many concurrent jobs");
                Err(JobError::Capacity { running, max })
            }
        }
    }

    pub fn complete_job(&self, job_id: &str, post_id: Option<&str>) -> Result<()> {
        let conn = self.lock()?;
        if !db::complete_job(&conn, job_id, post_id)? {
            return Err(JobError::NotFound(job_id.to_string()));
        }
        tracing::info!(job_id, post_id, "Job completed");
        Ok(())
    }

    pub fn fail_job(&self, job_id: &str, error: &str) -> Result<()> {
        let conn = self.lock()?;
        if !db::fail_job(&conn, job_id, error)? {
            return Err(JobError::NotFound(job_id.to_string()));
        }
        tracing::warn!(job_id, error, "Job failed");
        Ok(())
    }

    pub fn get_job(&self, job_id: &str) -> Result<Option<JobRecord>> {
        let conn = self.lock()?;
        Ok(db::get_job(&conn, job_id)?)
    }

    pub fn running_jobs(&self) -> Result<Vec<JobRecord>> {
        let conn = self.lock()?;
        Ok(db::running_jobs(&conn)?)
    }

    pub fn recent_jobs(&self, limit: u32) -> Result<Vec<JobRecord>> {
        let conn = self.lock()?;
        Ok(db::recent_jobs(&conn, limit)?)
    }

    /// Mark every running job as failed. Use after a crash, when no run can
    /// still be alive.
    pub fn cleanup_stale_jobs(&self) -> Result<u32> {
        let conn = self.lock()?;
        let count = db::cleanup_stale_jobs(&conn)?;
        if count > 0 {
            tracing::warn!(count, "Marked stale running jobs as failed");
        }
        Ok(count)
    }

    pub fn prune_old_jobs(&self, days: u32) -> Result<u32> {
        let conn = self.lock()?;
        let count = db::prune_old_jobs(&conn, days)?;
        tracing::info!(count, days, "Pruned old jobs");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::JobStatus;

    fn registry(max: u32) -> JobRegistry {
        JobRegistry::open(RegistryConfig::builder().with_max_concurrent_jobs(max).build()).unwrap()
    }

    #[test]
    fn test_create_and_complete() {
        let reg = registry(5);
        let id = reg.create_job("sheet", None).unwrap();
        assert_eq!(reg.running_jobs().unwrap().len(), 1);

        reg.complete_job(&id, Some("post_0_x")).unwrap();
        let job = reg.get_job(&id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(reg.running_jobs().unwrap().is_empty());
    }

    #[test]
    fn test_capacity_error() {
        let reg = registry(1);
        reg.create_job("sheet", None).unwrap();
        let err = reg.create_job("text", Some("hi")).unwrap_err();
        assert!(matches!(err, JobError::Capacity { running: 1, max: 1 }));
        assert_eq!(reg.recent_jobs(DEFAULT_RECENT_LIMIT).unwrap().len(), 1);
    }

    #[test]
    fn test_finishing_unknown_job() {
        let reg = registry(5);
        assert!(matches!(
            reg.complete_job("missing", None),
            Err(JobError::NotFound(_))
        ));
        assert!(matches!(reg.fail_job("missing", "x"), Err(JobError::NotFound(_))));
    }
}
