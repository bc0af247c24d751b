//! In-memory job repository backing tests and infrastructure-free local
//! runs. Honors the same compare-and-set contract as the Postgres
//! implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::{JobRepository, RepositoryError};
use crate::models::job::HaulJob;
use crate::services::state_machine::JobStatus;

#[derive(Default)]
pub struct InMemoryJobRepository {
    jobs: RwLock<HashMap<Uuid, HaulJob>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn get_by_id(&self, id: Uuid) -> Result<HaulJob, RepositoryError> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn insert(&self, job: &HaulJob) -> Result<(), RepositoryError> {
        self.jobs.write().await.insert(job.id, job.clone());
        Ok(())
    }

    async fn update(&self, job: &HaulJob, expected: JobStatus) -> Result<HaulJob, RepositoryError> {
        let mut jobs = self.jobs.write().await;
        let stored = jobs.get_mut(&job.id).ok_or(RepositoryError::NotFound)?;
        if stored.status != expected {
            return Err(RepositoryError::Conflict);
        }
        *stored = job.clone();
        Ok(stored.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> HaulJob {
        HaulJob::new(
            "client-1".into(),
            "haul out demo debris".into(),
            "concrete rubble".into(),
            None,
            None,
            false,
        )
    }

    #[tokio::test]
    async fn get_unknown_is_not_found() {
        let repo = InMemoryJobRepository::new();
        assert!(matches!(
            repo.get_by_id(Uuid::new_v4()).await,
            Err(RepositoryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn update_checks_expected_status() {
        let repo = InMemoryJobRepository::new();
        let mut job = job();
        repo.insert(&job).await.unwrap();

        // Stored status is Available; a writer expecting EnRoute lost a race.
        job.status = JobStatus::OnSite;
        let stale = repo.update(&job, JobStatus::EnRoute).await;
        assert!(matches!(stale, Err(RepositoryError::Conflict)));
        assert_eq!(
            repo.get_by_id(job.id).await.unwrap().status,
            JobStatus::Available
        );

        job.status = JobStatus::Accepted;
        let updated = repo.update(&job, JobStatus::Available).await.unwrap();
        assert_eq!(updated.status, JobStatus::Accepted);
    }
}
