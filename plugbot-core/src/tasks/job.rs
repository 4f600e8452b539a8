// plugbot-core/src/tasks/job.rs

use std::future::Future;

use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::Error;

/// How a detached job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    TimedOut(String),
    Failed(String),
}

impl From<Result<(), Error>> for JobOutcome {
    fn from(res: Result<(), Error>) -> Self {
        match res {
            Ok(()) => JobOutcome::Completed,
            Err(Error::Timeout(what)) => JobOutcome::TimedOut(what),
            Err(e) => JobOutcome::Failed(e.to_string()),
        }
    }
}

/// Handle on a spawned job. Dropping it detaches the job.
#[derive(Debug)]
pub struct JobHandle {
    id: Uuid,
    label: String,
    handle: JoinHandle<JobOutcome>,
}

impl JobHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the job; a panicked task counts as failed.
    pub async fn wait(self) -> JobOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => JobOutcome::Failed(Error::from(e).to_string()),
        }
    }
}

/// Spawns `work` on the runtime and logs its outcome when it ends.
pub fn spawn_job<F>(label: impl Into<String>, work: F) -> JobHandle
where
    F: Future<Output = Result<(), Error>> + Send + 'static,
{
    let id = Uuid::new_v4();
    let label = label.into();
    let task_label = label.clone();
    let handle = tokio::spawn(async move {
        let outcome = JobOutcome::from(work.await);
        match &outcome {
            JobOutcome::Completed => info!("Job {} ({}) completed", task_label, id),
            JobOutcome::TimedOut(what) => warn!("Job {} ({}) timed out: {}", task_label, id, what),
            JobOutcome::Failed(e) => warn!("Job {} ({}) failed: {}", task_label, id, e),
        }
        outcome
    });
    JobHandle { id, label, handle }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn outcomes_are_mapped_from_results() {
        assert_eq!(spawn_job("ok", async { Ok(()) }).wait().await, JobOutcome::Completed);
        assert_eq!(
            spawn_job("slow", async { Err(Error::Timeout("feed".into())) }).wait().await,
            JobOutcome::TimedOut("feed".into())
        );
        let failed = spawn_job("bad", async { Err(Error::Upstream("500".into())) }).wait().await;
        assert!(matches!(failed, JobOutcome::Failed(msg) if msg.contains("500")));
    }
}
