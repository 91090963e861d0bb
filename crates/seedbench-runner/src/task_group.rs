//! Fork/join execution of one stage's jobs.
//!
//! Every job of the stage is launched at once on a `JoinSet`; the group
//! completes only after each job has reported. Results are returned in launch
//! order regardless of completion order.

use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::log::IterationLog;
use crate::runner::{JobResult, JobRunner};
use crate::stage::ResolvedStage;

/// Outcome of one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupResult {
    pub stage: String,
    pub jobs: Vec<JobResult>,
}

impl GroupResult {
    pub fn all_passed(&self) -> bool {
        self.jobs.iter().all(JobResult::passed)
    }

    /// First failing job in launch order.
    pub fn first_failure(&self) -> Option<&JobResult> {
        self.jobs.iter().find(|j| !j.passed())
    }

    pub fn failed_count(&self) -> usize {
        self.jobs.iter().filter(|j| !j.passed()).count()
    }
}

/// A bounded set of concurrent jobs.
pub struct TaskGroup {
    stage: ResolvedStage,
}

impl TaskGroup {
    pub fn new(stage: ResolvedStage) -> Self {
        Self { stage }
    }

    /// Launch every job, then wait for all of them.
    ///
    /// Job errors (spawn failure, timeout, panic) become failed [`JobResult`]s;
    /// this never returns early.
    pub async fn run(self, log: &IterationLog) -> GroupResult {
        let ResolvedStage { name, jobs } = self.stage;
        info!(stage = %name, jobs = jobs.len(), "Launching stage");

        let mut set = JoinSet::new();
        let mut names = Vec::with_capacity(jobs.len());
        for (idx, job) in jobs.into_iter().enumerate() {
            names.push(job.name.clone());
            let log = log.clone();
            set.spawn(async move {
                let start = std::time::Instant::now();
                let result = match JobRunner::execute_job(&job, &log).await {
                    Ok(result) => result,
                    Err(e) => {
                        let elapsed = start.elapsed().as_millis() as u64;
                        log.write_line(&format!("[{}] error: {}", job.name, e))
                            .await
                            .ok();
                        JobResult::errored(job.name.clone(), e, elapsed)
                    }
                };
                (idx, result)
            });
        }

        let mut slots: Vec<Option<JobResult>> = vec![None; names.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, result)) => slots[idx] = Some(result),
                Err(e) => warn!(stage = %name, error = %e, "Job task aborted"),
            }
        }

        let jobs: Vec<JobResult> = slots
            .into_iter()
            .zip(names)
            .map(|(slot, job_name)| {
                slot.unwrap_or_else(|| JobResult::errored(job_name, "job task aborted", 0))
            })
            .collect();

        let group = GroupResult { stage: name, jobs };
        if group.all_passed() {
            info!(stage = %group.stage, "Stage passed");
        } else {
            warn!(
                stage = %group.stage,
                failed = group.failed_count(),
                "Stage failed"
            );
        }
        group
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::ResolvedJob;

    fn sh(name: &str, script: &str) -> ResolvedJob {
        ResolvedJob {
            name: name.to_string(),
            command: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            env: Vec::new(),
            timeout_secs: 0,
        }
    }

    #[tokio::test]
    async fn test_results_in_launch_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = IterationLog::open(dir.path().join("iter1.log")).await.unwrap();
        let stage = ResolvedStage {
            name: "cpu".to_string(),
            jobs: vec![sh("slow", "sleep 0.3; exit 0"), sh("fast", "exit 3")],
        };

        let group = TaskGroup::new(stage).run(&log).await;
        assert_eq!(group.jobs.len(), 2);
        assert_eq!(group.jobs[0].job_name, "slow");
        assert_eq!(group.jobs[1].job_name, "fast");
        assert!(!group.all_passed());
        assert_eq!(group.first_failure().unwrap().exit_code, Some(3));
    }

    #[tokio::test]
    async fn test_jobs_run_concurrently() {
        let dir = tempfile::tempdir().unwrap();
        let log = IterationLog::open(dir.path().join("iter1.log")).await.unwrap();
        let stage = ResolvedStage {
            name: "gpu".to_string(),
            jobs: vec![sh("a", "sleep 1"), sh("b", "sleep 1"), sh("c", "sleep 1")],
        };

        let start = std::time::Instant::now();
        let group = TaskGroup::new(stage).run(&log).await;
        assert!(group.all_passed());
        assert!(start.elapsed() < std::time::Duration::from_millis(2500));
    }

    #[tokio::test]
    async fn test_spawn_error_becomes_failed_result() {
        let dir = tempfile::tempdir().unwrap();
        let log = IterationLog::open(dir.path().join("iter1.log")).await.unwrap();
        let stage = ResolvedStage {
            name: "cpu".to_string(),
            jobs: vec![ResolvedJob {
                name: "ghost".to_string(),
                command: vec!["seedbench-no-such-binary".to_string()],
                env: Vec::new(),
                timeout_secs: 0,
            }],
        };

        let group = TaskGroup::new(stage).run(&log).await;
        assert_eq!(group.failed_count(), 1);
        assert!(group.jobs[0].error.is_some());
    }
}
