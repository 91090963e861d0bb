//! External job execution with output streamed into the iteration log.

use crate::error::{Result, RunnerError};
use crate::log::IterationLog;
use crate::stage::ResolvedJob;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::debug;

/// Result of one job execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    /// Job name.
    pub job_name: String,

    /// Exit code; `None` when the job never produced one (spawn error, signal, timeout).
    pub exit_code: Option<i32>,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    /// Error message when the job could not run to completion.
    pub error: Option<String>,
}

impl JobResult {
    /// Whether this job passed (exit code 0).
    pub fn passed(&self) -> bool {
        self.error.is_none() && self.exit_code == Some(0)
    }

    /// Result for a job that could not run to completion.
    pub fn errored(job_name: impl Into<String>, error: impl ToString, duration_ms: u64) -> Self {
        Self {
            job_name: job_name.into(),
            exit_code: None,
            duration_ms,
            error: Some(error.to_string()),
        }
    }

    /// Human-readable failure reason, `None` for passing jobs.
    pub fn failure_reason(&self) -> Option<String> {
        if self.passed() {
            return None;
        }
        Some(match (&self.error, self.exit_code) {
            (Some(e), _) => e.clone(),
            (None, Some(code)) => format!("job '{}' exited with code {}", self.job_name, code),
            (None, None) => format!("job '{}' terminated by signal", self.job_name),
        })
    }
}

/// Copy every line of `reader` into the log, prefixed with the job name.
///
/// Bytes that are not valid UTF-8 are replaced rather than ending the copy;
/// the pipe is drained to EOF.
async fn pump<R>(reader: Option<R>, log: IterationLog, job: String) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return Ok(());
    };
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(());
        }
        let line = buf.strip_suffix(b"\n").unwrap_or(&buf[..]);
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        log.write_line(&format!("[{job}] {}", String::from_utf8_lossy(line)))
            .await?;
    }
}

/// Runs external jobs.
pub struct JobRunner;

impl JobRunner {
    /// Execute one job, streaming combined stdout/stderr into `log`.
    ///
    /// A non-zero exit is a normal `Ok` result; only spawn failures, timeouts
    /// and log I/O errors are returned as `Err`.
    pub async fn execute_job(job: &ResolvedJob, log: &IterationLog) -> Result<JobResult> {
        let start = Instant::now();

        let (exe, args) = job
            .command
            .split_first()
            .ok_or_else(|| RunnerError::EmptyCommand(job.name.clone()))?;

        debug!(job = %job.name, command = ?job.command, "Spawning job");

        let mut child = Command::new(exe)
            .args(args)
            .envs(job.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                job: job.name.clone(),
                source,
            })?;

        let stdout = pump(child.stdout.take(), log.clone(), job.name.clone());
        let stderr = pump(child.stderr.take(), log.clone(), job.name.clone());

        let status = {
            let drive = async {
                let (status, out, err) = tokio::join!(child.wait(), stdout, stderr);
                out?;
                err?;
                status
            };

            if job.timeout_secs > 0 {
                tokio::time::timeout(Duration::from_secs(job.timeout_secs), drive)
                    .await
                    .ok()
            } else {
                Some(drive.await)
            }
        };

        let Some(status) = status else {
            child.start_kill().ok();
            return Err(RunnerError::Timeout {
                job: job.name.clone(),
                secs: job.timeout_secs,
            });
        };
        let status = status?;

        Ok(JobResult {
            job_name: job.name.clone(),
            exit_code: status.code(),
            duration_ms: start.elapsed().as_millis() as u64,
            error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(name: &str, command: &[&str]) -> ResolvedJob {
        ResolvedJob {
            name: name.to_string(),
            command: command.iter().map(|s| s.to_string()).collect(),
            env: vec![("SEED".to_string(), "7".to_string())],
            timeout_secs: 0,
        }
    }

    async fn open_log(dir: &tempfile::TempDir) -> IterationLog {
        IterationLog::open(dir.path().join("iter1.log")).await.unwrap()
    }

    #[test]
    fn test_job_result_passed() {
        let result = JobResult {
            job_name: "lstm".to_string(),
            exit_code: Some(0),
            duration_ms: 100,
            error: None,
        };
        assert!(result.passed());
        assert!(result.failure_reason().is_none());
    }

    #[test]
    fn test_job_result_failed() {
        let result = JobResult {
            job_name: "lstm".to_string(),
            exit_code: Some(2),
            duration_ms: 100,
            error: None,
        };
        assert!(!result.passed());
        assert!(result.failure_reason().unwrap().contains("code 2"));
    }

    #[tokio::test]
    async fn test_execute_streams_both_streams() {
        let dir = tempfile::tempdir().unwrap();
        let log = open_log(&dir).await;
        let job = job("echo", &["sh", "-c", "echo out-$SEED; echo err-line >&2"]);

        let result = JobRunner::execute_job(&job, &log).await.expect("execute failed");
        assert!(result.passed());
        log.sync().await.unwrap();

        let body = std::fs::read_to_string(log.path()).unwrap();
        assert!(body.contains("[echo] out-7"));
        assert!(body.contains("[echo] err-line"));
    }

    #[tokio::test]
    async fn test_non_utf8_output_is_logged_lossily() {
        let dir = tempfile::tempdir().unwrap();
        let log = open_log(&dir).await;
        let job = job(
            "latin1",
            &["sh", "-c", "printf 'caf\\351\\r\\n'; echo after; exit 0"],
        );

        let result = JobRunner::execute_job(&job, &log).await.expect("execute failed");
        assert!(result.passed());
        assert_eq!(result.exit_code, Some(0));
        log.sync().await.unwrap();

        let body = std::fs::read_to_string(log.path()).unwrap();
        assert!(body.contains("[latin1] caf\u{FFFD}\n"));
        assert!(body.contains("[latin1] after"));
    }

    #[tokio::test]
    async fn test_execute_failing_command() {
        let dir = tempfile::tempdir().unwrap();
        let log = open_log(&dir).await;
        let result = JobRunner::execute_job(&job("false_test", &["false"]), &log)
            .await
            .expect("execute failed");
        assert!(!result.passed());
        assert_ne!(result.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let log = open_log(&dir).await;
        let err = JobRunner::execute_job(&job("ghost", &["seedbench-no-such-binary"]), &log)
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_empty_command() {
        let dir = tempfile::tempdir().unwrap();
        let log = open_log(&dir).await;
        let err = JobRunner::execute_job(&job("empty", &[]), &log)
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::EmptyCommand(_)));
    }

    #[tokio::test]
    async fn test_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let log = open_log(&dir).await;
        let mut slow = job("slow", &["sleep", "5"]);
        slow.timeout_secs = 1;
        let err = JobRunner::execute_job(&slow, &log).await.unwrap_err();
        assert!(matches!(err, RunnerError::Timeout { secs: 1, .. }));
    }
}
