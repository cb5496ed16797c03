//! Shared progress record for the download job.
//!
//! One [`ProgressChannel`] lives for the lifetime of the orchestrator. Each accepted
//! job replaces its [`JobState`] and gets the only [`JobWriter`] allowed to change it;
//! everyone else reads copies. The lock is held for the whole copy or update and
//! never across an `.await`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Idle,
    Starting,
    Downloading,
    Cancelled,
    Completed,
    Error,
}

impl JobStatus {
    /// A job in this state blocks new submissions
    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Starting | JobStatus::Downloading)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Cancelled | JobStatus::Completed | JobStatus::Error)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Idle => "idle",
            JobStatus::Starting => "starting",
            JobStatus::Downloading => "downloading",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// One line of the append-only event log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Default)]
struct JobState {
    job_id: Option<Uuid>,
    status: JobStatus,
    current: usize,
    total: usize,
    current_track: Option<String>,
    successful: usize,
    failed: usize,
    error: Option<String>,
    logs: Vec<LogEntry>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl JobState {
    fn push_log(&mut self, message: String) {
        let index = self.logs.len();
        self.logs.push(LogEntry {
            index,
            timestamp: Utc::now(),
            message,
        });
    }

    fn finish(&mut self, status: JobStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }
}

/// Point-in-time copy of the job state, without the log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: Option<Uuid>,
    pub status: JobStatus,
    pub current: usize,
    pub total: usize,
    pub current_track: Option<String>,
    pub successful: usize,
    pub failed: usize,
    pub error: Option<String>,
    pub log_len: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct ProgressChannel {
    state: Mutex<JobState>,
}

impl ProgressChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, JobState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let state = self.lock();
        JobSnapshot {
            job_id: state.job_id,
            status: state.status,
            current: state.current,
            total: state.total,
            current_track: state.current_track.clone(),
            successful: state.successful,
            failed: state.failed,
            error: state.error.clone(),
            log_len: state.logs.len(),
            started_at: state.started_at,
            finished_at: state.finished_at,
        }
    }

    /// Log entries from `since` onwards; empty when the poller is already caught up
    pub fn logs_since(&self, since: usize) -> Vec<LogEntry> {
        let state = self.lock();
        state.logs.get(since..).map(<[LogEntry]>::to_vec).unwrap_or_default()
    }

    pub fn is_active(&self) -> bool {
        self.lock().status.is_active()
    }

    /// Atomically accept a new job: `None` while another job is starting or
    /// downloading, in which case the current state is left untouched.
    pub fn begin_job(self: &Arc<Self>, total: usize) -> Option<JobWriter> {
        let mut state = self.lock();
        if state.status.is_active() {
            return None;
        }

        let job_id = Uuid::new_v4();
        *state = JobState {
            job_id: Some(job_id),
            status: JobStatus::Starting,
            total,
            started_at: Some(Utc::now()),
            ..JobState::default()
        };

        Some(JobWriter {
            channel: Arc::clone(self),
            job_id,
        })
    }
}

/// Exclusive write handle for one job's state.
///
/// Updates are dropped once the job reached a terminal status or its state has been
/// replaced by a newer job.
#[derive(Debug)]
pub struct JobWriter {
    channel: Arc<ProgressChannel>,
    job_id: Uuid,
}

impl JobWriter {
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    fn update(&self, f: impl FnOnce(&mut JobState)) {
        let mut state = self.channel.lock();
        if state.job_id != Some(self.job_id) || state.status.is_terminal() {
            return;
        }
        f(&mut state);
    }

    pub fn log(&self, message: impl Into<String>) {
        let message = message.into();
        info!(job = %self.job_id, "{}", message);
        self.update(|state| state.push_log(message));
    }

    pub fn set_total(&self, total: usize) {
        self.update(|state| state.total = total);
    }

    pub fn start_downloading(&self) {
        self.update(|state| state.status = JobStatus::Downloading);
    }

    /// Moves the cursor to the 1-based `index` and logs the track being started
    pub fn begin_track(&self, index: usize, label: &str) {
        let message = format!("[{}/{}] {}", index, self.channel.lock().total, label);
        info!(job = %self.job_id, "{}", message);
        self.update(|state| {
            state.current = index;
            state.current_track = Some(label.to_string());
            state.push_log(message);
        });
    }

    pub fn record_success(&self) {
        self.update(|state| state.successful += 1);
    }

    pub fn record_failure(&self) {
        self.update(|state| state.failed += 1);
    }

    pub fn complete(&self) {
        info!(job = %self.job_id, "Download job completed");
        self.update(|state| {
            let message = format!(
                "Completed: {} of {} tracks downloaded",
                state.successful, state.total
            );
            state.push_log(message);
            state.finish(JobStatus::Completed);
        });
    }

    pub fn cancel(&self) {
        info!(job = %self.job_id, "Download job cancelled");
        self.update(|state| {
            state.push_log("Download cancelled".to_string());
            state.finish(JobStatus::Cancelled);
        });
    }

    pub fn fail(&self, error: impl Into<String>) {
        let error = error.into();
        warn!(job = %self.job_id, "Download job failed: {}", error);
        self.update(|state| {
            state.push_log(format!("Error: {}", error));
            state.error = Some(error);
            state.finish(JobStatus::Error);
        });
    }
}
