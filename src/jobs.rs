use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::pdf::document::DocumentError;
use crate::pdf::raster::RasterError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Load,
    Save,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Load => f.write_str("load"),
            JobKind::Save => f.write_str("save"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct JobId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Running { kind: JobKind, progress: u8 },
    Completed { kind: JobKind },
    Failed { kind: JobKind, reason: String },
}

impl JobState {
    pub fn is_running(&self) -> bool {
        matches!(self, JobState::Running { .. })
    }
}

/// Runtime failures of a background job.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("document has no pages")]
    EmptyDocument,

    #[error("failed to rasterize page {page}")]
    Rasterize {
        /// One-based.
        page: usize,
        #[source]
        source: RasterError,
    },

    #[error("failed to write {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("job was cancelled")]
    Cancelled,

    #[error("worker stopped without reporting a result")]
    Abandoned,
}

/// Cooperative cancellation flag, checked by workers between pages.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// `Err(Cancelled)` once cancellation has been requested.
    pub fn check(&self) -> Result<(), JobError> {
        if self.is_cancelled() {
            Err(JobError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug)]
pub enum Signal<T> {
    Progress { job: JobId, percent: u8 },
    Finished { job: JobId, result: Result<T, JobError> },
}

/// What the controller hands back to its owner after applying a signal.
#[derive(Debug)]
pub enum JobEvent<T> {
    Progress { kind: JobKind, percent: u8 },
    Completed { kind: JobKind, output: T },
    Failed { kind: JobKind, error: JobError },
}

/// The worker's end of a job: reports progress and delivers the result.
///
/// Dropping a handle without calling [`JobHandle::finish`] (for example when
/// the worker panics) reports [`JobError::Abandoned`].
#[derive(Debug)]
pub struct JobHandle<T> {
    id: JobId,
    kind: JobKind,
    tx: Option<mpsc::UnboundedSender<Signal<T>>>,
    last_percent: u8,
    cancel: CancellationToken,
}

impl<T> JobHandle<T> {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Report `done` of `total` units finished. Percentages never go down
    /// and never exceed 100.
    pub fn progress(&mut self, done: usize, total: usize) {
        let percent = if total == 0 {
            100
        } else {
            (done.min(total) * 100 / total) as u8
        };
        let percent = percent.max(self.last_percent);
        self.last_percent = percent;
        if let Some(tx) = &self.tx {
            let _ = tx.send(Signal::Progress {
                job: self.id,
                percent,
            });
        }
    }

    pub fn finish(mut self, result: Result<T, JobError>) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Signal::Finished {
                job: self.id,
                result,
            });
        }
    }
}

impl<T> Drop for JobHandle<T> {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            warn!(job = self.id.0, kind = %self.kind, "job handle dropped without a result");
            let _ = tx.send(Signal::Finished {
                job: self.id,
                result: Err(JobError::Abandoned),
            });
        }
    }
}

#[derive(Debug, Clone)]
struct ActiveJob {
    id: JobId,
    cancel: CancellationToken,
}

/// Rejected because another job is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("a {running} job is already running")]
pub struct Busy {
    pub running: JobKind,
}

/// Runs at most one job at a time. Workers report over a channel whose
/// receiving end lives here, so state changes happen on the draining thread.
#[derive(Debug)]
pub struct JobController<T> {
    state: JobState,
    active: Option<ActiveJob>,
    next_id: u64,
    tx: mpsc::UnboundedSender<Signal<T>>,
    rx: mpsc::UnboundedReceiver<Signal<T>>,
}

impl<T> Default for JobController<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> JobController<T> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            state: JobState::Idle,
            active: None,
            next_id: 1,
            tx,
            rx,
        }
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Fails with [`Busy`] if a job is running. A finished job that was not
    /// acknowledged yet is acknowledged here.
    pub fn start(&mut self, kind: JobKind) -> Result<JobHandle<T>, Busy> {
        if let JobState::Running { kind: running, .. } = self.state {
            debug!(requested = %kind, %running, "rejecting job start, controller busy");
            return Err(Busy { running });
        }

        let id = JobId(self.next_id);
        self.next_id += 1;
        let cancel = CancellationToken::new();
        self.active = Some(ActiveJob {
            id,
            cancel: cancel.clone(),
        });
        self.state = JobState::Running { kind, progress: 0 };
        debug!(job = id.0, %kind, "job started");

        Ok(JobHandle {
            id,
            kind,
            tx: Some(self.tx.clone()),
            last_percent: 0,
            cancel,
        })
    }

    /// Request cooperative cancellation of the running job.
    pub fn cancel(&self) -> bool {
        match &self.active {
            Some(active) if self.state.is_running() => {
                active.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Cancel the running job and forget it: the controller returns to
    /// `Idle` and whatever the job reports later is dropped unseen.
    /// Returns whether a job was running.
    pub fn abandon(&mut self) -> bool {
        let Some(active) = self.active.take() else {
            return false;
        };
        let was_running = self.state.is_running();
        if was_running {
            active.cancel.cancel();
            debug!(job = active.id.0, "abandoning running job");
        }
        self.state = JobState::Idle;
        was_running
    }

    /// Return a finished job's state to `Idle`, handing back the terminal state.
    pub fn acknowledge(&mut self) -> JobState {
        if self.state.is_running() {
            return self.state.clone();
        }
        self.active = None;
        std::mem::replace(&mut self.state, JobState::Idle)
    }

    /// Wait for the next signal from the running job and apply it.
    /// Returns `None` when no job is running.
    pub async fn recv(&mut self) -> Option<JobEvent<T>> {
        while self.is_running() {
            let signal = self.rx.recv().await?;
            if let Some(event) = self.apply(signal) {
                return Some(event);
            }
        }
        None
    }

    /// Apply the next pending signal without waiting.
    pub fn try_recv(&mut self) -> Option<JobEvent<T>> {
        while let Ok(signal) = self.rx.try_recv() {
            if let Some(event) = self.apply(signal) {
                return Some(event);
            }
        }
        None
    }

    fn apply(&mut self, signal: Signal<T>) -> Option<JobEvent<T>> {
        let active = self.active.as_ref()?;
        let JobState::Running { kind, progress } = self.state else {
            return None;
        };

        match signal {
            Signal::Progress { job, .. } | Signal::Finished { job, .. } if job != active.id => {
                debug!(job = job.0, "ignoring signal from stale job");
                None
            }
            Signal::Progress { percent, .. } => {
                let percent = percent.clamp(progress, 100);
                self.state = JobState::Running {
                    kind,
                    progress: percent,
                };
                Some(JobEvent::Progress { kind, percent })
            }
            Signal::Finished { result: Ok(output), .. } => {
                debug!(job = active.id.0, %kind, "job completed");
                self.state = JobState::Completed { kind };
                Some(JobEvent::Completed { kind, output })
            }
            Signal::Finished {
                result: Err(error), ..
            } => {
                warn!(job = active.id.0, %kind, error = %error, "job failed");
                self.state = JobState::Failed {
                    kind,
                    reason: error.to_string(),
                };
                Some(JobEvent::Failed { kind, error })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_start_is_busy() {
        let mut jobs = JobController::<()>::new();
        let _handle = jobs.start(JobKind::Load).unwrap();
        assert_eq!(
            jobs.start(JobKind::Save).unwrap_err(),
            Busy {
                running: JobKind::Load
            }
        );
        assert_eq!(
            jobs.state(),
            &JobState::Running {
                kind: JobKind::Load,
                progress: 0
            }
        );
    }

    #[tokio::test]
    async fn test_lifecycle_idle_running_completed_idle() {
        let mut jobs = JobController::<&'static str>::new();
        let mut handle = jobs.start(JobKind::Save).unwrap();
        handle.progress(1, 2);
        handle.progress(2, 2);
        handle.finish(Ok("done"));

        assert!(matches!(
            jobs.recv().await,
            Some(JobEvent::Progress { percent: 50, .. })
        ));
        assert!(matches!(
            jobs.recv().await,
            Some(JobEvent::Progress { percent: 100, .. })
        ));
        assert!(matches!(
            jobs.recv().await,
            Some(JobEvent::Completed { output: "done", .. })
        ));
        assert_eq!(
            jobs.state(),
            &JobState::Completed {
                kind: JobKind::Save
            }
        );
        assert!(jobs.recv().await.is_none());
        assert_eq!(
            jobs.acknowledge(),
            JobState::Completed {
                kind: JobKind::Save
            }
        );
        assert_eq!(jobs.state(), &JobState::Idle);
    }

    #[test]
    fn test_progress_is_monotonic_and_bounded() {
        let mut jobs = JobController::<()>::new();
        let mut handle = jobs.start(JobKind::Load).unwrap();
        handle.progress(3, 4);
        handle.progress(1, 4);
        handle.progress(9, 4);
        drop(handle);

        let mut seen = Vec::new();
        while let Some(event) = jobs.try_recv() {
            if let JobEvent::Progress { percent, .. } = event {
                seen.push(percent);
            }
        }
        assert_eq!(seen, vec![75, 75, 100]);
    }

    #[test]
    fn test_dropped_handle_reports_abandoned() {
        let mut jobs = JobController::<()>::new();
        drop(jobs.start(JobKind::Load).unwrap());
        assert!(matches!(
            jobs.try_recv(),
            Some(JobEvent::Failed {
                error: JobError::Abandoned,
                ..
            })
        ));
        assert!(matches!(jobs.state(), JobState::Failed { .. }));
    }

    #[test]
    fn test_stale_signals_are_ignored() {
        let mut jobs = JobController::<u32>::new();
        let first = jobs.start(JobKind::Load).unwrap();
        first.finish(Ok(1));
        assert!(matches!(
            jobs.try_recv(),
            Some(JobEvent::Completed { output: 1, .. })
        ));

        let _second = jobs.start(JobKind::Save).unwrap();
        let stale = JobHandle {
            id: JobId(1),
            kind: JobKind::Load,
            tx: Some(jobs.tx.clone()),
            last_percent: 0,
            cancel: CancellationToken::new(),
        };
        stale.finish(Ok(99));
        assert!(jobs.try_recv().is_none());
        assert!(jobs.is_running());
    }

    #[test]
    fn test_cancel_reaches_worker_token() {
        let mut jobs = JobController::<()>::new();
        assert!(!jobs.cancel());
        let handle = jobs.start(JobKind::Save).unwrap();
        assert!(jobs.cancel());
        assert!(handle.cancellation().is_cancelled());
        assert!(matches!(
            handle.cancellation().check(),
            Err(JobError::Cancelled)
        ));
    }

    #[test]
    fn test_starting_after_failure_acknowledges_implicitly() {
        let mut jobs = JobController::<()>::new();
        jobs.start(JobKind::Load)
            .unwrap()
            .finish(Err(JobError::EmptyDocument));
        assert!(jobs.try_recv().is_some());
        assert!(jobs.start(JobKind::Load).is_ok());
    }

    #[test]
    fn test_abandoned_job_results_are_dropped() {
        let mut jobs = JobController::<u32>::new();
        assert!(!jobs.abandon());

        let mut handle = jobs.start(JobKind::Load).unwrap();
        assert!(jobs.abandon());
        assert_eq!(jobs.state(), &JobState::Idle);
        assert!(handle.cancellation().is_cancelled());
        assert!(!jobs.cancel());

        handle.progress(1, 2);
        handle.finish(Ok(7));
        assert!(jobs.try_recv().is_none());
        assert_eq!(jobs.state(), &JobState::Idle);

        // the controller is usable again
        jobs.start(JobKind::Save).unwrap().finish(Ok(8));
        assert!(matches!(
            jobs.try_recv(),
            Some(JobEvent::Completed { output: 8, .. })
        ));
    }
}
