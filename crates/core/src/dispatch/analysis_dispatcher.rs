use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::JoinHandle;

use thiserror::Error;
use tokio::sync::oneshot;

use crate::analysis::domain::engine_handle::EngineHandle;
use crate::analysis::domain::face_metrics::FaceMetrics;
use crate::analysis::domain::frame_analyzer::AnalysisError;
use crate::shared::frame::Frame;

/// Engine returned from a worker together with the outcome of one frame.
#[derive(Debug)]
pub struct Dispatched {
    pub engine: EngineHandle,
    pub outcome: Result<FaceMetrics, AnalysisError>,
}

/// The pool could not run a job. The engine has been closed.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("analysis pool is shut down")]
    PoolClosed,
    #[error("analysis worker exited before replying")]
    WorkerLost,
}

struct Job {
    engine: EngineHandle,
    frame: Frame,
    reply: oneshot::Sender<Dispatched>,
}

/// Bounded pool of OS threads that runs blocking analysis off the async runtime.
///
/// Engines travel with their jobs: a worker takes ownership of the engine,
/// analyzes one frame and hands the engine back through the reply channel.
/// Since a session always awaits its reply before submitting again, no engine
/// is ever inside two jobs at once and the queue holds at most one job per
/// live session. A panic inside the engine is contained to its frame.
pub struct AnalysisDispatcher {
    jobs: Option<crossbeam_channel::Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl AnalysisDispatcher {
    /// Spawn `workers` analysis threads (at least one).
    pub fn new(workers: usize) -> std::io::Result<Self> {
        let workers = workers.max(1);
        let (tx, rx) = crossbeam_channel::unbounded::<Job>();

        let handles = (0..workers)
            .map(|i| {
                let rx = rx.clone();
                std::thread::Builder::new()
                    .name(format!("analysis-worker-{i}"))
                    .spawn(move || worker_loop(rx))
            })
            .collect::<std::io::Result<Vec<_>>>()?;

        log::info!("Analysis pool started with {workers} workers");
        Ok(Self {
            jobs: Some(tx),
            workers: handles,
        })
    }

    /// Number of worker threads.
    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    /// Analyze `frame` with `engine` on a worker thread.
    ///
    /// Suspends the calling task, never the runtime thread. If the returned
    /// future is dropped mid-flight the worker still finishes the frame and
    /// the engine is closed when its reply goes undelivered.
    pub async fn run(
        &self,
        engine: EngineHandle,
        frame: Frame,
    ) -> Result<Dispatched, DispatchError> {
        let jobs = self.jobs.as_ref().ok_or(DispatchError::PoolClosed)?;
        let (reply, done) = oneshot::channel();
        jobs.send(Job {
            engine,
            frame,
            reply,
        })
        .map_err(|_| DispatchError::PoolClosed)?;
        done.await.map_err(|_| DispatchError::WorkerLost)
    }
}

impl Drop for AnalysisDispatcher {
    fn drop(&mut self) {
        // Workers exit once the queue is closed and drained.
        self.jobs.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                log::error!("Analysis worker terminated abnormally");
            }
        }
        log::debug!("Analysis pool stopped");
    }
}

impl std::fmt::Debug for AnalysisDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisDispatcher")
            .field("workers", &self.workers.len())
            .finish()
    }
}

fn worker_loop(rx: crossbeam_channel::Receiver<Job>) {
    for job in rx {
        let Job {
            mut engine,
            frame,
            reply,
        } = job;

        let outcome = catch_unwind(AssertUnwindSafe(|| engine.analyze(&frame)))
            .unwrap_or_else(|_| {
                log::error!("Analyzer panicked on frame {}", frame.sequence());
                Err(AnalysisError::Panicked)
            });

        // An undelivered reply drops the engine here, which closes it. A
        // panicking close must not take the worker with it.
        if let Err(undelivered) = reply.send(Dispatched { engine, outcome }) {
            log::debug!("Requester gone before frame {} completed", frame.sequence());
            if catch_unwind(AssertUnwindSafe(move || drop(undelivered))).is_err() {
                log::error!("Analyzer panicked while closing after frame {}", frame.sequence());
            }
        }
    }
}
