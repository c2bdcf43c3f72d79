//! Face-landmark detection boundary.
//!
//! The detector itself is single-flight: one request at a time per instance.
//! [`LandmarkHub`] owns the detector in a worker task and gives callers two
//! independent channels:
//! - request/response (`detect`): each job carries its own `oneshot` reply,
//!   so a one-shot request can never receive someone else's result;
//! - broadcast (`subscribe`): every detection, one-shot or `track`ed, is
//!   also published for live subscribers.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::capture::frame::Frame;
use crate::capture::types::LandmarkSet;

/// Face-mesh indices read by the estimators.
pub mod index {
    pub const LEFT_BROW_INNER: usize = 66;
    pub const RIGHT_BROW_INNER: usize = 296;
    pub const LEFT_BROW_OUTER: usize = 107;
    pub const RIGHT_BROW_OUTER: usize = 336;
    pub const LEFT_EYE_TOP: usize = 159;
    pub const RIGHT_EYE_TOP: usize = 386;
    pub const LEFT_EYE_BOTTOM: usize = 145;
    pub const RIGHT_EYE_BOTTOM: usize = 374;
    pub const LEFT_EYE_INNER: usize = 133;
    pub const RIGHT_EYE_INNER: usize = 362;
    pub const LEFT_EYE_OUTER: usize = 33;
    pub const RIGHT_EYE_OUTER: usize = 263;
    pub const LEFT_MOUTH_CORNER: usize = 61;
    pub const RIGHT_MOUTH_CORNER: usize = 291;
    pub const UPPER_LIP: usize = 13;
    pub const LOWER_LIP: usize = 14;
    pub const CHIN: usize = 152;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum LandmarkError {
    #[error("landmark detector failed to initialize: {0}")]
    Initialization(String),
    #[error("landmark detection failed: {0}")]
    Detection(String),
    #[error("landmark detection timed out after {0:?}")]
    Timeout(Duration),
    #[error("landmark hub is closed")]
    Closed,
}

/// External landmark detector.
pub trait LandmarkSource: Send + 'static {
    /// One-time setup; must complete before the first `detect`.
    fn initialize(&mut self) -> BoxFuture<'_, Result<(), LandmarkError>>;

    /// Zero or one face per frame.
    fn detect(&mut self, frame: Frame) -> BoxFuture<'_, Result<Option<LandmarkSet>, LandmarkError>>;
}

#[derive(Debug, Clone)]
pub struct LandmarkUpdate {
    pub sequence: u64,
    pub landmarks: Option<Arc<LandmarkSet>>,
}

enum Job {
    OneShot {
        frame: Frame,
        reply: oneshot::Sender<Result<Option<LandmarkSet>, LandmarkError>>,
    },
    Track {
        frame: Frame,
    },
}

const JOB_QUEUE_DEPTH: usize = 32;
const UPDATE_BUFFER: usize = 16;

#[derive(Clone)]
pub struct LandmarkHub {
    jobs: mpsc::Sender<Job>,
    updates: broadcast::Sender<LandmarkUpdate>,
    worker: Arc<JoinHandle<()>>,
}

impl LandmarkHub {
    /// Initializes the detector, then moves it into the worker task.
    pub async fn start<S: LandmarkSource>(mut source: S) -> Result<Self, LandmarkError> {
        source.initialize().await?;
        tracing::info!("Landmark detector initialized");

        let (jobs_tx, jobs_rx) = mpsc::channel(JOB_QUEUE_DEPTH);
        let (updates_tx, _) = broadcast::channel(UPDATE_BUFFER);
        let worker = tokio::spawn(run_worker(source, jobs_rx, updates_tx.clone()));

        Ok(Self {
            jobs: jobs_tx,
            updates: updates_tx,
            worker: Arc::new(worker),
        })
    }

    /// One-shot request. Queued behind in-flight jobs; resolves with this frame's result only.
    pub async fn detect(&self, frame: Frame) -> Result<Option<LandmarkSet>, LandmarkError> {
        let (reply, rx) = oneshot::channel();
        self.jobs
            .send(Job::OneShot { frame, reply })
            .await
            .map_err(|_| LandmarkError::Closed)?;
        rx.await.map_err(|_| LandmarkError::Closed)?
    }

    /// `detect` bounded by a wall-clock budget.
    pub async fn detect_within(
        &self,
        frame: Frame,
        budget: Duration,
    ) -> Result<Option<LandmarkSet>, LandmarkError> {
        match tokio::time::timeout(budget, self.detect(frame)).await {
            Ok(result) => result,
            Err(_) => Err(LandmarkError::Timeout(budget)),
        }
    }

    /// Continuous tracking: results go to subscribers only. Dropped when the queue is full.
    pub fn track(&self, frame: Frame) -> bool {
        self.jobs.try_send(Job::Track { frame }).is_ok()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LandmarkUpdate> {
        self.updates.subscribe()
    }

    pub fn shutdown(&self) {
        self.worker.abort();
    }
}

async fn run_worker<S: LandmarkSource>(
    mut source: S,
    mut jobs: mpsc::Receiver<Job>,
    updates: broadcast::Sender<LandmarkUpdate>,
) {
    let mut sequence: u64 = 0;
    while let Some(job) = jobs.recv().await {
        sequence += 1;
        match job {
            Job::OneShot { frame, reply } => {
                // 调用方已超时放弃的请求直接丢弃，避免积压在新请求之前
                if reply.is_closed() {
                    tracing::debug!(sequence, "Skipping abandoned detection request");
                    continue;
                }
                let result = source.detect(frame).await;
                if let Ok(found) = &result {
                    publish(&updates, sequence, found.clone());
                }
                // 调用方可能已超时放弃，回复失败属于正常情况
                let _ = reply.send(result);
            }
            Job::Track { frame } => match source.detect(frame).await {
                Ok(found) => publish(&updates, sequence, found),
                Err(e) => tracing::debug!(error = %e, sequence, "Tracking detection failed"),
            },
        }
    }
    tracing::debug!("Landmark hub worker stopped");
}

fn publish(
    updates: &broadcast::Sender<LandmarkUpdate>,
    sequence: u64,
    landmarks: Option<LandmarkSet>,
) {
    if updates.receiver_count() == 0 {
        return;
    }
    let _ = updates.send(LandmarkUpdate {
        sequence,
        landmarks: landmarks.map(Arc::new),
    });
}
