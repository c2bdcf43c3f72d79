//! 单次采集会话状态机
//!
//! `Idle → Recording → Analyzing → Transcribed`，每个阶段（before/after）一个实例。
//! 倒计时剩余 `pre_analysis_at` 时在后台推测性地跑完整提取流程；倒计时结束时
//! 若后台已完成则直接使用其结果，否则中止后台任务并在前台重跑。

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::capture::config::CaptureConfig;
use crate::capture::frame::{Camera, CaptureError, SharedStream};
use crate::capture::jitter::Jitter;
use crate::capture::pipeline::{
    fallback_bundle, silent_progress, AnalysisProgress, EstimatorError, FeatureExtractor,
    ProgressSink,
};
use crate::capture::types::{CaptureStage, FeatureBundle, FeatureRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Idle,
    Recording,
    Analyzing,
    Transcribed,
}

/// Where the bundle of a finished analysis came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AnalysisSource {
    /// Background pre-analysis finished before the countdown ended.
    Cached,
    Foreground,
    /// Foreground analysis exceeded `analysis_timeout_ms`.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub remaining_ticks: u32,
    pub progress: f64,
    pub status: String,
}

impl SessionSnapshot {
    fn idle(status: impl Into<String>) -> Self {
        Self {
            state: SessionState::Idle,
            remaining_ticks: 0,
            progress: 0.0,
            status: status.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Camera(#[from] CaptureError),
    #[error("camera stream lost")]
    StreamLost,
    #[error("self-report must not be blank")]
    EmptySelfReport,
    #[error("self-report exceeds {max} characters")]
    SelfReportTooLong { max: usize },
    #[error("session already completed")]
    AlreadyCompleted,
    #[error("cannot {operation} while {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
}

type Background = JoinHandle<Result<FeatureBundle, EstimatorError>>;

pub struct CaptureSession {
    stage: CaptureStage,
    participant_id: String,
    config: Arc<CaptureConfig>,
    camera: Arc<dyn Camera>,
    extractor: Arc<dyn FeatureExtractor>,
    jitter: Jitter,
    state: SessionState,
    remaining: u32,
    stream: Option<SharedStream>,
    background: Option<Background>,
    bundle: Option<FeatureBundle>,
    source: Option<AnalysisSource>,
    completed: bool,
    snapshots: Arc<watch::Sender<SessionSnapshot>>,
}

impl CaptureSession {
    pub fn new(
        stage: CaptureStage,
        participant_id: impl Into<String>,
        config: Arc<CaptureConfig>,
        camera: Arc<dyn Camera>,
        extractor: Arc<dyn FeatureExtractor>,
    ) -> Self {
        let jitter = Jitter::from_seed_option(config.seed);
        let (tx, _) = watch::channel(SessionSnapshot::idle("Ready"));
        Self {
            stage,
            participant_id: participant_id.into(),
            config,
            camera,
            extractor,
            jitter,
            state: SessionState::Idle,
            remaining: 0,
            stream: None,
            background: None,
            bundle: None,
            source: None,
            completed: false,
            snapshots: Arc::new(tx),
        }
    }

    pub fn stage(&self) -> CaptureStage {
        self.stage
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn remaining_ticks(&self) -> u32 {
        self.remaining
    }

    pub fn bundle(&self) -> Option<&FeatureBundle> {
        self.bundle.as_ref()
    }

    pub fn analysis_source(&self) -> Option<AnalysisSource> {
        self.source
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.subscribe()
    }

    /// `Idle → Recording`. A camera failure leaves the session `Idle`.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        self.expect_state(SessionState::Idle, "start recording")?;

        let stream = match self.camera.acquire().await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(error = %e, stage = self.stage.as_str(), "Camera acquisition failed");
                self.publish_idle("Camera unavailable");
                return Err(e.into());
            }
        };

        self.stream = Some(stream);
        self.remaining = self.config.session.countdown_ticks;
        self.state = SessionState::Recording;
        tracing::info!(
            stage = self.stage.as_str(),
            participant_id = %self.participant_id,
            ticks = self.remaining,
            "Recording started"
        );
        self.publish("Recording");
        Ok(())
    }

    /// One countdown step. Spawns the background pre-analysis at the
    /// configured threshold and moves to `Analyzing` at zero.
    pub fn tick(&mut self) -> Result<SessionState, SessionError> {
        self.expect_state(SessionState::Recording, "tick")?;

        let live = self.stream.as_ref().filter(|s| s.is_live()).cloned();
        let Some(stream) = live else {
            return Err(self.fail(SessionError::StreamLost));
        };

        self.remaining = self.remaining.saturating_sub(1);

        if self.remaining == self.config.session.pre_analysis_at && self.background.is_none() {
            let fut = self.extractor.extract(stream, self.jitter.fork(), silent_progress());
            self.background = Some(tokio::spawn(fut));
            tracing::debug!(remaining = self.remaining, "Background pre-analysis spawned");
        }

        if self.remaining == 0 {
            self.state = SessionState::Analyzing;
            self.publish("Analyzing");
        } else {
            self.publish("Recording");
        }
        Ok(self.state)
    }

    /// `Analyzing → Transcribed`. Uses a finished background result as is;
    /// otherwise aborts it and runs the pipeline in the foreground, bounded by
    /// `analysis_timeout_ms`. Releases the camera on success.
    pub async fn analyze(&mut self) -> Result<FeatureBundle, SessionError> {
        self.expect_state(SessionState::Analyzing, "analyze")?;

        let cached = match self.background.take() {
            Some(handle) if handle.is_finished() => match handle.await {
                Ok(Ok(bundle)) => Some(bundle),
                Ok(Err(EstimatorError::StreamLost)) => {
                    return Err(self.fail(SessionError::StreamLost));
                }
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "Background pre-analysis failed");
                    None
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Background pre-analysis panicked");
                    None
                }
            },
            Some(handle) => {
                handle.abort();
                tracing::debug!("Background pre-analysis unfinished, aborted");
                None
            }
            None => None,
        };

        let (bundle, source) = match cached {
            Some(bundle) => (bundle, AnalysisSource::Cached),
            None => self.foreground().await?,
        };

        if let Some(stream) = self.stream.take() {
            stream.stop();
        }
        self.bundle = Some(bundle);
        self.source = Some(source);
        self.state = SessionState::Transcribed;
        self.snapshots.send_modify(|s| {
            s.state = SessionState::Transcribed;
            s.remaining_ticks = 0;
            s.progress = 100.0;
            s.status = "Analysis complete".to_string();
        });
        tracing::info!(stage = self.stage.as_str(), source = ?source, "Analysis finished");
        Ok(bundle)
    }

    async fn foreground(&mut self) -> Result<(FeatureBundle, AnalysisSource), SessionError> {
        let Some(stream) = self.stream.clone() else {
            return Err(self.fail(SessionError::StreamLost));
        };
        let budget = Duration::from_millis(self.config.session.analysis_timeout_ms);
        let fut = self.extractor.extract(stream, self.jitter.fork(), self.progress_sink());

        match tokio::time::timeout(budget, fut).await {
            Ok(Ok(bundle)) => Ok((bundle, AnalysisSource::Foreground)),
            Ok(Err(EstimatorError::StreamLost)) => Err(self.fail(SessionError::StreamLost)),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Foreground analysis failed, using fallbacks");
                Ok((fallback_bundle(&self.config, &mut self.jitter), AnalysisSource::Fallback))
            }
            Err(_) => {
                tracing::warn!(
                    budget_ms = budget.as_millis() as u64,
                    "Foreground analysis timed out, using fallbacks"
                );
                Ok((fallback_bundle(&self.config, &mut self.jitter), AnalysisSource::Fallback))
            }
        }
    }

    /// Drives the session from its current state to `Transcribed`, one tick per `tick_ms`.
    pub async fn run(&mut self) -> Result<FeatureBundle, SessionError> {
        if self.state == SessionState::Idle {
            self.start().await?;
        }
        let period = Duration::from_millis(self.config.session.tick_ms);
        while self.state == SessionState::Recording {
            tokio::time::sleep(period).await;
            self.tick()?;
        }
        self.analyze().await
    }

    /// Terminal step: attaches the self-report and hands out the record once.
    pub fn complete(&mut self, self_report: &str) -> Result<FeatureRecord, SessionError> {
        if self.completed {
            return Err(SessionError::AlreadyCompleted);
        }
        self.expect_state(SessionState::Transcribed, "complete")?;

        let text = self_report.trim();
        if text.is_empty() {
            return Err(SessionError::EmptySelfReport);
        }
        let max = self.config.session.max_self_report_chars;
        if text.chars().count() > max {
            return Err(SessionError::SelfReportTooLong { max });
        }
        let bundle = self.bundle.ok_or(SessionError::InvalidState {
            operation: "complete",
            state: self.state,
        })?;

        self.completed = true;
        Ok(FeatureRecord::new(
            self.stage,
            self.participant_id.clone(),
            &bundle,
            text,
            Utc::now(),
        ))
    }

    fn expect_state(&self, expected: SessionState, operation: &'static str) -> Result<(), SessionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    /// Reverts to `Idle` and releases everything. No retry.
    fn fail(&mut self, error: SessionError) -> SessionError {
        tracing::warn!(error = %error, stage = self.stage.as_str(), state = ?self.state, "Capture session reset");
        if let Some(handle) = self.background.take() {
            handle.abort();
        }
        if let Some(stream) = self.stream.take() {
            stream.stop();
        }
        self.remaining = 0;
        self.state = SessionState::Idle;
        self.publish_idle(error.to_string());
        error
    }

    fn publish(&self, status: &str) {
        let state = self.state;
        let remaining = self.remaining;
        self.snapshots.send_modify(|s| {
            s.state = state;
            s.remaining_ticks = remaining;
            s.status = status.to_string();
        });
    }

    fn publish_idle(&self, status: impl Into<String>) {
        self.snapshots.send_replace(SessionSnapshot::idle(status));
    }

    /// Forwards pipeline progress, keeping the published value non-decreasing.
    fn progress_sink(&self) -> ProgressSink {
        let snapshots = self.snapshots.clone();
        Arc::new(move |p: AnalysisProgress| {
            snapshots.send_if_modified(|s| {
                if p.percent > s.progress {
                    s.progress = p.percent;
                    s.status = p.stage.status_line().to_string();
                    true
                } else {
                    false
                }
            });
        })
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if let Some(handle) = self.background.take() {
            handle.abort();
        }
        if let Some(stream) = self.stream.take() {
            stream.stop();
        }
    }
}
