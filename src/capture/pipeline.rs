//! Runs the four estimators in sequence against one stream.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::Serialize;

use crate::capture::config::CaptureConfig;
use crate::capture::frame::SharedStream;
use crate::capture::jitter::Jitter;
use crate::capture::landmarks::LandmarkHub;
use crate::capture::types::{ExpressionVector, FeatureBundle};
use crate::capture::{complexion, expression, gaze, pulse};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AnalysisStage {
    Expression,
    Pulse,
    Complexion,
    Gaze,
}

impl AnalysisStage {
    /// Percent range each stage occupies in the overall progress.
    fn span(self) -> (f64, f64) {
        match self {
            Self::Expression => (0.0, 40.0),
            Self::Pulse => (40.0, 80.0),
            Self::Complexion => (80.0, 90.0),
            Self::Gaze => (90.0, 100.0),
        }
    }

    pub fn status_line(self) -> &'static str {
        match self {
            Self::Expression => "Reading facial expression",
            Self::Pulse => "Measuring pulse",
            Self::Complexion => "Inspecting complexion",
            Self::Gaze => "Checking gaze",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisProgress {
    pub stage: AnalysisStage,
    /// 0..=100
    pub percent: f64,
}

impl AnalysisProgress {
    pub fn at(stage: AnalysisStage, fraction: f64) -> Self {
        let (from, to) = stage.span();
        let fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
        Self {
            stage,
            percent: from + (to - from) * fraction,
        }
    }
}

pub type ProgressSink = Arc<dyn Fn(AnalysisProgress) + Send + Sync>;

pub fn silent_progress() -> ProgressSink {
    Arc::new(|_| {})
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum EstimatorError {
    #[error("{stage:?} estimator exceeded {budget:?}")]
    Timeout {
        stage: AnalysisStage,
        budget: Duration,
    },
    #[error("camera stream is no longer live")]
    StreamLost,
}

/// Every stage's fallback at once.
pub fn fallback_bundle(config: &CaptureConfig, jitter: &mut Jitter) -> FeatureBundle {
    FeatureBundle {
        expression: ExpressionVector::zero(),
        pulse: pulse::fallback(&config.pulse, jitter),
        complexion: complexion::default_vector(&config.complexion),
        gaze: gaze::NEUTRAL,
    }
}

/// Produces a full bundle from a live stream. Only stream loss is an error;
/// individual estimator failures degrade to that estimator's fallback.
pub trait FeatureExtractor: Send + Sync {
    fn extract(
        &self,
        stream: SharedStream,
        jitter: Jitter,
        progress: ProgressSink,
    ) -> BoxFuture<'static, Result<FeatureBundle, EstimatorError>>;
}

#[derive(Clone)]
pub struct EstimatorPipeline {
    hub: LandmarkHub,
    config: Arc<CaptureConfig>,
}

impl EstimatorPipeline {
    pub fn new(hub: LandmarkHub, config: Arc<CaptureConfig>) -> Self {
        Self { hub, config }
    }

    async fn run(
        &self,
        stream: SharedStream,
        mut jitter: Jitter,
        progress: ProgressSink,
    ) -> Result<FeatureBundle, EstimatorError> {
        if !stream.is_live() {
            return Err(EstimatorError::StreamLost);
        }
        let config = &self.config;

        let on_expression =
            |f: f64| progress(AnalysisProgress::at(AnalysisStage::Expression, f));
        let capture = guarded(
            AnalysisStage::Expression,
            config.expression.budget(),
            expression::estimate_frames(&self.hub, stream.as_ref(), &config.expression, &on_expression),
        )
        .await
        .unwrap_or_default();
        progress(AnalysisProgress::at(AnalysisStage::Expression, 1.0));

        let on_pulse = |f: f64| progress(AnalysisProgress::at(AnalysisStage::Pulse, f));
        let pulse = pulse::estimate(stream.as_ref(), &config.pulse, &mut jitter, &on_pulse).await;
        progress(AnalysisProgress::at(AnalysisStage::Pulse, 1.0));

        let frame = stream.grab();
        let complexion = complexion::estimate(frame.as_ref(), &config.complexion);
        progress(AnalysisProgress::at(AnalysisStage::Complexion, 1.0));

        let gaze = gaze::estimate(capture.landmarks.as_ref(), &config.gaze, &mut jitter);
        progress(AnalysisProgress::at(AnalysisStage::Gaze, 1.0));

        if !stream.is_live() {
            return Err(EstimatorError::StreamLost);
        }

        tracing::info!(
            expression_frames = capture.frames_used,
            pulse_samples = pulse.samples,
            pulse_fallback = pulse.is_fallback(),
            face_found = capture.landmarks.is_some(),
            "Feature extraction finished"
        );

        Ok(FeatureBundle {
            expression: capture.vector,
            pulse,
            complexion,
            gaze,
        })
    }
}

impl FeatureExtractor for EstimatorPipeline {
    fn extract(
        &self,
        stream: SharedStream,
        jitter: Jitter,
        progress: ProgressSink,
    ) -> BoxFuture<'static, Result<FeatureBundle, EstimatorError>> {
        let pipeline = self.clone();
        Box::pin(async move { pipeline.run(stream, jitter, progress).await })
    }
}

/// `None` when the stage exceeded its budget; the caller substitutes the fallback.
async fn guarded<T>(stage: AnalysisStage, budget: Duration, fut: impl Future<Output = T>) -> Option<T> {
    match tokio::time::timeout(budget, fut).await {
        Ok(value) => Some(value),
        Err(_) => {
            let err = EstimatorError::Timeout { stage, budget };
            tracing::warn!(error = %err, "Estimator fallback substituted");
            None
        }
    }
}
