use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;

use biomirror_backend::capture::landmarks::index;
use biomirror_backend::capture::pipeline::fallback_bundle;
use biomirror_backend::capture::{
    AnalysisProgress, AnalysisStage, Camera, CaptureConfig, CaptureError, EstimatorError,
    FeatureBundle, FeatureExtractor, Frame, GeneratedStream, Jitter, LandmarkError, LandmarkPoint,
    LandmarkSet, LandmarkSource, ProgressSink, SharedStream,
};

pub fn gray_stream() -> Arc<GeneratedStream<impl Fn(u64) -> Frame + Send + Sync>> {
    Arc::new(GeneratedStream::new(640, 480, |_| Frame::filled(640, 480, [128, 128, 128])))
}

/// Green channel alternates frame to frame, so the forehead ROI carries a pulse-like signal.
pub fn pulsing_stream() -> Arc<GeneratedStream<impl Fn(u64) -> Frame + Send + Sync>> {
    Arc::new(GeneratedStream::new(640, 480, |n| {
        let green = if n % 2 == 0 { 140 } else { 120 };
        Frame::filled(640, 480, [200, green, 100])
    }))
}

/// Live stream whose frames are all empty: nothing to sample, nothing to inspect.
pub fn starved_stream() -> Arc<GeneratedStream<impl Fn(u64) -> Frame + Send + Sync>> {
    Arc::new(GeneratedStream::new(640, 480, |_| Frame::filled(0, 0, [0, 0, 0])))
}

/// Hands out the same stream on every acquisition.
pub struct FakeCamera {
    pub stream: SharedStream,
}

impl Camera for FakeCamera {
    fn acquire(&self) -> BoxFuture<'_, Result<SharedStream, CaptureError>> {
        let stream = self.stream.clone();
        Box::pin(async move { Ok(stream) })
    }
}

pub struct DeniedCamera;

impl Camera for DeniedCamera {
    fn acquire(&self) -> BoxFuture<'_, Result<SharedStream, CaptureError>> {
        Box::pin(async { Err(CaptureError::PermissionDenied) })
    }
}

#[derive(Clone, Copy)]
pub enum Behaviour {
    /// Sleeps, then returns a fixed bundle.
    Delay(Duration),
    /// Reports out-of-order progress, then never resolves.
    StallAfterProgress,
    Pending,
}

/// Counts extraction runs; each run behaves per `behaviour`.
pub struct ScriptedExtractor {
    pub behaviour: Behaviour,
    pub calls: Arc<AtomicUsize>,
    pub bundle: FeatureBundle,
}

impl ScriptedExtractor {
    pub fn new(behaviour: Behaviour) -> Self {
        let mut bundle = fallback_bundle(&CaptureConfig::default(), &mut Jitter::seeded(1));
        bundle.pulse.vector.heart_rate = 66.0;
        Self {
            behaviour,
            calls: Arc::new(AtomicUsize::new(0)),
            bundle,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FeatureExtractor for ScriptedExtractor {
    fn extract(
        &self,
        _stream: SharedStream,
        _jitter: Jitter,
        progress: ProgressSink,
    ) -> BoxFuture<'static, Result<FeatureBundle, EstimatorError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behaviour = self.behaviour;
        let bundle = self.bundle;
        Box::pin(async move {
            match behaviour {
                Behaviour::Delay(d) => {
                    tokio::time::sleep(d).await;
                    Ok(bundle)
                }
                Behaviour::StallAfterProgress => {
                    progress(AnalysisProgress::at(AnalysisStage::Pulse, 0.5));
                    progress(AnalysisProgress::at(AnalysisStage::Expression, 0.5));
                    futures::future::pending().await
                }
                Behaviour::Pending => futures::future::pending().await,
            }
        })
    }
}

/// Face with level brows, open eyes (aperture ratio 0.3) and a closed mouth.
pub fn neutral_face() -> LandmarkSet {
    let mut points = vec![LandmarkPoint::new(0.5, 0.5, 0.0); LandmarkSet::MESH_POINTS];
    let mut set = |i: usize, x: f64, y: f64| points[i] = LandmarkPoint::new(x, y, 0.0);
    set(index::LEFT_BROW_INNER, 0.45, 0.30);
    set(index::RIGHT_BROW_INNER, 0.55, 0.30);
    set(index::LEFT_BROW_OUTER, 0.35, 0.32);
    set(index::RIGHT_BROW_OUTER, 0.65, 0.32);
    set(index::LEFT_EYE_TOP, 0.45, 0.33);
    set(index::RIGHT_EYE_TOP, 0.55, 0.33);
    set(index::LEFT_EYE_BOTTOM, 0.45, 0.36);
    set(index::RIGHT_EYE_BOTTOM, 0.55, 0.36);
    set(index::LEFT_EYE_OUTER, 0.40, 0.345);
    set(index::LEFT_EYE_INNER, 0.50, 0.345);
    set(index::RIGHT_EYE_INNER, 0.50, 0.345);
    set(index::RIGHT_EYE_OUTER, 0.60, 0.345);
    set(index::LEFT_MOUTH_CORNER, 0.44, 0.70);
    set(index::RIGHT_MOUTH_CORNER, 0.56, 0.70);
    set(index::UPPER_LIP, 0.50, 0.69);
    set(index::LOWER_LIP, 0.50, 0.71);
    set(index::CHIN, 0.50, 0.85);
    LandmarkSet::new(points)
}

/// Detector that finds `face` in every frame, or nothing when `face` is `None`.
pub struct FixedDetector {
    pub face: Option<LandmarkSet>,
}

impl LandmarkSource for FixedDetector {
    fn initialize(&mut self) -> BoxFuture<'_, Result<(), LandmarkError>> {
        Box::pin(async { Ok(()) })
    }

    fn detect(&mut self, _frame: Frame) -> BoxFuture<'_, Result<Option<LandmarkSet>, LandmarkError>> {
        let face = self.face.clone();
        Box::pin(async move { Ok(face) })
    }
}

/// Detector that accepts frames and never answers.
pub struct SilentDetector;

impl LandmarkSource for SilentDetector {
    fn initialize(&mut self) -> BoxFuture<'_, Result<(), LandmarkError>> {
        Box::pin(async { Ok(()) })
    }

    fn detect(&mut self, _frame: Frame) -> BoxFuture<'_, Result<Option<LandmarkSet>, LandmarkError>> {
        Box::pin(futures::future::pending())
    }
}
