//! Biometric extraction core: estimators, landmark hub and the capture
//! session state machine. Nothing here depends on the HTTP or storage layers.

pub mod complexion;
pub mod config;
pub mod expression;
pub mod frame;
pub mod gaze;
pub mod jitter;
pub mod landmarks;
pub mod pipeline;
pub mod pulse;
pub mod session;
pub mod types;

pub use config::CaptureConfig;
pub use frame::{Camera, CaptureError, Frame, FrameSource, GeneratedStream, PixelRect, SharedStream};
pub use jitter::Jitter;
pub use landmarks::{LandmarkError, LandmarkHub, LandmarkSource, LandmarkUpdate};
pub use pipeline::{
    AnalysisProgress, AnalysisStage, EstimatorError, EstimatorPipeline, FeatureExtractor,
    ProgressSink,
};
pub use session::{AnalysisSource, CaptureSession, SessionError, SessionSnapshot, SessionState};
pub use types::{
    CaptureStage, ComplexionVector, ExpressionVector, FeatureBundle, FeatureRecord, GazeVector,
    LandmarkPoint, LandmarkSet, PulseReading, PulseVector, RecordBoundsError, SignalOrigin,
};
