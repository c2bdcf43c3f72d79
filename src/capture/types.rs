use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capture::complexion;
use crate::capture::config::ComplexionConfig;

/// Normalized face-mesh point, coordinates relative to frame dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LandmarkPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl LandmarkPoint {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// 3-D Euclidean distance.
    pub fn distance(&self, other: &LandmarkPoint) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2) + (self.z - other.z).powi(2))
            .sqrt()
    }

    /// Distance in the image plane only (x/y).
    pub fn planar_distance(&self, other: &LandmarkPoint) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// One detector result: the full face-mesh topology for a single face.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LandmarkSet {
    points: Vec<LandmarkPoint>,
}

impl LandmarkSet {
    /// Minimum topology size (face mesh without refined irises).
    pub const MESH_POINTS: usize = 468;

    pub fn new(points: Vec<LandmarkPoint>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// True when every semantic index the estimators read is present.
    pub fn is_complete(&self) -> bool {
        self.points.len() >= Self::MESH_POINTS
    }

    pub fn point(&self, index: usize) -> Option<&LandmarkPoint> {
        self.points.get(index)
    }

    pub fn points(&self) -> &[LandmarkPoint] {
        &self.points
    }
}

/// Eight facial action intensities, each in [0, 5].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ExpressionVector {
    #[serde(rename = "AU1")]
    pub inner_brow_raise: f64,
    #[serde(rename = "AU4")]
    pub brow_lower: f64,
    #[serde(rename = "AU6")]
    pub cheek_raise: f64,
    #[serde(rename = "AU12")]
    pub lip_corner_pull: f64,
    #[serde(rename = "AU15")]
    pub lip_corner_depress: f64,
    #[serde(rename = "AU17")]
    pub chin_raise: f64,
    #[serde(rename = "AU20")]
    pub lip_stretch: f64,
    #[serde(rename = "AU24")]
    pub lip_press: f64,
}

impl ExpressionVector {
    pub const MAX_INTENSITY: f64 = 5.0;
    pub const WIRE_NAMES: [&'static str; 8] =
        ["AU1", "AU4", "AU6", "AU12", "AU15", "AU17", "AU20", "AU24"];

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn channels(&self) -> [f64; 8] {
        [
            self.inner_brow_raise,
            self.brow_lower,
            self.cheek_raise,
            self.lip_corner_pull,
            self.lip_corner_depress,
            self.chin_raise,
            self.lip_stretch,
            self.lip_press,
        ]
    }

    pub fn from_channels(c: [f64; 8]) -> Self {
        Self {
            inner_brow_raise: c[0],
            brow_lower: c[1],
            cheek_raise: c[2],
            lip_corner_pull: c[3],
            lip_corner_depress: c[4],
            chin_raise: c[5],
            lip_stretch: c[6],
            lip_press: c[7],
        }
    }

    pub fn is_zero(&self) -> bool {
        self.channels().iter().all(|v| *v == 0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PulseVector {
    /// beats per minute
    pub heart_rate: f64,
    /// RMSSD-like magnitude, non-negative
    pub hrv: f64,
    /// breaths per minute
    pub respiration_rate: f64,
}

/// Whether a reduced value came from the signal or from the fixed default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOrigin {
    Measured,
    Fallback,
}

/// Pulse estimate plus provenance. Only `vector` leaves the core.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulseReading {
    pub vector: PulseVector,
    pub heart_rate_origin: SignalOrigin,
    pub hrv_origin: SignalOrigin,
    pub samples: usize,
}

impl PulseReading {
    pub fn is_fallback(&self) -> bool {
        self.heart_rate_origin == SignalOrigin::Fallback && self.hrv_origin == SignalOrigin::Fallback
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplexionVector {
    pub homogeneity: f64,
    pub redness: f64,
    #[serde(alias = "textureRoughness")]
    pub roughness: f64,
    #[serde(alias = "skinVitality")]
    pub vitality: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GazeVector {
    /// blinks per minute
    pub blink_rate: f64,
    #[serde(alias = "pui")]
    pub pupil_unrest: f64,
    /// percent
    pub stability: f64,
    /// 0 = alert, 100 = exhausted
    pub fatigue_index: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaptureStage {
    #[serde(rename = "before", alias = "PRE")]
    Before,
    #[serde(rename = "after", alias = "POST")]
    After,
}

impl CaptureStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Before => "before",
            Self::After => "after",
        }
    }
}

/// The four per-modality vectors of one capture, before the self-report is attached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureBundle {
    pub expression: ExpressionVector,
    pub pulse: PulseReading,
    pub complexion: ComplexionVector,
    pub gaze: GazeVector,
}

/// 客户端提交的记录可能被篡改或来自旧版本，入库前按数据模型的取值范围校验
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordBoundsError {
    #[error("{field} must be a finite number")]
    NotFinite { field: &'static str },
    #[error("{field} = {value} is outside [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("{field} = {value} must not be negative")]
    Negative { field: &'static str, value: f64 },
    #[error("vitality = {actual} does not match homogeneity/roughness (expected {expected})")]
    VitalityMismatch { expected: f64, actual: f64 },
}

/// Slack for clients that round vitality before posting.
const VITALITY_TOLERANCE: f64 = 0.05;

fn finite(field: &'static str, value: f64) -> Result<f64, RecordBoundsError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(RecordBoundsError::NotFinite { field })
    }
}

fn within(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), RecordBoundsError> {
    if (min..=max).contains(&finite(field, value)?) {
        Ok(())
    } else {
        Err(RecordBoundsError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), RecordBoundsError> {
    if finite(field, value)? >= 0.0 {
        Ok(())
    } else {
        Err(RecordBoundsError::Negative { field, value })
    }
}

/// Aggregated output of one completed capture session. Read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureRecord {
    #[serde(default = "Utc::now")]
    timestamp: DateTime<Utc>,
    stage: CaptureStage,
    #[serde(alias = "facs")]
    expression: ExpressionVector,
    #[serde(alias = "bio")]
    pulse: PulseVector,
    #[serde(alias = "skin")]
    complexion: ComplexionVector,
    gaze: GazeVector,
    #[serde(alias = "transcript")]
    self_report: String,
    #[serde(alias = "userId")]
    participant_id: String,
}

impl FeatureRecord {
    pub fn new(
        stage: CaptureStage,
        participant_id: impl Into<String>,
        bundle: &FeatureBundle,
        self_report: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            timestamp,
            stage,
            expression: bundle.expression,
            pulse: bundle.pulse.vector,
            complexion: bundle.complexion,
            gaze: bundle.gaze,
            self_report: self_report.into(),
            participant_id: participant_id.into(),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn stage(&self) -> CaptureStage {
        self.stage
    }

    pub fn expression(&self) -> &ExpressionVector {
        &self.expression
    }

    pub fn pulse(&self) -> &PulseVector {
        &self.pulse
    }

    pub fn complexion(&self) -> &ComplexionVector {
        &self.complexion
    }

    pub fn gaze(&self) -> &GazeVector {
        &self.gaze
    }

    pub fn self_report(&self) -> &str {
        &self.self_report
    }

    pub fn participant_id(&self) -> &str {
        &self.participant_id
    }

    /// Checks every vector against its documented range. `weights` decides the
    /// expected vitality.
    pub fn check_bounds(&self, weights: &ComplexionConfig) -> Result<(), RecordBoundsError> {
        let max = ExpressionVector::MAX_INTENSITY;
        for (field, value) in ExpressionVector::WIRE_NAMES
            .into_iter()
            .zip(self.expression.channels())
        {
            within(field, value, 0.0, max)?;
        }

        non_negative("heartRate", self.pulse.heart_rate)?;
        non_negative("hrv", self.pulse.hrv)?;
        non_negative("respirationRate", self.pulse.respiration_rate)?;

        let c = &self.complexion;
        within("homogeneity", c.homogeneity, 0.0, 100.0)?;
        within("redness", c.redness, 0.0, 100.0)?;
        within("roughness", c.roughness, 0.0, 100.0)?;
        within("vitality", c.vitality, 0.0, 100.0)?;
        let expected = complexion::vitality(c.homogeneity, c.roughness, weights);
        if (expected - c.vitality).abs() > VITALITY_TOLERANCE {
            return Err(RecordBoundsError::VitalityMismatch {
                expected,
                actual: c.vitality,
            });
        }

        non_negative("blinkRate", self.gaze.blink_rate)?;
        non_negative("pupilUnrest", self.gaze.pupil_unrest)?;
        within("stability", self.gaze.stability, 0.0, 100.0)?;
        within("fatigueIndex", self.gaze.fatigue_index, 0.0, 100.0)?;
        Ok(())
    }
}
