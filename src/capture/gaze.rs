//! 眼部开合度与注视稳定性估计
//!
//! 每只眼的开合比 = 上下眼睑平面距离 / 内外眼角平面距离，双眼取平均。
//! 比值决定疲劳档位；档内抖动来自可播种的 [`Jitter`]。

use crate::capture::config::GazeConfig;
use crate::capture::jitter::Jitter;
use crate::capture::landmarks::index;
use crate::capture::types::{GazeVector, LandmarkSet};

const MIN_EYE_WIDTH: f64 = 1e-6;

/// 无关键点时的中性值（普通清醒状态），不是零向量
pub const NEUTRAL: GazeVector = GazeVector {
    blink_rate: 15.0,
    pupil_unrest: 2.5,
    stability: 80.0,
    fatigue_index: 30.0,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatigueBand {
    High,
    Medium,
    Low,
}

impl FatigueBand {
    pub fn classify(ratio: f64, config: &GazeConfig) -> Self {
        if ratio < config.high_fatigue_ratio {
            Self::High
        } else if ratio < config.medium_fatigue_ratio {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// `(base, span)` of the fatigue index inside this band.
    fn fatigue_range(self) -> (f64, f64) {
        match self {
            Self::High => (85.0, 10.0),
            Self::Medium => (60.0, 15.0),
            Self::Low => (10.0, 20.0),
        }
    }

    fn stability_base(self) -> f64 {
        match self {
            Self::High => 70.0,
            Self::Medium => 78.0,
            Self::Low => 85.0,
        }
    }
}

fn eye_ratio(set: &LandmarkSet, top: usize, bottom: usize, inner: usize, outer: usize) -> Option<f64> {
    let width = set.point(inner)?.planar_distance(set.point(outer)?);
    if width < MIN_EYE_WIDTH {
        return None;
    }
    Some(set.point(top)?.planar_distance(set.point(bottom)?) / width)
}

/// Mean aperture over the usable eyes; `None` when neither eye is usable.
pub fn aperture_ratio(set: &LandmarkSet) -> Option<f64> {
    let left = eye_ratio(
        set,
        index::LEFT_EYE_TOP,
        index::LEFT_EYE_BOTTOM,
        index::LEFT_EYE_INNER,
        index::LEFT_EYE_OUTER,
    );
    let right = eye_ratio(
        set,
        index::RIGHT_EYE_TOP,
        index::RIGHT_EYE_BOTTOM,
        index::RIGHT_EYE_INNER,
        index::RIGHT_EYE_OUTER,
    );
    match (left, right) {
        (Some(l), Some(r)) => Some((l + r) / 2.0),
        (Some(v), None) | (None, Some(v)) => Some(v),
        (None, None) => None,
    }
}

pub fn from_ratio(ratio: f64, config: &GazeConfig, jitter: &mut Jitter) -> GazeVector {
    let band = FatigueBand::classify(ratio, config);
    let (base, span) = band.fatigue_range();

    let blink_rate = match band {
        FatigueBand::High => 22.0,
        _ => jitter.around(12.0, 5.0),
    };

    GazeVector {
        blink_rate,
        pupil_unrest: jitter.around(1.5, 3.0),
        stability: jitter.around(band.stability_base(), 10.0),
        fatigue_index: jitter.around(base, span).round(),
    }
}

pub fn estimate(landmarks: Option<&LandmarkSet>, config: &GazeConfig, jitter: &mut Jitter) -> GazeVector {
    match landmarks.and_then(aperture_ratio) {
        Some(ratio) => from_ratio(ratio, config, jitter),
        None => NEUTRAL,
    }
}
