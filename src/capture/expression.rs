//! 面部动作单元强度估计
//!
//! 单帧估计是纯函数：命名关键点之间的几何代理量乘以通道系数，再钳制到 [0, 5]。
//! 多帧版本通过 [`LandmarkHub`] 逐帧请求检测结果并取平均。

use std::time::Duration;

use crate::capture::config::ExpressionConfig;
use crate::capture::frame::FrameSource;
use crate::capture::landmarks::{index, LandmarkHub};
use crate::capture::types::{ExpressionVector, LandmarkPoint, LandmarkSet};

const INNER_BROW_SCALE: f64 = 100.0;
const BROW_LOWER_SCALE: f64 = 10.0;
const CHEEK_RAISE_SCALE: f64 = 10.0;
const LIP_PULL_SCALE: f64 = 50.0;
const LIP_DEPRESS_SCALE: f64 = 10.0;
const CHIN_RAISE_SCALE: f64 = 10.0;
const LIP_STRETCH_SCALE: f64 = 2.0;
const LIP_PRESS_SCALE: f64 = 50.0;
const LIP_PRESS_REST_GAP: f64 = 0.1;
const MIN_LIP_GAP: f64 = 1e-6;

/// No landmarks, or a set missing any named index, yields the all-zero vector.
pub fn estimate(landmarks: Option<&LandmarkSet>) -> ExpressionVector {
    landmarks
        .filter(|set| set.is_complete())
        .and_then(compute)
        .unwrap_or_else(ExpressionVector::zero)
}

fn compute(set: &LandmarkSet) -> Option<ExpressionVector> {
    let p = move |i: usize| set.point(i);

    let brow_inner = (p(index::LEFT_BROW_INNER)?, p(index::RIGHT_BROW_INNER)?);
    let brow_outer = (p(index::LEFT_BROW_OUTER)?, p(index::RIGHT_BROW_OUTER)?);
    let eye_top = (p(index::LEFT_EYE_TOP)?, p(index::RIGHT_EYE_TOP)?);
    let eye_bottom = (p(index::LEFT_EYE_BOTTOM)?, p(index::RIGHT_EYE_BOTTOM)?);
    let mouth = (p(index::LEFT_MOUTH_CORNER)?, p(index::RIGHT_MOUTH_CORNER)?);
    let upper_lip = p(index::UPPER_LIP)?;
    let lower_lip = p(index::LOWER_LIP)?;
    let chin = p(index::CHIN)?;

    let brow_eye = mean_distance(brow_inner, eye_top);
    let brow_height = (brow_outer.0.y + brow_outer.1.y) / 2.0;
    let eye_height = mean_distance(eye_top, eye_bottom);
    let mouth_width = mouth.0.distance(mouth.1);
    let corner_drop = (mouth.0.y + mouth.1.y) / 2.0;
    let lip_gap = upper_lip.distance(lower_lip);

    // 嘴唇闭合时比值发散，直接饱和
    let stretch = if lip_gap < MIN_LIP_GAP {
        ExpressionVector::MAX_INTENSITY
    } else {
        mouth_width / lip_gap * LIP_STRETCH_SCALE
    };

    Some(ExpressionVector {
        inner_brow_raise: clamp_intensity(brow_eye * INNER_BROW_SCALE),
        brow_lower: clamp_intensity((1.0 - brow_height) * BROW_LOWER_SCALE),
        cheek_raise: clamp_intensity((1.0 - eye_height) * CHEEK_RAISE_SCALE),
        lip_corner_pull: clamp_intensity(mouth_width * LIP_PULL_SCALE),
        lip_corner_depress: clamp_intensity(corner_drop * LIP_DEPRESS_SCALE),
        chin_raise: clamp_intensity((1.0 - chin.y) * CHIN_RAISE_SCALE),
        lip_stretch: clamp_intensity(stretch),
        lip_press: clamp_intensity((LIP_PRESS_REST_GAP - lip_gap) * LIP_PRESS_SCALE),
    })
}

fn mean_distance(
    a: (&LandmarkPoint, &LandmarkPoint),
    b: (&LandmarkPoint, &LandmarkPoint),
) -> f64 {
    (a.0.distance(b.0) + a.1.distance(b.1)) / 2.0
}

fn clamp_intensity(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, ExpressionVector::MAX_INTENSITY)
}

/// Mean over the frames that produced a detector reply.
pub fn mean(vectors: &[ExpressionVector]) -> ExpressionVector {
    if vectors.is_empty() {
        return ExpressionVector::zero();
    }
    let mut sum = [0.0; 8];
    for v in vectors {
        for (acc, c) in sum.iter_mut().zip(v.channels()) {
            *acc += c;
        }
    }
    let n = vectors.len() as f64;
    ExpressionVector::from_channels(sum.map(|s| s / n))
}

/// Result of the multi-frame pass.
#[derive(Debug, Clone, Default)]
pub struct ExpressionCapture {
    pub vector: ExpressionVector,
    /// Last detected face, reused by the gaze stage.
    pub landmarks: Option<LandmarkSet>,
    pub frames_used: usize,
}

/// `frames` sequential detections spaced by `frame_interval_ms`, each bounded by
/// `detect_timeout_ms`. `progress` receives the completed fraction in (0, 1].
///
/// A "no face" reply counts as an obtained frame with the zero vector; a
/// timeout, detector error or missing frame is excluded from the mean.
pub async fn estimate_frames(
    hub: &LandmarkHub,
    stream: &dyn FrameSource,
    config: &ExpressionConfig,
    progress: &(dyn Fn(f64) + Send + Sync),
) -> ExpressionCapture {
    let total = config.frames.max(1);
    let interval = Duration::from_millis(config.frame_interval_ms);
    let budget = Duration::from_millis(config.detect_timeout_ms);

    let mut obtained = Vec::with_capacity(total as usize);
    let mut last_face = None;

    for i in 0..total {
        if i > 0 {
            tokio::time::sleep(interval).await;
        }
        if !stream.is_live() {
            tracing::warn!(frame = i, "Stream stopped during expression sampling");
            break;
        }

        match stream.grab() {
            Some(frame) => match hub.detect_within(frame, budget).await {
                Ok(Some(set)) => {
                    obtained.push(estimate(Some(&set)));
                    last_face = Some(set);
                }
                Ok(None) => obtained.push(ExpressionVector::zero()),
                Err(e) => tracing::warn!(frame = i, error = %e, "Expression frame skipped"),
            },
            None => tracing::warn!(frame = i, "No frame available for expression sampling"),
        }

        progress(f64::from(i + 1) / f64::from(total));
    }

    tracing::debug!(
        requested = total,
        obtained = obtained.len(),
        "Expression sampling finished"
    );

    ExpressionCapture {
        vector: mean(&obtained),
        landmarks: last_face,
        frames_used: obtained.len(),
    }
}
