//! rPPG 脉搏估计
//!
//! 以固定帧率对额头 ROI 的绿色通道均值采样，再做峰值计数和逐差均方根。
//! 采样循环每个 tick 都是挂起点；整个测量受 `duration + grace` 硬预算约束。

use tokio::time::MissedTickBehavior;

use crate::capture::config::PulseConfig;
use crate::capture::frame::{Frame, FrameSource, PixelRect};
use crate::capture::jitter::Jitter;
use crate::capture::types::{PulseReading, PulseVector, SignalOrigin};

/// Peaks per second scaled to beats per minute. 0 when the series is too short.
pub fn heart_rate(samples: &[f64], config: &PulseConfig) -> f64 {
    if samples.len() < config.min_samples() || samples.len() < 3 {
        return 0.0;
    }
    let peaks = samples
        .windows(3)
        .filter(|w| w[1] > w[0] && w[1] > w[2])
        .count();
    let seconds = samples.len() as f64 / f64::from(config.nominal_fps);
    (peaks as f64 / seconds * 60.0 * config.peak_damping).round()
}

/// Root mean square of successive differences, scaled. 0 when the series is too short.
pub fn variability(samples: &[f64], config: &PulseConfig) -> f64 {
    if samples.len() < config.min_samples() || samples.len() < 2 {
        return 0.0;
    }
    let (sum, n) = samples
        .windows(2)
        .map(|w| (w[1] - w[0]).powi(2))
        .fold((0.0, 0usize), |(s, n), d| (s + d, n + 1));
    ((sum / n as f64).sqrt() * config.hrv_scale).round()
}

/// Reduces a sample series, substituting the fallback per field when a
/// reduction yields 0.
pub fn reduce(samples: &[f64], config: &PulseConfig, jitter: &mut Jitter) -> PulseReading {
    let (heart_rate, heart_rate_origin) =
        or_fallback(heart_rate(samples, config), config.fallback_heart_rate);
    let (hrv, hrv_origin) = or_fallback(variability(samples, config), config.fallback_hrv);

    PulseReading {
        vector: PulseVector {
            heart_rate,
            hrv,
            respiration_rate: respiration(config, jitter),
        },
        heart_rate_origin,
        hrv_origin,
        samples: samples.len(),
    }
}

pub fn fallback(config: &PulseConfig, jitter: &mut Jitter) -> PulseReading {
    reduce(&[], config, jitter)
}

fn or_fallback(value: f64, fallback: f64) -> (f64, SignalOrigin) {
    if value > 0.0 && value.is_finite() {
        (value, SignalOrigin::Measured)
    } else {
        (fallback, SignalOrigin::Fallback)
    }
}

fn respiration(config: &PulseConfig, jitter: &mut Jitter) -> f64 {
    jitter.around(config.respiration_baseline, config.respiration_jitter)
}

/// Mean green value over the forehead ROI; `None` when the ROI is empty.
pub fn green_mean(frame: &Frame, config: &PulseConfig) -> Option<f64> {
    let rect = PixelRect::centered_clipped(
        f64::from(frame.width()) / 2.0,
        f64::from(frame.height()) * config.roi_center_y,
        config.roi_size,
        frame.width(),
        frame.height(),
    );
    let (sum, n) = frame
        .patch(rect)?
        .fold((0.0, 0usize), |(s, n), px| (s + f64::from(px[1]), n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Samples until the required count is reached or the stream stops being live.
/// `progress` receives the completed fraction.
pub async fn sample(
    stream: &dyn FrameSource,
    config: &PulseConfig,
    samples: &mut Vec<f64>,
    progress: &(dyn Fn(f64) + Send + Sync),
) {
    let required = config.required_samples().max(1);
    let mut ticker = tokio::time::interval(config.frame_period());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while samples.len() < required {
        ticker.tick().await;
        if !stream.is_live() {
            tracing::warn!(collected = samples.len(), "Stream stopped during pulse sampling");
            break;
        }
        if let Some(value) = stream.grab().and_then(|frame| green_mean(&frame, config)) {
            samples.push(value);
            progress(samples.len() as f64 / required as f64);
        }
    }
}

/// Full measurement. Never hangs: a zero-dimension stream resolves at once and
/// budget expiry resolves with the fallback vector.
pub async fn estimate(
    stream: &dyn FrameSource,
    config: &PulseConfig,
    jitter: &mut Jitter,
    progress: &(dyn Fn(f64) + Send + Sync),
) -> PulseReading {
    let (width, height) = stream.dimensions();
    if width == 0 || height == 0 {
        tracing::warn!("Pulse stream has no dimensions, using fallback");
        return fallback(config, jitter);
    }

    let mut samples = Vec::with_capacity(config.required_samples());
    let budget = config.budget();
    match tokio::time::timeout(budget, sample(stream, config, &mut samples, progress)).await {
        Ok(()) => {
            let reading = reduce(&samples, config, jitter);
            tracing::debug!(
                samples = reading.samples,
                heart_rate = reading.vector.heart_rate,
                hrv = reading.vector.hrv,
                fallback = reading.is_fallback(),
                "Pulse measured"
            );
            reading
        }
        Err(_) => {
            tracing::warn!(
                budget_ms = budget.as_millis() as u64,
                collected = samples.len(),
                "Pulse sampling exceeded budget, using fallback"
            );
            fallback(config, jitter)
        }
    }
}
