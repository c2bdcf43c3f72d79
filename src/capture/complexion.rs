//! Skin-tone statistics from a fixed cheek patch.

use crate::capture::config::ComplexionConfig;
use crate::capture::frame::{Frame, PixelRect};
use crate::capture::types::ComplexionVector;

const DEFAULT_HOMOGENEITY: f64 = 80.0;
const DEFAULT_REDNESS: f64 = 25.0;
const DEFAULT_ROUGHNESS: f64 = 35.0;

/// `clamp(w_h * homogeneity + w_s * (100 - roughness))` on the reported values.
pub fn vitality(homogeneity: f64, roughness: f64, config: &ComplexionConfig) -> f64 {
    (config.homogeneity_weight * homogeneity + config.smoothness_weight * (100.0 - roughness))
        .clamp(0.0, 100.0)
}

pub fn default_vector(config: &ComplexionConfig) -> ComplexionVector {
    ComplexionVector {
        homogeneity: DEFAULT_HOMOGENEITY,
        redness: DEFAULT_REDNESS,
        roughness: DEFAULT_ROUGHNESS,
        vitality: vitality(DEFAULT_HOMOGENEITY, DEFAULT_ROUGHNESS, config),
    }
}

/// Patch top-left sits at `(w/2 + offset, h/2)`. An empty frame or a patch that
/// leaves the frame yields the default vector.
pub fn estimate(frame: Option<&Frame>, config: &ComplexionConfig) -> ComplexionVector {
    let Some(frame) = frame.filter(|f| !f.is_empty()) else {
        return default_vector(config);
    };
    let x = i64::from(frame.width() / 2) + config.patch_offset_x;
    let y = i64::from(frame.height() / 2);
    if x < 0 {
        return default_vector(config);
    }
    let rect = PixelRect {
        x: x as u32,
        y: y as u32,
        width: config.patch_size,
        height: config.patch_size,
    };
    let Some(pixels) = frame.patch(rect) else {
        tracing::debug!(
            width = frame.width(),
            height = frame.height(),
            "Complexion patch outside frame, using defaults"
        );
        return default_vector(config);
    };

    let mut n = 0usize;
    let (mut r, mut g, mut b, mut r2) = (0.0, 0.0, 0.0, 0.0);
    for [pr, pg, pb] in pixels {
        let red = f64::from(pr);
        r += red;
        g += f64::from(pg);
        b += f64::from(pb);
        r2 += red * red;
        n += 1;
    }
    if n == 0 {
        return default_vector(config);
    }

    let count = n as f64;
    let (mean_r, mean_g, mean_b) = (r / count, g / count, b / count);
    let sd = (r2 / count - mean_r * mean_r).max(0.0).sqrt();

    let homogeneity = (100.0 - 2.0 * sd).max(0.0).round();
    let green_blue = (mean_g + mean_b) / 2.0;
    let redness = if green_blue > 0.0 {
        (20.0 * mean_r / green_blue).min(100.0).round()
    } else {
        100.0
    };
    let roughness = (5.0 * sd).min(100.0).round();

    ComplexionVector {
        homogeneity,
        redness,
        roughness,
        vitality: vitality(homogeneity, roughness, config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_vitality_is_74() {
        let v = default_vector(&ComplexionConfig::default());
        assert!((v.vitality - 74.0).abs() < 1e-9);
    }

    #[test]
    fn tiny_frame_falls_back() {
        let cfg = ComplexionConfig::default();
        let frame = Frame::filled(60, 60, [200, 150, 120]);
        assert_eq!(estimate(Some(&frame), &cfg), default_vector(&cfg));
        assert_eq!(estimate(None, &cfg), default_vector(&cfg));
    }

    #[test]
    fn uniform_patch_is_fully_homogeneous() {
        let cfg = ComplexionConfig::default();
        let frame = Frame::filled(320, 240, [200, 100, 100]);
        let v = estimate(Some(&frame), &cfg);
        assert_eq!(v.homogeneity, 100.0);
        assert_eq!(v.roughness, 0.0);
        assert_eq!(v.redness, 40.0);
        assert!((v.vitality - 100.0).abs() < 1e-9);
    }

    #[test]
    fn black_patch_saturates_redness() {
        let cfg = ComplexionConfig::default();
        let frame = Frame::filled(320, 240, [0, 0, 0]);
        assert_eq!(estimate(Some(&frame), &cfg).redness, 100.0);
    }

    #[test]
    fn striped_patch_is_rough() {
        let cfg = ComplexionConfig::default();
        let (w, h) = (320u32, 240u32);
        let mut data = Vec::with_capacity((w * h * 4) as usize);
        for _y in 0..h {
            for x in 0..w {
                let red = if x % 2 == 0 { 100 } else { 140 };
                data.extend_from_slice(&[red, 90, 90, 255]);
            }
        }
        let frame = Frame::from_rgba(w, h, data).unwrap();
        let v = estimate(Some(&frame), &cfg);
        // sd = 20
        assert_eq!(v.homogeneity, 60.0);
        assert_eq!(v.roughness, 100.0);
        assert!((v.vitality - 36.0).abs() < 1e-9);
    }
}
