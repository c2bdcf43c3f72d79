//! Before/after metric table used by the comparison and export views.

use serde::Serialize;

use crate::capture::types::FeatureRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    HigherIsBetter,
    LowerIsBetter,
    /// Expression channels: change is reported, not judged.
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricDelta {
    pub metric: &'static str,
    pub label: &'static str,
    pub before: f64,
    pub after: Option<f64>,
    pub delta: Option<f64>,
    pub direction: Direction,
    pub improved: Option<bool>,
}

struct MetricRow {
    metric: &'static str,
    label: &'static str,
    direction: Direction,
    read: fn(&FeatureRecord) -> f64,
}

const METRICS: &[MetricRow] = &[
    MetricRow { metric: "hrv", label: "HRV", direction: Direction::HigherIsBetter, read: |r| r.pulse().hrv },
    MetricRow { metric: "heartRate", label: "Heart rate", direction: Direction::LowerIsBetter, read: |r| r.pulse().heart_rate },
    MetricRow { metric: "vitality", label: "Skin vitality", direction: Direction::HigherIsBetter, read: |r| r.complexion().vitality },
    MetricRow { metric: "fatigueIndex", label: "Ocular fatigue", direction: Direction::LowerIsBetter, read: |r| r.gaze().fatigue_index },
    MetricRow { metric: "homogeneity", label: "Skin homogeneity", direction: Direction::HigherIsBetter, read: |r| r.complexion().homogeneity },
    MetricRow { metric: "redness", label: "Redness", direction: Direction::LowerIsBetter, read: |r| r.complexion().redness },
    MetricRow { metric: "blinkRate", label: "Blink rate", direction: Direction::LowerIsBetter, read: |r| r.gaze().blink_rate },
    MetricRow { metric: "stability", label: "Gaze stability", direction: Direction::HigherIsBetter, read: |r| r.gaze().stability },
    MetricRow { metric: "AU1", label: "Inner brow raise", direction: Direction::Neutral, read: |r| r.expression().inner_brow_raise },
    MetricRow { metric: "AU4", label: "Brow lower", direction: Direction::Neutral, read: |r| r.expression().brow_lower },
    MetricRow { metric: "AU6", label: "Cheek raise", direction: Direction::Neutral, read: |r| r.expression().cheek_raise },
    MetricRow { metric: "AU12", label: "Lip corner pull", direction: Direction::Neutral, read: |r| r.expression().lip_corner_pull },
    MetricRow { metric: "AU15", label: "Lip corner depress", direction: Direction::Neutral, read: |r| r.expression().lip_corner_depress },
    MetricRow { metric: "AU17", label: "Chin raise", direction: Direction::Neutral, read: |r| r.expression().chin_raise },
    MetricRow { metric: "AU20", label: "Lip stretch", direction: Direction::Neutral, read: |r| r.expression().lip_stretch },
    MetricRow { metric: "AU24", label: "Lip press", direction: Direction::Neutral, read: |r| r.expression().lip_press },
];

const EPSILON: f64 = 1e-9;

pub fn compare(before: &FeatureRecord, after: Option<&FeatureRecord>) -> Vec<MetricDelta> {
    METRICS
        .iter()
        .map(|m| {
            let b = (m.read)(before);
            let a = after.map(m.read);
            let delta = a.map(|a| a - b);
            let improved = delta.and_then(|d| match m.direction {
                Direction::Neutral => None,
                _ if d.abs() < EPSILON => Some(false),
                Direction::HigherIsBetter => Some(d > 0.0),
                Direction::LowerIsBetter => Some(d < 0.0),
            });
            MetricDelta {
                metric: m.metric,
                label: m.label,
                before: b,
                after: a,
                delta,
                direction: m.direction,
                improved,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::capture::pipeline::fallback_bundle;
    use crate::capture::types::CaptureStage;
    use crate::capture::{CaptureConfig, Jitter};

    fn records() -> (FeatureRecord, FeatureRecord) {
        let cfg = CaptureConfig::default();
        let before = fallback_bundle(&cfg, &mut Jitter::seeded(1));
        let mut after = before;
        after.pulse.vector.hrv = 60.0;
        after.pulse.vector.heart_rate = 80.0;
        after.gaze.fatigue_index = 20.0;
        (
            FeatureRecord::new(CaptureStage::Before, "p", &before, "tired", Utc::now()),
            FeatureRecord::new(CaptureStage::After, "p", &after, "rested", Utc::now()),
        )
    }

    fn find<'a>(rows: &'a [MetricDelta], metric: &str) -> &'a MetricDelta {
        rows.iter().find(|r| r.metric == metric).unwrap()
    }

    #[test]
    fn directions_decide_improvement() {
        let (before, after) = records();
        let rows = compare(&before, Some(&after));
        assert_eq!(rows.len(), 16);

        let hrv = find(&rows, "hrv");
        assert_eq!(hrv.delta, Some(15.0));
        assert_eq!(hrv.improved, Some(true));

        assert_eq!(find(&rows, "heartRate").improved, Some(false));
        assert_eq!(find(&rows, "fatigueIndex").improved, Some(true));
        assert_eq!(find(&rows, "vitality").improved, Some(false));
        assert_eq!(find(&rows, "AU12").improved, None);
    }

    #[test]
    fn single_stage_has_no_deltas() {
        let (before, _) = records();
        let rows = compare(&before, None);
        assert!(rows.iter().all(|r| r.after.is_none() && r.delta.is_none() && r.improved.is_none()));
    }
}
