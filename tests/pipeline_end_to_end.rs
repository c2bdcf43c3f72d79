mod common;

use std::sync::{Arc, Mutex};

use biomirror_backend::capture::gaze::NEUTRAL;
use biomirror_backend::capture::{
    AnalysisProgress, CaptureConfig, EstimatorError, EstimatorPipeline, FeatureExtractor,
    FrameSource, Jitter, LandmarkHub, ProgressSink, SharedStream, SignalOrigin,
};

use common::capture::{gray_stream, neutral_face, FixedDetector};

async fn pipeline(face: bool) -> EstimatorPipeline {
    let detector = FixedDetector {
        face: face.then(neutral_face),
    };
    let hub = LandmarkHub::start(detector).await.unwrap();
    EstimatorPipeline::new(hub, Arc::new(CaptureConfig::default()))
}

fn recording_sink() -> (ProgressSink, Arc<Mutex<Vec<f64>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink_seen = seen.clone();
    let sink: ProgressSink = Arc::new(move |p: AnalysisProgress| {
        sink_seen.lock().unwrap().push(p.percent);
    });
    (sink, seen)
}

#[tokio::test(start_paused = true)]
async fn gray_stream_with_face_produces_full_bundle() {
    let pipeline = pipeline(true).await;
    let (sink, seen) = recording_sink();

    let bundle = pipeline
        .extract(gray_stream(), Jitter::seeded(5), sink)
        .await
        .unwrap();

    assert!((bundle.expression.inner_brow_raise - 3.0).abs() < 1e-9);
    assert_eq!(bundle.expression.lip_stretch, 5.0);

    // 恒定亮度没有峰值也没有逐差，两项都取默认值
    assert_eq!(bundle.pulse.vector.heart_rate, 72.0);
    assert_eq!(bundle.pulse.vector.hrv, 45.0);
    assert_eq!(bundle.pulse.heart_rate_origin, SignalOrigin::Fallback);
    assert_eq!(bundle.pulse.samples, CaptureConfig::default().pulse.required_samples());

    assert_eq!(bundle.complexion.homogeneity, 100.0);
    assert_eq!(bundle.complexion.redness, 20.0);
    assert_eq!(bundle.complexion.roughness, 0.0);
    assert_eq!(bundle.complexion.vitality, 100.0);

    // 开合比 0.3：低疲劳档
    assert!((10.0..=30.0).contains(&bundle.gaze.fatigue_index));
    assert!((85.0..95.0).contains(&bundle.gaze.stability));
    assert!((12.0..17.0).contains(&bundle.gaze.blink_rate));

    let seen = seen.lock().unwrap();
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(seen.last().copied(), Some(100.0));
}

#[tokio::test(start_paused = true)]
async fn no_face_gives_zero_expression_and_neutral_gaze() {
    let pipeline = pipeline(false).await;
    let (sink, _) = recording_sink();

    let bundle = pipeline
        .extract(gray_stream(), Jitter::seeded(5), sink)
        .await
        .unwrap();

    assert!(bundle.expression.is_zero());
    assert_eq!(bundle.gaze, NEUTRAL);
}

#[tokio::test(start_paused = true)]
async fn stopped_stream_is_reported() {
    let pipeline = pipeline(true).await;
    let (sink, seen) = recording_sink();
    let stream: SharedStream = gray_stream();
    stream.stop();

    let err = pipeline
        .extract(stream, Jitter::seeded(5), sink)
        .await
        .unwrap_err();

    assert!(matches!(err, EstimatorError::StreamLost));
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn same_seed_same_bundle() {
    let pipeline = pipeline(true).await;
    let (sink, _) = recording_sink();

    let a = pipeline
        .extract(gray_stream(), Jitter::seeded(11), sink.clone())
        .await
        .unwrap();
    let b = pipeline
        .extract(gray_stream(), Jitter::seeded(11), sink)
        .await
        .unwrap();
    assert_eq!(a, b);
}
