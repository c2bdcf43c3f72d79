use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionConfig {
    /// 多帧采样次数
    pub frames: u32,
    pub frame_interval_ms: u64,
    /// 单帧检测预算，检测器沉默时按失败帧处理
    pub detect_timeout_ms: u64,
}

impl Default for ExpressionConfig {
    fn default() -> Self {
        Self {
            frames: 15,
            frame_interval_ms: 100,
            detect_timeout_ms: 400,
        }
    }
}

impl ExpressionConfig {
    /// Worst case of the multi-frame pass: every frame waits out its interval and detect budget.
    pub fn budget(&self) -> Duration {
        let per_frame = self.frame_interval_ms + self.detect_timeout_ms;
        Duration::from_millis(per_frame * u64::from(self.frames.max(1)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PulseConfig {
    pub duration_ms: u64,
    pub grace_ms: u64,
    pub nominal_fps: u32,
    pub roi_size: u32,
    /// ROI 中心纵向位置（帧高的比例），约为额头
    pub roi_center_y: f64,
    /// 朴素峰值计数会把噪声算进去，按固定系数压低
    pub peak_damping: f64,
    pub hrv_scale: f64,
    pub min_signal_secs: f64,
    pub fallback_heart_rate: f64,
    pub fallback_hrv: f64,
    pub respiration_baseline: f64,
    pub respiration_jitter: f64,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            duration_ms: 3_500,
            grace_ms: 2_000,
            nominal_fps: 30,
            roi_size: 50,
            roi_center_y: 1.0 / 3.0,
            peak_damping: 0.5,
            hrv_scale: 100.0,
            min_signal_secs: 2.0,
            fallback_heart_rate: 72.0,
            fallback_hrv: 45.0,
            respiration_baseline: 14.0,
            respiration_jitter: 4.0,
        }
    }
}

impl PulseConfig {
    pub fn required_samples(&self) -> usize {
        ((self.duration_ms as f64 / 1000.0) * self.nominal_fps as f64).round() as usize
    }

    pub fn min_samples(&self) -> usize {
        (self.min_signal_secs * self.nominal_fps as f64).ceil() as usize
    }

    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.nominal_fps.max(1) as f64)
    }

    pub fn budget(&self) -> Duration {
        Duration::from_millis(self.duration_ms + self.grace_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplexionConfig {
    pub patch_size: u32,
    /// 采样块相对图像中心的水平偏移（像素），约为脸颊
    pub patch_offset_x: i64,
    pub homogeneity_weight: f64,
    pub smoothness_weight: f64,
}

impl Default for ComplexionConfig {
    fn default() -> Self {
        Self {
            patch_size: 40,
            patch_offset_x: 50,
            homogeneity_weight: 0.6,
            smoothness_weight: 0.4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GazeConfig {
    pub high_fatigue_ratio: f64,
    pub medium_fatigue_ratio: f64,
}

impl Default for GazeConfig {
    fn default() -> Self {
        Self {
            high_fatigue_ratio: 0.20,
            medium_fatigue_ratio: 0.26,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub countdown_ticks: u32,
    /// 倒计时剩余多少 tick 时启动后台预分析
    pub pre_analysis_at: u32,
    pub tick_ms: u64,
    /// 前台分析总预算，超时后全部使用降级值；须容纳表情与脉搏两个阶段的预算
    pub analysis_timeout_ms: u64,
    pub max_self_report_chars: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            countdown_ticks: 15,
            pre_analysis_at: 5,
            tick_ms: 1_000,
            analysis_timeout_ms: 15_000,
            max_self_report_chars: 2_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureConfig {
    #[serde(default)]
    pub expression: ExpressionConfig,
    #[serde(default)]
    pub pulse: PulseConfig,
    #[serde(default)]
    pub complexion: ComplexionConfig,
    #[serde(default)]
    pub gaze: GazeConfig,
    #[serde(default)]
    pub session: SessionConfig,
    /// 固定种子便于复现；None 时使用系统熵
    #[serde(default)]
    pub seed: Option<u64>,
}

impl CaptureConfig {
    pub fn from_env(env_config: &crate::config::CaptureEnvConfig) -> Self {
        let mut config = Self::default();
        config.session.countdown_ticks = env_config.countdown_ticks;
        config.session.pre_analysis_at = env_config.pre_analysis_at;
        config.expression.frames = env_config.expression_frames;
        config.pulse.duration_ms = env_config.pulse_duration_ms;
        config.seed = env_config.seed;
        config
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.expression.frames == 0 {
            return Err("expression.frames must be > 0".to_string());
        }
        if self.pulse.nominal_fps == 0 {
            return Err("pulse.nominal_fps must be > 0".to_string());
        }
        if self.pulse.roi_size == 0 {
            return Err("pulse.roi_size must be > 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.pulse.roi_center_y) {
            return Err("pulse.roi_center_y must be in [0,1]".to_string());
        }
        if self.pulse.peak_damping <= 0.0 {
            return Err("pulse.peak_damping must be > 0".to_string());
        }
        if self.complexion.patch_size == 0 {
            return Err("complexion.patch_size must be > 0".to_string());
        }
        let weights = self.complexion.homogeneity_weight + self.complexion.smoothness_weight;
        if (weights - 1.0).abs() > 1e-6 {
            return Err("complexion weights must sum to 1".to_string());
        }
        if self.gaze.high_fatigue_ratio >= self.gaze.medium_fatigue_ratio {
            return Err("gaze.high_fatigue_ratio must be < gaze.medium_fatigue_ratio".to_string());
        }
        if self.session.countdown_ticks == 0 {
            return Err("session.countdown_ticks must be > 0".to_string());
        }
        if self.session.pre_analysis_at >= self.session.countdown_ticks {
            return Err("session.pre_analysis_at must be < session.countdown_ticks".to_string());
        }
        // 表情与脉搏阶段须在前台总预算内结束
        let stages = self.expression.budget() + self.pulse.budget();
        if stages > Duration::from_millis(self.session.analysis_timeout_ms) {
            return Err(format!(
                "session.analysis_timeout_ms ({}) must cover expression + pulse budgets ({} ms)",
                self.session.analysis_timeout_ms,
                stages.as_millis()
            ));
        }
        Ok(())
    }
}
