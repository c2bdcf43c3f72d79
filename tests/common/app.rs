use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tempfile::TempDir;
use tokio::sync::broadcast;

use biomirror_backend::capture::CaptureConfig;
use biomirror_backend::config::{CaptureEnvConfig, Config, LLMConfig};
use biomirror_backend::routes::build_router;
use biomirror_backend::services::report::{MockBackend, ReportGenerator};
use biomirror_backend::state::AppState;
use biomirror_backend::store::Store;

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub config: Config,
    _temp_dir: TempDir,
}

/// 直接构造 Config，避免 set_var 造成多线程测试环境变量竞态
pub fn test_config(sled_path: String) -> Config {
    Config {
        host: std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
        port: 3000,
        log_level: "info".to_string(),
        enable_file_logs: false,
        log_dir: "./logs".to_string(),
        sled_path,
        cors_origin: "http://localhost:5173".to_string(),
        llm: LLMConfig {
            enabled: true,
            mock: true,
            api_url: String::new(),
            api_key: String::new(),
            timeout_secs: 5,
            models: vec!["mock-a".to_string(), "mock-b".to_string()],
            max_attempts: 2,
            retry_delay_ms: 0,
        },
        capture: CaptureEnvConfig {
            countdown_ticks: 15,
            pre_analysis_at: 5,
            expression_frames: 15,
            pulse_duration_ms: 3_500,
            seed: Some(7),
        },
    }
}

async fn spawn_with(reports: Option<ReportGenerator>) -> TestApp {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let sled_path = temp_dir.path().join("biomirror-test.sled");
    let config = test_config(sled_path.to_string_lossy().to_string());

    let store = Arc::new(Store::open(&config.sled_path).expect("open store"));
    store.run_migrations().expect("run migrations");

    let (shutdown_tx, _) = broadcast::channel::<()>(8);
    let reports = reports.unwrap_or_else(|| {
        ReportGenerator::new(
            Arc::new(MockBackend),
            config.llm.models.clone(),
            config.llm.max_attempts,
            Duration::from_millis(config.llm.retry_delay_ms),
        )
    });
    let capture = CaptureConfig::from_env(&config.capture);
    capture.validate().expect("capture config");
    let state = AppState::with_reports(store, reports, capture, shutdown_tx);

    let app = build_router(state.clone());

    TestApp {
        app,
        state,
        config,
        _temp_dir: temp_dir,
    }
}

pub async fn spawn_test_app() -> TestApp {
    spawn_with(None).await
}

pub async fn spawn_test_app_without_reports() -> TestApp {
    spawn_with(Some(ReportGenerator::disabled())).await
}
