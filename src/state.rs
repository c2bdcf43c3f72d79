use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;

use crate::capture::config::CaptureConfig;
use crate::config::Config;
use crate::services::checkin::CheckInService;
use crate::services::report::ReportGenerator;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    store: Arc<Store>,
    checkin: CheckInService,
    capture: Arc<CaptureConfig>,
    shutdown_tx: broadcast::Sender<()>,
    started_at: Instant,
}

impl AppState {
    /// `capture` 须已通过 `validate()`
    pub fn new(
        store: Arc<Store>,
        config: &Config,
        capture: CaptureConfig,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Self {
        let reports = ReportGenerator::from_config(&config.llm);
        Self::with_reports(store, reports, capture, shutdown_tx)
    }

    /// 测试中注入自定义报告后端
    pub fn with_reports(
        store: Arc<Store>,
        reports: ReportGenerator,
        capture: CaptureConfig,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Self {
        Self {
            checkin: CheckInService::new(store.clone(), reports),
            store,
            capture: Arc::new(capture),
            shutdown_tx,
            started_at: Instant::now(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn checkin(&self) -> &CheckInService {
        &self.checkin
    }

    pub fn capture_config(&self) -> &CaptureConfig {
        &self.capture
    }

    pub fn shutdown_rx(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(dir: &tempfile::TempDir, tx: broadcast::Sender<()>) -> AppState {
        let store = Arc::new(
            Store::open(dir.path().join("state.sled").to_str().unwrap()).unwrap(),
        );
        AppState::with_reports(store, ReportGenerator::disabled(), CaptureConfig::default(), tx)
    }

    #[tokio::test]
    async fn shutdown_receiver_can_clone() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let (tx, _) = broadcast::channel(4);
        let state = state(&tmp, tx.clone());

        let mut rx1 = state.shutdown_rx();
        let mut rx2 = state.shutdown_rx();
        tx.send(()).unwrap();
        rx1.recv().await.unwrap();
        rx2.recv().await.unwrap();
    }

    #[tokio::test]
    async fn clones_share_the_store_and_capture_config() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let (tx, _) = broadcast::channel(4);
        let state = state(&tmp, tx);
        let other = state.clone();
        assert!(std::ptr::eq(state.store(), other.store()));
        assert!(std::ptr::eq(state.capture_config(), other.capture_config()));
    }
}
