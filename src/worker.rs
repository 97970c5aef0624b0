//! The per-device supervised worker: the core state machine driving one phone
//! through job polling, install, test execution, and recovery.

use crate::buildcache::{BuildCacheClient, BuildFetch, BuildMetadata};
use crate::channel::{CommandReceiver, StatusSender, WorkerCommand};
use crate::config::{PhoneConfig, TuningConfig};
use crate::constants::BUILD_APK_NAME;
use crate::crash::CrashWindow;
use crate::device_agent::DeviceAgent;
use crate::mailer::Mailer;
use crate::models::{DeviceError, DeviceResult, Job, WorkerState, WorkerStatus};
use crate::store::JobStore;
use crate::test_case::{TestCase, WorkerContext};
use std::sync::Arc;
use std::time::Instant;

/// One phone's supervised loop. Single-threaded cooperative: every method
/// below is invoked serially from [`Worker::run`], so the state machine has
/// no intra-worker races.
pub struct Worker {
    phone_id: String,
    phone_cfg: PhoneConfig,
    tuning: TuningConfig,
    device: Arc<dyn DeviceAgent>,
    tests: Vec<Arc<dyn TestCase>>,
    store: Arc<dyn JobStore>,
    build_cache: Arc<dyn BuildCacheClient>,
    mailer: Arc<dyn Mailer>,
    commands: CommandReceiver,
    status: StatusSender,
    state: WorkerState,
    crash_window: CrashWindow,
    last_ping: Option<Instant>,
    current_build: Option<f64>,
}

impl WorkerContext for Worker {
    fn phone_id(&self) -> &str {
        &self.phone_id
    }

    fn device_agent(&self) -> &dyn DeviceAgent {
        self.device.as_ref()
    }
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        phone_cfg: PhoneConfig,
        tuning: TuningConfig,
        device: Arc<dyn DeviceAgent>,
        tests: Vec<Arc<dyn TestCase>>,
        store: Arc<dyn JobStore>,
        build_cache: Arc<dyn BuildCacheClient>,
        mailer: Arc<dyn Mailer>,
        commands: CommandReceiver,
        status: StatusSender,
        initial_state: WorkerState,
    ) -> Self {
        let crash_window = CrashWindow::new(tuning.crash_window(), tuning.phone_crash_limit);
        let phone_id = phone_cfg.phone_id.clone();
        Self {
            phone_id,
            phone_cfg,
            tuning,
            device,
            tests,
            store,
            build_cache,
            mailer,
            commands,
            status,
            state: initial_state,
            crash_window,
            last_ping: None,
            current_build: None,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    fn emit(&mut self, state: WorkerState, msg: Option<String>) {
        self.state = state;
        let mut status = WorkerStatus::new(self.phone_id.clone(), state).with_build(self.current_build);
        if let Some(msg) = msg {
            status = status.with_msg(msg);
        }
        self.status.publish(status);
    }

    /// Runs the main loop until `Stop` is received.
    pub async fn run(&mut self) {
        self.emit(self.state, None);
        loop {
            let mut stop = false;
            while let Some(cmd) = self.commands.try_receive() {
                if self.dispatch(cmd).await {
                    stop = true;
                }
            }
            if stop {
                return;
            }

            if self.state == WorkerState::Disconnected {
                self.recover_phone().await;
            }

            if self.state.is_error() {
                match self
                    .commands
                    .receive(self.tuning.command_queue_timeout())
                    .await
                {
                    Some(cmd) => {
                        if self.dispatch(cmd).await {
                            return;
                        }
                    }
                    None => {
                        if self.state == WorkerState::Disconnected {
                            self.handle_timeout().await;
                        }
                    }
                }
                continue;
            }

            match self.store.take_next(&self.phone_id).await {
                Some(job) => self.handle_job(job).await,
                None => match self
                    .commands
                    .receive(self.tuning.command_queue_timeout())
                    .await
                {
                    Some(cmd) => {
                        if self.dispatch(cmd).await {
                            return;
                        }
                    }
                    None => self.handle_timeout().await,
                },
            }
        }
    }

    /// Applies a command's effect (§4.G). Returns true if the worker should stop.
    async fn dispatch(&mut self, cmd: WorkerCommand) -> bool {
        match cmd {
            WorkerCommand::Stop => return true,
            WorkerCommand::Job => {}
            WorkerCommand::Reboot => {
                if self.state != WorkerState::Disabled {
                    self.emit(WorkerState::Rebooting, None);
                    self.recover_phone().await;
                }
            }
            WorkerCommand::Disable => self.disable_phone("disable command received").await,
            WorkerCommand::Enable => {
                if self.state == WorkerState::Disabled {
                    self.last_ping = None;
                    self.emit(WorkerState::Idle, None);
                }
            }
            WorkerCommand::Debug(level) => {
                self.device.set_debug_level(level);
                for t in &self.tests {
                    t.set_debug_level(level);
                }
            }
            WorkerCommand::Ping => {
                self.last_ping = Some(Instant::now());
                self.probe_and_recover().await;
            }
        }
        false
    }

    fn abi_compatible(&self, build_url: &str) -> bool {
        match self.phone_cfg.abi.as_str() {
            "x86" => build_url.contains("x86"),
            "armeabi-v6" => build_url.contains("armv6"),
            _ => !build_url.contains("x86") && !build_url.contains("armv6"),
        }
    }

    async fn complete(&self, job_id: i64) {
        if let Err(e) = self.store.complete(job_id).await {
            log::warn!("{}: failed to complete job {job_id}: {e}", self.phone_id);
        }
    }

    async fn handle_job(&mut self, job: Job) {
        if !self.abi_compatible(&job.build_url) {
            log::info!(
                "{}: dropping job {} (ABI {} incompatible with {})",
                self.phone_id,
                job.id,
                job.build_url,
                self.phone_cfg.abi
            );
            self.complete(job.id).await;
            return;
        }

        let accepting: Vec<Arc<dyn TestCase>> = self
            .tests
            .iter()
            .filter(|t| t.accepts(&self.phone_id, &job.build_url))
            .cloned()
            .collect();

        if accepting.is_empty() {
            log::info!(
                "{}: dropping job {} (no test case selected it)",
                self.phone_id,
                job.id
            );
            self.complete(job.id).await;
            return;
        }

        let enable_unittests = accepting.iter().any(|t| t.enable_unittests());

        match self
            .build_cache
            .get(&job.build_url, enable_unittests)
            .await
        {
            BuildFetch::Failure(reason) => {
                log::warn!(
                    "{}: build cache fetch failed for job {}: {reason}",
                    self.phone_id,
                    job.id
                );
            }
            BuildFetch::Success(metadata) => {
                if self.run_tests(&metadata, &accepting).await {
                    self.complete(job.id).await;
                    self.emit(WorkerState::Idle, None);
                } else {
                    log::warn!(
                        "{}: job {} did not complete, leaving enqueued",
                        self.phone_id,
                        job.id
                    );
                }
            }
        }
    }

    /// Installs `metadata`'s build and runs every accepting test case against it.
    async fn run_tests(&mut self, metadata: &BuildMetadata, tests: &[Arc<dyn TestCase>]) -> bool {
        if !self.state.is_error() {
            self.emit(WorkerState::Rebooting, None);
            self.recover_phone().await;
        }
        if self.state.is_error() {
            return false;
        }

        self.emit(WorkerState::Installing, None);

        let mut installed = false;
        for attempt in 1..=self.tuning.phone_retry_limit {
            match self.try_install(&metadata.cache_build_dir).await {
                Ok(()) => {
                    installed = true;
                    break;
                }
                Err(e) => {
                    log::warn!("{}: install attempt {attempt} failed: {e}", self.phone_id);
                    if attempt < self.tuning.phone_retry_limit {
                        tokio::time::sleep(self.tuning.retry_wait()).await;
                    }
                }
            }
        }

        if !installed {
            self.phone_disconnected("install failed after retry limit").await;
            return false;
        }

        self.current_build = Some(metadata.blddate);
        self.emit(WorkerState::Working, None);

        for test in tests {
            test.set_current_build(metadata.blddate);
            if let Err(e) = test.runjob(metadata, self).await {
                log::warn!("{}: test case failed: {e}", self.phone_id);
                self.phone_disconnected(&format!("test failure: {e}")).await;
                return false;
            }
        }

        true
    }

    async fn try_install(&self, cache_build_dir: &str) -> DeviceResult<()> {
        let root = self.device.device_root().await?;
        let remote = format!("{root}/{BUILD_APK_NAME}");
        let local = format!("{cache_build_dir}/{BUILD_APK_NAME}");
        self.device.push_file(&local, &remote).await?;
        self.device.install_app(&remote).await?;
        self.device.remove_file(&remote).await?;
        Ok(())
    }

    /// Reboots and re-verifies the phone, up to `PHONE_MAX_REBOOTS` times.
    async fn recover_phone(&mut self) {
        for attempt in 1..=self.tuning.phone_max_reboots {
            if let Err(e) = self.device.reboot(&self.phone_cfg.ip, true).await {
                log::warn!("{}: reboot attempt {attempt} failed: {e}", self.phone_id);
                continue;
            }
            if let Err(e) = self.device.device_root().await {
                log::warn!(
                    "{}: device root unreachable after reboot {attempt}: {e}",
                    self.phone_id
                );
                continue;
            }
            if self.check_sdcard().await {
                self.emit(WorkerState::Idle, None);
                return;
            }
        }
        self.phone_disconnected("recovery exhausted reboot attempts").await;
    }

    /// Probes filesystem health: creates and removes a marker directory,
    /// pushes a tiny probe file. Resets every test case's cached device path
    /// on failure so the next run re-derives it. The `IDLE` transition on
    /// success is the caller's responsibility (`recover_phone`).
    async fn check_sdcard(&mut self) -> bool {
        let result: DeviceResult<()> = async {
            let root = self.device.device_root().await?;
            let marker = format!("{root}/autophonetest");
            self.device.mkdirs(&marker).await?;
            if !self.device.dir_exists(&marker).await? {
                return Err(DeviceError::operation_failed(
                    &self.phone_id,
                    "sdcard_check",
                    "marker directory missing immediately after creation",
                ));
            }
            self.device
                .push_file("/tmp/.autophone_sdcard_probe", &format!("{marker}/probe"))
                .await?;
            self.device.rmdir(&marker).await?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => true,
            Err(e) => {
                log::warn!("{}: sdcard check failed: {e}", self.phone_id);
                for test in &self.tests {
                    test.reset_base_device_path();
                }
                false
            }
        }
    }

    /// Opportunistic health probe, throttled to once per `PHONE_PING_INTERVAL`.
    async fn handle_timeout(&mut self) {
        if self.state == WorkerState::Disabled {
            return;
        }
        let due = self
            .last_ping
            .map_or(true, |t| t.elapsed() >= self.tuning.ping_interval());
        if !due {
            return;
        }
        self.last_ping = Some(Instant::now());
        self.probe_and_recover().await;
    }

    async fn probe_and_recover(&mut self) {
        match self.device.device_root().await {
            Ok(_) => {
                if self.state == WorkerState::Disconnected {
                    self.recover_phone().await;
                } else if !self.state.is_error() {
                    self.emit(WorkerState::Idle, None);
                }
            }
            Err(_) => {
                if !self.state.is_error() {
                    self.phone_disconnected("No response to ping.").await;
                }
            }
        }
    }

    /// Idempotent: a second call while already `DISCONNECTED` is a no-op
    /// beyond a log line. Escalates to `disable_phone` when the crash window fires.
    async fn phone_disconnected(&mut self, reason: &str) {
        if self.state == WorkerState::Disconnected {
            log::warn!("{}: already disconnected: {reason}", self.phone_id);
            return;
        }
        self.emit(WorkerState::Disconnected, Some(reason.to_string()));
        self.crash_window.add_crash();
        if self.crash_window.too_many() {
            self.disable_phone("too many crashes in crash window").await;
            return;
        }
        if let Err(e) = self
            .mailer
            .send(&format!("{} disconnected", self.phone_id), reason)
            .await
        {
            log::warn!(
                "{}: failed to send disconnect notification: {e}",
                self.phone_id
            );
        }
    }

    /// Idempotent: a second call while already `DISABLED` is a no-op beyond
    /// a log line, matching the "disable;disable yields one event" property.
    async fn disable_phone(&mut self, reason: &str) {
        if self.state == WorkerState::Disabled {
            log::warn!("{}: already disabled: {reason}", self.phone_id);
            return;
        }
        self.emit(WorkerState::Disabled, Some(reason.to_string()));
        if let Err(e) = self
            .mailer
            .send(&format!("{} disabled", self.phone_id), reason)
            .await
        {
            log::warn!("{}: failed to send disable notification: {e}", self.phone_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buildcache::mock::MockBuildCacheClient;
    use crate::channel::{command_channel, status_channel};
    use crate::device_agent::fake::FakeDeviceAgent;
    use crate::mailer::mock::MockMailer;
    use crate::models::StoreResult;
    use crate::test_case::mock::MockTestCase;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Minimal in-memory [`JobStore`] double for worker-level tests, so these
    /// tests don't need a real SQLite file.
    #[derive(Default)]
    struct MemoryJobStore {
        jobs: Mutex<Vec<Job>>,
        next_id: Mutex<i64>,
    }

    #[async_trait]
    impl JobStore for MemoryJobStore {
        async fn enqueue(&self, build_url: &str, device_id: &str) -> StoreResult<i64> {
            let mut next_id = self.next_id.lock().unwrap();
            *next_id += 1;
            let id = *next_id;
            self.jobs.lock().unwrap().push(Job {
                id,
                created_at: chrono::Utc::now(),
                last_attempt_at: None,
                build_url: build_url.to_string(),
                attempts: 0,
                device_id: device_id.to_string(),
            });
            Ok(id)
        }

        async fn pending_count(&self, device_id: &str) -> i64 {
            self.jobs
                .lock()
                .unwrap()
                .iter()
                .filter(|j| j.device_id == device_id)
                .count() as i64
        }

        async fn take_next(&self, device_id: &str) -> Option<Job> {
            let mut jobs = self.jobs.lock().unwrap();
            let idx = jobs
                .iter()
                .enumerate()
                .filter(|(_, j)| j.device_id == device_id)
                .max_by_key(|(_, j)| j.created_at)
                .map(|(i, _)| i)?;
            jobs[idx].attempts += 1;
            Some(jobs[idx].clone())
        }

        async fn complete(&self, job_id: i64) -> StoreResult<()> {
            self.jobs.lock().unwrap().retain(|j| j.id != job_id);
            Ok(())
        }

        async fn clear_all(&self) -> StoreResult<()> {
            self.jobs.lock().unwrap().clear();
            Ok(())
        }
    }

    fn phone_cfg() -> PhoneConfig {
        PhoneConfig {
            phone_id: "D1".to_string(),
            ip: "10.0.0.1".to_string(),
            sut_cmd_port: 20701,
            abi: "armeabi-v6".to_string(),
            model: "test".to_string(),
            os_version: "1".to_string(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn make_worker(
        device: Arc<FakeDeviceAgent>,
        tests: Vec<Arc<dyn TestCase>>,
        store: Arc<MemoryJobStore>,
        cache: Arc<MockBuildCacheClient>,
        mailer: Arc<MockMailer>,
        commands: CommandReceiver,
        status: StatusSender,
    ) -> Worker {
        Worker::new(
            phone_cfg(),
            TuningConfig::default(),
            device,
            tests,
            store,
            cache,
            mailer,
            commands,
            status,
            WorkerState::Idle,
        )
    }

    #[tokio::test]
    async fn happy_path_installs_and_completes() {
        let device = Arc::new(FakeDeviceAgent::new());
        let test_case: Arc<dyn TestCase> = Arc::new(MockTestCase::accepting_all());
        let store = Arc::new(MemoryJobStore::default());
        let cache = Arc::new(MockBuildCacheClient::new());
        let mailer = Arc::new(MockMailer::new());
        let (_cmd_tx, cmd_rx) = command_channel(8);
        let (status_tx, mut status_rx) = status_channel(8);

        store
            .enqueue("http://example.test/armv6/build.apk", "D1")
            .await
            .unwrap();

        let mut worker = make_worker(
            device,
            vec![test_case.clone()],
            store.clone(),
            cache,
            mailer,
            cmd_rx,
            status_tx,
        );

        let job = worker.store.take_next("D1").await.unwrap();
        worker.handle_job(job).await;

        assert_eq!(worker.state(), WorkerState::Idle);
        assert_eq!(store.pending_count("D1").await, 0);

        let mut states = Vec::new();
        while let Ok(Some(status)) =
            tokio::time::timeout(std::time::Duration::from_millis(10), status_rx.recv()).await
        {
            states.push(status.state);
        }
        assert!(states.contains(&WorkerState::Installing));
        assert!(states.contains(&WorkerState::Working));
    }

    #[tokio::test]
    async fn abi_mismatch_drops_without_installing() {
        let device = Arc::new(FakeDeviceAgent::new());
        let store = Arc::new(MemoryJobStore::default());
        let cache = Arc::new(MockBuildCacheClient::new());
        let mailer = Arc::new(MockMailer::new());
        let (_cmd_tx, cmd_rx) = command_channel(8);
        let (status_tx, _status_rx) = status_channel(8);

        store
            .enqueue("http://example.test/x86/build.apk", "D1")
            .await
            .unwrap();

        let mut worker = make_worker(
            device.clone(),
            vec![],
            store.clone(),
            cache,
            mailer,
            cmd_rx,
            status_tx,
        );

        let job = worker.store.take_next("D1").await.unwrap();
        worker.handle_job(job).await;

        assert_eq!(store.pending_count("D1").await, 0);
        assert!(!device.calls().contains(&"install_app".to_string()));
    }

    #[tokio::test]
    async fn no_accepting_test_drops_job() {
        let device = Arc::new(FakeDeviceAgent::new());
        let mut repos = HashMap::new();
        repos.insert("D2".to_string(), vec!["other".to_string()]);
        let test_case: Arc<dyn TestCase> = Arc::new(MockTestCase::new(repos, false));
        let store = Arc::new(MemoryJobStore::default());
        let cache = Arc::new(MockBuildCacheClient::new());
        let mailer = Arc::new(MockMailer::new());
        let (_cmd_tx, cmd_rx) = command_channel(8);
        let (status_tx, _status_rx) = status_channel(8);

        store
            .enqueue("http://example.test/armv6/build.apk", "D1")
            .await
            .unwrap();

        let mut worker = make_worker(
            device,
            vec![test_case],
            store.clone(),
            cache,
            mailer,
            cmd_rx,
            status_tx,
        );

        let job = worker.store.take_next("D1").await.unwrap();
        worker.handle_job(job).await;

        assert_eq!(store.pending_count("D1").await, 0);
    }

    #[tokio::test]
    async fn install_exhaustion_disconnects_and_notifies() {
        let device = Arc::new(FakeDeviceAgent::new());
        device.queue_install_failure("no space");
        device.queue_install_failure("no space");
        let test_case: Arc<dyn TestCase> = Arc::new(MockTestCase::accepting_all());
        let store = Arc::new(MemoryJobStore::default());
        let cache = Arc::new(MockBuildCacheClient::new());
        let mailer = Arc::new(MockMailer::new());
        let (_cmd_tx, cmd_rx) = command_channel(8);
        let (status_tx, _status_rx) = status_channel(8);

        store
            .enqueue("http://example.test/armv6/build.apk", "D1")
            .await
            .unwrap();

        let mut tuning = TuningConfig::default();
        tuning.phone_retry_wait_secs = 0;

        let mut worker = Worker::new(
            phone_cfg(),
            tuning,
            device,
            vec![test_case],
            store.clone(),
            cache,
            mailer.clone(),
            cmd_rx,
            status_tx,
            WorkerState::Idle,
        );

        let job = worker.store.take_next("D1").await.unwrap();
        worker.handle_job(job).await;

        assert_eq!(worker.state(), WorkerState::Disconnected);
        assert_eq!(store.pending_count("D1").await, 1);
        assert_eq!(mailer.sent().len(), 1);
    }
}
