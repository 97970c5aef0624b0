//! End-to-end scenarios driving the supervisor and its spawned worker tasks
//! together, as opposed to the worker-internal unit tests in `src/worker.rs`.

use autophoned::buildcache::mock::MockBuildCacheClient;
use autophoned::config::{Config, PhoneConfig, TuningConfig};
use autophoned::device_agent::fake::FakeDeviceAgent;
use autophoned::device_agent::DeviceAgent;
use autophoned::mailer::mock::MockMailer;
use autophoned::mailer::Mailer;
use autophoned::models::WorkerState;
use autophoned::store::{JobStore, SqliteJobStore};
use autophoned::supervisor::Supervisor;
use autophoned::test_case::mock::MockTestCase;
use autophoned::test_case::TestCase;
use std::sync::Arc;
use std::time::Duration;

fn fleet_config() -> Config {
    Config {
        phones: vec![PhoneConfig {
            phone_id: "D1".to_string(),
            ip: "10.0.0.5".to_string(),
            sut_cmd_port: 20701,
            abi: "armeabi-v6".to_string(),
            model: "test-phone".to_string(),
            os_version: "14".to_string(),
        }],
        tuning: TuningConfig {
            phone_retry_wait_secs: 0,
            ..TuningConfig::default()
        },
    }
}

async fn temp_store() -> (Arc<SqliteJobStore>, tempfile::TempDir, Arc<MockMailer>) {
    let dir = tempfile::tempdir().unwrap();
    let mailer = Arc::new(MockMailer::new());
    let store = SqliteJobStore::open(
        dir.path().join("jobs.sqlite3").to_str().unwrap(),
        mailer.clone(),
    )
    .await
    .unwrap();
    (Arc::new(store), dir, mailer)
}

/// Drains every status for the full `window`, without stopping early at a
/// target state. Used when the assertion cares about event *count*.
async fn drain_for(supervisor: &mut Supervisor, window: Duration) -> Vec<WorkerState> {
    let mut seen = Vec::new();
    let end = tokio::time::Instant::now() + window;
    loop {
        let remaining = end.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, supervisor.recv_status()).await {
            Ok(Some(status)) => seen.push(status.state),
            _ => break,
        }
    }
    seen
}

#[tokio::test]
async fn happy_path_reaches_idle_and_completes_job() {
    let (store, _dir, mailer) = temp_store().await;
    let config = fleet_config();
    let device = Arc::new(FakeDeviceAgent::new());
    let device_for_factory = device.clone();
    let build_cache = Arc::new(MockBuildCacheClient::new());
    let test_case: Arc<dyn TestCase> = Arc::new(MockTestCase::accepting_all());

    let mut supervisor = Supervisor::start(
        &config,
        store.clone() as Arc<dyn JobStore>,
        build_cache,
        mailer.clone() as Arc<dyn Mailer>,
        vec![test_case],
        move |_phone_cfg| device_for_factory.clone() as Arc<dyn DeviceAgent>,
    );

    supervisor
        .new_job("http://example.test/armv6/build.apk", Some("D1"))
        .await
        .unwrap();

    let seen = drain_for(&mut supervisor, Duration::from_secs(1)).await;
    assert!(seen.contains(&WorkerState::Installing));
    assert!(seen.contains(&WorkerState::Working));
    assert_eq!(*seen.last().unwrap(), WorkerState::Idle);

    assert_eq!(store.pending_count("D1").await, 0);
    supervisor.stop().await;
}

#[tokio::test]
async fn abi_mismatch_drops_job_without_installing() {
    let (store, _dir, mailer) = temp_store().await;
    let config = fleet_config();
    let device = Arc::new(FakeDeviceAgent::new());
    let device_for_factory = device.clone();
    let build_cache = Arc::new(MockBuildCacheClient::new());
    let test_case: Arc<dyn TestCase> = Arc::new(MockTestCase::accepting_all());

    let mut supervisor = Supervisor::start(
        &config,
        store.clone() as Arc<dyn JobStore>,
        build_cache,
        mailer.clone() as Arc<dyn Mailer>,
        vec![test_case],
        move |_phone_cfg| device_for_factory.clone() as Arc<dyn DeviceAgent>,
    );

    // "D1" is configured armeabi-v6; an x86 build is incompatible.
    supervisor
        .new_job("http://example.test/x86/build.apk", Some("D1"))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(store.pending_count("D1").await, 0);
    assert!(!device.calls().contains(&"install_app".to_string()));

    supervisor.stop().await;
}

#[tokio::test]
async fn disable_then_disable_yields_one_event() {
    let (store, _dir, mailer) = temp_store().await;
    let config = fleet_config();
    let device = Arc::new(FakeDeviceAgent::new());
    let build_cache = Arc::new(MockBuildCacheClient::new());

    let mut supervisor = Supervisor::start(
        &config,
        store.clone() as Arc<dyn JobStore>,
        build_cache,
        mailer.clone() as Arc<dyn Mailer>,
        vec![],
        move |_phone_cfg| device.clone() as Arc<dyn DeviceAgent>,
    );

    supervisor.disable("D1");
    supervisor.disable("D1");

    let seen = drain_for(&mut supervisor, Duration::from_millis(500)).await;
    let disabled_count = seen.iter().filter(|s| **s == WorkerState::Disabled).count();
    assert_eq!(disabled_count, 1);

    supervisor.stop().await;
}
