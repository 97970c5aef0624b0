//! Capability facade for a single test body run against an installed build.
//!
//! The worker never inspects a test's internals: it only reads the
//! device→repos selection map, asks whether unit tests are enabled, and
//! drives `runjob`.

use crate::buildcache::BuildMetadata;
use crate::device_agent::DeviceAgent;
use crate::models::DeviceResult;
use async_trait::async_trait;
use std::collections::HashMap;

/// What a [`TestCase`] needs back from the worker driving it: the device
/// connection and the phone's identity. Kept as a trait rather than a
/// concrete `Worker` reference so this module has no dependency on the
/// worker state machine.
pub trait WorkerContext: Send + Sync {
    fn phone_id(&self) -> &str;
    fn device_agent(&self) -> &dyn DeviceAgent;
}

/// A single test body, selected per-device by its `device_repos` map.
#[async_trait]
pub trait TestCase: Send + Sync {
    /// Device id → accepted repo substrings. An empty map means "all devices,
    /// all builds".
    fn device_repos(&self) -> &HashMap<String, Vec<String>>;

    /// Whether this test wants unit tests enabled when the build is fetched.
    fn enable_unittests(&self) -> bool;

    /// Records the build this test is about to run against.
    fn set_current_build(&self, blddate: f64);

    fn set_debug_level(&self, level: u8);

    /// Runs the test body against the installed build.
    async fn runjob(
        &self,
        metadata: &BuildMetadata,
        worker: &dyn WorkerContext,
    ) -> DeviceResult<()>;

    /// Clears any cached base-device path, forcing it to be re-derived on
    /// next use. Called after a failed sdcard health check.
    fn reset_base_device_path(&self);

    /// Per-device test-selection filter (§4.F): true if this test accepts a
    /// job for `device_id` whose URL is `build_url`.
    fn accepts(&self, device_id: &str, build_url: &str) -> bool {
        let repos = self.device_repos();
        if repos.is_empty() {
            return true;
        }
        match repos.get(device_id) {
            None => false,
            Some(list) => list.iter().any(|repo| build_url.contains(repo.as_str())),
        }
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    /// A [`TestCase`] double that records every `runjob` invocation and
    /// returns a scripted outcome.
    pub struct MockTestCase {
        device_repos: HashMap<String, Vec<String>>,
        enable_unittests: bool,
        result: Mutex<Option<DeviceResult<()>>>,
        runs: Mutex<Vec<String>>,
        current_build: Mutex<Option<f64>>,
        debug_level: Mutex<u8>,
        base_device_path_reset: Mutex<bool>,
    }

    impl MockTestCase {
        pub fn new(device_repos: HashMap<String, Vec<String>>, enable_unittests: bool) -> Self {
            Self {
                device_repos,
                enable_unittests,
                result: Mutex::new(None),
                runs: Mutex::new(Vec::new()),
                current_build: Mutex::new(None),
                debug_level: Mutex::new(0),
                base_device_path_reset: Mutex::new(false),
            }
        }

        pub fn accepting_all() -> Self {
            Self::new(HashMap::new(), false)
        }

        pub fn fail_next(&self, err: crate::models::DeviceError) {
            *self.result.lock().unwrap() = Some(Err(err));
        }

        pub fn runs(&self) -> Vec<String> {
            self.runs.lock().unwrap().clone()
        }

        pub fn base_device_path_was_reset(&self) -> bool {
            *self.base_device_path_reset.lock().unwrap()
        }
    }

    #[async_trait]
    impl TestCase for MockTestCase {
        fn device_repos(&self) -> &HashMap<String, Vec<String>> {
            &self.device_repos
        }

        fn enable_unittests(&self) -> bool {
            self.enable_unittests
        }

        fn set_current_build(&self, blddate: f64) {
            *self.current_build.lock().unwrap() = Some(blddate);
        }

        fn set_debug_level(&self, level: u8) {
            *self.debug_level.lock().unwrap() = level;
        }

        async fn runjob(
            &self,
            metadata: &BuildMetadata,
            worker: &dyn WorkerContext,
        ) -> DeviceResult<()> {
            self.runs
                .lock()
                .unwrap()
                .push(format!("{}:{}", worker.phone_id(), metadata.tree));
            self.result.lock().unwrap().take().unwrap_or(Ok(()))
        }

        fn reset_base_device_path(&self) {
            *self.base_device_path_reset.lock().unwrap() = true;
        }
    }
}
