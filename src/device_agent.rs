//! Capability facade for phone operations.
//!
//! The production binding would speak the on-device agent's wire protocol;
//! that transport is out of scope here (see module docs in `SPEC_FULL.md`
//! §4.E). This module defines only the interface the worker depends on, plus
//! a scripted test double.

use crate::models::DeviceResult;
use async_trait::async_trait;

/// Phone operations the worker state machine drives. Every method fails with
/// [`crate::models::DeviceError`] on transport or remote-agent failure.
#[async_trait]
pub trait DeviceAgent: Send + Sync {
    async fn device_root(&self) -> DeviceResult<String>;
    async fn dir_exists(&self, path: &str) -> DeviceResult<bool>;
    async fn mkdirs(&self, path: &str) -> DeviceResult<()>;
    async fn rmdir(&self, path: &str) -> DeviceResult<()>;
    async fn push_file(&self, local: &str, remote: &str) -> DeviceResult<()>;
    async fn push_dir(&self, local: &str, remote: &str) -> DeviceResult<()>;
    async fn chmod_dir(&self, path: &str) -> DeviceResult<()>;
    async fn remove_file(&self, path: &str) -> DeviceResult<()>;
    async fn install_app(&self, remote_path: &str) -> DeviceResult<()>;
    async fn kill_process(&self, name: &str) -> DeviceResult<()>;
    async fn launch_app(
        &self,
        name: &str,
        intent: &str,
        env: &[(String, String)],
        args: &[String],
        url: Option<&str>,
    ) -> DeviceResult<()>;
    /// Reboots the phone at `host_ip`. When `wait` is true, blocks until the
    /// device agent confirms the phone came back up.
    async fn reboot(&self, host_ip: &str, wait: bool) -> DeviceResult<()>;

    /// Sets the debug/log verbosity forwarded to the on-device agent.
    fn set_debug_level(&self, level: u8);
}

/// Placeholder [`DeviceAgent`] for deployments with no wired-up transport:
/// logs each call and reports success, mirroring the role [`crate::mailer::LoggingMailer`]
/// plays for notifications. A real binding would replace this with one that
/// actually speaks the on-device agent's protocol.
pub struct LoggingDeviceAgent {
    phone_id: String,
    debug_level: std::sync::atomic::AtomicU8,
}

impl LoggingDeviceAgent {
    pub fn new(phone_id: impl Into<String>) -> Self {
        Self {
            phone_id: phone_id.into(),
            debug_level: std::sync::atomic::AtomicU8::new(0),
        }
    }
}

#[async_trait]
impl DeviceAgent for LoggingDeviceAgent {
    async fn device_root(&self) -> DeviceResult<String> {
        log::debug!("{}: device_root (no transport configured)", self.phone_id);
        Ok("/sdcard".to_string())
    }

    async fn dir_exists(&self, path: &str) -> DeviceResult<bool> {
        log::debug!("{}: dir_exists({path})", self.phone_id);
        Ok(true)
    }

    async fn mkdirs(&self, path: &str) -> DeviceResult<()> {
        log::debug!("{}: mkdirs({path})", self.phone_id);
        Ok(())
    }

    async fn rmdir(&self, path: &str) -> DeviceResult<()> {
        log::debug!("{}: rmdir({path})", self.phone_id);
        Ok(())
    }

    async fn push_file(&self, local: &str, remote: &str) -> DeviceResult<()> {
        log::debug!("{}: push_file({local} -> {remote})", self.phone_id);
        Ok(())
    }

    async fn push_dir(&self, local: &str, remote: &str) -> DeviceResult<()> {
        log::debug!("{}: push_dir({local} -> {remote})", self.phone_id);
        Ok(())
    }

    async fn chmod_dir(&self, path: &str) -> DeviceResult<()> {
        log::debug!("{}: chmod_dir({path})", self.phone_id);
        Ok(())
    }

    async fn remove_file(&self, path: &str) -> DeviceResult<()> {
        log::debug!("{}: remove_file({path})", self.phone_id);
        Ok(())
    }

    async fn install_app(&self, remote_path: &str) -> DeviceResult<()> {
        log::info!("{}: install_app({remote_path})", self.phone_id);
        Ok(())
    }

    async fn kill_process(&self, name: &str) -> DeviceResult<()> {
        log::debug!("{}: kill_process({name})", self.phone_id);
        Ok(())
    }

    async fn launch_app(
        &self,
        name: &str,
        intent: &str,
        _env: &[(String, String)],
        _args: &[String],
        url: Option<&str>,
    ) -> DeviceResult<()> {
        log::info!("{}: launch_app({name}, {intent}, url={url:?})", self.phone_id);
        Ok(())
    }

    async fn reboot(&self, host_ip: &str, wait: bool) -> DeviceResult<()> {
        log::info!("{}: reboot({host_ip}, wait={wait})", self.phone_id);
        Ok(())
    }

    fn set_debug_level(&self, level: u8) {
        self.debug_level
            .store(level, std::sync::atomic::Ordering::Relaxed);
        log::debug!("{}: debug level set to {level}", self.phone_id);
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod fake {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Per-operation scripted outcome queue: pop the front result, or fall
    /// back to `default_ok` when the queue is empty.
    #[derive(Default)]
    struct Script {
        device_root: VecDeque<DeviceResult<String>>,
        install_app: VecDeque<DeviceResult<()>>,
        reboot: VecDeque<DeviceResult<()>>,
    }

    /// A scripted [`DeviceAgent`] double: each operation can be queued to fail
    /// or succeed a specific number of times, then defaults to success,
    /// mirroring the teacher's `MockDeviceManager` "configurable failing
    /// operations" pattern.
    #[derive(Default)]
    pub struct FakeDeviceAgent {
        script: Mutex<Script>,
        calls: Mutex<Vec<String>>,
        debug_level: Mutex<u8>,
    }

    impl FakeDeviceAgent {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }

        pub fn queue_device_root(&self, result: DeviceResult<String>) {
            self.script.lock().unwrap().device_root.push_back(result);
        }

        pub fn queue_install_failure(&self, reason: &str) {
            self.script
                .lock()
                .unwrap()
                .install_app
                .push_back(Err(crate::models::DeviceError::operation_failed(
                    "fake", "install", reason,
                )));
        }

        pub fn queue_install_success(&self) {
            self.script.lock().unwrap().install_app.push_back(Ok(()));
        }

        pub fn queue_reboot_failure(&self, reason: &str) {
            self.script
                .lock()
                .unwrap()
                .reboot
                .push_back(Err(crate::models::DeviceError::operation_failed(
                    "fake", "reboot", reason,
                )));
        }

        pub fn debug_level(&self) -> u8 {
            *self.debug_level.lock().unwrap()
        }
    }

    #[async_trait]
    impl DeviceAgent for FakeDeviceAgent {
        async fn device_root(&self) -> DeviceResult<String> {
            self.record("device_root");
            self.script
                .lock()
                .unwrap()
                .device_root
                .pop_front()
                .unwrap_or_else(|| Ok("/sdcard".to_string()))
        }

        async fn dir_exists(&self, _path: &str) -> DeviceResult<bool> {
            self.record("dir_exists");
            Ok(true)
        }

        async fn mkdirs(&self, _path: &str) -> DeviceResult<()> {
            self.record("mkdirs");
            Ok(())
        }

        async fn rmdir(&self, _path: &str) -> DeviceResult<()> {
            self.record("rmdir");
            Ok(())
        }

        async fn push_file(&self, _local: &str, _remote: &str) -> DeviceResult<()> {
            self.record("push_file");
            Ok(())
        }

        async fn push_dir(&self, _local: &str, _remote: &str) -> DeviceResult<()> {
            self.record("push_dir");
            Ok(())
        }

        async fn chmod_dir(&self, _path: &str) -> DeviceResult<()> {
            self.record("chmod_dir");
            Ok(())
        }

        async fn remove_file(&self, _path: &str) -> DeviceResult<()> {
            self.record("remove_file");
            Ok(())
        }

        async fn install_app(&self, _remote_path: &str) -> DeviceResult<()> {
            self.record("install_app");
            self.script
                .lock()
                .unwrap()
                .install_app
                .pop_front()
                .unwrap_or(Ok(()))
        }

        async fn kill_process(&self, _name: &str) -> DeviceResult<()> {
            self.record("kill_process");
            Ok(())
        }

        async fn launch_app(
            &self,
            _name: &str,
            _intent: &str,
            _env: &[(String, String)],
            _args: &[String],
            _url: Option<&str>,
        ) -> DeviceResult<()> {
            self.record("launch_app");
            Ok(())
        }

        async fn reboot(&self, _host_ip: &str, _wait: bool) -> DeviceResult<()> {
            self.record("reboot");
            self.script
                .lock()
                .unwrap()
                .reboot
                .pop_front()
                .unwrap_or(Ok(()))
        }

        fn set_debug_level(&self, level: u8) {
            *self.debug_level.lock().unwrap() = level;
        }
    }
}
