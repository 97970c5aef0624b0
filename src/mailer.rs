//! Notification transport consumed by the job store and worker.
//!
//! The orchestrator never treats a failed send as fatal; callers log and move on.

use async_trait::async_trait;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, subject: &str, body: &str) -> anyhow::Result<()>;
}

/// Default [`Mailer`] for deployments with no configured transport: logs instead
/// of sending. Keeps the orchestrator usable without wiring up a real mail
/// transport, matching the role the original mailer plays when notifications
/// are effectively best-effort.
pub struct LoggingMailer;

#[async_trait]
impl Mailer for LoggingMailer {
    async fn send(&self, subject: &str, body: &str) -> anyhow::Result<()> {
        log::info!("notification: {subject}\n{body}");
        Ok(())
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    /// Records every `(subject, body)` pair sent to it, for assertions in tests.
    #[derive(Default)]
    pub struct MockMailer {
        sent: Mutex<Vec<(String, String)>>,
    }

    impl MockMailer {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Mailer for MockMailer {
        async fn send(&self, subject: &str, body: &str) -> anyhow::Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((subject.to_string(), body.to_string()));
            Ok(())
        }
    }
}
