//! Owns one worker task per configured phone and fans supervisory commands
//! out to them over each worker's command channel.

use crate::buildcache::BuildCacheClient;
use crate::channel::{
    command_channel, status_channel, CommandSender, StatusReceiver, StatusSender, WorkerCommand,
};
use crate::config::{Config, PhoneConfig};
use crate::constants::{shutdown_join_timeout, COMMAND_CHANNEL_CAPACITY, STATUS_CHANNEL_CAPACITY};
use crate::device_agent::DeviceAgent;
use crate::mailer::Mailer;
use crate::models::{StoreResult, WorkerState, WorkerStatus};
use crate::store::JobStore;
use crate::test_case::TestCase;
use crate::worker::Worker;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

struct WorkerHandle {
    commands: CommandSender,
    join: JoinHandle<()>,
}

/// Owns the `phone_id → WorkerHandle` map and the shared status channel every
/// worker publishes onto.
pub struct Supervisor {
    workers: HashMap<String, WorkerHandle>,
    store: Arc<dyn JobStore>,
    status_tx: StatusSender,
    status_rx: StatusReceiver,
}

impl Supervisor {
    /// Spawns one worker task per phone in `config`, each wired to a
    /// `DeviceAgent` built by `device_factory` and the shared `tests` list.
    pub fn start(
        config: &Config,
        store: Arc<dyn JobStore>,
        build_cache: Arc<dyn BuildCacheClient>,
        mailer: Arc<dyn Mailer>,
        tests: Vec<Arc<dyn TestCase>>,
        device_factory: impl Fn(&PhoneConfig) -> Arc<dyn DeviceAgent>,
    ) -> Self {
        let (status_tx, status_rx) = status_channel(STATUS_CHANNEL_CAPACITY);
        let mut workers = HashMap::new();

        for phone_cfg in &config.phones {
            let (cmd_tx, cmd_rx) = command_channel(COMMAND_CHANNEL_CAPACITY);
            let device = device_factory(phone_cfg);
            let mut worker = Worker::new(
                phone_cfg.clone(),
                config.tuning.clone(),
                device,
                tests.clone(),
                store.clone(),
                build_cache.clone(),
                mailer.clone(),
                cmd_rx,
                status_tx.clone(),
                WorkerState::Idle,
            );
            let phone_id = phone_cfg.phone_id.clone();
            let join = tokio::spawn(async move {
                worker.run().await;
            });
            workers.insert(
                phone_id,
                WorkerHandle {
                    commands: cmd_tx,
                    join,
                },
            );
        }

        Self {
            workers,
            store,
            status_tx,
            status_rx,
        }
    }

    /// Awaits the next status transition from any worker.
    pub async fn recv_status(&mut self) -> Option<WorkerStatus> {
        self.status_rx.recv().await
    }

    fn submit(&self, phone_id: &str, cmd: WorkerCommand) {
        match self.workers.get(phone_id) {
            Some(handle) => handle.commands.submit(cmd),
            None => log::warn!("supervisor: unknown phone id {phone_id}"),
        }
    }

    fn broadcast(&self, cmd: WorkerCommand) {
        for handle in self.workers.values() {
            handle.commands.submit(cmd.clone());
        }
    }

    /// Enqueues `build_url` for `phone_id` and wakes that worker. `None`
    /// broadcasts the enqueue (and the wake-up) to every configured phone.
    pub async fn new_job(&self, build_url: &str, phone_id: Option<&str>) -> StoreResult<()> {
        match phone_id {
            Some(id) => {
                self.store.enqueue(build_url, id).await?;
                self.submit(id, WorkerCommand::Job);
            }
            None => {
                for id in self.workers.keys() {
                    self.store.enqueue(build_url, id).await?;
                }
                self.broadcast(WorkerCommand::Job);
            }
        }
        Ok(())
    }

    pub fn reboot(&self, phone_id: &str) {
        self.submit(phone_id, WorkerCommand::Reboot);
    }

    pub fn disable(&self, phone_id: &str) {
        self.submit(phone_id, WorkerCommand::Disable);
    }

    pub fn enable(&self, phone_id: &str) {
        self.submit(phone_id, WorkerCommand::Enable);
    }

    pub fn debug(&self, phone_id: &str, level: u8) {
        self.submit(phone_id, WorkerCommand::Debug(level));
    }

    pub fn ping(&self, phone_id: &str) {
        self.submit(phone_id, WorkerCommand::Ping);
    }

    pub fn phone_ids(&self) -> impl Iterator<Item = &str> {
        self.workers.keys().map(String::as_str)
    }

    /// Stops every worker, waiting up to `shutdown_join_timeout()` per
    /// worker. A worker that doesn't exit in time is abandoned (the process
    /// exit reclaims it); a worker whose task panicked is reported as a
    /// synthetic `DISABLED` status since it can no longer self-report.
    pub async fn stop(mut self) {
        self.broadcast(WorkerCommand::Stop);
        for (phone_id, handle) in self.workers.drain() {
            match tokio::time::timeout(shutdown_join_timeout(), handle.join).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    log::error!("worker {phone_id} panicked: {e}");
                    let status = WorkerStatus::new(phone_id, WorkerState::Disabled)
                        .with_msg(format!("worker task panicked: {e}"));
                    self.status_tx.publish(status);
                }
                Err(_) => log::warn!("worker {phone_id} did not stop in time, abandoning"),
            }
        }
    }
}
