//! Supervisor→worker command channel and worker→supervisor status channel.

use crate::models::WorkerStatus;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

/// Control messages the supervisor can send a worker.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerCommand {
    Stop,
    /// Wake-up hint only; the job itself lives in the job store.
    Job,
    Reboot,
    Disable,
    Enable,
    Debug(u8),
    Ping,
}

/// Producer half of the command channel. `submit` never blocks: when the
/// channel is full, the newest command is dropped in favor of what is
/// already queued, since every command is a re-derivable hint rather than
/// irreplaceable state.
#[derive(Clone)]
pub struct CommandSender {
    tx: mpsc::Sender<WorkerCommand>,
}

impl CommandSender {
    pub fn submit(&self, cmd: WorkerCommand) {
        if let Err(mpsc::error::TrySendError::Full(dropped)) = self.tx.try_send(cmd) {
            log::warn!("command channel full, dropping command: {dropped:?}");
        }
    }
}

/// Consumer half of the command channel, owned by exactly one worker.
pub struct CommandReceiver {
    rx: mpsc::Receiver<WorkerCommand>,
}

impl CommandReceiver {
    /// Non-blocking poll for an already-queued command.
    pub fn try_receive(&mut self) -> Option<WorkerCommand> {
        self.rx.try_recv().ok()
    }

    /// Blocks up to `wait` for a command; `None` on timeout.
    pub async fn receive(&mut self, wait: Duration) -> Option<WorkerCommand> {
        timeout(wait, self.rx.recv()).await.unwrap_or(None)
    }
}

/// Creates a bounded command channel pair.
pub fn command_channel(capacity: usize) -> (CommandSender, CommandReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (CommandSender { tx }, CommandReceiver { rx })
}

/// Producer half of the status channel, owned by exactly one worker.
#[derive(Clone)]
pub struct StatusSender {
    tx: mpsc::Sender<WorkerStatus>,
}

impl StatusSender {
    /// Non-blocking publish; status is observational, so an overflow just logs
    /// a warning and drops the update rather than stalling the worker.
    pub fn publish(&self, status: WorkerStatus) {
        if let Err(mpsc::error::TrySendError::Full(dropped)) = self.tx.try_send(status) {
            log::warn!("status channel full, dropping status: {dropped:?}");
        }
    }
}

/// Consumer half of the status channel, owned by the supervisor.
pub struct StatusReceiver {
    rx: mpsc::Receiver<WorkerStatus>,
}

impl StatusReceiver {
    pub async fn recv(&mut self) -> Option<WorkerStatus> {
        self.rx.recv().await
    }
}

/// Creates a bounded status channel pair.
pub fn status_channel(capacity: usize) -> (StatusSender, StatusReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (StatusSender { tx }, StatusReceiver { rx })
}
