use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::service::IndexService;

/// Admin lifecycle. At most one operation is ever past `Idle`; terminal
/// states linger briefly so a polling client can observe them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminState {
    Idle,
    Optimizing,
    Purging,
    Unlocking,
    Completed,
    Failed,
}

impl AdminState {
    fn is_active(self) -> bool {
        matches!(
            self,
            AdminState::Optimizing | AdminState::Purging | AdminState::Unlocking
        )
    }

    fn is_terminal(self) -> bool {
        matches!(self, AdminState::Completed | AdminState::Failed)
    }
}

/// Operations the executor understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminOp {
    Optimize { max_segments: usize },
    Purge { full: bool },
    Unlock,
}

impl AdminOp {
    fn running_state(&self) -> AdminState {
        match self {
            AdminOp::Optimize { .. } => AdminState::Optimizing,
            AdminOp::Purge { .. } => AdminState::Purging,
            AdminOp::Unlock => AdminState::Unlocking,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            AdminOp::Optimize { .. } => "optimize",
            AdminOp::Purge { .. } => "purge",
            AdminOp::Unlock => "unlock",
        }
    }
}

/// Snapshot handed to status polls. External readers never see the live
/// tuple, only copies taken under the lock.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdminStatus {
    pub state: AdminState,
    pub current_operation_id: Option<String>,
    pub current_operation: Option<String>,
    pub progress: u8,
    pub message: String,
    pub started_at_ms: Option<i64>,
    pub last_operation_result: Option<String>,
}

struct AdminTuple {
    state: AdminState,
    operation_id: Option<String>,
    operation: Option<&'static str>,
    progress: u8,
    message: String,
    started_at_ms: Option<i64>,
    last_result: Option<String>,
}

impl AdminTuple {
    fn idle() -> Self {
        Self {
            state: AdminState::Idle,
            operation_id: None,
            operation: None,
            progress: 0,
            message: String::new(),
            started_at_ms: None,
            last_result: None,
        }
    }

    fn snapshot(&self) -> AdminStatus {
        AdminStatus {
            state: self.state,
            current_operation_id: self.operation_id.clone(),
            current_operation: self.operation.map(str::to_owned),
            progress: self.progress,
            message: self.message.clone(),
            started_at_ms: self.started_at_ms,
            last_operation_result: self.last_result.clone(),
        }
    }
}

/// A begin attempt while another operation is active.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("operation {0} already running")]
pub struct AlreadyRunning(pub String);

/// Admin operations run one at a time on a dedicated executor thread.
/// Every state transition happens under the tuple lock; the post-terminal
/// cleanup compare-and-sets the operation id so a newer operation's state
/// can never be clobbered by an older operation's reset.
pub struct AdminService {
    tuple: Arc<Mutex<AdminTuple>>,
    ops_tx: Mutex<Option<flume::Sender<(String, AdminOp)>>>,
    done_rx: flume::Receiver<()>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AdminService {
    const SHUTDOWN_WAIT: Duration = Duration::from_secs(30);

    pub fn new(service: Arc<IndexService>) -> Self {
        Self::with_linger(service, Duration::from_secs(1))
    }

    pub fn with_linger(service: Arc<IndexService>, linger: Duration) -> Self {
        let tuple = Arc::new(Mutex::new(AdminTuple::idle()));
        let (ops_tx, ops_rx) = flume::unbounded::<(String, AdminOp)>();
        let (done_tx, done_rx) = flume::bounded(1);

        let worker_tuple = tuple.clone();
        let worker_service = service.clone();
        let worker = std::thread::Builder::new()
            .name("index-admin".into())
            .spawn(move || {
                for (op_id, op) in ops_rx.iter() {
                    run_operation(&worker_service, &worker_tuple, &op_id, &op, linger);
                }
                drop(done_tx);
            })
            .expect("failed to spawn admin executor");

        Self {
            tuple,
            ops_tx: Mutex::new(Some(ops_tx)),
            done_rx,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Claims the state machine and enqueues the operation. Fails with
    /// the running operation's id while any operation is active.
    pub fn begin(&self, op: AdminOp) -> Result<String, AlreadyRunning> {
        let op_id = Uuid::new_v4().to_string();
        {
            let mut tuple = self.tuple.lock().unwrap();
            if tuple.state.is_active() {
                return Err(AlreadyRunning(
                    tuple.operation_id.clone().unwrap_or_default(),
                ));
            }
            tuple.state = op.running_state();
            tuple.operation_id = Some(op_id.clone());
            tuple.operation = Some(op.label());
            tuple.progress = 0;
            tuple.message = format!("{} queued", op.label());
            tuple.started_at_ms = Some(chrono::Utc::now().timestamp_millis());
        }
        let sent = {
            let tx = self.ops_tx.lock().unwrap();
            match tx.as_ref() {
                // unbounded send only fails after shutdown
                Some(tx) => tx.send((op_id.clone(), op)).is_ok(),
                None => false,
            }
        };
        if !sent {
            let mut tuple = self.tuple.lock().unwrap();
            *tuple = AdminTuple::idle();
            warn!("admin executor is gone, operation dropped");
        }
        Ok(op_id)
    }

    pub fn status(&self) -> AdminStatus {
        self.tuple.lock().unwrap().snapshot()
    }

    /// Drains the executor, waiting up to 30 s for the in-flight
    /// operation before hard-cutting.
    pub fn shutdown(&self) {
        self.ops_tx.lock().unwrap().take();
        match self.done_rx.recv_timeout(Self::SHUTDOWN_WAIT) {
            Ok(()) | Err(flume::RecvTimeoutError::Disconnected) => {
                if let Some(worker) = self.worker.lock().unwrap().take() {
                    if worker.join().is_err() {
                        error!("admin executor panicked");
                    }
                }
            }
            Err(flume::RecvTimeoutError::Timeout) => {
                warn!("admin executor did not drain in time, detaching");
                self.worker.lock().unwrap().take();
            }
        }
    }
}

impl Drop for AdminService {
    fn drop(&mut self) {
        if self.ops_tx.lock().unwrap().is_some() {
            self.shutdown();
        }
    }
}

fn run_operation(
    service: &Arc<IndexService>,
    tuple: &Arc<Mutex<AdminTuple>>,
    op_id: &str,
    op: &AdminOp,
    linger: Duration,
) {
    set_progress(tuple, op_id, 5, format!("{} started", op.label()));
    let outcome = match op {
        AdminOp::Optimize { max_segments } => {
            set_progress(tuple, op_id, 25, "merging segments".into());
            service
                .force_merge(*max_segments)
                .map(|()| format!("optimized index to at most {max_segments} segment(s)"))
        }
        AdminOp::Purge { full: false } => {
            set_progress(tuple, op_id, 25, "deleting all documents".into());
            service.delete_all().map(|()| {
                service.refresh();
                "purged all documents".to_owned()
            })
        }
        AdminOp::Purge { full: true } => {
            set_progress(tuple, op_id, 25, "recreating index directory".into());
            service
                .recreate()
                .map(|()| "purged index directory and recreated the index".to_owned())
        }
        AdminOp::Unlock => {
            let lock_path = service.writer_lock_path();
            if lock_path.exists() {
                std::fs::remove_file(&lock_path)
                    .map(|()| format!("removed writer lock {}", lock_path.display()))
                    .map_err(anyhow::Error::from)
            } else {
                Ok("no writer lock present".to_owned())
            }
        }
    };

    {
        let mut tuple = tuple.lock().unwrap();
        if tuple.operation_id.as_deref() != Some(op_id) {
            // a newer operation took over; do not touch its state
            return;
        }
        match outcome {
            Ok(result) => {
                info!(op = op.label(), %op_id, "admin operation completed");
                tuple.state = AdminState::Completed;
                tuple.progress = 100;
                tuple.message = result.clone();
                tuple.last_result = Some(result);
            }
            Err(err) => {
                error!(op = op.label(), %op_id, error = %err, "admin operation failed");
                tuple.state = AdminState::Failed;
                tuple.message = err.to_string();
                tuple.last_result = Some(format!("{} failed: {err}", op.label()));
            }
        }
    }

    // let pollers observe the terminal state, then reset to Idle only if
    // this operation still owns the tuple
    let cleanup_tuple = tuple.clone();
    let cleanup_id = op_id.to_owned();
    std::thread::spawn(move || {
        std::thread::sleep(linger);
        let mut tuple = cleanup_tuple.lock().unwrap();
        if tuple.operation_id.as_deref() == Some(cleanup_id.as_str()) && tuple.state.is_terminal() {
            *tuple = AdminTuple::idle();
        }
    });
}

fn set_progress(tuple: &Arc<Mutex<AdminTuple>>, op_id: &str, progress: u8, message: String) {
    let mut tuple = tuple.lock().unwrap();
    if tuple.operation_id.as_deref() == Some(op_id) {
        tuple.progress = progress;
        tuple.message = message;
    }
}
