//! Ways of bringing up a worker.
//!
//! A launcher returns a [`WorkerHandle`]: the task and reply channels, the
//! readiness signal, and something that can be killed. The manager does not
//! care whether the worker is a child process or a tokio task.

use std::{
    path::PathBuf,
    process::Stdio,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use anyhow::{Context, Result};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    process::{Child, Command},
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

use super::{
    protocol::{decode_line, encode_line, WorkerReply, WorkerRequest},
    worker::{run_worker, WorkerBlueprint},
};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

pub trait WorkerLauncher: Send + Sync {
    /// Starts a worker for `goal`. Must be called from within a tokio runtime.
    fn launch(&self, goal: &str) -> Result<WorkerHandle>;
}

pub struct WorkerHandle {
    /// Human-readable identity for logs, e.g. `pid 4242`.
    pub label: String,
    pub tasks: mpsc::UnboundedSender<WorkerRequest>,
    pub replies: mpsc::UnboundedReceiver<WorkerReply>,
    pub ready: oneshot::Receiver<usize>,
    pub process: WorkerProcess,
}

pub enum WorkerProcess {
    Task(JoinHandle<()>),
    Child {
        child: Child,
        pumps: Vec<JoinHandle<()>>,
    },
}

impl WorkerProcess {
    pub fn is_alive(&mut self) -> bool {
        match self {
            WorkerProcess::Task(handle) => !handle.is_finished(),
            WorkerProcess::Child { child, .. } => matches!(child.try_wait(), Ok(None)),
        }
    }

    /// Hard stop. In-flight work is abandoned.
    pub fn kill(&mut self) {
        match self {
            WorkerProcess::Task(handle) => handle.abort(),
            WorkerProcess::Child { child, pumps } => {
                if let Err(err) = child.start_kill() {
                    log_warn!("failed to kill worker process: {err}");
                }
                for pump in pumps.drain(..) {
                    pump.abort();
                }
            }
        }
    }
}

type SetupFn = dyn Fn() -> Result<WorkerBlueprint> + Send + Sync;

/// Runs the worker as a tokio task in this process.
pub struct InProcessLauncher {
    setup: Arc<SetupFn>,
    next_id: AtomicU64,
}

impl InProcessLauncher {
    pub fn new<F>(setup: F) -> Self
    where
        F: Fn() -> Result<WorkerBlueprint> + Send + Sync + 'static,
    {
        Self {
            setup: Arc::new(setup),
            next_id: AtomicU64::new(1),
        }
    }
}

impl WorkerLauncher for InProcessLauncher {
    fn launch(&self, goal: &str) -> Result<WorkerHandle> {
        let (task_tx, task_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let setup = Arc::clone(&self.setup);
        let goal = goal.to_string();

        let handle = tokio::spawn(async move {
            if let Err(err) = run_worker(goal, move || setup(), task_rx, reply_tx, ready_tx).await {
                log_error!("in-process worker {} failed: {err:#}", id);
            }
        });

        Ok(WorkerHandle {
            label: format!("task {id}"),
            tasks: task_tx,
            replies: reply_rx,
            ready: ready_rx,
            process: WorkerProcess::Task(handle),
        })
    }
}

/// Re-executes a binary with the `worker` subcommand and talks to it over
/// stdin/stdout.
pub struct ChildProcessLauncher {
    program: PathBuf,
    settings_path: PathBuf,
}

impl ChildProcessLauncher {
    pub fn new(program: PathBuf, settings_path: PathBuf) -> Self {
        Self {
            program,
            settings_path,
        }
    }

    /// Uses the currently running executable as the worker binary.
    pub fn current_exe(settings_path: PathBuf) -> Result<Self> {
        let program = std::env::current_exe().context("failed to locate current executable")?;
        Ok(Self::new(program, settings_path))
    }
}

impl WorkerLauncher for ChildProcessLauncher {
    fn launch(&self, goal: &str) -> Result<WorkerHandle> {
        let mut child = Command::new(&self.program)
            .arg("worker")
            .arg(format!("--goal={goal}"))
            .arg("--settings")
            .arg(&self.settings_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.program.display()))?;

        let label = child
            .id()
            .map(|pid| format!("pid {pid}"))
            .unwrap_or_else(|| "pid ?".to_string());
        log_info!("spawned worker {}", label);

        let mut stdin = child.stdin.take().context("worker stdin was not captured")?;
        let stdout = child.stdout.take().context("worker stdout was not captured")?;

        let (task_tx, mut task_rx) = mpsc::unbounded_channel::<WorkerRequest>();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel::<WorkerReply>();
        let (ready_tx, ready_rx) = oneshot::channel::<usize>();

        let writer = tokio::spawn(async move {
            while let Some(request) = task_rx.recv().await {
                let line = match encode_line(&request) {
                    Ok(line) => line,
                    Err(err) => {
                        log_error!("dropping request: {err:#}");
                        continue;
                    }
                };
                if stdin.write_all(line.as_bytes()).await.is_err() || stdin.flush().await.is_err()
                {
                    log_warn!("worker stdin closed");
                    break;
                }
            }
        });

        let reader = tokio::spawn(async move {
            let mut ready_tx = Some(ready_tx);
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }
                match decode_line::<WorkerReply>(&line) {
                    Ok(WorkerReply::Ready { anchors }) => {
                        if let Some(tx) = ready_tx.take() {
                            let _ = tx.send(anchors);
                        }
                    }
                    Ok(reply) => {
                        if reply_tx.send(reply).is_err() {
                            break;
                        }
                    }
                    Err(err) => log_warn!("ignoring worker output: {err:#}"),
                }
            }
        });

        Ok(WorkerHandle {
            label,
            tasks: task_tx,
            replies: reply_rx,
            ready: ready_rx,
            process: WorkerProcess::Child {
                child,
                pumps: vec![writer, reader],
            },
        })
    }
}
