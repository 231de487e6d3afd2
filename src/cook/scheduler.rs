//! Single-flight task scheduler.
//!
//! One worker thread runs at most one task at a time; at most one more task
//! waits behind it. A task scheduled on an idle scheduler is admitted at once
//! and counts as running. Scheduling while a task waits replaces the waiting
//! task, which resolves `Skipped` without running:
//!
//! ```text
//! schedule(T1)  -> T1 runs
//! schedule(T2)  -> T2 waits
//! schedule(T3)  -> T2 Skipped, T3 waits
//! T1 finishes   -> T3 runs
//! ```
//!
//! Cancellation is cooperative: the running task receives a [`CancelToken`]
//! and checks it at its own suspension points. Task errors and panics are
//! caught and reported; the worker survives them.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded};
use log::{debug, trace};

/// Cooperative cancel flag shared between a task and its handle.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a scheduled task ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome<T> {
    Finished(T),
    /// Token was canceled before or while running
    Canceled,
    /// Replaced by a newer task before it started
    Skipped,
    /// Task returned an error or panicked
    Error(String),
}

impl<T> TaskOutcome<T> {
    pub fn is_finished(&self) -> bool {
        matches!(self, TaskOutcome::Finished(_))
    }

    pub fn finished(self) -> Option<T> {
        match self {
            TaskOutcome::Finished(v) => Some(v),
            _ => None,
        }
    }
}

type Task<T> = Box<dyn FnOnce(&CancelToken) -> Result<T> + Send + 'static>;

struct Pending<T> {
    id: u64,
    task: Task<T>,
    token: CancelToken,
    reply: Sender<TaskOutcome<T>>,
}

struct State<T> {
    /// Accepted for running; never replaced
    admitted: Option<Pending<T>>,
    /// Waiting behind the running task
    pending: Option<Pending<T>>,
    running: Option<CancelToken>,
    shutdown: bool,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    wake: Condvar,
}

impl<T> Shared<T> {
    fn lock(&self) -> std::sync::MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Handle to one scheduled task. The outcome is delivered once.
pub struct TaskHandle<T> {
    id: u64,
    token: CancelToken,
    outcome: Receiver<TaskOutcome<T>>,
}

impl<T> TaskHandle<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Request cancellation. A task that has not started yet never runs.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn was_canceled(&self) -> bool {
        self.token.is_canceled()
    }

    /// Block until the task resolves.
    pub fn wait(self) -> TaskOutcome<T> {
        self.outcome
            .recv()
            .unwrap_or_else(|_| TaskOutcome::Error("scheduler dropped the task".into()))
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<TaskOutcome<T>> {
        match self.outcome.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                Some(TaskOutcome::Error("scheduler dropped the task".into()))
            }
        }
    }

    /// Non-blocking poll.
    pub fn try_outcome(&self) -> Option<TaskOutcome<T>> {
        match self.outcome.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                Some(TaskOutcome::Error("scheduler dropped the task".into()))
            }
        }
    }
}

pub struct Scheduler<T: Send + 'static> {
    shared: Arc<Shared<T>>,
    next_id: AtomicU64,
    handle: Option<thread::JoinHandle<()>>,
}

impl<T: Send + 'static> Scheduler<T> {
    pub fn new(name: &str) -> Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                admitted: None,
                pending: None,
                running: None,
                shutdown: false,
            }),
            wake: Condvar::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(format!("{}-scheduler", name))
            .spawn(move || worker_loop(worker_shared))
            .context("Failed to spawn scheduler thread")?;

        trace!("Scheduler '{}' started", name);
        Ok(Self {
            shared,
            next_id: AtomicU64::new(1),
            handle: Some(handle),
        })
    }

    /// Run `task` now if idle, otherwise queue it behind the running task,
    /// replacing (and skipping) any task still waiting.
    pub fn schedule<F>(&self, task: F) -> TaskHandle<T>
    where
        F: FnOnce(&CancelToken) -> Result<T> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancelToken::new();
        let (reply, outcome) = bounded(1);
        let handle = TaskHandle {
            id,
            token: token.clone(),
            outcome,
        };

        let mut state = self.shared.lock();
        if state.shutdown {
            let _ = reply.send(TaskOutcome::Skipped);
            return handle;
        }
        let job = Pending {
            id,
            task: Box::new(task),
            token,
            reply,
        };
        let replaced = if state.running.is_none() {
            state.running = Some(job.token.clone());
            state.admitted = Some(job);
            None
        } else {
            state.pending.replace(job)
        };
        drop(state);

        if let Some(old) = replaced {
            debug!("Task {} skipped, superseded by {}", old.id, id);
            let _ = old.reply.send(TaskOutcome::Skipped);
        }
        self.shared.wake.notify_one();
        handle
    }

    /// Cancel the running task, if any. Returns whether one was running.
    pub fn cancel_current(&self) -> bool {
        let state = self.shared.lock();
        match &state.running {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// A task is running or waiting.
    pub fn is_busy(&self) -> bool {
        let state = self.shared.lock();
        state.running.is_some() || state.pending.is_some()
    }
}

fn worker_loop<T>(shared: Arc<Shared<T>>) {
    loop {
        let job = {
            let mut state = shared.lock();
            loop {
                if let Some(job) = state.admitted.take() {
                    break job;
                }
                if state.shutdown {
                    return;
                }
                state = shared.wake.wait(state).unwrap_or_else(|e| e.into_inner());
            }
        };

        let Pending {
            id,
            task,
            token,
            reply,
        } = job;
        trace!("Task {} started", id);

        let outcome = if token.is_canceled() {
            TaskOutcome::Canceled
        } else {
            match catch_unwind(AssertUnwindSafe(|| task(&token))) {
                Ok(_) if token.is_canceled() => TaskOutcome::Canceled,
                Ok(Ok(value)) => TaskOutcome::Finished(value),
                Ok(Err(e)) => TaskOutcome::Error(format!("{:#}", e)),
                Err(panic) => TaskOutcome::Error(panic_message(panic)),
            }
        };

        {
            let mut state = shared.lock();
            state.running = state.pending.as_ref().map(|next| next.token.clone());
            state.admitted = state.pending.take();
        }
        trace!("Task {} done", id);
        let _ = reply.send(outcome);
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("task panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("task panicked: {}", s)
    } else {
        "task panicked".to_string()
    }
}

impl<T: Send + 'static> Drop for Scheduler<T> {
    fn drop(&mut self) {
        let pending = {
            let mut state = self.shared.lock();
            state.shutdown = true;
            if let Some(token) = &state.running {
                token.cancel();
            }
            state.pending.take()
        };
        if let Some(p) = pending {
            let _ = p.reply.send(TaskOutcome::Skipped);
        }
        self.shared.wake.notify_all();

        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        trace!("Scheduler stopped");
    }
}
