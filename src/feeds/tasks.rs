//! Background task queue for the push pipeline.
//!
//! Web handlers and services enqueue work; the worker runs every task as its
//! own tokio task, so tasks are not ordered relative to each other. Fetch and
//! hub failures are retried with exponential backoff.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::notification::NotificationHandler;
use super::subscriber::SubscriptionManager;
use super::types::Notification;
use crate::config::PushConfig;
use crate::project::Link;
use crate::Result;

/// A unit of background work.
#[derive(Debug, Clone)]
pub enum Task {
    /// Subscribe a newly created link.
    Subscribe { link_id: i64 },
    /// Unsubscribe a deleted link.
    Unsubscribe { link: Link },
    /// Renew an expiring hub lease.
    Renew { subscription_id: i64 },
    /// Store the entries of a hub notification.
    Notify {
        subscription_id: i64,
        notification: Notification,
    },
}

impl Task {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Task::Subscribe { .. } => "subscribe",
            Task::Unsubscribe { .. } => "unsubscribe",
            Task::Renew { .. } => "renew",
            Task::Notify { .. } => "notify",
        }
    }
}

/// Sending side of the task queue.
#[derive(Clone)]
pub struct TaskQueue {
    sender: mpsc::UnboundedSender<Task>,
}

impl TaskQueue {
    /// Create a queue and the receiver a [`TaskWorker`] consumes.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Task>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Enqueue a task. Returns false when no worker is running.
    pub fn enqueue(&self, task: Task) -> bool {
        let name = task.name();
        match self.sender.send(task) {
            Ok(()) => {
                debug!(task = name, "Task enqueued");
                true
            }
            Err(_) => {
                error!(task = name, "Task queue closed, task dropped");
                false
            }
        }
    }
}

/// Retry policy for background tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &PushConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
        }
    }

    /// Delay before retry number `attempt` (1-based): base, 2x base, 4x base...
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

/// Executes tasks against the subscription manager and notification handler.
pub struct TaskRunner {
    manager: Arc<SubscriptionManager>,
    handler: NotificationHandler,
    retry: RetryPolicy,
}

impl TaskRunner {
    pub fn new(
        manager: Arc<SubscriptionManager>,
        handler: NotificationHandler,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            manager,
            handler,
            retry,
        }
    }

    /// Run a task to completion, retrying transient failures.
    ///
    /// Returns whether the task eventually succeeded. Failures are logged,
    /// never propagated.
    pub async fn run(&self, task: &Task) -> bool {
        let mut attempt = 1;
        loop {
            match self.execute(task).await {
                Ok(()) => return true,
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay(attempt);
                    warn!(
                        task = task.name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Task failed, retrying: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if e.is_transient() => {
                    warn!(task = task.name(), attempt, "Task failed, giving up: {}", e);
                    return false;
                }
                Err(e) => {
                    warn!(task = task.name(), "Task failed: {}", e);
                    return false;
                }
            }
        }
    }

    async fn execute(&self, task: &Task) -> Result<()> {
        match task {
            Task::Subscribe { link_id } => {
                self.manager.subscribe(*link_id).await?;
            }
            Task::Unsubscribe { link } => {
                self.manager.unsubscribe(link).await?;
            }
            Task::Renew { subscription_id } => {
                self.manager.renew(*subscription_id).await?;
            }
            Task::Notify {
                subscription_id,
                notification,
            } => {
                self.handler.handle(*subscription_id, notification).await?;
            }
        }
        Ok(())
    }
}

/// Consumes the task queue.
pub struct TaskWorker {
    receiver: mpsc::UnboundedReceiver<Task>,
    runner: Arc<TaskRunner>,
}

impl TaskWorker {
    pub fn new(receiver: mpsc::UnboundedReceiver<Task>, runner: Arc<TaskRunner>) -> Self {
        Self { receiver, runner }
    }

    /// Run until every queue handle is dropped.
    pub async fn run(mut self) {
        info!("Task worker started");

        while let Some(task) = self.receiver.recv().await {
            let runner = Arc::clone(&self.runner);
            tokio::spawn(async move {
                runner.run(&task).await;
            });
        }

        info!("Task worker stopped");
    }
}
