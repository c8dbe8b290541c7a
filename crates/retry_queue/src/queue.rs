//! Background retry queue.
//!
//! The queue is an actor: one spawned task owns the pending operations and is
//! woken by a fixed-interval ticker and by commands sent through a
//! [`RetryQueue`] handle. Each tick pops the head, invokes it and, on a
//! retryable failure, puts it back at the head with an incremented attempt
//! counter. A server-provided delay longer than the tick interval holds the
//! head until it has elapsed.
//!
//! # Example
//!
//! ```ignore
//! let (queue, _task) = RetryQueue::spawn(RetryQueueConfig::default());
//! queue.enqueue("calendar:plant:p1", move || {
//!     let client = client.clone();
//!     async move { client.create_event(&event).await.map(|_| ()) }
//! })?;
//! ```

use crate::backoff::BackoffPolicy;
use crate::classify::{DefaultClassifier, ErrorClassifier};
use crate::error::{CallError, QueueError};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// A re-invocable external call
pub type Invocation = Arc<dyn Fn() -> BoxFuture<'static, Result<(), CallError>> + Send + Sync>;

/// Retry queue configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryQueueConfig {
    /// How often the head of the queue is processed
    pub tick_interval_ms: u64,
    /// Retries allowed after the first attempt, unless overridden per call
    pub max_retries: u32,
    /// Ceiling on a single invocation; exceeding it counts as a transient failure
    pub call_timeout_ms: u64,
    /// Delay used for rate limiting when the server gives none
    pub rate_limit_delay_secs: u64,
    pub backoff: BackoffPolicy,
}

impl Default for RetryQueueConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 5000,
            max_retries: 3,
            call_timeout_ms: 10_000,
            rate_limit_delay_secs: 60,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl RetryQueueConfig {
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn default_classifier(&self) -> DefaultClassifier {
        DefaultClassifier {
            rate_limit_delay: Duration::from_secs(self.rate_limit_delay_secs),
        }
    }
}

/// Lifecycle notifications published by the queue
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    Succeeded {
        id: String,
        attempts: u32,
    },
    Retrying {
        id: String,
        attempt: u32,
        delay: Duration,
        error: CallError,
    },
    PermanentFailure {
        id: String,
        attempts: u32,
        error: CallError,
    },
}

struct RetryableOperation {
    id: String,
    invoke: Invocation,
    /// Failed attempts so far
    attempt: u32,
    max_attempts: u32,
    not_before: Option<Instant>,
}

enum Command {
    Enqueue(RetryableOperation),
    Cancel {
        id: String,
        reply: oneshot::Sender<bool>,
    },
    PendingIds(oneshot::Sender<Vec<String>>),
    ProcessNow,
    Shutdown,
}

/// Cloneable handle to a running retry queue
#[derive(Clone)]
pub struct RetryQueue {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<QueueEvent>,
    default_max_retries: u32,
}

impl RetryQueue {
    /// Spawn the queue task with the default classification table
    pub fn spawn(config: RetryQueueConfig) -> (Self, JoinHandle<()>) {
        let classifier = Arc::new(config.default_classifier());
        Self::spawn_with_classifier(config, classifier)
    }

    pub fn spawn_with_classifier(
        config: RetryQueueConfig,
        classifier: Arc<dyn ErrorClassifier>,
    ) -> (Self, JoinHandle<()>) {
        let (commands, receiver) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(64);

        let worker = QueueWorker {
            queue: VecDeque::new(),
            tick_interval: config.tick_interval(),
            call_timeout: config.call_timeout(),
            backoff: config.backoff.clone(),
            classifier,
            events: events.clone(),
        };
        let handle = tokio::spawn(worker.run(receiver));

        let queue = Self {
            commands,
            events,
            default_max_retries: config.max_retries,
        };
        (queue, handle)
    }

    /// Queue a call with the configured retry limit.
    ///
    /// An existing entry with the same id is replaced.
    pub fn enqueue<F, Fut>(&self, id: impl Into<String>, invoke: F) -> Result<(), QueueError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CallError>> + Send + 'static,
    {
        self.enqueue_with_retries(id, self.default_max_retries, invoke)
    }

    pub fn enqueue_with_retries<F, Fut>(
        &self,
        id: impl Into<String>,
        max_retries: u32,
        invoke: F,
    ) -> Result<(), QueueError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CallError>> + Send + 'static,
    {
        let invocation: Invocation = Arc::new(move || invoke().boxed());
        self.enqueue_invocation(id, invocation, max_retries, None)
    }

    /// Queue a call whose first attempt must wait at least `delay`
    pub fn enqueue_delayed<F, Fut>(
        &self,
        id: impl Into<String>,
        delay: Duration,
        invoke: F,
    ) -> Result<(), QueueError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CallError>> + Send + 'static,
    {
        let invocation: Invocation = Arc::new(move || invoke().boxed());
        self.enqueue_invocation(id, invocation, self.default_max_retries, Some(delay))
    }

    pub fn enqueue_invocation(
        &self,
        id: impl Into<String>,
        invoke: Invocation,
        max_retries: u32,
        delay: Option<Duration>,
    ) -> Result<(), QueueError> {
        let op = RetryableOperation {
            id: id.into(),
            invoke,
            attempt: 0,
            max_attempts: max_retries,
            not_before: delay.map(|d| Instant::now() + d),
        };
        self.send(Command::Enqueue(op))
    }

    pub fn default_max_retries(&self) -> u32 {
        self.default_max_retries
    }

    /// Remove a queued call. Returns whether it was present.
    pub async fn cancel(&self, id: impl Into<String>) -> Result<bool, QueueError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Cancel {
            id: id.into(),
            reply,
        })?;
        rx.await.map_err(|_| QueueError::Closed)
    }

    /// Ids of queued calls, head first
    pub async fn pending_ids(&self) -> Result<Vec<String>, QueueError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::PendingIds(reply))?;
        rx.await.map_err(|_| QueueError::Closed)
    }

    pub async fn len(&self) -> Result<usize, QueueError> {
        Ok(self.pending_ids().await?.len())
    }

    /// Process the head without waiting for the next tick
    pub fn process_now(&self) -> Result<(), QueueError> {
        self.send(Command::ProcessNow)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    /// Stop the queue task; queued calls are dropped
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }

    fn send(&self, command: Command) -> Result<(), QueueError> {
        self.commands.send(command).map_err(|_| QueueError::Closed)
    }
}

struct QueueWorker {
    queue: VecDeque<RetryableOperation>,
    tick_interval: Duration,
    call_timeout: Duration,
    backoff: BackoffPolicy,
    classifier: Arc<dyn ErrorClassifier>,
    events: broadcast::Sender<QueueEvent>,
}

impl QueueWorker {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let mut ticker =
            tokio::time::interval_at(Instant::now() + self.tick_interval, self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle(command).await,
                },
                _ = ticker.tick() => self.process_head().await,
            }
        }

        if !self.queue.is_empty() {
            tracing::warn!("Retry queue stopped with {} calls pending", self.queue.len());
        }
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Enqueue(op) => self.enqueue(op),
            Command::Cancel { id, reply } => {
                let before = self.queue.len();
                self.queue.retain(|op| op.id != id);
                let _ = reply.send(self.queue.len() != before);
            }
            Command::PendingIds(reply) => {
                let _ = reply.send(self.queue.iter().map(|op| op.id.clone()).collect());
            }
            Command::ProcessNow => self.process_head().await,
            Command::Shutdown => {}
        }
    }

    fn enqueue(&mut self, op: RetryableOperation) {
        match self.queue.iter_mut().find(|queued| queued.id == op.id) {
            Some(existing) => {
                tracing::debug!("Replacing queued external call {}", op.id);
                *existing = op;
            }
            None => {
                tracing::debug!("Queued external call {}", op.id);
                self.queue.push_back(op);
            }
        }
    }

    async fn process_head(&mut self) {
        let due = match self.queue.front() {
            Some(head) => head.not_before.map_or(true, |at| Instant::now() >= at),
            None => return,
        };
        if !due {
            return;
        }
        let Some(mut op) = self.queue.pop_front() else {
            return;
        };

        let result = match tokio::time::timeout(self.call_timeout, (op.invoke)()).await {
            Ok(result) => result,
            Err(_) => Err(CallError::Timeout(self.call_timeout)),
        };

        let error = match result {
            Ok(()) => {
                tracing::debug!("External call {} succeeded", op.id);
                self.publish(QueueEvent::Succeeded {
                    id: op.id,
                    attempts: op.attempt + 1,
                });
                return;
            }
            Err(error) => error,
        };

        let classification = self.classifier.classify(&error);
        op.attempt += 1;

        if classification.retryable && op.attempt <= op.max_attempts {
            let delay = classification
                .retry_after
                .unwrap_or_else(|| self.backoff.delay_for_attempt(op.attempt));
            op.not_before = (delay > self.tick_interval).then(|| Instant::now() + delay);
            tracing::warn!(
                "External call {} failed (attempt {}/{}), retrying in {:?}: {}",
                op.id,
                op.attempt,
                op.max_attempts,
                delay.max(self.tick_interval),
                error
            );
            self.publish(QueueEvent::Retrying {
                id: op.id.clone(),
                attempt: op.attempt,
                delay,
                error,
            });
            self.queue.push_front(op);
        } else {
            tracing::error!(
                "External call {} failed permanently after {} attempts: {}",
                op.id,
                op.attempt,
                error
            );
            self.publish(QueueEvent::PermanentFailure {
                id: op.id,
                attempts: op.attempt,
                error,
            });
        }
    }

    fn publish(&self, event: QueueEvent) {
        let _ = self.events.send(event);
    }
}
