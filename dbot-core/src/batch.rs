//! Outbound batching: coalesces everything a turn sends into one save + one send.
//!
//! Each `start` (re)arms a short timer; when it fires the latest session
//! snapshot is saved and the queued items are delivered. At most one
//! save+send pair is in flight per batcher: a `start` or `flush` that arrives
//! while one is running only marks the batch for another pass afterwards.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{BotError, Result};
use crate::events::EventBus;
use crate::stack::SessionState;
use crate::types::DataMap;

/// Everything persisted for a conversation at the end of a flush.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistedSession {
    pub user_data: DataMap,
    pub conversation_data: DataMap,
    pub private_conversation_data: DataMap,
    pub session_state: SessionState,
}

/// Destination of a flush: persist first, then deliver.
#[async_trait]
pub trait BatchSink<T: Send + 'static>: Send + Sync {
    async fn save(&self, snapshot: &PersistedSession) -> Result<()>;
    async fn send(&self, batch: Vec<T>) -> Result<()>;
}

struct BatchInner<T> {
    queue: Vec<T>,
    snapshot: PersistedSession,
    started: bool,
    sending: bool,
    recovering: bool,
    timer: Option<JoinHandle<()>>,
    timer_gen: u64,
    recovery: Option<T>,
    reset_pending: bool,
}

pub struct Batcher<T: Send + 'static> {
    inner: Arc<Mutex<BatchInner<T>>>,
    sink: Arc<dyn BatchSink<T>>,
    delay: Duration,
    events: EventBus,
    changed: Arc<watch::Sender<()>>,
}

impl<T: Send + 'static> Clone for Batcher<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            sink: self.sink.clone(),
            delay: self.delay,
            events: self.events.clone(),
            changed: self.changed.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Batcher<T> {
    pub fn new(sink: Arc<dyn BatchSink<T>>, delay: Duration, events: EventBus) -> Self {
        let (changed, _rx) = watch::channel(());
        Self {
            inner: Arc::new(Mutex::new(BatchInner {
                queue: Vec::new(),
                snapshot: PersistedSession::default(),
                started: false,
                sending: false,
                recovering: false,
                timer: None,
                timer_gen: 0,
                recovery: None,
                reset_pending: false,
            })),
            sink,
            delay,
            events,
            changed: Arc::new(changed),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BatchInner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues an item without scheduling a flush.
    pub fn push(&self, item: T) {
        self.lock().queue.push(item);
    }

    /// Runs `f` over the pending queue (e.g. to insert call-control actions).
    pub fn with_queue<R>(&self, f: impl FnOnce(&mut Vec<T>) -> R) -> R {
        f(&mut self.lock().queue)
    }

    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    /// Replaces the snapshot a later flush will save.
    pub fn set_snapshot(&self, snapshot: PersistedSession) {
        self.lock().snapshot = snapshot;
    }

    /// Item delivered when an unsaveable state forces the conversation to restart.
    pub fn set_recovery_message(&self, item: T) {
        self.lock().recovery = Some(item);
    }

    /// True (once) after an unsaveable-state recovery wiped the persisted data.
    pub fn take_reset(&self) -> bool {
        std::mem::take(&mut self.lock().reset_pending)
    }

    /// Marks the batch dirty and (re)arms the delayed flush.
    pub fn start(&self, snapshot: PersistedSession) {
        let mut inner = self.lock();
        inner.snapshot = snapshot;
        inner.started = true;
        if !inner.sending {
            self.schedule(&mut inner);
        }
        drop(inner);
        self.changed.send_replace(());
    }

    fn schedule(&self, inner: &mut BatchInner<T>) {
        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }
        inner.timer_gen += 1;
        let generation = inner.timer_gen;
        inner.timer = Some(tokio::spawn(Self::timer_task(self.clone(), generation)));
    }

    fn timer_task(this: Self, generation: u64) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            tokio::time::sleep(this.delay).await;
            let taken = {
                let mut inner = this.lock();
                if inner.timer_gen != generation {
                    return;
                }
                inner.timer = None;
                this.begin_flush(&mut inner)
            };
            if let Some((batch, snapshot)) = taken {
                // Failures are reported on the event bus by finish_flush.
                let _ = this.finish_flush(batch, snapshot).await;
            }
        })
    }

    /// Flushes now, cancelling any pending timer. If a flush is already in
    /// flight this only requests another pass once it completes.
    pub fn flush(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let taken = {
                let mut inner = self.lock();
                self.begin_flush(&mut inner)
            };
            match taken {
                Some((batch, snapshot)) => self.finish_flush(batch, snapshot).await,
                None => Ok(()),
            }
        })
    }

    fn begin_flush(&self, inner: &mut BatchInner<T>) -> Option<(Vec<T>, PersistedSession)> {
        if inner.sending {
            debug!("batch flush already in flight; flagging another pass");
            inner.started = true;
            return None;
        }
        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }
        inner.timer_gen += 1;
        inner.started = false;
        inner.sending = true;
        let batch = std::mem::take(&mut inner.queue);
        info!(count = batch.len(), "batch.flush sending");
        Some((batch, inner.snapshot.clone()))
    }

    async fn finish_flush(&self, batch: Vec<T>, snapshot: PersistedSession) -> Result<()> {
        let saved = self.sink.save(&snapshot).await;
        let result = match saved {
            Ok(()) if batch.is_empty() => Ok(()),
            Ok(()) => self.sink.send(batch).await,
            Err(err) => {
                return self.on_save_failed(err).await;
            }
        };

        {
            let mut inner = self.lock();
            inner.sending = false;
            inner.recovering = false;
            if inner.started {
                self.schedule(&mut inner);
            }
        }
        self.changed.send_replace(());

        if let Err(err) = &result {
            self.events.emit_error(err.clone());
        }
        result
    }

    async fn on_save_failed(&self, err: BotError) -> Result<()> {
        let retry = {
            let mut inner = self.lock();
            if err.is_unsaveable() && !inner.recovering {
                warn!(error = %err, "session state could not be saved; restarting conversation");
                inner.recovering = true;
                inner.reset_pending = true;
                inner.snapshot.user_data.clear();
                inner.snapshot.private_conversation_data.clear();
                inner.snapshot.session_state.clear();
                inner.queue.clear();
                if let Some(msg) = inner.recovery.clone() {
                    inner.queue.push(msg);
                }
                let batch = std::mem::take(&mut inner.queue);
                Some((batch, inner.snapshot.clone()))
            } else {
                inner.sending = false;
                inner.recovering = false;
                if inner.started {
                    self.schedule(&mut inner);
                }
                None
            }
        };
        self.events.emit_error(err.clone());
        match retry {
            Some((batch, snapshot)) => {
                // The recovery pass reports its own outcome.
                let _ = self.retry_flush(batch, snapshot).await;
            }
            None => {
                self.changed.send_replace(());
            }
        }
        Err(err)
    }

    fn retry_flush(&self, batch: Vec<T>, snapshot: PersistedSession) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.finish_flush(batch, snapshot))
    }

    /// Resolves once no flush is scheduled or in flight.
    pub async fn idle(&self) {
        let mut rx = self.changed.subscribe();
        loop {
            {
                let inner = self.lock();
                if !inner.sending && inner.timer.is_none() {
                    return;
                }
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}
