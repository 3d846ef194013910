//! Batching queue for outgoing telemetry events.
//!
//! Events are buffered in arrival order and delivered to the `log_event` endpoint in batches. A
//! batch is sent when either:
//! - the buffer reaches [`EventQueueConfig::max_batch_size`] events, or
//! - [`EventQueueConfig::flush_interval`] has passed since the first event was buffered, or
//! - [`EventQueue::flush()`] is called explicitly.
//!
//! Two background threads serve the queue. The delivery worker sends batches to the transport
//! one at a time, so producers never wait on the network. The flush timer owns the single
//! deferred-flush deadline and never touches the network, so a slow delivery cannot hold back
//! the next time-triggered flush.
use std::{
    collections::HashSet,
    sync::{
        mpsc::{self, RecvTimeoutError, TrySendError},
        Arc, Mutex, Weak,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use crate::{
    events::{Event, LogEventRequest},
    transport::{Endpoint, Transport},
    Error, Result, SdkMetadata, User,
};

/// Configuration for [`EventQueue`].
#[derive(Debug, Clone)]
pub struct EventQueueConfig {
    /// Number of buffered events that triggers an immediate flush.
    ///
    /// Defaults to [`EventQueueConfig::DEFAULT_MAX_BATCH_SIZE`].
    pub max_batch_size: usize,
    /// Maximum time an event waits in the buffer before a flush is triggered.
    ///
    /// Defaults to [`EventQueueConfig::DEFAULT_FLUSH_INTERVAL`].
    pub flush_interval: Duration,
    /// Number of flushed batches allowed to wait for delivery. Batches flushed while this many
    /// are already waiting (e.g., because the network is slow) are dropped.
    ///
    /// Defaults to [`EventQueueConfig::DEFAULT_MAX_PENDING_BATCHES`].
    pub max_pending_batches: usize,
}

impl EventQueueConfig {
    /// Default value for [`EventQueueConfig::max_batch_size`].
    pub const DEFAULT_MAX_BATCH_SIZE: usize = 500;
    /// Default value for [`EventQueueConfig::flush_interval`].
    pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(10);
    /// Default value for [`EventQueueConfig::max_pending_batches`].
    pub const DEFAULT_MAX_PENDING_BATCHES: usize = 64;

    /// Create a new `EventQueueConfig` using default configuration.
    pub fn new() -> EventQueueConfig {
        EventQueueConfig::default()
    }

    /// Update max batch size. Values below 1 are treated as 1.
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> EventQueueConfig {
        self.max_batch_size = max_batch_size.max(1);
        self
    }

    /// Update flush interval with `flush_interval`.
    pub fn with_flush_interval(mut self, flush_interval: Duration) -> EventQueueConfig {
        self.flush_interval = flush_interval;
        self
    }

    /// Update the delivery backlog limit. Values below 1 are treated as 1.
    pub fn with_max_pending_batches(mut self, max_pending_batches: usize) -> EventQueueConfig {
        self.max_pending_batches = max_pending_batches.max(1);
        self
    }
}

impl Default for EventQueueConfig {
    fn default() -> EventQueueConfig {
        EventQueueConfig {
            max_batch_size: EventQueueConfig::DEFAULT_MAX_BATCH_SIZE,
            flush_interval: EventQueueConfig::DEFAULT_FLUSH_INTERVAL,
            max_pending_batches: EventQueueConfig::DEFAULT_MAX_PENDING_BATCHES,
        }
    }
}

/// Commands processed by the delivery worker, in order.
enum Delivery {
    Batch(Batch),
    Stop,
}

/// Commands processed by the flush timer.
enum TimerCommand {
    /// Flush at the given instant. Replaces any outstanding deadline.
    Arm(Instant),
    Stop,
}

struct Batch {
    events: Vec<Event>,
    metadata: SdkMetadata,
}

/// Channels to the background threads.
struct Workers {
    delivery: mpsc::SyncSender<Delivery>,
    timer: mpsc::Sender<TimerCommand>,
}

struct QueueState {
    events: Vec<Event>,
    metadata: SdkMetadata,
    gate_exposures: HashSet<String>,
    config_exposures: HashSet<String>,
    /// `None` once the queue has been shut down.
    workers: Option<Workers>,
}

struct Shared {
    config: EventQueueConfig,
    state: Mutex<QueueState>,
}

/// Buffers outgoing events and delivers them in batches.
///
/// `EventQueue` is `Sync`: any number of threads may enqueue concurrently. Appending an event,
/// checking the buffer size and deciding whether to flush or arm the timer happen under a single
/// lock, and a flush swaps the buffer out under that same lock, so no event is lost or delivered
/// twice.
pub struct EventQueue {
    shared: Arc<Shared>,
    join_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl EventQueue {
    /// Create a queue and start its background threads.
    ///
    /// # Errors
    ///
    /// - IO Error if a background thread failed to start.
    pub fn new(
        config: EventQueueConfig,
        transport: Arc<dyn Transport>,
        metadata: SdkMetadata,
    ) -> Result<EventQueue> {
        let (delivery_sender, delivery_receiver) =
            mpsc::sync_channel::<Delivery>(config.max_pending_batches.max(1));
        let (timer_sender, timer_receiver) = mpsc::channel::<TimerCommand>();

        let shared = Arc::new(Shared {
            config,
            state: Mutex::new(QueueState {
                events: Vec::new(),
                metadata,
                gate_exposures: HashSet::new(),
                config_exposures: HashSet::new(),
                workers: Some(Workers {
                    delivery: delivery_sender,
                    timer: timer_sender,
                }),
            }),
        });

        let delivery = std::thread::Builder::new()
            .name("gatekit-event-queue".to_owned())
            .spawn(move || run_delivery(delivery_receiver, transport))?;

        // The timer must not keep the queue alive: once the last `EventQueue` handle is dropped,
        // the senders are dropped with it and both threads exit.
        let timer = {
            let shared = Arc::downgrade(&shared);
            std::thread::Builder::new()
                .name("gatekit-flush-timer".to_owned())
                .spawn(move || run_timer(timer_receiver, shared))?
        };

        Ok(EventQueue {
            shared,
            join_handles: Mutex::new(vec![delivery, timer]),
        })
    }

    /// Append `event` to the buffer.
    ///
    /// Triggers an immediate flush once the buffer reaches `max_batch_size`. The first event
    /// buffered after a flush arms the deferred-flush timer.
    pub fn enqueue(&self, event: Event) {
        let mut state = self.shared.lock_state();
        self.shared.enqueue_locked(&mut state, event);
    }

    /// Hand all buffered events to the delivery worker as a single batch.
    ///
    /// No-op if the buffer is empty. Does not wait for the delivery to complete; delivery failures
    /// are logged and the batch is dropped.
    pub fn flush(&self) {
        self.shared.flush();
    }

    /// Log a gate exposure, at most once per gate until the next [`EventQueue::reset()`].
    pub fn log_gate_exposure(&self, gate: &str, value: bool, rule_id: &str, user: &User) {
        let mut state = self.shared.lock_state();
        if !state.gate_exposures.insert(gate.to_owned()) {
            return;
        }
        let event = Event::gate_exposure(gate, value, rule_id, user);
        self.shared.enqueue_locked(&mut state, event);
    }

    /// Log a config exposure, at most once per config until the next [`EventQueue::reset()`].
    pub fn log_config_exposure(&self, config: &str, group: &str, rule_id: &str, user: &User) {
        let mut state = self.shared.lock_state();
        if !state.config_exposures.insert(config.to_owned()) {
            return;
        }
        let event = Event::config_exposure(config, group, rule_id, user);
        self.shared.enqueue_locked(&mut state, event);
    }

    /// Flush pending events and forget all logged exposures, so they are reported again.
    pub fn reset(&self) {
        let mut state = self.shared.lock_state();
        self.shared.flush_locked(&mut state);
        state.gate_exposures.clear();
        state.config_exposures.clear();
        log::debug!(target: "gatekit", "event queue reset");
    }

    /// Replace the metadata attached to batches flushed from now on.
    pub fn set_metadata(&self, metadata: SdkMetadata) {
        self.shared.lock_state().metadata = metadata;
    }

    /// Number of events waiting in the buffer.
    pub fn pending_len(&self) -> usize {
        self.shared.lock_state().events.len()
    }

    /// Flush pending events, stop the background threads and block until every batch handed to
    /// the delivery worker has been delivered.
    ///
    /// Events enqueued after shutdown are dropped. Calling `shutdown()` more than once is a no-op.
    ///
    /// # Errors
    ///
    /// - [`Error::WorkerPanicked`] if a background thread has panicked.
    pub fn shutdown(&self) -> Result<()> {
        let (workers, last_batch) = {
            let mut state = self.shared.lock_state();
            let last_batch = self.shared.take_batch(&mut state);
            (state.workers.take(), last_batch)
        };

        if let Some(workers) = workers {
            // Errors mean the thread has already exited.
            let _ = workers.timer.send(TimerCommand::Stop);
            // Blocking sends: the final batch waits for room in the backlog rather than being
            // dropped. The lock is released, so producers are not held up meanwhile.
            if let Some(batch) = last_batch {
                let _ = workers.delivery.send(Delivery::Batch(batch));
            }
            let _ = workers.delivery.send(Delivery::Stop);
        }

        let join_handles = std::mem::take(
            &mut *self
                .join_handles
                .lock()
                .map_err(|_| Error::WorkerPanicked)?,
        );
        let mut result = Ok(());
        for join_handle in join_handles {
            if join_handle.join().is_err() {
                result = Err(Error::WorkerPanicked);
            }
        }
        result
    }
}

impl Shared {
    fn lock_state(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state
            .lock()
            .expect("thread holding event queue lock should not panic")
    }

    fn enqueue_locked(&self, state: &mut QueueState, event: Event) {
        let Some(workers) = &state.workers else {
            log::trace!(target: "gatekit", event_name = event.event_name.as_str(); "event queue is shut down, dropping event");
            return;
        };

        state.events.push(event);
        if state.events.len() >= self.config.max_batch_size {
            self.flush_locked(state);
        } else if state.events.len() == 1 {
            // The deadline counts from now, not from when the timer thread gets to it. Error
            // means the timer has exited; the events are then delivered by the next flush.
            let deadline = Instant::now() + self.config.flush_interval;
            let _ = workers.timer.send(TimerCommand::Arm(deadline));
        }
    }

    fn flush(&self) {
        let mut state = self.lock_state();
        self.flush_locked(&mut state);
    }

    /// Swap out the buffer, if there is anything to send and the queue is running.
    fn take_batch(&self, state: &mut QueueState) -> Option<Batch> {
        if state.events.is_empty() || state.workers.is_none() {
            return None;
        }
        Some(Batch {
            events: std::mem::take(&mut state.events),
            metadata: state.metadata.clone(),
        })
    }

    fn flush_locked(&self, state: &mut QueueState) {
        let Some(batch) = self.take_batch(state) else {
            return;
        };
        let Some(workers) = &state.workers else {
            return;
        };
        let event_count = batch.events.len();
        log::debug!(target: "gatekit", event_count = event_count; "flushing events");

        // Sending while still holding the lock keeps batches in swap order. `try_send` never
        // blocks: when the delivery backlog is full, the batch is dropped.
        match workers.delivery.try_send(Delivery::Batch(batch)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                log::warn!(target: "gatekit", event_count = event_count; "too many batches waiting for delivery, dropping batch");
            }
            Err(TrySendError::Disconnected(_)) => {
                log::warn!(target: "gatekit", event_count = event_count; "event queue worker has exited, dropping batch");
            }
        }
    }
}

/// Delivers batches in the order they were flushed.
fn run_delivery(receiver: mpsc::Receiver<Delivery>, transport: Arc<dyn Transport>) {
    while let Ok(command) = receiver.recv() {
        match command {
            Delivery::Batch(batch) => deliver(&*transport, batch),
            Delivery::Stop => {
                log::debug!(target: "gatekit", "event queue worker received stop command");
                return;
            }
        }
    }
}

/// Single-slot timer: flushes the queue when the armed deadline passes.
fn run_timer(receiver: mpsc::Receiver<TimerCommand>, shared: Weak<Shared>) {
    let mut deadline: Option<Instant> = None;

    loop {
        let command = match deadline {
            Some(at) => match receiver.recv_timeout(at.saturating_duration_since(Instant::now())) {
                Ok(command) => command,
                Err(RecvTimeoutError::Timeout) => {
                    deadline = None;
                    let Some(shared) = shared.upgrade() else {
                        return;
                    };
                    log::trace!(target: "gatekit", "flush interval elapsed");
                    shared.flush();
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => return,
            },
            None => match receiver.recv() {
                Ok(command) => command,
                Err(_) => return,
            },
        };

        match command {
            TimerCommand::Arm(at) => deadline = Some(at),
            TimerCommand::Stop => return,
        }
    }
}

fn deliver(transport: &dyn Transport, batch: Batch) {
    let body = match serde_json::to_value(LogEventRequest {
        events: &batch.events,
        metadata: &batch.metadata,
    }) {
        Ok(body) => body,
        Err(err) => {
            log::warn!(target: "gatekit", "failed to serialize events: {:?}", err);
            return;
        }
    };

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        transport.post(Endpoint::LogEvent, &body)
    }));
    match result {
        Ok(Ok(_)) => {
            log::debug!(target: "gatekit", event_count = batch.events.len(); "delivered events");
        }
        Ok(Err(err)) => {
            log::warn!(target: "gatekit", event_count = batch.events.len(); "failed to deliver events, dropping batch: {:?}", err);
        }
        Err(_) => {
            log::warn!(target: "gatekit", event_count = batch.events.len(); "transport panicked while delivering events, dropping batch");
        }
    }
}
