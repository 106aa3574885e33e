//! Priority-ordered buffered event dispatch.

use super::config::{BufferFullPolicy, EventBusConfig};
use super::handlers::{EventHandler, GameEvent, Handler};
use crate::collections::RingBuffer;
use crate::error::{EventError, ServiceError};
use crate::logging::{Logger, TracingLogger};
use crate::service::{Service, Updatable};
use crate::types::SandboxId;
use crate::utils::catch_panic;
use crossbeam::utils::Backoff;
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

struct Subscription {
    priority: i32,
    handler: Arc<dyn EventHandler>,
}

/// Subscriptions of one event type, keyed by priority, ascending.
type PriorityBuckets = BTreeMap<i32, Vec<Subscription>>;

struct PendingEvent {
    type_id: TypeId,
    event_name: &'static str,
    payload: Box<dyn Any + Send + Sync>,
    enqueued_at: Instant,
}

impl PendingEvent {
    fn new<T: GameEvent>(event: T) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            event_name: event.event_name(),
            payload: Box::new(event),
            enqueued_at: Instant::now(),
        }
    }
}

/// Snapshot of event bus activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventBusStats {
    pub published: u64,
    pub dropped: u64,
    pub dispatched: u64,
    pub handler_failures: u64,
    pub pending: usize,
    pub subscribed_types: usize,
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    dropped: AtomicU64,
    dispatched: AtomicU64,
    handler_failures: AtomicU64,
}

/// Releases the processing flag when a dispatch pass ends.
struct ProcessingGuard<'a>(&'a AtomicBool);

impl<'a> ProcessingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Buffered publish/subscribe hub.
///
/// Events may be published from any thread; they wait in a bounded queue
/// until [`update`](Self::update) dispatches them, which the sandbox does once
/// per tick on the main thread. Each event reaches the handlers of its
/// concrete type in ascending priority order, and handlers sharing a
/// priority run in subscription order.
///
/// # Examples
///
/// ```rust
/// use scarlet_core::{EventBus, EventBusConfig, EventPriority, Handler, SandboxId};
///
/// #[derive(Debug)]
/// struct ChatMessage(String);
///
/// let bus = EventBus::new(SandboxId::new(), EventBusConfig::default());
/// let print = Handler::new(|msg: &ChatMessage| {
///     println!("chat: {}", msg.0);
///     Ok(())
/// });
///
/// assert!(bus.subscribe(&print, EventPriority::NORMAL).unwrap());
/// assert!(bus.publish(ChatMessage("gg".into())).unwrap());
/// assert_eq!(bus.update(), 1);
/// ```
pub struct EventBus {
    owner: SandboxId,
    config: EventBusConfig,
    subscriptions: Mutex<HashMap<TypeId, PriorityBuckets>>,
    queue: RingBuffer<PendingEvent>,
    processing: AtomicBool,
    counters: Counters,
    logger: Arc<dyn Logger>,
}

impl EventBus {
    /// Creates a bus that reports handler failures through `tracing`.
    pub fn new(owner: SandboxId, config: EventBusConfig) -> Self {
        Self::with_logger(owner, config, Arc::new(TracingLogger))
    }

    /// Creates a bus that reports handler failures through `logger`.
    pub fn with_logger(owner: SandboxId, config: EventBusConfig, logger: Arc<dyn Logger>) -> Self {
        Self {
            owner,
            queue: RingBuffer::new(config.buffer_size),
            subscriptions: Mutex::new(HashMap::new()),
            processing: AtomicBool::new(false),
            counters: Counters::default(),
            logger,
            config,
        }
    }

    pub fn config(&self) -> &EventBusConfig {
        &self.config
    }

    /// Subscribes `handler` to events of type `T` at `priority`.
    ///
    /// Returns `Ok(false)` if this handler is already subscribed to `T`, and
    /// [`EventError::HandlerLimit`] if `T` already has the maximum number of
    /// handlers.
    pub fn subscribe<T: GameEvent>(
        &self,
        handler: &Handler<T>,
        priority: i32,
    ) -> Result<bool, EventError> {
        let mut subscriptions = self.subscriptions.lock();
        let buckets = subscriptions.entry(TypeId::of::<T>()).or_default();

        let key = handler.key();
        let mut count = 0;
        for subscription in buckets.values().flatten() {
            if subscription.handler.handler_key() == key {
                return Ok(false);
            }
            count += 1;
        }

        if count >= self.config.max_handlers_per_event {
            if buckets.is_empty() {
                subscriptions.remove(&TypeId::of::<T>());
            }
            return Err(EventError::HandlerLimit {
                event: std::any::type_name::<T>(),
                limit: self.config.max_handlers_per_event,
            });
        }

        buckets.entry(priority).or_default().push(Subscription {
            priority,
            handler: handler.erase(),
        });

        debug!(
            "📝 Subscribed '{}' to {} at priority {}",
            handler.name(),
            std::any::type_name::<T>(),
            priority
        );
        Ok(true)
    }

    /// Removes `handler` from every priority of `T`.
    ///
    /// Empty buckets and event types without any bucket left are pruned.
    pub fn unsubscribe<T: GameEvent>(&self, handler: &Handler<T>) -> bool {
        let type_id = TypeId::of::<T>();
        let key = handler.key();
        let mut subscriptions = self.subscriptions.lock();

        let Some(buckets) = subscriptions.get_mut(&type_id) else {
            return false;
        };

        let mut removed = false;
        buckets.retain(|_, bucket| {
            let before = bucket.len();
            bucket.retain(|subscription| subscription.handler.handler_key() != key);
            removed |= bucket.len() != before;
            !bucket.is_empty()
        });

        if buckets.is_empty() {
            subscriptions.remove(&type_id);
        }

        if removed {
            debug!(
                "🗑️ Unsubscribed '{}' from {}",
                handler.name(),
                std::any::type_name::<T>()
            );
        }
        removed
    }

    /// Queues `event` for the next [`update`](Self::update).
    ///
    /// Returns `Ok(true)` when queued. A full queue is handled according to
    /// the configured [`BufferFullPolicy`].
    pub fn publish<T: GameEvent>(&self, event: T) -> Result<bool, EventError> {
        match self.queue.try_enqueue(PendingEvent::new(event)) {
            Ok(()) => {
                self.counters.published.fetch_add(1, Ordering::Relaxed);
                Ok(true)
            }
            Err(pending) => self.publish_when_full(pending),
        }
    }

    fn publish_when_full(&self, mut pending: PendingEvent) -> Result<bool, EventError> {
        match self.config.buffer_full_policy {
            BufferFullPolicy::DropEvent => {}
            BufferFullPolicy::WaitForSpace => {
                let backoff = Backoff::new();
                for _ in 0..self.config.spin_wait_max_count {
                    backoff.snooze();
                    match self.queue.try_enqueue(pending) {
                        Ok(()) => {
                            self.counters.published.fetch_add(1, Ordering::Relaxed);
                            return Ok(true);
                        }
                        Err(returned) => pending = returned,
                    }
                }
            }
            BufferFullPolicy::Reject => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                return Err(EventError::QueueFull);
            }
        }

        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
        trace!("Event queue full, dropped {}", pending.event_name);
        Ok(false)
    }

    /// Dispatches up to `max_events_per_update` queued events.
    ///
    /// Returns the number of events taken off the queue. A nested call made
    /// from inside a handler returns `0` without dispatching anything.
    pub fn update(&self) -> usize {
        let Some(_processing) = ProcessingGuard::acquire(&self.processing) else {
            return 0;
        };

        let mut processed = 0;
        while processed < self.config.max_events_per_update {
            let Some(pending) = self.queue.try_dequeue() else {
                break;
            };
            self.dispatch(&pending);
            processed += 1;
        }
        processed
    }

    fn dispatch(&self, pending: &PendingEvent) {
        // Snapshot so handlers may (un)subscribe without deadlocking.
        let handlers: Vec<Arc<dyn EventHandler>> = {
            let subscriptions = self.subscriptions.lock();
            match subscriptions.get(&pending.type_id) {
                Some(buckets) => buckets
                    .values()
                    .flatten()
                    .map(|subscription| Arc::clone(&subscription.handler))
                    .collect(),
                None => return,
            }
        };

        for handler in handlers {
            let outcome = catch_panic(|| handler.handle(pending.payload.as_ref()));
            let failure = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(panic) => format!("panicked: {panic}"),
            };

            self.counters
                .handler_failures
                .fetch_add(1, Ordering::Relaxed);
            self.logger.error(&format!(
                "Handler '{}' failed for {}: {}",
                handler.handler_name(),
                pending.event_name,
                failure
            ));
        }

        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
        trace!(
            "Dispatched {} after {:?} in queue",
            pending.event_name,
            pending.enqueued_at.elapsed()
        );
    }

    /// Removes every subscription and every queued event.
    pub fn clear(&self) {
        self.subscriptions.lock().clear();
        let discarded = self.queue.clear();
        debug!("🧹 Event bus cleared ({} queued events discarded)", discarded);
    }

    pub fn handler_count<T: GameEvent>(&self) -> usize {
        self.subscriptions
            .lock()
            .get(&TypeId::of::<T>())
            .map(|buckets| buckets.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    pub fn has_subscribers<T: GameEvent>(&self) -> bool {
        self.subscriptions.lock().contains_key(&TypeId::of::<T>())
    }

    /// Priorities that currently hold handlers for `T`, ascending.
    pub fn priorities<T: GameEvent>(&self) -> Vec<i32> {
        self.subscriptions
            .lock()
            .get(&TypeId::of::<T>())
            .map(|buckets| {
                buckets
                    .values()
                    .flatten()
                    .map(|subscription| subscription.priority)
                    .collect::<Vec<_>>()
            })
            .map(|mut priorities| {
                priorities.dedup();
                priorities
            })
            .unwrap_or_default()
    }

    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> EventBusStats {
        EventBusStats {
            published: self.counters.published.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            handler_failures: self.counters.handler_failures.load(Ordering::Relaxed),
            pending: self.pending_events(),
            subscribed_types: self.subscriptions.lock().len(),
        }
    }
}

impl Service for EventBus {
    fn owner_id(&self) -> SandboxId {
        self.owner
    }

    fn service_name(&self) -> &'static str {
        "EventBus"
    }

    fn cleanup(&self) -> Result<(), ServiceError> {
        self.clear();
        Ok(())
    }

    fn as_updatable(&self) -> Option<&dyn Updatable> {
        Some(self)
    }
}

impl Updatable for EventBus {
    fn update(&self) -> Result<(), ServiceError> {
        EventBus::update(self);
        Ok(())
    }
}
