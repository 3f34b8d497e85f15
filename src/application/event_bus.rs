use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::events::{Event, EventType};

/// Handles dispatched events. Implementors are isolated from each other's failures: a handler
/// returning `Err` only calls its own `on_error`, never affects sibling handlers (§4.1).
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &str;

    async fn handle(&self, event: &Event) -> anyhow::Result<()>;

    async fn on_error(&self, event: &Event, error: &anyhow::Error) {
        error!(handler = self.name(), event_type = ?event.event_type, %error, "event handler failed");
    }

    /// Override to filter specific event types; defaults to accepting everything.
    fn can_handle(&self, _event_type: EventType) -> bool {
        true
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EventBusStats {
    pub published: u64,
    pub processed: u64,
    pub errors: u64,
    pub dropped: u64,
    pub queue_size: usize,
    pub subscriber_count: usize,
    pub global_handler_count: usize,
}

struct QueuedEvent {
    seq: u64,
    event: Event,
}

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.event.priority == other.event.priority && self.seq == other.seq
    }
}
impl Eq for QueuedEvent {}

impl Ord for QueuedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first; within a priority, earlier-published (lower seq) first.
        self.event
            .priority
            .cmp(&other.event.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}
impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Priority-ordered pub/sub bus (§4.1). Events are queued (higher priority, then FIFO, drains
/// first), dispatched by a background task to subscribers of their event type plus any global
/// handler, concurrently and with per-handler error isolation.
pub struct EventBus {
    queue: Arc<Mutex<BinaryHeap<QueuedEvent>>>,
    seq_counter: Arc<AtomicU64>,
    subscribers: Arc<RwLock<HashMap<EventType, Vec<Arc<dyn EventHandler>>>>>,
    global_handlers: Arc<RwLock<Vec<Arc<dyn EventHandler>>>>,
    max_queue_size: usize,
    running: Arc<AtomicBool>,
    notify: Arc<Notify>,
    published: Arc<AtomicU64>,
    processed: Arc<AtomicU64>,
    errors: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
    dispatcher: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            seq_counter: Arc::clone(&self.seq_counter),
            subscribers: Arc::clone(&self.subscribers),
            global_handlers: Arc::clone(&self.global_handlers),
            max_queue_size: self.max_queue_size,
            running: Arc::clone(&self.running),
            notify: Arc::clone(&self.notify),
            published: Arc::clone(&self.published),
            processed: Arc::clone(&self.processed),
            errors: Arc::clone(&self.errors),
            dropped: Arc::clone(&self.dropped),
            dispatcher: Arc::clone(&self.dispatcher),
        }
    }
}

impl EventBus {
    pub fn new(max_queue_size: usize) -> Self {
        Self {
            queue: Arc::new(Mutex::new(BinaryHeap::new())),
            seq_counter: Arc::new(AtomicU64::new(0)),
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            global_handlers: Arc::new(RwLock::new(Vec::new())),
            max_queue_size,
            running: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
            published: Arc::new(AtomicU64::new(0)),
            processed: Arc::new(AtomicU64::new(0)),
            errors: Arc::new(AtomicU64::new(0)),
            dropped: Arc::new(AtomicU64::new(0)),
            dispatcher: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn subscribe(&self, event_type: EventType, handler: Arc<dyn EventHandler>) {
        self.subscribers.write().await.entry(event_type).or_default().push(handler);
    }

    pub async fn subscribe_all(&self, handler: Arc<dyn EventHandler>) {
        self.global_handlers.write().await.push(handler);
    }

    /// Queues an event. Returns `false` without queuing if the bus is at `max_queue_size`
    /// (backpressure is drop-on-overflow, §5/§6) — callers must treat that as recoverable.
    pub async fn publish(&self, event: Event) -> bool {
        let mut queue = self.queue.lock().await;
        if queue.len() >= self.max_queue_size {
            self.dropped.fetch_add(1, AtomicOrdering::Relaxed);
            warn!(event_type = ?event.event_type, "event queue full, dropping event");
            return false;
        }
        let seq = self.seq_counter.fetch_add(1, AtomicOrdering::Relaxed);
        let event_type = event.event_type;
        queue.push(QueuedEvent { seq, event });
        drop(queue);
        self.published.fetch_add(1, AtomicOrdering::Relaxed);
        debug!(?event_type, "published event");
        self.notify.notify_one();
        true
    }

    /// Idempotent: calling `start` while already running is a no-op.
    pub async fn start(&self) {
        if self.running.swap(true, AtomicOrdering::SeqCst) {
            warn!("event bus already running");
            return;
        }
        let bus = self.clone();
        let handle = tokio::spawn(async move { bus.dispatch_loop().await });
        *self.dispatcher.lock().await = Some(handle);
        info!("event bus started");
    }

    /// Idempotent: calling `stop` while not running is a no-op. Awaits the in-flight dispatch
    /// loop before returning.
    pub async fn stop(&self) {
        if !self.running.swap(false, AtomicOrdering::SeqCst) {
            return;
        }
        self.notify.notify_one();
        if let Some(handle) = self.dispatcher.lock().await.take() {
            let _ = handle.await;
        }
        info!("event bus stopped");
    }

    async fn dispatch_loop(&self) {
        info!("event dispatcher loop started");
        while self.running.load(AtomicOrdering::SeqCst) {
            let next = self.queue.lock().await.pop();
            let Some(queued) = next else {
                tokio::select! {
                    _ = self.notify.notified() => {}
                    _ = tokio::time::sleep(Duration::from_millis(50)) => {}
                }
                continue;
            };
            self.dispatch_event(queued.event).await;
        }
        info!("event dispatcher loop stopped");
    }

    async fn dispatch_event(&self, event: Event) {
        let mut handlers: Vec<Arc<dyn EventHandler>> = Vec::new();
        if let Some(specific) = self.subscribers.read().await.get(&event.event_type) {
            handlers.extend(specific.iter().cloned());
        }
        handlers.extend(self.global_handlers.read().await.iter().cloned());
        handlers.retain(|h| h.can_handle(event.event_type));

        if handlers.is_empty() {
            debug!(event_type = ?event.event_type, "no handlers for event");
            return;
        }

        let event = Arc::new(event);
        let mut tasks = Vec::with_capacity(handlers.len());
        for handler in handlers {
            let event = Arc::clone(&event);
            let errors = Arc::clone(&self.errors);
            tasks.push(tokio::spawn(async move {
                if let Err(err) = handler.handle(&event).await {
                    errors.fetch_add(1, AtomicOrdering::Relaxed);
                    handler.on_error(&event, &err).await;
                }
            }));
        }
        for task in tasks {
            let _ = task.await;
        }
        self.processed.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub async fn get_stats(&self) -> EventBusStats {
        let queue_size = self.queue.lock().await.len();
        let subscriber_count: usize = self.subscribers.read().await.values().map(Vec::len).sum();
        let global_handler_count = self.global_handlers.read().await.len();
        EventBusStats {
            published: self.published.load(AtomicOrdering::Relaxed),
            processed: self.processed.load(AtomicOrdering::Relaxed),
            errors: self.errors.load(AtomicOrdering::Relaxed),
            dropped: self.dropped.load(AtomicOrdering::Relaxed),
            queue_size,
            subscriber_count,
            global_handler_count,
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.values().map(Vec::len).sum()
    }

    /// Polls until the queue drains or `timeout` elapses. `None` waits indefinitely.
    pub async fn wait_empty(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|d| tokio::time::Instant::now() + d);
        loop {
            if self.queue.lock().await.is_empty() {
                return true;
            }
            if let Some(deadline) = deadline {
                if tokio::time::Instant::now() >= deadline {
                    return false;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::EventPayload;
    use std::sync::atomic::{AtomicUsize, Ordering as Ord2};

    struct CountingHandler {
        name: String,
        count: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl EventHandler for CountingHandler {
        fn name(&self) -> &str {
            &self.name
        }

        async fn handle(&self, _event: &Event) -> anyhow::Result<()> {
            self.count.fetch_add(1, Ord2::SeqCst);
            if self.fail {
                anyhow::bail!("boom");
            }
            Ok(())
        }
    }

    fn system_start(priority: u8) -> Event {
        Event::new(
            priority,
            EventType::SystemStart,
            EventPayload::SystemStart { reason: "test".into() },
            "test",
        )
    }

    #[tokio::test]
    async fn higher_priority_dispatches_before_lower() {
        let bus = EventBus::new(100);
        let order: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));

        struct OrderRecorder {
            order: Arc<Mutex<Vec<u8>>>,
        }
        #[async_trait]
        impl EventHandler for OrderRecorder {
            fn name(&self) -> &str {
                "recorder"
            }
            async fn handle(&self, event: &Event) -> anyhow::Result<()> {
                self.order.lock().await.push(event.priority);
                Ok(())
            }
        }
        bus.subscribe_all(Arc::new(OrderRecorder { order: Arc::clone(&order) })).await;

        bus.publish(system_start(3)).await;
        bus.publish(system_start(9)).await;
        bus.publish(system_start(5)).await;

        bus.start().await;
        bus.wait_empty(Some(Duration::from_secs(2))).await;
        bus.stop().await;

        assert_eq!(*order.lock().await, vec![9, 5, 3]);
    }

    #[tokio::test]
    async fn handler_failure_is_isolated_and_counted() {
        let bus = EventBus::new(100);
        let good_count = Arc::new(AtomicUsize::new(0));
        bus.subscribe_all(Arc::new(CountingHandler {
            name: "good".into(),
            count: Arc::clone(&good_count),
            fail: false,
        }))
        .await;
        bus.subscribe_all(Arc::new(CountingHandler {
            name: "bad".into(),
            count: Arc::new(AtomicUsize::new(0)),
            fail: true,
        }))
        .await;

        bus.start().await;
        bus.publish(system_start(5)).await;
        bus.wait_empty(Some(Duration::from_secs(2))).await;
        bus.stop().await;

        assert_eq!(good_count.load(Ord2::SeqCst), 1);
        assert_eq!(bus.get_stats().await.errors, 1);
    }

    #[tokio::test]
    async fn publish_drops_when_queue_is_full() {
        let bus = EventBus::new(1);
        assert!(bus.publish(system_start(1)).await);
        assert!(!bus.publish(system_start(1)).await);
        assert_eq!(bus.get_stats().await.dropped, 1);
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent() {
        let bus = EventBus::new(10);
        bus.start().await;
        bus.start().await;
        bus.stop().await;
        bus.stop().await;
    }
}
