//! In-process publish/subscribe with wildcard patterns.
//!
//! Dispatch walks at most three bucket chains per event: the exact
//! type, the `<ns>:*` namespace wildcard, and the global `*`, keeping
//! per-event work proportional to the handler count rather than the
//! total number of registered patterns.

use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use foreman_model::DomainEvent;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::time::Duration;
use tracing::error;

/// Default window for coalescing equal-typed batched emissions.
pub const DEFAULT_BATCH_WINDOW: Duration = Duration::from_millis(50);

/// Bounded history retained for late inspection.
pub const HISTORY_CAP: usize = 100;

/// Metadata stamped onto every emission.
#[derive(Debug, Clone, PartialEq)]
pub struct EventMeta {
    pub timestamp: DateTime<Utc>,
    pub extra: Option<Value>,
}

/// One delivered event.
#[derive(Debug, Clone, PartialEq)]
pub struct BusEvent {
    pub event_type: String,
    pub data: Value,
    pub meta: EventMeta,
}

/// Handle for unsubscribing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&BusEvent) + Send + Sync>;
type Middleware = Arc<dyn Fn(&BusEvent) -> bool + Send + Sync>;

struct Subscription {
    id: u64,
    priority: i32,
    once: bool,
    handler: Handler,
}

#[derive(Default)]
struct BatchState {
    items: Vec<Value>,
}

struct Inner {
    subscriptions: HashMap<String, Vec<Subscription>>,
    middleware: Vec<Middleware>,
    history: VecDeque<BusEvent>,
    paused: bool,
    /// Emissions held back while paused; the bool marks batched ones.
    queue: Vec<(String, Value, Option<Value>, bool)>,
    batches: HashMap<String, BatchState>,
    next_id: u64,
}

/// Cheap-to-clone pub/sub bus. `emit` is synchronous: it returns after
/// every handler has run, so handlers must not block on I/O.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Mutex<Inner>>,
    batch_window: Duration,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("EventBus")
            .field("patterns", &inner.subscriptions.len())
            .field("history_len", &inner.history.len())
            .field("paused", &inner.paused)
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_batch_window(DEFAULT_BATCH_WINDOW)
    }

    pub fn with_batch_window(batch_window: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                subscriptions: HashMap::new(),
                middleware: Vec::new(),
                history: VecDeque::new(),
                paused: false,
                queue: Vec::new(),
                batches: HashMap::new(),
                next_id: 0,
            })),
            batch_window,
        }
    }

    /// Subscribe to an exact type, a `<ns>:*` namespace wildcard, or
    /// the global `*`.
    pub fn on(
        &self,
        pattern: impl Into<String>,
        handler: impl Fn(&BusEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.subscribe(pattern.into(), 0, false, Arc::new(handler))
    }

    /// Higher priority handlers run first within an emission.
    pub fn on_with_priority(
        &self,
        pattern: impl Into<String>,
        priority: i32,
        handler: impl Fn(&BusEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.subscribe(pattern.into(), priority, false, Arc::new(handler))
    }

    /// Single-fire subscription.
    pub fn once(
        &self,
        pattern: impl Into<String>,
        handler: impl Fn(&BusEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.subscribe(pattern.into(), 0, true, Arc::new(handler))
    }

    fn subscribe(
        &self,
        pattern: String,
        priority: i32,
        once: bool,
        handler: Handler,
    ) -> SubscriptionId {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.subscriptions.entry(pattern).or_default().push(
            Subscription {
                id,
                priority,
                once,
                handler,
            },
        );
        SubscriptionId(id)
    }

    pub fn off(&self, id: SubscriptionId) {
        let mut inner = self.inner.lock();
        for subs in inner.subscriptions.values_mut() {
            subs.retain(|s| s.id != id.0);
        }
        inner.subscriptions.retain(|_, subs| !subs.is_empty());
    }

    /// Install a middleware; returning `false` stops propagation of
    /// that event before any handler runs.
    pub fn use_middleware(
        &self,
        middleware: impl Fn(&BusEvent) -> bool + Send + Sync + 'static,
    ) {
        self.inner.lock().middleware.push(Arc::new(middleware));
    }

    /// Emit one event synchronously.
    pub fn emit(
        &self,
        event_type: impl Into<String>,
        data: Value,
        meta_extra: Option<Value>,
    ) {
        let event_type = event_type.into();
        {
            let mut inner = self.inner.lock();
            if inner.paused {
                inner.queue.push((event_type, data, meta_extra, false));
                return;
            }
        }
        self.dispatch(&event_type, data, meta_extra);
    }

    /// Emit a typed domain event.
    pub fn emit_domain(&self, event: &DomainEvent) {
        self.emit(event.event_type(), event.payload(), None);
    }

    /// Coalesce equal-typed events within the batch window into one
    /// emission whose payload is `{batch:true, count, items}`. Must be
    /// called from within a tokio runtime.
    pub fn emit_batched(
        &self,
        event_type: impl Into<String>,
        data: Value,
        meta_extra: Option<Value>,
    ) {
        let event_type = event_type.into();
        let spawn_flush = {
            let mut inner = self.inner.lock();
            if inner.paused {
                inner.queue.push((event_type, data, meta_extra, true));
                return;
            }
            let batch = inner.batches.entry(event_type.clone()).or_default();
            batch.items.push(data);
            batch.items.len() == 1
        };

        if spawn_flush {
            let bus = self.clone();
            let window = self.batch_window;
            tokio::spawn(async move {
                tokio::time::sleep(window).await;
                bus.flush_batch(&event_type, meta_extra);
            });
        }
    }

    fn flush_batch(&self, event_type: &str, meta_extra: Option<Value>) {
        let items = {
            let mut inner = self.inner.lock();
            match inner.batches.remove(event_type) {
                Some(batch) if !batch.items.is_empty() => batch.items,
                _ => return,
            }
        };
        let payload = serde_json::json!({
            "batch": true,
            "count": items.len(),
            "items": items,
        });
        self.dispatch(event_type, payload, meta_extra);
    }

    /// Hold emissions; they queue until [`EventBus::resume`].
    pub fn pause(&self) {
        self.inner.lock().paused = true;
    }

    /// Replay queued emissions in order, batched ones through the
    /// batching path again.
    pub fn resume(&self) {
        let queued = {
            let mut inner = self.inner.lock();
            inner.paused = false;
            std::mem::take(&mut inner.queue)
        };
        for (event_type, data, meta_extra, batched) in queued {
            if batched {
                self.emit_batched(event_type, data, meta_extra);
            } else {
                self.dispatch(&event_type, data, meta_extra);
            }
        }
    }

    /// Recent deliveries, oldest first.
    pub fn history(&self) -> Vec<BusEvent> {
        self.inner.lock().history.iter().cloned().collect()
    }

    fn dispatch(
        &self,
        event_type: &str,
        data: Value,
        meta_extra: Option<Value>,
    ) {
        let event = BusEvent {
            event_type: event_type.to_owned(),
            data,
            meta: EventMeta {
                timestamp: Utc::now(),
                extra: meta_extra,
            },
        };

        let (middleware, mut chain) = {
            let inner = self.inner.lock();
            let middleware = inner.middleware.clone();

            let mut patterns: Vec<String> =
                vec![event_type.to_owned()];
            if let Some((ns, _)) = event_type.split_once(':') {
                patterns.push(format!("{ns}:*"));
            }
            patterns.push("*".to_owned());

            let mut chain: Vec<(u64, i32, bool, Handler)> = Vec::new();
            for pattern in &patterns {
                if let Some(subs) = inner.subscriptions.get(pattern) {
                    chain.extend(subs.iter().map(|s| {
                        (s.id, s.priority, s.once, Arc::clone(&s.handler))
                    }));
                }
            }
            (middleware, chain)
        };

        for mw in &middleware {
            if !(mw.as_ref())(&event) {
                return;
            }
        }

        {
            let mut inner = self.inner.lock();
            if inner.history.len() == HISTORY_CAP {
                inner.history.pop_front();
            }
            inner.history.push_back(event.clone());
        }

        // Higher priority first; stable within equal priorities.
        chain.sort_by_key(|(_, priority, _, _)| std::cmp::Reverse(*priority));

        let mut spent = Vec::new();
        for (id, _, once, handler) in &chain {
            let result = catch_unwind(AssertUnwindSafe(|| {
                (handler.as_ref())(&event)
            }));
            if let Err(panic) = result {
                error!(
                    event_type = %event.event_type,
                    ?panic,
                    "event handler panicked"
                );
            }
            if *once {
                spent.push(*id);
            }
        }

        if !spent.is_empty() {
            let mut inner = self.inner.lock();
            for subs in inner.subscriptions.values_mut() {
                subs.retain(|s| !spent.contains(&s.id));
            }
            inner.subscriptions.retain(|_, subs| !subs.is_empty());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter_handler(
        counter: Arc<AtomicUsize>,
    ) -> impl Fn(&BusEvent) + Send + Sync {
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn exact_namespace_and_global_buckets_all_fire() {
        let bus = EventBus::new();
        let exact = Arc::new(AtomicUsize::new(0));
        let ns = Arc::new(AtomicUsize::new(0));
        let global = Arc::new(AtomicUsize::new(0));

        bus.on("workeffort:created", counter_handler(exact.clone()));
        bus.on("workeffort:*", counter_handler(ns.clone()));
        bus.on("*", counter_handler(global.clone()));

        bus.emit("workeffort:created", serde_json::json!({}), None);
        bus.emit("ticket:created", serde_json::json!({}), None);

        assert_eq!(exact.load(Ordering::SeqCst), 1);
        assert_eq!(ns.load(Ordering::SeqCst), 1);
        assert_eq!(global.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn once_fires_exactly_once() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.once("repo:added", counter_handler(count.clone()));

        bus.emit("repo:added", serde_json::json!({}), None);
        bus.emit("repo:added", serde_json::json!({}), None);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn middleware_false_stops_propagation() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.on("*", counter_handler(count.clone()));
        bus.use_middleware(|event| event.event_type != "repo:removed");

        bus.emit("repo:removed", serde_json::json!({}), None);
        bus.emit("repo:added", serde_json::json!({}), None);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        // Stopped events do not enter history either.
        assert_eq!(bus.history().len(), 1);
    }

    #[test]
    fn priority_orders_handlers() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = order.clone();
        bus.on_with_priority("x:y", 1, move |_| o.lock().push("low"));
        let o = order.clone();
        bus.on_with_priority("x:y", 10, move |_| o.lock().push("high"));

        bus.emit("x:y", serde_json::json!({}), None);
        assert_eq!(*order.lock(), vec!["high", "low"]);
    }

    #[test]
    fn handler_panic_does_not_starve_others() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.on_with_priority("x:y", 10, |_| panic!("boom"));
        bus.on("x:y", counter_handler(count.clone()));

        bus.emit("x:y", serde_json::json!({}), None);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn meta_timestamp_is_stamped() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(None));
        let s = seen.clone();
        bus.on("x:y", move |event| {
            *s.lock() = Some(event.meta.timestamp);
        });
        bus.emit("x:y", serde_json::json!({}), None);
        assert!(seen.lock().is_some());
    }

    #[test]
    fn pause_queues_and_resume_replays_in_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let o = order.clone();
        bus.on("*", move |event| {
            o.lock().push(event.event_type.clone());
        });

        bus.pause();
        bus.emit("a:one", serde_json::json!({}), None);
        bus.emit("b:two", serde_json::json!({}), None);
        assert!(order.lock().is_empty());

        bus.resume();
        assert_eq!(*order.lock(), vec!["a:one", "b:two"]);
    }

    #[test]
    fn history_is_bounded() {
        let bus = EventBus::new();
        for i in 0..(HISTORY_CAP + 10) {
            bus.emit("x:y", serde_json::json!({ "i": i }), None);
        }
        let history = bus.history();
        assert_eq!(history.len(), HISTORY_CAP);
        assert_eq!(history[0].data["i"], 10);
    }

    #[tokio::test(start_paused = true)]
    async fn batched_events_coalesce_within_window() {
        let bus = EventBus::new();
        let payloads = Arc::new(Mutex::new(Vec::new()));
        let p = payloads.clone();
        bus.on("ticket:created", move |event| {
            p.lock().push(event.data.clone());
        });

        for i in 0..3 {
            bus.emit_batched(
                "ticket:created",
                serde_json::json!({ "i": i }),
                None,
            );
        }
        tokio::time::sleep(Duration::from_millis(80)).await;

        let payloads = payloads.lock();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0]["batch"], true);
        assert_eq!(payloads[0]["count"], 3);
        assert_eq!(payloads[0]["items"].as_array().unwrap().len(), 3);
    }
}
