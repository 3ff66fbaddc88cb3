use super::*;
use crate::clock::ManualClock;
use crate::log::{Level, MemorySink};
use parking_lot::Mutex;
use serde_json::{json, Value};

struct Harness {
    bus: EventBus,
    sink: Arc<MemorySink>,
    clock: Arc<ManualClock>,
}

fn harness(config: EventBusConfig) -> Harness {
    let sink = Arc::new(MemorySink::new());
    let clock = Arc::new(ManualClock::new());
    let bus = EventBus::builder()
        .config(config)
        .log_sink(sink.clone())
        .clock(clock.clone())
        .build()
        .unwrap();
    Harness { bus, sink, clock }
}

fn recorder<T: Payload>(log: &Arc<Mutex<Vec<T>>>) -> impl Fn(&T) + Send + Sync + 'static {
    let log = log.clone();
    move |payload: &T| log.lock().push(payload.clone())
}

#[derive(Debug, Clone, PartialEq)]
struct OrderPlaced {
    order_id: u64,
}

impl Event for OrderPlaced {
    fn event_type() -> &'static str {
        "OrderPlaced"
    }
}

#[test]
fn test_priority_ordering() {
    let h = harness(EventBusConfig::no_cache());
    let order = Arc::new(Mutex::new(Vec::new()));

    for priority in [3, 1, 2] {
        let order = order.clone();
        h.bus
            .subscribe_with_priority("job", priority, move |_: &()| order.lock().push(priority))
            .unwrap();
    }

    let report = h.bus.publish("job", ()).unwrap();
    assert_eq!(report.delivered, 3);
    assert_eq!(*order.lock(), vec![3, 2, 1]);
}

#[test]
fn test_equal_priorities_keep_registration_order() {
    let h = harness(EventBusConfig::no_cache());
    let order = Arc::new(Mutex::new(Vec::new()));

    for label in ["a", "b", "c"] {
        let order = order.clone();
        h.bus
            .subscribe("job", move |_: &()| order.lock().push(label))
            .unwrap();
    }
    let order_high = order.clone();
    h.bus
        .subscribe_with_priority("job", 10, move |_: &()| order_high.lock().push("high"))
        .unwrap();

    h.bus.publish("job", ()).unwrap();
    assert_eq!(*order.lock(), vec!["high", "a", "b", "c"]);
}

#[test]
fn test_replay_within_ttl() {
    let h = harness(EventBusConfig::new().cache_ttl(Duration::from_millis(1000)));
    h.bus.publish("x", String::from("P")).unwrap();

    h.clock.advance(Duration::from_millis(500));
    let early = Arc::new(Mutex::new(Vec::<String>::new()));
    h.bus.subscribe("x", recorder(&early)).unwrap();
    assert_eq!(*early.lock(), vec!["P".to_string()]);

    h.clock.advance(Duration::from_millis(1000));
    let late = Arc::new(Mutex::new(Vec::<String>::new()));
    h.bus.subscribe("x", recorder(&late)).unwrap();
    assert!(late.lock().is_empty());
    assert_eq!(h.bus.stats().cached_events, 0);
}

#[test]
fn test_cache_overwrite() {
    let h = harness(EventBusConfig::test());
    h.bus.publish("config", 1u32).unwrap();
    h.bus.publish("config", 2u32).unwrap();

    let seen = Arc::new(Mutex::new(Vec::<u32>::new()));
    h.bus.subscribe("config", recorder(&seen)).unwrap();
    assert_eq!(*seen.lock(), vec![2]);
    assert_eq!(h.bus.last_payload::<u32>("config"), Some(2));
}

#[test]
fn test_replay_happens_once_per_subscribe() {
    let h = harness(EventBusConfig::test());
    h.bus.publish("x", 7u8).unwrap();

    let seen = Arc::new(Mutex::new(Vec::<u8>::new()));
    h.bus.subscribe("x", recorder(&seen)).unwrap();
    h.bus.publish("x", 8u8).unwrap();
    assert_eq!(*seen.lock(), vec![7, 8]);
}

#[test]
fn test_middleware_composition() {
    let h = harness(EventBusConfig::no_cache());

    for key in ["m1", "m2"] {
        h.bus
            .register_global_typed_middleware(move |_: &str, mut value: Value| {
                let position = value.as_object().map(|o| o.len()).unwrap_or(0);
                value[key] = json!(position);
                Ok(value)
            })
            .unwrap();
    }
    h.bus
        .register_event_middleware("profile", |_: &str, mut value: Value| {
            let position = value.as_object().map(|o| o.len()).unwrap_or(0);
            value["m3"] = json!(position);
            Ok(value)
        })
        .unwrap();

    let seen = Arc::new(Mutex::new(Vec::<Value>::new()));
    h.bus.subscribe("profile", recorder(&seen)).unwrap();
    h.bus.publish("profile", json!({})).unwrap();

    assert_eq!(seen.lock()[0], json!({"m1": 0, "m2": 1, "m3": 2}));
}

#[test]
fn test_cache_stores_transformed_payload() {
    let h = harness(EventBusConfig::test());
    h.bus
        .register_event_middleware("count", |_: &str, n: u32| Ok(n * 10))
        .unwrap();
    h.bus.publish("count", 4u32).unwrap();

    assert_eq!(h.bus.last_payload::<u32>("count"), Some(40));
}

#[test]
fn test_failing_middleware_aborts_publish() {
    let h = harness(EventBusConfig::test());
    let seen = Arc::new(Mutex::new(Vec::<i64>::new()));
    h.bus.subscribe("save", recorder(&seen)).unwrap();
    h.bus
        .register_event_middleware("save", |_: &str, n: i64| {
            if n < 0 {
                Err(Error::handler("negative"))
            } else {
                Ok(n)
            }
        })
        .unwrap();

    let report = h.bus.publish("save", -1i64).unwrap();
    assert!(report.aborted);
    assert!(!report.cached);
    assert!(seen.lock().is_empty());
    assert_eq!(h.bus.last_payload::<i64>("save"), None);

    let errors = h.sink.at_level(Level::Error);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "Error emitting event \"save\"");
    assert!(matches!(errors[0].error, Some(Error::MiddlewareFailure { .. })));

    assert!(h.bus.publish("save", 5i64).unwrap().is_clean());
    assert_eq!(*seen.lock(), vec![5]);
    assert_eq!(h.bus.stats().publishes_aborted, 1);
}

#[test]
fn test_middleware_cannot_change_payload_type() {
    let h = harness(EventBusConfig::no_cache());
    h.bus
        .register_event_middleware_with(
            "n",
            |event: &str, _: EventEnvelope| -> Result<EventEnvelope> {
                Ok(EventEnvelope::new(event, String::from("not a number")))
            },
        )
        .unwrap();

    let seen = Arc::new(Mutex::new(Vec::<u32>::new()));
    h.bus.subscribe("n", recorder(&seen)).unwrap();

    let report = h.bus.publish("n", 1u32).unwrap();
    assert!(report.aborted);
    assert!(seen.lock().is_empty());
}

#[test]
fn test_late_middleware_applies_to_next_publish_only() {
    let h = harness(EventBusConfig::test());
    h.bus.publish("n", 1u32).unwrap();
    h.bus
        .register_event_middleware("n", |_: &str, n: u32| Ok(n + 100))
        .unwrap();

    assert_eq!(h.bus.last_payload::<u32>("n"), Some(1));
    h.bus.publish("n", 2u32).unwrap();
    assert_eq!(h.bus.last_payload::<u32>("n"), Some(102));
}

#[test]
fn test_failure_isolation() {
    let h = harness(EventBusConfig::no_cache());
    let seen = Arc::new(Mutex::new(Vec::<u32>::new()));

    h.bus.subscribe("tick", recorder(&seen)).unwrap();
    h.bus
        .subscribe("tick", |_: &u32| panic!("subscriber failed"))
        .unwrap();
    h.bus.subscribe("tick", recorder(&seen)).unwrap();

    let report = h.bus.publish("tick", 9u32).unwrap();
    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(*seen.lock(), vec![9, 9]);

    let errors = h.sink.at_level(Level::Error);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "Error in callback for event \"tick\"");

    h.bus.publish("tick", 10u32).unwrap();
    assert_eq!(h.sink.error_count(), 2);
}

#[test]
fn test_failing_replay_keeps_subscription() {
    let h = harness(EventBusConfig::test());
    h.bus.publish("x", 1u8).unwrap();

    let handle = h
        .bus
        .subscribe("x", |_: &u8| panic!("cannot handle replay"))
        .unwrap();
    assert!(handle.is_active());
    assert_eq!(h.sink.error_count(), 1);
    assert_eq!(h.bus.stats().dispatcher_stats.replays, 1);
}

#[test]
fn test_unsubscribe_idempotence() {
    let h = harness(EventBusConfig::no_cache());
    let seen = Arc::new(Mutex::new(Vec::<u32>::new()));
    let handle = h.bus.subscribe("tick", recorder(&seen)).unwrap();
    let other = h.bus.subscribe("tick", |_: &u32| {}).unwrap();

    assert!(handle.unsubscribe());
    assert!(!handle.unsubscribe());
    assert!(!h.bus.unsubscribe(&handle));
    assert_eq!(h.bus.subscriber_count("tick"), 1);
    assert!(other.is_active());

    h.bus.publish("tick", 1u32).unwrap();
    assert!(seen.lock().is_empty());
}

#[test]
fn test_unsubscribe_handler_by_identity() {
    struct Counter(Mutex<u32>);

    impl TypedHandler<u32> for Counter {
        fn handle_typed(&self, payload: &u32) -> Result<()> {
            *self.0.lock() += payload;
            Ok(())
        }
    }

    let h = harness(EventBusConfig::no_cache());
    let counter = Arc::new(Counter(Mutex::new(0)));
    h.bus.subscribe_handler::<u32, _>("add", 0, counter.clone()).unwrap();
    h.bus.subscribe_handler::<u32, _>("add", 5, counter.clone()).unwrap();
    h.bus.subscribe("add", |_: &u32| {}).unwrap();

    h.bus.publish("add", 2u32).unwrap();
    assert_eq!(*counter.0.lock(), 4);

    assert_eq!(h.bus.unsubscribe_handler("add", &counter), 2);
    assert_eq!(h.bus.unsubscribe_handler("add", &counter), 0);
    assert_eq!(h.bus.unsubscribe_handler("missing", &counter), 0);
    assert_eq!(h.bus.subscriber_count("add"), 1);
}

#[test]
fn test_cache_disable_clears_state() {
    let h = harness(EventBusConfig::test());
    h.bus.publish("x", 1u32).unwrap();
    h.bus.disable_cache();

    let seen = Arc::new(Mutex::new(Vec::<u32>::new()));
    h.bus.subscribe("x", recorder(&seen)).unwrap();
    assert!(seen.lock().is_empty());

    let warnings = h.sink.at_level(Level::Warn);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].message.contains("discarded 1 entries"));

    // re-enabling starts from an empty cache
    h.bus.enable_cache();
    assert!(h.bus.is_cache_enabled());
    assert_eq!(h.bus.last_payload::<u32>("x"), None);
    assert!(h.bus.publish("x", 2u32).unwrap().cached);
}

#[test]
fn test_invalid_event_name() {
    let h = harness(EventBusConfig::new());

    let err = h.bus.subscribe("", |_: &u32| {}).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    assert_eq!(err.to_string(), "Invalid argument: Invalid event name: \"\"");
    assert_eq!(h.bus.stats().total_subscriptions, 0);

    assert!(matches!(
        h.bus.publish("", 1u32),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        h.bus.register_event_middleware("", |_: &str, n: u32| Ok(n)),
        Err(Error::InvalidArgument(_))
    ));
    assert_eq!(h.sink.error_count(), 3);
    assert_eq!(h.bus.stats().events_published, 0);
}

#[test]
fn test_payload_type_is_bound_per_event() {
    let h = harness(EventBusConfig::new());
    h.bus.subscribe("reading", |_: &f64| {}).unwrap();

    let err = h.bus.publish("reading", 3u32).unwrap_err();
    assert!(matches!(err, Error::PayloadTypeMismatch { .. }));
    assert!(err.is_contract_violation());

    let err = h.bus.subscribe("reading", |_: &String| {}).unwrap_err();
    assert!(matches!(err, Error::PayloadTypeMismatch { .. }));
    assert_eq!(h.bus.subscriber_count("reading"), 1);
    assert_eq!(h.bus.payload_type("reading"), Some(PayloadType::of::<f64>()));
}

#[test]
fn test_subscribe_during_dispatch_waits_for_next_publish() {
    let h = harness(EventBusConfig::no_cache());
    let seen = Arc::new(Mutex::new(Vec::<u32>::new()));

    let bus = h.bus.clone();
    let nested_seen = seen.clone();
    h.bus
        .subscribe("spawn", move |n: &u32| {
            if *n == 1 {
                bus.subscribe("spawn", recorder(&nested_seen)).unwrap();
            }
        })
        .unwrap();

    let report = h.bus.publish("spawn", 1u32).unwrap();
    assert_eq!(report.delivered, 1);
    assert!(seen.lock().is_empty());

    h.bus.publish("spawn", 2u32).unwrap();
    assert_eq!(*seen.lock(), vec![2]);
}

#[test]
fn test_unsubscribe_during_dispatch_does_not_skip_current() {
    let h = harness(EventBusConfig::no_cache());
    let seen = Arc::new(Mutex::new(Vec::<u8>::new()));

    let victim = h.bus.subscribe_with_priority("e", 0, recorder(&seen)).unwrap();
    h.bus
        .subscribe_with_priority("e", 1, move |_: &u8| {
            victim.unsubscribe();
        })
        .unwrap();

    h.bus.publish("e", 1u8).unwrap();
    h.bus.publish("e", 2u8).unwrap();
    assert_eq!(*seen.lock(), vec![1]);
}

#[test]
fn test_typed_events() {
    let h = harness(EventBusConfig::test());
    let seen = Arc::new(Mutex::new(Vec::<OrderPlaced>::new()));
    h.bus.subscribe_event(recorder(&seen)).unwrap();

    let report = h.bus.publish_event(OrderPlaced { order_id: 42 }).unwrap();
    assert!(report.is_clean());
    assert_eq!(*seen.lock(), vec![OrderPlaced { order_id: 42 }]);
    assert_eq!(h.bus.subscriber_count("OrderPlaced"), 1);
}

#[test]
fn test_publish_with_metadata() {
    let h = harness(EventBusConfig::no_cache());
    let source = Arc::new(Mutex::new(None));
    let captured = source.clone();
    h.bus
        .register_event_middleware_with(
            "audit",
            move |_: &str, envelope: EventEnvelope| -> Result<EventEnvelope> {
                *captured.lock() = envelope.metadata.source.clone();
                Ok(envelope)
            },
        )
        .unwrap();

    let metadata = EventMetadata::new().set_source("billing");
    let event_id = metadata.event_id;
    let report = h
        .bus
        .publish_with_metadata("audit", (), metadata)
        .unwrap();

    assert_eq!(report.event_id, event_id);
    assert_eq!(source.lock().as_deref(), Some("billing"));
}

#[test]
fn test_stats() {
    let h = harness(EventBusConfig::test());
    h.bus.subscribe("a", |_: &u8| {}).unwrap();
    h.bus.subscribe("b", |_: &u8| {}).unwrap();
    h.bus.subscribe("b", |_: &u8| panic!("boom")).unwrap();
    h.bus.publish("b", 1u8).unwrap();

    let stats = h.bus.stats();
    assert_eq!(stats.total_subscriptions, 3);
    assert_eq!(stats.events, 2);
    assert_eq!(stats.cached_events, 1);
    assert_eq!(stats.events_published, 1);
    assert_eq!(stats.dispatcher_stats.delivery_failures, 1);
    assert!(stats.to_string().starts_with("EventBus Stats: 3 subscriptions"));
}

#[tokio::test]
async fn test_publish_async() {
    let h = harness(EventBusConfig::no_cache());
    let seen = Arc::new(Mutex::new(Vec::<u64>::new()));
    h.bus.subscribe("remote", recorder(&seen)).unwrap();

    let report = h.bus.publish_async("remote", 5u64).await.unwrap();
    assert_eq!(report.delivered, 1);
    assert_eq!(*seen.lock(), vec![5]);

    assert!(matches!(
        h.bus.publish_async("", 5u64).await,
        Err(Error::InvalidArgument(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_publishers() {
    let h = harness(EventBusConfig::no_cache());
    let total = Arc::new(Mutex::new(0u64));
    let sum = total.clone();
    h.bus
        .subscribe("add", move |n: &u64| *sum.lock() += n)
        .unwrap();

    let tasks: Vec<_> = (1..=10u64)
        .map(|n| {
            let bus = h.bus.clone();
            tokio::spawn(async move { bus.publish_async("add", n).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(*total.lock(), 55);
}

/// Registry that runs a one-shot hook inside `snapshot`, between the
/// publisher's cache write and its subscriber snapshot.
struct SnapshotHookRegistry {
    inner: crate::registry::DashMapRegistry,
    hook: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl fmt::Debug for SnapshotHookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotHookRegistry")
            .field("inner", &self.inner)
            .finish()
    }
}

impl EventRegistry for SnapshotHookRegistry {
    fn bind(&self, event: &str, payload_type: PayloadType) -> Result<()> {
        self.inner.bind(event, payload_type)
    }

    fn binding(&self, event: &str) -> Option<PayloadType> {
        self.inner.binding(event)
    }

    fn register(&self, event: &str, entry: SubscriberEntry) -> Result<()> {
        self.inner.register(event, entry)
    }

    fn unregister(&self, subscription_id: Uuid) -> bool {
        self.inner.unregister(subscription_id)
    }

    fn unregister_key(&self, event: &str, key: HandlerKey) -> usize {
        self.inner.unregister_key(event, key)
    }

    fn snapshot(&self, event: &str) -> Vec<SubscriberEntry> {
        let hook = self.hook.lock().take();
        if let Some(hook) = hook {
            hook();
        }
        self.inner.snapshot(event)
    }

    fn contains(&self, subscription_id: Uuid) -> bool {
        self.inner.contains(subscription_id)
    }

    fn subscription_count(&self, event: &str) -> usize {
        self.inner.subscription_count(event)
    }

    fn total_subscriptions(&self) -> usize {
        self.inner.total_subscriptions()
    }

    fn event_names(&self) -> Vec<String> {
        self.inner.event_names()
    }

    fn clear(&self) {
        self.inner.clear()
    }
}

#[test]
fn test_concurrent_subscribe_gets_payload_once() {
    let registry = Arc::new(SnapshotHookRegistry {
        inner: crate::registry::DashMapRegistry::new(),
        hook: Mutex::new(None),
    });
    let bus = EventBus::builder()
        .config(EventBusConfig::test())
        .registry(registry.clone())
        .log_sink(Arc::new(MemorySink::new()))
        .build()
        .unwrap();

    let seen = Arc::new(Mutex::new(Vec::<u32>::new()));
    let worker = Arc::new(Mutex::new(None));

    let late_bus = bus.clone();
    let late_seen = seen.clone();
    let worker_slot = worker.clone();
    *registry.hook.lock() = Some(Box::new(move || {
        let (tx, rx) = std::sync::mpsc::channel();
        let thread = std::thread::spawn(move || {
            late_bus.subscribe("x", recorder(&late_seen)).unwrap();
            let _ = tx.send(());
        });
        // the subscribe must not complete while the publish is mid-flight
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        *worker_slot.lock() = Some(thread);
    }));

    let report = bus.publish("x", 7u32).unwrap();
    assert_eq!(report.delivered, 0);

    let thread = worker.lock().take().unwrap();
    thread.join().unwrap();
    assert_eq!(*seen.lock(), vec![7]);
    assert_eq!(bus.subscriber_count("x"), 1);
}

#[test]
fn test_zero_ttl_uses_default() {
    let h = harness(EventBusConfig::new().cache_ttl(Duration::ZERO));
    assert_eq!(h.bus.cache_ttl(), config::DEFAULT_CACHE_TTL);

    h.bus.publish("x", 1u32).unwrap();
    h.clock.advance(Duration::from_millis(30_000));
    assert_eq!(h.bus.last_payload::<u32>("x"), Some(1));
}
