//! The Rivulet execution engine
//!
//! Owns the stream registry (schema + junction per stream), the standing
//! query pipelines, triggers, and output dispatchers, and runs the
//! lifecycle: `send` validates and publishes, `start` arms triggers and
//! the periodic sweeper, `stop` drains queued work before releasing
//! resources.

use crate::aggregation::Projector;
use crate::clock::{Clock, SystemClock};
use crate::event::{SharedEvent, StreamEvent};
use crate::junction::{StreamJunction, Subscriber};
use crate::output::OutputDispatcher;
use crate::partition::PartitionRouter;
use crate::trigger::{EventTrigger, IntervalTrigger};
use rivulet_core::{
    DispatchMode, EngineError, QueryPlan, StreamDefinition, StreamSchema, TriggerDefinition, Value,
};
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const DEFAULT_ASYNC_QUEUE: usize = 1024;
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(100);

struct StreamEntry {
    schema: Arc<StreamSchema>,
    junction: Arc<StreamJunction>,
}

/// One standing query: partition router feeding an output dispatcher.
/// The mutex serializes junction delivery and sweeper access, which is
/// what makes per-partition processing strictly serial.
struct QueryPipeline {
    name: String,
    router: PartitionRouter,
    dispatcher: Arc<OutputDispatcher>,
    clock: Arc<dyn Clock>,
}

impl QueryPipeline {
    fn process(&mut self, event: &SharedEvent) {
        let now = self.clock.now();
        match self.router.route(Arc::clone(event), now) {
            Ok(outputs) => self.dispatcher.deliver(&outputs),
            Err(e) => {
                // per-event failure: report and move on, nothing shared
                // was touched
                warn!(query = %self.name, error = %e, "event dropped");
            }
        }
    }

    fn sweep(&mut self) {
        let now = self.clock.now();
        let outputs = self.router.sweep(now);
        self.dispatcher.deliver(&outputs);
    }
}

struct QueryHandle {
    inner: Mutex<QueryPipeline>,
}

impl QueryHandle {
    fn sweep(&self) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sweep();
    }
}

impl Subscriber for QueryHandle {
    fn on_event(&self, event: &SharedEvent) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .process(event);
    }
}

type QueryList = Arc<RwLock<Vec<Arc<QueryHandle>>>>;

/// The engine: single-process, in-memory continuous-query runtime.
pub struct Engine {
    clock: Arc<dyn Clock>,
    streams: FxHashMap<String, StreamEntry>,
    /// Shared with the sweeper task, so queries added while the engine is
    /// running are swept too.
    queries: QueryList,
    dispatchers: FxHashMap<String, Arc<OutputDispatcher>>,
    triggers: Vec<Arc<dyn EventTrigger>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    sweep_interval: Duration,
    running: AtomicBool,
}

impl Engine {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Build an engine on a supplied clock (deterministic in tests).
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            streams: FxHashMap::default(),
            queries: Arc::new(RwLock::new(Vec::new())),
            dispatchers: FxHashMap::default(),
            triggers: Vec::new(),
            sweeper: Mutex::new(None),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            running: AtomicBool::new(false),
        }
    }

    /// Cadence of the background eviction pass over time-based windows.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Register a stream: fixes its schema for life and creates its
    /// junction (async junctions need a tokio runtime).
    pub fn define_stream(&mut self, def: StreamDefinition) -> Result<(), EngineError> {
        if self.streams.contains_key(&def.name) {
            return Err(EngineError::DuplicateStream(def.name));
        }
        let junction = match def.dispatch {
            DispatchMode::Sync => StreamJunction::new_sync(&def.name),
            DispatchMode::Async => StreamJunction::new_async(&def.name, DEFAULT_ASYNC_QUEUE),
        };
        let schema = Arc::new(StreamSchema::new(def.name.clone(), def.attributes));
        info!(stream = %def.name, arity = schema.arity(), "stream defined");
        self.streams.insert(
            def.name,
            StreamEntry {
                schema,
                junction: Arc::new(junction),
            },
        );
        Ok(())
    }

    /// Compile a query plan against its input stream and subscribe the
    /// resulting pipeline. Any construction error here prevents the query
    /// from ever starting.
    pub fn add_query(&mut self, plan: QueryPlan) -> Result<(), EngineError> {
        let (schema, junction) = {
            let entry = self
                .streams
                .get(&plan.input_stream)
                .ok_or_else(|| EngineError::UnknownStream(plan.input_stream.clone()))?;
            (Arc::clone(&entry.schema), Arc::clone(&entry.junction))
        };

        plan.window.validate()?;

        let key_attrs = match &plan.partition_by {
            Some(names) => names
                .iter()
                .map(|name| {
                    schema.attribute_index(name).ok_or_else(|| {
                        EngineError::UnknownAttribute {
                            stream: schema.name.clone(),
                            attribute: name.clone(),
                        }
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        let projector = Arc::new(Projector::compile(&plan.select, &schema)?);
        let router = PartitionRouter::new(
            plan.input_stream.clone(),
            key_attrs,
            plan.window.clone(),
            projector,
        )?;
        let dispatcher = self.dispatcher_for(&plan.output_stream);

        let handle = Arc::new(QueryHandle {
            inner: Mutex::new(QueryPipeline {
                name: plan.name.clone(),
                router,
                dispatcher,
                clock: Arc::clone(&self.clock),
            }),
        });
        junction.subscribe(handle.clone());
        self.queries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
        info!(query = %plan.name, input = %plan.input_stream, output = %plan.output_stream, "query added");
        Ok(())
    }

    /// Register a periodic trigger feeding its target stream. Fails if
    /// the target is unknown; the failure is isolated to this trigger.
    pub fn add_trigger(&mut self, def: TriggerDefinition) -> Result<(), EngineError> {
        let entry = self.streams.get(&def.target_stream).ok_or_else(|| {
            EngineError::scheduling(
                &def.name,
                format!("unknown target stream '{}'", def.target_stream),
            )
        })?;
        let trigger = IntervalTrigger::new(
            def.name,
            def.interval,
            Arc::clone(&entry.junction),
            Arc::clone(&self.clock),
        )?;
        let trigger: Arc<dyn EventTrigger> = Arc::new(trigger);
        if self.running.load(Ordering::SeqCst) {
            trigger.start();
        }
        self.triggers.push(trigger);
        Ok(())
    }

    /// Register a consumer for an output stream's batches.
    pub fn register_callback(
        &mut self,
        stream: &str,
        callback: impl Fn(&[StreamEvent]) + Send + Sync + 'static,
    ) {
        self.dispatcher_for(stream).register(Box::new(callback));
    }

    /// Validate a field tuple against the stream schema, stamp the clock
    /// time, and publish. Per-event errors are returned to the caller and
    /// never disturb other events or partitions.
    pub async fn send(&self, stream: &str, fields: Vec<Value>) -> Result<(), EngineError> {
        let entry = self
            .streams
            .get(stream)
            .ok_or_else(|| EngineError::UnknownStream(stream.to_string()))?;
        entry.schema.validate(&fields)?;
        let event = StreamEvent::new(self.clock.now(), fields);
        entry.junction.publish(Arc::new(event)).await;
        Ok(())
    }

    /// One eviction/flush pass over every query's time-based windows.
    /// The background sweeper calls this; tests with a manual clock can
    /// call it directly for deterministic expiry.
    pub fn sweep(&self) {
        sweep_all(&self.queries);
    }

    /// Arm triggers and the background sweeper. Idempotent.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        for trigger in &self.triggers {
            trigger.start();
        }
        let queries = Arc::clone(&self.queries);
        let interval = self.sweep_interval;
        let sweeper = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                sweep_all(&queries);
            }
        });
        *self.sweeper.lock().unwrap_or_else(PoisonError::into_inner) = Some(sweeper);
        let query_count = self
            .queries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        info!(queries = query_count, triggers = self.triggers.len(), "engine started");
    }

    /// Drain-then-stop: halt triggers and the sweeper, then drain every
    /// async junction queue to completion. In-flight admissions already
    /// queued still run; nothing is dropped mid-flight. Idempotent.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        for trigger in &self.triggers {
            trigger.stop();
        }
        let sweeper = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }
        for entry in self.streams.values() {
            entry.junction.stop().await;
        }
        info!("engine stopped");
    }

    fn dispatcher_for(&mut self, stream: &str) -> Arc<OutputDispatcher> {
        Arc::clone(
            self.dispatchers
                .entry(stream.to_string())
                .or_insert_with(|| Arc::new(OutputDispatcher::new(stream))),
        )
    }
}

/// Snapshot the list, sweep outside the lock; a sweep that overlaps an
/// `add_query` must never hold the list lock while pipelines run.
fn sweep_all(queries: &QueryList) {
    let snapshot: Vec<Arc<QueryHandle>> = queries
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .map(Arc::clone)
        .collect();
    for query in snapshot {
        query.sweep();
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rivulet_core::{
        Attribute, AttributeType, OutputField, ProjectionExpr, WindowSpec,
    };

    fn quotes_stream() -> StreamDefinition {
        StreamDefinition::new(
            "Quotes",
            vec![
                Attribute::new("symbol", AttributeType::Str),
                Attribute::new("price", AttributeType::Float),
            ],
        )
    }

    fn sum_query(window: WindowSpec) -> QueryPlan {
        QueryPlan {
            name: "totals".into(),
            input_stream: "Quotes".into(),
            partition_by: Some(vec!["symbol".into()]),
            window,
            select: vec![
                OutputField::new("symbol", ProjectionExpr::Attribute("symbol".into())),
                OutputField::new("total", ProjectionExpr::Sum("price".into())),
            ],
            output_stream: "Totals".into(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_stream_rejected() {
        let mut engine = Engine::new();
        engine.define_stream(quotes_stream()).unwrap();
        let err = engine.define_stream(quotes_stream()).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateStream(_)));
    }

    #[tokio::test]
    async fn test_query_on_unknown_stream_rejected() {
        let mut engine = Engine::new();
        let err = engine
            .add_query(sum_query(WindowSpec::SlidingLength(2)))
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownStream(_)));
    }

    #[tokio::test]
    async fn test_bad_window_parameters_fatal_at_build() {
        let mut engine = Engine::new();
        engine.define_stream(quotes_stream()).unwrap();
        let err = engine
            .add_query(sum_query(WindowSpec::SlidingLength(0)))
            .unwrap_err();
        assert!(matches!(err, EngineError::WindowPolicy(_)));
    }

    #[tokio::test]
    async fn test_unknown_partition_attribute_fatal_at_build() {
        let mut engine = Engine::new();
        engine.define_stream(quotes_stream()).unwrap();
        let mut plan = sum_query(WindowSpec::SlidingLength(2));
        plan.partition_by = Some(vec!["missing".into()]);
        let err = engine.add_query(plan).unwrap_err();
        assert!(matches!(err, EngineError::UnknownAttribute { .. }));
    }

    #[tokio::test]
    async fn test_send_validates_schema() {
        let mut engine = Engine::new();
        engine.define_stream(quotes_stream()).unwrap();

        let err = engine
            .send("Quotes", vec![Value::from("IBM")])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::SchemaMismatch { .. }));

        let err = engine
            .send("Quotes", vec![Value::from("IBM"), Value::from(70.0f64)])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::SchemaMismatch { .. }));

        let err = engine.send("Missing", vec![]).await.unwrap_err();
        assert!(matches!(err, EngineError::UnknownStream(_)));
    }

    #[tokio::test]
    async fn test_end_to_end_delivery() {
        let mut engine = Engine::new();
        engine.define_stream(quotes_stream()).unwrap();
        engine.add_query(sum_query(WindowSpec::SlidingLength(2))).unwrap();

        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        engine.register_callback("Totals", move |events| {
            sink.lock().unwrap().extend(events.to_vec());
        });

        engine
            .send("Quotes", vec![Value::from("IBM"), Value::from(70.0f32)])
            .await
            .unwrap();
        engine
            .send("Quotes", vec![Value::from("IBM"), Value::from(100.0f32)])
            .await
            .unwrap();

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 2);
        assert_eq!(received[1].fields[1], Value::Double(170.0));
    }

    #[tokio::test]
    async fn test_trigger_requires_known_target() {
        let mut engine = Engine::new();
        let err = engine
            .add_trigger(TriggerDefinition {
                name: "tick".into(),
                target_stream: "Missing".into(),
                interval: Duration::from_millis(100),
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::Scheduling { .. }));
    }

    #[tokio::test]
    async fn test_lifecycle_is_idempotent() {
        let mut engine = Engine::new();
        engine.define_stream(quotes_stream()).unwrap();
        engine.start();
        engine.start();
        engine.stop().await;
        engine.stop().await;
    }
}
