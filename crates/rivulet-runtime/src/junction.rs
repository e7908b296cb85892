//! Stream junctions: the fan-out point for one named stream
//!
//! Every event published to a junction reaches every currently subscribed
//! pipeline in publish order. A synchronous junction runs subscribers
//! inline on the publisher's task, serialized by a publish lock; an
//! asynchronous junction enqueues into a bounded channel drained by one
//! dedicated worker task, which preserves ordering while decoupling
//! producer and consumer lifetimes.

use crate::event::SharedEvent;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// A pipeline entry point fed by a junction.
pub trait Subscriber: Send + Sync {
    fn on_event(&self, event: &SharedEvent);
}

type SubscriberList = Arc<RwLock<Vec<Arc<dyn Subscriber>>>>;

enum Dispatch {
    /// Inline delivery; the lock serializes concurrent publishers so every
    /// subscriber observes one global publish order.
    Sync { publish_lock: Mutex<()> },
    /// Bounded queue plus single worker. The sender is taken on stop so
    /// the worker drains the queue to completion before exiting.
    Async {
        tx: Mutex<Option<mpsc::Sender<SharedEvent>>>,
        worker: Mutex<Option<JoinHandle<()>>>,
    },
}

/// The fan-out/dispatch point for one named stream.
pub struct StreamJunction {
    name: String,
    subscribers: SubscriberList,
    dispatch: Dispatch,
}

impl StreamJunction {
    /// Junction that delivers inline on the publisher's task.
    pub fn new_sync(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subscribers: Arc::new(RwLock::new(Vec::new())),
            dispatch: Dispatch::Sync {
                publish_lock: Mutex::new(()),
            },
        }
    }

    /// Junction with a bounded queue drained by one worker task.
    /// Must be created inside a tokio runtime.
    pub fn new_async(name: impl Into<String>, queue_size: usize) -> Self {
        let name = name.into();
        let subscribers: SubscriberList = Arc::new(RwLock::new(Vec::new()));
        let (tx, mut rx) = mpsc::channel::<SharedEvent>(queue_size);

        let worker_subs = Arc::clone(&subscribers);
        let worker_name = name.clone();
        let worker = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                deliver(&worker_subs, &event);
            }
            debug!(junction = %worker_name, "dispatch worker drained");
        });

        Self {
            name,
            subscribers,
            dispatch: Dispatch::Async {
                tx: Mutex::new(Some(tx)),
                worker: Mutex::new(Some(worker)),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a pipeline. It only observes events published afterwards.
    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(subscriber);
    }

    /// Deliver an event to every subscriber, in publish order. The async
    /// enqueue may block briefly under backpressure (bounded queue).
    pub async fn publish(&self, event: SharedEvent) {
        match &self.dispatch {
            Dispatch::Sync { publish_lock } => {
                let _guard = publish_lock.lock().unwrap_or_else(PoisonError::into_inner);
                deliver(&self.subscribers, &event);
            }
            Dispatch::Async { tx, .. } => {
                let sender = tx
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                match sender {
                    Some(sender) => {
                        if sender.send(event).await.is_err() {
                            debug!(junction = %self.name, "publish after worker exit dropped");
                        }
                    }
                    None => debug!(junction = %self.name, "publish after stop dropped"),
                }
            }
        }
    }

    /// Drain-then-stop: close the queue, let the worker finish everything
    /// already enqueued, and wait for it. Idempotent; a no-op for
    /// synchronous junctions.
    pub async fn stop(&self) {
        if let Dispatch::Async { tx, worker } = &self.dispatch {
            tx.lock().unwrap_or_else(PoisonError::into_inner).take();
            let handle = worker.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(handle) = handle {
                if handle.await.is_err() {
                    info!(junction = %self.name, "dispatch worker panicked");
                }
            }
        }
    }
}

fn deliver(subscribers: &SubscriberList, event: &SharedEvent) {
    // Snapshot under the read lock, invoke outside it, so subscriber
    // callbacks cannot deadlock against runtime subscription.
    let snapshot: Vec<Arc<dyn Subscriber>> = subscribers
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .map(Arc::clone)
        .collect();
    for subscriber in snapshot {
        subscriber.on_event(event);
    }
}
