//! Fan-out hub: several independent consumers of one source
//!
//! Every subscriber receives the full sequence the hub emits after it starts.
//! The hub is paced by its slowest subscriber; each subscriber has at most one
//! undelivered item. A hub whose subscribers have all been dropped stops
//! pulling and records [`StreamError::Cancelled`] as its outcome.

use async_stream::stream;
use futures_util::StreamExt;
use log::debug;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

use crate::error::{StreamError, StreamResult};
use crate::lifecycle::StreamState;
use crate::source::Source;

/// Subscribers waiting to be picked up by the driver, and the hub's final
/// state once it has stopped
struct Registry<T> {
    pending: Vec<mpsc::Sender<StreamResult<T>>>,
    closed: Option<StreamState>,
}

struct HubState<T> {
    upstream: Mutex<Option<Source<T>>>,
    registry: Mutex<Registry<T>>,
    started: AtomicBool,
}

/// Shared hub created by [`Source::fan_out`]
pub struct FanOut<T> {
    state: Arc<HubState<T>>,
}

impl<T> Clone for FanOut<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

fn lock<G>(mutex: &Mutex<G>) -> MutexGuard<'_, G> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T> FanOut<T>
where
    T: Clone + Send + 'static,
{
    pub fn new(upstream: Source<T>) -> Self {
        Self {
            state: Arc::new(HubState {
                upstream: Mutex::new(Some(upstream)),
                registry: Mutex::new(Registry {
                    pending: Vec::new(),
                    closed: None,
                }),
                started: AtomicBool::new(false),
            }),
        }
    }

    /// Attach a new consumer.
    ///
    /// The hub starts the first time any subscriber is polled. A subscriber
    /// attached after the hub stopped sees its terminal outcome only: the
    /// upstream error, [`StreamError::Cancelled`] if every earlier subscriber
    /// was dropped first, or an immediate end.
    pub fn subscribe(&self) -> Source<T> {
        let (tx, rx) = mpsc::channel(1);
        {
            let mut registry = lock(&self.state.registry);
            match registry.closed.clone() {
                Some(StreamState::Errored(e)) => return Source::failed(e),
                Some(_) => return Source::new(futures::stream::empty()),
                None => registry.pending.push(tx),
            }
        }

        let state = Arc::clone(&self.state);
        Source::new(stream! {
            start(&state);
            let mut rx = rx;
            while let Some(item) = rx.recv().await {
                yield item;
            }
        })
    }

    /// Whether the hub has started pulling from upstream
    pub fn is_started(&self) -> bool {
        self.state.started.load(Ordering::Acquire)
    }
}

fn start<T>(state: &Arc<HubState<T>>)
where
    T: Clone + Send + 'static,
{
    if state.started.swap(true, Ordering::AcqRel) {
        return;
    }
    if let Some(upstream) = lock(&state.upstream).take() {
        tokio::spawn(drive(Arc::clone(state), upstream));
    }
}

async fn drive<T>(state: Arc<HubState<T>>, mut upstream: Source<T>)
where
    T: Clone + Send + 'static,
{
    let mut targets: Vec<mpsc::Sender<StreamResult<T>>> = Vec::new();
    let outcome = loop {
        targets.extend(lock(&state.registry).pending.drain(..));
        if targets.is_empty() {
            debug!("fan-out: no subscribers left, stopping");
            break StreamState::Errored(StreamError::Cancelled);
        }

        let item = match upstream.next().await {
            Some(item) => item,
            None => break StreamState::Ended,
        };
        let terminal = item.as_ref().err().cloned();

        let mut live = Vec::with_capacity(targets.len());
        for tx in targets.drain(..) {
            if tx.send(item.clone()).await.is_ok() {
                live.push(tx);
            } else {
                debug!("fan-out: subscriber detached");
            }
        }
        targets = live;

        if let Some(e) = terminal {
            break StreamState::Errored(e);
        }
    };

    let mut registry = lock(&state.registry);
    if let StreamState::Errored(e) = &outcome {
        for tx in registry.pending.drain(..) {
            let _ = tx.try_send(Err(e.clone()));
        }
    }
    registry.pending.clear();
    registry.closed = Some(outcome);
}

impl<T> Source<T>
where
    T: Clone + Send + 'static,
{
    /// Turn this source into a hub that several consumers can subscribe to
    pub fn fan_out(self) -> FanOut<T> {
        FanOut::new(self)
    }
}

impl<T> fmt::Debug for FanOut<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = lock(&self.state.registry);
        f.debug_struct("FanOut")
            .field("started", &self.state.started.load(Ordering::Acquire))
            .field("pending", &registry.pending.len())
            .field("closed", &registry.closed)
            .finish()
    }
}
