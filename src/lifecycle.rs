//! Stream lifecycle: the `Active -> Ended | Errored` state machine shared by
//! every stage.
//!
//! A [`Lifecycle`] is cheap to clone; all clones observe the same state. The
//! state is published through a `tokio::sync::watch` channel so that pipelines
//! can await the first failure of any stage without reading its data.

use futures::task::AtomicWaker;
use std::sync::Arc;
use std::task::Waker;
use tokio::sync::watch;

use crate::error::StreamError;

/// Observable state of a stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamState {
    /// Still delivering values
    Active,
    /// Completed normally
    Ended,
    /// Failed; no further values are delivered
    Errored(StreamError),
}

impl StreamState {
    /// `true` once the stream has ended or failed
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamState::Active)
    }

    /// The terminal error, if any
    pub fn error(&self) -> Option<&StreamError> {
        match self {
            StreamState::Errored(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct LifecycleInner {
    state: watch::Sender<StreamState>,
    waker: AtomicWaker,
}

/// Shared handle onto one stream's state
#[derive(Debug, Clone)]
pub struct Lifecycle {
    inner: Arc<LifecycleInner>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    /// Create a new lifecycle in the `Active` state
    pub fn new() -> Self {
        let (state, _) = watch::channel(StreamState::Active);
        Self {
            inner: Arc::new(LifecycleInner {
                state,
                waker: AtomicWaker::new(),
            }),
        }
    }

    /// Snapshot of the current state
    pub fn state(&self) -> StreamState {
        self.inner.state.borrow().clone()
    }

    pub fn is_active(&self) -> bool {
        !self.inner.state.borrow().is_terminal()
    }

    /// Move to `Ended`. Returns `false` if the stream was already terminal.
    pub(crate) fn end(&self) -> bool {
        self.inner.state.send_if_modified(|state| match state {
            StreamState::Active => {
                *state = StreamState::Ended;
                true
            }
            _ => false,
        })
    }

    /// Move to `Errored`. Returns `false` if the stream was already terminal.
    pub(crate) fn fail(&self, err: StreamError) -> bool {
        let changed = self.inner.state.send_if_modified(|state| match state {
            StreamState::Active => {
                *state = StreamState::Errored(err);
                true
            }
            _ => false,
        });
        if changed {
            self.inner.waker.wake();
        }
        changed
    }

    /// Register the task that is currently polling the stream, so an external
    /// destroy can wake it.
    pub(crate) fn register(&self, waker: &Waker) {
        self.inner.waker.register(waker);
    }

    /// Wait until the stream has ended or failed
    pub async fn terminated(&self) -> StreamState {
        let mut rx = self.inner.state.subscribe();
        let state = match rx.wait_for(StreamState::is_terminal).await {
            Ok(state) => state.clone(),
            Err(_) => StreamState::Ended,
        };
        state
    }

    /// Wait until the stream fails. Never resolves for a stream that ends
    /// normally.
    pub async fn errored(&self) -> StreamError {
        let mut rx = self.inner.state.subscribe();
        let err = match rx.wait_for(|state| state.error().is_some()).await {
            Ok(state) => state.error().cloned(),
            Err(_) => None,
        };
        match err {
            Some(err) => err,
            None => futures::future::pending().await,
        }
    }
}
