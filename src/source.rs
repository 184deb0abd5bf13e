//! The stream primitive.
//!
//! A [`Source`] is an ordered conduit of `StreamResult<T>` values with an
//! observable [`Lifecycle`]. Consumers pull with `next()`; a producer is only
//! polled when the consumer asks for the next item, so at most one item is in
//! flight between two stages. An `Err` item is terminal: the source reports it
//! once and then ends.

use futures::stream::{self, BoxStream, FusedStream, Stream, StreamExt};
use futures::future;
use log::{debug, error};
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::task::JoinHandle;

use crate::error::{StreamError, StreamResult};
use crate::lifecycle::{Lifecycle, StreamState};
use crate::pipe::Pipe;
use crate::sink::Sink;

/// A boxed, heap-allocated async sequence of results; the raw form of every stage
pub type Flow<T> = BoxStream<'static, StreamResult<T>>;

/// A stream of values with an explicit `Active -> Ended | Errored` lifecycle
pub struct Source<T> {
    flow: Option<Flow<T>>,
    lifecycle: Lifecycle,
}

impl<T> Source<T>
where
    T: Send + 'static,
{
    /// Wrap a stream of results. The first `Err` item terminates the source.
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = StreamResult<T>> + Send + 'static,
    {
        Self {
            flow: Some(stream.boxed()),
            lifecycle: Lifecycle::new(),
        }
    }

    /// Wrap an infallible stream of values
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = T> + Send + 'static,
    {
        Self::new(stream.map(Ok))
    }

    /// A source that fails with `err` on its first poll
    pub fn failed(err: StreamError) -> Self {
        Self::new(stream::once(future::ready(Err(err))))
    }

    /// Current state of this source
    pub fn state(&self) -> StreamState {
        self.lifecycle.state()
    }

    /// Handle onto this source's lifecycle, for observation from elsewhere
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Put the source into the `Errored` state.
    ///
    /// The pending producer is dropped on the next poll, which yields `err`
    /// exactly once. Destroying a terminal source has no effect.
    pub fn destroy(&self, err: StreamError) {
        let reason = err.to_string();
        if self.lifecycle.fail(err) {
            debug!("source destroyed: {}", reason);
        }
    }

    /// Apply a transform stage to this source
    pub fn pipe<O>(self, stage: &Pipe<T, O>) -> Source<O>
    where
        O: Send + 'static,
    {
        stage.apply(self)
    }

    /// Drain this source into `sink`, one value at a time.
    ///
    /// Each `write` completes before the next value is pulled. `finish` is
    /// called only when the source ends normally.
    pub async fn pipe_to<K>(mut self, sink: &mut K) -> StreamResult<()>
    where
        K: Sink<T> + ?Sized,
    {
        while let Some(item) = self.next().await {
            sink.write(item?).await?;
        }
        sink.finish().await
    }

    /// Collect every value, or return the terminal error
    pub async fn collect_values(mut self) -> StreamResult<Vec<T>> {
        let mut values = Vec::new();
        while let Some(item) = self.next().await {
            values.push(item?);
        }
        Ok(values)
    }

    /// Attach a data callback and drive the source on a spawned task.
    ///
    /// `on_data` fires per value; `on_complete` fires exactly once with the
    /// terminal outcome, which [`Subscription::finished`] also returns.
    pub fn subscribe<D, C>(mut self, mut on_data: D, on_complete: C) -> Subscription
    where
        D: FnMut(T) + Send + 'static,
        C: FnOnce(StreamResult<()>) + Send + 'static,
    {
        let lifecycle = self.lifecycle.clone();
        let handle = tokio::spawn(async move {
            let mut outcome = Ok(());
            while let Some(item) = self.next().await {
                match item {
                    Ok(value) => on_data(value),
                    Err(e) => {
                        outcome = Err(e);
                        break;
                    }
                }
            }
            on_complete(outcome.clone());
            outcome
        });
        Subscription { handle, lifecycle }
    }

    /// Erase the lifecycle wrapper
    pub fn into_flow(self) -> Flow<T> {
        self.boxed()
    }
}

impl<T> Stream for Source<T> {
    type Item = StreamResult<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(flow) = this.flow.as_mut() else {
            return Poll::Ready(None);
        };

        if !this.lifecycle.is_active() {
            this.flow = None;
            return Poll::Ready(this.lifecycle.state().error().cloned().map(Err));
        }

        this.lifecycle.register(cx.waker());
        match flow.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(value))) => Poll::Ready(Some(Ok(value))),
            Poll::Ready(Some(Err(e))) => {
                this.lifecycle.fail(e);
                Poll::Ready(terminal(this))
            }
            Poll::Ready(None) => {
                this.lifecycle.end();
                Poll::Ready(terminal(this))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

// Whichever transition won (ours or a concurrent destroy) decides the last item.
fn terminal<T>(source: &mut Source<T>) -> Option<StreamResult<T>> {
    source.flow = None;
    source.lifecycle.state().error().cloned().map(Err)
}

impl<T> FusedStream for Source<T> {
    fn is_terminated(&self) -> bool {
        self.flow.is_none()
    }
}

impl<T> fmt::Debug for Source<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("state", &self.lifecycle.state())
            .field("terminated", &self.flow.is_none())
            .finish()
    }
}

/// Handle returned by [`Source::subscribe`]
#[derive(Debug)]
pub struct Subscription {
    handle: JoinHandle<StreamResult<()>>,
    lifecycle: Lifecycle,
}

impl Subscription {
    /// Stop delivery; the completion fires with [`StreamError::Cancelled`]
    pub fn cancel(&self) {
        self.lifecycle.fail(StreamError::Cancelled);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the terminal outcome
    pub async fn finished(self) -> StreamResult<()> {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => Err(StreamError::Cancelled),
            Err(e) => {
                error!("subscription driver panicked: {}", e);
                Err(StreamError::custom(e.to_string()))
            }
        }
    }
}
