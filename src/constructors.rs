//! Constructors: bridging functions that turn external producers into
//! [`Source`]s, and the concatenation scheduler.

use async_stream::stream;
use futures::stream;
use futures_util::StreamExt;
use log::{debug, warn};
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::error::{StreamError, StreamResult};
use crate::sink::Sink;
use crate::source::Source;
use crate::stream_configuration::{FailurePolicy, SourceConfig};

// ================================
// Bridging Functions
// ================================

/// Emit every element of a vector, in order, then end
pub fn from_array<T>(values: Vec<T>) -> Source<T>
where
    T: Send + 'static,
{
    from_iter(values)
}

/// Emit every element of an iterator, in order, then end
pub fn from_iter<I, T>(iter: I) -> Source<T>
where
    I: IntoIterator<Item = T>,
    I::IntoIter: Send + 'static,
    T: Send + 'static,
{
    Source::from_stream(stream::iter(iter))
}

/// Emit a single element, then end
pub fn once<T>(value: T) -> Source<T>
where
    T: Send + 'static,
{
    Source::from_stream(stream::once(futures::future::ready(value)))
}

/// Emit the eventual output of a future, then end.
///
/// A future that resolves to `Err` fails the stream with that error; the
/// error is never delivered as a value.
pub fn from_future<T, E, F>(fut: F) -> Source<T>
where
    F: Future<Output = Result<T, E>> + Send + 'static,
    E: Into<StreamError>,
    T: Send + 'static,
{
    Source::new(stream::once(async move { fut.await.map_err(Into::into) }))
}

/// A source that ends immediately
pub fn empty<T>() -> Source<T>
where
    T: Send + 'static,
{
    Source::from_stream(stream::empty())
}

/// Repeat a value on every demand, forever. Consumers must bound their own
/// consumption, e.g. with [`head`](crate::pipe::head).
pub fn always<T>(value: T) -> Source<T>
where
    T: Clone + Send + 'static,
{
    Source::from_stream(stream::repeat(value))
}

/// Demand-driven source over an asynchronous producer.
///
/// On every demand `produce` is awaited and each element of its output is
/// emitted in order. A producer failure ends the stream normally; use
/// [`source_with`] to choose otherwise.
pub fn source<T, R, F, Fut>(produce: F) -> Source<T>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = StreamResult<R>> + Send + 'static,
    R: IntoIterator<Item = T> + Send + 'static,
    R::IntoIter: Send,
    T: Send + 'static,
{
    source_with(produce, |batch: R| batch, SourceConfig::default())
}

/// [`source`] with an `expand` step turning each produced result into zero or
/// more elements, and an explicit failure policy
pub fn source_with<T, R, X, F, Fut, G>(mut produce: F, mut expand: G, config: SourceConfig) -> Source<T>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = StreamResult<R>> + Send + 'static,
    G: FnMut(R) -> X + Send + 'static,
    X: IntoIterator<Item = T>,
    X::IntoIter: Send,
    R: Send + 'static,
    T: Send + 'static,
{
    Source::new(stream! {
        loop {
            match produce().await {
                Ok(result) => {
                    let mut emitted = false;
                    for item in expand(result) {
                        emitted = true;
                        yield Ok(item);
                    }
                    if !emitted {
                        // nothing to hand over; let other tasks run before asking again
                        tokio::task::yield_now().await;
                    }
                }
                Err(e) => match config.on_failure {
                    FailurePolicy::End => {
                        warn!("source producer failed, ending stream: {}", e);
                        break;
                    }
                    FailurePolicy::Error => {
                        yield Err(e);
                        break;
                    }
                },
            }
        }
    })
}

/// Timer source: emit the current Unix time in milliseconds every `period`.
///
/// The timer starts on the first poll, so the source can be built outside a
/// tokio runtime but must be read inside one. From then on ticks are produced
/// on a spawned task regardless of demand and buffered without bound until
/// read. The task stops once the source is dropped.
pub fn interval(period: Duration) -> Source<i64> {
    Source::new(stream! {
        let (tx, rx) = mpsc::unbounded_channel::<StreamResult<i64>>();
        tokio::spawn(tick(period, tx));

        let mut ticks = UnboundedReceiverStream::new(rx);
        while let Some(now) = ticks.next().await {
            yield now;
        }
    })
}

async fn tick(period: Duration, tx: mpsc::UnboundedSender<StreamResult<i64>>) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = tx.closed() => break,
            _ = ticker.tick() => {
                let now = chrono::Utc::now().timestamp_millis();
                if tx.send(Ok(now)).is_err() {
                    break;
                }
            }
        }
    }
    debug!("interval source dropped, timer stopped");
}

// ================================
// Concatenation
// ================================

/// Concatenate sources sequentially.
///
/// Source `k + 1` is not polled until source `k` has ended, so the output is
/// each member's elements in list order. A member error ends the result with
/// that error and later members are dropped unstarted.
pub fn concat<T>(streams: Vec<Source<T>>) -> Source<T>
where
    T: Send + 'static,
{
    if streams.is_empty() {
        return empty();
    }

    Source::new(stream! {
        for mut member in streams {
            let mut failed = false;
            while let Some(item) = member.next().await {
                failed = item.is_err();
                yield item;
            }
            if failed {
                break;
            }
        }
    })
}

/// Drain sources sequentially into `destination`.
///
/// The destination is finished once, after the last member ends, or at once
/// when `streams` is empty. On a member error the destination is left
/// unfinished and the error is returned.
pub async fn concat_into<T, K>(streams: Vec<Source<T>>, destination: &mut K) -> StreamResult<()>
where
    T: Send + 'static,
    K: Sink<T> + ?Sized,
{
    let total = streams.len();
    for (index, mut member) in streams.into_iter().enumerate() {
        while let Some(item) = member.next().await {
            destination.write(item?).await?;
        }
        debug!("concat: member {}/{} ended", index + 1, total);
    }
    destination.finish().await
}
