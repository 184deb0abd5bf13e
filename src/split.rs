//! `split_when`: partition one stream into a stream of sub-streams.

use async_stream::stream;
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use log::debug;
use std::any::Any;
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};
use tokio::sync::{mpsc as outer_mpsc, watch};

use crate::error::{StreamError, StreamResult};
use crate::pipe::Pipe;
use crate::source::Source;

const STAGE: &str = "split_when";

/// Start a new sub-stream at every element for which `split_fn` is true.
///
/// The first sub-stream is emitted before any input is read. An element that
/// triggers a split is the first element of the new sub-stream. When upstream
/// ends, the last sub-stream ends with it; an upstream error fails both the
/// current sub-stream and the outer stream. A panicking `split_fn` fails both
/// with [`StreamError::Stage`].
///
/// Upstream is read by a spawned task, one element at a time: the next element
/// is pulled only after the current sub-stream has taken the previous one. Read
/// each sub-stream to its end (or drop it) before asking for the next one; a
/// sub-stream that is held but not read stalls the whole split. Once the
/// current sub-stream is dropped, upstream is read (and discarded) only while
/// the outer stream is waiting for the next sub-stream.
pub fn split_when<T, F>(split_fn: F) -> Pipe<T, Source<T>>
where
    F: Fn(&T) -> bool + Send + Sync + Clone + 'static,
    T: Send + 'static,
{
    split_by(move |value: &T| -> StreamResult<bool> { Ok(split_fn(value)) })
}

/// Like [`split_when`], but a failing predicate fails the current sub-stream
/// and the outer stream with [`StreamError::Stage`]
pub fn try_split_when<T, E, F>(split_fn: F) -> Pipe<T, Source<T>>
where
    F: Fn(&T) -> Result<bool, E> + Send + Sync + Clone + 'static,
    E: Display,
    T: Send + 'static,
{
    split_by(move |value: &T| -> StreamResult<bool> {
        split_fn(value).map_err(|e| StreamError::stage(STAGE, e))
    })
}

fn split_by<T, F>(split_fn: F) -> Pipe<T, Source<T>>
where
    F: Fn(&T) -> StreamResult<bool> + Send + Sync + Clone + 'static,
    T: Send + 'static,
{
    Pipe::new(move |input: Source<T>| {
        let split_fn = split_fn.clone();
        Source::new(stream! {
            let (group, first) = mpsc::channel(0);
            let (outer_tx, mut outer_rx) = outer_mpsc::channel(1);
            let (waiting, demand) = watch::channel(false);
            let mut driver = tokio::spawn(drive_split(input, split_fn, group, outer_tx, demand));

            yield Ok(Source::new(first));
            loop {
                waiting.send_replace(true);
                let next = outer_rx.recv().await;
                waiting.send_replace(false);
                match next {
                    Some(item) => {
                        let failed = item.is_err();
                        yield item;
                        if failed {
                            break;
                        }
                    }
                    None => {
                        if let Err(e) = (&mut driver).await {
                            if e.is_panic() {
                                yield Err(StreamError::stage(STAGE, e));
                            }
                        }
                        break;
                    }
                }
            }
        })
    })
}

async fn drive_split<T, F>(
    mut input: Source<T>,
    split_fn: F,
    mut group: mpsc::Sender<StreamResult<T>>,
    outer: outer_mpsc::Sender<StreamResult<Source<T>>>,
    mut demand: watch::Receiver<bool>,
) where
    F: Fn(&T) -> StreamResult<bool>,
    T: Send + 'static,
{
    loop {
        // a dropped sub-stream is skipped only while the outer reader waits
        while group.is_closed() && !reader_waiting(&mut demand) {
            tokio::select! {
                changed = demand.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                _ = outer.closed() => {
                    debug!("split_when: all readers dropped, stopping");
                    return;
                }
            }
        }

        let Some(item) = input.next().await else {
            return;
        };
        let checked = item.and_then(|value| {
            panic::catch_unwind(AssertUnwindSafe(|| split_fn(&value)))
                .unwrap_or_else(|payload| Err(StreamError::stage(STAGE, panic_message(&*payload))))
                .map(|split| (value, split))
        });
        let (value, split) = match checked {
            Ok(checked) => checked,
            Err(e) => {
                // the previous element was taken, so the sender's slot is free
                let _ = group.try_send(Err(e.clone()));
                let _ = outer.send(Err(e)).await;
                return;
            }
        };

        if split {
            let (next, rx) = mpsc::channel(0);
            // replacing the sender ends the previous sub-stream
            group = next;
            if outer.send(Ok(Source::new(rx))).await.is_err() {
                debug!("split_when: outer stream dropped, stopping");
                return;
            }
        }

        if group.send(Ok(value)).await.is_err() {
            // a dropped sub-stream discards its elements
            tokio::task::yield_now().await;
        }
    }
}

fn reader_waiting(demand: &mut watch::Receiver<bool>) -> bool {
    *demand.borrow_and_update()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("predicate panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("predicate panicked: {}", message)
    } else {
        "predicate panicked".to_string()
    }
}
