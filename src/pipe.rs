use async_stream::stream;
use futures_util::StreamExt;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{StreamError, StreamResult};
use crate::source::Source;
use crate::stream_configuration::{KeyEviction, UniqByConfig};

/// A Pipe is a transform stage: a function from Source[I] to Source[O].
///
/// Pipes are reusable. Stages with state build fresh state every time the
/// pipe is applied, so one pipe can serve several independent streams.
pub struct Pipe<I, O> {
    f: Arc<dyn Fn(Source<I>) -> Source<O> + Send + Sync + 'static>,
}

impl<I, O> Clone for Pipe<I, O> {
    fn clone(&self) -> Self {
        Pipe {
            f: Arc::clone(&self.f),
        }
    }
}

impl<I, O> Pipe<I, O> {
    /// Create a new pipe from a function
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Source<I>) -> Source<O> + Send + Sync + 'static,
    {
        Pipe { f: Arc::new(f) }
    }

    /// Apply this pipe to a source
    pub fn apply(&self, input: Source<I>) -> Source<O> {
        (self.f)(input)
    }
}

/// Compose two pipes together
pub fn compose<I, M, O>(p1: Pipe<I, M>, p2: Pipe<M, O>) -> Pipe<I, O>
where
    I: Send + 'static,
    M: Send + 'static,
    O: Send + 'static,
{
    Pipe::new(move |input| p2.apply(p1.apply(input)))
}

/// Identity pipe that doesn't transform the source
pub fn identity<I>() -> Pipe<I, I>
where
    I: Send + 'static,
{
    Pipe::new(|input| input)
}

/// Extension trait for pipes
pub trait PipeExt<I, O> {
    /// Compose this pipe with another pipe
    fn compose<P>(self, other: Pipe<O, P>) -> Pipe<I, P>
    where
        P: Send + 'static;
}

impl<I, O> PipeExt<I, O> for Pipe<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    fn compose<P>(self, other: Pipe<O, P>) -> Pipe<I, P>
    where
        P: Send + 'static,
    {
        compose(self, other)
    }
}

// ================================
// Push-style transforms
// ================================

/// Output buffer handed to a [`Transform`]
#[derive(Debug)]
pub struct Emitter<O> {
    buffer: VecDeque<O>,
    ended: bool,
}

impl<O> Emitter<O> {
    fn new() -> Self {
        Self {
            buffer: VecDeque::new(),
            ended: false,
        }
    }

    /// Push a value downstream. Ignored once the stage has ended.
    pub fn push(&mut self, value: O) {
        if !self.ended {
            self.buffer.push_back(value);
        }
    }

    /// End the stage after the values pushed so far. Upstream is dropped.
    pub fn end(&mut self) {
        self.ended = true;
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }
}

/// A synchronous stage that receives one value at a time and pushes zero,
/// one or many values for it.
///
/// The next input is not pulled until everything pushed for the current one
/// has been taken downstream.
pub trait Transform<I, O>: Send {
    fn transform(&mut self, value: I, out: &mut Emitter<O>) -> StreamResult<()>;

    /// Called once when upstream ends normally
    fn flush(&mut self, _out: &mut Emitter<O>) -> StreamResult<()> {
        Ok(())
    }
}

/// Lift a factory of [`Transform`]s into a [`Pipe`]. The factory runs once
/// per application.
pub fn from_transform<I, O, T, F>(factory: F) -> Pipe<I, O>
where
    F: Fn() -> T + Send + Sync + 'static,
    T: Transform<I, O> + 'static,
    I: Send + 'static,
    O: Send + 'static,
{
    Pipe::new(move |input: Source<I>| {
        let mut stage = factory();
        Source::new(stream! {
            let mut input = input;
            let mut out = Emitter::new();
            loop {
                match input.next().await {
                    Some(Ok(value)) => {
                        let result = stage.transform(value, &mut out);
                        while let Some(v) = out.buffer.pop_front() {
                            yield Ok(v);
                        }
                        if let Err(e) = result {
                            yield Err(e);
                            break;
                        }
                        if out.ended {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        yield Err(e);
                        break;
                    }
                    None => {
                        let result = stage.flush(&mut out);
                        while let Some(v) = out.buffer.pop_front() {
                            yield Ok(v);
                        }
                        if let Err(e) = result {
                            yield Err(e);
                        }
                        break;
                    }
                }
            }
        })
    })
}

// ================================
// Stateless combinators
// ================================

struct MapStage<F> {
    f: F,
}

impl<I, O, F> Transform<I, O> for MapStage<F>
where
    F: FnMut(I) -> StreamResult<O> + Send,
{
    fn transform(&mut self, value: I, out: &mut Emitter<O>) -> StreamResult<()> {
        out.push((self.f)(value)?);
        Ok(())
    }
}

/// Create a pipe that applies the given function to each element
pub fn map<I, O, F>(f: F) -> Pipe<I, O>
where
    F: Fn(I) -> O + Send + Sync + Clone + 'static,
    I: Send + 'static,
    O: Send + 'static,
{
    from_transform(move || {
        let f = f.clone();
        MapStage {
            f: move |i: I| -> StreamResult<O> { Ok(f(i)) },
        }
    })
}

/// Like [`map`], but a failing function fails the stage with
/// [`StreamError::Stage`]
pub fn try_map<I, O, E, F>(f: F) -> Pipe<I, O>
where
    F: Fn(I) -> Result<O, E> + Send + Sync + Clone + 'static,
    E: Display,
    I: Send + 'static,
    O: Send + 'static,
{
    from_transform(move || {
        let f = f.clone();
        MapStage {
            f: move |i: I| -> StreamResult<O> { f(i).map_err(|e| StreamError::stage("map", e)) },
        }
    })
}

struct FilterStage<F> {
    predicate: F,
}

impl<I, F> Transform<I, I> for FilterStage<F>
where
    F: FnMut(&I) -> StreamResult<bool> + Send,
{
    fn transform(&mut self, value: I, out: &mut Emitter<I>) -> StreamResult<()> {
        if (self.predicate)(&value)? {
            out.push(value);
        }
        Ok(())
    }
}

/// Create a pipe that filters elements based on the predicate
pub fn filter<I, F>(predicate: F) -> Pipe<I, I>
where
    F: Fn(&I) -> bool + Send + Sync + Clone + 'static,
    I: Send + 'static,
{
    from_transform(move || {
        let predicate = predicate.clone();
        FilterStage {
            predicate: move |i: &I| -> StreamResult<bool> { Ok(predicate(i)) },
        }
    })
}

/// Like [`filter`], but a failing predicate fails the stage
pub fn try_filter<I, E, F>(predicate: F) -> Pipe<I, I>
where
    F: Fn(&I) -> Result<bool, E> + Send + Sync + Clone + 'static,
    E: Display,
    I: Send + 'static,
{
    from_transform(move || {
        let predicate = predicate.clone();
        FilterStage {
            predicate: move |i: &I| -> StreamResult<bool> {
                predicate(i).map_err(|e| StreamError::stage("filter", e))
            },
        }
    })
}

// ================================
// Stateful combinators
// ================================

/// Keys seen so far, optionally bounded with least-recently-seen eviction
struct SeenKeys<K> {
    eviction: KeyEviction,
    stamps: HashMap<K, u64>,
    order: BTreeMap<u64, K>,
    clock: u64,
}

impl<K: Eq + Hash + Clone> SeenKeys<K> {
    fn new(eviction: KeyEviction) -> Self {
        Self {
            eviction,
            stamps: HashMap::new(),
            order: BTreeMap::new(),
            clock: 0,
        }
    }

    /// Record `key`; returns `true` if it was not already remembered
    fn insert(&mut self, key: K) -> bool {
        let capacity = match self.eviction {
            KeyEviction::Unbounded => {
                return self.stamps.insert(key, 0).is_none();
            }
            KeyEviction::Lru { capacity: 0 } => return true,
            KeyEviction::Lru { capacity } => capacity,
        };

        self.clock += 1;
        let fresh = match self.stamps.insert(key.clone(), self.clock) {
            Some(previous) => {
                self.order.remove(&previous);
                false
            }
            None => true,
        };
        self.order.insert(self.clock, key);

        while self.stamps.len() > capacity {
            match self.order.pop_first() {
                Some((_, oldest)) => {
                    self.stamps.remove(&oldest);
                }
                None => break,
            }
        }
        fresh
    }
}

struct UniqByStage<K, F> {
    key_fn: F,
    seen: SeenKeys<K>,
}

impl<I, K, F> Transform<I, I> for UniqByStage<K, F>
where
    F: FnMut(&I) -> K + Send,
    K: Eq + Hash + Clone + Send,
{
    fn transform(&mut self, value: I, out: &mut Emitter<I>) -> StreamResult<()> {
        if self.seen.insert((self.key_fn)(&value)) {
            out.push(value);
        }
        Ok(())
    }
}

/// Pass the first element for every key, drop later elements with a key
/// already seen. The key set is unbounded; see [`uniq_by_with`] for eviction.
pub fn uniq_by<I, K, F>(key_fn: F) -> Pipe<I, I>
where
    F: Fn(&I) -> K + Send + Sync + Clone + 'static,
    K: Eq + Hash + Clone + Send + 'static,
    I: Send + 'static,
{
    uniq_by_with(key_fn, UniqByConfig::default())
}

/// [`uniq_by`] with an explicit key eviction policy
pub fn uniq_by_with<I, K, F>(key_fn: F, config: UniqByConfig) -> Pipe<I, I>
where
    F: Fn(&I) -> K + Send + Sync + Clone + 'static,
    K: Eq + Hash + Clone + Send + 'static,
    I: Send + 'static,
{
    from_transform(move || UniqByStage {
        key_fn: key_fn.clone(),
        seen: SeenKeys::new(config.eviction),
    })
}

struct HeadStage;

impl<I> Transform<I, I> for HeadStage {
    fn transform(&mut self, value: I, out: &mut Emitter<I>) -> StreamResult<()> {
        out.push(value);
        out.end();
        Ok(())
    }
}

/// Emit the first element and end immediately.
///
/// This is early termination: the upstream source is dropped (and so
/// cancelled) as soon as the first element has been taken. An empty upstream
/// gives an empty stream; an upstream error before the first element is
/// forwarded.
pub fn head<I>() -> Pipe<I, I>
where
    I: Send + 'static,
{
    from_transform(|| HeadStage)
}

// ================================
// Asynchronous combinators
// ================================

/// Replace every element with a sub-source and splice its elements in.
///
/// Sub-sources are drained one at a time, in order; the next input is pulled
/// only after the current sub-source has ended. A failing sub-source fails
/// the stage with the same error.
pub fn flat_map<I, O, F>(f: F) -> Pipe<I, O>
where
    F: Fn(I) -> Source<O> + Send + Sync + Clone + 'static,
    I: Send + 'static,
    O: Send + 'static,
{
    Pipe::new(move |input: Source<I>| {
        let f = f.clone();
        Source::new(stream! {
            let mut input = input;
            let mut failed = false;
            while let Some(item) = input.next().await {
                let value = match item {
                    Ok(value) => value,
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                };
                let mut inner = f(value);
                while let Some(inner_item) = inner.next().await {
                    failed = inner_item.is_err();
                    yield inner_item;
                }
                if failed {
                    break;
                }
            }
        })
    })
}

/// Rate-limit a stream: wait `period` before forwarding each element, and
/// pull the next element only after the previous one was taken.
pub fn throttle<I>(period: Duration) -> Pipe<I, I>
where
    I: Send + 'static,
{
    Pipe::new(move |input: Source<I>| {
        Source::new(stream! {
            let mut input = input;
            while let Some(item) = input.next().await {
                match item {
                    Ok(value) => {
                        sleep(period).await;
                        yield Ok(value);
                    }
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        })
    })
}
