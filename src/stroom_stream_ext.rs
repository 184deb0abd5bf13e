use futures_core::Stream;
use futures_util::stream::StreamExt;

use crate::error::StreamError;
use crate::pipe::Pipe;
use crate::source::Source;

/// Extension trait bringing any stream into a stroom pipeline
pub trait StroomStreamExt: Stream + Sized + Send + 'static {
    /// Wrap an infallible stream as a source
    fn into_source(self) -> Source<Self::Item>
    where
        Self::Item: Send + 'static,
    {
        Source::from_stream(self)
    }

    /// Wrap this stream and apply a transform stage to it
    fn through<O>(self, pipe: &Pipe<Self::Item, O>) -> Source<O>
    where
        Self::Item: Send + 'static,
        O: Send + 'static,
    {
        pipe.apply(self.into_source())
    }
}

impl<S> StroomStreamExt for S where S: Stream + Send + 'static {}

/// Extension trait for streams of `Result`s
pub trait StroomResultStreamExt<T, E>: Stream<Item = Result<T, E>> + Sized + Send + 'static {
    /// Wrap a fallible stream as a source. The first `Err` is the source's
    /// terminal error; anything after it is never read.
    fn try_into_source(self) -> Source<T>
    where
        T: Send + 'static,
        E: Into<StreamError>,
    {
        Source::new(self.map(|item| item.map_err(Into::into)))
    }
}

impl<S, T, E> StroomResultStreamExt<T, E> for S where S: Stream<Item = Result<T, E>> + Send + 'static {}
