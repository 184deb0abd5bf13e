//! Sinks: the consuming end of a pipeline.
//!
//! A [`Sink`] accepts one value at a time; the caller awaits each `write`
//! before pulling the next value, which is how backpressure reaches the
//! producer. `finish` is the end-of-stream signal.

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::SinkExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{StreamError, StreamResult};
use crate::source::Source;

/// Consumer side of a stream
#[async_trait]
pub trait Sink<T: Send + 'static>: Send {
    /// Accept one value. The next value is not offered until this completes.
    async fn write(&mut self, value: T) -> StreamResult<()>;

    /// The upstream ended normally
    async fn finish(&mut self) -> StreamResult<()> {
        Ok(())
    }
}

/// Recording sink that keeps every value it receives
#[derive(Debug)]
pub struct Collect<T> {
    items: Vec<T>,
    finished: bool,
}

impl<T> Default for Collect<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            finished: false,
        }
    }
}

impl<T> Collect<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Whether `finish` has been called
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn into_inner(self) -> Vec<T> {
        self.items
    }
}

#[async_trait]
impl<T: Send + 'static> Sink<T> for Collect<T> {
    async fn write(&mut self, value: T) -> StreamResult<()> {
        self.items.push(value);
        Ok(())
    }

    async fn finish(&mut self) -> StreamResult<()> {
        self.finished = true;
        Ok(())
    }
}

/// Sink that accepts and drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct Discard;

#[async_trait]
impl<T: Send + 'static> Sink<T> for Discard {
    async fn write(&mut self, _value: T) -> StreamResult<()> {
        Ok(())
    }
}

/// Write side of a [`pass_through`] pair
#[derive(Debug)]
pub struct Inlet<T> {
    tx: Option<mpsc::Sender<StreamResult<T>>>,
}

impl<T: Send + 'static> Inlet<T> {
    /// Fail the readable side with `err` and close the inlet
    pub async fn fail(&mut self, err: StreamError) {
        if let Some(mut tx) = self.tx.take() {
            // the reader may already be gone, which is fine
            let _ = tx.send(Err(err)).await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.as_ref().map_or(true, |tx| tx.is_closed())
    }
}

#[async_trait]
impl<T: Send + 'static> Sink<T> for Inlet<T> {
    async fn write(&mut self, value: T) -> StreamResult<()> {
        let tx = self.tx.as_mut().ok_or(StreamError::SinkClosed)?;
        tx.send(Ok(value)).await.map_err(|_| StreamError::SinkClosed)
    }

    async fn finish(&mut self) -> StreamResult<()> {
        if let Some(mut tx) = self.tx.take() {
            tx.close_channel();
        }
        Ok(())
    }
}

/// A connected sink/source pair. Values written to the [`Inlet`] come out of
/// the [`Source`] in order, with one value outstanding at a time; `finish` ends
/// the source.
pub fn pass_through<T: Send + 'static>() -> (Inlet<T>, Source<T>) {
    let (tx, rx) = mpsc::channel(0);
    (Inlet { tx: Some(tx) }, Source::new(rx))
}

/// Sink that writes text or byte chunks into any async writer
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: W,
}

impl<W> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W, T> Sink<T> for WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
    T: AsRef<[u8]> + Send + 'static,
{
    async fn write(&mut self, value: T) -> StreamResult<()> {
        self.writer.write_all(value.as_ref()).await?;
        Ok(())
    }

    async fn finish(&mut self) -> StreamResult<()> {
        self.writer.flush().await?;
        Ok(())
    }
}
