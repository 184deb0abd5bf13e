use futures::future::select_all;
use log::debug;

use crate::error::StreamResult;
use crate::lifecycle::Lifecycle;
use crate::pipe::Pipe;
use crate::sink::{Discard, Sink};
use crate::source::Source;
use crate::stream_configuration::PipelineConfig;

/// A chain of Source -> Pipe(s) -> Sink with one completion signal.
///
/// The pipeline resolves once: with the first error raised by any stage, or
/// with `Ok(())` when the output has been fully delivered. Every stage's
/// lifecycle is watched, so a failure is reported even when a later stage
/// never reads its input.
pub struct Pipeline<T> {
    config: PipelineConfig,
    output: Source<T>,
    stages: Vec<Lifecycle>,
}

impl<T> Pipeline<T>
where
    T: Send + 'static,
{
    pub fn from_source(source: Source<T>) -> Self {
        Self {
            config: PipelineConfig::default(),
            output: source,
            stages: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Append a transform stage
    pub fn through<O>(self, pipe: &Pipe<T, O>) -> Pipeline<O>
    where
        O: Send + 'static,
    {
        let Pipeline {
            config,
            output,
            mut stages,
        } = self;
        stages.push(output.lifecycle().clone());
        Pipeline {
            config,
            output: pipe.apply(output),
            stages,
        }
    }

    /// Number of stages so far, counting the source
    pub fn stage_count(&self) -> usize {
        self.stages.len() + 1
    }

    /// Deliver the output into `sink` and resolve with the pipeline's outcome
    pub async fn run_into<K>(self, sink: &mut K) -> StreamResult<()>
    where
        K: Sink<T> + ?Sized,
    {
        let Pipeline {
            config,
            output,
            mut stages,
        } = self;
        stages.push(output.lifecycle().clone());

        let watched = stages.clone();
        let first_failure = async move {
            let failures = watched.iter().map(|lc| Box::pin(lc.errored()));
            select_all(failures).await.0
        };

        let result = tokio::select! {
            biased;
            err = first_failure => Err(err),
            delivered = output.pipe_to(sink) => delivered,
        };

        // a stage nobody was reading from may have failed in the meantime
        let result = result.and_then(|()| {
            match stages.iter().find_map(|lc| lc.state().error().cloned()) {
                Some(err) => Err(err),
                None => Ok(()),
            }
        });

        match &result {
            Ok(()) => debug!("pipeline '{}' finished", config.name),
            Err(e) => debug!("pipeline '{}' failed: {}", config.name, e),
        }
        result
    }

    /// Run the pipeline, discarding its output
    pub async fn run(self) -> StreamResult<()> {
        self.run_into(&mut Discard).await
    }
}

/// Drive `source` through `stage`, discarding the output, and resolve with
/// the single completion outcome
pub async fn pipeline<I, O>(source: Source<I>, stage: &Pipe<I, O>) -> StreamResult<()>
where
    I: Send + 'static,
    O: Send + 'static,
{
    Pipeline::from_source(source).through(stage).run().await
}
