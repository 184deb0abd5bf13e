//! Pipelines: composed chains with a single completion signal

mod builder;

pub use builder::{pipeline, Pipeline};
