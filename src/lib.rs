pub mod error;
pub mod lifecycle;
pub mod source;
pub mod sink;
pub mod pipe;
pub mod split;
pub mod fan_out;
pub mod serialize;
pub mod constructors;
pub mod pipeline;

pub mod stream_configuration;
pub mod stroom_stream_ext;

// Re-export all constructors at the crate root
pub use constructors::*;
pub use error::{StreamError, StreamResult};
pub use lifecycle::{Lifecycle, StreamState};
pub use source::{Flow, Source, Subscription};
pub use sink::{pass_through, Collect, Discard, Inlet, Sink, WriterSink};
pub use pipe::{
    compose, filter, flat_map, from_transform, head, identity, map, throttle, try_filter,
    try_map, uniq_by, uniq_by_with, Emitter, Pipe, PipeExt, Transform,
};
pub use split::{split_when, try_split_when};
pub use fan_out::FanOut;
pub use serialize::{json, stringify, stringify_with};
pub use pipeline::{pipeline, Pipeline};
pub use stroom_stream_ext::{StroomResultStreamExt, StroomStreamExt};
