//! Configuration types for stroom operations

/// What [`source_with`](crate::source_with) does when its producer fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// End the stream normally; the failure is logged and dropped
    #[default]
    End,
    /// Fail the stream with the producer's error
    Error,
}

/// Configuration for demand-driven sources
#[derive(Debug, Clone, Default)]
pub struct SourceConfig {
    pub on_failure: FailurePolicy,
}

impl SourceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the failure policy
    pub fn on_failure(mut self, policy: FailurePolicy) -> Self {
        self.on_failure = policy;
        self
    }
}

/// How `uniq_by` bounds the set of keys it has seen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyEviction {
    /// Remember every key for the lifetime of the stream. Memory grows with
    /// the number of distinct keys.
    #[default]
    Unbounded,
    /// Remember at most `capacity` keys, forgetting the least recently seen.
    /// A forgotten key passes again the next time it appears.
    Lru { capacity: usize },
}

/// Configuration for `uniq_by`
#[derive(Debug, Clone, Default)]
pub struct UniqByConfig {
    pub eviction: KeyEviction,
}

impl UniqByConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only the `capacity` most recently seen keys
    pub fn lru(mut self, capacity: usize) -> Self {
        self.eviction = KeyEviction::Lru { capacity };
        self
    }
}

/// Text formatting options for `stringify_with`
#[derive(Debug, Clone, Default)]
pub struct StringifyOptions {
    /// Spaces per indentation level; `None` or `Some(0)` gives compact output.
    /// Values above 10 are clamped to 10.
    pub indent: Option<usize>,
}

impl StringifyOptions {
    pub const MAX_INDENT: usize = 10;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn indent(mut self, width: usize) -> Self {
        self.indent = Some(width);
        self
    }

    pub(crate) fn effective_indent(&self) -> Option<usize> {
        self.indent
            .map(|width| width.min(Self::MAX_INDENT))
            .filter(|width| *width > 0)
    }
}

/// Configuration for [`Pipeline`](crate::pipeline::Pipeline)
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Name used in log lines
    pub name: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: "unnamed-pipeline".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}
