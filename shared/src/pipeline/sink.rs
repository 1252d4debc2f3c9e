//! Result sinks.

use crate::models::ExplainResult;

/// Receives the results that survive filtering.
///
/// `dedupe_active` tells the sink whether the result is an aggregated record
/// carrying an occurrence count.
pub trait ResultSink: Send {
    /// Renders one result.
    fn render(&mut self, result: &ExplainResult, dedupe_active: bool);
}

/// Sink that keeps every rendered result in memory.
#[derive(Debug, Default, Clone)]
pub struct CollectingSink {
    rendered: Vec<(ExplainResult, bool)>,
}

impl CollectingSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rendered results in arrival order.
    pub fn results(&self) -> impl Iterator<Item = &ExplainResult> {
        self.rendered.iter().map(|(result, _)| result)
    }

    /// Rendered results with their dedupe flag.
    #[must_use]
    pub fn rendered(&self) -> &[(ExplainResult, bool)] {
        &self.rendered
    }

    /// Number of rendered results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rendered.len()
    }

    /// Returns true if nothing was rendered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rendered.is_empty()
    }
}

impl ResultSink for CollectingSink {
    fn render(&mut self, result: &ExplainResult, dedupe_active: bool) {
        self.rendered.push((result.clone(), dedupe_active));
    }
}
