//! Pipeline configuration loaded from environment variables.

use mediator::scope::DEFAULT_MAX_STAGED;

/// Operational knobs for the pipeline, with sensible defaults.
///
/// Reads from environment variables:
/// - `UOW_MAX_STAGED_EVENTS`: cap on staged messages per unit of work
///   buffer (default: `1024`)
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Cap on staged events and buffered notifications per unit of work.
    /// A runaway domain loop hits this limit instead of exhausting memory.
    pub max_staged_events: usize,
}

impl PipelineConfig {
    /// Loads configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        Self {
            max_staged_events: std::env::var("UOW_MAX_STAGED_EVENTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_STAGED),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_staged_events: DEFAULT_MAX_STAGED,
        }
    }
}
