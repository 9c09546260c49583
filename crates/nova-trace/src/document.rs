use serde::Serialize;

use crate::controller::Trace;
use crate::error::TraceError;
use crate::model::{TraceMarker, TraceStep};

/// What the viewer loads: the program source next to its trace.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TraceDocument {
    pub code: String,
    pub trace: Vec<TraceStep>,
}

impl TraceDocument {
    pub fn new(code: impl Into<String>, trace: Vec<TraceStep>) -> Self {
        Self {
            code: code.into(),
            trace,
        }
    }

    /// A document for source that never ran because it failed to compile.
    pub fn compile_error(
        code: impl Into<String>,
        message: impl Into<String>,
        line: u32,
        column: u32,
    ) -> Self {
        Self::new(
            code,
            vec![TraceStep::Marker(TraceMarker::error(message, line, column))],
        )
    }

    /// Render either a finished trace or the failure that prevented one.
    ///
    /// Failures have no source position and are pinned to line 1, column 1.
    pub fn from_outcome(code: impl Into<String>, outcome: Result<Trace, TraceError>) -> Self {
        match outcome {
            Ok(trace) => Self::new(code, trace.steps),
            Err(err) => {
                tracing::debug!(target: "nova.trace", error = %err, "trace failed");
                Self::new(
                    code,
                    vec![TraceStep::Marker(TraceMarker::error(err.to_string(), 1, 1))],
                )
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_value(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}
