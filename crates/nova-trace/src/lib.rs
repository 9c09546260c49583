//! Debugger-driven execution tracing for step-by-step program visualization.
//!
//! The [`TraceController`] drives a suspended debuggee through the JDWP facade
//! in `nova-jdwp`, one event set at a time. For every event at a user-code
//! location it builds an [`ExecutionPoint`] (frames, globals, heap), drops it
//! if nothing visible changed since the last accepted point, and stops the
//! debuggee once the step budget runs out.
//!
//! Values never embed objects: they cite them by id, and each point carries one
//! flat heap map, so cyclic object graphs are finite to build and to render.

pub mod controller;
pub mod diff;
pub mod document;
pub mod driver;
pub mod encode;
pub mod error;
pub mod filter;
pub mod frame;
pub mod heap;
pub mod model;
pub mod output;
pub mod point;

pub use crate::controller::{ControllerState, StepBudget, Trace, TraceController};
pub use crate::diff::{patch_return, DedupEngine};
pub use crate::document::TraceDocument;
pub use crate::driver::{spawn_trace, trace_program, TraceSession};
pub use crate::encode::ValueEncoder;
pub use crate::error::{TraceError, TraceResult};
pub use crate::filter::NamespaceFilter;
pub use crate::frame::{FrameBuilder, FrameIdTicker};
pub use crate::heap::HeapGrapher;
pub use crate::model::{
    EncodedObject, EncodedValue, ExecutionPoint, Frame, Heap, TraceEvent, TraceMarker, TraceStep,
    RETURN_MARKER, VOID_LITERAL,
};
pub use crate::output::OutputCapture;
pub use crate::point::{Candidate, ExecutionPointBuilder, PointContext, PointEvent};

/// Re-export the protocol facade so consumers can depend on `nova-trace` alone.
pub mod jdwp {
    pub use nova_jdwp::*;
}
