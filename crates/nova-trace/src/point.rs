use std::sync::Arc;

use indexmap::IndexMap;
use nova_config::ReturnCapture;
use nova_jdwp::{
    ClassInfo, JdwpClient, JdwpError, JdwpEvent, JdwpValue, Location, ObjectKind, ObjectRef,
    ThreadId,
};

use crate::encode::ValueEncoder;
use crate::error::{TraceError, TraceResult};
use crate::filter::NamespaceFilter;
use crate::frame::{FrameBuilder, FrameIdTicker};
use crate::heap::HeapGrapher;
use crate::model::{EncodedValue, ExecutionPoint, Frame, Heap, TraceEvent};

const DETAIL_MESSAGE_FIELD: &str = "detailMessage";

/// What a locatable debug event means for the trace.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PointEvent<'a> {
    Call,
    Return(&'a JdwpValue),
    StepLine,
    Exception(&'a ObjectRef),
}

impl<'a> PointEvent<'a> {
    /// Classify `event`, returning its thread and location as well. Events
    /// that are not about a code position yield `None`.
    pub fn from_event(event: &'a JdwpEvent) -> Option<(Self, ThreadId, &'a Location)> {
        match event {
            JdwpEvent::MethodEntry { thread, location } => Some((Self::Call, *thread, location)),
            JdwpEvent::MethodExit {
                thread,
                location,
                return_value,
            } => Some((Self::Return(return_value), *thread, location)),
            JdwpEvent::Breakpoint { thread, location }
            | JdwpEvent::SingleStep { thread, location } => {
                Some((Self::StepLine, *thread, location))
            }
            JdwpEvent::Exception {
                thread,
                location,
                exception,
                ..
            } => Some((Self::Exception(exception), *thread, location)),
            JdwpEvent::ClassPrepare { .. }
            | JdwpEvent::ThreadDeath { .. }
            | JdwpEvent::VmDeath
            | JdwpEvent::VmDisconnect => None,
        }
    }

    pub fn trace_event(&self) -> TraceEvent {
        match self {
            PointEvent::Call => TraceEvent::Call,
            PointEvent::Return(_) => TraceEvent::Return,
            PointEvent::StepLine => TraceEvent::StepLine,
            PointEvent::Exception(_) => TraceEvent::Exception,
        }
    }
}

/// Inputs for one point build.
#[derive(Debug)]
pub struct PointContext<'a> {
    pub event: PointEvent<'a>,
    pub thread: ThreadId,
    pub location: &'a Location,
    /// Debuggee output not yet attached to an accepted point.
    pub stdout: String,
}

/// Result of building from one event, before deduplication.
#[derive(Clone, Debug, PartialEq)]
pub enum Candidate {
    Point(ExecutionPoint),
    /// A method exit to be folded into the previously accepted point.
    ReturnPatch {
        line: u32,
        value: EncodedValue,
        heap: Heap,
        stdout: String,
    },
}

/// Assembles execution points from the suspended debuggee.
pub struct ExecutionPointBuilder {
    filter: Arc<NamespaceFilter>,
    hide_synthetic_frames: bool,
    return_capture: ReturnCapture,
    classes: Vec<ClassInfo>,
    frames: FrameBuilder,
    heap: HeapGrapher,
}

impl ExecutionPointBuilder {
    pub fn new(
        filter: Arc<NamespaceFilter>,
        hide_synthetic_frames: bool,
        return_capture: ReturnCapture,
    ) -> Self {
        Self {
            heap: HeapGrapher::new(Arc::clone(&filter)),
            filter,
            hide_synthetic_frames,
            return_capture,
            classes: Vec::new(),
            frames: FrameBuilder,
        }
    }

    pub fn from_config(filter: Arc<NamespaceFilter>, config: &nova_config::TraceConfig) -> Self {
        Self::new(filter, config.hide_synthetic_frames, config.return_capture)
    }

    /// Remember a loaded user class as a source of globals.
    pub fn record_class(&mut self, class: ClassInfo) {
        if self.filter.is_excluded(&class.name) || self.classes.iter().any(|c| c.id == class.id) {
            return;
        }
        self.classes.push(class);
    }

    pub fn classes(&self) -> &[ClassInfo] {
        &self.classes
    }

    pub fn build<C: JdwpClient + ?Sized>(
        &self,
        jdwp: &mut C,
        ctx: PointContext<'_>,
        ticker: &mut FrameIdTicker,
    ) -> TraceResult<Candidate> {
        let mut encoder = ValueEncoder::new();

        if let (PointEvent::Return(value), ReturnCapture::Patch) = (ctx.event, self.return_capture)
        {
            let value = encoder.encode(value);
            let heap = self.heap.materialize(jdwp, &mut encoder)?;
            return Ok(Candidate::ReturnPatch {
                line: ctx.location.line,
                value,
                heap,
                stdout: ctx.stdout,
            });
        }

        let return_value = match ctx.event {
            PointEvent::Return(value) => Some(encoder.encode(value)),
            _ => None,
        };
        let stack_to_render =
            self.build_frames(jdwp, &mut encoder, ctx.thread, return_value, ticker)?;
        let (globals, ordered_globals) = self.build_globals(jdwp, &mut encoder)?;
        let exception_msg = match ctx.event {
            PointEvent::Exception(exception) => Some(exception_message(jdwp, exception)?),
            _ => None,
        };
        let heap = self.heap.materialize(jdwp, &mut encoder)?;

        Ok(Candidate::Point(ExecutionPoint {
            stdout_delta: ctx.stdout,
            event: ctx.event.trace_event(),
            line: ctx.location.line,
            func_name: ctx.location.method_name.clone(),
            stack_to_render,
            globals,
            ordered_globals,
            heap,
            exception_msg,
        }))
    }

    fn build_frames<C: JdwpClient + ?Sized>(
        &self,
        jdwp: &mut C,
        encoder: &mut ValueEncoder,
        thread: ThreadId,
        mut return_value: Option<EncodedValue>,
        ticker: &mut FrameIdTicker,
    ) -> TraceResult<Vec<Frame>> {
        let infos = jdwp.frames(thread).map_err(|err| match err {
            JdwpError::IncompatibleThreadState(thread) => {
                TraceError::InconsistentThreadState { thread }
            }
            other => TraceError::Jdwp(other),
        })?;

        let mut frames = Vec::with_capacity(infos.len());
        for info in &infos {
            if !self.filter.reports_location(&info.location) {
                continue;
            }
            if self.hide_synthetic_frames && info.location.method_name.contains('$') {
                continue;
            }
            let is_top = frames.is_empty();
            let frame = self.frames.build(
                jdwp,
                encoder,
                info,
                is_top,
                return_value.take(),
                ticker.next_id(),
            )?;
            frames.push(frame);
        }
        Ok(frames)
    }

    fn build_globals<C: JdwpClient + ?Sized>(
        &self,
        jdwp: &mut C,
        encoder: &mut ValueEncoder,
    ) -> TraceResult<(IndexMap<String, EncodedValue>, Vec<String>)> {
        let mut globals = IndexMap::new();
        let mut ordered = Vec::new();
        for class in &self.classes {
            if !jdwp.is_initialized(class.id)? {
                continue;
            }
            for (field, value) in jdwp.static_values(class.id)? {
                let name = format!("{}.{}", class.name, field.name);
                let encoded = encoder.encode(&value);
                if globals.insert(name.clone(), encoded).is_none() {
                    ordered.push(name);
                }
            }
        }
        Ok((globals, ordered))
    }
}

/// `"<type>: <message>"` for a thrown exception.
///
/// Reads the throwable's internal message field, which is a convention of the
/// runtime rather than a guaranteed interface. Only a disconnect is propagated.
fn exception_message<C: JdwpClient + ?Sized>(
    jdwp: &mut C,
    exception: &ObjectRef,
) -> Result<String, JdwpError> {
    let type_name = &exception.runtime_type;
    let message = match jdwp.field_value(exception.id, DETAIL_MESSAGE_FIELD) {
        Ok(JdwpValue::Null) => return Ok(type_name.clone()),
        Ok(JdwpValue::Object(obj)) if obj.id == 0 => return Ok(type_name.clone()),
        Ok(JdwpValue::Object(obj)) if obj.kind == ObjectKind::String => {
            jdwp.string_value(obj.id)
        }
        Ok(other) => Err(JdwpError::Other(format!(
            "unexpected {DETAIL_MESSAGE_FIELD} value {other:?}"
        ))),
        Err(err) => Err(err),
    };
    match message {
        Ok(message) => Ok(format!("{type_name}: {message}")),
        Err(JdwpError::VmDisconnected) => Err(JdwpError::VmDisconnected),
        Err(err) => {
            tracing::debug!(
                target: "nova.trace",
                exception = %type_name,
                error = %err,
                "exception message lookup failed"
            );
            Ok(format!("{type_name}: <message unavailable>"))
        }
    }
}
