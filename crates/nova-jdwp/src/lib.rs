//! Java Debug Wire Protocol (JDWP) client façade for Nova.
//!
//! `nova-trace` consumes this crate to drive a suspended debuggee one event set
//! at a time: it subscribes to method entry/exit, exception, class-prepare and
//! thread-death events, arms single-step requests, and reads frames, locals,
//! statics and heap objects while the VM is stopped.
//!
//! The [`JdwpClient`] trait is intentionally blocking. The tracer runs on a
//! single dedicated worker and every read happens while the debuggee is fully
//! suspended, so there is nothing to gain from an async surface here.

mod mock;

use std::fmt;
use std::io;

use thiserror::Error;

pub use mock::{
    MockClass, MockEventSet, MockFrame, MockJdwpClient, MockObject, MockRequest, MockVariable,
};

pub type ThreadId = u64;
pub type FrameId = u64;
pub type ObjectId = u64;
pub type ReferenceTypeId = u64;
pub type RequestId = i32;

#[derive(Clone, Debug, PartialEq)]
pub enum JdwpValue {
    Null,
    Void,
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Char(char),
    Object(ObjectRef),
}

impl JdwpValue {
    pub fn object_id(&self) -> Option<ObjectId> {
        match self {
            Self::Object(obj) => Some(obj.id),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }
}

/// Shape of a heap object as reported by its JDWP tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Array,
    String,
    Instance,
}

impl ObjectKind {
    /// Maps a JDWP value tag (`[`, `s`, `L`, `t`, ...) to an object kind.
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            b'[' => Self::Array,
            b's' => Self::String,
            _ => Self::Instance,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ObjectRef {
    pub id: ObjectId,
    pub runtime_type: String,
    pub kind: ObjectKind,
}

impl ObjectRef {
    pub fn instance(id: ObjectId, runtime_type: impl Into<String>) -> Self {
        Self {
            id,
            runtime_type: runtime_type.into(),
            kind: ObjectKind::Instance,
        }
    }

    pub fn array(id: ObjectId, runtime_type: impl Into<String>) -> Self {
        Self {
            id,
            runtime_type: runtime_type.into(),
            kind: ObjectKind::Array,
        }
    }

    pub fn string(id: ObjectId) -> Self {
        Self {
            id,
            runtime_type: "java.lang.String".to_string(),
            kind: ObjectKind::String,
        }
    }
}

/// An executable code position: declaring type, method and source line.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Location {
    pub class_name: String,
    pub method_name: String,
    pub line: u32,
}

impl Location {
    pub fn new(class_name: impl Into<String>, method_name: impl Into<String>, line: u32) -> Self {
        Self {
            class_name: class_name.into(),
            method_name: method_name.into(),
            line,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}:{}", self.class_name, self.method_name, self.line)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalVariable {
    pub name: String,
    pub is_argument: bool,
    /// Opaque identity assigned by the protocol layer.
    ///
    /// Not an ordering guarantee, but variables declared later in a method tend
    /// to receive larger identities, which the frame encoder uses as a hint.
    pub identity: i64,
}

impl LocalVariable {
    pub fn argument(name: impl Into<String>, identity: i64) -> Self {
        Self {
            name: name.into(),
            is_argument: true,
            identity,
        }
    }

    pub fn local(name: impl Into<String>, identity: i64) -> Self {
        Self {
            name: name.into(),
            is_argument: false,
            identity,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldInfo {
    pub name: String,
    pub is_static: bool,
}

impl FieldInfo {
    pub fn instance(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_static: false,
        }
    }

    pub fn static_field(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_static: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassInfo {
    pub id: ReferenceTypeId,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameInfo {
    pub id: FrameId,
    pub location: Location,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    SingleStep,
    Breakpoint,
    Exception,
    ThreadDeath,
    ClassPrepare,
    MethodEntry,
    MethodExit,
    VmDeath,
}

impl EventKind {
    /// JDWP `EventKind` constant.
    pub fn code(self) -> u8 {
        match self {
            EventKind::SingleStep => 1,
            EventKind::Breakpoint => 2,
            EventKind::Exception => 4,
            EventKind::ThreadDeath => 7,
            EventKind::ClassPrepare => 8,
            EventKind::MethodEntry => 40,
            EventKind::MethodExit => 42,
            EventKind::VmDeath => 99,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SuspendPolicy {
    None,
    EventThread,
    All,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepSize {
    /// Step by the smallest possible unit (a single bytecode instruction).
    Min,
    Line,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepDepth {
    Into,
    Over,
    Out,
}

#[derive(Clone, Debug, PartialEq)]
pub enum EventModifier {
    /// Report the event only once `count` occurrences have been seen.
    Count { count: u32 },
    ThreadOnly { thread: ThreadId },
    /// Suppress events located in classes matching `pattern` (`java.*`).
    ClassExclude { pattern: String },
    LocationOnly { location: Location },
    ExceptionOnly { caught: bool, uncaught: bool },
    Step {
        thread: ThreadId,
        size: StepSize,
        depth: StepDepth,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum JdwpEvent {
    MethodEntry {
        thread: ThreadId,
        location: Location,
    },
    MethodExit {
        thread: ThreadId,
        location: Location,
        return_value: JdwpValue,
    },
    Breakpoint {
        thread: ThreadId,
        location: Location,
    },
    SingleStep {
        thread: ThreadId,
        location: Location,
    },
    Exception {
        thread: ThreadId,
        location: Location,
        exception: ObjectRef,
        catch_location: Option<Location>,
    },
    ClassPrepare {
        thread: ThreadId,
        class: ClassInfo,
    },
    ThreadDeath {
        thread: ThreadId,
    },
    VmDeath,
    VmDisconnect,
}

impl JdwpEvent {
    /// Thread and code position for events that happen "at" a location.
    pub fn locatable(&self) -> Option<(ThreadId, &Location)> {
        match self {
            JdwpEvent::MethodEntry { thread, location }
            | JdwpEvent::MethodExit {
                thread, location, ..
            }
            | JdwpEvent::Breakpoint { thread, location }
            | JdwpEvent::SingleStep { thread, location }
            | JdwpEvent::Exception {
                thread, location, ..
            } => Some((*thread, location)),
            JdwpEvent::ClassPrepare { .. }
            | JdwpEvent::ThreadDeath { .. }
            | JdwpEvent::VmDeath
            | JdwpEvent::VmDisconnect => None,
        }
    }

    pub fn is_termination(&self) -> bool {
        matches!(self, JdwpEvent::VmDeath | JdwpEvent::VmDisconnect)
    }
}

/// A batch of events delivered together while the debuggee is suspended.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventSet {
    pub events: Vec<JdwpEvent>,
}

impl EventSet {
    pub fn new(events: Vec<JdwpEvent>) -> Self {
        Self { events }
    }
}

#[derive(Debug, Error)]
pub enum JdwpError {
    #[error("JDWP client is not connected")]
    NotConnected,
    #[error("target VM disconnected")]
    VmDisconnected,
    #[error("JDWP operation not implemented")]
    NotImplemented,
    #[error("no debug information available")]
    AbsentInformation,
    #[error("variable `{0}` is not in scope at the current location")]
    NotInScope(String),
    #[error("thread {0} is not suspended")]
    IncompatibleThreadState(ThreadId),
    #[error("invalid object id {0}")]
    InvalidObjectId(ObjectId),
    #[error("invalid frame id {0}")]
    InvalidFrameId(FrameId),
    #[error("JDWP protocol error: {0}")]
    Protocol(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("{0}")]
    Other(String),
}

/// Minimal, mock-friendly interface for the parts of JDWP the tracer drives.
///
/// Implementations are expected to report events only while the VM is fully
/// suspended (`SuspendPolicy::All` or the event thread for method events) and to
/// keep it suspended until [`JdwpClient::resume`] is called.
pub trait JdwpClient: Send {
    /// Register an event request and enable it.
    fn event_request_set(
        &mut self,
        kind: EventKind,
        suspend_policy: SuspendPolicy,
        modifiers: Vec<EventModifier>,
    ) -> Result<RequestId, JdwpError>;

    /// Disable and delete a previously registered request.
    fn event_request_clear(&mut self, kind: EventKind, request_id: RequestId)
        -> Result<(), JdwpError>;

    /// Block until the next event set arrives.
    ///
    /// `Ok(None)` means the event source is exhausted and no more events will
    /// ever be delivered.
    fn next_event_set(&mut self) -> Result<Option<EventSet>, JdwpError>;

    /// Resume everything suspended by the last event set.
    fn resume(&mut self) -> Result<(), JdwpError>;

    /// Ask the target VM to terminate with the given exit code.
    fn exit(&mut self, code: i32) -> Result<(), JdwpError>;

    /// All frames of a suspended thread, innermost first.
    fn frames(&mut self, thread: ThreadId) -> Result<Vec<FrameInfo>, JdwpError>;

    /// `this` of the frame, if the method is not static.
    fn this_object(&mut self, frame: FrameId) -> Result<Option<ObjectRef>, JdwpError>;

    /// Variable table of the frame's method. Arguments are reported in
    /// signature order before other locals.
    fn variables(&mut self, frame: FrameId) -> Result<Vec<LocalVariable>, JdwpError>;

    /// Value of `variable` in `frame`; [`JdwpError::NotInScope`] when the
    /// variable is not live at the frame's current location.
    fn variable_value(
        &mut self,
        frame: FrameId,
        variable: &LocalVariable,
    ) -> Result<JdwpValue, JdwpError>;

    /// Every executable line location of a class.
    fn line_locations(&mut self, class: ReferenceTypeId) -> Result<Vec<Location>, JdwpError>;

    fn is_initialized(&mut self, class: ReferenceTypeId) -> Result<bool, JdwpError>;

    /// Visible static fields of a class together with their current values.
    fn static_values(
        &mut self,
        class: ReferenceTypeId,
    ) -> Result<Vec<(FieldInfo, JdwpValue)>, JdwpError>;

    fn array_values(&mut self, array: ObjectId) -> Result<Vec<JdwpValue>, JdwpError>;

    fn string_value(&mut self, string: ObjectId) -> Result<String, JdwpError>;

    /// Visible fields of an instance (inherited included) with their values.
    fn field_values(&mut self, object: ObjectId) -> Result<Vec<(FieldInfo, JdwpValue)>, JdwpError>;

    /// Value of a single named field, searched through the visible fields.
    fn field_value(&mut self, object: ObjectId, name: &str) -> Result<JdwpValue, JdwpError> {
        self.field_values(object)?
            .into_iter()
            .find(|(field, _)| field.name == name)
            .map(|(_, value)| value)
            .ok_or_else(|| JdwpError::Other(format!("no field `{name}` on object {object}")))
    }
}

impl<C: JdwpClient + ?Sized> JdwpClient for Box<C> {
    fn event_request_set(
        &mut self,
        kind: EventKind,
        suspend_policy: SuspendPolicy,
        modifiers: Vec<EventModifier>,
    ) -> Result<RequestId, JdwpError> {
        (**self).event_request_set(kind, suspend_policy, modifiers)
    }

    fn event_request_clear(
        &mut self,
        kind: EventKind,
        request_id: RequestId,
    ) -> Result<(), JdwpError> {
        (**self).event_request_clear(kind, request_id)
    }

    fn next_event_set(&mut self) -> Result<Option<EventSet>, JdwpError> {
        (**self).next_event_set()
    }

    fn resume(&mut self) -> Result<(), JdwpError> {
        (**self).resume()
    }

    fn exit(&mut self, code: i32) -> Result<(), JdwpError> {
        (**self).exit(code)
    }

    fn frames(&mut self, thread: ThreadId) -> Result<Vec<FrameInfo>, JdwpError> {
        (**self).frames(thread)
    }

    fn this_object(&mut self, frame: FrameId) -> Result<Option<ObjectRef>, JdwpError> {
        (**self).this_object(frame)
    }

    fn variables(&mut self, frame: FrameId) -> Result<Vec<LocalVariable>, JdwpError> {
        (**self).variables(frame)
    }

    fn variable_value(
        &mut self,
        frame: FrameId,
        variable: &LocalVariable,
    ) -> Result<JdwpValue, JdwpError> {
        (**self).variable_value(frame, variable)
    }

    fn line_locations(&mut self, class: ReferenceTypeId) -> Result<Vec<Location>, JdwpError> {
        (**self).line_locations(class)
    }

    fn is_initialized(&mut self, class: ReferenceTypeId) -> Result<bool, JdwpError> {
        (**self).is_initialized(class)
    }

    fn static_values(
        &mut self,
        class: ReferenceTypeId,
    ) -> Result<Vec<(FieldInfo, JdwpValue)>, JdwpError> {
        (**self).static_values(class)
    }

    fn array_values(&mut self, array: ObjectId) -> Result<Vec<JdwpValue>, JdwpError> {
        (**self).array_values(array)
    }

    fn string_value(&mut self, string: ObjectId) -> Result<String, JdwpError> {
        (**self).string_value(string)
    }

    fn field_values(&mut self, object: ObjectId) -> Result<Vec<(FieldInfo, JdwpValue)>, JdwpError> {
        (**self).field_values(object)
    }

    fn field_value(&mut self, object: ObjectId, name: &str) -> Result<JdwpValue, JdwpError> {
        (**self).field_value(object, name)
    }
}
