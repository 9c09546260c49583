//! Render-ready trace records.
//!
//! Everything here is plain value data: built once per execution point and never
//! mutated afterwards (return patching builds a new point from an old one).
//! Heap objects live in one flat map keyed by object id and are cited by
//! [`EncodedValue::Ref`] everywhere else, so cyclic object graphs stay finite.

use indexmap::IndexMap;
use nova_jdwp::ObjectId;
use serde::ser::{SerializeSeq, Serializer};
use serde::Serialize;

/// Reserved local name under which a method's return value is shown.
pub const RETURN_MARKER: &str = "__return__";

/// Literal used for the "no value" result of a `void` method.
pub const VOID_LITERAL: &str = "<VOID>";

/// The heap of one execution point, in materialization order.
pub type Heap = IndexMap<ObjectId, EncodedObject>;

#[derive(Clone, Debug)]
pub enum EncodedValue {
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    Literal(String),
    Ref(ObjectId),
}

impl PartialEq for EncodedValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            // Bitwise so that a NaN local does not make every step look new.
            (Self::Real(a), Self::Real(b)) => a.to_bits() == b.to_bits(),
            (Self::Literal(a), Self::Literal(b)) => a == b,
            (Self::Ref(a), Self::Ref(b)) => a == b,
            _ => false,
        }
    }
}

impl Serialize for EncodedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            EncodedValue::Null => serializer.serialize_unit(),
            EncodedValue::Bool(b) => serializer.serialize_bool(*b),
            EncodedValue::Int(v) => serializer.serialize_i64(*v),
            EncodedValue::Real(v) if v.is_nan() => serializer.serialize_str("NaN"),
            EncodedValue::Real(v) if v.is_infinite() => {
                serializer.serialize_str(if *v > 0.0 { "Infinity" } else { "-Infinity" })
            }
            EncodedValue::Real(v) => serializer.serialize_f64(*v),
            EncodedValue::Literal(text) => serializer.serialize_str(text),
            EncodedValue::Ref(id) => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element("REF")?;
                seq.serialize_element(id)?;
                seq.end()
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum EncodedObject {
    List(Vec<EncodedValue>),
    /// A string object, shown as its text but still addressed by id.
    String(String),
    Instance {
        type_name: String,
        fields: Vec<(String, EncodedValue)>,
    },
}

impl Serialize for EncodedObject {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            EncodedObject::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len() + 1))?;
                seq.serialize_element("LIST")?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            EncodedObject::String(text) => {
                let mut seq = serializer.serialize_seq(Some(3))?;
                seq.serialize_element("HEAP_PRIMITIVE")?;
                seq.serialize_element("String")?;
                seq.serialize_element(text)?;
                seq.end()
            }
            EncodedObject::Instance { type_name, fields } => {
                let mut seq = serializer.serialize_seq(Some(fields.len() + 2))?;
                seq.serialize_element("INSTANCE")?;
                seq.serialize_element(type_name)?;
                for field in fields {
                    seq.serialize_element(field)?;
                }
                seq.end()
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceEvent {
    Call,
    Return,
    StepLine,
    Exception,
    InstructionLimitReached,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Frame {
    pub func_name: String,
    pub encoded_locals: IndexMap<String, EncodedValue>,
    pub ordered_varnames: Vec<String>,
    pub parent_frame_id_list: Vec<u64>,
    pub is_highlighted: bool,
    pub is_zombie: bool,
    pub is_parent: bool,
    /// Volatile: regenerated for every execution point.
    pub unique_hash: String,
    /// Volatile: regenerated for every execution point.
    pub frame_id: u64,
}

impl Frame {
    pub fn new(func_name: String, is_highlighted: bool, frame_id: u64) -> Self {
        Self {
            func_name,
            encoded_locals: IndexMap::new(),
            ordered_varnames: Vec::new(),
            parent_frame_id_list: Vec::new(),
            is_highlighted,
            is_zombie: false,
            is_parent: false,
            unique_hash: frame_id.to_string(),
            frame_id,
        }
    }

    /// Append a variable, keeping the locals map and the name list in step.
    pub fn push_local(&mut self, name: impl Into<String>, value: EncodedValue) {
        let name = name.into();
        if self.encoded_locals.insert(name.clone(), value).is_none() {
            self.ordered_varnames.push(name);
        }
    }

    /// Structural equality ignoring `frame_id` and `unique_hash`.
    pub fn same_content(&self, other: &Self) -> bool {
        self.func_name == other.func_name
            && self.encoded_locals == other.encoded_locals
            && self.ordered_varnames == other.ordered_varnames
            && self.parent_frame_id_list == other.parent_frame_id_list
            && self.is_highlighted == other.is_highlighted
            && self.is_zombie == other.is_zombie
            && self.is_parent == other.is_parent
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExecutionPoint {
    /// Debuggee output produced since the previous accepted point.
    #[serde(rename = "stdout")]
    pub stdout_delta: String,
    pub event: TraceEvent,
    pub line: u32,
    pub func_name: String,
    /// Innermost frame first.
    pub stack_to_render: Vec<Frame>,
    pub globals: IndexMap<String, EncodedValue>,
    pub ordered_globals: Vec<String>,
    pub heap: Heap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception_msg: Option<String>,
}

impl ExecutionPoint {
    /// Equality used for deduplication. Frame identities and the stdout delta
    /// are not part of the rendered state and are not compared.
    pub fn same_state(&self, other: &Self) -> bool {
        self.event == other.event
            && self.line == other.line
            && self.func_name == other.func_name
            && self.globals == other.globals
            && self.ordered_globals == other.ordered_globals
            && self.heap_in_order(other)
            && self.exception_msg == other.exception_msg
            && self.stack_to_render.len() == other.stack_to_render.len()
            && self
                .stack_to_render
                .iter()
                .zip(&other.stack_to_render)
                .all(|(a, b)| a.same_content(b))
    }

    fn heap_in_order(&self, other: &Self) -> bool {
        self.heap.len() == other.heap.len()
            && self
                .heap
                .iter()
                .zip(&other.heap)
                .all(|(a, b)| a == b)
    }
}

/// A trace entry that is not a full execution point: the step-budget marker or
/// a failure surfaced through the same viewer.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TraceMarker {
    pub event: TraceEvent,
    pub exception_msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
}

impl TraceMarker {
    pub fn limit_reached(message: impl Into<String>) -> Self {
        Self {
            event: TraceEvent::InstructionLimitReached,
            exception_msg: message.into(),
            line: None,
            offset: None,
        }
    }

    pub fn error(message: impl Into<String>, line: u32, offset: u32) -> Self {
        Self {
            event: TraceEvent::Exception,
            exception_msg: message.into(),
            line: Some(line),
            offset: Some(offset),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TraceStep {
    Point(ExecutionPoint),
    Marker(TraceMarker),
}

impl TraceStep {
    pub fn as_point(&self) -> Option<&ExecutionPoint> {
        match self {
            TraceStep::Point(point) => Some(point),
            TraceStep::Marker(_) => None,
        }
    }

    pub fn event(&self) -> TraceEvent {
        match self {
            TraceStep::Point(point) => point.event,
            TraceStep::Marker(marker) => marker.event,
        }
    }
}
