use std::collections::BTreeMap;

use nova_jdwp::{JdwpValue, ObjectId, ObjectRef};

use crate::model::{EncodedValue, VOID_LITERAL};

/// Encodes runtime values for one execution point.
///
/// Objects are never inlined: encoding one queues it for the heap grapher and
/// returns a reference. The queue is keyed by object id so that materialization
/// order is deterministic (lowest id first).
#[derive(Debug, Default)]
pub struct ValueEncoder {
    pending: BTreeMap<ObjectId, ObjectRef>,
}

impl ValueEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encode(&mut self, value: &JdwpValue) -> EncodedValue {
        match value {
            JdwpValue::Null => EncodedValue::Null,
            JdwpValue::Void => EncodedValue::Literal(VOID_LITERAL.to_string()),
            JdwpValue::Boolean(v) => EncodedValue::Bool(*v),
            JdwpValue::Byte(v) => EncodedValue::Int(i64::from(*v)),
            JdwpValue::Short(v) => EncodedValue::Int(i64::from(*v)),
            JdwpValue::Int(v) => EncodedValue::Int(i64::from(*v)),
            JdwpValue::Long(v) => EncodedValue::Int(*v),
            JdwpValue::Float(v) => EncodedValue::Real(f64::from(*v)),
            JdwpValue::Double(v) => EncodedValue::Real(*v),
            JdwpValue::Char(c) => EncodedValue::Literal(c.to_string()),
            JdwpValue::Object(obj) => self.encode_object(obj),
        }
    }

    pub fn encode_object(&mut self, obj: &ObjectRef) -> EncodedValue {
        // Object id 0 is the protocol's null reference.
        if obj.id == 0 {
            return EncodedValue::Null;
        }
        self.pending.entry(obj.id).or_insert_with(|| obj.clone());
        EncodedValue::Ref(obj.id)
    }

    /// Pop the lowest pending object.
    pub fn take_next(&mut self) -> Option<ObjectRef> {
        self.pending.pop_first().map(|(_, obj)| obj)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
