use std::collections::HashSet;
use std::sync::Arc;

use nova_jdwp::{JdwpClient, JdwpError, ObjectId, ObjectKind, ObjectRef};

use crate::encode::ValueEncoder;
use crate::filter::NamespaceFilter;
use crate::model::{EncodedObject, Heap};

/// Materializes every object queued in a [`ValueEncoder`] into a flat heap map.
///
/// Materializing an object may queue further objects; the loop runs until the
/// queue is empty. The visited set only grows, so cyclic graphs terminate.
pub struct HeapGrapher {
    filter: Arc<NamespaceFilter>,
}

impl HeapGrapher {
    pub fn new(filter: Arc<NamespaceFilter>) -> Self {
        Self { filter }
    }

    pub fn materialize<C: JdwpClient + ?Sized>(
        &self,
        jdwp: &mut C,
        encoder: &mut ValueEncoder,
    ) -> Result<Heap, JdwpError> {
        let mut heap = Heap::new();
        let mut visited: HashSet<ObjectId> = HashSet::new();
        while let Some(obj) = encoder.take_next() {
            if !visited.insert(obj.id) {
                continue;
            }
            let encoded = self.materialize_one(jdwp, encoder, &obj)?;
            heap.insert(obj.id, encoded);
        }
        Ok(heap)
    }

    fn materialize_one<C: JdwpClient + ?Sized>(
        &self,
        jdwp: &mut C,
        encoder: &mut ValueEncoder,
        obj: &ObjectRef,
    ) -> Result<EncodedObject, JdwpError> {
        match obj.kind {
            ObjectKind::Array => {
                let values = jdwp.array_values(obj.id)?;
                Ok(EncodedObject::List(
                    values.iter().map(|value| encoder.encode(value)).collect(),
                ))
            }
            ObjectKind::String => Ok(EncodedObject::String(jdwp.string_value(obj.id)?)),
            ObjectKind::Instance if !self.filter.shows_guts(&obj.runtime_type) => {
                Ok(EncodedObject::Instance {
                    type_name: obj.runtime_type.clone(),
                    fields: Vec::new(),
                })
            }
            ObjectKind::Instance => {
                let fields = jdwp
                    .field_values(obj.id)?
                    .into_iter()
                    .filter(|(field, _)| !field.is_static)
                    .map(|(field, value)| (field.name, encoder.encode(&value)))
                    .collect();
                Ok(EncodedObject::Instance {
                    type_name: obj.runtime_type.clone(),
                    fields,
                })
            }
        }
    }
}
