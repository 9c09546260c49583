use crate::model::{EncodedValue, ExecutionPoint, Heap, TraceEvent, RETURN_MARKER};
use crate::point::Candidate;

/// Suppresses candidates that do not change the rendered state and folds
/// deferred return values into the last accepted point.
#[derive(Debug, Default)]
pub struct DedupEngine {
    last: Option<ExecutionPoint>,
}

impl DedupEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<&ExecutionPoint> {
        self.last.as_ref()
    }

    /// Returns the point to append to the trace, if any. An accepted point
    /// becomes the new baseline.
    ///
    /// A candidate carrying new output is never a duplicate. Patched returns
    /// go through the same check, so a patch that changes nothing is dropped.
    pub fn offer(&mut self, candidate: Candidate) -> Option<ExecutionPoint> {
        let point = match candidate {
            Candidate::Point(point) => point,
            Candidate::ReturnPatch {
                line,
                value,
                heap,
                stdout,
            } => {
                let Some(baseline) = self.last.as_ref() else {
                    tracing::debug!(target: "nova.trace", line, "return before any accepted point; dropped");
                    return None;
                };
                let mut patched = patch_return(baseline, line, value);
                merge_heap(&mut patched.heap, heap);
                patched.stdout_delta = stdout;
                patched
            }
        };
        let unchanged = self
            .last
            .as_ref()
            .is_some_and(|last| last.same_state(&point));
        if unchanged && point.stdout_delta.is_empty() {
            return None;
        }
        self.last = Some(point.clone());
        Some(point)
    }
}

/// Build a `return` point from `baseline`, injecting `value` into its first
/// frame. A baseline without frames is returned unchanged.
pub fn patch_return(baseline: &ExecutionPoint, line: u32, value: EncodedValue) -> ExecutionPoint {
    let mut patched = baseline.clone();
    let Some(top) = patched.stack_to_render.first_mut() else {
        return patched;
    };
    top.push_local(RETURN_MARKER, value);
    patched.event = TraceEvent::Return;
    patched.line = line;
    patched
}

fn merge_heap(into: &mut Heap, extra: Heap) {
    for (id, object) in extra {
        into.entry(id).or_insert(object);
    }
}
