use nova_jdwp::{FrameInfo, JdwpClient, JdwpError, LocalVariable};

use crate::encode::ValueEncoder;
use crate::model::{EncodedValue, Frame, RETURN_MARKER};

/// Source of the volatile per-frame ids.
///
/// Owned by the stepping controller and handed to each point build, so tests can
/// construct frames with known ids.
#[derive(Debug)]
pub struct FrameIdTicker {
    next: u64,
}

impl FrameIdTicker {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn starting_at(next: u64) -> Self {
        Self { next }
    }

    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }
}

impl Default for FrameIdTicker {
    fn default() -> Self {
        Self::new()
    }
}

/// Encodes one stack frame: receiver, then arguments, then locals.
#[derive(Debug, Default)]
pub struct FrameBuilder;

impl FrameBuilder {
    pub fn build<C: JdwpClient + ?Sized>(
        &self,
        jdwp: &mut C,
        encoder: &mut ValueEncoder,
        info: &FrameInfo,
        is_top: bool,
        return_value: Option<EncodedValue>,
        frame_id: u64,
    ) -> Result<Frame, JdwpError> {
        let func_name = format!("{}:{}", info.location.method_name, info.location.line);
        let mut frame = Frame::new(func_name, is_top, frame_id);

        if let Some(this) = jdwp.this_object(info.id)? {
            let value = encoder.encode_object(&this);
            frame.push_local("this", value);
        }

        match jdwp.variables(info.id) {
            Ok(variables) => self.push_variables(jdwp, encoder, info, variables, &mut frame)?,
            Err(JdwpError::AbsentInformation) => {
                tracing::debug!(
                    target: "nova.trace",
                    location = %info.location,
                    "no local variable table; rendering receiver only"
                );
            }
            Err(err) => return Err(err),
        }

        if let Some(value) = return_value {
            frame.push_local(RETURN_MARKER, value);
        }
        Ok(frame)
    }

    fn push_variables<C: JdwpClient + ?Sized>(
        &self,
        jdwp: &mut C,
        encoder: &mut ValueEncoder,
        info: &FrameInfo,
        variables: Vec<LocalVariable>,
        frame: &mut Frame,
    ) -> Result<(), JdwpError> {
        let mut locals = Vec::new();
        for variable in variables {
            let value = match jdwp.variable_value(info.id, &variable) {
                Ok(value) => value,
                Err(JdwpError::NotInScope(name)) => {
                    tracing::trace!(target: "nova.trace", variable = %name, "not in scope yet");
                    continue;
                }
                Err(err) => return Err(err),
            };
            if variable.is_argument {
                let encoded = encoder.encode(&value);
                frame.push_local(variable.name, encoded);
            } else if !variable.name.ends_with('$') {
                locals.push((variable, value));
            }
        }

        // The protocol does not expose declaration order for locals. Identities
        // tend to grow with declaration order, so sort on the offset from the
        // first live local. Not reliable across nested scopes.
        let base = locals.first().map(|(var, _)| var.identity).unwrap_or_default();
        let mut keyed: Vec<_> = locals
            .into_iter()
            .enumerate()
            .map(|(index, (var, value))| ((var.identity.wrapping_sub(base), index), var, value))
            .collect();
        keyed.sort_by_key(|(key, _, _)| *key);

        for (_, variable, value) in keyed {
            let encoded = encoder.encode(&value);
            frame.push_local(variable.name, encoded);
        }
        Ok(())
    }
}
