use std::io::Read;
use std::thread;

use tokio::sync::mpsc;

const READ_CHUNK: usize = 2048;

/// Non-blocking view over one debuggee output stream.
///
/// Bytes arrive on a channel (fed by a reader thread or a test double) and are
/// drained without waiting. A trailing incomplete UTF-8 sequence is held back
/// until the rest of it arrives.
#[derive(Debug)]
pub struct OutputCapture {
    rx: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
    partial: Vec<u8>,
}

impl OutputCapture {
    /// A capture that never yields anything.
    pub fn disconnected() -> Self {
        Self {
            rx: None,
            partial: Vec::new(),
        }
    }

    pub fn from_channel(rx: mpsc::UnboundedReceiver<Vec<u8>>) -> Self {
        Self {
            rx: Some(rx),
            partial: Vec::new(),
        }
    }

    /// Forward `reader` into a new capture from a dedicated thread.
    pub fn spawn_reader<R>(name: &str, mut reader: R) -> std::io::Result<Self>
    where
        R: Read + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let stream = name.to_string();
        thread::Builder::new()
            .name(format!("trace-{name}"))
            .spawn(move || {
                let mut buf = [0u8; READ_CHUNK];
                loop {
                    match reader.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => {
                            if tx.send(buf[..n].to_vec()).is_err() {
                                break;
                            }
                        }
                        Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                        Err(err) => {
                            tracing::debug!(target: "nova.trace", stream = %stream, error = %err, "output reader stopped");
                            break;
                        }
                    }
                }
            })?;
        Ok(Self::from_channel(rx))
    }

    /// Everything available right now, decoded as UTF-8.
    pub fn drain_available(&mut self) -> String {
        if let Some(rx) = self.rx.as_mut() {
            while let Ok(chunk) = rx.try_recv() {
                self.partial.extend_from_slice(&chunk);
            }
        }
        if self.partial.is_empty() {
            return String::new();
        }

        let keep = incomplete_tail_len(&self.partial);
        let tail = self.partial.split_off(self.partial.len() - keep);
        let complete = std::mem::replace(&mut self.partial, tail);
        String::from_utf8_lossy(&complete).into_owned()
    }
}

/// Length of a trailing, possibly-valid-but-unfinished UTF-8 sequence.
fn incomplete_tail_len(bytes: &[u8]) -> usize {
    let start = bytes.len().saturating_sub(3);
    for i in (start..bytes.len()).rev() {
        let byte = bytes[i];
        if byte & 0b1100_0000 == 0b1000_0000 {
            // Continuation byte; keep looking for the lead byte.
            continue;
        }
        let needed = match byte {
            b if b & 0b1110_0000 == 0b1100_0000 => 2,
            b if b & 0b1111_0000 == 0b1110_0000 => 3,
            b if b & 0b1111_1000 == 0b1111_0000 => 4,
            _ => return 0,
        };
        let have = bytes.len() - i;
        return if have < needed { have } else { 0 };
    }
    0
}
