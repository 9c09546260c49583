use nova_config::TraceConfig;
use nova_jdwp::JdwpClient;

use crate::controller::{Trace, TraceController};
use crate::error::{TraceError, TraceResult};
use crate::output::OutputCapture;

/// A debuggee that has been launched, attached to the debug protocol and is
/// waiting at its first event, together with its output streams.
pub struct TraceSession<C> {
    pub jdwp: C,
    /// Class whose `main` is being traced.
    pub entry_point: String,
    pub stdout: OutputCapture,
    pub stderr: OutputCapture,
}

impl<C> TraceSession<C> {
    pub fn new(jdwp: C, entry_point: impl Into<String>) -> Self {
        Self {
            jdwp,
            entry_point: entry_point.into(),
            stdout: OutputCapture::disconnected(),
            stderr: OutputCapture::disconnected(),
        }
    }

    pub fn with_stdout(mut self, stdout: OutputCapture) -> Self {
        self.stdout = stdout;
        self
    }

    pub fn with_stderr(mut self, stderr: OutputCapture) -> Self {
        self.stderr = stderr;
        self
    }
}

/// Trace `session` to completion on the calling thread.
pub fn trace_program<C: JdwpClient>(
    session: TraceSession<C>,
    config: &TraceConfig,
) -> TraceResult<Trace> {
    let TraceSession {
        jdwp,
        entry_point,
        stdout,
        stderr,
    } = session;
    tracing::debug!(
        target: "nova.trace",
        entry_point = %entry_point,
        max_steps = config.max_steps,
        "tracing program"
    );
    TraceController::new(jdwp, entry_point, config)
        .with_output(stdout, stderr)
        .run()
}

/// Trace `session` on a dedicated blocking worker.
pub async fn spawn_trace<C>(session: TraceSession<C>, config: TraceConfig) -> TraceResult<Trace>
where
    C: JdwpClient + 'static,
{
    tokio::task::spawn_blocking(move || trace_program(session, &config))
        .await
        .map_err(|err| TraceError::Join(err.to_string()))?
}
