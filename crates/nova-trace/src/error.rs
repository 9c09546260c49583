use nova_jdwp::ThreadId;
use thiserror::Error;

pub type TraceResult<T> = Result<T, TraceError>;

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("jdwp: {0}")]
    Jdwp(#[from] nova_jdwp::JdwpError),
    #[error("Did not find: public static void {entry_point}.main(String[])")]
    EntryPointNotFound { entry_point: String },
    #[error("only one debuggee thread is supported (saw thread {first}, then thread {second})")]
    MultipleThreads { first: ThreadId, second: ThreadId },
    #[error("thread {thread} was expected to be suspended")]
    InconsistentThreadState { thread: ThreadId },
    #[error("trace worker failed: {0}")]
    Join(String),
}

impl TraceError {
    /// Whether the error means the debuggee has gone away rather than that the
    /// trace itself is broken.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, TraceError::Jdwp(nova_jdwp::JdwpError::VmDisconnected))
    }
}
