use nova_config::TraceConfig;
use nova_jdwp::{JdwpValue, MockJdwpClient, MockVariable};
use nova_trace::{spawn_trace, trace_program, OutputCapture, TraceError, TraceSession};

use crate::harness::{main_frame, step_in_main};

fn two_lines() -> MockJdwpClient {
    let mut jdwp = MockJdwpClient::new();
    jdwp.push_event_set(step_in_main(3, main_frame(3)));
    jdwp.push_event_set(
        step_in_main(
            4,
            main_frame(4).with_variable(MockVariable::local("s", 1, JdwpValue::Int(9))),
        )
        .with_stdout("9\n"),
    );
    jdwp
}

#[test]
fn trace_program_runs_on_the_calling_thread() {
    let mut jdwp = two_lines();
    let stdout = OutputCapture::from_channel(jdwp.stdout_channel());
    let session = TraceSession::new(jdwp, "Main").with_stdout(stdout);

    let trace = trace_program(session, &TraceConfig::default()).unwrap();
    let outputs: Vec<_> = trace.points().map(|p| p.stdout_delta.as_str()).collect();
    assert_eq!(outputs, vec!["", "9\n"]);
}

#[tokio::test]
async fn spawn_trace_runs_on_a_blocking_worker() {
    let session = TraceSession::new(two_lines(), "Main");
    let trace = spawn_trace(session, TraceConfig::default()).await.unwrap();
    assert_eq!(trace.points().count(), 2);
}

#[tokio::test]
async fn spawn_trace_reports_missing_entry_point() {
    let session = TraceSession::new(MockJdwpClient::new(), "Greeter");
    let err = spawn_trace(session, TraceConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TraceError::EntryPointNotFound { ref entry_point } if entry_point == "Greeter"
    ));
}

#[test]
fn stderr_is_drained_without_reaching_the_trace() {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    tx.send(b"warning: something\n".to_vec()).unwrap();
    let session =
        TraceSession::new(two_lines(), "Main").with_stderr(OutputCapture::from_channel(rx));

    let trace = trace_program(session, &TraceConfig::default()).unwrap();
    assert!(trace.points().all(|p| !p.stdout_delta.contains("warning")));
}
