use nova_config::TraceConfig;
use nova_jdwp::{
    ClassInfo, EventKind, EventModifier, JdwpEvent, JdwpValue, Location, MockClass, MockEventSet,
    MockFrame, MockJdwpClient, MockVariable, ObjectRef, SuspendPolicy,
};
use nova_trace::{TraceError, TraceEvent, TraceStep};

use crate::harness::{
    config_with_steps, main_frame, run, step, step_in_main, DisconnectingClient, MAIN_THREAD,
};

fn counting_steps(count: i32) -> MockJdwpClient {
    let mut jdwp = MockJdwpClient::new();
    for i in 0..count {
        jdwp.push_event_set(step_in_main(
            3,
            main_frame(3).with_variable(MockVariable::local("i", 1, JdwpValue::Int(i))),
        ));
    }
    jdwp
}

#[test]
fn step_budget_stops_the_debuggee_with_a_marker() {
    let (result, jdwp) = run(counting_steps(10), &config_with_steps(3));
    let trace = result.unwrap();

    assert_eq!(trace.points().count(), 3);
    assert_eq!(trace.steps.len(), 4);
    assert!(trace.limit_reached);
    match trace.steps.last() {
        Some(TraceStep::Marker(marker)) => {
            assert_eq!(marker.event, TraceEvent::InstructionLimitReached);
            assert_eq!(marker.exception_msg, "<ran for maximum execution time limit>");
        }
        other => panic!("expected the limit marker last, got {other:?}"),
    }
    assert_eq!(jdwp.exit_code, Some(0));
    assert_eq!(jdwp.remaining_event_sets(), 0);
}

#[test]
fn natural_completion_has_no_marker() {
    let (result, jdwp) = run(counting_steps(4), &config_with_steps(10));
    let trace = result.unwrap();
    assert_eq!(trace.steps.len(), 4);
    assert!(!trace.limit_reached);
    assert!(trace
        .steps
        .iter()
        .all(|step| step.event() == TraceEvent::StepLine));
    assert_eq!(jdwp.exit_code, None);
}

#[test]
fn at_most_one_step_request_is_live() {
    let (result, jdwp) = run(counting_steps(10), &TraceConfig::default());
    result.unwrap();

    assert_eq!(jdwp.max_live_step_requests(), 1);
    let created = jdwp.requests_of_kind(EventKind::SingleStep);
    assert_eq!(created.len(), 10);
    assert!(created
        .iter()
        .all(|req| req.suspend_policy == SuspendPolicy::All));
    // Every step request but the last armed one was cleared again.
    assert_eq!(jdwp.cleared_requests.len(), 9);
}

#[test]
fn library_only_activity_means_entry_point_not_found() {
    let mut jdwp = MockJdwpClient::new();
    for line in [10, 11, 12] {
        let location = Location::new("java.lang.ClassLoader", "loadClass", line);
        jdwp.push_event_set(
            MockEventSet::new(vec![JdwpEvent::SingleStep {
                thread: MAIN_THREAD,
                location: location.clone(),
            }])
            .with_stack(MAIN_THREAD, vec![MockFrame::new(location)]),
        );
    }

    let (result, jdwp) = run(jdwp, &TraceConfig::default());
    let err = result.unwrap_err();
    assert!(matches!(
        err,
        TraceError::EntryPointNotFound { ref entry_point } if entry_point == "Main"
    ));
    assert_eq!(
        err.to_string(),
        "Did not find: public static void Main.main(String[])"
    );
    assert!(jdwp.requests_of_kind(EventKind::SingleStep).is_empty());
}

#[test]
fn library_frames_neither_produce_points_nor_arm_steps() {
    let mut jdwp = MockJdwpClient::new();
    jdwp.push_event_set(step_in_main(3, main_frame(3)));
    let println = Location::new("java.io.PrintStream", "println", 800);
    jdwp.push_event_set(
        MockEventSet::new(vec![JdwpEvent::SingleStep {
            thread: MAIN_THREAD,
            location: println.clone(),
        }])
        .with_stack(MAIN_THREAD, vec![MockFrame::new(println), main_frame(3)]),
    );
    jdwp.push_event_set(step_in_main(4, main_frame(4)));

    let (result, jdwp) = run(jdwp, &TraceConfig::default());
    let lines: Vec<_> = result.unwrap().points().map(|p| p.line).collect();
    assert_eq!(lines, vec![3, 4]);
    assert_eq!(jdwp.requests_of_kind(EventKind::SingleStep).len(), 2);
}

#[test]
fn second_thread_is_fatal() {
    let mut jdwp = MockJdwpClient::new();
    jdwp.push_event_set(step_in_main(3, main_frame(3)));
    jdwp.push_event_set(
        MockEventSet::new(vec![JdwpEvent::SingleStep {
            thread: 2,
            location: Location::new("Main", "run", 20),
        }])
        .with_stack(2, vec![MockFrame::new(Location::new("Main", "run", 20))]),
    );

    let (result, _) = run(jdwp, &TraceConfig::default());
    assert!(matches!(
        result,
        Err(TraceError::MultipleThreads {
            first: 1,
            second: 2
        })
    ));
}

#[test]
fn running_thread_during_a_build_is_fatal() {
    let mut jdwp = MockJdwpClient::new();
    jdwp.push_event_set(step_in_main(3, main_frame(3)));
    jdwp.push_event_set(step_in_main(4, main_frame(4)).with_thread_running());

    let (result, _) = run(jdwp, &TraceConfig::default());
    assert!(matches!(
        result,
        Err(TraceError::InconsistentThreadState { thread: 1 })
    ));
}

#[test]
fn disconnect_mid_batch_drains_until_vm_disconnect() {
    let mut inner = MockJdwpClient::new();
    inner.push_event_set(step_in_main(3, main_frame(3)));
    inner.push_event_set(step_in_main(4, main_frame(4)));
    inner.push_event_set(step_in_main(5, main_frame(5)));
    inner.push_event_set(MockEventSet::new(vec![JdwpEvent::VmDeath]));
    inner.push_event_set(MockEventSet::new(vec![JdwpEvent::VmDisconnect]));
    inner.push_event_set(step_in_main(6, main_frame(6)));

    let mut controller = nova_trace::TraceController::new(
        DisconnectingClient::new(inner, 1),
        "Main",
        &TraceConfig::default(),
    );
    let trace = controller.run().unwrap();

    let lines: Vec<_> = trace.points().map(|p| p.line).collect();
    assert_eq!(lines, vec![3]);
    assert!(controller.vm_died());
    assert_eq!(controller.state(), nova_trace::ControllerState::Done);
    // The step at line 5 was consumed by the drain, the one at line 6 never was.
    assert_eq!(controller.jdwp().inner.remaining_event_sets(), 1);
}

#[test]
fn recoverable_build_failure_drops_the_point_but_keeps_its_output() {
    let mut jdwp = MockJdwpClient::new();
    let stdout = jdwp.stdout_channel();
    jdwp.push_event_set(step_in_main(3, main_frame(3)));
    // Object 99 is never scripted, so reading it fails.
    jdwp.push_event_set(
        step_in_main(
            4,
            main_frame(4).with_variable(MockVariable::local(
                "ghost",
                1,
                JdwpValue::Object(ObjectRef::instance(99, "Ghost")),
            )),
        )
        .with_stdout("lost?\n"),
    );
    jdwp.push_event_set(step_in_main(5, main_frame(5)));

    let mut controller = nova_trace::TraceController::new(jdwp, "Main", &TraceConfig::default())
        .with_output(
            nova_trace::OutputCapture::from_channel(stdout),
            nova_trace::OutputCapture::disconnected(),
        );
    let trace = controller.run().unwrap();
    let points: Vec<_> = trace.points().map(|p| (p.line, p.stdout_delta.as_str())).collect();
    assert_eq!(points, vec![(3, ""), (5, "lost?\n")]);
}

#[test]
fn class_prepare_sets_a_breakpoint_on_every_line() {
    let mut jdwp = MockJdwpClient::new();
    let main_class = MockClass::new(7, "Main")
        .with_lines("main", &[3, 4, 5])
        .with_lines("helper", &[9]);
    let mut no_lines = MockClass::new(8, "Stripped");
    no_lines.lines = None;
    jdwp.push_event_set(
        MockEventSet::new(vec![
            JdwpEvent::ClassPrepare {
                thread: MAIN_THREAD,
                class: ClassInfo {
                    id: 7,
                    name: "Main".to_string(),
                },
            },
            JdwpEvent::ClassPrepare {
                thread: MAIN_THREAD,
                class: ClassInfo {
                    id: 8,
                    name: "Stripped".to_string(),
                },
            },
            JdwpEvent::ClassPrepare {
                thread: MAIN_THREAD,
                class: ClassInfo {
                    id: 9,
                    name: "java.util.HashMap".to_string(),
                },
            },
        ])
        .with_class(main_class)
        .with_class(no_lines),
    );
    jdwp.push_event_set(step_in_main(3, main_frame(3)));

    let (result, jdwp) = run(jdwp, &TraceConfig::default());
    result.unwrap();

    let breakpoints = jdwp.requests_of_kind(EventKind::Breakpoint);
    let lines: Vec<_> = breakpoints
        .iter()
        .map(|req| match &req.modifiers[..] {
            [EventModifier::LocationOnly { location }] => {
                (location.method_name.clone(), location.line)
            }
            other => panic!("unexpected modifiers {other:?}"),
        })
        .collect();
    assert_eq!(
        lines,
        vec![
            ("main".to_string(), 3),
            ("main".to_string(), 4),
            ("main".to_string(), 5),
            ("helper".to_string(), 9),
        ]
    );
    assert!(breakpoints
        .iter()
        .all(|req| req.suspend_policy == SuspendPolicy::All));
}

#[test]
fn termination_events_in_a_batch_are_still_seen() {
    let mut jdwp = MockJdwpClient::new();
    jdwp.push_event_set(
        MockEventSet::new(vec![step(3)]).with_stack(MAIN_THREAD, vec![main_frame(3)]),
    );
    jdwp.push_event_set(MockEventSet::new(vec![
        JdwpEvent::ThreadDeath {
            thread: MAIN_THREAD,
        },
        JdwpEvent::VmDeath,
        JdwpEvent::VmDisconnect,
    ]));
    jdwp.push_event_set(step_in_main(9, main_frame(9)));

    let (result, jdwp) = run(jdwp, &TraceConfig::default());
    assert_eq!(result.unwrap().points().count(), 1);
    assert_eq!(jdwp.remaining_event_sets(), 1);
}
