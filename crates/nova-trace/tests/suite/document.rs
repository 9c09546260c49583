use nova_config::TraceConfig;
use nova_jdwp::{JdwpEvent, JdwpValue, MockEventSet, MockFrame, MockJdwpClient, MockVariable};
use nova_trace::TraceDocument;
use serde_json::json;

use crate::harness::{config_with_steps, loc, main_frame, run, step_in_main, MAIN_THREAD};

const SOURCE: &str = "public class Main {\n  public static void main(String[] args) {\n    int x = 1;\n  }\n}\n";

#[test]
fn document_serializes_points_in_viewer_shape() {
    let mut jdwp = MockJdwpClient::new();
    jdwp.push_event_set(
        MockEventSet::new(vec![JdwpEvent::MethodEntry {
            thread: MAIN_THREAD,
            location: loc("main", 3),
        }])
        .with_stack(MAIN_THREAD, vec![MockFrame::new(loc("main", 3))]),
    );
    jdwp.push_event_set(step_in_main(
        4,
        main_frame(4).with_variable(MockVariable::local("x", 1, JdwpValue::Int(1))),
    ));

    let (result, _) = run(jdwp, &TraceConfig::default());
    let doc = TraceDocument::from_outcome(SOURCE, result);
    let value: serde_json::Value = serde_json::from_str(&doc.to_json().unwrap()).unwrap();

    assert_eq!(value["code"], json!(SOURCE));
    let trace = value["trace"].as_array().unwrap();
    assert_eq!(trace.len(), 2);
    assert_eq!(trace[0]["event"], json!("call"));

    let step = &trace[1];
    let mut keys: Vec<_> = step.as_object().unwrap().keys().cloned().collect();
    keys.sort();
    assert_eq!(
        keys,
        vec![
            "event",
            "func_name",
            "globals",
            "heap",
            "line",
            "ordered_globals",
            "stack_to_render",
            "stdout",
        ]
    );
    assert_eq!(step["event"], json!("step_line"));
    assert_eq!(step["line"], json!(4));
    assert_eq!(step["func_name"], json!("main"));

    let frame = &step["stack_to_render"][0];
    assert_eq!(frame["func_name"], json!("main:4"));
    assert_eq!(frame["encoded_locals"], json!({"x": 1}));
    assert_eq!(frame["ordered_varnames"], json!(["x"]));
    assert_eq!(frame["parent_frame_id_list"], json!([]));
    assert_eq!(frame["is_highlighted"], json!(true));
    assert_eq!(frame["is_zombie"], json!(false));
    assert_eq!(frame["is_parent"], json!(false));
    assert_eq!(frame["unique_hash"], json!(frame["frame_id"].to_string()));
}

#[test]
fn budget_marker_closes_the_document() {
    let mut jdwp = MockJdwpClient::new();
    for line in 1..=5 {
        jdwp.push_event_set(step_in_main(line, main_frame(line)));
    }
    let (result, _) = run(jdwp, &config_with_steps(2));
    let value = TraceDocument::from_outcome(SOURCE, result).to_value().unwrap();
    let trace = value["trace"].as_array().unwrap();
    assert_eq!(trace.len(), 3);
    assert_eq!(
        trace[2],
        json!({
            "event": "instruction_limit_reached",
            "exception_msg": "<ran for maximum execution time limit>",
        })
    );
}

#[test]
fn custom_limit_message_is_used() {
    let mut jdwp = MockJdwpClient::new();
    jdwp.push_event_set(step_in_main(1, main_frame(1)));
    let config = TraceConfig {
        max_steps: 1,
        limit_message: "too many steps".to_string(),
        ..TraceConfig::default()
    };
    let (result, _) = run(jdwp, &config);
    let value = TraceDocument::from_outcome(SOURCE, result).to_value().unwrap();
    assert_eq!(value["trace"][1]["exception_msg"], json!("too many steps"));
}

#[test]
fn compile_errors_share_the_document_shape() {
    let doc = TraceDocument::compile_error(SOURCE, "';' expected", 3, 14);
    let value = doc.to_value().unwrap();
    assert_eq!(value["code"], json!(SOURCE));
    assert_eq!(
        value["trace"],
        json!([{
            "event": "exception",
            "exception_msg": "';' expected",
            "line": 3,
            "offset": 14,
        }])
    );
}

#[test]
fn missing_entry_point_becomes_a_one_entry_document() {
    let (result, _) = run(MockJdwpClient::new(), &TraceConfig::default());
    let value = TraceDocument::from_outcome(SOURCE, result).to_value().unwrap();
    assert_eq!(
        value["trace"],
        json!([{
            "event": "exception",
            "exception_msg": "Did not find: public static void Main.main(String[])",
            "line": 1,
            "offset": 1,
        }])
    );
}
