use nova_config::TraceConfig;
use nova_jdwp::{FieldInfo, JdwpValue, MockJdwpClient, MockObject, MockVariable, ObjectRef};
use nova_trace::{EncodedObject, EncodedValue, ExecutionPoint};
use serde_json::Value;

use crate::harness::{main_frame, node, run, step_in_main};

fn linked(next: JdwpValue, value: i32) -> MockObject {
    MockObject::Instance(vec![
        (FieldInfo::instance("value"), JdwpValue::Int(value)),
        (FieldInfo::instance("next"), next),
    ])
}

fn only_point(jdwp: MockJdwpClient) -> ExecutionPoint {
    let (result, _) = run(jdwp, &TraceConfig::default());
    let trace = result.unwrap();
    let points: Vec<_> = trace.points().cloned().collect();
    assert_eq!(points.len(), 1);
    points.into_iter().next().unwrap()
}

fn collect_refs(value: &Value, out: &mut Vec<u64>) {
    match value {
        Value::Array(items) => {
            if items.len() == 2 && items[0] == "REF" {
                if let Some(id) = items[1].as_u64() {
                    out.push(id);
                }
            }
            for item in items {
                collect_refs(item, out);
            }
        }
        Value::Object(map) => map.values().for_each(|v| collect_refs(v, out)),
        _ => {}
    }
}

#[test]
fn two_node_cycle_terminates_with_each_node_once() {
    let mut jdwp = MockJdwpClient::new();
    jdwp.push_event_set(
        step_in_main(
            4,
            main_frame(4).with_variable(MockVariable::local("a", 1, node(21))),
        )
        .with_object(21, linked(node(22), 1))
        .with_object(22, linked(node(21), 2)),
    );

    let point = only_point(jdwp);
    assert_eq!(point.heap.len(), 2);
    assert_eq!(
        point.heap.get(&21),
        Some(&EncodedObject::Instance {
            type_name: "Node".to_string(),
            fields: vec![
                ("value".to_string(), EncodedValue::Int(1)),
                ("next".to_string(), EncodedValue::Ref(22)),
            ],
        })
    );
    assert_eq!(
        point.heap.get(&22),
        Some(&EncodedObject::Instance {
            type_name: "Node".to_string(),
            fields: vec![
                ("value".to_string(), EncodedValue::Int(2)),
                ("next".to_string(), EncodedValue::Ref(21)),
            ],
        })
    );
}

#[test]
fn shared_objects_appear_once_and_every_reference_resolves() {
    let mut jdwp = MockJdwpClient::new();
    let list = JdwpValue::Object(ObjectRef::array(30, "Node[]"));
    jdwp.push_event_set(
        step_in_main(
            6,
            main_frame(6)
                .with_variable(MockVariable::local("first", 1, node(31)))
                .with_variable(MockVariable::local("all", 2, list))
                .with_variable(MockVariable::local("again", 3, node(31))),
        )
        .with_object(30, MockObject::Array(vec![node(31), node(32), JdwpValue::Null]))
        .with_object(31, linked(node(32), 1))
        .with_object(32, linked(JdwpValue::Null, 2)),
    );

    let point = only_point(jdwp);
    let ids: Vec<_> = point.heap.keys().copied().collect();
    assert_eq!(ids, vec![30, 31, 32]);

    let json = serde_json::to_value(&point).unwrap();
    let heap = json["heap"].as_object().unwrap();
    assert_eq!(heap.len(), 3);
    let mut refs = Vec::new();
    collect_refs(&json["stack_to_render"], &mut refs);
    collect_refs(&json["heap"], &mut refs);
    assert!(!refs.is_empty());
    for id in refs {
        assert!(heap.contains_key(&id.to_string()), "dangling reference {id}");
    }
}

#[test]
fn library_objects_are_opaque_but_strings_keep_their_text() {
    let mut jdwp = MockJdwpClient::new();
    jdwp.push_event_set(
        step_in_main(
            3,
            main_frame(3)
                .with_variable(MockVariable::local(
                    "items",
                    1,
                    JdwpValue::Object(ObjectRef::instance(40, "java.util.ArrayList")),
                ))
                .with_variable(MockVariable::local(
                    "name",
                    2,
                    JdwpValue::Object(ObjectRef::string(41)),
                )),
        )
        .with_object(41, MockObject::String("nova".to_string())),
    );

    let point = only_point(jdwp);
    let json = serde_json::to_value(&point).unwrap();
    assert_eq!(
        json["heap"]["40"],
        serde_json::json!(["INSTANCE", "java.util.ArrayList"])
    );
    assert_eq!(
        json["heap"]["41"],
        serde_json::json!(["HEAP_PRIMITIVE", "String", "nova"])
    );
}
