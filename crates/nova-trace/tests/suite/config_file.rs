use std::io::Write;

use nova_config::{NovaConfig, ReturnCapture};
use nova_jdwp::{JdwpValue, MockJdwpClient, MockVariable};
use nova_trace::{trace_program, NamespaceFilter, TraceSession};

use crate::harness::{main_frame, step_in_main};

#[test]
fn trace_settings_load_from_toml_and_shape_the_run() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[trace]
max_steps = 2
excluded_namespaces = ["java", "org.example.lib"]
return_capture = "patch"
limit_message = "stopped early"

[logging]
level = "nova.trace=debug"
"#
    )
    .unwrap();

    let config = NovaConfig::load_from_path(file.path()).unwrap();
    assert_eq!(config.trace.return_capture, ReturnCapture::Patch);
    assert_eq!(config.logging.level, "nova.trace=debug");
    nova_config::init_tracing(&config.logging);

    let filter = NamespaceFilter::from(&config.trace);
    assert_eq!(filter.prefixes(), ["java", "org.example.lib"]);
    assert!(filter.is_excluded("org.example.lib.Util"));
    assert!(!filter.is_excluded("org.example.App"));

    let mut jdwp = MockJdwpClient::new();
    for i in 0..4 {
        jdwp.push_event_set(step_in_main(
            5,
            main_frame(5).with_variable(MockVariable::local("i", 1, JdwpValue::Int(i))),
        ));
    }
    let trace = trace_program(TraceSession::new(jdwp, "Main"), &config.trace).unwrap();
    assert_eq!(trace.points().count(), 2);
    assert!(trace.limit_reached);
}
