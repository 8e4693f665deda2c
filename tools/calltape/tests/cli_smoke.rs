use assert_cmd::cargo::cargo_bin_cmd;
use calltape::event::EventLog;
use calltape::memgraph::{self, relationship_type, MemGraph};
use calltape::recording::Recorder;
use calltape::value::Value;
use calltape::wire::WireFormat;
use std::path::Path;
use std::sync::Arc;

fn write_session(path: &Path, format: WireFormat) {
    let log = EventLog::new();
    let graph = MemGraph::new();
    let recorder = Recorder::new(
        memgraph::registry(),
        memgraph::contracts(),
        Arc::new(log.clone()),
    );
    let db = recorder.wrap(graph.service(), memgraph::SERVICE);
    let tx = db.call_object("beginTx", &[]).expect("tx");
    let a = db.call_object("createNode", &[]).expect("a");
    let b = db.call_object("createNode", &[]).expect("b");
    a.call("setProperty", &[Value::str("name"), Value::str("a")])
        .expect("name");
    a.call(
        "createRelationshipTo",
        &[Value::Object(b), relationship_type("KNOWS")],
    )
    .expect("link");
    tx.call("success", &[]).expect("success");
    tx.call("finish", &[]).expect("finish");
    let text = format.encode_all(&log.events()).expect("encode");
    std::fs::write(path, text).expect("write session");
}

fn stdout_of(out: &assert_cmd::assert::Assert) -> String {
    String::from_utf8(out.get_output().stdout.clone()).expect("utf8")
}

#[test]
fn help_lists_subcommands() {
    let mut cmd = cargo_bin_cmd!("calltape");
    cmd.arg("--help");
    let out = cmd.assert().success();
    let stdout = stdout_of(&out);

    assert!(stdout.contains("convert"));
    assert!(stdout.contains("inspect"));
    assert!(stdout.contains("replay"));
}

#[test]
fn convert_then_inspect_shows_text_events() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("session.jsonl");
    let output = dir.path().join("converted").join("session.txt");
    write_session(&input, WireFormat::Json);

    let mut cmd = cargo_bin_cmd!("calltape");
    cmd.arg("convert").arg(&input).arg(&output);
    let out = cmd.assert().success();
    assert!(stdout_of(&out).contains("converted 7 events from json to text"));

    let text = std::fs::read_to_string(&output).expect("converted");
    assert!(text.starts_with("GraphDatabaseService() beginTx => Transaction()"));

    let mut cmd = cargo_bin_cmd!("calltape");
    cmd.arg("inspect").arg(&output);
    let out = cmd.assert().success();
    let stdout = stdout_of(&out);
    assert!(stdout.contains(r#"2: GraphDatabaseService() createNode => Node(1)"#));
    assert!(stdout.contains("events=7 "));
    assert!(stdout.contains("createNode=2"));
}

#[test]
fn replay_reports_graph_and_writes_playback_log() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("session.jsonl");
    let playback_log = dir.path().join("logs").join("playback.jsonl");
    write_session(&input, WireFormat::Json);

    let mut cmd = cargo_bin_cmd!("calltape");
    cmd.arg("replay")
        .arg(&input)
        .arg("--verify-results")
        .arg("--id-base")
        .arg("40")
        .arg("--log")
        .arg(&playback_log);
    let out = cmd.assert().success();
    assert!(stdout_of(&out).contains("played=7 failed=0 nodes=2 relationships=1"));

    let log = std::fs::read_to_string(&playback_log).expect("playback log");
    assert_eq!(
        log.lines()
            .filter(|line| line.contains("\"event_type\":\"playback_completed\""))
            .count(),
        7
    );
}

#[test]
fn replay_failures_exit_one_or_two_depending_on_policy() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("session.txt");
    write_session(&input, WireFormat::Text);
    let mut text = std::fs::read_to_string(&input).expect("session");
    text.push_str("Node(99) delete\n");
    std::fs::write(&input, text).expect("append");

    let mut cmd = cargo_bin_cmd!("calltape");
    cmd.arg("replay").arg(&input);
    cmd.assert().failure().code(1);

    let mut cmd = cargo_bin_cmd!("calltape");
    cmd.arg("replay").arg(&input).arg("--continue-on-exception");
    let out = cmd.assert().failure().code(2);
    assert!(stdout_of(&out).contains("played=7 failed=1"));
    let stderr = String::from_utf8(out.get_output().stderr.clone()).expect("utf8");
    assert!(stderr.contains("playback_exception"));
}

#[test]
fn config_format_applies_to_unrecognised_extensions() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("session.log");
    let config = dir.path().join("calltape.toml");
    write_session(&input, WireFormat::Text);
    std::fs::write(&config, "[recording]\nformat = \"text\"\n").expect("config");

    let mut cmd = cargo_bin_cmd!("calltape");
    cmd.arg("inspect").arg(&input).arg("--config").arg(&config);
    let out = cmd.assert().success();
    assert!(stdout_of(&out).contains("events=7"));

    let mut cmd = cargo_bin_cmd!("calltape");
    cmd.arg("inspect").arg(&input);
    cmd.assert().failure().code(1);
}

#[test]
fn missing_input_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut cmd = cargo_bin_cmd!("calltape");
    cmd.arg("replay").arg(dir.path().join("absent.jsonl"));
    cmd.assert().failure().code(1);
}
