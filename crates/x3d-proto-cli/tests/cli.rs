// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! End-to-end tests for the `x3d-proto` binary.

#![allow(missing_docs)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;
use tempfile::TempDir;

const GOOD_TRACE: &str = r#"
{"event":"start_document","version":"3.0"}
{"event":"start_proto_decl","name":"TestProto","line":2,"column":1}
{"event":"proto_field_decl","access":"exposedField","field_type":"SFVec3f","name":"position","default":"0 1 0"}
{"event":"proto_field_decl","access":"field","field_type":"SFInt32","name":"intField","default":"42"}
{"event":"end_proto_decl"}
{"event":"start_proto_body"}
{"event":"start_node","type_name":"Transform","def":"T"}
{"event":"start_field","name":"translation"}
{"event":"proto_is_decl","field":"position"}
{"event":"end_field"}
{"event":"end_node"}
{"event":"end_proto_body"}
{"event":"start_extern_proto_decl","name":"Remote"}
{"event":"proto_field_decl","access":"field","field_type":"SFFloat","name":"size"}
{"event":"end_extern_proto_decl"}
{"event":"extern_proto_uri","uris":["remote.wrl#Remote"]}
{"event":"end_document"}
"#;

fn write_file(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

fn cli() -> Command {
    Command::cargo_bin("x3d-proto").unwrap()
}

// =============================================================================
// replay
// =============================================================================

#[test]
fn replay_prints_template_summary() {
    let dir = tempfile::tempdir().unwrap();
    let trace = write_file(&dir, "good.jsonl", GOOD_TRACE);

    cli()
        .arg("replay")
        .arg(&trace)
        .assert()
        .success()
        .stdout(predicate::str::contains("TestProto"))
        .stdout(predicate::str::contains("EXTERNPROTO"))
        .stdout(predicate::str::contains("remote.wrl#Remote"))
        .stdout(predicate::str::contains("2 top-level templates"));
}

#[test]
fn replay_reports_failing_line() {
    let dir = tempfile::tempdir().unwrap();
    let trace = write_file(
        &dir,
        "bad.jsonl",
        "{\"event\":\"start_document\",\"version\":\"3.0\"}\n{\"event\":\"end_proto_body\"}\n",
    );

    cli()
        .arg("replay")
        .arg(&trace)
        .assert()
        .failure()
        .stderr(predicate::str::contains("trace line 2: end_proto_body failed"));
}

#[test]
fn replay_rejects_malformed_json() {
    let dir = tempfile::tempdir().unwrap();
    let trace = write_file(&dir, "junk.jsonl", "{\"event\":\"no_such_event\"}\n");

    cli()
        .arg("replay")
        .arg(&trace)
        .assert()
        .failure()
        .stderr(predicate::str::contains("trace line 1: malformed event"));
}

#[test]
fn replay_honours_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_file(&dir, "config.json", r#"{"load":{"vrml97_only":true}}"#);
    let trace = write_file(&dir, "x3d.jsonl", "{\"event\":\"start_document\",\"version\":\"3.1\"}\n");

    cli()
        .arg("replay")
        .arg(&trace)
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("start_document failed"));
}

#[test]
fn replay_missing_trace_fails() {
    cli()
        .args(["replay", "/definitely/not/here.jsonl"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read trace"));
}

// =============================================================================
// types
// =============================================================================

#[test]
fn types_lists_every_field_type() {
    cli()
        .arg("types")
        .assert()
        .success()
        .stdout(predicate::str::contains("SFBool"))
        .stdout(predicate::str::contains("MFMatrix4d"))
        .stdout(predicate::str::contains("SFImage"));
}
