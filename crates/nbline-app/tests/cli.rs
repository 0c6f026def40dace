use std::io::Write;

use assert_cmd::Command;
use predicates::str::contains;
use serde_json::Value;
use tempfile::{NamedTempFile, TempDir};

const NOTEBOOK: &str = r##"{
 "cells": [
  {"cell_type": "markdown", "metadata": {}, "source": ["# Demo\n", "Some text\n"]},
  {
   "cell_type": "code",
   "execution_count": 1,
   "metadata": {},
   "source": ["x = 1\n", "print(x)"],
   "outputs": [
    {"name": "stdout", "output_type": "stream", "text": ["1\n"]},
    {"data": {"image/png": "iVBOR"}, "metadata": {}, "output_type": "display_data"},
    {"ename": "ValueError", "evalue": "x", "output_type": "error",
     "traceback": ["Traceback (most recent call last):", "ValueError: x"]}
   ]
  }
 ],
 "metadata": {},
 "nbformat": 4,
 "nbformat_minor": 5
}
"##;

/// Isolate a command from the caller's config and log settings.
fn isolated(mut cmd: Command, home: &TempDir) -> Command {
    cmd.env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path())
        .env_remove("NBLINE_CONFIG")
        .env_remove("NBLINE_LOG")
        .env_remove("NBLINE_LOG_DIR")
        .env_remove("RUST_LOG");
    cmd
}

fn nbline(home: &TempDir) -> Command {
    isolated(Command::new(assert_cmd::cargo::cargo_bin!("nbline")), home)
}

fn nbview(home: &TempDir) -> Command {
    isolated(Command::new(assert_cmd::cargo::cargo_bin!("nbview")), home)
}

fn notebook_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("tmp file");
    file.write_all(contents.as_bytes()).expect("write notebook");
    file
}

#[test]
fn read_prints_single_line_json() {
    let home = TempDir::new().unwrap();
    let file = notebook_file(NOTEBOOK);

    let assert = nbline(&home)
        .arg("read")
        .arg(file.path())
        .assert()
        .success();

    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();
    assert_eq!(stdout.lines().count(), 1);
    assert!(stdout.contains("\"source\": \"# Demo\\nSome text\\n\""));

    let value: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value["cells"][1]["outputs"][0]["text"], "1\n");
}

#[test]
fn write_from_stdin_creates_notebook() {
    let home = TempDir::new().unwrap();
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("out.ipynb");

    nbline(&home)
        .arg("write")
        .arg(&target)
        .write_stdin(NOTEBOOK)
        .assert()
        .success();

    let written = std::fs::read_to_string(&target).unwrap();
    assert!(written.starts_with("{\n \"cells\": ["));
    let value: Value = serde_json::from_str(&written).unwrap();
    assert_eq!(value["cells"][1]["source"][0], "x = 1\n");
}

#[test]
fn write_with_empty_stdin_exits_2() {
    let home = TempDir::new().unwrap();
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("never.ipynb");

    nbline(&home)
        .arg("write")
        .arg(&target)
        .write_stdin("")
        .assert()
        .code(2)
        .stderr(contains("no input"));

    assert!(!target.exists());
}

#[test]
fn read_write_round_trip_is_equivalent() {
    let home = TempDir::new().unwrap();
    let source = notebook_file(NOTEBOOK);
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("copy.ipynb");

    let first = nbline(&home)
        .arg("read")
        .arg(source.path())
        .assert()
        .success();
    let json = first.get_output().stdout.clone();

    nbline(&home)
        .arg("write")
        .arg(&target)
        .write_stdin(json.clone())
        .assert()
        .success();

    let second = nbline(&home)
        .arg("read")
        .arg(&target)
        .assert()
        .success();
    assert_eq!(second.get_output().stdout, json);
}

#[test]
fn missing_arguments_exit_2() {
    let home = TempDir::new().unwrap();
    nbline(&home).assert().code(2);
    nbline(&home)
        .arg("read")
        .assert()
        .code(2)
        .stderr(contains("Usage"));
    nbview(&home).assert().code(2);
}

#[test]
fn unknown_mode_exits_2() {
    let home = TempDir::new().unwrap();
    nbline(&home)
        .arg("convert")
        .arg("x.ipynb")
        .assert()
        .code(2)
        .stderr(contains("convert"));
}

#[test]
fn malformed_notebook_fails() {
    let home = TempDir::new().unwrap();
    let file = notebook_file("{\"cells\": [");

    nbline(&home)
        .arg("read")
        .arg(file.path())
        .assert()
        .code(1)
        .stderr(contains("failed to parse notebook JSON"));
}

#[test]
fn nbview_renders_transcript() {
    let home = TempDir::new().unwrap();
    let file = notebook_file(NOTEBOOK);

    let assert = nbview(&home).arg(file.path()).assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();
    let lines: Vec<&str> = stdout.lines().collect();

    assert_eq!(
        lines,
        [
            "# ==== Cell 0 (markdown) ====",
            "# Demo",
            "Some text",
            "",
            "# ==== Cell 1 (code) ====",
            "```",
            "x = 1",
            "print(x)",
            "```",
            "---- output (stream) ----",
            "1",
            "---- output (error) ----",
            "Traceback (most recent call last):",
            "ValueError: x",
            "",
        ]
    );
}

#[test]
fn nbview_upgrades_v3_notebooks() {
    let home = TempDir::new().unwrap();
    let file = notebook_file(
        r#"{"metadata": {}, "nbformat": 3, "nbformat_minor": 0, "worksheets": [{"cells": [
            {"cell_type": "code", "input": "1 + 1", "language": "python", "metadata": {},
             "outputs": [{"output_type": "pyout", "prompt_number": 1, "text": "2"}],
             "prompt_number": 1}
        ]}]}"#,
    );

    let assert = nbview(&home).arg(file.path()).assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();
    let lines: Vec<&str> = stdout.lines().collect();

    assert_eq!(
        lines,
        [
            "# ==== Cell 0 (code) ====",
            "```",
            "1 + 1",
            "```",
            "---- output (text/plain) ----",
            "2",
            "",
        ]
    );
}

#[test]
fn explicit_config_controls_write_indent() {
    let home = TempDir::new().unwrap();
    let config = notebook_file("[write]\nindent = 2\n");
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("wide.ipynb");

    nbline(&home)
        .arg("--config")
        .arg(config.path())
        .arg("write")
        .arg(&target)
        .write_stdin(NOTEBOOK)
        .assert()
        .success();

    let written = std::fs::read_to_string(&target).unwrap();
    assert!(written.starts_with("{\n  \"cells\": [\n    {\n"));
}

#[test]
fn invalid_config_fails_before_running() {
    let home = TempDir::new().unwrap();
    let config = notebook_file("[write]\nindent = 99\n");
    let file = notebook_file(NOTEBOOK);

    nbview(&home)
        .env("NBLINE_CONFIG", config.path())
        .arg(file.path())
        .assert()
        .code(1)
        .stderr(contains("write.indent must be at most"));
}
