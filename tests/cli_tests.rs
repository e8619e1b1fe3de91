// CLI behaviour through the built binary.
// Requires: assert_cmd, predicates, tempfile in [dev-dependencies]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;
use tempfile::{tempdir, TempDir};

const GREETING: &str = r#"
grammar greetings

greeting = "Hello" "," .whitespace name
name = .letters+
"#;

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

fn stlr() -> Command {
    Command::cargo_bin("stlr").unwrap()
}

fn parse(grammar: &Path, input: &Path) -> Command {
    let mut cmd = stlr();
    cmd.arg("parse").arg(grammar).arg(input);
    cmd
}

#[test]
fn check_accepts_a_valid_grammar() {
    let dir = tempdir().unwrap();
    let grammar = write(&dir, "greeting.stlr", GREETING);

    stlr()
        .arg("check")
        .arg(&grammar)
        .assert()
        .success()
        .stdout(contains("ok").and(contains("greeting.stlr")));
}

#[test]
fn check_walks_directories() {
    let dir = tempdir().unwrap();
    write(&dir, "good.stlr", GREETING);
    write(&dir, "bad.stlr", "expr = expr \"+\" \"1\" | \"1\"");
    write(&dir, "notes.txt", "not a grammar");

    stlr()
        .arg("check")
        .arg(dir.path())
        .assert()
        .failure()
        .stdout(contains("good.stlr").and(contains("notes.txt").not()))
        .stderr(contains("left_recursion"));
}

#[test]
fn rules_prints_compiled_declarations() {
    let dir = tempdir().unwrap();
    let grammar = write(&dir, "greeting.stlr", GREETING);

    stlr()
        .arg("rules")
        .arg(&grammar)
        .assert()
        .success()
        .stdout(contains("greeting = ").and(contains("name = ")).and(contains("root")));
}

#[test]
fn parse_prints_a_tree() {
    let dir = tempdir().unwrap();
    let grammar = write(&dir, "greeting.stlr", GREETING);
    let input = write(&dir, "input.txt", "Hello, World");

    parse(&grammar, &input)
        .assert()
        .success()
        .stdout(contains("greeting").and(contains("\"World\"")));
}

#[test]
fn parse_emits_json() {
    let dir = tempdir().unwrap();
    let grammar = write(&dir, "greeting.stlr", GREETING);
    let input = write(&dir, "input.txt", "Hello, World");

    let output = parse(&grammar, &input)
        .args(["--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json[0]["token"], "greeting");
    assert_eq!(json[0]["text"], "Hello, World");
    assert_eq!(json[0]["children"][0]["token"], "name");
    assert_eq!(json[0]["children"][0]["range"], serde_json::json!([7, 12]));
}

#[test]
fn parse_emits_yaml() {
    let dir = tempdir().unwrap();
    let grammar = write(&dir, "greeting.stlr", GREETING);
    let input = write(&dir, "input.txt", "Hello, World");

    parse(&grammar, &input)
        .args(["--format", "yaml"])
        .assert()
        .success()
        .stdout(contains("token: greeting"));
}

#[test]
fn trailing_input_fails_with_a_diagnostic() {
    let dir = tempdir().unwrap();
    let grammar = write(&dir, "digits.stlr", "digits = .decimalDigits+");
    let input = write(&dir, "input.txt", "123abc");

    parse(&grammar, &input)
        .assert()
        .failure()
        .stderr(contains("trailing_input"));
}

#[test]
fn streaming_prints_one_document_per_node() {
    let dir = tempdir().unwrap();
    let grammar = write(&dir, "words.stlr", "word = .letters+ -\" \"?");
    let input = write(&dir, "input.txt", "ab cd");

    let output = parse(&grammar, &input)
        .args(["--stream", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<_> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);
    let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
    assert_eq!(second[0]["text"], "cd");
}

#[test]
fn unknown_root_is_an_error() {
    let dir = tempdir().unwrap();
    let grammar = write(&dir, "greeting.stlr", GREETING);
    let input = write(&dir, "input.txt", "World");

    parse(&grammar, &input)
        .args(["--root", "missing"])
        .assert()
        .failure()
        .stderr(contains("missing"));

    parse(&grammar, &input)
        .args(["--root", "name"])
        .assert()
        .success();
}

#[test]
fn missing_files_fail() {
    stlr()
        .arg("rules")
        .arg("does/not/exist.stlr")
        .assert()
        .failure()
        .stderr(contains("exist.stlr"));
}
