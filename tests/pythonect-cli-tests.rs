use assert_cmd::prelude::*;
use camino::Utf8Path;
use std::fs::File;
use std::io::prelude::*;
use std::process::{Command, Stdio};
use tempfile::Builder;

fn pythonect_cmd() -> Command {
    Command::cargo_bin("pythonect").unwrap()
}

fn stdout_of(cmd: &mut Command) -> String {
    let output = cmd.output().unwrap();
    assert!(output.status.success(), "{output:?}");
    String::from_utf8(output.stdout).unwrap()
}

#[test]
fn test_help_subcommand() {
    let mut cmd = pythonect_cmd();

    cmd.arg("help");
    cmd.assert().success();
}

#[test]
fn test_help_flag_command() {
    let mut cmd = pythonect_cmd();

    cmd.arg("--help");
    cmd.assert().success();
}

#[test]
fn test_missing_file() {
    let tmp_dir = Builder::new().prefix("tmp").tempdir().unwrap();
    let bad_file = tmp_dir.path().join("uiop");

    let mut cmd = pythonect_cmd();
    cmd.arg(bad_file.to_str().unwrap());
    cmd.assert().failure();
}

#[test]
fn test_nothing_to_run() {
    pythonect_cmd().assert().failure();
}

#[test]
fn test_inline_code() {
    let out = stdout_of(pythonect_cmd().args(["-c", "[1, 2, 3] | _ * 2 | print"]));
    assert_eq!(out, "2\n4\n6\n");

    let out = stdout_of(pythonect_cmd().args(["-c", "1 -> _ + 1", "--result"]));
    assert_eq!(out, "2\n");
}

#[test]
fn test_program_file() {
    let tmp_dir = Builder::new().prefix("tmp").tempdir().unwrap();
    let tmp_dir = Utf8Path::from_path(tmp_dir.path()).unwrap();
    let program = tmp_dir.join("words.py");

    let mut file = File::create(&program).unwrap();
    file.write_all(b"# split, then shout\n").unwrap();
    file.write_all(b"'hello world' -> split | upper\n").unwrap();

    let out = stdout_of(pythonect_cmd().arg(program.as_str()).arg("--result"));
    assert_eq!(out, "['HELLO', 'WORLD']\n");
}

#[test]
fn test_config_file() {
    let tmp_dir = Builder::new().prefix("tmp").tempdir().unwrap();
    let tmp_dir = Utf8Path::from_path(tmp_dir.path()).unwrap();
    let config = tmp_dir.join("pythonect.toml");

    let mut config_file = File::create(&config).unwrap();
    config_file.write_all(b"max_depth = 1\n").unwrap();

    let mut cmd = pythonect_cmd();
    cmd.args(["-c", "__eval__('__eval__(\"1\")')", "--config", config.as_str()]);
    cmd.assert().failure();

    let mut cmd = pythonect_cmd();
    cmd.args(["-c", "`1 -> _ + 1`", "--result", "--config", config.as_str()]);
    cmd.assert().success().stdout("2\n");
}

#[test]
fn test_evaluation_errors_fail() {
    let mut cmd = pythonect_cmd();
    cmd.args(["-c", "1 -> undefined_name_here"]);
    cmd.assert().failure();

    let mut cmd = pythonect_cmd();
    cmd.args(["-c", "1 -> 1 / 0"]);
    cmd.assert().failure();
}

#[test]
fn test_worker_protocol() {
    let mut child = pythonect_cmd()
        .arg("worker")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();
    let request = r#"{"text":"__print__(_) or _ * 2","snapshot":{"globals":{},"locals":{"_":{"type":"int","value":21}}},"depth":0}"#;
    child
        .stdin
        .take()
        .unwrap()
        .write_all(request.as_bytes())
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());
    let response: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(response["status"], "ok");
    assert_eq!(response["value"]["value"], 42);
    assert_eq!(response["output"][0], "21");
}
