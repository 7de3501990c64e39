use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use assert_cmd::Command;
use tempfile::tempdir;
use tiny_http::{Header, Response, Server};

fn write_config(path: &Path, source_repository_url: &str) {
    fs::write(
        path,
        format!(
            r#"
[runtime]
self-agent = "deposit-engine-test"
source-repository-url = "{source_repository_url}"

[repositories]
"#
        ),
    )
    .expect("write config");
}

#[test]
fn refresh_against_an_empty_repository_exits_ok() {
    let server = Server::http("127.0.0.1:0").expect("server");
    let addr = format!("http://{}", server.server_addr());

    let handle = thread::spawn(move || {
        let req = server.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        let content_type = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap();
        req.respond(Response::from_string("[]").with_header(content_type)).unwrap();
    });

    let dir = tempdir().expect("tempdir");
    let config_path = dir.path().join("deposit-engine.toml");
    write_config(&config_path, &addr);

    Command::cargo_bin("deposit-engine")
        .expect("binary")
        .arg("--config")
        .arg(&config_path)
        .arg("refresh")
        .assert()
        .success();

    handle.join().unwrap();
}

#[test]
fn refresh_against_an_unreachable_repository_exits_fatal() {
    let dir = tempdir().expect("tempdir");
    let config_path = dir.path().join("deposit-engine.toml");
    // Port 0 on a dead connection: nothing is listening, so the HTTP call
    // itself fails before any repository logic runs.
    write_config(&config_path, "http://127.0.0.1:1");

    Command::cargo_bin("deposit-engine")
        .expect("binary")
        .arg("--config")
        .arg(&config_path)
        .arg("refresh")
        .assert()
        .code(3);
}

#[test]
fn missing_config_file_exits_fatal() {
    let dir = tempdir().expect("tempdir");
    let config_path = dir.path().join("does-not-exist.toml");

    Command::cargo_bin("deposit-engine")
        .expect("binary")
        .arg("--config")
        .arg(&config_path)
        .arg("refresh")
        .assert()
        .code(3);
}

#[test]
fn unknown_subcommand_exits_with_invalid_argument_code() {
    Command::cargo_bin("deposit-engine")
        .expect("binary")
        .arg("bogus")
        .assert()
        .code(1);
}

#[test]
fn help_flag_exits_ok() {
    Command::cargo_bin("deposit-engine")
        .expect("binary")
        .arg("--help")
        .assert()
        .code(0);
}
