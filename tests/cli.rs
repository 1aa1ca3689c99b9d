//! Command line checks of the executables.

mod common;

use assert_cmd::prelude::*;
use predicates::str::contains;
use std::process::Command;
use tempfile::TempDir;

fn client(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("whoson-client").unwrap();
    cmd.env("HOME", home.path())
        .env_remove("GOWHOSON_CONFIG")
        .env_remove("GOWHOSON_CLIENT_MODE")
        .env_remove("GOWHOSON_CLIENT_SERVER")
        .env_remove("GOWHOSON_SERVERCTL_DUMP_SERVER");
    cmd
}

#[test]
fn client_cli_no_args() {
    let home = TempDir::new().unwrap();
    client(&home).assert().failure();
}

#[test]
fn client_cli_version() {
    let home = TempDir::new().unwrap();
    client(&home)
        .arg("-V")
        .assert()
        .success()
        .stdout(contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn client_cli_login_requires_data() {
    let home = TempDir::new().unwrap();
    client(&home).args(&["login", "10.0.0.1"]).assert().failure();
}

#[test]
fn client_cli_unknown_mode() {
    let home = TempDir::new().unwrap();
    client(&home)
        .args(&["query", "10.0.0.1", "--mode", "sctp", "--server", "127.0.0.1:1"])
        .assert()
        .failure()
        .stderr(contains("unknown protocol"));
}

#[test]
fn client_cli_against_a_running_server() {
    let home = TempDir::new().unwrap();
    let server = common::start(common::local_config());
    let tcp = server.tcp_addr().unwrap().to_string();
    let udp = server.udp_addr().unwrap().to_string();
    let control = server.control_addr().to_string();

    client(&home)
        .args(&["login", "10.9.9.9", "alice", "--mode", "tcp", "--server", &tcp])
        .assert()
        .success()
        .stdout("+LOGIN OK\n");
    client(&home)
        .args(&["query", "10.9.9.9", "--mode", "udp", "--server", &udp])
        .assert()
        .success()
        .stdout("+alice\n");
    client(&home)
        .args(&["dump", "--json", "--server", &control])
        .assert()
        .success()
        .stdout(contains("\"IP\": \"10.9.9.9\""));
    client(&home)
        .args(&["logout", "10.9.9.9", "--mode", "udp", "--server", &udp])
        .assert()
        .success()
        .stdout("+LOGOUT record deleted\n");
    client(&home)
        .args(&["dump", "--server", &control])
        .assert()
        .success()
        .stdout("");

    server.shutdown().unwrap();
}

#[test]
fn client_cli_reads_its_config_file() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("client.json");
    std::fs::write(&path, r#"{"Mode": "sctp"}"#).unwrap();
    client(&home)
        .args(&["query", "10.0.0.1", "--config", path.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(contains("unknown protocol"));
}

#[test]
fn client_cli_saves_config() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("nested").join("serverctl.json");
    client(&home)
        .args(&["config", "dump", "--save", "--config", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("\"Server\": \"127.0.0.1:9877\""));
    assert!(path.exists());
}

#[test]
fn server_cli_rejects_unknown_loglevel() {
    let home = TempDir::new().unwrap();
    Command::cargo_bin("whoson-server")
        .unwrap()
        .env("HOME", home.path())
        .args(&["--loglevel", "loud"])
        .assert()
        .failure();
}

#[test]
fn server_cli_rejects_bad_address() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("gowhoson.json");
    Command::cargo_bin("whoson-server")
        .unwrap()
        .args(&["--config", config.to_str().unwrap(), "--tcp", "localhost"])
        .assert()
        .failure()
        .stderr(contains("parse error"));
}
