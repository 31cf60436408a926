// End-to-end runs of the smupdate binary against a mocked cluster

use assert_cmd::cargo::cargo_bin_cmd;
use httpmock::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::{TempDir, tempdir};

const VERSION_OK: &str = r#"<netapp version='1.170' xmlns='http://www.netapp.com/filer/admin'><results status="passed"><version>NetApp Release 9.13.1P2</version></results></netapp>"#;

const ONE_RECORD: &str = r#"<netapp version='1.170' xmlns='http://www.netapp.com/filer/admin'><results status="passed"><attributes-list><snapmirror-info><destination-location>svm1:vol1</destination-location><lag-time>120</lag-time><mirror-state>snapmirrored</mirror-state><relationship-status>idle</relationship-status><source-location>svm1:vol1_src</source-location></snapmirror-info></attributes-list><num-records>1</num-records></results></netapp>"#;

const REPORT: &str = "Source,Destination,State,Status,Lag(Seconds)\nsvm1:vol1_src,svm1:vol1,snapmirrored,idle,120\n";

/// Working directory whose project config points the tool at the mock over plain HTTP.
fn workdir(server: &MockServer) -> TempDir {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join(".smupdate.yaml"),
        format!("transport: http\nport: {}\n", server.port()),
    )
    .unwrap();
    dir
}

fn smupdate(dir: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("smupdate");
    cmd.current_dir(dir)
        .env("SMUPDATE_CONFIG_DIR", dir.join("user-config"))
        .env_remove("RUST_LOG");
    cmd
}

fn mock_version(server: &MockServer) {
    server.mock(|when, then| {
        when.method(POST).body_contains("<system-get-version>");
        then.status(200).body(VERSION_OK);
    });
}

#[test]
fn show_prints_relationship_table() {
    let server = MockServer::start();
    mock_version(&server);
    let query = server.mock(|when, then| {
        when.method(POST)
            .body_contains("<snapmirror-get-iter>")
            .body_contains("<destination-location>svm1:vol1</destination-location>");
        then.status(200).body(ONE_RECORD);
    });
    let dir = workdir(&server);

    smupdate(dir.path())
        .args([
            "-o", "show", "-c", "127.0.0.1", "-u", "admin", "-p", "secret", "-s", "svm1", "-v",
            "vol1",
        ])
        .assert()
        .success()
        .stdout(REPORT);

    query.assert();
}

#[test]
fn show_without_match_prints_notice() {
    let server = MockServer::start();
    mock_version(&server);
    server.mock(|when, then| {
        when.method(POST).body_contains("<snapmirror-get-iter>");
        then.status(200).body(
            r#"<netapp><results status="passed"><num-records>0</num-records></results></netapp>"#,
        );
    });
    let dir = workdir(&server);

    smupdate(dir.path())
        .args([
            "-o", "show", "-c", "127.0.0.1", "-u", "admin", "-p", "secret", "-s", "svm1", "-v",
            "missing",
        ])
        .assert()
        .success()
        .stdout("No snapmirror relationship found.\n");
}

#[test]
fn update_failure_still_reports_current_state() {
    let server = MockServer::start();
    mock_version(&server);
    let update = server.mock(|when, then| {
        when.method(POST)
            .body_contains("<snapmirror-update><destination-location>svm1:vol1</destination-location></snapmirror-update>");
        then.status(200).body(
            r#"<netapp><results status="failed" errno="13001" reason="relationship is transferring"/></netapp>"#,
        );
    });
    let query = server.mock(|when, then| {
        when.method(POST).body_contains("<snapmirror-get-iter>");
        then.status(200).body(ONE_RECORD);
    });
    let dir = workdir(&server);

    smupdate(dir.path())
        .args([
            "--operation", "update", "--cluster", "127.0.0.1", "--user", "admin", "--password",
            "secret", "--svm", "svm1", "--vol", "vol1",
        ])
        .assert()
        .success()
        .stdout(format!(
            "Failed to run snapmirror-update API call: relationship is transferring\n{REPORT}"
        ));

    update.assert();
    query.assert();
}

#[test]
fn password_prompt_stays_off_stdout() {
    let server = MockServer::start();
    let version = server.mock(|when, then| {
        when.method(POST)
            .header("Authorization", "Basic YWRtaW46c2VjcmV0")
            .body_contains("<system-get-version>");
        then.status(200).body(VERSION_OK);
    });
    server.mock(|when, then| {
        when.method(POST).body_contains("<snapmirror-get-iter>");
        then.status(200).body(ONE_RECORD);
    });
    let dir = workdir(&server);

    smupdate(dir.path())
        .args([
            "-o", "show", "-c", "127.0.0.1", "-u", "admin", "-s", "svm1", "-v", "vol1",
        ])
        .write_stdin("secret\n")
        .assert()
        .success()
        .stdout(REPORT)
        .stderr(predicate::str::contains("Enter password:"));

    version.assert();
}

#[test]
fn rejected_session_exits_with_code_2() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).body_contains("<system-get-version>");
        then.status(200).body(
            r#"<netapp><results status="failed" errno="13003" reason="Insufficient privileges: user 'admin' does not have read access to this resource"/></netapp>"#,
        );
    });
    let query = server.mock(|when, then| {
        when.method(POST).body_contains("<snapmirror-get-iter>");
        then.status(200).body(ONE_RECORD);
    });
    let dir = workdir(&server);

    smupdate(dir.path())
        .args([
            "-o", "show", "-c", "127.0.0.1", "-u", "admin", "-p", "secret", "-s", "svm1", "-v",
            "vol1",
        ])
        .assert()
        .code(2)
        .stdout("")
        .stderr(predicate::str::contains(
            "Error connecting: Insufficient privileges: user 'admin' does not have read access to this resource",
        ));

    query.assert_hits(0);
}

#[test]
fn debug_output_goes_to_stderr() {
    let server = MockServer::start();
    mock_version(&server);
    server.mock(|when, then| {
        when.method(POST).body_contains("<snapmirror-get-iter>");
        then.status(200).body(ONE_RECORD);
    });
    let dir = workdir(&server);

    smupdate(dir.path())
        .args([
            "-o", "show", "-c", "127.0.0.1", "-u", "admin", "-p", "secret", "-s", "svm1", "-v",
            "vol1", "-d",
        ])
        .assert()
        .success()
        .stdout(REPORT)
        .stderr(predicate::str::contains(
            "Cluster 127.0.0.1 is running NetApp Release 9.13.1P2",
        ));
}

#[test]
fn json_format_prints_records() {
    let server = MockServer::start();
    mock_version(&server);
    server.mock(|when, then| {
        when.method(POST).body_contains("<snapmirror-get-iter>");
        then.status(200).body(ONE_RECORD);
    });
    let dir = workdir(&server);

    smupdate(dir.path())
        .args([
            "-o", "show", "-c", "127.0.0.1", "-u", "admin", "-p", "secret", "-s", "svm1", "-v",
            "vol1", "--format", "json",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""mirror_state": "snapmirrored""#))
        .stdout(predicate::str::contains(r#""lag_time": "120""#));
}

#[test]
fn rejects_invalid_operation() {
    let dir = tempdir().unwrap();
    smupdate(dir.path())
        .args([
            "-o", "resync", "-c", "127.0.0.1", "-u", "admin", "-p", "secret", "-s", "svm1", "-v",
            "vol1",
        ])
        .assert()
        .failure()
        .stdout("")
        .stderr(predicate::str::contains("invalid value 'resync'"));
}

#[test]
fn rejects_separator_in_svm_name() {
    let dir = tempdir().unwrap();
    smupdate(dir.path())
        .args([
            "-o", "show", "-c", "127.0.0.1", "-u", "admin", "-p", "secret", "-s", "svm:1", "-v",
            "vol1",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must not contain `:`"));
}

#[test]
fn help_lists_options() {
    let dir = tempdir().unwrap();
    smupdate(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--operation"))
        .stdout(predicate::str::contains("--insecure"))
        .stdout(predicate::str::contains("Destination volume name"));
}

#[test]
fn json_update_keeps_trigger_failure_off_stdout() {
    let server = MockServer::start();
    mock_version(&server);
    server.mock(|when, then| {
        when.method(POST).body_contains("<snapmirror-update>");
        then.status(200).body(
            r#"<netapp><results status="failed" errno="13001" reason="relationship is transferring"/></netapp>"#,
        );
    });
    server.mock(|when, then| {
        when.method(POST).body_contains("<snapmirror-get-iter>");
        then.status(200).body(ONE_RECORD);
    });
    let dir = workdir(&server);

    let output = smupdate(dir.path())
        .args([
            "-o", "update", "-c", "127.0.0.1", "-u", "admin", "-p", "secret", "-s", "svm1", "-v",
            "vol1", "--format", "json",
        ])
        .assert()
        .success()
        .stderr(predicate::str::contains(
            "Failed to run snapmirror-update API call: relationship is transferring",
        ))
        .get_output()
        .stdout
        .clone();

    let parsed: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(parsed[0]["destination"], "svm1:vol1");
    assert_eq!(parsed[0]["relationship_status"], "idle");
}

#[test]
fn json_show_reports_query_failure_as_object() {
    let server = MockServer::start();
    mock_version(&server);
    server.mock(|when, then| {
        when.method(POST).body_contains("<snapmirror-get-iter>");
        then.status(200).body(
            r#"<netapp><results status="failed" errno="13005" reason="Unable to find API: snapmirror-get-iter"/></netapp>"#,
        );
    });
    let dir = workdir(&server);

    let output = smupdate(dir.path())
        .args([
            "-o", "show", "-c", "127.0.0.1", "-u", "admin", "-p", "secret", "-s", "svm1", "-v",
            "vol1", "--format", "json",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let parsed: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(parsed["error"], "Unable to find API: snapmirror-get-iter");
}
