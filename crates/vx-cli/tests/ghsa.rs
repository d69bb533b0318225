mod common;

use assert_cmd::Command;
use common::{StubRequest, StubServer};
use serde_json::{json, Value};

fn vx() -> Command {
    let mut cmd = Command::cargo_bin("vx").expect("vx binary");
    cmd.env_remove("NVD_API_KEY").env_remove("GITHUB_TOKEN");
    cmd
}

fn page(nodes: Vec<Value>, end_cursor: Option<&str>) -> String {
    json!({
        "data": {
            "securityAdvisories": {
                "totalCount": 2,
                "pageInfo": {
                    "hasNextPage": end_cursor.is_some(),
                    "endCursor": end_cursor
                },
                "nodes": nodes
            }
        }
    })
    .to_string()
}

fn advisory(id: &str) -> Value {
    json!({
        "ghsaId": id,
        "summary": "sample",
        "severity": "HIGH",
        "publishedAt": "2024-01-10T08:00:00Z",
        "updatedAt": "2024-02-20T09:30:00Z",
        "withdrawnAt": null
    })
}

#[test]
fn streams_advisories_across_cursor_pages() {
    let server = StubServer::start(|request: &StubRequest| {
        if request.body.contains("\"after\":\"c1\"") {
            (200, page(vec![advisory("GHSA-bbbb-bbbb-bbbb")], None))
        } else {
            (200, page(vec![advisory("GHSA-aaaa-aaaa-aaaa")], Some("c1")))
        }
    });

    let assert = vx()
        .env("GITHUB_TOKEN", "stub-token")
        .args(["ghsa", "--endpoint", server.endpoint("/graphql").as_str()])
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8");
    let value: Value = serde_json::from_str(&stdout).expect("valid json");
    assert_eq!(value["advisories"].as_array().map(Vec::len), Some(2));
    assert_eq!(value["results"]["success"], true);
    assert_eq!(value["results"]["count"], 2);
    assert_eq!(server.hits(), 2);
}

#[test]
fn missing_token_fails_before_any_request() {
    let server = StubServer::start(|_: &StubRequest| (200, page(vec![], None)));

    vx().args(["ghsa", "--endpoint", server.endpoint("/graphql").as_str()])
        .assert()
        .code(1);
    assert_eq!(server.hits(), 0);
}

#[test]
fn unexpanded_token_reference_is_rejected() {
    let server = StubServer::start(|_: &StubRequest| (200, page(vec![], None)));

    vx().env("GITHUB_TOKEN", "op://vault/github/token")
        .args(["ghsa", "--endpoint", server.endpoint("/graphql").as_str()])
        .assert()
        .code(1);
    assert_eq!(server.hits(), 0);
}

#[test]
fn upstream_failure_exits_with_code_two() {
    let server = StubServer::start(|_: &StubRequest| (403, "forbidden".to_string()));

    let assert = vx()
        .env("GITHUB_TOKEN", "stub-token")
        .args(["ghsa", "--endpoint", server.endpoint("/graphql").as_str()])
        .assert()
        .code(2);

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8");
    let value: Value = serde_json::from_str(&stdout).expect("valid json");
    assert_eq!(value["results"]["reason"], "Received HTTP Status Code: 403");
}
