mod common;

use std::collections::BTreeSet;
use std::time::Duration;

use common::{StubRequest, StubServer};
use serde_json::json;
use vx_nvd::{CveFilter, CvePages, NvdApiError, NvdClientConfig};

fn envelope(start_index: u32, per_page: u32, total: u32, timestamp: &str) -> String {
    let ids: Vec<_> = (start_index..total.min(start_index + per_page))
        .map(|n| {
            json!({
                "cve": {
                    "id": format!("CVE-2024-{n:04}"),
                    "published": "2024-01-15T09:00:00.000",
                    "lastModified": "2024-02-01T12:30:00.000",
                    "vulnStatus": "Analyzed"
                }
            })
        })
        .collect();
    json!({
        "resultsPerPage": per_page,
        "startIndex": start_index,
        "totalResults": total,
        "format": "NVD_CVE",
        "version": "2.0",
        "timestamp": timestamp,
        "vulnerabilities": ids
    })
    .to_string()
}

fn config(server: &StubServer, results_per_page: u32) -> NvdClientConfig {
    NvdClientConfig {
        api_key: Some("stub-key".to_string()),
        endpoint: server.endpoint("/rest/json/cves/2.0"),
        delay: Some(Duration::ZERO),
        results_per_page,
        ..NvdClientConfig::default()
    }
}

#[test]
fn delivers_every_record_across_pages() {
    let server = StubServer::start(|request: &StubRequest| {
        (
            200,
            envelope(request.start_index(), 2, 5, "2024-03-01T10:12:00.437"),
        )
    });

    let mut pages = CvePages::new(NvdClientConfig {
        thread_count: 2,
        ..config(&server, 2)
    })
    .expect("client");

    let mut ids = BTreeSet::new();
    for page in &mut pages {
        let page = page.expect("page");
        assert_eq!(page.total_results, 5);
        for item in page.items {
            ids.insert(item.cve.id);
        }
    }

    let expected: BTreeSet<_> = (0..5).map(|n| format!("CVE-2024-{n:04}")).collect();
    assert_eq!(ids, expected);
    assert_eq!(pages.total_results(), Some(5));
    assert_eq!(pages.last_status(), 200);
    assert_eq!(server.hits(), 3);
}

#[test]
fn api_key_header_reaches_the_wire() {
    let server = StubServer::start(|request: &StubRequest| {
        if request.headers.get("apikey").map(String::as_str) == Some("stub-key") {
            (200, envelope(0, 10, 1, "2024-03-01T10:12:00.000"))
        } else {
            (403, "{}".to_string())
        }
    });

    let mut pages = CvePages::new(config(&server, 10)).expect("client");
    let page = pages.next().expect("one page").expect("ok page");
    assert_eq!(page.items.len(), 1);
}

#[test]
fn filters_are_serialized_onto_the_request() {
    let server = StubServer::start(|request: &StubRequest| {
        if request.query.contains_key("hasKev")
            && request.query.get("cvssV3Severity").map(String::as_str) == Some("HIGH")
        {
            (200, envelope(0, 10, 1, "2024-03-01T10:12:00.000"))
        } else {
            (404, "{}".to_string())
        }
    });

    let mut pages = CvePages::new(NvdClientConfig {
        filters: vec![
            CveFilter::HasKev,
            CveFilter::CvssV3Severity("HIGH".parse().expect("severity")),
        ],
        ..config(&server, 10)
    })
    .expect("client");

    assert!(pages.next().expect("one page").is_ok());
}

#[test]
fn non_success_status_terminates_the_sequence() {
    let server = StubServer::start(|request: &StubRequest| {
        if request.start_index() == 2 {
            (404, "not found".to_string())
        } else {
            (
                200,
                envelope(request.start_index(), 2, 6, "2024-03-01T10:12:00.000"),
            )
        }
    });

    let mut pages = CvePages::new(config(&server, 2)).expect("client");
    let first = pages.next().expect("discovery page").expect("ok");
    assert_eq!(first.items.len(), 2);

    // Single worker, so the 404 at startIndex=2 is the next completion.
    assert!(pages.next().is_none());
    assert!(pages.next().is_none(), "terminated sequences stay finished");
    assert_eq!(pages.last_status(), 404);
    assert_eq!(pages.total_results(), Some(6));
}

#[test]
fn malformed_body_is_a_decode_error() {
    let server = StubServer::start(|_: &StubRequest| (200, "not json at all".to_string()));

    let mut pages = CvePages::new(config(&server, 10)).expect("client");
    let err = pages.next().expect("item").expect_err("decode failure");
    assert!(matches!(err, NvdApiError::Decode { start_index: 0, .. }));
    assert!(pages.next().is_none());
}

#[test]
fn last_updated_tracks_the_newest_server_timestamp() {
    let server = StubServer::start(|request: &StubRequest| {
        let timestamp = if request.start_index() == 0 {
            "2024-03-01T10:00:00.000"
        } else {
            "2024-03-01T11:30:00.000"
        };
        (200, envelope(request.start_index(), 2, 4, timestamp))
    });

    let mut pages = CvePages::new(config(&server, 2)).expect("client");
    while let Some(page) = pages.next() {
        page.expect("page");
    }
    let last_updated = pages.last_updated().expect("timestamp");
    assert_eq!(
        vx_nvd::timestamp::format(last_updated).expect("format"),
        "2024-03-01T11:30:00.000"
    );
}

#[test]
fn max_page_count_truncates_the_fan_out() {
    let server = StubServer::start(|request: &StubRequest| {
        (
            200,
            envelope(request.start_index(), 2, 10, "2024-03-01T10:12:00.000"),
        )
    });

    let mut pages = CvePages::new(NvdClientConfig {
        max_page_count: 2,
        ..config(&server, 2)
    })
    .expect("client");

    let delivered: Vec<_> = pages.by_ref().collect::<Result<Vec<_>, _>>().expect("pages");
    assert_eq!(delivered.len(), 2);
    assert_eq!(server.hits(), 2);
}

#[test]
fn close_stops_further_network_activity() {
    let server = StubServer::start(|request: &StubRequest| {
        std::thread::sleep(Duration::from_millis(50));
        (
            200,
            envelope(request.start_index(), 1, 6, "2024-03-01T10:12:00.000"),
        )
    });

    let mut pages = CvePages::new(config(&server, 1)).expect("client");
    let _first = pages.next().expect("discovery page").expect("ok");
    pages.close();
    let hits_at_close = server.hits();
    std::thread::sleep(Duration::from_millis(200));
    assert!(server.hits() <= hits_at_close + 1, "in-flight request may finish, queued ones must not start");
    assert!(pages.next().is_none());
}
