//! Fetcher behavior against a local mock server. The guard's private-host
//! screening is relaxed here so the mock is reachable; the guard itself is
//! covered by its own unit tests.

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use esg_acquire::{AcquirerConfig, ContentAcquirer};
use esg_core::{EsgError, FetchFailure, MimeKind};

fn test_acquirer(max_bytes: u64) -> ContentAcquirer {
    ContentAcquirer::new(AcquirerConfig {
        timeout_ms: 5_000,
        connect_timeout_ms: 2_000,
        max_bytes,
        allow_private_hosts: true,
    })
    .unwrap()
}

#[tokio::test]
async fn fetches_and_cleans_html() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/report"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html; charset=utf-8")
                .set_body_string(
                    "<html><head><script>x()</script></head><body>\
                     <p>We reduced carbon emissions by 35%.</p></body></html>",
                ),
        )
        .mount(&server)
        .await;

    let fetched = test_acquirer(1024 * 1024)
        .fetch(&format!("{}/report", server.uri()))
        .await
        .unwrap();
    assert_eq!(fetched.mime, MimeKind::Html);
    assert!(fetched.text.contains("reduced carbon emissions by 35%"));
    assert!(!fetched.text.contains("x()"));
}

#[tokio::test]
async fn plain_text_passes_through() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/notes.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/plain")
                .set_body_string("energy consumption was   2 GWh\n\n\nacross sites"),
        )
        .mount(&server)
        .await;

    let fetched = test_acquirer(1024)
        .fetch(&format!("{}/notes.txt", server.uri()))
        .await
        .unwrap();
    assert_eq!(fetched.mime, MimeKind::Text);
    assert_eq!(fetched.text, "energy consumption was 2 GWh\n\nacross sites");
}

#[tokio::test]
async fn body_at_cap_accepted_one_byte_over_rejected() {
    let server = MockServer::start().await;
    let exact = "a".repeat(64);
    let over = "a".repeat(65);
    Mock::given(method("GET"))
        .and(path("/exact"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/plain")
                .set_body_string(exact),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/over"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/plain")
                .set_body_string(over),
        )
        .mount(&server)
        .await;

    let acquirer = test_acquirer(64);
    let ok = acquirer.fetch(&format!("{}/exact", server.uri())).await.unwrap();
    assert_eq!(ok.bytes, 64);

    let err = acquirer.fetch(&format!("{}/over", server.uri())).await.unwrap_err();
    match err {
        EsgError::Fetch { reason, .. } => assert_eq!(reason, FetchFailure::TooLarge),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn upstream_statuses_map_to_sub_reasons() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let acquirer = test_acquirer(1024);
    match acquirer.fetch(&format!("{}/missing", server.uri())).await.unwrap_err() {
        EsgError::Fetch { reason, .. } => assert_eq!(reason, FetchFailure::Upstream4xx),
        other => panic!("unexpected error: {:?}", other),
    }
    match acquirer.fetch(&format!("{}/broken", server.uri())).await.unwrap_err() {
        EsgError::Fetch { reason, .. } => assert_eq!(reason, FetchFailure::Upstream5xx),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn redirects_are_followed_up_to_the_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/start"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("location", "/end"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/end"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/plain")
                .set_body_string("arrived"),
        )
        .mount(&server)
        .await;
    // A loop that never terminates within the hop budget.
    Mock::given(method("GET"))
        .and(path("/loop"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("location", "/loop"),
        )
        .mount(&server)
        .await;

    let acquirer = test_acquirer(1024);
    let fetched = acquirer.fetch(&format!("{}/start", server.uri())).await.unwrap();
    assert_eq!(fetched.text, "arrived");
    assert!(fetched.final_url.ends_with("/end"));

    let err = acquirer.fetch(&format!("{}/loop", server.uri())).await.unwrap_err();
    match err {
        EsgError::Fetch { reason, .. } => assert_eq!(reason, FetchFailure::Disallowed),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn redirect_to_disallowed_scheme_is_blocked() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ssrf"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("location", "ftp://internal/files"),
        )
        .mount(&server)
        .await;

    // Scheme screening applies to every redirect hop, test hook or not.
    let err = test_acquirer(1024)
        .fetch(&format!("{}/ssrf", server.uri()))
        .await
        .unwrap_err();
    match err {
        EsgError::Fetch { reason, .. } => assert_eq!(reason, FetchFailure::Disallowed),
        other => panic!("unexpected error: {:?}", other),
    }
}
