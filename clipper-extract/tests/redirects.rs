mod common;

use std::time::Duration;

use clipper_extract::normalize::{RedirectPolicy, clean, resolve_redirects};
use clipper_http::HttpClient;
use common::init_test_tracing;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_policy(max_hops: usize) -> RedirectPolicy {
    RedirectPolicy {
        max_hops,
        hop_delay: Duration::ZERO,
        timeout: Duration::from_secs(2),
    }
}

#[tokio::test]
async fn looping_chain_stops_at_the_hop_budget() {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/b"))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/b"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/a"))
        .mount(&server)
        .await;

    let client = HttpClient::new().unwrap();
    let start = format!("{}/a", server.uri());
    let resolved = tokio::time::timeout(
        Duration::from_secs(10),
        resolve_redirects(&client, &start, &fast_policy(10)),
    )
    .await
    .expect("resolution terminates");

    // Ten hops from /a alternate back to /a.
    assert_eq!(resolved, start);
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 10);
}

#[tokio::test]
async fn two_hop_chain_lands_on_the_article() {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/s/xyz"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "/hop"))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/hop"))
        .respond_with(
            ResponseTemplate::new(307)
                .insert_header("Location", "/news/story?id=3&utm_source=x&utm_content=y"),
        )
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/news/story"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = HttpClient::new().unwrap();
    let resolved =
        resolve_redirects(&client, &format!("{}/s/xyz", server.uri()), &fast_policy(10)).await;

    assert_eq!(
        clean(&resolved),
        format!("{}/news/story?id=3", server.uri())
    );
}

#[tokio::test]
async fn redirect_without_location_stops_there() {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(302))
        .mount(&server)
        .await;

    let client = HttpClient::new().unwrap();
    let start = format!("{}/broken", server.uri());
    assert_eq!(resolve_redirects(&client, &start, &fast_policy(10)).await, start);
}

#[tokio::test]
async fn transport_error_returns_the_original_url() {
    init_test_tracing();
    let client = HttpClient::new().unwrap();
    let start = "http://127.0.0.1:9/s/abc";
    assert_eq!(resolve_redirects(&client, start, &fast_policy(10)).await, start);
}
