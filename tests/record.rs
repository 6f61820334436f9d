//! Record-mode behaviour against mock upstreams.

use std::net::SocketAddr;

use tape_proxy::config::Mode;
use tape_proxy::tape::HeaderValues;

mod common;

use common::{
    client, interaction, start_capturing_upstream, start_mock_upstream,
    start_programmable_upstream, start_proxy, start_proxy_with, start_silent_upstream,
    MockResponse,
};

#[tokio::test]
async fn each_exchange_is_appended_and_persisted() {
    let upstream = start_mock_upstream("pong").await;
    let proxy = start_proxy(Mode::Record, Some(upstream), &[]).await;
    let client = client();

    let response = client
        .post(proxy.url("/items"))
        .body("hello")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "pong");

    let tape = proxy.store().load("__default").await.unwrap().unwrap();
    assert_eq!(tape.len(), 1);
    assert_eq!(tape[0].request.method, "POST");
    assert_eq!(tape[0].request.path, "/items");
    assert_eq!(tape[0].request.body.as_bytes(), b"hello");
    assert_eq!(tape[0].response.body.as_bytes(), b"pong");

    client.get(proxy.url("/items?limit=5")).send().await.unwrap();

    let tape = proxy.store().load("__default").await.unwrap().unwrap();
    assert_eq!(tape.len(), 2);
    assert_eq!(tape[1].request.path, "/items?limit=5");
}

#[tokio::test]
async fn upstream_sees_rewritten_host_and_original_headers() {
    let (upstream, captured) = start_capturing_upstream("ok").await;
    let proxy = start_proxy(Mode::Record, Some(upstream), &[]).await;

    client()
        .put(proxy.url("/things/1?force=true"))
        .header("x-trace", "abc")
        .body("payload")
        .send()
        .await
        .unwrap();

    let seen = captured.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].request_line, "PUT /things/1?force=true HTTP/1.1");
    assert_eq!(seen[0].header("host"), Some(upstream.to_string().as_str()));
    assert_eq!(seen[0].header("x-trace"), Some("abc"));
    assert_eq!(seen[0].body, b"payload");

    // The tape keeps what the client sent.
    let tape = proxy.store().load("__default").await.unwrap().unwrap();
    assert_eq!(
        tape[0].request.headers.get("x-trace"),
        Some(&HeaderValues::One("abc".into()))
    );
    assert_eq!(
        tape[0].request.headers.get("host"),
        Some(&HeaderValues::One(proxy.addr.to_string()))
    );
}

#[tokio::test]
async fn upstream_status_and_headers_are_recorded() {
    let upstream = start_programmable_upstream(|_| async {
        MockResponse {
            status: 404,
            headers: Vec::new(),
            body: "missing".into(),
        }
        .with_header("X-Upstream", "mock")
    })
    .await;
    let proxy = start_proxy(Mode::Record, Some(upstream), &[]).await;

    let response = client().get(proxy.url("/nope")).send().await.unwrap();
    assert_eq!(response.status(), 404);
    assert_eq!(response.headers()["x-upstream"], "mock");

    let tape = proxy.store().load("__default").await.unwrap().unwrap();
    assert_eq!(tape[0].response.status.code, 404);
    assert_eq!(
        tape[0].response.headers.get("x-upstream"),
        Some(&HeaderValues::One("mock".into()))
    );
}

#[tokio::test]
async fn unreachable_upstream_returns_500_and_records_nothing() {
    let dead: SocketAddr = "127.0.0.1:1".parse().unwrap();
    let proxy = start_proxy(Mode::Record, Some(dead), &[]).await;

    let response = client().get(proxy.url("/x")).send().await.unwrap();
    assert_eq!(response.status(), 500);
    assert!(!proxy.tape_path("__default").exists());
}

#[tokio::test]
async fn upstream_timeout_returns_500_and_leaves_tape_alone() {
    let upstream = start_silent_upstream().await;
    let existing = vec![interaction("GET", "/before", 200, "kept")];
    let proxy = start_proxy_with(
        Mode::Record,
        Some(upstream),
        &[("__default", existing.clone())],
        |config| config.timeouts.upstream_secs = 1,
    )
    .await;

    let started = std::time::Instant::now();
    let response = client().get(proxy.url("/slow")).send().await.unwrap();
    assert_eq!(response.status(), 500);
    assert!(started.elapsed() < std::time::Duration::from_secs(5));

    let tape = proxy.store().load("__default").await.unwrap().unwrap();
    assert_eq!(tape, existing);
}

#[tokio::test]
async fn recorded_tape_replays_the_same_responses() {
    let upstream = start_programmable_upstream(|request| async move {
        MockResponse::ok(format!("echo {}", request.request_line))
    })
    .await;
    let recorder = start_proxy(Mode::Record, Some(upstream), &[]).await;
    let client = client();

    client.get(recorder.url("/a")).send().await.unwrap();
    client.get(recorder.url("/b")).send().await.unwrap();
    let tape = recorder.store().load("__default").await.unwrap().unwrap();

    let player = start_proxy(Mode::Replay, None, &[("__default", tape)]).await;
    let b = client.get(player.url("/b")).send().await.unwrap();
    assert_eq!(b.text().await.unwrap(), "echo GET /b HTTP/1.1");
    let a = client.get(player.url("/a")).send().await.unwrap();
    assert_eq!(a.text().await.unwrap(), "echo GET /a HTTP/1.1");
}
