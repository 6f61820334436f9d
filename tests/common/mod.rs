//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tape_proxy::config::{Mode, ProxyConfig, UpstreamConfig};
use tape_proxy::lifecycle::Shutdown;
use tape_proxy::net::Listener;
use tape_proxy::tape::{Interaction, TapeStore};
use tape_proxy::HttpServer;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// What the mock upstream saw.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub request_line: String,
    /// Header names lowercased, in arrival order.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl MockResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// Start a mock upstream that answers every request with the same body.
pub async fn start_mock_upstream(body: &'static str) -> SocketAddr {
    start_programmable_upstream(move |_| async move { MockResponse::ok(body) }).await
}

/// Start a programmable mock upstream on an ephemeral port.
pub async fn start_programmable_upstream<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(CapturedRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MockResponse> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let Some(request) = read_request(&mut socket).await else {
                            return;
                        };
                        let response = f(request).await;

                        let mut raw = format!("HTTP/1.1 {} Mock\r\n", response.status);
                        for (name, value) in &response.headers {
                            raw.push_str(&format!("{name}: {value}\r\n"));
                        }
                        raw.push_str(&format!(
                            "Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                            response.body.len(),
                            response.body
                        ));
                        let _ = socket.write_all(raw.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Start an upstream that accepts connections and never answers.
pub async fn start_silent_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    addr
}

/// Start a mock upstream that records every request it receives.
pub async fn start_capturing_upstream(
    body: &'static str,
) -> (SocketAddr, Arc<Mutex<Vec<CapturedRequest>>>) {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let sink = captured.clone();
    let addr = start_programmable_upstream(move |request| {
        sink.lock().unwrap().push(request);
        async move { MockResponse::ok(body) }
    })
    .await;
    (addr, captured)
}

async fn read_request(socket: &mut TcpStream) -> Option<CapturedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let mut lines = head.split("\r\n");
    let request_line = lines.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(n, v)| (n.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(n, _)| n == "content-length")
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Some(CapturedRequest {
        request_line,
        headers,
        body,
    })
}

/// A proxy running on an ephemeral port with its own tape root.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub tapes: TempDir,
    shutdown: Shutdown,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn control_url(&self, op: &str) -> String {
        self.url(&format!("/__control/{op}"))
    }

    pub fn tape_path(&self, name: &str) -> std::path::PathBuf {
        self.tapes.path().join(format!("{name}.yml"))
    }

    pub fn store(&self) -> TapeStore {
        TapeStore::new(self.tapes.path(), "yml")
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub fn base_config(mode: Mode, root: &Path, upstream: Option<SocketAddr>) -> ProxyConfig {
    let mut config = ProxyConfig {
        mode,
        ..ProxyConfig::default()
    };
    config.tapes.root = root.to_path_buf();
    config.upstream = upstream.map(|addr| UpstreamConfig {
        url: format!("http://{addr}"),
    });
    config.timeouts.upstream_secs = 5;
    config
}

/// Start a proxy; `seed` tapes are written before the server loads anything.
pub async fn start_proxy(
    mode: Mode,
    upstream: Option<SocketAddr>,
    seed: &[(&str, Vec<Interaction>)],
) -> TestProxy {
    start_proxy_with(mode, upstream, seed, |_| {}).await
}

pub async fn start_proxy_with(
    mode: Mode,
    upstream: Option<SocketAddr>,
    seed: &[(&str, Vec<Interaction>)],
    configure: impl FnOnce(&mut ProxyConfig),
) -> TestProxy {
    let tapes = tempfile::tempdir().unwrap();
    let store = TapeStore::new(tapes.path(), "yml");
    for (name, records) in seed {
        store.save(name, records).await.unwrap();
    }

    let mut config = base_config(mode, tapes.path(), upstream);
    configure(&mut config);

    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = tcp.local_addr().unwrap();
    let listener = Listener::from_tcp(tcp, 64);

    let server = HttpServer::new(config).unwrap();
    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    tokio::spawn(async move {
        if let Err(e) = server.run(listener, receiver).await {
            eprintln!("test proxy stopped: {e}");
        }
    });

    TestProxy {
        addr,
        tapes,
        shutdown,
    }
}

/// Client without connection pooling, so every request opens a fresh connection.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// Build a recorded exchange for seeding tapes.
pub fn interaction(method: &str, path: &str, status: u16, body: &str) -> Interaction {
    use tape_proxy::tape::{Headers, RecordedRequest, RecordedResponse, Status, TapeBody};

    Interaction {
        request: RecordedRequest {
            method: method.to_string(),
            path: path.to_string(),
            body: TapeBody::default(),
            headers: Headers::new(),
        },
        response: RecordedResponse {
            status: Status::from(status),
            headers: Headers::new(),
            body: TapeBody::from(body),
        },
    }
}
