//! In-process HTTP server used to stand in for target sites, proxy feeds and
//! HTTP proxies.
//!
//! Requests sent through an HTTP proxy arrive with an absolute-form target
//! (`GET http://host:port/path HTTP/1.1`), so a handler can act as a proxy
//! simply by answering on the target's behalf.

#![allow(dead_code)]

use parking_lot::Mutex;
use proxy_fetch::FailureSink;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// A recorded request: method and request target.
pub type Hit = (String, String);

pub struct FakeServer {
    pub addr: SocketAddr,
    hits: Arc<Mutex<Vec<Hit>>>,
    heads: Arc<Mutex<Vec<String>>>,
}

impl FakeServer {
    /// Start a server answering every request with `handler(method, target)`.
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&str, &str) -> (u16, String) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(Mutex::new(Vec::new()));
        let heads = Arc::new(Mutex::new(Vec::new()));
        let handler = Arc::new(handler);

        let recorded = Arc::clone(&hits);
        let recorded_heads = Arc::clone(&heads);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let handler = Arc::clone(&handler);
                let recorded = Arc::clone(&recorded);
                let recorded_heads = Arc::clone(&recorded_heads);
                tokio::spawn(async move {
                    let _ = serve(stream, handler.as_ref(), &recorded, &recorded_heads).await;
                });
            }
        });

        Self { addr, hits, heads }
    }

    /// Start a server that always answers `status` with `body`.
    pub async fn fixed(status: u16, body: &str) -> Self {
        let body = body.to_string();
        Self::start(move |_, _| (status, body.clone())).await
    }

    /// Start a server that accepts connections but never answers.
    pub async fn silent() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let _ = tokio::io::copy(&mut stream, &mut tokio::io::sink()).await;
                });
            }
        });
        Self {
            addr,
            hits: Arc::new(Mutex::new(Vec::new())),
            heads: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// `http://127.0.0.1:<port><path>`
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// `127.0.0.1:<port>`, the way proxy feeds list addresses.
    pub fn host_port(&self) -> String {
        self.addr.to_string()
    }

    pub fn hits(&self) -> Vec<Hit> {
        self.hits.lock().clone()
    }

    /// Raw request heads (request line and headers) in arrival order.
    pub fn heads(&self) -> Vec<String> {
        self.heads.lock().clone()
    }
}

async fn serve<F>(
    mut stream: TcpStream,
    handler: &F,
    hits: &Mutex<Vec<Hit>>,
    heads: &Mutex<Vec<String>>,
) -> std::io::Result<()>
where
    F: Fn(&str, &str) -> (u16, String),
{
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let head = String::from_utf8_lossy(&buf);
    let mut parts = head.lines().next().unwrap_or_default().split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default().to_string();
    hits.lock().push((method.clone(), target.clone()));
    heads.lock().push(head.into_owned());

    let (status, body) = handler(&method, &target);
    let mut response = format!(
        "HTTP/1.1 {} Fake\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        body.len()
    );
    if method != "HEAD" {
        response.push_str(&body);
    }
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

/// `127.0.0.1:<port>` of a port nothing listens on.
pub async fn closed_port() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr.to_string()
}

/// Failure sink that keeps every message for assertions.
#[derive(Default)]
pub struct CollectingSink {
    messages: Mutex<Vec<String>>,
}

impl CollectingSink {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
}

impl FailureSink for CollectingSink {
    fn report(&self, message: &str) {
        self.messages.lock().push(message.to_string());
    }
}

pub fn init_test_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
