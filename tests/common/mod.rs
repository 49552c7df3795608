//! Shared utilities for integration testing.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use tracker_client::client::{ApiRequest, RawResponse, Transport, TransportError};
use tracker_client::config::{
    CacheConfig, CircuitBreakerConfig, EndpointSettings, ExecutorConfig, RateLimitConfig,
    RetryConfig,
};

type Reply = Result<RawResponse, TransportError>;

/// Transport that replays queued replies in order, then repeats a fallback.
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    delay: Duration,
    calls: AtomicU32,
    seen: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub fn new(replies: Vec<Reply>, fallback: Reply) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            fallback,
            delay: Duration::ZERO,
            calls: AtomicU32::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Every call answers with `reply`.
    pub fn always(reply: Reply) -> Self {
        Self::new(Vec::new(), reply)
    }

    /// Sleep this long before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<ApiRequest> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn perform(&self, request: &ApiRequest) -> Result<RawResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.replies.lock().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

/// Transport that computes each reply from the request.
pub struct FnTransport<F> {
    handler: F,
    calls: AtomicU32,
}

impl<F> FnTransport<F>
where
    F: Fn(&ApiRequest) -> Reply + Send + Sync,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<F> Transport for FnTransport<F>
where
    F: Fn(&ApiRequest) -> Reply + Send + Sync,
{
    async fn perform(&self, request: &ApiRequest) -> Result<RawResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.handler)(request)
    }
}

pub fn ok(body: &str) -> Reply {
    Ok(RawResponse::new(200).with_body(body.to_string()))
}

pub fn status(code: u16) -> Reply {
    Ok(RawResponse::new(code))
}

/// Settings with short delays and a roomy limiter, so tests only exercise
/// what they configure.
pub fn fast_settings() -> EndpointSettings {
    EndpointSettings {
        rate_limit: RateLimitConfig {
            capacity: 100,
            refill_per_second: 100.0,
            burst: None,
        },
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold: 5,
            recovery_timeout_ms: 10_000,
            recovery_success_threshold: 1,
            half_open_max_probes: 1,
        },
        retries: RetryConfig {
            max_retries: 3,
            base_delay_ms: 10,
            max_delay_ms: 100,
            ..RetryConfig::default()
        },
        cache: CacheConfig {
            enabled: true,
            default_ttl_ms: 60_000,
            max_items: 100,
        },
        executor: ExecutorConfig::default(),
        attempt_timeout: Duration::from_secs(5),
    }
}

/// What the programmable backend saw of one request.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    /// Request line and headers, headers lower-cased.
    pub head: String,
    pub body: String,
}

impl SeenRequest {
    pub fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        let prefix = format!("{}:", name.to_ascii_lowercase());
        self.head
            .lines()
            .find(|line| line.starts_with(&prefix))
            .map(|line| line[prefix.len()..].trim())
    }
}

/// Start a programmable HTTP/1.1 backend on an ephemeral port.
///
/// `f` receives the parsed request and returns (status, headers, body).
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(SeenRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, Vec<(String, String)>, String)> + Send + 'static,
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
                        let Some(seen) = read_request(&mut socket).await else {
                            return;
                        };
                        let (status, headers, body) = f(seen).await;

                        let mut response = format!(
                            "HTTP/1.1 {status} Mock\r\nContent-Length: {}\r\nConnection: close\r\n",
                            body.len()
                        );
                        for (name, value) in headers {
                            response.push_str(&format!("{name}: {value}\r\n"));
                        }
                        response.push_str("\r\n");
                        response.push_str(&body);

                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> Option<SeenRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let head_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let head: String = head
        .lines()
        .enumerate()
        .map(|(i, line)| match (i, line.split_once(':')) {
            (0, _) | (_, None) => format!("{line}\n"),
            (_, Some((name, value))) => format!("{}:{}\n", name.to_ascii_lowercase(), value),
        })
        .collect();

    let length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf[head_end..].to_vec();
    while body.len() < length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Some(SeenRequest {
        head,
        body: String::from_utf8_lossy(&body).to_string(),
    })
}
