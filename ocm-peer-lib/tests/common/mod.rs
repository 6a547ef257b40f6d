//! Shared helpers: a local HTTP peer that records what it receives, and
//! scripted resolvers.

#![allow(dead_code)]

use std::convert::Infallible;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http::{HeaderMap, Method, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use ocm_peer_lib::config::{ClientConfig, SsrfMode};
use ocm_peer_lib::outbound::{LookupFuture, Resolver};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub type TestResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// A request as the peer saw it
#[derive(Debug, Clone)]
pub struct Seen {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

type Handler = dyn Fn(&Seen) -> Response<Full<Bytes>> + Send + Sync;

/// Plain-HTTP peer on an ephemeral loopback port
pub struct PeerServer {
    pub addr: SocketAddr,
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl PeerServer {
    pub async fn start<F>(handler: F) -> io::Result<Self>
    where
        F: Fn(&Seen) -> Response<Full<Bytes>> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let seen: Arc<Mutex<Vec<Seen>>> = Arc::new(Mutex::new(Vec::new()));
        let handler: Arc<Handler> = Arc::new(handler);

        let log = Arc::clone(&seen);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let log = Arc::clone(&log);
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    let svc = service_fn(move |req: hyper::Request<hyper::body::Incoming>| {
                        let log = Arc::clone(&log);
                        let handler = Arc::clone(&handler);
                        async move {
                            let (parts, body) = req.into_parts();
                            let body = body.collect().await.map(|b| b.to_bytes()).unwrap_or_default();
                            let seen = Seen {
                                method: parts.method,
                                path: parts
                                    .uri
                                    .path_and_query()
                                    .map(|p| p.as_str().to_string())
                                    .unwrap_or_default(),
                                headers: parts.headers,
                                body,
                            };
                            let response = handler(&seen);
                            log.lock()
                                .unwrap_or_else(|e| panic!("request log poisoned: {e}"))
                                .push(seen);
                            Ok::<_, Infallible>(response)
                        }
                    });
                    let _ = ConnBuilder::new(TokioExecutor::new())
                        .serve_connection(TokioIo::new(stream), svc)
                        .await;
                });
            }
        });

        Ok(Self { addr, seen })
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn hits(&self) -> usize {
        self.requests().len()
    }

    pub fn requests(&self) -> Vec<Seen> {
        self.seen
            .lock()
            .unwrap_or_else(|e| panic!("request log poisoned: {e}"))
            .clone()
    }
}

pub fn ok(body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::new(Full::new(body.into()))
}

pub fn redirect(status: StatusCode, location: &str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    if let Ok(value) = location.parse() {
        response.headers_mut().insert(http::header::LOCATION, value);
    }
    response
}

/// Raw HTTP/1.1 peer that streams `count` copies of `chunk` with
/// `Transfer-Encoding: chunked` and no `Content-Length`
pub async fn start_chunked_peer(chunk: &'static [u8], count: usize) -> io::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }

                let mut response = Vec::from(
                    &b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\n\
                       transfer-encoding: chunked\r\nconnection: close\r\n\r\n"[..],
                );
                for _ in 0..count {
                    response.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
                    response.extend_from_slice(chunk);
                    response.extend_from_slice(b"\r\n");
                }
                response.extend_from_slice(b"0\r\n\r\n");
                let _ = stream.write_all(&response).await;
                let _ = stream.shutdown().await;
            });
        }
    });
    Ok(addr)
}

/// Config for tests that must reach a loopback peer
pub fn loopback_config() -> ClientConfig {
    ClientConfig { ssrf_mode: SsrfMode::Off, timeout_ms: 5_000, ..ClientConfig::default() }
}

/// Answers every lookup with the same addresses
#[derive(Debug)]
pub struct StaticResolver(pub Vec<IpAddr>);

impl Resolver for StaticResolver {
    fn lookup_ip<'a>(&'a self, _host: &'a str) -> LookupFuture<'a> {
        let addrs = self.0.clone();
        Box::pin(async move { Ok(addrs) })
    }
}

/// Fails every lookup the way an NXDOMAIN does
#[derive(Debug)]
pub struct FailingResolver;

impl Resolver for FailingResolver {
    fn lookup_ip<'a>(&'a self, _host: &'a str) -> LookupFuture<'a> {
        Box::pin(async { Err(io::Error::new(io::ErrorKind::NotFound, "no such host")) })
    }
}

/// Never answers
#[derive(Debug)]
pub struct HangingResolver;

impl Resolver for HangingResolver {
    fn lookup_ip<'a>(&'a self, _host: &'a str) -> LookupFuture<'a> {
        Box::pin(std::future::pending())
    }
}

/// First lookup returns `first`, every later one returns `then`, like a
/// name rebinding between the pre-flight check and the dial
#[derive(Debug)]
pub struct RebindingResolver {
    pub first: IpAddr,
    pub then: IpAddr,
    pub calls: AtomicUsize,
}

impl RebindingResolver {
    pub fn new(first: IpAddr, then: IpAddr) -> Self {
        Self { first, then, calls: AtomicUsize::new(0) }
    }
}

impl Resolver for RebindingResolver {
    fn lookup_ip<'a>(&'a self, _host: &'a str) -> LookupFuture<'a> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let ip = if call == 0 { self.first } else { self.then };
        Box::pin(async move { Ok(vec![ip]) })
    }
}
