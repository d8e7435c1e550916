use crate::config::{AllowedOrigins, Config, Project, ServerSettings, UpstreamSettings};
use crate::forwarder::{Transport, TransportError};
use async_trait::async_trait;
use http::{HeaderName, HeaderValue, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use url::Url;

/// Builds a config directly, skipping `Config::load` so tests may point the
/// upstream at a loopback address.
pub fn test_config(base_url: &str) -> Config {
    let projects = HashMap::from([
        (
            "app1".to_string(),
            Project {
                id: "app1".to_string(),
                upstream_project_id: "p1".to_string(),
                upstream_key: "k1".to_string(),
            },
        ),
        (
            "app2".to_string(),
            Project {
                id: "app2".to_string(),
                upstream_project_id: "p2".to_string(),
                upstream_key: "k2".to_string(),
            },
        ),
    ]);

    Config {
        projects,
        server: ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 3000,
            route: "/tunnel".to_string(),
            header_name: HeaderName::from_static("app_id"),
            allowed_origins: AllowedOrigins::List(vec![HeaderValue::from_static(
                "https://app.example.com",
            )]),
        },
        upstream: UpstreamSettings {
            base_url: Url::parse(base_url).unwrap(),
            timeout: Duration::from_secs(5),
        },
    }
}

#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub url: Url,
    pub body: Bytes,
}

/// Transport that never touches the network.
pub struct FakeTransport {
    result: Result<StatusCode, TransportError>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl FakeTransport {
    pub fn responding(status: StatusCode) -> Arc<Self> {
        Arc::new(Self {
            result: Ok(status),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(error: TransportError) -> Arc<Self> {
        Arc::new(Self {
            result: Err(error),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send_envelope(&self, url: Url, body: Bytes) -> Result<StatusCode, TransportError> {
        self.calls.lock().unwrap().push(RecordedCall { url, body });
        self.result.clone()
    }
}

#[derive(Clone, Debug)]
pub struct ReceivedRequest {
    pub method: http::Method,
    pub path_and_query: String,
    pub body: Bytes,
}

/// In-process upstream that records every request and answers with a fixed
/// status and body.
pub struct TestUpstream {
    pub port: u16,
    received: Arc<Mutex<Vec<ReceivedRequest>>>,
}

impl TestUpstream {
    pub async fn start(status: StatusCode, response_body: &'static str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to address");
        let port = listener.local_addr().unwrap().port();
        let received = Arc::new(Mutex::new(Vec::new()));

        let received_clone = received.clone();
        tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                let io = TokioIo::new(stream);
                let received = received_clone.clone();

                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                        let received = received.clone();
                        async move {
                            let (parts, body) = req.into_parts();
                            let body = body.collect().await.unwrap().to_bytes();
                            received.lock().unwrap().push(ReceivedRequest {
                                method: parts.method,
                                path_and_query: parts
                                    .uri
                                    .path_and_query()
                                    .map(|pq| pq.to_string())
                                    .unwrap_or_default(),
                                body,
                            });

                            let mut response = Response::new(Full::new(Bytes::from(response_body)));
                            *response.status_mut() = status;
                            Ok::<_, Infallible>(response)
                        }
                    });

                    if let Err(err) =
                        hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                            .serve_connection(io, service)
                            .await
                    {
                        eprintln!("Error serving connection: {:?}", err);
                    }
                });
            }
        });

        Self { port, received }
    }

    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn received(&self) -> Vec<ReceivedRequest> {
        self.received.lock().unwrap().clone()
    }
}

/// Returns a loopback port with nothing listening on it.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Returns a loopback port that accepts connections but never answers.
pub async fn stalled_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let mut held = Vec::new();
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            held.push(stream);
        }
    });

    port
}
