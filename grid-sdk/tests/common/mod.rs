//! In-process HTTP stubs for exercising the clients without a cluster.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;

/// One request as a stub saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub query: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }
}

/// Shared across stubs so the log keeps global ordering.
pub type Log = Arc<Mutex<Vec<Recorded>>>;

pub fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

pub struct StubResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl StubResponse {
    pub fn ok() -> StubResponse {
        StubResponse {
            status: 200,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn status(status: u16) -> StubResponse {
        StubResponse {
            status,
            ..StubResponse::ok()
        }
    }

    pub fn json(body: serde_json::Value) -> StubResponse {
        StubResponse {
            status: 200,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: body.to_string().into_bytes(),
        }
    }

    pub fn with_header(mut self, key: &str, value: &str) -> StubResponse {
        self.headers.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> StubResponse {
        self.body = body;
        self
    }
}

/// Spawn a stub server; every request is appended to `log` before `handler`
/// builds the reply. Returns `host:port`.
pub async fn spawn_stub<F>(log: Log, handler: F) -> String
where
    F: Fn(&Recorded) -> StubResponse + Clone + Send + Sync + 'static,
{
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                break;
            };
            let log = log.clone();
            let handler = handler.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let log = log.clone();
                    let handler = handler.clone();
                    async move {
                        eprintln!("DEBUG stub: got request {} {}", req.method(), req.uri());
                        let (parts, body) = req.into_parts();
                        let body = body.collect().await.unwrap().to_bytes();
                        eprintln!("DEBUG stub: body collected");
                        let recorded = Recorded {
                            method: parts.method.to_string(),
                            path: parts.uri.path().to_string(),
                            query: parts.uri.query().unwrap_or("").to_string(),
                            headers: parts
                                .headers
                                .iter()
                                .map(|(k, v)| {
                                    (k.as_str().to_lowercase(), v.to_str().unwrap_or("").to_string())
                                })
                                .collect(),
                            body: body.to_vec(),
                        };
                        let reply = {
                            let mut log = log.lock().unwrap();
                            log.push(recorded.clone());
                            handler(&recorded)
                        };
                        let mut builder = hyper::Response::builder().status(reply.status);
                        for (k, v) in &reply.headers {
                            builder = builder.header(k, v);
                        }
                        Ok::<_, std::convert::Infallible>(
                            builder.body(Full::new(Bytes::from(reply.body))).unwrap(),
                        )
                    }
                });
                let _ = ConnBuilder::new(TokioExecutor::new())
                    .serve_connection(TokioIo::new(socket), service)
                    .await;
            });
        }
    });

    format!("{addr}")
}

/// An address nothing listens on: connections are refused immediately.
pub async fn dead_endpoint() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("{addr}")
}
