use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::body::Incoming;
use hyper::header::HeaderValue;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info};

use chunk_storage::{ChunkRepository, Stat, StatSet};

use crate::handlers::{content_length, full_body};
use crate::headers::{HEADER_REQID, HEADER_TRANS_ID};

pub type HttpBody = BoxBody<Bytes, io::Error>;

const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);

/// One chunk server: repository + counters behind the HTTP surface.
pub struct RawxService {
    ns: String,
    url: String,
    repo: Arc<ChunkRepository>,
    compress: bool,
    counters: StatSet,
    timers: StatSet,
}

impl RawxService {
    pub fn new(ns: impl Into<String>, url: impl Into<String>, repo: ChunkRepository) -> Self {
        RawxService {
            ns: ns.into(),
            url: url.into(),
            repo: Arc::new(repo),
            compress: false,
            counters: StatSet::new(),
            timers: StatSet::new(),
        }
    }

    /// Store uploads zlib-compressed. Off by default.
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.ns
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub(crate) fn repo(&self) -> &Arc<ChunkRepository> {
        &self.repo
    }

    pub(crate) fn compress(&self) -> bool {
        self.compress
    }

    pub(crate) fn counters(&self) -> &StatSet {
        &self.counters
    }

    pub(crate) fn timers(&self) -> &StatSet {
        &self.timers
    }

    /// Dispatch one request, account for it, and log the access line.
    pub async fn handle(&self, req: Request<Incoming>, peer: SocketAddr) -> Response<HttpBody> {
        let started = Instant::now();
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let reqid = correlation_id(&req);
        let bytes_in = if method == Method::PUT {
            content_length(req.headers()).unwrap_or(0)
        } else {
            0
        };

        let (hits_slot, time_slot, mut resp) = self.dispatch(req, &path).await;

        let spent = started.elapsed().as_micros() as u64;
        let status = resp.status();

        self.counters.increment(Stat::HitsTotal);
        self.counters.increment(hits_slot);
        self.timers.add(Stat::TimeTotal, spent);
        self.timers.add(time_slot, spent);
        if let Some(class) = status_class(status) {
            self.counters.increment(class);
        }

        let bytes_out = content_length(resp.headers()).unwrap_or(0);
        if status.is_success() {
            if bytes_in > 0 {
                self.counters.add(Stat::BytesRead, bytes_in);
            }
            if hits_slot == Stat::HitsGet && bytes_out > 0 {
                self.counters.add(Stat::BytesWritten, bytes_out);
            }
        }

        if let Some(id) = reqid {
            if let Ok(v) = HeaderValue::from_str(&id) {
                resp.headers_mut().insert(HEADER_REQID, v.clone());
                resp.headers_mut().insert(HEADER_TRANS_ID, v);
            }
        }

        info!(
            target: "access",
            pid = std::process::id(),
            peer = %peer,
            method = %method,
            path = %path,
            status = status.as_u16(),
            elapsed_us = spent,
            bytes_out,
        );

        resp
    }

    async fn dispatch(&self, req: Request<Incoming>, path: &str) -> (Stat, Stat, Response<HttpBody>) {
        let method = req.method().clone();
        match (&method, path) {
            (&Method::GET, "/stat") | (&Method::GET, "/info") => {
                (Stat::HitsStat, Stat::TimeStat, self.do_stat())
            }
            (&Method::GET, "/list") => {
                let query = req.uri().query().map(str::to_string);
                (
                    Stat::HitsOther,
                    Stat::TimeOther,
                    self.do_list(query.as_deref()).await,
                )
            }
            (&Method::PUT, _) => {
                let chunkid = basename(path).to_string();
                let (parts, body) = req.into_parts();
                (
                    Stat::HitsPut,
                    Stat::TimePut,
                    self.do_put(&chunkid, &parts.headers, body).await,
                )
            }
            (&Method::GET, _) => {
                let chunkid = basename(path);
                (Stat::HitsGet, Stat::TimeGet, self.do_get(chunkid).await)
            }
            (&Method::DELETE, _) => {
                let chunkid = basename(path);
                (Stat::HitsDel, Stat::TimeDel, self.do_delete(chunkid).await)
            }
            _ => {
                let mut resp = Response::builder()
                    .status(StatusCode::METHOD_NOT_ALLOWED)
                    .body(full_body(Bytes::new()))
                    .unwrap();
                resp.headers_mut().insert(
                    crate::headers::HEADER_ERROR,
                    HeaderValue::from_static("only PUT,GET,DELETE"),
                );
                (Stat::HitsOther, Stat::TimeOther, resp)
            }
        }
    }
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or("")
}

fn correlation_id(req: &Request<Incoming>) -> Option<String> {
    req.headers()
        .get(HEADER_REQID)
        .or_else(|| req.headers().get(HEADER_TRANS_ID))
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn status_class(status: StatusCode) -> Option<Stat> {
    match status.as_u16() {
        200..=299 => Some(Stat::Hits2xx),
        403 => Some(Stat::Hits403),
        404 => Some(Stat::Hits404),
        400..=499 => Some(Stat::Hits4xx),
        500..=599 => Some(Stat::Hits5xx),
        _ => None,
    }
}

/// Accept loop: one spawned connection task per socket, graceful drain on
/// ctrl-c with a deadline.
pub async fn serve(service: Arc<RawxService>, listener: TcpListener) -> io::Result<()> {
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, ns = service.namespace(), "chunk server is running");

    let http = ConnBuilder::new(TokioExecutor::new());
    let graceful = hyper_util::server::graceful::GracefulShutdown::new();
    let mut ctrl_c = std::pin::pin!(tokio::signal::ctrl_c());

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((socket, peer)) => {
                        let service = service.clone();
                        let handler = service_fn(move |req| {
                            let service = service.clone();
                            async move {
                                Ok::<_, std::convert::Infallible>(service.handle(req, peer).await)
                            }
                        });
                        let conn = http.serve_connection(TokioIo::new(socket), handler);
                        let conn = graceful.watch(conn.into_owned());
                        tokio::spawn(async move {
                            let _ = conn.await;
                        });
                    }
                    Err(err) => {
                        error!(error = %err, "error accepting connection");
                    }
                }
            }
            _ = ctrl_c.as_mut() => break,
        }
    }

    tokio::select! {
        () = graceful.shutdown() => {
            info!("graceful shutdown complete");
        }
        () = tokio::time::sleep(SHUTDOWN_DEADLINE) => {
            info!("shutdown deadline reached, aborting connections");
        }
    }
    Ok(())
}
