//! HTTP/1.1 transport.
//!
//! Accepts connections, converts hyper requests into [`InboundRequest`]s,
//! lets the [`MockServer`] answer them and writes the buffered response.
//! Every request is also recorded in the request log.

use crate::mock::MockServer;
use crate::request::{parse_query_string, InboundRequest};
use crate::responder::ResolvedResponse;
use anyhow::Context;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// One request, as recorded in the request log.
#[derive(Debug, Serialize)]
pub struct RequestLog {
    pub uri: String,
    pub request_time: String,
    pub headers: HashMap<String, Vec<String>>,
    pub method: String,
    pub content_length: usize,
    pub remote_addr: String,
    pub query_params: HashMap<String, Vec<String>>,
}

impl RequestLog {
    pub fn new(uri: &str, req: &InboundRequest) -> Self {
        Self {
            uri: uri.to_string(),
            request_time: chrono::Utc::now().to_rfc3339(),
            headers: req.headers.clone(),
            method: req.method.clone(),
            content_length: req.body.len(),
            remote_addr: req.remote_addr.clone(),
            query_params: req.query.clone(),
        }
    }
}

/// Appends request log entries as JSON lines.
pub struct RequestLogWriter {
    file: Mutex<tokio::fs::File>,
}

impl RequestLogWriter {
    /// Open (or create) the log file in append mode.
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("error opening request log {}", path.display()))?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    pub async fn write(&self, entry: &RequestLog) -> anyhow::Result<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        Ok(())
    }
}

/// HTTP front end for a [`MockServer`].
pub struct HttpServer {
    mock: Arc<MockServer>,
    request_log: Option<Arc<RequestLogWriter>>,
}

impl HttpServer {
    pub fn new(mock: Arc<MockServer>) -> Self {
        Self {
            mock,
            request_log: None,
        }
    }

    pub fn with_request_log(mut self, writer: RequestLogWriter) -> Self {
        self.request_log = Some(Arc::new(writer));
        self
    }

    /// Serve until interrupted with Ctrl-C.
    pub async fn run(self, listen_addr: &str) -> anyhow::Result<()> {
        let listener = TcpListener::bind(listen_addr)
            .await
            .with_context(|| format!("failed to bind {}", listen_addr))?;
        info!(addr = %listener.local_addr()?, "Listening");
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        let shared = Arc::new(self);

        loop {
            let (stream, peer) = tokio::select! {
                accepted = listener.accept() => accepted?,
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down");
                    return Ok(());
                }
            };

            let io = TokioIo::new(stream);
            let shared = Arc::clone(&shared);

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let shared = Arc::clone(&shared);
                    async move { Ok::<_, Infallible>(shared.respond(req, peer).await) }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    error!(peer = %peer, error = %e, "Connection error");
                }
            });
        }
    }

    async fn respond(&self, req: Request<Incoming>, peer: SocketAddr) -> Response<Full<Bytes>> {
        let uri = req.uri().to_string();
        let inbound = match into_inbound(req, peer).await {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!(peer = %peer, error = %e, "Failed to read request body");
                return plain_response(StatusCode::BAD_REQUEST, "failed to read request body");
            }
        };

        self.log_request(&uri, &inbound).await;
        into_hyper(self.mock.handle(&inbound).await)
    }

    async fn log_request(&self, uri: &str, req: &InboundRequest) {
        let entry = RequestLog::new(uri, req);
        match serde_json::to_string(&entry) {
            Ok(json) => debug!(request = %json, "Request received"),
            Err(e) => warn!(error = %e, "Failed to serialize request log entry"),
        }
        if let Some(writer) = &self.request_log {
            if let Err(e) = writer.write(&entry).await {
                warn!(error = %e, "Failed to write request log entry");
            }
        }
    }
}

async fn into_inbound(req: Request<Incoming>, peer: SocketAddr) -> Result<InboundRequest, hyper::Error> {
    let (parts, body) = req.into_parts();
    let body = body.collect().await?.to_bytes();

    let raw_path = parts.uri.path();
    let path = urlencoding::decode(raw_path)
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| raw_path.to_string());

    let mut headers: HashMap<String, Vec<String>> = HashMap::new();
    for (name, value) in &parts.headers {
        if let Ok(value) = value.to_str() {
            headers
                .entry(name.as_str().to_string())
                .or_default()
                .push(value.to_string());
        }
    }

    let host = parts
        .headers
        .get(hyper::header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(String::from)
        .or_else(|| parts.uri.authority().map(|a| a.to_string()))
        .unwrap_or_default();

    Ok(InboundRequest {
        method: parts.method.as_str().to_string(),
        path,
        query: parse_query_string(parts.uri.query().unwrap_or("")),
        headers,
        protocol: format!("{:?}", parts.version),
        host,
        remote_addr: peer.to_string(),
        body,
    })
}

fn into_hyper(resolved: ResolvedResponse) -> Response<Full<Bytes>> {
    let status = StatusCode::from_u16(resolved.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut builder = Response::builder().status(status);
    for (name, value) in &resolved.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    match builder.body(Full::new(resolved.body)) {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, "Failed to build response");
            plain_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to build response")
        }
    }
}

fn plain_response(status: StatusCode, message: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(message.as_bytes())));
    *response.status_mut() = status;
    response
}
