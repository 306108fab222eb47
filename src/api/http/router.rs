//! HTTP router and server setup.
//!
//! Supports both HTTP/1.1 and HTTP/2 on the same port using hyper-util's
//! auto connection builder for automatic protocol detection.

use bytes::Bytes;
use http_body_util::Full;
use hyper::service::service_fn;
use hyper::{body::Incoming, header, Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use log::*;
use std::{convert::Infallible, io, sync::Arc};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;

use crate::config::Config;
use crate::net::LineSource;

use super::handlers::{counters_snapshot, json_response, render_home, render_prometheus};

/// Route HTTP requests to appropriate handlers.
async fn router(
    source: Arc<LineSource>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path();
    let method = req.method();

    let resp = match (method, path) {
        (&Method::GET, "/") => {
            let mut r = Response::new(Full::new(Bytes::from(render_home(&source))));
            r.headers_mut().insert(
                header::CONTENT_TYPE,
                header::HeaderValue::from_static("text/html; charset=utf-8"),
            );
            r
        }
        (&Method::GET, "/api/counters") => {
            json_response(&counters_snapshot(&source), StatusCode::OK)
        }
        (&Method::GET, "/metrics") => {
            let s = render_prometheus(&source);
            let mut r = Response::new(Full::new(Bytes::from(s)));
            *r.status_mut() = StatusCode::OK;
            r
        }
        _ => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("not found")))
            .unwrap(),
    };

    Ok(resp)
}

/// Handle an HTTP connection with automatic HTTP/1.1 and HTTP/2 detection.
pub async fn handle_http_connection<S>(stream: S, source: Arc<LineSource>) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(stream);
    AutoBuilder::new(TokioExecutor::new())
        .serve_connection(io, service_fn(move |req| router(source.clone(), req)))
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("http error: {}", e)))
}

/// Start the standalone observability server.
///
/// Serves the status page, JSON counters, and Prometheus metrics. Does
/// nothing when no `http` section is configured.
pub async fn serve_http(cfg: Arc<Config>, source: Arc<LineSource>) {
    if let Some(http) = &cfg.http {
        let addr: std::net::SocketAddr = http.bind_addr.parse().expect("invalid http bind addr");
        let listener = TcpListener::bind(&addr).await.expect("failed to bind");
        info!("http listening on {} (HTTP/1.1 + HTTP/2 h2c)", addr);
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(x) => x,
                Err(e) => {
                    error!("accept error: {}", e);
                    continue;
                }
            };
            let source = source.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_http_connection(stream, source).await {
                    debug!("http connection error from {}: {}", peer, e);
                }
            });
        }
    }
}
