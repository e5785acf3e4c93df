//! The exposition HTTP server.
//!
//! Two things are served: the metrics path, which runs a scrape and then
//! renders every gauge in the Prometheus text format, and a small landing
//! page linking to it for everything else.

use crate::{Collector, GlucoseSource};
use http_body_util::Full;
use hyper::{
    Request, Response, StatusCode,
    body::{Bytes, Incoming},
    header::{self, HeaderValue},
    server::conn::http1,
    service::service_fn,
};
use hyper_util::rt::TokioIo;
use std::{convert::Infallible, io, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing::{Instrument, debug, info, info_span, warn};

const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Pause after an accept error that isn't tied to a single connection, such
/// as running out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(500);

/// Everything a connection handler needs.
pub struct Exposition<S> {
    metrics_path: String,
    collector: Arc<Collector<S>>,
}

impl<S> Exposition<S>
where
    S: GlucoseSource + 'static,
{
    pub fn new(metrics_path: impl Into<String>, collector: Arc<Collector<S>>) -> Self {
        Self {
            metrics_path: metrics_path.into(),
            collector,
        }
    }

    /// Accept connections on `listener` until the task is dropped.
    ///
    /// Accept errors are logged and retried. Only failing to read the
    /// listener's own address is returned.
    pub async fn serve(self, listener: TcpListener) -> io::Result<()> {
        let exposition = Arc::new(self);
        info!(
            addr = %listener.local_addr()?,
            metrics_path = %exposition.metrics_path,
            "serving metrics"
        );

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    match accept_backoff(&err) {
                        Some(pause) => {
                            warn!(%err, ?pause, "accept failed, retrying");
                            tokio::time::sleep(pause).await;
                        }
                        None => debug!(%err, "connection dropped before accept"),
                    }
                    continue;
                }
            };
            let io = TokioIo::new(stream);
            let exposition = exposition.clone();

            tokio::spawn(
                async move {
                    let service = service_fn(move |req: Request<Incoming>| {
                        let exposition = exposition.clone();
                        async move { Ok::<_, Infallible>(exposition.handle(req).await) }
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        debug!(%err, "connection closed with error");
                    }
                }
                .instrument(info_span!("connection", %peer)),
            );
        }
    }

    async fn handle(&self, req: Request<Incoming>) -> Response<Full<Bytes>> {
        let path = req.uri().path();
        if path == self.metrics_path {
            self.collector.collect().await;
            response(StatusCode::OK, METRICS_CONTENT_TYPE, self.collector.gauges().render())
        } else {
            if path != "/" {
                debug!(path, "unknown path, serving landing page");
            }
            response(
                StatusCode::OK,
                "text/html; charset=utf-8",
                landing_page(&self.metrics_path),
            )
        }
    }
}

/// How long to wait before accepting again. `None` for errors that only
/// concern the connection being accepted.
fn accept_backoff(err: &io::Error) -> Option<Duration> {
    match err.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::Interrupted => None,
        _ => Some(ACCEPT_BACKOFF),
    }
}

fn response(status: StatusCode, content_type: &'static str, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// The static page served everywhere but the metrics path.
pub fn landing_page(metrics_path: &str) -> String {
    let href = metrics_path
        .replace('&', "&amp;")
        .replace('\'', "&#39;")
        .replace('<', "&lt;");
    format!(
        "<html>\n\
         <head><title>Nightscout exporter</title></head>\n\
         <body>\n\
         <h1>nightscout exporter</h1>\n\
         <p><a href='{href}'>Metrics</a></p>\n\
         </body>\n\
         </html>\n"
    )
}

/// Wait for Ctrl-C. Logs and waits forever if the handler can't be
/// installed, so the server keeps running.
pub async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(%err, "unable to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
